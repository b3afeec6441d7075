//! Mock candle-stream server for integration tests.
//!
//! Accepts connections, answers text `ping` with `pong`, records every
//! text frame it receives and can push data frames to all clients.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Debug, Clone, Copy)]
pub struct MockOptions {
    /// Reply to `ping` with `pong`.
    pub reply_pong: bool,
    /// Close the first connection after this long.
    pub drop_first_after: Option<Duration>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            reply_pong: true,
            drop_first_after: None,
        }
    }
}

pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    push_tx: broadcast::Sender<String>,
    messages: Arc<Mutex<Vec<(u32, String)>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockWsServer {
    pub async fn start() -> Self {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0u32));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (push_tx, _) = broadcast::channel::<String>(64);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();
        let push_clone = push_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        let conn_no = {
                            let mut count = connections_clone.lock().await;
                            *count += 1;
                            *count
                        };
                        tokio::spawn(handle_connection(
                            stream,
                            conn_no,
                            options,
                            messages_clone.clone(),
                            push_clone.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            push_tx,
            messages,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// All received text frames as (connection number, text).
    pub async fn received(&self) -> Vec<(u32, String)> {
        self.messages.lock().await.clone()
    }

    /// Parsed subscribe/unsubscribe requests as (connection, op, instIds).
    pub async fn requests(&self) -> Vec<(u32, String, Vec<String>)> {
        self.received()
            .await
            .into_iter()
            .filter_map(|(conn, text)| {
                let v: serde_json::Value = serde_json::from_str(&text).ok()?;
                let op = v.get("op")?.as_str()?.to_string();
                let ids = v
                    .get("args")?
                    .as_array()?
                    .iter()
                    .filter_map(|a| a.get("instId")?.as_str().map(str::to_string))
                    .collect();
                Some((conn, op, ids))
            })
            .collect()
    }

    /// Send a text frame to every connected client.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.push_tx.send(text.into());
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    conn_no: u32,
    options: MockOptions,
    messages: Arc<Mutex<Vec<(u32, String)>>>,
    mut push_rx: broadcast::Receiver<String>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let drop_at = match (conn_no, options.drop_first_after) {
        (1, Some(after)) => tokio::time::Instant::now() + after,
        _ => tokio::time::Instant::now() + Duration::from_secs(3600),
    };

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(drop_at) => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            Ok(text) = push_rx.recv() => {
                let _ = write.send(Message::Text(text)).await;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    messages.lock().await.push((conn_no, text.clone()));
                    if text == "ping" && options.reply_pong {
                        let _ = write.send(Message::Text("pong".to_string())).await;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }
}
