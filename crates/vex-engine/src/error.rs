//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] vex_ws::WsError),

    #[error("Feed error: {0}")]
    Feed(#[from] vex_feed::FeedError),

    #[error("Registry error: {0}")]
    Registry(#[from] vex_registry::RegistryError),

    #[error("Detector error: {0}")]
    Detector(#[from] vex_detector::DetectorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] vex_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
