//! Detector configuration.

use crate::error::{DetectorError, DetectorResult};
use serde::{Deserialize, Serialize};

/// Thresholds for alerting and watch logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// VER at or above which a reading triggers.
    #[serde(default = "default_ver_threshold")]
    pub ver_threshold: f64,
    /// Fraction of the threshold at which sub-threshold readings are logged.
    #[serde(default = "default_watch_ratio")]
    pub watch_ratio: f64,
    /// Same-bar re-alert requires VER above last alert VER times this.
    #[serde(default = "default_intensify_ratio")]
    pub intensify_ratio: f64,
}

fn default_ver_threshold() -> f64 {
    3.0
}

fn default_watch_ratio() -> f64 {
    0.7
}

fn default_intensify_ratio() -> f64 {
    1.2
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            ver_threshold: default_ver_threshold(),
            watch_ratio: default_watch_ratio(),
            intensify_ratio: default_intensify_ratio(),
        }
    }
}

impl DetectorConfig {
    /// VER at or above which a non-triggered reading is worth a watch notice.
    pub fn watch_level(&self) -> f64 {
        self.ver_threshold * self.watch_ratio
    }

    /// Validate configuration values.
    pub fn validate(&self) -> DetectorResult<()> {
        if !(self.ver_threshold.is_finite() && self.ver_threshold > 0.0) {
            return Err(DetectorError::ConfigError(format!(
                "ver_threshold ({}) must be positive",
                self.ver_threshold
            )));
        }
        if !(self.watch_ratio > 0.0 && self.watch_ratio <= 1.0) {
            return Err(DetectorError::ConfigError(format!(
                "watch_ratio ({}) must be in (0, 1]",
                self.watch_ratio
            )));
        }
        if !(self.intensify_ratio.is_finite() && self.intensify_ratio >= 1.0) {
            return Err(DetectorError::ConfigError(format!(
                "intensify_ratio ({}) must be at least 1",
                self.intensify_ratio
            )));
        }
        Ok(())
    }
}
