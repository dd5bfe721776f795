use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{Result, ScanError};

pub const DEFAULT_UPLOAD_URL: &str = "http://127.0.0.1:8000/upload";
pub const DEFAULT_ANALYZE_URL: &str = "http://127.0.0.1:8000/analyze";

/// What to do when the user picks something that is not an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidImagePolicy {
    /// Keep the current selection and say nothing.
    Ignore,
    /// Keep the current selection and report `InvalidImageType`.
    #[default]
    Notify,
}

/// Client settings. Endpoints only: storage credentials are issued by the
/// upload service per request and are never part of the client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub upload_url: String,
    pub analyze_url: String,
    /// `None` leaves the transport's own timeout behaviour in place.
    pub request_timeout_secs: Option<u64>,
    /// Send the image bytes along with the reference to the analysis endpoint.
    pub include_image_in_analysis: bool,
    /// Delay used for the cosmetic first and last progress phases.
    pub phase_pacing_ms: u64,
    pub invalid_image_policy: InvalidImagePolicy,
    pub export_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            analyze_url: DEFAULT_ANALYZE_URL.to_string(),
            request_timeout_secs: None,
            include_image_in_analysis: false,
            phase_pacing_ms: 400,
            invalid_image_policy: InvalidImagePolicy::default(),
            export_dir: PathBuf::from("."),
        }
    }
}

impl ClientConfig {
    /// Defaults, then the YAML file if given, then `MEDSCAN_*` environment
    /// variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScanError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&content)?;
        info!("Loaded client configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| ScanError::Config(e.to_string()))
    }

    /// Apply overrides read through `lookup`, which is `std::env::var` outside
    /// of tests.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MEDSCAN_UPLOAD_URL") {
            self.upload_url = url;
        }
        if let Some(url) = lookup("MEDSCAN_ANALYZE_URL") {
            self.analyze_url = url;
        }
        if let Some(raw) = lookup("MEDSCAN_REQUEST_TIMEOUT_SECS") {
            let secs = raw.parse::<u64>().map_err(|_| {
                ScanError::Config(format!("MEDSCAN_REQUEST_TIMEOUT_SECS must be a number, got '{}'", raw))
            })?;
            self.request_timeout_secs = Some(secs);
        }
        if let Some(raw) = lookup("MEDSCAN_INCLUDE_IMAGE") {
            self.include_image_in_analysis = parse_flag("MEDSCAN_INCLUDE_IMAGE", &raw)?;
        }
        if let Some(dir) = lookup("MEDSCAN_EXPORT_DIR") {
            self.export_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn phase_pacing(&self) -> Duration {
        Duration::from_millis(self.phase_pacing_ms)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ScanError::Config(format!(
            "{} must be true or false, got '{}'",
            key, raw
        ))),
    }
}
