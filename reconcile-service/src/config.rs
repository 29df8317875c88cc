use serde::Deserialize;
use std::{fs, path::PathBuf};
use time::OffsetDateTime;

use crate::reconcile::{Window, ZoneMode};

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
    /// `absolute` or a fixed offset such as `+05:45`.
    #[serde(default = "default_zone")]
    pub zone: String,
}

fn default_zone() -> String {
    "absolute".to_string()
}

/// NDJSON file per feed; a feed left out contributes nothing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedsConfig {
    pub cumulative: Option<PathBuf>,
    pub interval_import: Option<PathBuf>,
    pub interval_export: Option<PathBuf>,
    pub epochs: Option<PathBuf>,
    pub import_tariffs: Option<PathBuf>,
    pub export_tariffs: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub window: WindowConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("RECONCILE_CONFIG").unwrap_or_else(|_| "reconcile-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }

    pub fn window(&self) -> anyhow::Result<(Window, ZoneMode)> {
        let zone: ZoneMode = self
            .window
            .zone
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid window.zone: {e}"))?;
        let window = Window::new(self.window.start, self.window.end)
            .map_err(|e| anyhow::anyhow!("invalid window: {e}"))?;
        Ok((window, zone))
    }
}
