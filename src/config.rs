use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

use device_check::ClientOptions;

#[derive(Clone, Debug, Deserialize)]
/// Runtime configuration loaded from `DEVICE_CHECK_*` environment variables.
pub struct Config {
    pub log_level: Option<String>,

    pub base_url: Option<String>,

    pub private_key_id: Option<String>,

    pub timeout_secs: Option<u64>,

    #[serde(default = "def_key_dir")]
    pub key_dir: PathBuf,
}

impl Config {
    /// Populates the configuration from environment variables, honoring `.env`.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let cfg: Self = envy::prefixed("DEVICE_CHECK_").from_env()?;
        Ok(cfg)
    }

    /// Emit the effective configuration via tracing.
    pub fn info(&self) {
        tracing::info!(
            base_url = ?self.base_url,
            key_dir = %self.key_dir.display(),
            private_key_id = ?self.private_key_id,
            timeout_secs = ?self.timeout_secs,
            "effective config"
        );
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.base_url.clone(),
            private_key_id: self.private_key_id.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

fn def_key_dir() -> PathBuf {
    PathBuf::from("keys")
}
