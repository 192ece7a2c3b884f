use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info, warn};

const ENV_API_URL: &str = "GANTRY_API_URL";
const ENV_API_TOKEN: &str = "GANTRY_API_TOKEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            timeout_secs: 30,
            token: None,
        }
    }
}

impl GatewayConfig {
    pub fn load(path_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Self::default();

        let path = match path_override {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path(),
        };

        match path {
            Some(path) if path.exists() => {
                info!(config = %path.display(), "loading gateway config");
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("failed reading {}", path.display()))?;
                cfg = toml::from_str(&text)
                    .with_context(|| format!("failed parsing {}", path.display()))?;
            }
            Some(path) => {
                debug!(config = %path.display(), "no config file, using defaults");
            }
            None => {
                warn!("no config directory resolved, using defaults");
            }
        }

        cfg.apply_overrides(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_API_TOKEN).ok(),
        );
        Ok(cfg)
    }

    pub fn apply_overrides(&mut self, base_url: Option<String>, token: Option<String>) {
        if let Some(url) = base_url {
            debug!(url = %url, "applying base url override");
            self.base_url = url;
        }
        if let Some(token) = token {
            debug!("applying token override");
            self.token = Some(token);
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gantry").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::GatewayConfig;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg: GatewayConfig = toml::from_str("base_url = \"https://tasks.example\"")
            .expect("parse config");
        assert_eq!(cfg.base_url, "https://tasks.example");
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.token, None);
    }

    #[test]
    fn overrides_beat_file_values() {
        let mut cfg: GatewayConfig =
            toml::from_str("base_url = \"https://tasks.example\"\ntoken = \"from-file\"")
                .expect("parse config");
        cfg.apply_overrides(
            Some("https://staging.example".to_string()),
            Some("from-env".to_string()),
        );
        assert_eq!(cfg.base_url, "https://staging.example");
        assert_eq!(cfg.token.as_deref(), Some("from-env"));
    }
}
