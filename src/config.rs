// Configuration loading.
// Reads an optional JSON config file and applies environment overrides.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CampusPayError, Result};

/// Environment variable holding the wallet session token.
pub const SESSION_ENV: &str = "CAMPUSPAY_SESSION";
const GITHUB_API_URL_ENV: &str = "CAMPUSPAY_GITHUB_API_URL";
const PAYUTC_API_URL_ENV: &str = "CAMPUSPAY_PAYUTC_API_URL";
const CHANGELOG_URL: &str =
    "https://raw.githubusercontent.com/simde-utc/campus-pay/master/changelog/";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub payutc: PayUtcConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// REST API root.
    pub api_url: String,
    /// Web root used for repository links.
    pub web_url: String,
    /// `owner/name` of the app repository.
    pub repo: String,
    /// Prefix of the per-language changelog assets.
    pub changelog_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com/".to_string(),
            web_url: "https://github.com/".to_string(),
            repo: "simde-utc/campus-pay".to_string(),
            changelog_url: CHANGELOG_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayUtcConfig {
    pub api_url: String,
    pub system_id: String,
}

impl Default for PayUtcConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.nemopay.net/services/".to_string(),
            system_id: "payutc".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("campuspay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Search order:
    /// 1. Explicit path if provided (must exist)
    /// 2. `<config dir>/campuspay/config.json`
    /// 3. Built-in defaults
    ///
    /// Environment overrides are applied last.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(p) if p.exists() => Some(p.to_path_buf()),
            Some(p) => {
                return Err(CampusPayError::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            None => default_path().filter(|p| p.exists()),
        };

        let mut config = match path {
            Some(p) => Self::load_from_path(&p)?,
            None => {
                debug!("no config file, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            CampusPayError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Override API roots from the environment.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(GITHUB_API_URL_ENV) {
            self.github.api_url = url;
        }
        if let Some(url) = var(PAYUTC_API_URL_ENV) {
            self.payutc.api_url = url;
        }
    }

    /// Session token for the wallet API, if one was handed over.
    pub fn session_token() -> Option<String> {
        std::env::var(SESSION_ENV).ok().filter(|t| !t.is_empty())
    }
}

/// Default config file location (~/.config/campuspay/config.json on Linux).
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "campuspay").map(|dirs| dirs.config_dir().join("config.json"))
}
