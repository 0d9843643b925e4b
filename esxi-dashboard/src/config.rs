//! Configuration management with secure storage
//!
//! Handles:
//! - Orchestrator API location and request timeout
//! - Auto-refresh cadence and job history window
//! - Remembered admin credentials (password kept in the OS keyring)
//! - Default values for the orchestrator settings form

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{JobWindow, Settings, SETTING_AUTO_PHASE2_WINDOW, SETTING_REBOOT_GRACE_PERIOD};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const KEYRING_SERVICE: &str = "esxi-dashboard";
const CONFIG_ENV: &str = "ESXI_DASHBOARD_CONFIG";
const API_URL_ENV: &str = "ESXI_API_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default = "default_settings")]
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    /// Job history window in hours; absent means all jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_window_hours: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub remember: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip)] // Never serialize passwords
    pub cached_password: Option<String>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            job_window_hours: None,
        }
    }
}

fn default_settings() -> Settings {
    [
        (SETTING_AUTO_PHASE2_WINDOW.to_string(), "10".to_string()),
        (SETTING_REBOOT_GRACE_PERIOD.to_string(), "2".to_string()),
    ]
    .into()
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                request_timeout_secs: None,
            },
            refresh: RefreshConfig::default(),
            credentials: CredentialsConfig::default(),
            settings: default_settings(),
        }
    }
}

impl DashboardConfig {
    /// Loads from `path`, `$ESXI_DASHBOARD_CONFIG` or the OS config dir.
    /// A missing file yields the defaults. `$ESXI_API_URL` wins over the
    /// file's base URL.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path)?;

        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let mut config: DashboardConfig = toml::from_str(&content)
                .with_context(|| format!("Invalid config file {}", config_path.display()))?;

            // Load password from secure keyring if enabled
            if config.credentials.remember {
                if let Some(username) = &config.credentials.username {
                    config.credentials.cached_password = load_password(username)
                        .map_err(|e| debug!("no remembered password for {}: {}", username, e))
                        .ok();
                }
            }
            config
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api.base_url = url.trim().to_string();
            }
        }

        Ok(config)
    }

    /// Writes the file (without the password) and syncs the keyring
    pub async fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = Self::resolve_path(path)?;

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(&config_path, content)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;

        if self.credentials.remember {
            if let (Some(username), Some(password)) = (
                &self.credentials.username,
                &self.credentials.cached_password,
            ) {
                save_password(username, password)?;
            }
        }

        Ok(())
    }

    /// OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("esxi-dashboard");
        path.push("config.toml");
        Ok(path)
    }

    fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
        match path {
            Some(path) => Ok(path.to_path_buf()),
            None => match std::env::var(CONFIG_ENV) {
                Ok(path) if !path.is_empty() => Ok(PathBuf::from(path)),
                _ => Self::config_file_path(),
            },
        }
    }

    pub fn is_first_time_setup(path: Option<&Path>) -> bool {
        Self::resolve_path(path).map(|p| !p.exists()).unwrap_or(true)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.api.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.interval_secs.max(1))
    }

    pub fn job_window(&self) -> JobWindow {
        JobWindow::from_hours(self.refresh.job_window_hours)
    }

    /// Remembered username and password, when both are available
    pub fn remembered_login(&self) -> Option<(&str, &str)> {
        if !self.credentials.remember {
            return None;
        }
        Some((
            self.credentials.username.as_deref()?,
            self.credentials.cached_password.as_deref()?,
        ))
    }

    /// Drops a remembered password that the orchestrator rejected
    pub fn forget_password(&mut self) {
        if let Some(username) = &self.credentials.username {
            if let Err(e) = delete_password(username) {
                warn!("could not delete remembered password: {}", e);
            }
        }
        self.credentials.cached_password = None;
    }
}

/// Load password from secure OS keyring
fn load_password(username: &str) -> Result<String> {
    let entry = Entry::new(KEYRING_SERVICE, username)?;
    entry.get_password().map_err(Into::into)
}

/// Save password to secure OS keyring
fn save_password(username: &str, password: &str) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, username)?;
    entry.set_password(password).map_err(Into::into)
}

fn delete_password(username: &str) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, username)?;
    entry.delete_credential().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DashboardConfig::default();
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.refresh_interval(), Duration::from_secs(2));
        assert_eq!(config.job_window(), JobWindow::All);
        assert_eq!(config.settings[SETTING_AUTO_PHASE2_WINDOW], "10");
        assert_eq!(config.settings[SETTING_REBOOT_GRACE_PERIOD], "2");
        assert_eq!(config.remembered_login(), None);
    }

    #[test]
    fn test_config_file_path() {
        let path = DashboardConfig::config_file_path().unwrap();
        assert!(path.to_string_lossy().contains("esxi-dashboard"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_password_never_serialized() {
        let mut config = DashboardConfig::default();
        config.credentials = CredentialsConfig {
            remember: false,
            username: Some("admin".into()),
            cached_password: Some("VMware1!".into()),
        };
        let content = toml::to_string_pretty(&config).unwrap();
        assert!(content.contains("username = \"admin\""));
        assert!(!content.contains("VMware1!"));
    }

    #[tokio::test]
    async fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[api]\nbase_url = \"http://orchestrator:8000/api\"\nrequest_timeout_secs = 30\n\n[refresh]\ninterval_secs = 5\njob_window_hours = 48\n",
        )
        .unwrap();

        let config = DashboardConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.refresh_interval(), Duration::from_secs(5));
        assert_eq!(config.job_window(), JobWindow::Days(2));
        assert_eq!(config.settings, default_settings());
        assert!(!DashboardConfig::is_first_time_setup(Some(&path)));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert!(DashboardConfig::is_first_time_setup(Some(&path)));

        let mut config = DashboardConfig::default();
        config.refresh.job_window_hours = Some(168);
        config.settings.insert("custom".into(), "value".into());
        config.save(Some(&path)).await.unwrap();

        let loaded = DashboardConfig::load(Some(&path)).await.unwrap();
        assert_eq!(loaded.refresh, config.refresh);
        assert_eq!(loaded.settings, config.settings);
    }
}
