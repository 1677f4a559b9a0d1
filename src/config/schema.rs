use crate::error::ConfigError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Config {
    /// Load and validate a config file. Fatal problems (unreadable file,
    /// invalid TOML, missing required values) refuse to start the process.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| ConfigError::Load(format!("{}: {error}", path.display())))?;
        let config: Config =
            toml::from_str(&raw).map_err(|error| ConfigError::Load(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention.window_hours == 0 {
            return Err(ConfigError::Validation(
                "retention.window_hours must be greater than zero".into(),
            ));
        }
        if self.retention.message_capacity == 0 {
            return Err(ConfigError::Validation(
                "retention.message_capacity must be greater than zero".into(),
            ));
        }
        if self.notify.enabled {
            match self.notify.webhook_url.as_deref() {
                None | Some("") => {
                    return Err(ConfigError::Validation(
                        "notify.webhook_url is required while notify.enabled = true".into(),
                    ));
                }
                Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                    return Err(ConfigError::Validation(format!(
                        "notify.webhook_url must be an http(s) URL, got {url}"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

// ── Retention windows ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// How long snapshots and artifacts survive without a capture event.
    /// Matches the platform's deletion-eligibility window.
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,
    /// Bounded message-cache capacity; oldest-inserted entries are evicted.
    #[serde(default = "default_message_capacity")]
    pub message_capacity: usize,
    /// How long a revoke id stays marked as already handled.
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
    /// Revokes arriving this soon after connection readiness are replays.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// How often the reaper sweeps for expired entries.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_window_hours() -> u64 {
    68
}

fn default_message_capacity() -> usize {
    500
}

fn default_dedup_ttl_secs() -> u64 {
    60
}

fn default_grace_period_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            message_capacity: default_message_capacity(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            grace_period_secs: default_grace_period_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl RetentionConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_hours * 3600)
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// ── Storage layout ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Root data directory; `temp/`, `saved/` and `records.jsonl` live
    /// beneath it. Defaults to the platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Concrete storage paths derived from [`StorageConfig`].
#[derive(Debug, Clone)]
pub struct ResolvedStorage {
    pub temp_dir: PathBuf,
    pub saved_dir: PathBuf,
    pub records_path: PathBuf,
}

impl StorageConfig {
    pub fn resolve(&self) -> Result<ResolvedStorage, ConfigError> {
        let root = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => ProjectDirs::from("", "", "revenant")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| {
                    ConfigError::Validation(
                        "no home directory available; set storage.data_dir".into(),
                    )
                })?,
        };
        Ok(ResolvedStorage {
            temp_dir: root.join("temp"),
            saved_dir: root.join("saved"),
            records_path: root.join("records.jsonl"),
        })
    }
}

// ── Notification delivery ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Webhook endpoint for capture notifications. Required while enabled.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Per-call timeout for outbound webhook requests.
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_notify_timeout_secs() -> u64 {
    10
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            webhook_url: None,
            timeout_secs: default_notify_timeout_secs(),
        }
    }
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults_match_retention_constants() {
        let config = Config::default();
        assert_eq!(config.retention.window_hours, 68);
        assert_eq!(config.retention.message_capacity, 500);
        assert_eq!(config.retention.dedup_ttl_secs, 60);
        assert_eq!(config.retention.grace_period_secs, 30);
        assert_eq!(config.notify.timeout_secs, 10);
    }

    #[test]
    fn minimal_toml_parses_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [notify]
            webhook_url = "https://example.com/hook"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.retention.window_hours, 68);
        assert!(config.notify.enabled);
    }

    #[test]
    fn enabled_notify_without_url_refuses_to_start() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn disabled_notify_needs_no_url() {
        let config: Config = toml::from_str(
            r#"
            [notify]
            enabled = false
            "#,
        )
        .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn zero_window_is_rejected() {
        let config: Config = toml::from_str(
            r#"
            [retention]
            window_hours = 0
            [notify]
            enabled = false
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_http_webhook_url_is_rejected() {
        let config: Config = toml::from_str(
            r#"
            [notify]
            webhook_url = "ftp://example.com"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_data_dir_resolves_layout() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            data_dir = "/var/lib/revenant"
            [notify]
            enabled = false
            "#,
        )
        .unwrap();
        let storage = config.storage.resolve().unwrap();
        assert_eq!(storage.temp_dir, std::path::Path::new("/var/lib/revenant/temp"));
        assert_eq!(storage.saved_dir, std::path::Path::new("/var/lib/revenant/saved"));
        assert!(storage.records_path.ends_with("records.jsonl"));
    }
}
