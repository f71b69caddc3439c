// Engine and client configuration.
//
// Global config: `~/.folio/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Root directory for folio state: `~/.folio/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".folio"))
}

/// Path to the global config file: `~/.folio/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Default location of the local draft cache: `~/.folio/cache.db`.
pub fn default_cache_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("cache.db"))
}

// ── Top-level config ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FolioConfig {
    /// Local cache database override.
    pub cache_path: Option<PathBuf>,
    pub engine: EngineConfig,
    pub remote: RemoteConfig,
}

impl FolioConfig {
    /// Load from `~/.folio/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_path.clone().or_else(default_cache_path)
    }
}

/// Remote store endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the document API (e.g. `https://blog.example/api`).
    pub base_url: Option<String>,
    /// Bearer token sent with every request.
    pub token: Option<String>,
}

// ── Engine timing ──────────────────────────────────────────────────

/// Timing knobs for the autosave engine. All durations are milliseconds on
/// disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Local save debounce window.
    pub local_debounce_ms: u64,
    /// A save requested this soon after the previous local save uses the
    /// burst window instead of the base window.
    pub recent_save_window_ms: u64,
    pub burst_debounce_ms: u64,
    /// Quiet period after the last local save before a remote write.
    pub idle_delay_ms: u64,
    /// Safety-net reconcile cadence.
    pub reconcile_interval_ms: u64,
    /// The reconciler forces a write once the last successful remote write is
    /// older than `staleness_factor × idle_delay`.
    pub staleness_factor: u32,
    /// Reconciler retry backoff after consecutive remote failures.
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_debounce_ms: 1_000,
            recent_save_window_ms: 2_000,
            burst_debounce_ms: 3_000,
            idle_delay_ms: 30_000,
            reconcile_interval_ms: 10_000,
            staleness_factor: 3,
            retry_base_ms: 1_000,
            retry_max_ms: 60_000,
        }
    }
}

impl EngineConfig {
    pub fn local_debounce(&self) -> Duration {
        Duration::from_millis(self.local_debounce_ms)
    }

    pub fn recent_save_window(&self) -> Duration {
        Duration::from_millis(self.recent_save_window_ms)
    }

    pub fn burst_debounce(&self) -> Duration {
        Duration::from_millis(self.burst_debounce_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    /// Never zero: a zero period would spin the session loop.
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms.max(1))
    }

    pub fn staleness_bound(&self) -> Duration {
        self.idle_delay().saturating_mul(self.staleness_factor.max(1))
    }

    /// Capped exponential backoff for the given consecutive failure count.
    pub fn retry_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exp = (failures - 1).min(16);
        let delay_ms = self.retry_base_ms.saturating_mul(1u64 << exp).min(self.retry_max_ms);
        Duration::from_millis(delay_ms)
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn engine_defaults_match_documented_timings() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.local_debounce(), Duration::from_secs(1));
        assert_eq!(cfg.recent_save_window(), Duration::from_secs(2));
        assert_eq!(cfg.burst_debounce(), Duration::from_secs(3));
        assert_eq!(cfg.idle_delay(), Duration::from_secs(30));
        assert_eq!(cfg.reconcile_interval(), Duration::from_secs(10));
        assert_eq!(cfg.staleness_bound(), Duration::from_secs(90));
    }

    #[test]
    fn retry_delay_doubles_then_caps() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.retry_delay(0), Duration::ZERO);
        assert_eq!(cfg.retry_delay(1), Duration::from_secs(1));
        assert_eq!(cfg.retry_delay(2), Duration::from_secs(2));
        assert_eq!(cfg.retry_delay(4), Duration::from_secs(8));
        assert_eq!(cfg.retry_delay(7), Duration::from_secs(60));
        assert_eq!(cfg.retry_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let cfg = EngineConfig { reconcile_interval_ms: 0, staleness_factor: 0, ..Default::default() };
        assert_eq!(cfg.reconcile_interval(), Duration::from_millis(1));
        assert_eq!(cfg.staleness_bound(), cfg.idle_delay());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: FolioConfig = toml::from_str(
            r#"
            [engine]
            idle_delay_ms = 5000

            [remote]
            base_url = "https://blog.example/api"
            "#,
        )
        .expect("config should parse");

        assert_eq!(cfg.engine.idle_delay(), Duration::from_secs(5));
        assert_eq!(cfg.engine.local_debounce_ms, 1_000);
        assert_eq!(cfg.remote.base_url.as_deref(), Some("https://blog.example/api"));
        assert!(cfg.remote.token.is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = TempDir::new().expect("tempdir should be created");
        let path = tmp.path().join("nested").join("config.toml");

        let mut cfg = FolioConfig::default();
        cfg.engine.reconcile_interval_ms = 2_500;
        cfg.remote.token = Some("secret".into());
        cfg.cache_path = Some(tmp.path().join("cache.db"));
        cfg.save_to(&path).expect("config should save");

        let loaded = FolioConfig::load_from(&path).expect("config should load");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.cache_path(), Some(tmp.path().join("cache.db")));
    }

    #[test]
    fn load_from_missing_file_is_io_error() {
        let tmp = TempDir::new().expect("tempdir should be created");
        let err = FolioConfig::load_from(&tmp.path().join("absent.toml"))
            .expect_err("missing file should fail");
        assert!(matches!(err, ConfigError::Io(_)));
        assert!(err.to_string().starts_with("config I/O error"));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let tmp = TempDir::new().expect("tempdir should be created");
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[engine\nidle_delay_ms = ").expect("write should succeed");
        assert!(matches!(FolioConfig::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
