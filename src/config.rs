//! Layered application configuration.
//!
//! Precedence, lowest first: built-in defaults, the TOML file
//! (`jobwatch.toml` unless `--config` names another), `JOBWATCH_*`
//! environment variables, then command-line flags.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::detail::{ApplyPolicy, ReconnectPolicy, SessionOptions};

pub const DEFAULT_CONFIG_FILE: &str = "jobwatch.toml";
pub const ENV_PREFIX: &str = "JOBWATCH_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend address for `watch`/`show`, listen address for `serve`.
    pub rpc_addr: SocketAddr,
    pub verbose: bool,
    pub json_logs: bool,
    /// Log destination. The terminal view always logs to a file.
    pub log_file: Option<PathBuf>,
    pub fetch_timeout_ms: Option<u64>,
    pub cancel_timeout_ms: Option<u64>,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// Unset means reconnect forever.
    pub reconnect_max_attempts: Option<u32>,
    pub apply_policy: ApplyPolicy,
    /// Tick of the simulated pipeline behind `serve`.
    pub pipeline_tick_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_addr: SocketAddr::from(([127, 0, 0, 1], 7373)),
            verbose: false,
            json_logs: false,
            log_file: None,
            fetch_timeout_ms: Some(10_000),
            cancel_timeout_ms: Some(10_000),
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
            reconnect_max_attempts: Some(10),
            apply_policy: ApplyPolicy::LatestCompleted,
            pipeline_tick_ms: 1_000,
        }
    }
}

impl AppConfig {
    /// Load configuration, layering `overrides` (typically CLI flags with
    /// unset values skipped) on top of file and environment.
    pub fn load(file: Option<&Path>, overrides: impl Serialize) -> Result<Self> {
        let path = file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        if file.is_some() && !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }

        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides))
            .extract()
            .context("Invalid configuration")
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            apply_policy: self.apply_policy,
            fetch_timeout: self.fetch_timeout_ms.map(Duration::from_millis),
            cancel_timeout: self.cancel_timeout_ms.map(Duration::from_millis),
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(self.reconnect_initial_ms),
                max_delay: Duration::from_millis(self.reconnect_max_ms),
                max_attempts: self.reconnect_max_attempts,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobwatch.toml");
        std::fs::write(
            &path,
            r#"
rpc_addr = "127.0.0.1:9000"
apply_policy = "latest_issued"
reconnect_max_attempts = 3
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path), json!({})).unwrap();

        assert_eq!(config.rpc_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.apply_policy, ApplyPolicy::LatestIssued);
        assert_eq!(config.reconnect_max_attempts, Some(3));
        assert_eq!(config.reconnect_initial_ms, 500);
    }

    #[test]
    fn overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "verbose = false\nrpc_addr = \"127.0.0.1:9000\"\n").unwrap();

        let config =
            AppConfig::load(Some(&path), json!({ "verbose": true, "rpc_addr": "127.0.0.1:9100" }))
                .unwrap();

        assert!(config.verbose);
        assert_eq!(config.rpc_addr.port(), 9100);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(AppConfig::load(Some(&path), json!({})).is_err());
    }

    #[test]
    fn session_options_follow_config() {
        let config = AppConfig {
            fetch_timeout_ms: None,
            reconnect_initial_ms: 50,
            ..AppConfig::default()
        };
        let options = config.session_options();

        assert_eq!(options.fetch_timeout, None);
        assert_eq!(options.reconnect.initial_delay, Duration::from_millis(50));
        assert_eq!(options.apply_policy, ApplyPolicy::LatestCompleted);
    }
}
