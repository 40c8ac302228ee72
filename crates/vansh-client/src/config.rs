//! Client configuration.
//!
//! Resolution order, highest first:
//! 1. command-line overrides
//! 2. environment variables (`VANSH_*`, usually loaded from `.env`)
//! 3. TOML config file (`~/.config/vansh/config.toml` or `--config`)
//! 4. compiled defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use vansh_core::ConflictPolicy;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone)]
pub struct Config {
    /// Backend origin, without a trailing slash.
    pub api_url: String,
    /// Socket.IO endpoint; derived from `api_url` when unset.
    pub push_url: Option<String>,
    pub session_file: PathBuf,
    pub request_timeout: Duration,
    /// Consecutive failed reconnects before the push channel gives up.
    pub reconnect_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub conflict_policy: ConflictPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            push_url: None,
            session_file: default_session_file(),
            request_timeout: Duration::from_secs(30),
            reconnect_attempts: 8,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub push_url: Option<String>,
    pub session_file: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub conflict_policy: Option<ConflictPolicy>,
}

/// On-disk config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub push_url: Option<String>,
    pub session_file: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
    pub reconnect_attempts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_cap_ms: Option<u64>,
    pub conflict_policy: Option<String>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }
}

impl Config {
    /// Resolve from the process environment and the default file locations.
    pub fn load(overrides: Overrides) -> Result<Self, ConfigError> {
        let file = match &overrides.config_file {
            Some(path) => Some(FileConfig::from_path(path)?),
            None => match default_config_file() {
                Some(path) if path.exists() => Some(FileConfig::from_path(&path)?),
                _ => None,
            },
        };
        Self::resolve(overrides, |key| std::env::var(key).ok(), file)
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve(
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
        file: Option<FileConfig>,
    ) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let mut config = Self::default();

        if let Some(url) = overrides
            .api_url
            .or_else(|| env("VANSH_API_URL"))
            .or(file.api_url)
        {
            config.api_url = normalize_url("api_url", &url)?;
        }
        if let Some(url) = overrides
            .push_url
            .or_else(|| env("VANSH_PUSH_URL"))
            .or(file.push_url)
        {
            config.push_url = Some(normalize_url("push_url", &url)?);
        }
        if let Some(path) = overrides
            .session_file
            .or_else(|| env("VANSH_SESSION_FILE").map(PathBuf::from))
            .or(file.session_file)
        {
            config.session_file = path;
        }

        if let Some(secs) = parsed(&env, "VANSH_TIMEOUT")?.or(file.request_timeout_secs) {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parsed(&env, "VANSH_RECONNECT_ATTEMPTS")?.or(file.reconnect_attempts) {
            config.reconnect_attempts = n;
        }
        if let Some(ms) = parsed(&env, "VANSH_BACKOFF_BASE_MS")?.or(file.backoff_base_ms) {
            config.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed(&env, "VANSH_BACKOFF_CAP_MS")?.or(file.backoff_cap_ms) {
            config.backoff_cap = Duration::from_millis(ms);
        }
        if config.backoff_cap < config.backoff_base {
            config.backoff_cap = config.backoff_base;
        }

        let policy = match overrides.conflict_policy {
            Some(p) => Some(p),
            None => match env("VANSH_CONFLICT_POLICY").or(file.conflict_policy) {
                Some(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid {
                    key: "conflict_policy",
                    value: raw,
                })?),
                None => None,
            },
        };
        if let Some(p) = policy {
            config.conflict_policy = p;
        }

        Ok(config)
    }

    /// WebSocket URL of the Socket.IO endpoint.
    pub fn socket_url(&self) -> String {
        let origin = self.push_url.as_deref().unwrap_or(&self.api_url);
        let ws = if let Some(rest) = origin.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = origin.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            origin.to_string()
        };
        if ws.contains("/socket.io") {
            ws
        } else {
            format!("{ws}/socket.io/?EIO=4&transport=websocket")
        }
    }
}

fn parsed<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(None),
    }
}

fn normalize_url(key: &'static str, raw: &str) -> Result<String, ConfigError> {
    let url = raw.trim().trim_end_matches('/');
    let known = ["http://", "https://", "ws://", "wss://"];
    if !known.iter().any(|scheme| url.starts_with(scheme)) {
        return Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        });
    }
    Ok(url.to_string())
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("vansh"))
        .unwrap_or_else(|| PathBuf::from(".vansh"))
}

pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vansh").join("config.toml"))
}

pub fn default_session_file() -> PathBuf {
    config_dir().join("session.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_any_source() {
        let config = Config::resolve(Overrides::default(), env_of(&[]), None).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.conflict_policy, ConflictPolicy::LastWriteWins);
        assert_eq!(
            config.socket_url(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn flags_beat_env_beat_file() {
        let file: FileConfig = toml::from_str(
            r#"
            api_url = "https://file.example"
            reconnect_attempts = 3
            conflict_policy = "reject-stale"
            "#,
        )
        .unwrap();
        let env = env_of(&[
            ("VANSH_API_URL", "https://env.example/"),
            ("VANSH_RECONNECT_ATTEMPTS", "5"),
        ]);

        let config = Config::resolve(Overrides::default(), &env, Some(file)).unwrap();
        assert_eq!(config.api_url, "https://env.example");
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.conflict_policy, ConflictPolicy::RejectStale);
        assert_eq!(
            config.socket_url(),
            "wss://env.example/socket.io/?EIO=4&transport=websocket"
        );

        let overrides = Overrides {
            api_url: Some("http://flag.example".into()),
            conflict_policy: Some(ConflictPolicy::LastWriteWins),
            ..Default::default()
        };
        let config = Config::resolve(overrides, &env, None).unwrap();
        assert_eq!(config.api_url, "http://flag.example");
        assert_eq!(config.conflict_policy, ConflictPolicy::LastWriteWins);
    }

    #[test]
    fn bad_values_are_reported() {
        let err = Config::resolve(
            Overrides::default(),
            env_of(&[("VANSH_TIMEOUT", "soon")]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "VANSH_TIMEOUT", .. }));

        let err = Config::resolve(
            Overrides {
                api_url: Some("localhost:5000".into()),
                ..Default::default()
            },
            env_of(&[]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "api_url", .. }));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("colour = \"blue\"").is_err());
    }

    #[test]
    fn explicit_push_url_is_used_verbatim_when_complete() {
        let config = Config::resolve(
            Overrides {
                push_url: Some("wss://push.example/socket.io/?EIO=4&transport=websocket".into()),
                ..Default::default()
            },
            env_of(&[]),
            None,
        )
        .unwrap();
        assert_eq!(
            config.socket_url(),
            "wss://push.example/socket.io/?EIO=4&transport=websocket"
        );
    }
}
