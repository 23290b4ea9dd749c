use std::path::{Path, PathBuf};
use std::time::Duration;

use presence_client::ClientConfig;
use presence_core::AttentionPolicy;
use presence_hw::FacingMode;
use presence_live::LiveConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Client configuration: `PRESENCE_*` environment variables over an
/// optional TOML file over built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the verification service.
    pub api_base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Live tick interval in milliseconds.
    pub interval_ms: u64,
    /// Delay before the first live tick in milliseconds.
    pub first_tick_ms: u64,
    pub facing: FacingMode,
    /// Device tried first, e.g. /dev/video2.
    pub camera_device: Option<String>,
    /// Mirror frames before upload so they match the preview.
    pub mirror: bool,
    /// Request emotion, gaze and face box on each live tick; off uses /match/stream.
    pub live_analysis: bool,
    /// Count ticks without a face as looking away.
    pub count_missing_as_away: bool,
}

/// Same keys as [`Config`], all optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
    interval_ms: Option<u64>,
    first_tick_ms: Option<u64>,
    facing: Option<String>,
    camera_device: Option<String>,
    mirror: Option<bool>,
    live_analysis: Option<bool>,
    count_missing_as_away: Option<bool>,
}

impl Config {
    /// Load configuration from `PRESENCE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::layered(FileConfig::default(), |key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), with `path` supplying the fallbacks.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::from_env());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(Self::layered(file, |key| std::env::var(key).ok()))
    }

    fn layered(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let facing = match env("PRESENCE_FACING").or(file.facing) {
            Some(raw) => raw.parse::<FacingMode>().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring PRESENCE_FACING");
                FacingMode::User
            }),
            None => FacingMode::User,
        };

        Self {
            api_base_url: env("PRESENCE_API_BASE_URL")
                .or(file.api_base_url)
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            timeout_secs: env_parse(env("PRESENCE_TIMEOUT_SECS"), file.timeout_secs, 15),
            interval_ms: env_parse(env("PRESENCE_INTERVAL_MS"), file.interval_ms, 2000),
            first_tick_ms: env_parse(env("PRESENCE_FIRST_TICK_MS"), file.first_tick_ms, 250),
            facing,
            camera_device: env("PRESENCE_CAMERA_DEVICE")
                .or(file.camera_device)
                .filter(|d| !d.is_empty()),
            mirror: env_flag(env("PRESENCE_MIRROR"), file.mirror, true),
            live_analysis: env_flag(env("PRESENCE_LIVE_ANALYSIS"), file.live_analysis, true),
            count_missing_as_away: env_flag(
                env("PRESENCE_COUNT_MISSING_AS_AWAY"),
                file.count_missing_as_away,
                false,
            ),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn live_config(&self) -> LiveConfig {
        LiveConfig {
            interval: Duration::from_millis(self.interval_ms),
            first_tick_delay: Duration::from_millis(self.first_tick_ms),
            facing: self.facing,
            preferred_device: self.camera_device.clone(),
            mirror: self.mirror,
            analysis: self.live_analysis,
            attention: if self.count_missing_as_away {
                AttentionPolicy::CountMissingAsAway
            } else {
                AttentionPolicy::GazeOnly
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(value: Option<String>, file: Option<T>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).or(file).unwrap_or(default)
}

fn env_flag(value: Option<String>, file: Option<bool>, default: bool) -> bool {
    value
        .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
        .or(file)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::layered(FileConfig::default(), env(&[]));
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.interval_ms, 2000);
        assert_eq!(config.first_tick_ms, 250);
        assert_eq!(config.facing, FacingMode::User);
        assert!(config.camera_device.is_none());
        assert!(config.mirror);
        assert!(config.live_analysis);
        assert!(!config.count_missing_as_away);
        assert_eq!(config.live_config().attention, AttentionPolicy::GazeOnly);
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            api_base_url = "http://attendance.local:9000"
            interval_ms = 3000
            facing = "environment"
            mirror = false
            live_analysis = false
            "#,
        )
        .unwrap();
        let config = Config::layered(
            file,
            env(&[
                ("PRESENCE_INTERVAL_MS", "1500"),
                ("PRESENCE_COUNT_MISSING_AS_AWAY", "1"),
                ("PRESENCE_CAMERA_DEVICE", "/dev/video2"),
            ]),
        );

        assert_eq!(config.api_base_url, "http://attendance.local:9000");
        assert_eq!(config.interval_ms, 1500);
        assert_eq!(config.facing, FacingMode::Environment);
        assert!(!config.mirror);

        let live = config.live_config();
        assert_eq!(live.interval, Duration::from_millis(1500));
        assert_eq!(live.preferred_device.as_deref(), Some("/dev/video2"));
        assert_eq!(live.attention, AttentionPolicy::CountMissingAsAway);
        assert!(!live.analysis);
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = Config::layered(
            FileConfig::default(),
            env(&[("PRESENCE_TIMEOUT_SECS", "soon"), ("PRESENCE_FACING", "sideways")]),
        );
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.facing, FacingMode::User);
        assert_eq!(config.client_config().timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_unknown_file_key_is_rejected() {
        assert!(toml::from_str::<FileConfig>("threshold = 0.4").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/presence.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
