use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lib_common::twitch::apicall::KRAKEN_BASE_URL;

const DEFAULT_CONFIG_FILE: &str = "server_chatters.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Twitch chatter presence tracker", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "WS_SERVICE", help = "Backend WebSocket URL the viewers frames are pushed to.")]
    pub ws_service: Option<String>,

    #[clap(long, env = "CLIENT_ID", help = "Twitch API client id.")]
    pub client_id: Option<String>,

    #[clap(long, env = "CHATTERS_URL", help = "Chatter list URL of the tracked channel.")]
    pub chatters_url: Option<String>,

    #[clap(long, env = "WEBSERVICE_URL", help = "Analytics endpoint receiving chatters and stream data.")]
    pub webservice_url: Option<String>,

    #[clap(long, env = "CHANNEL_ID", help = "Numeric Twitch channel id.")]
    pub channel_id: Option<String>,

    #[clap(long, env = "CHANNEL_NAME", help = "Channel display name used in log messages.")]
    pub channel_name: Option<String>,

    #[clap(long, env = "TWITCH_API_URL", help = "Base URL of the Twitch v5 API.")]
    pub twitch_api_url: Option<String>,

    #[clap(long, env = "TELEMETRY_URL", help = "Collector URL for error telemetry. Disabled when unset.")]
    pub telemetry_url: Option<String>,

    #[clap(long, env = "POLL_INTERVAL_SECONDS", help = "Seconds between poll cycle starts.")]
    pub poll_interval_seconds: Option<u64>,

    #[clap(long, env = "RECONNECT_DELAY_MS", help = "Delay in milliseconds before reconnecting the backend link.")]
    pub reconnect_delay_ms: Option<u64>,

    #[clap(long, env = "HTTP_TIMEOUT_SECONDS", help = "Timeout in seconds for every HTTP request.")]
    pub http_timeout_seconds: Option<u64>,

    #[clap(long, env = "HTTP_MAX_RETRIES", help = "Retries for transient failures of upstream GET requests (default 0). Each attempt may take the full HTTP timeout, so keep retries x timeout well under the poll interval.")]
    pub http_max_retries: Option<u32>,

    #[clap(long, env = "CHATTERS_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "CHATTERS_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "CHATTERS_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            ws_service: other.ws_service.or(self.ws_service),
            client_id: other.client_id.or(self.client_id),
            chatters_url: other.chatters_url.or(self.chatters_url),
            webservice_url: other.webservice_url.or(self.webservice_url),
            channel_id: other.channel_id.or(self.channel_id),
            channel_name: other.channel_name.or(self.channel_name),
            twitch_api_url: other.twitch_api_url.or(self.twitch_api_url),
            telemetry_url: other.telemetry_url.or(self.telemetry_url),
            poll_interval_seconds: other.poll_interval_seconds.or(self.poll_interval_seconds),
            reconnect_delay_ms: other.reconnect_delay_ms.or(self.reconnect_delay_ms),
            http_timeout_seconds: other.http_timeout_seconds.or(self.http_timeout_seconds),
            http_max_retries: other.http_max_retries.or(self.http_max_retries),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    fn defaults() -> Config {
        Config {
            channel_name: Some("ShokzTV".to_string()),
            twitch_api_url: Some(KRAKEN_BASE_URL.to_string()),
            poll_interval_seconds: Some(90),
            reconnect_delay_ms: Some(2500),
            http_timeout_seconds: Some(30),
            http_max_retries: Some(0),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }
}

/// Fully resolved startup settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ws_service: String,
    pub client_id: String,
    pub chatters_url: String,
    pub webservice_url: String,
    pub channel_id: String,
    pub channel_name: String,
    pub twitch_api_url: String,
    pub telemetry_url: Option<String>,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub http_timeout: Duration,
    pub http_max_retries: u32,
    pub log_dir: PathBuf,
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to load config file {path}: {reason}")]
    File { path: PathBuf, reason: String },
}

/// Defaults, then the JSON config file, then environment and CLI.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(Config::parse())
}

pub fn load_config_from(cli: Config) -> Result<Settings, ConfigError> {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path)? {
        current_config = current_config.merge(file_config);
    }
    current_config = current_config.merge(cli);

    resolve(current_config)
}

/// A missing file is not an error; an unreadable or malformed one is.
fn read_config_file(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let file_error = |reason: String| ConfigError::File {
        path: path.to_path_buf(),
        reason,
    };
    let config_str = fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
    let file_config = serde_json::from_str::<Config>(&config_str).map_err(|e| file_error(e.to_string()))?;
    Ok(Some(file_config))
}

fn resolve(config: Config) -> Result<Settings, ConfigError> {
    let mut missing = Vec::new();
    let mut required = |value: Option<String>, key: &'static str| {
        let value = value.filter(|v| !v.trim().is_empty());
        if value.is_none() {
            missing.push(key);
        }
        value.unwrap_or_default()
    };

    let ws_service = required(config.ws_service, "WS_SERVICE");
    let client_id = required(config.client_id, "CLIENT_ID");
    let chatters_url = required(config.chatters_url, "CHATTERS_URL");
    let webservice_url = required(config.webservice_url, "WEBSERVICE_URL");
    let channel_id = required(config.channel_id, "CHANNEL_ID");

    if !missing.is_empty() {
        return Err(ConfigError::Missing(missing));
    }

    let poll_interval_seconds = config.poll_interval_seconds.unwrap_or(90);
    if poll_interval_seconds == 0 {
        return Err(ConfigError::Invalid {
            key: "POLL_INTERVAL_SECONDS",
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(Settings {
        ws_service,
        client_id,
        chatters_url,
        webservice_url,
        channel_id,
        channel_name: config.channel_name.unwrap_or_else(|| "ShokzTV".to_string()),
        twitch_api_url: config.twitch_api_url.unwrap_or_else(|| KRAKEN_BASE_URL.to_string()),
        telemetry_url: config.telemetry_url.filter(|v| !v.trim().is_empty()),
        poll_interval: Duration::from_secs(poll_interval_seconds),
        reconnect_delay: Duration::from_millis(config.reconnect_delay_ms.unwrap_or(2500)),
        http_timeout: Duration::from_secs(config.http_timeout_seconds.unwrap_or(30)),
        http_max_retries: config.http_max_retries.unwrap_or(0),
        log_dir: config.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
        log_level: config.log_level.unwrap_or_else(|| "info".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn required_only() -> Config {
        Config {
            ws_service: Some("ws://backend.test/ws".into()),
            client_id: Some("abc123".into()),
            chatters_url: Some("https://tmi.test/group/user/shokztv/chatters".into()),
            webservice_url: Some("https://analytics.test/chatters".into()),
            channel_id: Some("23366709".into()),
            config_path: Some(PathBuf::from("/nonexistent/server_chatters.conf")),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let settings = load_config_from(required_only()).unwrap();

        assert_eq!(settings.channel_name, "ShokzTV");
        assert_eq!(settings.twitch_api_url, KRAKEN_BASE_URL);
        assert_eq!(settings.poll_interval, Duration::from_secs(90));
        assert_eq!(settings.reconnect_delay, Duration::from_millis(2500));
        assert_eq!(settings.http_timeout, Duration::from_secs(30));
        assert_eq!(settings.http_max_retries, 0);
        assert_eq!(settings.telemetry_url, None);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn missing_keys_are_all_named() {
        let cli = Config {
            ws_service: Some("ws://backend.test/ws".into()),
            client_id: Some("   ".into()),
            config_path: Some(PathBuf::from("/nonexistent/server_chatters.conf")),
            ..Default::default()
        };

        let err = load_config_from(cli).unwrap_err();
        let ConfigError::Missing(keys) = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(keys, &["CLIENT_ID", "CHATTERS_URL", "WEBSERVICE_URL", "CHANNEL_ID"]);
        assert!(err.to_string().contains("CHATTERS_URL"));
    }

    #[test]
    fn file_values_sit_between_defaults_and_cli() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"channelName": "FromFile", "pollIntervalSeconds": 60, "channelId": "111"}}"#
        )
        .unwrap();

        let cli = Config {
            channel_id: Some("222".into()),
            config_path: Some(file.path().to_path_buf()),
            ..required_only()
        };
        let settings = load_config_from(cli).unwrap();

        assert_eq!(settings.channel_name, "FromFile");
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
        assert_eq!(settings.channel_id, "222");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            ..required_only()
        };
        assert!(matches!(load_config_from(cli), Err(ConfigError::File { .. })));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let cli = Config {
            poll_interval_seconds: Some(0),
            ..required_only()
        };
        assert!(matches!(
            load_config_from(cli),
            Err(ConfigError::Invalid { key: "POLL_INTERVAL_SECONDS", .. })
        ));
    }

    #[test]
    fn cli_flags_parse() {
        let cli = Config::try_parse_from([
            "server_chatters",
            "--channel-id",
            "999",
            "--poll-interval-seconds",
            "15",
        ])
        .unwrap();
        assert_eq!(cli.channel_id.as_deref(), Some("999"));
        assert_eq!(cli.poll_interval_seconds, Some(15));
    }
}
