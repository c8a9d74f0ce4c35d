use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_OPTIONS_PATH: &str = "/data/options.json";

fn options_path() -> PathBuf {
    if let Ok(path) = std::env::var("CLIMAX2MQTT_OPTIONS_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from(DEFAULT_OPTIONS_PATH)
}

/// Add-on style options file. Values only apply when the matching env var is
/// unset.
#[derive(Debug, Clone, Default, Deserialize)]
struct OptionsOverrides {
    #[serde(default)]
    climax_baseurl: Option<String>,
    #[serde(default)]
    climax_username: Option<String>,
    #[serde(default)]
    climax_password: Option<String>,
    #[serde(default)]
    poll_interval_seconds: Option<u64>,
    #[serde(default)]
    prune_missing_devices: Option<bool>,
    #[serde(default)]
    mqtt_server: Option<String>,
    #[serde(default)]
    mqtt_port: Option<u16>,
    #[serde(default)]
    mqtt_username: Option<String>,
    #[serde(default)]
    mqtt_password: Option<String>,
}

fn load_options_overrides() -> Option<OptionsOverrides> {
    let path = options_path();
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "climax2mqtt failed to read options file; using env defaults"
            );
            return None;
        }
    };
    match parse_options(contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "climax2mqtt failed to parse options file; using env defaults"
            );
            None
        }
    }
}

fn parse_options(contents: String) -> Result<OptionsOverrides, simd_json::Error> {
    let mut bytes = contents.into_bytes();
    simd_json::serde::from_slice(&mut bytes)
}

fn env_set(key: &str) -> bool {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .is_some()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

fn apply_options_overrides(
    config: &mut Config,
    overrides: &OptionsOverrides,
    env_allows: impl Fn(&str) -> bool,
) {
    if env_allows("CLIMAX_BASE_URL") {
        if let Some(url) = non_empty(overrides.climax_baseurl.as_deref()) {
            config.panel_base_url = url;
        }
    }
    if env_allows("CLIMAX_USERNAME") {
        if let Some(username) = non_empty(overrides.climax_username.as_deref()) {
            config.panel_username = username;
        }
    }
    if env_allows("CLIMAX_PASSWORD") {
        if let Some(password) = non_empty(overrides.climax_password.as_deref()) {
            config.panel_password = password;
        }
    }
    if env_allows("CLIMAX_POLL_INTERVAL_MS") {
        if let Some(secs) = overrides.poll_interval_seconds.filter(|v| *v != 0) {
            config.poll_interval_ms = secs.saturating_mul(1000);
        }
    }
    if env_allows("CLIMAX_PRUNE_MISSING") {
        if let Some(value) = overrides.prune_missing_devices {
            config.prune_missing_devices = value;
        }
    }
    if env_allows("MQTT_HOST") {
        if let Some(host) = non_empty(overrides.mqtt_server.as_deref()) {
            config.mqtt_host = host;
        }
    }
    if env_allows("MQTT_PORT") {
        if let Some(port) = overrides.mqtt_port.filter(|v| *v != 0) {
            config.mqtt_port = port;
        }
    }
    if env_allows("MQTT_USERNAME") {
        if let Some(username) = overrides.mqtt_username.as_deref() {
            config.mqtt_username = non_empty(Some(username));
        }
    }
    if env_allows("MQTT_PASSWORD") {
        if let Some(password) = overrides.mqtt_password.as_deref() {
            config.mqtt_password = non_empty(Some(password));
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub panel_base_url: String,
    pub panel_username: String,
    pub panel_password: String,
    pub panel_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub prune_missing_devices: bool,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_client_id: String,
    pub mqtt_keepalive_secs: u64,
    pub mqtt_topic_prefix: String,
    pub mqtt_discovery_prefix: String,
    pub otlp_endpoint: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("panel_base_url", &self.panel_base_url)
            .field("panel_username", &self.panel_username)
            .field("panel_password", &"<redacted>")
            .field("panel_timeout_ms", &self.panel_timeout_ms)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("prune_missing_devices", &self.prune_missing_devices)
            .field("mqtt_host", &self.mqtt_host)
            .field("mqtt_port", &self.mqtt_port)
            .field("mqtt_username", &self.mqtt_username)
            .field(
                "mqtt_password",
                &self.mqtt_password.as_ref().map(|_| "<redacted>"),
            )
            .field("mqtt_client_id", &self.mqtt_client_id)
            .field("mqtt_keepalive_secs", &self.mqtt_keepalive_secs)
            .field("mqtt_topic_prefix", &self.mqtt_topic_prefix)
            .field("mqtt_discovery_prefix", &self.mqtt_discovery_prefix)
            .field("otlp_endpoint", &self.otlp_endpoint)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let options = load_options_overrides();

        let mut config = Self::from_env_only();
        if let Some(overrides) = options.as_ref() {
            apply_options_overrides(&mut config, overrides, |key| !env_set(key));
        }
        config.validate()?;
        Ok(config)
    }

    fn from_env_only() -> Self {
        let panel_base_url = env::var("CLIMAX_BASE_URL")
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        let panel_username = env::var("CLIMAX_USERNAME")
            .ok()
            .and_then(|v| non_empty(Some(v.as_str())))
            .unwrap_or_else(|| "admin".to_string());
        let panel_password = env::var("CLIMAX_PASSWORD")
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        let panel_timeout_ms = env::var("CLIMAX_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(10_000);
        let poll_interval_ms = env::var("CLIMAX_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v != 0)
            .unwrap_or(10_000);
        let prune_missing_devices = env::var("CLIMAX_PRUNE_MISSING")
            .map(|v| v.trim() == "1" || v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let mqtt_host = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = env::var("MQTT_PORT")
            .ok()
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(1883);
        let mqtt_username = env::var("MQTT_USERNAME").ok().and_then(|v| non_empty(Some(v.as_str())));
        let mqtt_password = env::var("MQTT_PASSWORD").ok().and_then(|v| non_empty(Some(v.as_str())));
        let mqtt_client_id = env::var("MQTT_CLIENT_ID")
            .unwrap_or_else(|_| format!("climax2mqtt-{}", std::process::id()));
        let mqtt_keepalive_secs = env::var("MQTT_KEEPALIVE_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(30);
        let mqtt_topic_prefix =
            env::var("MQTT_TOPIC_PREFIX").unwrap_or_else(|_| "climax2mqtt".to_string());
        let mqtt_discovery_prefix =
            env::var("MQTT_DISCOVERY_PREFIX").unwrap_or_else(|_| "homeassistant".to_string());
        let otlp_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .and_then(|v| non_empty(Some(v.as_str())));

        Self {
            panel_base_url,
            panel_username,
            panel_password,
            panel_timeout_ms,
            poll_interval_ms,
            prune_missing_devices,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_client_id,
            mqtt_keepalive_secs,
            mqtt_topic_prefix,
            mqtt_discovery_prefix,
            otlp_endpoint,
        }
    }

    fn validate(&self) -> Result<()> {
        non_empty(Some(self.panel_base_url.as_str()))
            .context("CLIMAX_BASE_URL is required (or climax_baseurl in the options file)")?;
        non_empty(Some(self.panel_password.as_str()))
            .context("CLIMAX_PASSWORD is required (or climax_password in the options file)")?;
        Ok(())
    }

    pub fn panel_timeout(&self) -> Duration {
        Duration::from_millis(self.panel_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn mqtt_keepalive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keepalive_secs)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        panel_base_url: "http://panel.local".to_string(),
        panel_username: "admin".to_string(),
        panel_password: "secret".to_string(),
        panel_timeout_ms: 1_000,
        poll_interval_ms: 10_000,
        prune_missing_devices: false,
        mqtt_host: "127.0.0.1".to_string(),
        mqtt_port: 1883,
        mqtt_username: None,
        mqtt_password: None,
        mqtt_client_id: "climax2mqtt-test".to_string(),
        mqtt_keepalive_secs: 30,
        mqtt_topic_prefix: "climax2mqtt".to_string(),
        mqtt_discovery_prefix: "homeassistant".to_string(),
        otlp_endpoint: None,
    }
}
