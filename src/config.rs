//! Relay configuration.
//!
//! Settings come from the process environment, optionally seeded from a
//! `.env` file. Every value except the drone identity and API endpoint has a
//! default matching a stock bus installation.

use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::bus::{ModuleInfo, UdpBusConfig};
use crate::{RelayError, Result};

/// Where bus traffic is acquired from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Own the listen port and register with the communicator
    #[default]
    Bus,
    /// Passively capture traffic addressed to the listen port
    Sniff,
}

impl FromStr for DataSource {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bus" | "databus" | "udp" => Ok(Self::Bus),
            "sniff" | "sniffer" | "capture" => Ok(Self::Sniff),
            other => Err(RelayError::configuration(format!(
                "DATA_SOURCE must be 'bus' or 'sniff', got '{other}'"
            ))),
        }
    }
}

/// Full relay configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub drone_id: String,
    pub api_url: String,
    pub api_key: String,
    /// Target send rate in Hz
    pub send_hz: f64,
    #[serde(with = "seconds")]
    pub http_timeout: Duration,
    /// Base delay for exponential backoff
    #[serde(with = "seconds")]
    pub offline_backoff: Duration,
    pub log_level: String,
    pub source: DataSource,

    pub comm_host: String,
    pub comm_port: u16,
    pub listen_host: String,
    pub listen_port: u16,
    pub module_name: String,
    pub message_filter: Vec<i64>,
    pub max_packet_size: usize,

    pub sniff_interface: String,
    /// Captured port; falls back to `listen_port`
    pub sniff_port: Option<u16>,
    #[serde(with = "seconds")]
    pub sniff_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            drone_id: String::new(),
            api_url: String::new(),
            api_key: String::new(),
            send_hz: 3.0,
            http_timeout: Duration::from_secs(3),
            offline_backoff: Duration::from_secs(1),
            log_level: "info".to_string(),
            source: DataSource::Bus,
            comm_host: "127.0.0.1".to_string(),
            comm_port: 60000,
            listen_host: "0.0.0.0".to_string(),
            listen_port: 61233,
            module_name: "WX_TELEMETRY_SENDER".to_string(),
            message_filter: vec![1002, 1003, 1036, 9102],
            max_packet_size: 8192,
            sniff_interface: "lo".to_string(),
            sniff_port: None,
            sniff_timeout: Duration::from_secs(1),
        }
    }
}

/// Lowest send rate honoured; anything below is clamped
const MIN_SEND_HZ: f64 = 0.1;

impl RelayConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(RelayError::configuration(format!("failed to load .env: {e}"))),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, then validate
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(v) = get("DRONE_ID") {
            config.drone_id = v;
        }
        if let Some(v) = get("API_URL") {
            config.api_url = v;
        }
        if let Some(v) = get("API_KEY") {
            config.api_key = v;
        }
        if let Some(v) = get("SEND_HZ") {
            config.send_hz = parse_number("SEND_HZ", &v)?;
        }
        if let Some(v) = get("HTTP_TIMEOUT_SECONDS") {
            config.http_timeout = parse_seconds("HTTP_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = get("OFFLINE_BACKOFF_SECONDS") {
            config.offline_backoff = parse_seconds("OFFLINE_BACKOFF_SECONDS", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            config.log_level = v.to_ascii_lowercase();
        }
        if let Some(v) = get("DATA_SOURCE") {
            config.source = v.parse()?;
        }
        if let Some(v) = get("DE_COMM_HOST") {
            config.comm_host = v;
        }
        if let Some(v) = get("DE_COMM_PORT") {
            config.comm_port = parse_number("DE_COMM_PORT", &v)?;
        }
        if let Some(v) = get("DE_LISTEN_HOST") {
            config.listen_host = v;
        }
        if let Some(v) = get("DE_LISTEN_PORT") {
            config.listen_port = parse_number("DE_LISTEN_PORT", &v)?;
        }
        if let Some(v) = get("DE_MODULE_NAME") {
            config.module_name = v;
        }
        if let Some(v) = get("DE_SUBSCRIPTIONS") {
            config.message_filter = parse_code_list(&v)?;
        }
        if let Some(v) = get("SNIFF_INTERFACE") {
            config.sniff_interface = v;
        }
        if let Some(v) = get("SNIFF_PORT") {
            config.sniff_port = Some(parse_number("SNIFF_PORT", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the relay cannot start with
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("DRONE_ID", &self.drone_id),
            ("API_URL", &self.api_url),
            ("API_KEY", &self.api_key),
        ] {
            if value.trim().is_empty() {
                return Err(RelayError::configuration(format!("{name} is required")));
            }
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(RelayError::configuration(format!(
                "API_URL must be an http(s) URL, got '{}'",
                self.api_url
            )));
        }
        if !self.send_hz.is_finite() {
            return Err(RelayError::configuration("SEND_HZ must be a finite number"));
        }
        if self.max_packet_size == 0 {
            return Err(RelayError::configuration("max packet size must be positive"));
        }
        Ok(())
    }

    /// Pause after a successful send: `1 / max(0.1, send_hz)`
    pub fn send_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.send_hz.max(MIN_SEND_HZ))
    }

    /// Port watched in sniff mode
    pub fn sniff_port(&self) -> u16 {
        self.sniff_port.unwrap_or(self.listen_port)
    }

    /// Socket settings for the UDP bus client
    pub fn udp_bus_config(&self) -> UdpBusConfig {
        UdpBusConfig {
            comm_addr: format!("{}:{}", self.comm_host, self.comm_port),
            listen_addr: format!("{}:{}", self.listen_host, self.listen_port),
            max_packet_size: self.max_packet_size,
            ..UdpBusConfig::default()
        }
    }

    /// Identity announced on the bus
    pub fn module_info(&self) -> ModuleInfo {
        ModuleInfo::telemetry_receiver(self.module_name.clone())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| RelayError::configuration(format!("{key} is not a valid number: '{value}'")))
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration> {
    let secs: f64 = parse_number(key, value)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| RelayError::configuration(format!("{key} must be a non-negative duration")))
}

fn parse_code_list(value: &str) -> Result<Vec<i64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_number("DE_SUBSCRIPTIONS", part))
        .collect()
}

/// Durations written as (fractional) seconds
mod seconds {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
