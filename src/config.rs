use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Server configuration, read from a JSON file.
///
/// Every field has a default so a missing file can be replaced by a freshly
/// written one on first run. The generated handshake secret is persisted with
/// the defaults so agents keep working across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// TLS listen address for agent sessions.
    #[serde(default = "default_server_ip")]
    pub server_ip: String,

    /// Shared handshake secret agents must present.
    #[serde(default = "generate_password")]
    pub password: String,

    /// Scheduler tick period in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Reply timeout for repository requests, in seconds.
    #[serde(default = "default_nats_delay")]
    pub nats_delay: u64,

    /// Change-feed broker address.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Log file name pattern; `%date%` expands to the current date.
    #[serde(default = "default_log_syntax")]
    pub log_syntax: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_cert_file")]
    pub cert_file: String,

    #[serde(default = "default_key_file")]
    pub key_file: String,

    #[serde(default)]
    pub notifications: Notifications,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notifications {
    pub sms: Option<SmsGateway>,
    pub email: Option<EmailGateway>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsGateway {
    #[serde(default = "default_sms_gateway")]
    pub gateway_url: String,
    pub token: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailGateway {
    pub gateway_url: String,
    pub from: String,
    pub recipients: Vec<String>,
}

fn default_server_ip() -> String {
    "127.0.0.1:4444".into()
}

fn default_interval() -> u64 {
    600
}

fn default_nats_delay() -> u64 {
    10
}

fn default_nats_url() -> String {
    "nats://127.0.0.1:4222".into()
}

fn default_log_dir() -> String {
    "./logs".into()
}

fn default_log_syntax() -> String {
    "%date%_server.log".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_cert_file() -> String {
    "server.crt".into()
}

fn default_key_file() -> String {
    "server.key".into()
}

fn default_sms_gateway() -> String {
    "https://gatewayapi.com/rest/mtsms".into()
}

/// Generate a random 32-byte secret, base64 encoded.
fn generate_password() -> String {
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_str("{}").expect("defaults always deserialize")
    }
}

/// Read the config file, or write a default one if it does not exist.
pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    if !Path::new(path).exists() {
        debug!("config file not found, saving default");
        let config = Config::default();
        std::fs::write(path, serde_json::to_string_pretty(&config)?)?;
        return Ok(config);
    }

    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config: &Config| trace!("loaded config: {config:?}"))
}
