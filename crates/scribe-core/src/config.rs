//! Typed configuration structs consumed by the core (spec §6).
//!
//! Credential *acquisition* is out of scope — these structs are the
//! typed landing spot an external loader (config file + env) fills in,
//! mirroring how the teacher's `SkynetConfig::load` layers a TOML file
//! under `SCRIBE_*` environment overrides via `figment`.

use std::collections::BTreeMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

pub const DEFAULT_IDLE_RESTART_SECS: u64 = 25 * 60; // safety margin under Gmail's 29-minute IDLE limit
pub const DEFAULT_IMAP_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_SIGNAL_DAEMON_PORT: u16 = 7583;
pub const DEFAULT_SIGNAL_DAEMON_STARTUP_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_RECONNECT_BACKOFF_SECS: u64 = 1;
pub const DEFAULT_MESSAGE_TIMEOUT_SECS: u64 = 15;

/// Top-level config (`scribe.toml` + `SCRIBE_*` env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScribeConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub sms: Option<MobileBridgeConfig>,
    #[serde(default)]
    pub signal: Option<SignalConfig>,
    #[serde(default)]
    pub whatsapp: Option<WhatsAppConfig>,
    #[serde(default)]
    pub discord: Option<DiscordConfig>,
}

impl ScribeConfig {
    /// Load config from a TOML file with `SCRIBE_*` env var overrides.
    ///
    /// Checks, in order: an explicit path argument, then
    /// `~/.scribe/scribe.toml`. IMAP accounts are additionally
    /// discovered by prefix-scanning `IMAP_<PREFIX>_{HOST,USER,PASSWORD}`
    /// and merged into `email.accounts`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.map(String::from).unwrap_or_else(default_config_path);

        let mut config: ScribeConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SCRIBE_").split("_"))
            .extract()
            .map_err(|e| IngestError::Config(e.to_string()))?;

        for discovered in discover_imap_accounts_from_env(std::env::vars()) {
            if !config.email.accounts.iter().any(|a| a.label == discovered.label) {
                config.email.accounts.push(discovered);
            }
        }

        Ok(config)
    }
}

fn default_config_path() -> String {
    project_dir().join("scribe.toml").to_string_lossy().into_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub base_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { base_path: default_store_path() }
    }
}

fn default_store_path() -> String {
    project_dir().join("store").to_string_lossy().into_owned()
}

/// Per-user data directory used when no explicit path is configured
/// (spec §6 "Base storage path … default: a per-user data directory").
fn project_dir() -> std::path::PathBuf {
    directories::ProjectDirs::from("", "", "scribe")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from(".scribe"))
}

// ---------------------------------------------------------------------
// Email / IMAP
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub accounts: Vec<ImapAccountConfig>,
}

/// One IMAP account (spec §4.7, §6). `label` is the free-form key a
/// human picks (e.g. `personal`); it is never part of any derived ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImapAccountConfig {
    pub label: String,
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    #[serde(default = "default_imap_folder")]
    pub folder: String,
    #[serde(default = "default_imap_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_idle_restart")]
    pub idle_restart_secs: u64,
}

fn default_imap_port() -> u16 {
    993
}
fn default_imap_folder() -> String {
    "[Gmail]/All Mail".to_string()
}
fn default_imap_poll_interval() -> u64 {
    DEFAULT_IMAP_POLL_INTERVAL_SECS
}
fn default_idle_restart() -> u64 {
    DEFAULT_IDLE_RESTART_SECS
}

/// Scan `IMAP_<PREFIX>_{HOST,USER,PASSWORD}` environment keys and group
/// them by `<PREFIX>` into account configs (spec §6).
pub fn discover_imap_accounts_from_env<I>(vars: I) -> Vec<ImapAccountConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut fields: BTreeMap<String, (Option<String>, Option<String>, Option<String>)> = BTreeMap::new();

    for (key, value) in vars {
        let Some(rest) = key.strip_prefix("IMAP_") else { continue };
        let (prefix, field) = match rest.rsplit_once('_') {
            Some((p, f)) if !p.is_empty() => (p, f),
            _ => continue,
        };
        let entry = fields.entry(prefix.to_string()).or_default();
        match field {
            "HOST" => entry.0 = Some(value),
            "USER" => entry.1 = Some(value),
            "PASSWORD" => entry.2 = Some(value),
            _ => {}
        }
    }

    fields
        .into_iter()
        .filter_map(|(prefix, (host, user, password))| {
            let (host, user, password) = (host?, user?, password?);
            Some(ImapAccountConfig {
                label: prefix.to_lowercase(),
                host,
                port: default_imap_port(),
                user,
                password,
                folder: default_imap_folder(),
                poll_interval_secs: default_imap_poll_interval(),
                idle_restart_secs: default_idle_restart(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------
// SMS (mobile bridge over D-Bus)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileBridgeConfig {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default = "default_imap_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_message_timeout")]
    pub message_timeout_secs: u64,
    #[serde(default = "default_max_reconnect")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_secs: u64,
}

fn default_message_timeout() -> u64 {
    DEFAULT_MESSAGE_TIMEOUT_SECS
}
fn default_max_reconnect() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}
fn default_reconnect_backoff() -> u64 {
    DEFAULT_RECONNECT_BACKOFF_SECS
}

impl Default for MobileBridgeConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            poll_interval_secs: default_imap_poll_interval(),
            message_timeout_secs: default_message_timeout(),
            max_reconnect_attempts: default_max_reconnect(),
            reconnect_backoff_secs: default_reconnect_backoff(),
        }
    }
}

// ---------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub phone: String,
    #[serde(default = "default_daemon_host")]
    pub daemon_host: String,
    #[serde(default = "default_daemon_port")]
    pub daemon_port: u16,
    #[serde(default = "default_imap_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_secs: u64,
    #[serde(default = "bool_true")]
    pub prefer_daemon: bool,
    #[serde(default)]
    pub auto_start_daemon: bool,
    #[serde(default)]
    pub keep_daemon: bool,
    #[serde(default = "default_signal_cli_path")]
    pub cli_path: String,
}

fn default_daemon_host() -> String {
    "127.0.0.1".to_string()
}
fn default_daemon_port() -> u16 {
    DEFAULT_SIGNAL_DAEMON_PORT
}
fn default_receive_timeout() -> u64 {
    10
}
fn default_signal_cli_path() -> String {
    "signal-cli".to_string()
}
fn bool_true() -> bool {
    true
}

// ---------------------------------------------------------------------
// WhatsApp / Discord — opaque, provider-specific (spec §6: "core does
// not inspect"). We still give them a typed shell so the loader has
// somewhere concrete to land required fields.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Path to the persisted multi-device session (auth keys, device id).
    pub session_path: String,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub auth_token: String,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_imap_accounts_groups_by_prefix() {
        let vars = vec![
            ("IMAP_PERSONAL_HOST".to_string(), "imap.gmail.com".to_string()),
            ("IMAP_PERSONAL_USER".to_string(), "me@gmail.com".to_string()),
            ("IMAP_PERSONAL_PASSWORD".to_string(), "app-pass".to_string()),
            ("IMAP_WORK_HOST".to_string(), "imap.work.com".to_string()),
            ("UNRELATED".to_string(), "ignored".to_string()),
        ];
        let accounts = discover_imap_accounts_from_env(vars);
        assert_eq!(accounts.len(), 1, "WORK is missing user/password and must be dropped");
        assert_eq!(accounts[0].label, "personal");
        assert_eq!(accounts[0].host, "imap.gmail.com");
        assert_eq!(accounts[0].port, 993);
    }

    #[test]
    fn discover_imap_accounts_ignores_incomplete_prefixes() {
        let vars = vec![("IMAP_ONLY_HOST".to_string(), "h".to_string())];
        assert!(discover_imap_accounts_from_env(vars).is_empty());
    }
}
