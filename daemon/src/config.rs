use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::store::discord::DEFAULT_API_BASE;

pub const DEFAULT_SERVER_HOST: &str = "localhost";
pub const DEFAULT_SERVER_PORT: u16 = 25565;
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;
/// Discord returns at most 100 messages per history page.
pub const MIN_RECOVERY_WINDOW: u8 = 1;
pub const MAX_RECOVERY_WINDOW: u8 = 100;
pub const DEFAULT_RECOVERY_WINDOW: u8 = 25;
pub const DEFAULT_ALERT_TTL_SECS: u64 = 60;
pub const DEFAULT_FOOTER: &str = "Minecraft Status Bot";

/// Environment variable holding the bot token. Never read from the config file.
pub const TOKEN_ENV: &str = "DISCORD_TOKEN";
pub const CHANNEL_ID_ENV: &str = "BEACON_CHANNEL_ID";
pub const ROLE_ID_ENV: &str = "BEACON_ROLE_ID";
pub const SERVER_HOST_ENV: &str = "BEACON_SERVER_HOST";

/// Root configuration structure. Deserialized from `beacon.toml`.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub notice: NoticeConfig,
}

/// The watched Minecraft server.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    /// Channel that holds the status notice. Required.
    #[serde(default)]
    pub channel_id: String,
    /// Role pinged on availability transitions. No ping when absent.
    pub role_id: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            role_id: None,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

/// Polling cadence and the timeouts of every external call.
#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Seconds between probes. Clamped to [1, 3600].
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
    /// How many recent channel messages are scanned on startup. Clamped to [1, 100].
    #[serde(default = "default_recovery_window")]
    pub recovery_window: u8,
    /// Probe right after recovery instead of waiting one full interval.
    #[serde(default = "default_true")]
    pub probe_on_startup: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            store_timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
            recovery_window: DEFAULT_RECOVERY_WINDOW,
            probe_on_startup: true,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.poll_interval_secs
                .clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS),
        )
    }

    /// Zero would make every probe fail instantly, so it falls back to the default.
    pub fn probe_timeout(&self) -> Duration {
        nonzero_secs(self.probe_timeout_secs, DEFAULT_PROBE_TIMEOUT_SECS)
    }

    pub fn store_timeout(&self) -> Duration {
        nonzero_secs(self.store_timeout_secs, DEFAULT_STORE_TIMEOUT_SECS)
    }

    pub fn effective_recovery_window(&self) -> u8 {
        self.recovery_window
            .clamp(MIN_RECOVERY_WINDOW, MAX_RECOVERY_WINDOW)
    }
}

/// How the transition ping is delivered.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertMode {
    /// The mention rides on the newly created notice.
    #[default]
    Inline,
    /// The notice is posted silently and a separate, short-lived mention follows.
    Separate,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    #[serde(default)]
    pub mode: AlertMode,
    /// Also ping when only the player count changed.
    #[serde(default)]
    pub on_player_change: bool,
    /// Lifetime of a separate alert message before it is deleted.
    #[serde(default = "default_alert_ttl")]
    pub ttl_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            mode: AlertMode::default(),
            on_player_change: false,
            ttl_secs: DEFAULT_ALERT_TTL_SECS,
        }
    }
}

impl AlertConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Cosmetic parts of the notice embed.
#[derive(Debug, Deserialize, Clone)]
pub struct NoticeConfig {
    #[serde(default = "default_footer")]
    pub footer: String,
    pub thumbnail_url: Option<String>,
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            footer: DEFAULT_FOOTER.to_string(),
            thumbnail_url: None,
        }
    }
}

impl Config {
    /// Applies `BEACON_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`; empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(channel) = lookup(CHANNEL_ID_ENV) {
            self.discord.channel_id = channel.trim().to_string();
        }
        if let Some(role) = lookup(ROLE_ID_ENV) {
            self.discord.role_id = Some(role.trim().to_string());
        }
        if let Some(host) = lookup(SERVER_HOST_ENV) {
            self.server.host = host.trim().to_string();
        }
    }

    /// Rejects configurations the daemon cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.discord.channel_id.is_empty() {
            bail!("discord.channel_id is not set (config file or {CHANNEL_ID_ENV})");
        }
        if !is_snowflake(&self.discord.channel_id) {
            bail!("discord.channel_id {:?} is not a Discord id", self.discord.channel_id);
        }
        if let Some(role) = self.role_id() {
            if !is_snowflake(role) {
                bail!("discord.role_id {role:?} is not a Discord id");
            }
        }
        if self.server.host.trim().is_empty() {
            bail!("server.host is empty");
        }
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        Ok(())
    }

    /// The configured role, treating an empty string as unset.
    pub fn role_id(&self) -> Option<&str> {
        self.discord.role_id.as_deref().filter(|r| !r.is_empty())
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Reads the bot token from [`TOKEN_ENV`].
pub fn discord_token() -> Result<String> {
    let token = std::env::var(TOKEN_ENV)
        .with_context(|| format!("{TOKEN_ENV} environment variable not set"))?;
    let token = token.trim();
    if token.is_empty() {
        bail!("{TOKEN_ENV} is empty");
    }
    Ok(token.to_string())
}

fn is_snowflake(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

fn nonzero_secs(secs: u64, fallback: u64) -> Duration {
    Duration::from_secs(if secs == 0 { fallback } else { secs })
}

fn default_server_host() -> String {
    DEFAULT_SERVER_HOST.to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_store_timeout() -> u64 {
    DEFAULT_STORE_TIMEOUT_SECS
}

fn default_recovery_window() -> u8 {
    DEFAULT_RECOVERY_WINDOW
}

fn default_alert_ttl() -> u64 {
    DEFAULT_ALERT_TTL_SECS
}

fn default_footer() -> String {
    DEFAULT_FOOTER.to_string()
}

fn default_true() -> bool {
    true
}
