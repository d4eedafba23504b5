//! Loads `config.json` from the working directory.

use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;

use crate::error::Result;
use crate::model::{ChannelId, GuildId};

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub host: String,
    pub cdn_host: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeChannelPair {
    pub discord_channel_id: ChannelId,
    pub spacebar_channel_id: ChannelId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub dir_path: String,
    #[serde(default)]
    pub postgresql_host: String,
    #[serde(default)]
    pub postgresql_user: String,
    #[serde(default)]
    pub postgresql_password: String,
    pub cleanup_days: i64,
    pub pair_lifetime_days: i64,
}

impl DatabaseConfig {
    pub fn uses_postgresql(&self) -> bool {
        !self.postgresql_host.is_empty()
    }

    /// Discord-side and Spacebar-side connection strings, per §6: two
    /// SQLite files when no postgres host is configured, otherwise two
    /// fixed postgres database names on the same host/credentials.
    pub fn connection_urls(&self) -> (String, String) {
        if self.uses_postgresql() {
            let base = format!("postgres://{}:{}@{}", self.postgresql_user, self.postgresql_password, self.postgresql_host);
            (format!("{base}/bridge_discord_msgs"), format!("{base}/bridge_spacebar_msgs"))
        } else {
            (
                format!("sqlite://{}/discord.db?mode=rwc", self.dir_path),
                format!("sqlite://{}/spacebar.db?mode=rwc", self.dir_path),
            )
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discord: BackendConfig,
    pub spacebar: BackendConfig,
    pub discord_guild_id: GuildId,
    pub spacebar_guild_id: GuildId,
    pub bridges: Vec<BridgeChannelPair>,
    #[serde(default)]
    pub custom_status: Option<String>,
    #[serde(default)]
    pub custom_status_emoji: Option<Value>,
    pub database: DatabaseConfig,
}

impl Config {
    pub fn load(path: &str) -> Result<Config> {
        let file = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_connection_urls_when_postgresql_host_is_empty() {
        let db = DatabaseConfig {
            dir_path: "/data".into(),
            postgresql_host: String::new(),
            postgresql_user: String::new(),
            postgresql_password: String::new(),
            cleanup_days: 1,
            pair_lifetime_days: 7,
        };
        let (discord, spacebar) = db.connection_urls();
        assert!(discord.contains("/data/discord.db"));
        assert!(spacebar.contains("/data/spacebar.db"));
    }

    #[test]
    fn postgresql_connection_urls_when_host_is_set() {
        let db = DatabaseConfig {
            dir_path: String::new(),
            postgresql_host: "db.internal".into(),
            postgresql_user: "bridge".into(),
            postgresql_password: "hunter2".into(),
            cleanup_days: 1,
            pair_lifetime_days: 7,
        };
        let (discord, spacebar) = db.connection_urls();
        assert!(discord.ends_with("/bridge_discord_msgs"));
        assert!(spacebar.ends_with("/bridge_spacebar_msgs"));
    }
}
