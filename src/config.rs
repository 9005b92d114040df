use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Telegram user ids allowed to use the operator bot.
    #[serde(default)]
    pub operators: Vec<u64>,
}

#[derive(Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("storage")
}

#[derive(Deserialize, Clone)]
pub struct MarketplaceConfig {
    pub url: String,
    pub token: String,
    /// Our own account id; messages from it are never treated as buyer input.
    pub seller_id: i64,
    #[serde(default = "default_order_url")]
    pub order_url: String,
    #[serde(default = "default_user_url")]
    pub user_url: String,
    /// Long-poll timeout of the event feed, in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: u64,
}

fn default_order_url() -> String {
    "https://funpay.com/orders/{id}/".to_owned()
}

fn default_user_url() -> String {
    "https://funpay.com/users/{id}/".to_owned()
}

fn default_poll_timeout() -> u64 {
    25
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VendorConfig {
    /// Token vendor; credentials live in the runtime settings.
    NsGifts {
        #[serde(default)]
        url: Option<String>,
    },
    /// Standard SMM panel API (`?action=add|status|balance`).
    SmmPanel { url: String, key: String },
}

/// Timings of the order engine, all in seconds.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub reminder_delay: u64,
    pub wait_per_position: u64,
    pub balance_poll: u64,
    pub status_poll_base: u64,
    pub status_poll_max: u64,
    pub rate_limit_delay: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reminder_delay: 120,
            wait_per_position: 15,
            balance_poll: 300,
            status_poll_base: 300,
            status_poll_max: 3600,
            rate_limit_delay: 3600,
        }
    }
}

impl EngineConfig {
    pub fn reminder_delay(&self) -> Duration {
        Duration::from_secs(self.reminder_delay)
    }

    pub fn balance_poll(&self) -> Duration {
        Duration::from_secs(self.balance_poll)
    }
}

#[derive(Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub marketplace: MarketplaceConfig,
    pub vendor: VendorConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}
