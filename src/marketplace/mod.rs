pub mod gateway;

use std::{collections::HashMap, fmt::Display, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::engine::SharedEngine;
use crate::entries::prelude::*;

pub use gateway::Gateway;

const PUMP_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Paid,
    Closed,
    Refunded,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Closed | OrderStatus::Refunded)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MarketOrder {
    pub id: OrderId,
    pub buyer_id: BuyerId,
    pub buyer_username: String,
    pub chat_id: MarketChat,
    pub status: OrderStatus,
    pub description: String,
    /// Number of lot units bought.
    #[serde(default = "default_amount")]
    pub amount: u32,
    /// What the buyer paid.
    pub price: f64,
    #[serde(default)]
    pub currency: Option<Currency>,
    /// Amount the buyer entered in the order form, when the lot asks for one.
    #[serde(default)]
    pub quantity: Option<f64>,
    /// Remaining order form fields.
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

fn default_amount() -> u32 {
    1
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub chat_id: MarketChat,
    pub author_id: BuyerId,
    #[serde(default)]
    pub author: String,
    pub text: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    NewOrder { order: MarketOrder },
    NewMessage { message: ChatMessage },
    OrderStatusChanged { order_id: OrderId, status: OrderStatus },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub event: MarketEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarketError {
    NotFound(String),
    Status(u16, String),
    Transport(String),
}

impl Display for MarketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketError::NotFound(what) => write!(f, "not found: {}", what),
            MarketError::Status(code, text) => write!(f, "marketplace returned {}: {}", code, text),
            MarketError::Transport(e) => write!(f, "marketplace transport error: {}", e),
        }
    }
}

impl std::error::Error for MarketError {}

impl From<reqwest::Error> for MarketError {
    fn from(e: reqwest::Error) -> Self {
        MarketError::Transport(e.to_string())
    }
}

#[async_trait]
pub trait Marketplace: Send + Sync {
    async fn order(&self, id: &str) -> Result<MarketOrder, MarketError>;

    async fn send_message(&self, chat: &str, text: &str) -> Result<(), MarketError>;

    async fn refund(&self, id: &str) -> Result<(), MarketError>;

    /// Returns how many lots actually changed state.
    async fn set_lots_active(&self, lots: &[String], active: bool) -> Result<usize, MarketError>;

    /// Events newer than `after`, waiting up to the poll timeout for one.
    async fn events(&self, after: u64) -> Result<Vec<EventEnvelope>, MarketError>;
}

pub type SharedMarket = Arc<dyn Marketplace>;

/// Public pages of orders and users, built from `{id}` templates.
#[derive(Clone, Debug)]
pub struct Links {
    pub order_url: String,
    pub user_url: String,
}

impl Links {
    pub fn order(&self, id: &str) -> String {
        fill_id(&self.order_url, id)
    }

    pub fn user(&self, id: BuyerId) -> String {
        fill_id(&self.user_url, &id.to_string())
    }
}

impl Default for Links {
    fn default() -> Self {
        Self {
            order_url: "https://funpay.com/orders/{id}/".to_owned(),
            user_url: "https://funpay.com/users/{id}/".to_owned(),
        }
    }
}

fn fill_id(template: &str, id: &str) -> String {
    let vars = HashMap::from([("id".to_owned(), id.to_owned())]);
    strfmt::strfmt(template, &vars).unwrap_or_else(|_| template.replace("{id}", id))
}

/// Feeds marketplace events to the engine in arrival order until cancelled.
pub async fn pump(market: SharedMarket, engine: SharedEngine, cancel: CancellationToken) {
    let mut cursor = 0;
    info!("Event pump started");

    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => break,
            batch = market.events(cursor) => batch,
        };

        match batch {
            Ok(events) => {
                for envelope in events {
                    cursor = cursor.max(envelope.id);
                    debug!("Event #{}: {:?}", envelope.id, envelope.event);
                    engine.handle(envelope.event).await;
                }
            }
            Err(e) => {
                error!("Unable to fetch marketplace events: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(PUMP_RETRY_DELAY) => (),
                }
            }
        }
    }

    warn!("Event pump stopped at cursor {}", cursor);
}
