use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{EventEnvelope, MarketError, MarketOrder, Marketplace};
use crate::config::MarketplaceConfig;

/// HTTP bridge in front of the marketplace account.
pub struct Gateway {
    client: reqwest::Client,
    base_url: String,
    token: String,
    poll_timeout: u64,
}

impl Gateway {
    pub fn new(config: &MarketplaceConfig) -> Result<Self, MarketError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout + 30))
            .build()
            .map_err(|e| MarketError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
            token: config.token.clone(),
            poll_timeout: config.poll_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: Response, what: &str) -> Result<Response, MarketError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(MarketError::NotFound(what.to_owned())),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(MarketError::Status(status.as_u16(), text))
            }
        }
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, MarketError> {
        response
            .json()
            .await
            .map_err(|e| MarketError::Transport(format!("malformed response: {e}")))
    }
}

#[async_trait]
impl Marketplace for Gateway {
    async fn order(&self, id: &str) -> Result<MarketOrder, MarketError> {
        let path = format!("/orders/{}", urlencoding::encode(id));
        let response = self
            .client
            .get(self.url(&path))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::json(Self::check(response, &format!("order {}", id)).await?).await
    }

    async fn send_message(&self, chat: &str, text: &str) -> Result<(), MarketError> {
        let path = format!("/chats/{}/messages", urlencoding::encode(chat));
        let response = self
            .client
            .post(self.url(&path))
            .bearer_auth(&self.token)
            .json(&json!({ "text": text }))
            .send()
            .await?;

        Self::check(response, &format!("chat {}", chat)).await?;
        debug!("Message sent to chat {}", chat);
        Ok(())
    }

    async fn refund(&self, id: &str) -> Result<(), MarketError> {
        let path = format!("/orders/{}/refund", urlencoding::encode(id));
        let response = self
            .client
            .post(self.url(&path))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::check(response, &format!("order {}", id)).await?;
        Ok(())
    }

    async fn set_lots_active(&self, lots: &[String], active: bool) -> Result<usize, MarketError> {
        let response = self
            .client
            .post(self.url("/lots/active"))
            .bearer_auth(&self.token)
            .json(&json!({ "lots": lots, "active": active }))
            .send()
            .await?;

        let body: serde_json::Value = Self::json(Self::check(response, "lots").await?).await?;
        Ok(body.get("updated").and_then(|v| v.as_u64()).unwrap_or(0) as usize)
    }

    async fn events(&self, after: u64) -> Result<Vec<EventEnvelope>, MarketError> {
        let response = self
            .client
            .get(self.url("/events"))
            .bearer_auth(&self.token)
            .query(&[("after", after), ("timeout", self.poll_timeout)])
            .send()
            .await?;

        Self::json(Self::check(response, "events").await?).await
    }
}
