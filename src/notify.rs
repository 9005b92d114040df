use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use log::{debug, error};
use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
    utils::html::escape,
};

use crate::{entries::prelude::*, marketplace::Links, warehouse::SharedWarehouse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Success,
    Error,
    Refund,
    Balance,
}

impl ReportKind {
    fn icon(&self) -> &'static str {
        match self {
            ReportKind::Success => "✅",
            ReportKind::Error => "🔔",
            ReportKind::Refund => "💸",
            ReportKind::Balance => "💰",
        }
    }

    pub fn enabled_in(&self, types: &NotificationTypes) -> bool {
        match self {
            ReportKind::Success => types.success,
            ReportKind::Error => types.error,
            ReportKind::Refund => types.refund,
            ReportKind::Balance => types.balance,
        }
    }
}

/// Operator-facing notice about one order or the vendor account.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub kind: ReportKind,
    pub title: String,
    pub order_id: Option<OrderId>,
    pub buyer: Option<(BuyerId, String)>,
    pub fields: Vec<(String, String)>,
}

impl Report {
    pub fn new(kind: ReportKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            order_id: None,
            buyer: None,
            fields: vec![],
        }
    }

    pub fn order(mut self, order_id: &str) -> Self {
        self.order_id = Some(order_id.to_owned());
        self
    }

    pub fn buyer(mut self, id: BuyerId, username: &str) -> Self {
        self.buyer = Some((id, username.to_owned()));
        self
    }

    pub fn field(mut self, name: &str, value: impl ToString) -> Self {
        self.fields.push((name.to_owned(), value.to_string()));
        self
    }

    pub fn to_html(&self, links: &Links) -> String {
        let mut text = format!("<b>{} {}</b>\n\n", self.kind.icon(), escape(&self.title));

        if let Some(order_id) = &self.order_id {
            text.push_str(&format!(
                "<b>L Order:</b> <a href=\"{}\">#{}</a>\n",
                links.order(order_id),
                escape(order_id)
            ));
        }
        if let Some((_, username)) = &self.buyer {
            text.push_str(&format!("<b>L Buyer:</b> <code>{}</code>\n", escape(username)));
        }
        for (name, value) in &self.fields {
            text.push_str(&format!(
                "<b>L {}:</b> <code>{}</code>\n",
                escape(name),
                escape(value)
            ));
        }

        text.push_str(&format!(
            "\n<b>• Date:</b> <code>{}</code>",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        text
    }

    fn keyboard(&self, links: &Links) -> Option<InlineKeyboardMarkup> {
        let mut row = vec![];

        if let Some(order_id) = &self.order_id {
            if let Ok(url) = reqwest::Url::parse(&links.order(order_id)) {
                row.push(InlineKeyboardButton::url("💙 Order", url));
            }
        }
        if let Some((buyer_id, _)) = &self.buyer {
            if let Ok(url) = reqwest::Url::parse(&links.user(*buyer_id)) {
                row.push(InlineKeyboardButton::url("💙 Buyer", url));
            }
        }

        (!row.is_empty()).then(|| InlineKeyboardMarkup::new(vec![row]))
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `report` on a best-effort basis; failures are only logged.
    async fn notify(&self, report: Report);
}

pub type SharedNotifier = Arc<dyn Notifier>;

pub struct TelegramNotifier {
    bot: Bot,
    warehouse: SharedWarehouse,
    links: Links,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, warehouse: SharedWarehouse, links: Links) -> Self {
        Self {
            bot,
            warehouse,
            links,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, report: Report) {
        let settings = self.warehouse.settings().await;

        if !settings.notifications_enabled || !report.kind.enabled_in(&settings.notification_types) {
            debug!("{:?} report muted: {}", report.kind, report.title);
            return;
        }

        let text = report.to_html(&self.links);
        let keyboard = report.keyboard(&self.links);

        for chat in settings.notification_chats {
            let mut request = self
                .bot
                .send_message(ChatId(chat), text.clone())
                .parse_mode(ParseMode::Html);
            if let Some(keyboard) = keyboard.clone() {
                request = request.reply_markup(keyboard);
            }

            if let Err(e) = request.await {
                error!("Unable to notify chat {}: {}", chat, e);
            }
        }
    }
}
