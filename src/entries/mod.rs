pub mod currency;
pub mod serde_fn;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use currency::{Currency, CurrencyExt};

use crate::conversation::target::TargetKind;

pub mod prelude {
    pub use super::{
        BuyerId, Currency, CurrencyExt, LotMapping, MarketChat, NotificationTypes, OrderId,
        OrderRecord, RecordStatus, Settings, Templates,
    };
}

pub type OrderId = String;
pub type BuyerId = i64;
/// Marketplace chat identifier, opaque to us.
pub type MarketChat = String;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NotificationTypes {
    pub success: bool,
    pub error: bool,
    pub refund: bool,
    pub balance: bool,
}

impl Default for NotificationTypes {
    fn default() -> Self {
        Self {
            success: true,
            error: true,
            refund: true,
            balance: true,
        }
    }
}

/// Buyer-facing messages. Placeholders in braces are filled with `strfmt`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Templates {
    pub after_payment: String,
    pub confirm_prompt: String,
    pub target_cleared: String,
    pub rejected: String,
    pub queued: String,
    pub success: String,
    pub started: String,
    pub completed: String,
    pub reminder: String,
    pub denylisted: String,
    pub invalid_target: String,
    pub failure: String,
    pub refunded: String,
    pub out_of_bounds: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            after_payment: concat!(
                "❤️ Thank you for your purchase!\n\n",
                "Please send your {target_name} to receive {amount}."
            )
            .to_owned(),
            confirm_prompt: concat!(
                "• Please check the details:\n",
                "L {target_name}: {target}\n",
                "L Amount: {amount}\n\n",
                "• If everything is correct, send «+» without quotes\n",
                "L Or send a new {target_name}"
            )
            .to_owned(),
            target_cleared: "Okay, please send a new {target_name}.".to_owned(),
            rejected: "❌ {reason}\nL Please send a valid {target_name}.".to_owned(),
            queued: concat!(
                "⏳ Your order was added to the queue.\n",
                "L Your position: {position}.\n",
                "L Estimated wait: {wait} sec."
            )
            .to_owned(),
            success: concat!(
                "💙 Delivered!\n\n",
                "L {target_name}: {target}\n",
                "L Amount: {amount}\n",
                "L Completed at: {time}\n\n",
                "• Please confirm the order: {order_link}\n\n",
                "❤️ Don't forget to leave a review!"
            )
            .to_owned(),
            started: concat!(
                "🚀 Your order was accepted by the service.\n",
                "L Service order: {vendor_order}\n",
                "L {target_name}: {target}"
            )
            .to_owned(),
            completed: concat!(
                "🎉 Your order is complete!\n",
                "🔢 Service order: {vendor_order}\n",
                "🔗 Please confirm the order: {order_link}"
            )
            .to_owned(),
            reminder: concat!(
                "🔔 Reminder: please confirm the order, it is required!\n\n",
                "• Order link: {order_link}"
            )
            .to_owned(),
            denylisted: "❌ Your {target_name} is on the blacklist. Please wait for the seller."
                .to_owned(),
            invalid_target: concat!(
                "❌ The service could not find this {target_name}.\n",
                "L Please send a correct one."
            )
            .to_owned(),
            failure: "❌ An error occurred while processing your order.".to_owned(),
            refunded: concat!(
                "❌ The payment was returned because of an error.\n",
                "L Sorry for the inconvenience."
            )
            .to_owned(),
            out_of_bounds: "❌ Amount {amount} is outside the limits ({min} - {max}). The payment was returned."
                .to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub api_login: String,
    pub api_password: String,
    pub auto_refund_on_error: bool,
    pub notifications_enabled: bool,
    pub notification_types: NotificationTypes,
    pub confirmation_required: bool,
    pub confirmation_reminder: bool,
    pub order_verification_enabled: bool,
    pub deactivate_lots_on_insufficient_funds: bool,
    pub notification_chats: Vec<i64>,
    pub balance_threshold: f64,
    pub low_balance_notified: bool,
    /// Minimum order amount per currency code.
    pub min_amounts: BTreeMap<String, f64>,
    pub templates: Templates,
}

impl Default for Settings {
    fn default() -> Self {
        let min_amounts = [Currency::RUB, Currency::UAH, Currency::KZT]
            .iter()
            .filter_map(|c| c.default_min().map(|min| (c.code(), min)))
            .collect();

        Self {
            api_login: String::new(),
            api_password: String::new(),
            auto_refund_on_error: true,
            notifications_enabled: true,
            notification_types: NotificationTypes::default(),
            confirmation_required: true,
            confirmation_reminder: true,
            order_verification_enabled: true,
            deactivate_lots_on_insufficient_funds: true,
            notification_chats: vec![],
            balance_threshold: 5.0,
            low_balance_notified: false,
            min_amounts,
            templates: Templates::default(),
        }
    }
}

impl Settings {
    pub fn min_amount(&self, currency: &Currency) -> Option<f64> {
        self.min_amounts
            .get(&currency.code())
            .copied()
            .or_else(|| currency.default_min())
    }
}

/// Vendor service a marketplace lot is fulfilled with.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LotMapping {
    /// Matched case-insensitively against the order description.
    pub name: String,
    pub service_id: u64,
    /// Vendor units per purchased lot unit.
    #[serde(default = "default_lot_quantity")]
    pub quantity: f64,
    pub target: TargetKind,
    /// The order amount is money in the order currency and is sent to the
    /// vendor converted to USD.
    #[serde(default)]
    pub convert_currency: bool,
    /// Order form field that may already carry the target.
    #[serde(default)]
    pub target_field: Option<String>,
}

fn default_lot_quantity() -> f64 {
    1.0
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl RecordStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, RecordStatus::Pending)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub buyer_username: String,
    pub buyer_id: BuyerId,
    pub chat_id: MarketChat,
    /// Marketplace price paid by the buyer.
    pub sum: f64,
    pub currency: Currency,
    pub quantity: f64,
    pub target: String,
    pub service_id: u64,
    pub vendor_order_id: String,
    pub amount_usd: f64,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub profit: Option<f64>,
    pub status: RecordStatus,
    #[serde(with = "serde_fn::timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub completed_notification_sent: bool,
    #[serde(default)]
    pub refunded: bool,
}
