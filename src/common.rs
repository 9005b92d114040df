use std::{collections::HashSet, sync::Arc};

use itertools::Itertools;
use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
    utils::html::escape,
};

use crate::{
    ledger,
    prelude::*,
    utils::payload::{Payload, PayloadOp, Toggle},
    vendor::SharedVendor,
};

/// Telegram users allowed to drive the bot.
#[derive(Clone, Debug, Default)]
pub struct Operators(Arc<HashSet<u64>>);

impl Operators {
    pub fn new(ids: impl IntoIterator<Item = u64>) -> Self {
        Self(Arc::new(ids.into_iter().collect()))
    }

    pub fn contains(&self, user: &teloxide::types::User) -> bool {
        self.0.contains(&user.id.0)
    }
}

pub fn operators_only() -> HandlerResult {
    dptree::filter(|upd: Update, operators: Operators| {
        upd.user().map_or(false, |user| operators.contains(user))
    })
}

pub fn filter_msg_prefix(prefix: &'static str) -> HandlerResult {
    dptree::filter(move |msg: Message| {
        msg.text()
            .map(|text| text.starts_with(prefix))
            .unwrap_or(false)
    })
}

pub fn callback_prefix(op: PayloadOp) -> impl Fn(CallbackQuery) -> bool {
    move |q: CallbackQuery| {
        q.data
            .map(|data| op.is_in_payload(&data))
            .unwrap_or(false)
    }
}

pub fn payload_of(q: &CallbackQuery) -> Result<Payload> {
    let data = q
        .data
        .as_deref()
        .ok_or(UnkError::unknown("callback without data"))?;
    Ok(data.parse()?)
}

/// Fills `{name}` placeholders of a template; a template with unknown
/// placeholders is returned as is.
#[macro_export]
macro_rules! render {
    ($template:expr $(,$key:expr => $value:expr)* $(,)?) => {
        {
            let template: &str = &$template;
            #[allow(unused_mut)]
            let mut map = std::collections::HashMap::<String, String>::new();
            $(map.insert($key.to_owned(), $value.to_string());)*
            strfmt::strfmt(template, &map).unwrap_or_else(|_| template.to_owned())
        }
    };
}

pub fn button(text: impl Into<String>, payload: Payload) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, payload.to_string())
}

pub fn back_button() -> InlineKeyboardButton {
    button("⬅️ Back", Payload::op(PayloadOp::Menu))
}

fn flag(on: bool) -> &'static str {
    if on {
        "🟢"
    } else {
        "🔴"
    }
}

pub async fn menu_text(warehouse: &Warehouse, vendor: &SharedVendor) -> String {
    let balance = match vendor.balance().await {
        Ok(balance) => format!("{:.2}$", balance),
        Err(e) => {
            log::warn!("Unable to read vendor balance: {}", e);
            "unavailable".to_owned()
        }
    };

    let sales = ledger::success_count(warehouse.ledger.read().await.rows());
    let denylisted = warehouse.blacklist.read().await.get().len();
    let lots = warehouse.lots.read().await.get().len();

    [
        "<b>⚙️ Autodelivery</b>".to_owned(),
        String::new(),
        format!("<b>• {}:</b> <code>{}</code>", escape(vendor.name()), balance),
        format!("<b>• Sales:</b> <code>{}</code>", sales),
        format!("<b>• Blacklist:</b> <code>{}</code>", denylisted),
        format!("<b>• Lots:</b> <code>{}</code>", lots),
    ]
    .iter()
    .join("\n")
}

pub fn menu_keyboard(settings: &Settings) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Toggle::ALL
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|t| {
                    button(
                        format!("{} {}", flag(t.get(settings)), t.label()),
                        Payload::toggle(*t),
                    )
                })
                .collect()
        })
        .collect();

    rows.push(vec![
        button("📊 Statistics", Payload::op(PayloadOp::Stats)),
        button("📜 History", Payload::history(0)),
    ]);
    rows.push(vec![
        button("⛔ Blacklist", Payload::op(PayloadOp::Denylist)),
        button("📦 Lots", Payload::op(PayloadOp::Lots)),
    ]);
    rows.push(vec![
        button("🔑 Login", Payload::op(PayloadOp::SetLogin)),
        button("🔑 Password", Payload::op(PayloadOp::SetPassword)),
    ]);
    rows.push(vec![button("🔄 Refresh", Payload::op(PayloadOp::Refresh))]);

    InlineKeyboardMarkup::new(rows)
}

pub async fn send_menu(
    bot: &Bot,
    chat_id: ChatId,
    warehouse: &Warehouse,
    vendor: &SharedVendor,
) -> Result<()> {
    let settings = warehouse.settings().await;

    bot.send_message(chat_id, menu_text(warehouse, vendor).await)
        .parse_mode(ParseMode::Html)
        .reply_markup(menu_keyboard(&settings))
        .await?;
    Ok(())
}

pub async fn default_handler(bot: Bot, msg: Message) -> Result<()> {
    bot.send_message(msg.chat.id, "Send /menu to open the settings.")
        .await?;
    Ok(())
}
