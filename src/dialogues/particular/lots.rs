use std::fmt::Display;

use async_trait::async_trait;
use log::info;
use teloxide::{
    dispatching::dialogue::InMemStorage,
    prelude::*,
    types::{ParseMode, ReplyMarkup},
    utils::html::escape,
};

use crate::conversation::target::TargetKind;
use crate::dialogues::enter_operator_dialogue;
use crate::prelude::*;
use crate::utils::payload::PayloadOp;
use crate::vendor::SharedVendor;

type Storage = InMemStorage<Stage>;

const FORMAT_HINT: &str = "<code>lot_id | name | service_id | quantity | target kind [| convert]</code>\n\n\
Target kinds: <code>steam_login</code>, <code>link</code> or <code>link:vk.com,t.me</code>, \
<code>steam_profile</code>, <code>game_pass</code>, <code>username</code>.";

#[derive(Default, Clone)]
pub enum Stage {
    #[default]
    Start,
    WaitLot,
}

pub fn handler() -> HandlerResult {
    dptree::entry()
        .branch(
            Update::filter_callback_query()
                .filter(callback_prefix(PayloadOp::AddLot))
                .chain(enter_operator_dialogue::<Storage, Stage>())
                .endpoint(start::<Stage, Storage>),
        )
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, Storage, Stage>()
                .branch(
                    filter_dialogue_started::<Stage, Storage>()
                        .chain(filter_msg_prefix("Cancel"))
                        .endpoint(cancel::<Stage, Storage>),
                )
                .branch(
                    dptree::case![Stage::WaitLot].endpoint(receive_text_stage::<Stage, Storage>),
                ),
        )
}

pub fn write_deps(deps: &mut DependencyMap) {
    deps.insert(InMemStorage::<Stage>::new());
}

#[derive(Debug, PartialEq)]
pub enum LotLineError {
    Fields(usize),
    Empty(&'static str),
    ServiceId(String),
    Quantity(String),
    TargetKind(String),
    Flag(String),
}

impl Display for LotLineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LotLineError::Fields(n) => write!(f, "expected 5 or 6 fields, got {}", n),
            LotLineError::Empty(field) => write!(f, "{} is empty", field),
            LotLineError::ServiceId(s) => write!(f, "invalid service id: {}", s),
            LotLineError::Quantity(s) => write!(f, "invalid quantity: {}", s),
            LotLineError::TargetKind(s) => write!(f, "unknown target kind: {}", s),
            LotLineError::Flag(s) => write!(f, "expected \"convert\", got {}", s),
        }
    }
}

impl std::error::Error for LotLineError {}

/// Parses `lot_id | name | service_id | quantity | target kind [| convert]`.
pub fn parse_lot_line(line: &str) -> std::result::Result<(String, LotMapping), LotLineError> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if !(5..=6).contains(&fields.len()) {
        return Err(LotLineError::Fields(fields.len()));
    }

    let lot_id = fields[0];
    if lot_id.is_empty() {
        return Err(LotLineError::Empty("lot id"));
    }
    let name = fields[1];
    if name.is_empty() {
        return Err(LotLineError::Empty("name"));
    }

    let service_id = fields[2]
        .parse::<u64>()
        .map_err(|_| LotLineError::ServiceId(fields[2].to_owned()))?;
    let quantity = fields[3]
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|q| q.is_finite() && *q > 0.0)
        .ok_or_else(|| LotLineError::Quantity(fields[3].to_owned()))?;
    let target = TargetKind::from_notation(fields[4])
        .ok_or_else(|| LotLineError::TargetKind(fields[4].to_owned()))?;

    let convert_currency = match fields.get(5) {
        None => false,
        Some(flag) if flag.eq_ignore_ascii_case("convert") => true,
        Some(flag) => return Err(LotLineError::Flag((*flag).to_owned())),
    };

    Ok((
        lot_id.to_owned(),
        LotMapping {
            name: name.to_owned(),
            service_id,
            quantity,
            target,
            convert_currency,
            target_field: None,
        },
    ))
}

#[async_trait]
impl ConversationStart for Stage {
    fn is_started(&self) -> bool {
        !matches!(self, Self::Start)
    }

    async fn start(self, bot: Bot, chat_id: ChatId) -> Result<Self> {
        bot.send_message(chat_id, format!("Send the lot as\n{}", FORMAT_HINT))
            .parse_mode(ParseMode::Html)
            .reply_markup(cancel_keyboard())
            .await?;

        Ok(Self::WaitLot)
    }
}

#[async_trait]
impl ConversationStage<String> for Stage {
    async fn next(
        self,
        bot: Bot,
        msg: Message,
        warehouse: &Warehouse,
        vendor: &SharedVendor,
        line: String,
    ) -> Result<Self> {
        let (lot_id, lot) = match parse_lot_line(&line) {
            Ok(parsed) => parsed,
            Err(e) => {
                bot.send_message(
                    msg.chat.id,
                    format!("Wrong format: {}.\n\n{}", escape(&e.to_string()), FORMAT_HINT),
                )
                .parse_mode(ParseMode::Html)
                .await?;
                return Ok(self);
            }
        };

        let name = lot.name.clone();
        let replaced = warehouse
            .lots
            .write()
            .await
            .update(|lots| lots.insert(lot_id.clone(), lot).is_some())
            .await?;
        info!("Lot {} mapped to {}", lot_id, name);

        bot.send_message(
            msg.chat.id,
            format!(
                "Lot <code>{}</code> ({}) {}.",
                escape(&lot_id),
                escape(&name),
                if replaced { "updated" } else { "added" }
            ),
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(ReplyMarkup::kb_remove())
        .await?;
        send_menu(&bot, msg.chat.id, warehouse, vendor).await?;

        Ok(Self::Start)
    }
}
