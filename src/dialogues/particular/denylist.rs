use async_trait::async_trait;
use log::info;
use teloxide::{
    dispatching::dialogue::InMemStorage,
    prelude::*,
    types::{ParseMode, ReplyMarkup},
    utils::html::escape,
};

use crate::dialogues::enter_operator_dialogue;
use crate::prelude::*;
use crate::utils::payload::PayloadOp;
use crate::vendor::SharedVendor;

type Storage = InMemStorage<Stage>;

#[derive(Default, Clone)]
pub enum Stage {
    #[default]
    Start,
    WaitEntry,
}

pub fn handler() -> HandlerResult {
    dptree::entry()
        .branch(
            Update::filter_callback_query()
                .filter(callback_prefix(PayloadOp::DenylistAdd))
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
                    dptree::case![Stage::WaitEntry]
                        .endpoint(receive_text_stage::<Stage, Storage>),
                ),
        )
}

pub fn write_deps(deps: &mut DependencyMap) {
    deps.insert(InMemStorage::<Stage>::new());
}

#[async_trait]
impl ConversationStart for Stage {
    fn is_started(&self) -> bool {
        !matches!(self, Self::Start)
    }

    async fn start(self, bot: Bot, chat_id: ChatId) -> Result<Self> {
        bot.send_message(
            chat_id,
            "Send the login or link to block. Orders for it will be left to you.",
        )
        .reply_markup(cancel_keyboard())
        .await?;

        Ok(Self::WaitEntry)
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
        entry: String,
    ) -> Result<Self> {
        if entry.is_empty() {
            bot.send_message(msg.chat.id, "The entry is empty, try again.")
                .await?;
            return Ok(self);
        }

        let text = if warehouse.denylist_add(&entry).await? {
            info!("{} added to the blacklist", entry);
            format!("<code>{}</code> is blacklisted.", escape(&entry))
        } else {
            format!("<code>{}</code> is already blacklisted.", escape(&entry))
        };

        bot.send_message(msg.chat.id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(ReplyMarkup::kb_remove())
            .await?;
        send_menu(&bot, msg.chat.id, warehouse, vendor).await?;

        Ok(Self::Start)
    }
}
