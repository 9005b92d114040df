pub mod particular;
pub mod stages;

use std::sync::Arc;

use async_trait::async_trait;
use log::error;
use teloxide::dispatching::dialogue::{Dialogue, Storage};
use teloxide::prelude::*;
use teloxide::types::ReplyMarkup;

use crate::prelude::*;
use crate::vendor::SharedVendor;

pub mod prelude {
    pub use super::{
        cancel, filter_dialogue_started, stages::prelude::*, ConversationStage,
        ConversationStart,
    };
}

pub fn handler() -> HandlerResult {
    particular::handler()
}

pub fn write_deps(deps: &mut DependencyMap) {
    particular::write_deps(deps)
}

#[async_trait]
pub trait ConversationStart {
    fn is_started(&self) -> bool;

    /// Asks the first question and returns the stage waiting for the answer.
    async fn start(self, bot: Bot, chat_id: ChatId) -> Result<Self>
    where
        Self: Sized;
}

#[async_trait]
pub trait ConversationStage<T> {
    async fn next(
        self,
        bot: Bot,
        msg: Message,
        warehouse: &Warehouse,
        vendor: &SharedVendor,
        item: T,
    ) -> Result<Self>
    where
        Self: Sized;
}

pub fn filter_dialogue_started<D, S>() -> HandlerResult
where
    D: ConversationStart + Send + Sync + 'static,
    S: Storage<D> + Send + Sync + 'static,
    S::Error: std::error::Error + Send + Sync,
{
    dptree::filter_async(|dialogue: Dialogue<D, S>| async move {
        match dialogue.get().await {
            Ok(stage) => match stage {
                Some(stage) => stage.is_started(),
                _ => false,
            },
            Err(_) => false,
        }
    })
}

pub async fn cancel<D, S>(
    bot: Bot,
    msg: Message,
    warehouse: SharedWarehouse,
    vendor: SharedVendor,
    dialogue: Dialogue<D, S>,
) -> Result<()>
where
    D: Send + Sync + 'static,
    S: Storage<D> + Send + Sync + 'static,
    S::Error: std::error::Error + Send + Sync,
{
    dialogue.exit().await?;

    bot.send_message(msg.chat.id, "Dialogue cancelled.")
        .reply_markup(ReplyMarkup::kb_remove())
        .await?;
    send_menu(&bot, msg.chat.id, &warehouse, &vendor).await
}

/// Opens the dialogue of the chat the pressed button belongs to.
pub fn enter_operator_dialogue<S, D>() -> HandlerResult
where
    S: Storage<D> + Sized + Send + Sync + 'static,
    <S as Storage<D>>::Error: std::fmt::Debug + Send,
    D: Default + Send + Sync + 'static,
{
    dptree::entry()
        .filter_map(|q: CallbackQuery, storage: Arc<S>| {
            let chat_id = q.message.as_ref().map(|msg| msg.chat.id);
            if chat_id.is_none() {
                error!("Callback query {} has no message", q.id);
            }
            chat_id.map(|chat_id| Dialogue::new(storage, chat_id))
        })
        .filter_map_async(|dialogue: Dialogue<D, S>| async move {
            match dialogue.get_or_default().await {
                Ok(dialogue) => Some(dialogue),
                Err(err) => {
                    log::error!("dialogue.get_or_default() failed: {:?}", err);
                    None
                }
            }
        })
}
