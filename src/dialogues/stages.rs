use teloxide::dispatching::dialogue::{Dialogue, Storage};
use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup, ReplyMarkup};

use crate::prelude::*;
use crate::vendor::SharedVendor;

pub mod prelude {
    pub use super::{cancel_keyboard, receive_text_stage, start};
}

pub fn cancel_keyboard() -> ReplyMarkup {
    ReplyMarkup::Keyboard(KeyboardMarkup {
        resize_keyboard: Some(true),
        one_time_keyboard: Some(true),
        keyboard: vec![vec![KeyboardButton::new("Cancel")]],
        ..Default::default()
    })
}

pub async fn start<D, S>(bot: Bot, q: CallbackQuery, dialogue: Dialogue<D, S>) -> Result<()>
where
    D: ConversationStart + Send + Sync + 'static,
    S: Storage<D> + Send + Sync + 'static,
    S::Error: std::error::Error + Send + Sync,
{
    let stage = dialogue
        .get()
        .await?
        .ok_or(UnkError::dialogue("No dialogue stage"))?;

    bot.answer_callback_query(&q.id).await?;
    dialogue
        .update(stage.start(bot, dialogue.chat_id()).await?)
        .await?;

    Ok(())
}

pub async fn receive_text_stage<D, S>(
    bot: Bot,
    msg: Message,
    dialogue: Dialogue<D, S>,
    warehouse: SharedWarehouse,
    vendor: SharedVendor,
) -> Result<()>
where
    D: ConversationStart + ConversationStage<String> + Send + Sync + 'static,
    S: Storage<D> + Send + Sync + 'static,
    S::Error: std::error::Error + Send + Sync,
{
    let text = match msg.text() {
        Some(t) => t.trim().to_owned(),
        None => {
            bot.send_message(msg.chat.id, "Please send a text.").await?;
            return Ok(());
        }
    };

    let stage = dialogue
        .get()
        .await?
        .ok_or(UnkError::dialogue("No dialogue stage"))?;

    dialogue
        .update(
            stage
                .next(bot.clone(), msg, &warehouse, &vendor, text)
                .await?,
        )
        .await?;

    Ok(())
}
