use async_trait::async_trait;
use log::{info, warn};
use teloxide::{dispatching::dialogue::InMemStorage, prelude::*, types::ReplyMarkup};

use crate::dialogues::enter_operator_dialogue;
use crate::prelude::*;
use crate::utils::payload::PayloadOp;
use crate::vendor::SharedVendor;

type LoginStorage = InMemStorage<LoginStage>;
type PasswordStorage = InMemStorage<PasswordStage>;

#[derive(Default, Clone)]
pub enum LoginStage {
    #[default]
    Start,
    WaitLogin,
}

#[derive(Default, Clone)]
pub enum PasswordStage {
    #[default]
    Start,
    WaitPassword,
}

pub fn handler() -> HandlerResult {
    dptree::entry()
        .branch(
            Update::filter_callback_query()
                .filter(callback_prefix(PayloadOp::SetLogin))
                .chain(enter_operator_dialogue::<LoginStorage, LoginStage>())
                .endpoint(start::<LoginStage, LoginStorage>),
        )
        .branch(
            Update::filter_callback_query()
                .filter(callback_prefix(PayloadOp::SetPassword))
                .chain(enter_operator_dialogue::<PasswordStorage, PasswordStage>())
                .endpoint(start::<PasswordStage, PasswordStorage>),
        )
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, LoginStorage, LoginStage>()
                .branch(
                    filter_dialogue_started::<LoginStage, LoginStorage>()
                        .chain(filter_msg_prefix("Cancel"))
                        .endpoint(cancel::<LoginStage, LoginStorage>),
                )
                .branch(
                    dptree::case![LoginStage::WaitLogin]
                        .endpoint(receive_text_stage::<LoginStage, LoginStorage>),
                ),
        )
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, PasswordStorage, PasswordStage>()
                .branch(
                    filter_dialogue_started::<PasswordStage, PasswordStorage>()
                        .chain(filter_msg_prefix("Cancel"))
                        .endpoint(cancel::<PasswordStage, PasswordStorage>),
                )
                .branch(
                    dptree::case![PasswordStage::WaitPassword]
                        .endpoint(receive_text_stage::<PasswordStage, PasswordStorage>),
                ),
        )
}

pub fn write_deps(deps: &mut DependencyMap) {
    deps.insert(InMemStorage::<LoginStage>::new());
    deps.insert(InMemStorage::<PasswordStage>::new());
}

/// Stores a credential and drops the cached vendor token.
async fn save(
    bot: &Bot,
    msg: &Message,
    warehouse: &Warehouse,
    vendor: &SharedVendor,
    what: &str,
    apply: impl FnOnce(&mut Settings) + Send,
) -> Result<()> {
    warehouse.update_settings(apply).await?;
    vendor.reset_credentials().await;
    info!("Vendor {} updated", what);

    bot.send_message(msg.chat.id, format!("The {} is saved.", what))
        .reply_markup(ReplyMarkup::kb_remove())
        .await?;
    send_menu(bot, msg.chat.id, warehouse, vendor).await
}

#[async_trait]
impl ConversationStart for LoginStage {
    fn is_started(&self) -> bool {
        !matches!(self, Self::Start)
    }

    async fn start(self, bot: Bot, chat_id: ChatId) -> Result<Self> {
        bot.send_message(chat_id, "Send the new vendor login.")
            .reply_markup(cancel_keyboard())
            .await?;
        Ok(Self::WaitLogin)
    }
}

#[async_trait]
impl ConversationStage<String> for LoginStage {
    async fn next(
        self,
        bot: Bot,
        msg: Message,
        warehouse: &Warehouse,
        vendor: &SharedVendor,
        login: String,
    ) -> Result<Self> {
        if login.is_empty() {
            bot.send_message(msg.chat.id, "The login is empty, try again.")
                .await?;
            return Ok(self);
        }

        save(&bot, &msg, warehouse, vendor, "login", |s| s.api_login = login).await?;
        Ok(Self::Start)
    }
}

#[async_trait]
impl ConversationStart for PasswordStage {
    fn is_started(&self) -> bool {
        !matches!(self, Self::Start)
    }

    async fn start(self, bot: Bot, chat_id: ChatId) -> Result<Self> {
        bot.send_message(
            chat_id,
            "Send the new vendor password. The message will be deleted.",
        )
        .reply_markup(cancel_keyboard())
        .await?;
        Ok(Self::WaitPassword)
    }
}

#[async_trait]
impl ConversationStage<String> for PasswordStage {
    async fn next(
        self,
        bot: Bot,
        msg: Message,
        warehouse: &Warehouse,
        vendor: &SharedVendor,
        password: String,
    ) -> Result<Self> {
        if let Err(e) = bot.delete_message(msg.chat.id, msg.id).await {
            warn!("Unable to delete the password message: {}", e);
        }

        if password.is_empty() {
            bot.send_message(msg.chat.id, "The password is empty, try again.")
                .await?;
            return Ok(self);
        }

        save(&bot, &msg, warehouse, vendor, "password", |s| {
            s.api_password = password
        })
        .await?;
        Ok(Self::Start)
    }
}
