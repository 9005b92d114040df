use log::info;
use teloxide::prelude::*;

use crate::{prelude::*, vendor::SharedVendor};

pub fn handler() -> HandlerResult {
    Update::filter_message()
        .branch(
            dptree::entry()
                .chain(filter_msg_prefix("/start"))
                .endpoint(start),
        )
        .branch(
            dptree::entry()
                .chain(filter_msg_prefix("/menu"))
                .endpoint(start),
        )
}

/// Opens the menu and subscribes the chat to notifications.
pub async fn start(
    bot: Bot,
    msg: Message,
    warehouse: SharedWarehouse,
    vendor: SharedVendor,
) -> Result<()> {
    let chat = msg.chat.id.0;

    let added = warehouse
        .update_settings(|s| {
            if s.notification_chats.contains(&chat) {
                false
            } else {
                s.notification_chats.push(chat);
                true
            }
        })
        .await?;
    if added {
        info!("Chat {} subscribed to notifications", chat);
    }

    send_menu(&bot, msg.chat.id, &warehouse, &vendor).await
}
