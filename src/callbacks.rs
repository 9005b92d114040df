use chrono::{Local, Utc};
use itertools::Itertools;
use log::info;
use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
    utils::html::escape,
};

use crate::{
    ledger::{self, Page, Stats},
    marketplace::SharedMarket,
    prelude::*,
    utils::payload::{Payload, PayloadOp},
    vendor::SharedVendor,
};

pub fn handler() -> HandlerResult {
    dptree::entry().branch(
        Update::filter_callback_query()
            .branch(dptree::filter(callback_prefix(PayloadOp::Menu)).endpoint(menu))
            .branch(dptree::filter(callback_prefix(PayloadOp::Toggle)).endpoint(toggle))
            .branch(dptree::filter(callback_prefix(PayloadOp::Stats)).endpoint(stats))
            .branch(dptree::filter(callback_prefix(PayloadOp::History)).endpoint(history))
            .branch(
                dptree::filter(callback_prefix(PayloadOp::OrderDetails)).endpoint(order_details),
            )
            .branch(dptree::filter(callback_prefix(PayloadOp::Denylist)).endpoint(denylist))
            .branch(
                dptree::filter(callback_prefix(PayloadOp::DenylistRemove))
                    .endpoint(denylist_remove),
            )
            .branch(dptree::filter(callback_prefix(PayloadOp::Lots)).endpoint(lots))
            .branch(dptree::filter(callback_prefix(PayloadOp::LotsOn)).endpoint(lots_on))
            .branch(dptree::filter(callback_prefix(PayloadOp::LotsOff)).endpoint(lots_off))
            .branch(dptree::filter(callback_prefix(PayloadOp::Refresh)).endpoint(refresh)),
    )
}

async fn edit(
    bot: &Bot,
    q: &CallbackQuery,
    text: String,
    keyboard: InlineKeyboardMarkup,
) -> Result<()> {
    if let Some(msg) = &q.message {
        bot.edit_message_text(msg.chat.id, msg.id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
    }
    Ok(())
}

async fn show_menu(
    bot: &Bot,
    q: &CallbackQuery,
    warehouse: &Warehouse,
    vendor: &SharedVendor,
) -> Result<()> {
    let settings = warehouse.settings().await;
    edit(bot, q, menu_text(warehouse, vendor).await, menu_keyboard(&settings)).await
}

pub async fn menu(
    bot: Bot,
    q: CallbackQuery,
    warehouse: SharedWarehouse,
    vendor: SharedVendor,
) -> Result<()> {
    bot.answer_callback_query(&q.id).await?;
    show_menu(&bot, &q, &warehouse, &vendor).await
}

pub async fn toggle(
    bot: Bot,
    q: CallbackQuery,
    warehouse: SharedWarehouse,
    vendor: SharedVendor,
) -> Result<()> {
    let toggle = payload_of(&q)?
        .toggle_kind()
        .ok_or(UnkError::unknown("toggle payload without a toggle"))?;

    let on = warehouse.update_settings(|s| toggle.apply(s)).await?;
    info!("{} switched {}", toggle.label(), if on { "on" } else { "off" });

    bot.answer_callback_query(&q.id)
        .text(format!("{}: {}", toggle.label(), if on { "on" } else { "off" }))
        .await?;
    show_menu(&bot, &q, &warehouse, &vendor).await
}

pub fn stats_text(stats: &Stats) -> String {
    let line = |name: &str, w: &ledger::Window| {
        format!(
            "<b>• {}:</b> <code>{}</code> orders, <code>{:.2}</code>",
            name, w.count, w.sum
        )
    };

    [
        "<b>📊 Sales</b>".to_owned(),
        String::new(),
        line("Day", &stats.day),
        line("Week", &stats.week),
        line("Month", &stats.month),
        line("Total", &stats.total),
    ]
    .iter()
    .join("\n")
}

pub async fn stats(bot: Bot, q: CallbackQuery, warehouse: SharedWarehouse) -> Result<()> {
    let stats = ledger::stats(warehouse.ledger.read().await.rows(), Utc::now());

    bot.answer_callback_query(&q.id).await?;
    edit(
        &bot,
        &q,
        stats_text(&stats),
        InlineKeyboardMarkup::new(vec![vec![back_button()]]),
    )
    .await
}

fn status_icon(status: RecordStatus) -> &'static str {
    match status {
        RecordStatus::Pending => "⏳",
        RecordStatus::Success => "✅",
        RecordStatus::Failed => "❌",
        RecordStatus::Refunded => "💸",
    }
}

pub fn history_keyboard(page: &Page) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = page
        .items
        .iter()
        .map(|r| {
            vec![button(
                format!(
                    "{} #{} • {} • {}",
                    status_icon(r.status),
                    r.order_id,
                    r.currency.format_amount(r.sum),
                    r.buyer_username
                ),
                Payload::order_details(&r.order_id, page.page),
            )]
        })
        .collect();

    let mut nav = vec![];
    if page.has_prev() {
        nav.push(button("◀️", Payload::history(page.page - 1)));
    }
    if page.has_next() {
        nav.push(button("▶️", Payload::history(page.page + 1)));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }
    rows.push(vec![back_button()]);

    InlineKeyboardMarkup::new(rows)
}

pub async fn history(bot: Bot, q: CallbackQuery, warehouse: SharedWarehouse) -> Result<()> {
    let payload = payload_of(&q)?;
    let ledger = warehouse.ledger.read().await;
    let page = ledger::history(ledger.rows(), payload.page.unwrap_or_default());

    let text = if page.items.is_empty() {
        "<b>📜 No orders yet</b>".to_owned()
    } else {
        format!("<b>📜 Orders, page {}/{}</b>", page.page + 1, page.pages)
    };
    let keyboard = history_keyboard(&page);
    drop(ledger);

    bot.answer_callback_query(&q.id).await?;
    edit(&bot, &q, text, keyboard).await
}

pub fn order_text(r: &OrderRecord) -> String {
    let mut lines = vec![
        format!("<b>{} Order #{}</b>", status_icon(r.status), escape(&r.order_id)),
        String::new(),
        format!("<b>• Buyer:</b> <code>{}</code>", escape(&r.buyer_username)),
        format!("<b>• Price:</b> <code>{}</code>", r.currency.format_amount(r.sum)),
        format!("<b>• Quantity:</b> <code>{}</code>", r.quantity),
        format!("<b>• Target:</b> <code>{}</code>", escape(&r.target)),
        format!("<b>• Service:</b> <code>{}</code>", r.service_id),
    ];

    if !r.vendor_order_id.is_empty() {
        lines.push(format!(
            "<b>• Vendor order:</b> <code>{}</code>",
            escape(&r.vendor_order_id)
        ));
        lines.push(format!("<b>• Charge:</b> <code>{:.2}$</code>", r.amount_usd));
    }
    if let Some(rate) = r.rate {
        lines.push(format!("<b>• Rate:</b> <code>{:.4}</code>", rate));
    }
    if let Some(profit) = r.profit {
        lines.push(format!("<b>• Profit:</b> <code>{:.2}</code>", profit));
    }
    lines.push(format!(
        "<b>• Date:</b> <code>{}</code>",
        r.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    ));

    lines.join("\n")
}

pub async fn order_details(bot: Bot, q: CallbackQuery, warehouse: SharedWarehouse) -> Result<()> {
    let payload = payload_of(&q)?;
    let order_id = payload
        .order_id
        .ok_or(UnkError::unknown("order details without an order id"))?;

    let Some(record) = warehouse.ledger.read().await.get(&order_id).cloned() else {
        bot.answer_callback_query(&q.id)
            .text("Order not found")
            .show_alert(true)
            .await?;
        return Ok(());
    };

    bot.answer_callback_query(&q.id).await?;
    edit(
        &bot,
        &q,
        order_text(&record),
        InlineKeyboardMarkup::new(vec![vec![button(
            "⬅️ Back",
            Payload::history(payload.page.unwrap_or_default()),
        )]]),
    )
    .await
}

pub fn denylist_view(entries: &[String]) -> (String, InlineKeyboardMarkup) {
    let text = if entries.is_empty() {
        "<b>⛔ Blacklist is empty</b>".to_owned()
    } else {
        format!(
            "<b>⛔ Blacklist</b>\n\nTap an entry to remove it.\n\n{}",
            entries
                .iter()
                .map(|e| format!("• <code>{}</code>", escape(e)))
                .join("\n")
        )
    };

    let mut rows: Vec<Vec<InlineKeyboardButton>> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| vec![button(format!("🗑 {}", entry), Payload::denylist_remove(i))])
        .collect();
    rows.push(vec![button("➕ Add", Payload::op(PayloadOp::DenylistAdd))]);
    rows.push(vec![back_button()]);

    (text, InlineKeyboardMarkup::new(rows))
}

pub async fn denylist(bot: Bot, q: CallbackQuery, warehouse: SharedWarehouse) -> Result<()> {
    let (text, keyboard) = denylist_view(warehouse.blacklist.read().await.get());

    bot.answer_callback_query(&q.id).await?;
    edit(&bot, &q, text, keyboard).await
}

pub async fn denylist_remove(bot: Bot, q: CallbackQuery, warehouse: SharedWarehouse) -> Result<()> {
    let index = payload_of(&q)?
        .index
        .ok_or(UnkError::unknown("denylist removal without an index"))?;

    let answer = match warehouse.denylist_remove(index).await? {
        Some(entry) => {
            info!("{} removed from the blacklist", entry);
            format!("{} removed", entry)
        }
        None => "Already removed".to_owned(),
    };
    bot.answer_callback_query(&q.id).text(answer).await?;

    let (text, keyboard) = denylist_view(warehouse.blacklist.read().await.get());
    edit(&bot, &q, text, keyboard).await
}

pub fn lots_text(lots: &LotMap) -> String {
    if lots.is_empty() {
        return "<b>📦 No lots mapped</b>".to_owned();
    }

    let lines = lots
        .iter()
        .map(|(id, lot)| {
            format!(
                "• <code>{}</code> {} → service <code>{}</code> x{} ({}{})",
                escape(id),
                escape(&lot.name),
                lot.service_id,
                lot.quantity,
                lot.target.display_name(),
                if lot.convert_currency { ", converted" } else { "" }
            )
        })
        .join("\n");

    format!("<b>📦 Lots</b>\n\n{}", lines)
}

pub async fn lots(bot: Bot, q: CallbackQuery, warehouse: SharedWarehouse) -> Result<()> {
    let text = lots_text(warehouse.lots.read().await.get());
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![
            button("🟢 Activate all", Payload::op(PayloadOp::LotsOn)),
            button("🔴 Deactivate all", Payload::op(PayloadOp::LotsOff)),
        ],
        vec![button("➕ Add lot", Payload::op(PayloadOp::AddLot))],
        vec![back_button()],
    ]);

    bot.answer_callback_query(&q.id).await?;
    edit(&bot, &q, text, keyboard).await
}

async fn set_lots_active(
    bot: Bot,
    q: CallbackQuery,
    warehouse: SharedWarehouse,
    market: SharedMarket,
    active: bool,
) -> Result<()> {
    let lots = warehouse.lot_ids().await;
    let count = market.set_lots_active(&lots, active).await?;
    info!(
        "{} of {} lots {}",
        count,
        lots.len(),
        if active { "activated" } else { "deactivated" }
    );

    bot.answer_callback_query(&q.id)
        .text(format!("{} of {} lots updated", count, lots.len()))
        .await?;
    Ok(())
}

pub async fn lots_on(
    bot: Bot,
    q: CallbackQuery,
    warehouse: SharedWarehouse,
    market: SharedMarket,
) -> Result<()> {
    set_lots_active(bot, q, warehouse, market, true).await
}

pub async fn lots_off(
    bot: Bot,
    q: CallbackQuery,
    warehouse: SharedWarehouse,
    market: SharedMarket,
) -> Result<()> {
    set_lots_active(bot, q, warehouse, market, false).await
}

pub async fn refresh(
    bot: Bot,
    q: CallbackQuery,
    warehouse: SharedWarehouse,
    vendor: SharedVendor,
) -> Result<()> {
    warehouse.reload().await?;
    vendor.reset_credentials().await;

    bot.answer_callback_query(&q.id).text("Done.").await?;
    show_menu(&bot, &q, &warehouse, &vendor).await
}
