use std::time::Duration;

use super::watch::BalanceWatch;
use super::*;
use crate::marketplace::ChatMessage;
use crate::testing::*;
use crate::warehouse::LEDGER_FILE;

fn message(text: &str) -> MarketEvent {
    MarketEvent::NewMessage {
        message: ChatMessage {
            chat_id: CHAT.to_owned(),
            author_id: BUYER_ID,
            author: "buyer".to_owned(),
            text: text.to_owned(),
        },
    }
}

async fn place(h: &Harness, order: MarketOrder) {
    h.market.add_order(order.clone());
    h.engine.handle(MarketEvent::NewOrder { order }).await;
}

async fn ledger_status(h: &Harness, order_id: &str) -> Option<RecordStatus> {
    h.warehouse
        .ledger
        .read()
        .await
        .get(order_id)
        .map(|r| r.status)
}

#[tokio::test]
async fn order_to_delivery() {
    let h = Harness::new().await;

    place(&h, paid_order("12345", 100.0)).await;
    assert!(h.market.last_message().contains("Steam login"));

    h.engine.handle(message("myrobloxlogin123")).await;
    let prompt = h.market.last_message();
    assert!(prompt.contains("myrobloxlogin123"));
    assert!(prompt.contains("100 RUB"));
    assert!(h.vendor.requests().is_empty());

    h.engine.handle(message("+")).await;
    assert!(h.engine.tasks().join("fulfil:12345").await);

    let requests = h.vendor.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].quantity, 1.25);
    assert_eq!(requests[0].target, "myrobloxlogin123");
    assert_eq!(requests[0].service_id, 1);

    assert!(h
        .market
        .last_message()
        .contains("https://funpay.com/orders/12345/"));
    assert_eq!(ledger_status(&h, "12345").await, Some(RecordStatus::Success));
    assert_eq!(h.notifier.kinds(), vec![ReportKind::Success]);
    assert_eq!(h.engine.conversations().await, 0);

    h.engine.handle(message("+")).await;
    assert!(!h.engine.tasks().join("fulfil:12345").await);
    assert_eq!(h.vendor.requests().len(), 1);
}

#[tokio::test]
async fn below_minimum_is_refunded() {
    let h = Harness::new().await;

    place(&h, paid_order("2", 10.0)).await;

    assert_eq!(h.market.refunds(), vec!["2".to_owned()]);
    assert!(h.market.last_message().contains("outside the limits"));
    assert_eq!(h.notifier.kinds(), vec![ReportKind::Refund]);
    assert_eq!(h.engine.conversations().await, 0);
}

#[tokio::test]
async fn above_balance_is_refunded() {
    let h = Harness::new().await;
    *h.vendor.balance.lock().unwrap() = Ok(1.0);

    place(&h, paid_order("3", 100.0)).await;

    assert_eq!(h.market.refunds(), vec!["3".to_owned()]);
    assert!(h.market.last_message().contains("80 RUB"));
}

#[tokio::test]
async fn unknown_balance_skips_upper_bound() {
    let h = Harness::new().await;
    *h.vendor.balance.lock().unwrap() = Err(VendorError::Transport("down".to_owned()));

    place(&h, paid_order("4", 100.0)).await;

    assert!(h.market.refunds().is_empty());
    assert_eq!(h.engine.conversations().await, 1);
}

#[tokio::test]
async fn denylisted_target_is_held() {
    let h = Harness::with_settings(|s| s.confirmation_required = false).await;
    h.warehouse.denylist_add("BadLogin").await.unwrap();

    place(&h, paid_order("12345", 100.0)).await;
    h.engine.handle(message("badlogin")).await;
    assert!(h.engine.tasks().join("fulfil:12345").await);

    assert!(h.vendor.requests().is_empty());
    assert!(h.market.last_message().contains("blacklist"));
    assert!(h.market.refunds().is_empty());
    assert_eq!(h.notifier.kinds(), vec![ReportKind::Error]);
    assert_eq!(h.engine.conversations().await, 0);
}

#[tokio::test]
async fn order_closed_before_fulfilment_is_not_held() {
    let h = Harness::with_settings(|s| {
        s.confirmation_required = false;
        s.order_verification_enabled = false;
    })
    .await;
    h.warehouse.denylist_add("BadLogin").await.unwrap();
    h.warehouse
        .lots
        .write()
        .await
        .update(|lots| {
            if let Some(lot) = lots.get_mut(LOT_ID) {
                lot.target_field = Some("login".to_owned());
            }
        })
        .await
        .unwrap();

    let mut order = paid_order("12345", 100.0);
    order
        .fields
        .insert("login".to_owned(), "badlogin".to_owned());
    let mut refunded = order.clone();
    refunded.status = OrderStatus::Refunded;
    h.market.add_order(refunded);

    h.engine.handle(MarketEvent::NewOrder { order }).await;
    assert!(h.engine.tasks().join("fulfil:12345").await);

    assert!(!h.market.messages().iter().any(|m| m.contains("blacklist")));
    assert!(h.notifier.reports().is_empty());
    assert!(h.vendor.requests().is_empty());
    assert_eq!(h.engine.conversations().await, 0);
}

#[tokio::test]
async fn terminal_status_drops_conversation() {
    let h = Harness::new().await;

    place(&h, paid_order("12345", 100.0)).await;
    assert_eq!(h.engine.conversations().await, 1);

    h.engine
        .handle(MarketEvent::OrderStatusChanged {
            order_id: "12345".to_owned(),
            status: OrderStatus::Closed,
        })
        .await;
    assert_eq!(h.engine.conversations().await, 0);

    let sent = h.market.messages().len();
    h.engine.handle(message("login")).await;
    assert_eq!(h.market.messages().len(), sent);
}

#[tokio::test]
async fn live_status_is_rechecked_on_message() {
    let h = Harness::new().await;

    place(&h, paid_order("12345", 100.0)).await;
    h.market.set_status("12345", OrderStatus::Refunded);

    let sent = h.market.messages().len();
    h.engine.handle(message("login")).await;

    assert_eq!(h.market.messages().len(), sent);
    assert_eq!(h.engine.conversations().await, 0);
}

#[tokio::test]
async fn minus_clears_target() {
    let h = Harness::new().await;

    place(&h, paid_order("12345", 100.0)).await;
    h.engine.handle(message("login")).await;
    h.engine.handle(message("-")).await;

    assert!(h.market.last_message().contains("send a new Steam login"));
    let conv = h.engine.conversation(CHAT, BUYER_ID).await.unwrap();
    assert_eq!(conv.phase(), Phase::AwaitingTarget);
    assert_eq!(conv.target(), None);
}

#[tokio::test]
async fn invalid_target_is_rejected_without_state_change() {
    let h = Harness::new().await;

    place(&h, paid_order("12345", 100.0)).await;
    h.engine.handle(message("not a login!")).await;

    assert!(h.market.last_message().starts_with("❌"));
    let conv = h.engine.conversation(CHAT, BUYER_ID).await.unwrap();
    assert_eq!(conv.phase(), Phase::AwaitingTarget);
}

#[tokio::test]
async fn seller_messages_are_ignored() {
    let h = Harness::new().await;
    place(&h, paid_order("12345", 100.0)).await;

    let sent = h.market.messages().len();
    h.engine
        .handle(MarketEvent::NewMessage {
            message: ChatMessage {
                chat_id: CHAT.to_owned(),
                author_id: SELLER_ID,
                author: "seller".to_owned(),
                text: "login".to_owned(),
            },
        })
        .await;

    assert_eq!(h.market.messages().len(), sent);
}

#[tokio::test]
async fn unverifiable_order_is_reported() {
    let h = Harness::new().await;

    h.engine
        .handle(MarketEvent::NewOrder {
            order: paid_order("666", 100.0),
        })
        .await;

    let reports = h.notifier.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].title, "Possible forged order");
    assert_eq!(h.engine.conversations().await, 0);
    assert!(h.market.messages().is_empty());
}

#[tokio::test]
async fn prefilled_target_goes_to_confirmation() {
    let h = Harness::new().await;
    h.warehouse
        .lots
        .write()
        .await
        .update(|lots| {
            if let Some(lot) = lots.get_mut(LOT_ID) {
                lot.target_field = Some("login".to_owned());
            }
        })
        .await
        .unwrap();

    let mut order = paid_order("12345", 100.0);
    order
        .fields
        .insert("login".to_owned(), "prefilled".to_owned());
    place(&h, order).await;

    assert!(h.market.last_message().contains("prefilled"));
    let conv = h.engine.conversation(CHAT, BUYER_ID).await.unwrap();
    assert_eq!(conv.phase(), Phase::AwaitingConfirmation);
}

#[tokio::test]
async fn orders_of_one_buyer_are_queued() {
    let h = Harness::new().await;

    place(&h, paid_order("1", 100.0)).await;
    place(&h, paid_order("2", 100.0)).await;

    let queued = h.market.last_message();
    assert!(queued.contains("position: 2"));
    assert!(queued.contains("30 sec"));
    assert_eq!(
        h.engine.conversation(CHAT, BUYER_ID).await.unwrap().order_id,
        "1"
    );

    h.engine.handle(message("login")).await;
    h.engine.handle(message("+")).await;
    assert!(h.engine.tasks().join("fulfil:1").await);

    let conv = h.engine.conversation(CHAT, BUYER_ID).await.unwrap();
    assert_eq!(conv.order_id, "2");
    assert_eq!(conv.phase(), Phase::AwaitingTarget);
    assert!(h.market.last_message().contains("Thank you"));
}

#[tokio::test]
async fn vendor_rejected_target_asks_again() {
    let h = Harness::new().await;
    h.vendor.script_create(Err(VendorError::InvalidTarget));

    place(&h, paid_order("12345", 100.0)).await;
    h.engine.handle(message("nosuchlogin")).await;
    h.engine.handle(message("+")).await;
    assert!(h.engine.tasks().join("fulfil:12345").await);

    assert!(h.market.last_message().contains("could not find"));
    let conv = h.engine.conversation(CHAT, BUYER_ID).await.unwrap();
    assert_eq!(conv.phase(), Phase::AwaitingTarget);
    assert!(h.market.refunds().is_empty());

    h.engine.handle(message("reallogin")).await;
    h.engine.handle(message("+")).await;
    assert!(h.engine.tasks().join("fulfil:12345").await);

    let requests = h.vendor.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].target, "reallogin");
    assert_ne!(requests[0].custom_id, requests[1].custom_id);
    assert_eq!(ledger_status(&h, "12345").await, Some(RecordStatus::Success));
}

#[tokio::test]
async fn insufficient_funds_deactivates_lots_and_refunds() {
    let h = Harness::new().await;
    h.vendor.script_pay(Err(VendorError::InsufficientFunds));

    place(&h, paid_order("12345", 100.0)).await;
    h.engine.handle(message("login")).await;
    h.engine.handle(message("+")).await;
    assert!(h.engine.tasks().join("fulfil:12345").await);

    assert_eq!(
        h.market.lot_toggles(),
        vec![(vec![LOT_ID.to_owned()], false)]
    );
    assert_eq!(h.market.refunds(), vec!["12345".to_owned()]);
    assert_eq!(
        h.notifier.kinds(),
        vec![ReportKind::Error, ReportKind::Refund]
    );
    assert!(h.market.messages().iter().any(|m| m.contains("An error occurred")));
    assert_eq!(ledger_status(&h, "12345").await, Some(RecordStatus::Refunded));
    assert_eq!(h.engine.conversations().await, 0);
}

#[tokio::test]
async fn manual_refund_when_auto_refund_is_off() {
    let h = Harness::with_settings(|s| s.auto_refund_on_error = false).await;
    h.vendor
        .script_pay(Err(VendorError::Failed("boom".to_owned())));

    place(&h, paid_order("12345", 100.0)).await;
    h.engine.handle(message("login")).await;
    h.engine.handle(message("+")).await;
    assert!(h.engine.tasks().join("fulfil:12345").await);

    assert!(h.market.refunds().is_empty());
    assert!(h.market.lot_toggles().is_empty());
    let reports = h.notifier.reports();
    assert_eq!(reports[1].title, "Manual refund required");
    assert!(reports[0]
        .fields
        .iter()
        .any(|(name, value)| name == "Error" && value.contains("boom")));
    assert_eq!(ledger_status(&h, "12345").await, Some(RecordStatus::Failed));
}

#[tokio::test]
async fn missing_rate_fails_the_order() {
    let h = Harness::new().await;
    place(&h, paid_order("12345", 100.0)).await;
    h.vendor.rates.lock().unwrap().clear();

    h.engine.handle(message("login")).await;
    h.engine.handle(message("+")).await;
    assert!(h.engine.tasks().join("fulfil:12345").await);

    assert!(h.vendor.requests().is_empty());
    assert_eq!(h.market.refunds(), vec!["12345".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn reminder_is_sent_once_while_open() {
    let h = Harness::new().await;

    place(&h, paid_order("12345", 100.0)).await;
    h.engine.handle(message("login")).await;
    h.engine.handle(message("+")).await;
    assert!(h.engine.tasks().join("fulfil:12345").await);

    h.engine.schedule_reminder("12345", CHAT).await;
    assert!(h.engine.tasks().join("reminder:12345").await);
    assert!(!h.engine.tasks().join("reminder:12345").await);

    let reminders = h
        .market
        .messages()
        .iter()
        .filter(|m| m.contains("Reminder"))
        .count();
    assert_eq!(reminders, 1);
    assert!(h.engine.state.lock().await.reminded.is_empty());
}

#[tokio::test(start_paused = true)]
async fn no_reminder_for_closed_order() {
    let h = Harness::new().await;

    place(&h, paid_order("12345", 100.0)).await;
    h.engine.handle(message("login")).await;
    h.engine.handle(message("+")).await;
    assert!(h.engine.tasks().join("fulfil:12345").await);

    h.market.set_status("12345", OrderStatus::Closed);
    assert!(h.engine.tasks().join("reminder:12345").await);

    assert!(!h.market.messages().iter().any(|m| m.contains("Reminder")));
}

#[tokio::test(start_paused = true)]
async fn running_order_is_watched_with_backoff() {
    let h = Harness::new().await;
    h.vendor
        .script_pay(Ok(Progress::Running { remains: Some(100) }));
    h.vendor
        .script_status(Err(VendorError::Transport("reset".to_owned())));
    h.vendor
        .script_status(Err(VendorError::Transport("reset".to_owned())));
    h.vendor.script_status(Ok(Progress::Completed));

    place(&h, paid_order("12345", 100.0)).await;
    h.engine.handle(message("login")).await;
    h.engine.handle(message("+")).await;
    assert!(h.engine.tasks().join("fulfil:12345").await);

    assert_eq!(ledger_status(&h, "12345").await, Some(RecordStatus::Pending));
    assert!(h.market.last_message().contains("accepted by the service"));

    assert!(h.engine.tasks().join("watch:12345").await);

    let polls = h.vendor.status_polls();
    assert_eq!(polls.len(), 3);
    let gaps: Vec<u64> = polls.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
    assert_eq!(gaps, vec![300, 600]);

    assert!(h.market.last_message().contains("Your order is complete"));
    let ledger = h.warehouse.ledger.read().await;
    let record = ledger.get("12345").unwrap();
    assert_eq!(record.status, RecordStatus::Success);
    assert!(record.completed_notification_sent);
}

#[tokio::test(start_paused = true)]
async fn resumed_watcher_refunds_failed_order() {
    let h = Harness::new().await;
    h.market.add_order(paid_order("9", 100.0));
    h.warehouse
        .ledger
        .write()
        .await
        .append(&record("9"))
        .await
        .unwrap();
    h.vendor
        .script_status(Ok(Progress::Failed("canceled".to_owned())));

    assert_eq!(h.engine.resume_pending().await, 1);
    assert!(h.engine.tasks().join("watch:9").await);

    assert_eq!(h.market.refunds(), vec!["9".to_owned()]);
    let ledger = h.warehouse.ledger.read().await;
    let record = ledger.get("9").unwrap();
    assert_eq!(record.status, RecordStatus::Refunded);
    assert!(record.refunded);
}

#[tokio::test]
async fn completion_is_announced_once() {
    let h = Harness::new().await;
    let mut done = record("9");
    done.completed_notification_sent = true;
    h.warehouse
        .ledger
        .write()
        .await
        .append(&done)
        .await
        .unwrap();

    h.engine.complete_watched(&done).await.unwrap();

    assert!(h.market.messages().is_empty());
    assert!(h.notifier.reports().is_empty());
}

#[tokio::test]
async fn low_balance_is_latched() {
    let h = Harness::new().await;
    let mut watch = BalanceWatch::default();

    *h.vendor.balance.lock().unwrap() = Ok(3.0);
    h.engine.check_balance(&mut watch).await.unwrap();
    h.engine.check_balance(&mut watch).await.unwrap();

    assert_eq!(h.notifier.kinds(), vec![ReportKind::Balance]);
    assert!(h.warehouse.settings().await.low_balance_notified);

    *h.vendor.balance.lock().unwrap() = Ok(50.0);
    h.engine.check_balance(&mut watch).await.unwrap();

    let reports = h.notifier.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].title, "Balance topped up");
    assert!(!h.warehouse.settings().await.low_balance_notified);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_watchers() {
    let h = Harness::new().await;

    h.engine.spawn_balance_watcher();
    assert!(h.engine.tasks().is_running("balance"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.engine.shutdown().await;

    assert!(!h.engine.tasks().is_running("balance"));
    assert!(h.engine.tasks().is_shutting_down());
}

#[tokio::test]
async fn closed_head_keeps_the_queue_until_its_vendor_call_ends() {
    let h = Harness::new().await;
    let gate = h.vendor.hold_orders();

    place(&h, paid_order("1", 100.0)).await;
    place(&h, paid_order("2", 100.0)).await;
    h.engine.handle(message("loginone")).await;
    h.engine.handle(message("+")).await;
    while h.vendor.requests().is_empty() {
        tokio::task::yield_now().await;
    }

    h.engine
        .handle(MarketEvent::OrderStatusChanged {
            order_id: "1".to_owned(),
            status: OrderStatus::Refunded,
        })
        .await;
    assert!(h.engine.conversation(CHAT, BUYER_ID).await.is_none());

    h.engine.handle(message("logintwo")).await;
    h.engine.handle(message("+")).await;
    assert!(!h.engine.tasks().is_running("fulfil:2"));

    gate.notify_one();
    assert!(h.engine.tasks().join("fulfil:1").await);

    assert_eq!(h.vendor.max_in_flight(), 1);
    assert_eq!(h.vendor.requests().len(), 1);
    let conv = h.engine.conversation(CHAT, BUYER_ID).await.unwrap();
    assert_eq!(conv.order_id, "2");
    assert_eq!(conv.phase(), Phase::AwaitingTarget);
}

#[tokio::test]
async fn ledger_failure_still_answers_the_buyer() {
    let h = Harness::new().await;
    let ledger = h.storage_dir().join(LEDGER_FILE);
    let _ = std::fs::remove_file(&ledger);
    std::fs::create_dir_all(ledger.join("blocked")).unwrap();

    place(&h, paid_order("1", 100.0)).await;
    place(&h, paid_order("2", 100.0)).await;
    h.engine.handle(message("login")).await;
    h.engine.handle(message("+")).await;
    assert!(h.engine.tasks().join("fulfil:1").await);

    assert!(h
        .market
        .messages()
        .iter()
        .any(|m| m.contains("https://funpay.com/orders/1/")));
    let titles: Vec<_> = h.notifier.reports().into_iter().map(|r| r.title).collect();
    assert!(titles.contains(&"Ledger write failed".to_owned()));
    assert!(titles.contains(&"Order delivered".to_owned()));

    let conv = h.engine.conversation(CHAT, BUYER_ID).await.unwrap();
    assert_eq!(conv.order_id, "2");
}

#[tokio::test]
async fn refused_fulfilment_waits_for_the_target_again() {
    let h = Harness::with_settings(|s| s.confirmation_required = false).await;

    place(&h, paid_order("12345", 100.0)).await;
    h.engine.tasks().shutdown(Duration::from_secs(1)).await;
    h.engine.handle(message("login")).await;

    assert!(h.vendor.requests().is_empty());
    let conv = h.engine.conversation(CHAT, BUYER_ID).await.unwrap();
    assert_eq!(conv.phase(), Phase::AwaitingTarget);
    assert_eq!(conv.target(), None);
}
