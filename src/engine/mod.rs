//! Drives paid orders from the marketplace through the buyer conversation
//! to the vendor and back.

pub mod queue;
pub mod tasks;
pub mod watch;

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::{Local, Utc};
use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use crate::{
    config::EngineConfig,
    conversation::prelude::*,
    entries::prelude::*,
    marketplace::{ChatMessage, Links, MarketEvent, MarketOrder, OrderStatus, SharedMarket},
    notify::{Report, ReportKind, SharedNotifier},
    vendor::{Progress, SharedVendor, VendorError, VendorOrder, VendorRequest},
    warehouse::SharedWarehouse,
    Result, UnkError,
};
use queue::{BuyerQueues, QueuedOrder};
use tasks::Tasks;

pub type SharedEngine = Arc<Engine>;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Default)]
struct State {
    conversations: ConversationStore,
    queues: BuyerQueues,
    reminded: HashSet<OrderId>,
}

pub struct Engine {
    market: SharedMarket,
    vendor: SharedVendor,
    notifier: SharedNotifier,
    warehouse: SharedWarehouse,
    config: EngineConfig,
    links: Links,
    seller_id: BuyerId,
    state: Mutex<State>,
    tasks: Tasks,
}

/// Who a buyer-facing side effect is about.
struct Party<'a> {
    order_id: &'a str,
    chat: &'a str,
    buyer_id: BuyerId,
    buyer_username: &'a str,
}

impl<'a> From<&'a Conversation> for Party<'a> {
    fn from(conv: &'a Conversation) -> Self {
        Self {
            order_id: &conv.order_id,
            chat: &conv.chat,
            buyer_id: conv.buyer_id,
            buyer_username: &conv.buyer_username,
        }
    }
}

impl<'a> From<&'a OrderRecord> for Party<'a> {
    fn from(record: &'a OrderRecord) -> Self {
        Self {
            order_id: &record.order_id,
            chat: &record.chat_id,
            buyer_id: record.buyer_id,
            buyer_username: &record.buyer_username,
        }
    }
}

impl Party<'_> {
    fn report(&self, kind: ReportKind, title: &str) -> Report {
        Report::new(kind, title)
            .order(self.order_id)
            .buyer(self.buyer_id, self.buyer_username)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Engine {
    pub fn new(
        market: SharedMarket,
        vendor: SharedVendor,
        notifier: SharedNotifier,
        warehouse: SharedWarehouse,
        config: EngineConfig,
        links: Links,
        seller_id: BuyerId,
    ) -> Self {
        Self {
            market,
            vendor,
            notifier,
            warehouse,
            config,
            links,
            seller_id,
            state: Mutex::new(State::default()),
            tasks: Tasks::new(),
        }
    }

    pub fn tasks(&self) -> &Tasks {
        &self.tasks
    }

    pub async fn conversation(&self, chat: &str, buyer: BuyerId) -> Option<Conversation> {
        self.state.lock().await.conversations.get(chat, buyer).cloned()
    }

    pub async fn conversations(&self) -> usize {
        self.state.lock().await.conversations.len()
    }

    pub async fn shutdown(&self) {
        self.tasks.shutdown(SHUTDOWN_GRACE).await;
    }

    /// Handles one marketplace event. Errors are logged, never propagated.
    pub async fn handle(self: &Arc<Self>, event: MarketEvent) {
        let result = match event {
            MarketEvent::NewOrder { order } => self.on_new_order(order).await,
            MarketEvent::NewMessage { message } => self.on_message(message).await,
            MarketEvent::OrderStatusChanged { order_id, status } => {
                self.on_status_changed(&order_id, status).await;
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("Unable to handle marketplace event: {}", e);
        }
    }

    async fn on_new_order(self: &Arc<Self>, order: MarketOrder) -> Result<()> {
        let settings = self.warehouse.settings().await;

        let order = if settings.order_verification_enabled {
            match self.market.order(&order.id).await {
                Ok(live) => live,
                Err(e) => {
                    warn!("Order {} could not be verified: {}", order.id, e);
                    let report = Report::new(ReportKind::Error, "Possible forged order")
                        .order(&order.id)
                        .buyer(order.buyer_id, &order.buyer_username)
                        .field("Description", &order.description)
                        .field("Error", e);
                    self.notifier.notify(report).await;
                    return Ok(());
                }
            }
        } else {
            order
        };

        if order.status.is_terminal() {
            debug!("Order {} is already {:?}", order.id, order.status);
            return Ok(());
        }

        let Some((lot_id, lot)) = self.warehouse.lot_for(&order.description).await else {
            debug!("Order {} matches no lot: {}", order.id, order.description);
            return Ok(());
        };

        if self.warehouse.ledger.read().await.get(&order.id).is_some() {
            debug!("Order {} is already in the ledger", order.id);
            return Ok(());
        }

        let terms = OrderTerms {
            quantity: order
                .quantity
                .unwrap_or(lot.quantity * order.amount as f64),
            currency: order.currency.unwrap_or(Currency::RUB),
            price: order.price,
            lot,
        };
        info!(
            "New order {} from {} for lot {}: {}",
            order.id,
            order.buyer_username,
            lot_id,
            terms.amount_text()
        );

        if terms.lot.convert_currency {
            let (min, max) = self.bounds(&terms.currency, &settings).await;
            let below = min.map_or(false, |min| terms.quantity < min);
            let above = max.map_or(false, |max| terms.quantity > max);

            if below || above {
                return self.reject_out_of_bounds(&order, &terms, min, max).await;
            }
        }

        let prefill = terms
            .lot
            .target_field
            .as_ref()
            .and_then(|field| order.fields.get(field))
            .cloned();

        let queued = QueuedOrder {
            order_id: order.id.clone(),
            chat: order.chat_id.clone(),
            buyer_username: order.buyer_username.clone(),
            terms,
            prefill,
        };

        let position = self
            .state
            .lock()
            .await
            .queues
            .push(order.buyer_id, queued.clone());

        if position == 1 {
            self.start(order.buyer_id, queued).await
        } else {
            info!("Order {} queued at position {}", order.id, position);
            let wait = position as u64 * self.config.wait_per_position;
            let text = crate::render!(settings.templates.queued,
                "position" => position,
                "wait" => wait);
            self.send(&order.chat_id, &text).await;
            Ok(())
        }
    }

    /// Lowest and highest acceptable order amount in `currency`. The upper
    /// bound is what the vendor balance can buy and is skipped when unknown.
    async fn bounds(&self, currency: &Currency, settings: &Settings) -> (Option<f64>, Option<f64>) {
        let min = settings.min_amount(currency);

        let max = match (self.vendor.balance().await, self.rate(currency).await) {
            (Ok(balance), Ok(rate)) => Some(balance * rate),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Upper order bound unknown: {}", e);
                None
            }
        };

        (min, max)
    }

    async fn reject_out_of_bounds(
        &self,
        order: &MarketOrder,
        terms: &OrderTerms,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<()> {
        let settings = self.warehouse.settings().await;
        let min = min.map_or("0".to_owned(), |v| terms.currency.format_amount(v));
        let max = max.map_or("∞".to_owned(), |v| terms.currency.format_amount(v));
        warn!(
            "Order {}: amount {} is outside {} - {}",
            order.id,
            terms.amount_text(),
            min,
            max
        );

        if let Err(e) = self.market.refund(&order.id).await {
            error!("Unable to refund order {}: {}", order.id, e);
        }

        let text = crate::render!(settings.templates.out_of_bounds,
            "amount" => terms.amount_text(),
            "min" => min,
            "max" => max);
        self.send(&order.chat_id, &text).await;

        let report = Report::new(ReportKind::Refund, "Amount out of bounds, order refunded")
            .order(&order.id)
            .buyer(order.buyer_id, &order.buyer_username)
            .field("Amount", terms.amount_text())
            .field("Limits", format!("{} - {}", min, max));
        self.notifier.notify(report).await;
        Ok(())
    }

    /// Opens the conversation of the order at the head of a buyer queue.
    async fn start(self: &Arc<Self>, buyer: BuyerId, queued: QueuedOrder) -> Result<()> {
        let settings = self.warehouse.settings().await;
        let mut conv = Conversation::new(
            queued.order_id,
            queued.chat,
            buyer,
            queued.buyer_username,
            queued.terms,
        );

        let step = match queued.prefill.as_deref() {
            Some(target) => match conv.step(target, settings.confirmation_required) {
                Step::Rejected(e) => {
                    debug!("Order {}: prefilled target ignored: {}", conv.order_id, e);
                    None
                }
                step => Some(step),
            },
            None => None,
        };

        let displaced = self.state.lock().await.conversations.insert(conv.clone());
        if let Some(displaced) = displaced {
            warn!(
                "Conversation of order {} replaced by order {}",
                displaced.order_id, conv.order_id
            );
        }
        info!("Order {}: conversation started", conv.order_id);

        match step {
            Some(step) => self.respond(conv, step, &settings).await,
            None => {
                let text = crate::render!(settings.templates.after_payment,
                    "target_name" => conv.terms.target_kind().display_name(),
                    "amount" => conv.terms.amount_text());
                self.send(&conv.chat, &text).await;
                Ok(())
            }
        }
    }

    async fn on_message(self: &Arc<Self>, message: ChatMessage) -> Result<()> {
        if message.author_id == self.seller_id {
            return Ok(());
        }

        let Some(order_id) = self
            .state
            .lock()
            .await
            .conversations
            .get(&message.chat_id, message.author_id)
            .map(|c| c.order_id.clone())
        else {
            return Ok(());
        };

        match self.market.order(&order_id).await {
            Ok(order) if order.status.is_terminal() => {
                info!("Order {} is {:?}, dropping its conversation", order_id, order.status);
                self.drop_order(&order_id).await;
                return Ok(());
            }
            Ok(_) => (),
            Err(e) => warn!("Unable to check order {}: {}", order_id, e),
        }

        let settings = self.warehouse.settings().await;
        let (step, conv) = {
            let mut state = self.state.lock().await;
            let Some(conv) = state
                .conversations
                .get_mut(&message.chat_id, message.author_id)
                .filter(|c| c.order_id == order_id)
            else {
                return Ok(());
            };

            let step = conv.step(&message.text, settings.confirmation_required);
            (step, conv.clone())
        };

        info!("Order {}: {:?} -> {:?}", order_id, step, conv.phase());
        self.respond(conv, step, &settings).await
    }

    async fn respond(self: &Arc<Self>, conv: Conversation, step: Step, settings: &Settings) -> Result<()> {
        let templates = &settings.templates;
        let target_name = conv.terms.target_kind().display_name();

        let text = match step {
            Step::Rejected(reason) => crate::render!(templates.rejected,
                "reason" => reason,
                "target_name" => target_name),
            Step::PromptConfirmation | Step::Reprompt => crate::render!(templates.confirm_prompt,
                "target_name" => target_name,
                "target" => conv.target().unwrap_or_default(),
                "amount" => conv.terms.amount_text()),
            Step::TargetCleared => crate::render!(templates.target_cleared,
                "target_name" => target_name),
            Step::Fulfil => {
                self.spawn_fulfil(conv).await;
                return Ok(());
            }
            Step::Ignored => return Ok(()),
        };

        self.send(&conv.chat, &text).await;
        Ok(())
    }

    fn spawn_fulfil(self: &Arc<Self>, conv: Conversation) -> futures::future::BoxFuture<'_, ()> {
        Box::pin(async move {
            let engine = self.clone();
            let order_id = conv.order_id.clone();
            let name = format!("fulfil:{}", order_id);

            // A vendor call in flight is never interrupted; shutdown waits for it.
            let spawned = self.tasks.spawn(name, move |_| async move {
                let order_id = conv.order_id.clone();
                if let Err(e) = engine.fulfil(conv).await {
                    error!("Fulfilment of order {} failed: {}", order_id, e);
                }
            });

            if !spawned {
                warn!("Order {}: fulfilment refused, waiting for the target again", order_id);
                if let Some(conv) = self.state.lock().await.conversations.by_order_mut(&order_id) {
                    conv.retry_target();
                }
            }
        })
    }

    async fn fulfil(self: &Arc<Self>, conv: Conversation) -> Result<()> {
        let settings = self.warehouse.settings().await;
        let party = Party::from(&conv);
        let target = conv
            .target()
            .map(str::to_owned)
            .ok_or_else(|| UnkError::conversation("fulfilment without a target"))?;
        let target_name = conv.terms.target_kind().display_name();

        match self.market.order(&conv.order_id).await {
            Ok(order) if order.status.is_terminal() => {
                info!("Order {} became {:?} before fulfilment", conv.order_id, order.status);
                self.close(&conv).await;
                return Ok(());
            }
            Ok(_) => (),
            Err(e) => warn!("Unable to check order {}: {}", conv.order_id, e),
        }

        if self.warehouse.is_denylisted(&target).await {
            warn!("Order {}: target {} is denylisted", conv.order_id, target);
            let text = crate::render!(settings.templates.denylisted, "target_name" => target_name);
            self.send(&conv.chat, &text).await;

            let report = party
                .report(ReportKind::Error, "Denylisted target, order left open")
                .field(target_name, &target);
            self.notifier.notify(report).await;

            self.close(&conv).await;
            return Ok(());
        }

        let (amount, rate) = if conv.terms.lot.convert_currency {
            match self.rate(&conv.terms.currency).await {
                Ok(rate) => (round2(conv.terms.quantity / rate), Some(rate)),
                Err(e) => return self.fail(&conv, &target, e).await,
            }
        } else {
            (conv.terms.quantity, None)
        };

        let request = VendorRequest {
            service_id: conv.terms.lot.service_id,
            quantity: amount,
            target: target.clone(),
            custom_id: minimal_id::Generator::new_id().to_string(),
        };
        info!(
            "Order {}: {} order for {} x{} (key {})",
            conv.order_id,
            self.vendor.name(),
            target,
            amount,
            request.custom_id
        );

        let outcome = async {
            let order = self.vendor.create_order(&request).await?;
            let progress = self.vendor.pay_order(&order).await?;
            Ok::<_, VendorError>((order, progress))
        }
        .await;

        match outcome {
            Ok((order, Progress::Completed)) => {
                self.succeed(&conv, &target, &order, amount, rate, &settings).await
            }
            Ok((order, Progress::Running { .. })) => {
                self.accept(&conv, &target, &order, amount, rate, &settings).await
            }
            Ok((_, Progress::Failed(reason))) => {
                self.fail(&conv, &target, VendorError::Failed(reason)).await
            }
            Err(VendorError::InvalidTarget) => {
                info!("Order {}: vendor rejected target {}", conv.order_id, target);
                let reopened = match self
                    .state
                    .lock()
                    .await
                    .conversations
                    .by_order_mut(&conv.order_id)
                {
                    Some(conv) => {
                        conv.retry_target();
                        true
                    }
                    None => false,
                };
                if !reopened {
                    self.close(&conv).await;
                    return Ok(());
                }

                let text = crate::render!(settings.templates.invalid_target, "target_name" => target_name);
                self.send(&conv.chat, &text).await;
                Ok(())
            }
            Err(e) => self.fail(&conv, &target, e).await,
        }
    }

    fn record(
        conv: &Conversation,
        target: &str,
        order: &VendorOrder,
        amount: f64,
        rate: Option<f64>,
        status: RecordStatus,
    ) -> OrderRecord {
        let amount_usd = if conv.terms.lot.convert_currency {
            amount
        } else {
            order.charge.unwrap_or_default()
        };

        OrderRecord {
            order_id: conv.order_id.clone(),
            buyer_username: conv.buyer_username.clone(),
            buyer_id: conv.buyer_id,
            chat_id: conv.chat.clone(),
            sum: conv.terms.price,
            currency: conv.terms.currency,
            quantity: conv.terms.quantity,
            target: target.to_owned(),
            service_id: conv.terms.lot.service_id,
            vendor_order_id: order.id.clone(),
            amount_usd,
            rate,
            profit: rate.map(|rate| round2(conv.terms.price - amount_usd * rate)),
            status,
            timestamp: Utc::now(),
            completed_notification_sent: false,
            refunded: false,
        }
    }

    async fn succeed(
        self: &Arc<Self>,
        conv: &Conversation,
        target: &str,
        order: &VendorOrder,
        amount: f64,
        rate: Option<f64>,
        settings: &Settings,
    ) -> Result<()> {
        let mut record = Self::record(conv, target, order, amount, rate, RecordStatus::Success);
        record.completed_notification_sent = true;
        self.persist(&record).await;
        info!("Order {} delivered, vendor order {}", conv.order_id, order.id);

        let order_link = self.links.order(&conv.order_id);
        let text = crate::render!(settings.templates.success,
            "target_name" => conv.terms.target_kind().display_name(),
            "target" => target,
            "amount" => conv.terms.amount_text(),
            "time" => Local::now().format("%d.%m.%Y %H:%M"),
            "order_link" => order_link);
        self.send(&conv.chat, &text).await;

        let mut report = Party::from(conv)
            .report(ReportKind::Success, "Order delivered")
            .field("Price", conv.terms.currency.format_amount(conv.terms.price))
            .field("Target", target)
            .field("Amount", conv.terms.amount_text())
            .field("Charge", format!("{:.2}$", record.amount_usd));
        if let Some(rate) = rate {
            report = report.field("Rate", format!("{:.4}", rate));
        }
        if let Ok(balance) = self.vendor.balance().await {
            report = report.field("Balance", format!("{:.2}$", balance));
        }
        self.notifier.notify(report).await;

        if settings.confirmation_reminder {
            self.schedule_reminder(&conv.order_id, &conv.chat).await;
        }

        self.close(conv).await;
        Ok(())
    }

    async fn accept(
        self: &Arc<Self>,
        conv: &Conversation,
        target: &str,
        order: &VendorOrder,
        amount: f64,
        rate: Option<f64>,
        settings: &Settings,
    ) -> Result<()> {
        let record = Self::record(conv, target, order, amount, rate, RecordStatus::Pending);
        self.persist(&record).await;
        info!("Order {} accepted, vendor order {} running", conv.order_id, order.id);

        let text = crate::render!(settings.templates.started,
            "vendor_order" => order.id,
            "target_name" => conv.terms.target_kind().display_name(),
            "target" => target);
        self.send(&conv.chat, &text).await;

        self.spawn_watcher(record);
        self.close(conv).await;
        Ok(())
    }

    async fn fail(self: &Arc<Self>, conv: &Conversation, target: &str, e: VendorError) -> Result<()> {
        let settings = self.warehouse.settings().await;
        let party = Party::from(conv);
        error!("Order {}: {}", conv.order_id, e);

        self.send(&conv.chat, &settings.templates.failure).await;

        let report = party
            .report(ReportKind::Error, "Order failed")
            .field("Target", target)
            .field("Amount", conv.terms.amount_text())
            .field("Error", &e);
        self.notifier.notify(report).await;

        if e == VendorError::InsufficientFunds && settings.deactivate_lots_on_insufficient_funds {
            let lots = self.warehouse.lot_ids().await;
            match self.market.set_lots_active(&lots, false).await {
                Ok(count) => warn!("Insufficient funds: {} lots deactivated", count),
                Err(e) => error!("Unable to deactivate lots: {}", e),
            }
        }

        let refunded = self.refund(&party, &e.to_string(), &settings).await;

        let mut record = Self::record(
            conv,
            target,
            &VendorOrder {
                id: String::new(),
                charge: None,
            },
            0.0,
            None,
            if refunded {
                RecordStatus::Refunded
            } else {
                RecordStatus::Failed
            },
        );
        record.refunded = refunded;
        self.persist(&record).await;

        self.close(conv).await;
        Ok(())
    }

    /// Appends to the ledger. A failed write is reported to the operators and
    /// the order goes on, since the vendor may already have charged for it.
    async fn persist(&self, record: &OrderRecord) {
        let result = self.warehouse.ledger.write().await.append(record).await;
        if let Err(e) = result {
            error!("Unable to record order {}: {}", record.order_id, e);
            let report = Party::from(record)
                .report(ReportKind::Error, "Ledger write failed")
                .field("Status", format!("{:?}", record.status))
                .field("Vendor order", &record.vendor_order_id)
                .field("Error", e);
            self.notifier.notify(report).await;
        }
    }

    /// Refunds the order or asks the operators to. Returns whether the
    /// marketplace accepted the refund.
    async fn refund(&self, party: &Party<'_>, reason: &str, settings: &Settings) -> bool {
        if !settings.auto_refund_on_error {
            let report = party
                .report(ReportKind::Refund, "Manual refund required")
                .field("Reason", reason);
            self.notifier.notify(report).await;
            return false;
        }

        match self.market.refund(party.order_id).await {
            Ok(()) => {
                info!("Order {} refunded", party.order_id);
                self.send(party.chat, &settings.templates.refunded).await;

                let report = party
                    .report(ReportKind::Refund, "Order refunded")
                    .field("Reason", reason);
                self.notifier.notify(report).await;
                true
            }
            Err(e) => {
                error!("Unable to refund order {}: {}", party.order_id, e);
                let report = party
                    .report(ReportKind::Error, "Automatic refund failed")
                    .field("Reason", reason)
                    .field("Error", e);
                self.notifier.notify(report).await;
                false
            }
        }
    }

    /// Removes the conversation and opens the buyer's next queued order.
    async fn close(self: &Arc<Self>, conv: &Conversation) {
        let next = {
            let mut state = self.state.lock().await;
            state.conversations.remove_order(&conv.order_id);
            state.queues.finish(conv.buyer_id, &conv.order_id)
        };

        if let Some(next) = next {
            if let Err(e) = self.start(conv.buyer_id, next).await {
                error!("Unable to start the next order of buyer {}: {}", conv.buyer_id, e);
            }
        }
    }

    async fn on_status_changed(self: &Arc<Self>, order_id: &str, status: OrderStatus) {
        if status.is_terminal() {
            info!("Order {} is {:?}", order_id, status);
            self.drop_order(order_id).await;
        }
    }

    /// Forgets a terminal order wherever it is. An order whose vendor call
    /// is in flight keeps the head of its buyer queue until the fulfilment
    /// task closes it.
    async fn drop_order(self: &Arc<Self>, order_id: &str) {
        let next = {
            let mut state = self.state.lock().await;
            let removed = state.conversations.remove_order(order_id);
            if removed.map_or(false, |c| c.phase() == Phase::Fulfilling) {
                debug!("Order {}: fulfilment in flight, queue left to it", order_id);
                return;
            }

            match state.queues.remove(order_id) {
                Some((buyer, true)) => state.queues.head(buyer).cloned().map(|next| (buyer, next)),
                _ => None,
            }
        };

        if let Some((buyer, next)) = next {
            if let Err(e) = self.start(buyer, next).await {
                error!("Unable to start the next order of buyer {}: {}", buyer, e);
            }
        }
    }

    async fn schedule_reminder(self: &Arc<Self>, order_id: &str, chat: &str) {
        if !self.state.lock().await.reminded.insert(order_id.to_owned()) {
            return;
        }

        let engine = self.clone();
        let order_id = order_id.to_owned();
        let chat = chat.to_owned();

        let key = order_id.clone();
        let spawned = self.tasks.spawn(format!("reminder:{}", order_id), move |cancel| async move {
            tokio::select! {
                _ = cancel.cancelled() => (),
                _ = tokio::time::sleep(engine.config.reminder_delay()) => {
                    if let Err(e) = engine.remind(&order_id, &chat).await {
                        error!("Unable to remind about order {}: {}", order_id, e);
                    }
                }
            }

            engine.state.lock().await.reminded.remove(&order_id);
        });

        if !spawned {
            self.state.lock().await.reminded.remove(&key);
        }
    }

    async fn remind(&self, order_id: &str, chat: &str) -> Result<()> {
        let order = self.market.order(order_id).await?;
        if order.status.is_terminal() {
            debug!("Order {} is {:?}, no reminder", order_id, order.status);
            return Ok(());
        }

        let settings = self.warehouse.settings().await;
        let text = crate::render!(settings.templates.reminder,
            "order_link" => self.links.order(order_id));
        self.send(chat, &text).await;
        info!("Order {}: confirmation reminder sent", order_id);
        Ok(())
    }

    async fn rate(&self, currency: &Currency) -> std::result::Result<f64, VendorError> {
        if *currency == Currency::USD {
            return Ok(1.0);
        }

        let key = currency.rate_key();
        self.vendor
            .rates()
            .await?
            .get(&key)
            .copied()
            .filter(|rate| *rate > 0.0)
            .ok_or_else(|| VendorError::Failed(format!("no exchange rate for {}", key)))
    }

    async fn send(&self, chat: &str, text: &str) {
        if let Err(e) = self.market.send_message(chat, text).await {
            error!("Unable to message chat {}: {}", chat, e);
        }
    }
}

#[cfg(test)]
mod tests;
