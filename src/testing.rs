//! Fixtures and in-process fakes shared by the unit tests.

use std::{
    collections::{HashMap, VecDeque},
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::Notify;

use crate::{
    config::EngineConfig,
    conversation::target::TargetKind,
    engine::{Engine, SharedEngine},
    entries::prelude::*,
    marketplace::{EventEnvelope, Links, MarketError, MarketOrder, Marketplace, OrderStatus},
    notify::{Notifier, Report, ReportKind},
    vendor::{Fulfillment, Progress, Rates, VendorError, VendorOrder, VendorRequest},
    warehouse::{self, SharedWarehouse},
};

pub const SELLER_ID: BuyerId = 1;
pub const BUYER_ID: BuyerId = 7;
pub const CHAT: &str = "chat-1";
pub const LOT_ID: &str = "111";

pub fn record(order_id: &str) -> OrderRecord {
    OrderRecord {
        order_id: order_id.to_owned(),
        buyer_username: "buyer".to_owned(),
        buyer_id: BUYER_ID,
        chat_id: CHAT.to_owned(),
        sum: 110.0,
        currency: Currency::RUB,
        quantity: 100.0,
        target: "login".to_owned(),
        service_id: 1,
        vendor_order_id: format!("v-{}", order_id),
        amount_usd: 1.25,
        rate: Some(80.0),
        profit: Some(10.0),
        status: RecordStatus::Pending,
        timestamp: Utc::now(),
        completed_notification_sent: false,
        refunded: false,
    }
}

pub async fn warehouse_with<F>(f: F) -> (SharedWarehouse, TempDir)
where
    F: FnOnce(&mut Settings) + Send,
{
    let dir = tempfile::tempdir().unwrap();
    let warehouse = warehouse::build(dir.path()).await.unwrap();
    warehouse.update_settings(f).await.unwrap();
    (warehouse, dir)
}

pub fn steam_lot() -> LotMapping {
    LotMapping {
        name: "Steam top-up".to_owned(),
        service_id: 1,
        quantity: 1.0,
        target: TargetKind::SteamLogin,
        convert_currency: true,
        target_field: None,
    }
}

pub fn paid_order(id: &str, quantity: f64) -> MarketOrder {
    MarketOrder {
        id: id.to_owned(),
        buyer_id: BUYER_ID,
        buyer_username: "buyer".to_owned(),
        chat_id: CHAT.to_owned(),
        status: OrderStatus::Paid,
        description: "Steam top-up, any region".to_owned(),
        amount: 1,
        price: quantity * 1.1,
        currency: Some(Currency::RUB),
        quantity: Some(quantity),
        fields: HashMap::new(),
    }
}

#[derive(Default)]
pub struct FakeMarket {
    orders: Mutex<HashMap<OrderId, MarketOrder>>,
    sent: Mutex<Vec<(MarketChat, String)>>,
    refunds: Mutex<Vec<OrderId>>,
    lot_toggles: Mutex<Vec<(Vec<String>, bool)>>,
}

impl FakeMarket {
    pub fn add_order(&self, order: MarketOrder) {
        self.orders.lock().unwrap().insert(order.id.clone(), order);
    }

    pub fn set_status(&self, id: &str, status: OrderStatus) {
        if let Some(order) = self.orders.lock().unwrap().get_mut(id) {
            order.status = status;
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn last_message(&self) -> String {
        self.messages().pop().unwrap_or_default()
    }

    pub fn refunds(&self) -> Vec<OrderId> {
        self.refunds.lock().unwrap().clone()
    }

    pub fn lot_toggles(&self) -> Vec<(Vec<String>, bool)> {
        self.lot_toggles.lock().unwrap().clone()
    }
}

#[async_trait]
impl Marketplace for FakeMarket {
    async fn order(&self, id: &str) -> Result<MarketOrder, MarketError> {
        self.orders
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| MarketError::NotFound(id.to_owned()))
    }

    async fn send_message(&self, chat: &str, text: &str) -> Result<(), MarketError> {
        self.sent
            .lock()
            .unwrap()
            .push((chat.to_owned(), text.to_owned()));
        Ok(())
    }

    async fn refund(&self, id: &str) -> Result<(), MarketError> {
        self.refunds.lock().unwrap().push(id.to_owned());
        self.set_status(id, OrderStatus::Refunded);
        Ok(())
    }

    async fn set_lots_active(&self, lots: &[String], active: bool) -> Result<usize, MarketError> {
        self.lot_toggles
            .lock()
            .unwrap()
            .push((lots.to_vec(), active));
        Ok(lots.len())
    }

    async fn events(&self, _after: u64) -> Result<Vec<EventEnvelope>, MarketError> {
        Ok(vec![])
    }
}

/// Scripted vendor. Unscripted calls succeed: orders are created, paid and
/// completed immediately, status polls report a running order.
pub struct FakeVendor {
    pub balance: Mutex<Result<f64, VendorError>>,
    pub rates: Mutex<Rates>,
    pub create: Mutex<VecDeque<Result<VendorOrder, VendorError>>>,
    pub pay: Mutex<VecDeque<Result<Progress, VendorError>>>,
    pub statuses: Mutex<VecDeque<Result<Progress, VendorError>>>,
    requests: Mutex<Vec<VendorRequest>>,
    status_polls: Mutex<Vec<tokio::time::Instant>>,
    gate: Mutex<Option<Arc<Notify>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for FakeVendor {
    fn default() -> Self {
        Self {
            balance: Mutex::new(Ok(100.0)),
            rates: Mutex::new(Rates::from([("rub/usd".to_owned(), 80.0)])),
            create: Mutex::default(),
            pay: Mutex::default(),
            statuses: Mutex::default(),
            requests: Mutex::default(),
            status_polls: Mutex::default(),
            gate: Mutex::default(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl FakeVendor {
    pub fn requests(&self) -> Vec<VendorRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn status_polls(&self) -> Vec<tokio::time::Instant> {
        self.status_polls.lock().unwrap().clone()
    }

    /// Makes every `create_order` wait for a permit of the returned gate.
    pub fn hold_orders(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Most `create_order` calls that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn script_pay(&self, result: Result<Progress, VendorError>) {
        self.pay.lock().unwrap().push_back(result);
    }

    pub fn script_create(&self, result: Result<VendorOrder, VendorError>) {
        self.create.lock().unwrap().push_back(result);
    }

    pub fn script_status(&self, result: Result<Progress, VendorError>) {
        self.statuses.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl Fulfillment for FakeVendor {
    fn name(&self) -> &'static str {
        "fake vendor"
    }

    async fn balance(&self) -> Result<f64, VendorError> {
        self.balance.lock().unwrap().clone()
    }

    async fn rates(&self) -> Result<Rates, VendorError> {
        Ok(self.rates.lock().unwrap().clone())
    }

    async fn create_order(&self, request: &VendorRequest) -> Result<VendorOrder, VendorError> {
        let id = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            format!("v-{}", requests.len())
        };

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.create.lock().unwrap().pop_front().unwrap_or(Ok(VendorOrder {
            id,
            charge: Some(request.quantity),
        }))
    }

    async fn pay_order(&self, _order: &VendorOrder) -> Result<Progress, VendorError> {
        self.pay
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Progress::Completed))
    }

    async fn status(&self, _vendor_order_id: &str) -> Result<Progress, VendorError> {
        self.status_polls
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Progress::Running { remains: None }))
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    reports: Mutex<Vec<Report>>,
}

impl FakeNotifier {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<ReportKind> {
        self.reports().iter().map(|r| r.kind).collect()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, report: Report) {
        self.reports.lock().unwrap().push(report);
    }
}

/// An engine wired to fakes over a temporary storage directory that maps
/// lot `111` to a Steam top-up.
pub struct Harness {
    pub engine: SharedEngine,
    pub market: Arc<FakeMarket>,
    pub vendor: Arc<FakeVendor>,
    pub notifier: Arc<FakeNotifier>,
    pub warehouse: SharedWarehouse,
    dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(|_| ()).await
    }

    pub fn storage_dir(&self) -> &Path {
        self.dir.path()
    }

    pub async fn with_settings<F>(f: F) -> Self
    where
        F: FnOnce(&mut Settings) + Send,
    {
        let (warehouse, dir) = warehouse_with(f).await;
        warehouse
            .lots
            .write()
            .await
            .update(|lots| {
                lots.insert(LOT_ID.to_owned(), steam_lot());
            })
            .await
            .unwrap();

        let market = Arc::new(FakeMarket::default());
        let vendor = Arc::new(FakeVendor::default());
        let notifier = Arc::new(FakeNotifier::default());

        let engine = Arc::new(Engine::new(
            market.clone(),
            vendor.clone(),
            notifier.clone(),
            warehouse.clone(),
            EngineConfig::default(),
            Links::default(),
            SELLER_ID,
        ));

        Self {
            engine,
            market,
            vendor,
            notifier,
            warehouse,
            dir,
        }
    }
}
