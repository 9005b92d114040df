use std::path::Path;
use std::sync::Arc;

use linked_hash_map::LinkedHashMap;
use log::info;
use tables::{document::JsonDocument, index::Index, json_file::JsonTable};
use tokio::sync::RwLock;

use crate::entries::*;

pub mod prelude {
    pub use super::{LedgerTable, LotMap, SharedWarehouse, Warehouse};
    pub use tables::prelude::*;
}

use tables::prelude::*;

pub type SharedWarehouse = Arc<Warehouse>;
/// Marketplace lot id to the vendor service behind it.
pub type LotMap = LinkedHashMap<String, LotMapping>;

pub const SETTINGS_FILE: &str = "settings.json";
pub const LEDGER_FILE: &str = "orders.json";
pub const BLACKLIST_FILE: &str = "black_list.json";
pub const LOTS_FILE: &str = "lots.json";

/// Order ledger with a lookup by marketplace order id.
pub struct LedgerTable {
    pub inner: JsonTable<OrderRecord>,
    pub by_order_id: Index<OrderId, OrderRecord>,
}

impl LedgerTable {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, tables::Error> {
        let inner = JsonTable::open(path.as_ref()).await?;
        let by_order_id = Index::build(|r: &OrderRecord| r.order_id.clone(), inner.rows());
        Ok(Self { inner, by_order_id })
    }

    pub fn rows(&self) -> &[OrderRecord] {
        self.inner.rows()
    }

    pub fn get(&self, order_id: &str) -> Option<&OrderRecord> {
        self.by_order_id
            .get(&order_id.to_owned())
            .and_then(|row| self.inner.rows().get(row))
    }

    pub async fn append(&mut self, record: &OrderRecord) -> Result<usize, tables::Error> {
        let row = self.inner.extend_one(record).await?;
        self.by_order_id.insert(row, record);
        Ok(row)
    }

    /// Applies `f` to the record of `order_id` and persists it.
    pub async fn modify<F>(
        &mut self,
        order_id: &str,
        f: F,
    ) -> Result<Option<OrderRecord>, tables::Error>
    where
        F: FnOnce(&mut OrderRecord),
    {
        let Some(row) = self.by_order_id.get(&order_id.to_owned()) else {
            return Ok(None);
        };
        let Some(mut record) = self.inner.rows().get(row).cloned() else {
            return Ok(None);
        };

        f(&mut record);
        self.inner.update_one(row, &record).await?;
        Ok(Some(record))
    }

    pub async fn refresh(&mut self) -> Result<(), tables::Error> {
        self.inner.refresh().await?;
        self.by_order_id.rebuild(self.inner.rows());
        Ok(())
    }
}

/// Every persisted store, each behind its own lock.
pub struct Warehouse {
    pub settings: RwLock<JsonDocument<Settings>>,
    pub ledger: RwLock<LedgerTable>,
    pub blacklist: RwLock<JsonDocument<Vec<String>>>,
    pub lots: RwLock<JsonDocument<LotMap>>,
}

impl Warehouse {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, tables::Error> {
        let dir = dir.as_ref();

        let warehouse = Self {
            settings: RwLock::new(JsonDocument::open(dir.join(SETTINGS_FILE)).await?),
            ledger: RwLock::new(LedgerTable::open(dir.join(LEDGER_FILE)).await?),
            blacklist: RwLock::new(JsonDocument::open(dir.join(BLACKLIST_FILE)).await?),
            lots: RwLock::new(JsonDocument::open(dir.join(LOTS_FILE)).await?),
        };

        info!("Storage opened at {}", dir.display());
        Ok(warehouse)
    }

    /// Re-reads every store from disk, picking up manual edits.
    pub async fn reload(&self) -> Result<(), tables::Error> {
        self.settings.write().await.reload().await?;
        self.ledger.write().await.refresh().await?;
        self.blacklist.write().await.reload().await?;
        self.lots.write().await.reload().await?;
        info!("Storage reloaded");
        Ok(())
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.get().clone()
    }

    pub async fn update_settings<R, F>(&self, f: F) -> Result<R, tables::Error>
    where
        F: FnOnce(&mut Settings) -> R + Send,
    {
        self.settings.write().await.update(f).await
    }

    pub async fn is_denylisted(&self, target: &str) -> bool {
        let target = target.trim().to_lowercase();
        self.blacklist
            .read()
            .await
            .get()
            .iter()
            .any(|entry| *entry == target)
    }

    /// Adds a lower-cased entry, returning `false` when it was already there.
    pub async fn denylist_add(&self, target: &str) -> Result<bool, tables::Error> {
        let target = target.trim().to_lowercase();
        self.blacklist
            .write()
            .await
            .update(|list| {
                if list.contains(&target) {
                    false
                } else {
                    list.push(target);
                    true
                }
            })
            .await
    }

    pub async fn denylist_remove(&self, index: usize) -> Result<Option<String>, tables::Error> {
        self.blacklist
            .write()
            .await
            .update(|list| (index < list.len()).then(|| list.remove(index)))
            .await
    }

    /// First lot whose name appears in the order description.
    pub async fn lot_for(&self, description: &str) -> Option<(String, LotMapping)> {
        let description = description.to_lowercase();
        self.lots
            .read()
            .await
            .get()
            .iter()
            .find(|(_, lot)| description.contains(&lot.name.to_lowercase()))
            .map(|(id, lot)| (id.clone(), lot.clone()))
    }

    pub async fn lot_ids(&self) -> Vec<String> {
        self.lots.read().await.get().keys().cloned().collect()
    }
}

pub async fn build(dir: impl AsRef<Path>) -> Result<SharedWarehouse, tables::Error> {
    Ok(Arc::new(Warehouse::open(dir).await?))
}
