use std::{sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use super::{Engine, Party};
use crate::{
    config::EngineConfig,
    entries::prelude::*,
    notify::{Report, ReportKind},
    vendor::{Progress, VendorError},
    Result,
};

/// Delays between vendor status polls of a running order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub rate_limit: Duration,
}

impl From<&EngineConfig> for Backoff {
    fn from(config: &EngineConfig) -> Self {
        Self {
            base: Duration::from_secs(config.status_poll_base),
            max: Duration::from_secs(config.status_poll_max),
            rate_limit: Duration::from_secs(config.rate_limit_delay),
        }
    }
}

impl Backoff {
    /// `failures` counts consecutive failed polls including this one.
    pub fn next_delay(&self, error: Option<&VendorError>, failures: u32) -> Duration {
        match error {
            None => self.base,
            Some(VendorError::RateLimited) => self.rate_limit,
            Some(VendorError::Transport(_)) => {
                let factor = 2u32.saturating_pow(failures.saturating_sub(1));
                self.base.saturating_mul(factor).min(self.max)
            }
            Some(_) => self.base,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BalanceChange {
    pub increased_from: Option<f64>,
    pub went_low: bool,
    pub recovered: bool,
}

/// Remembers the last seen balance between polls.
#[derive(Debug, Default)]
pub struct BalanceWatch {
    previous: Option<f64>,
}

impl BalanceWatch {
    /// `latched` is whether the low balance notice was already sent.
    pub fn observe(&mut self, balance: f64, threshold: f64, latched: bool) -> BalanceChange {
        let increased_from = self.previous.filter(|previous| balance > *previous);
        self.previous = Some(balance);

        BalanceChange {
            increased_from,
            went_low: balance < threshold && !latched,
            recovered: balance >= threshold && latched,
        }
    }
}

impl Engine {
    /// Restarts status watchers of orders the vendor was still working on.
    pub async fn resume_pending(self: &Arc<Self>) -> usize {
        let pending: Vec<OrderRecord> = self
            .warehouse
            .ledger
            .read()
            .await
            .rows()
            .iter()
            .filter(|r| r.status == RecordStatus::Pending && !r.vendor_order_id.is_empty())
            .cloned()
            .collect();

        let count = pending.len();
        for record in pending {
            self.spawn_watcher(record);
        }

        if count > 0 {
            info!("Resumed {} pending orders", count);
        }
        count
    }

    pub(super) fn spawn_watcher(self: &Arc<Self>, record: OrderRecord) {
        let engine = self.clone();
        let name = format!("watch:{}", record.order_id);

        self.tasks
            .spawn(name, move |cancel| engine.watch_order(record, cancel));
    }

    async fn watch_order(self: Arc<Self>, record: OrderRecord, cancel: CancellationToken) {
        let backoff = Backoff::from(&self.config);
        let mut delay = backoff.base;
        let mut failures = 0;

        info!(
            "Watching vendor order {} of order {}",
            record.vendor_order_id, record.order_id
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Stopped watching order {}", record.order_id);
                    break;
                }
                _ = tokio::time::sleep(delay) => (),
            }

            let result = match self.vendor.status(&record.vendor_order_id).await {
                Ok(Progress::Completed) => self.complete_watched(&record).await,
                Ok(Progress::Failed(reason)) => self.fail_watched(&record, &reason).await,
                Ok(Progress::Running { remains }) => {
                    debug!("Order {} still running, remains {:?}", record.order_id, remains);
                    failures = 0;
                    delay = backoff.next_delay(None, failures);
                    continue;
                }
                Err(e) => {
                    failures += 1;
                    delay = backoff.next_delay(Some(&e), failures);
                    warn!(
                        "Status of order {} unavailable ({}), next check in {:?}",
                        record.order_id, e, delay
                    );
                    continue;
                }
            };

            if let Err(e) = result {
                error!("Unable to finish order {}: {}", record.order_id, e);
            }
            break;
        }
    }

    pub(super) async fn complete_watched(self: &Arc<Self>, record: &OrderRecord) -> Result<()> {
        let already_sent = self
            .warehouse
            .ledger
            .read()
            .await
            .get(&record.order_id)
            .map_or(false, |r| r.completed_notification_sent);
        if already_sent {
            debug!("Completion of order {} already announced", record.order_id);
            return Ok(());
        }

        let settings = self.warehouse.settings().await;
        let text = crate::render!(settings.templates.completed,
            "vendor_order" => record.vendor_order_id,
            "order_link" => self.links.order(&record.order_id));
        self.send(&record.chat_id, &text).await;

        self.warehouse
            .ledger
            .write()
            .await
            .modify(&record.order_id, |r| {
                r.status = RecordStatus::Success;
                r.completed_notification_sent = true;
            })
            .await?;
        info!("Order {} completed by the vendor", record.order_id);

        let report = Party::from(record)
            .report(ReportKind::Success, "Order completed")
            .field("Target", &record.target)
            .field("Vendor order", &record.vendor_order_id)
            .field("Charge", format!("{:.2}$", record.amount_usd));
        self.notifier.notify(report).await;

        if settings.confirmation_reminder {
            self.schedule_reminder(&record.order_id, &record.chat_id).await;
        }
        Ok(())
    }

    async fn fail_watched(&self, record: &OrderRecord, reason: &str) -> Result<()> {
        let refunded_before = self
            .warehouse
            .ledger
            .read()
            .await
            .get(&record.order_id)
            .map_or(false, |r| r.refunded);
        if refunded_before {
            return Ok(());
        }

        let settings = self.warehouse.settings().await;
        let party = Party::from(record);
        error!("Vendor order {} failed: {}", record.vendor_order_id, reason);

        self.send(&record.chat_id, &settings.templates.failure).await;
        let report = party
            .report(ReportKind::Error, "Vendor order failed")
            .field("Vendor order", &record.vendor_order_id)
            .field("Error", reason);
        self.notifier.notify(report).await;

        let refunded = self.refund(&party, reason, &settings).await;
        self.warehouse
            .ledger
            .write()
            .await
            .modify(&record.order_id, |r| {
                r.status = if refunded {
                    RecordStatus::Refunded
                } else {
                    RecordStatus::Failed
                };
                r.refunded = refunded;
            })
            .await?;
        Ok(())
    }

    pub fn spawn_balance_watcher(self: &Arc<Self>) {
        let engine = self.clone();

        self.tasks.spawn("balance", move |cancel| async move {
            let mut watch = BalanceWatch::default();
            let mut interval = tokio::time::interval(engine.config.balance_poll());
            info!("Balance watcher started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = engine.check_balance(&mut watch).await {
                            warn!("Unable to check vendor balance: {}", e);
                        }
                    }
                    _ = cancel.cancelled() => {
                        info!("Balance watcher stopped");
                        break;
                    }
                }
            }
        });
    }

    pub(super) async fn check_balance(&self, watch: &mut BalanceWatch) -> Result<()> {
        let balance = self.vendor.balance().await?;
        let settings = self.warehouse.settings().await;
        let change = watch.observe(
            balance,
            settings.balance_threshold,
            settings.low_balance_notified,
        );
        debug!("Vendor balance: {:.2}$", balance);

        if let Some(previous) = change.increased_from {
            let report = Report::new(ReportKind::Balance, "Balance topped up")
                .field("Before", format!("{:.2}$", previous))
                .field("Now", format!("{:.2}$", balance));
            self.notifier.notify(report).await;
        }

        if change.went_low {
            warn!("Vendor balance {:.2}$ is below {:.2}$", balance, settings.balance_threshold);
            let report = Report::new(ReportKind::Balance, "Low balance")
                .field("Balance", format!("{:.2}$", balance))
                .field("Threshold", format!("{:.2}$", settings.balance_threshold));
            self.notifier.notify(report).await;
            self.warehouse
                .update_settings(|s| s.low_balance_notified = true)
                .await?;
        } else if change.recovered {
            info!("Vendor balance recovered: {:.2}$", balance);
            self.warehouse
                .update_settings(|s| s.low_balance_notified = false)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff::from(&EngineConfig::default())
    }

    #[test]
    fn poll_schedule() {
        let backoff = backoff();
        let transport = VendorError::Transport("reset".to_owned());

        assert_eq!(backoff.next_delay(None, 0), Duration::from_secs(300));
        assert_eq!(
            backoff.next_delay(Some(&VendorError::RateLimited), 1),
            Duration::from_secs(3600)
        );
        assert_eq!(backoff.next_delay(Some(&transport), 1), Duration::from_secs(300));
        assert_eq!(backoff.next_delay(Some(&transport), 2), Duration::from_secs(600));
        assert_eq!(backoff.next_delay(Some(&transport), 3), Duration::from_secs(1200));
        assert_eq!(backoff.next_delay(Some(&transport), 5), Duration::from_secs(3600));
        assert_eq!(backoff.next_delay(Some(&transport), 40), Duration::from_secs(3600));
        assert_eq!(
            backoff.next_delay(Some(&VendorError::Failed("500".to_owned())), 3),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn balance_latch() {
        let mut watch = BalanceWatch::default();

        let first = watch.observe(10.0, 5.0, false);
        assert_eq!(first, BalanceChange::default());

        let low = watch.observe(4.0, 5.0, false);
        assert!(low.went_low);
        assert_eq!(low.increased_from, None);

        let still_low = watch.observe(3.0, 5.0, true);
        assert!(!still_low.went_low);
        assert!(!still_low.recovered);

        let topped_up = watch.observe(20.0, 5.0, true);
        assert_eq!(topped_up.increased_from, Some(3.0));
        assert!(topped_up.recovered);
    }
}
