//! Expiry sweeper — scheduled conversion of lapsed earned points into
//! `expired` ledger entries, so current balances reflect reality without
//! a full scan on every read.

use chrono::{DateTime, Utc};
use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::ledger::NewLedgerEntry;
use loyalty_ledger::{lots, LedgerStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// How many times one customer is retried within a sweep when a
/// concurrent redemption moves the ledger underneath us. A customer still
/// contended after this many attempts is picked up by the next sweep.
const MAX_CUSTOMER_ATTEMPTS: u32 = 3;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub swept_at: DateTime<Utc>,
    pub customers_scanned: usize,
    pub customers_expired: usize,
    pub entries_written: usize,
    pub points_expired: i64,
    pub customers_skipped: usize,
}

pub struct ExpirySweeper {
    store: Arc<LedgerStore>,
}

impl ExpirySweeper {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Run one full sweep as of the given instant.
    ///
    /// Idempotent: a lot's remainder already offset by redemption or an
    /// earlier sweep is never expired again, so running twice over the
    /// same lapsed entries writes nothing the second time.
    pub fn run_once(&self, as_of: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport {
            swept_at: as_of,
            customers_scanned: 0,
            customers_expired: 0,
            entries_written: 0,
            points_expired: 0,
            customers_skipped: 0,
        };

        for customer_id in self.store.customer_ids() {
            report.customers_scanned += 1;
            match self.sweep_customer(customer_id, as_of) {
                Ok((0, _)) => {}
                Ok((entries, points)) => {
                    report.customers_expired += 1;
                    report.entries_written += entries;
                    report.points_expired += points;
                }
                Err(e) => {
                    warn!(customer_id = %customer_id, error = %e, "Sweep skipped customer");
                    report.customers_skipped += 1;
                }
            }
        }

        metrics::counter!("loyalty.sweeps").increment(1);
        metrics::counter!("loyalty.points_expired").increment(report.points_expired as u64);
        info!(
            customers_scanned = report.customers_scanned,
            entries_written = report.entries_written,
            points_expired = report.points_expired,
            customers_skipped = report.customers_skipped,
            "Expiry sweep complete"
        );
        report
    }

    fn sweep_customer(
        &self,
        customer_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> LoyaltyResult<(usize, i64)> {
        for _ in 0..MAX_CUSTOMER_ATTEMPTS {
            let (entries, version) = self.store.entries_snapshot(customer_id);
            let batch: Vec<NewLedgerEntry> = lots::remaining_lots(&entries)
                .into_iter()
                .filter(|lot| lot.remaining > 0 && lot.lapsed(as_of))
                .map(|lot| {
                    NewLedgerEntry::expired(
                        customer_id,
                        lot.remaining,
                        lot.entry_id,
                        format!("Expired unspent remainder of earn {}", lot.entry_id),
                    )
                })
                .collect();
            if batch.is_empty() {
                return Ok((0, 0));
            }

            let points: i64 = batch.iter().map(|e| -e.points).sum();
            match self
                .store
                .append_batch_conditional(customer_id, batch, version)
            {
                Ok(written) => return Ok((written.len(), points)),
                Err(LoyaltyError::ConcurrencyConflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(LoyaltyError::ConcurrencyConflict(customer_id))
    }

    /// Spawn the recurring sweep task. The first sweep fires one interval
    /// after startup, then on every tick until the process exits.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.run_once(Utc::now());
            }
        })
    }
}
