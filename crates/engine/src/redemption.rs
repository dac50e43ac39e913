//! Redemption — validate and execute a point spend against the live
//! balance with an optimistic check-then-write commit.

use crate::accrual::validate_description;
use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::ledger::{LedgerEntry, NewLedgerEntry};
use loyalty_ledger::LedgerStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct RedemptionService {
    store: Arc<LedgerStore>,
}

impl RedemptionService {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Spend points. Fails without writing when the request is malformed
    /// or the balance cannot cover it; no partial redemption exists.
    pub fn redeem(
        &self,
        customer_id: Uuid,
        points: i64,
        description: &str,
    ) -> LoyaltyResult<LedgerEntry> {
        if points <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "redemption points must be positive, got {points}"
            )));
        }
        let description = validate_description(description)?;

        let entry = commit_spend(
            &self.store,
            NewLedgerEntry::redeemed(customer_id, points, description),
        )?;

        metrics::counter!("loyalty.points_redeemed").increment(points as u64);
        metrics::counter!("loyalty.redemptions").increment(1);
        info!(
            customer_id = %customer_id,
            points,
            sequence = entry.sequence,
            "Points redeemed"
        );
        Ok(entry)
    }
}

/// Optimistic spend commit.
///
/// The balance is re-read immediately before the write, never taken from
/// the cache. When another writer slips in between the read and the
/// commit, the store reports a conflict and the whole check is retried
/// exactly once; the re-read re-validates, so a genuine shortfall still
/// surfaces as `InsufficientPoints`.
pub(crate) fn commit_spend(
    store: &LedgerStore,
    entry: NewLedgerEntry,
) -> LoyaltyResult<LedgerEntry> {
    let requested = -entry.points;
    let mut retried = false;
    loop {
        let snapshot = store.balance_snapshot(entry.customer_id);
        if requested > snapshot.current_points {
            return Err(LoyaltyError::InsufficientPoints {
                requested,
                available: snapshot.current_points,
            });
        }
        match store.append_conditional(entry.clone(), snapshot.version) {
            Ok(committed) => return Ok(committed),
            Err(LoyaltyError::ConcurrencyConflict(_)) if !retried => {
                metrics::counter!("loyalty.redemption_retries").increment(1);
                retried = true;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_core::ledger::EntryKind;
    use loyalty_ledger::BalanceCache;

    fn store_with_balance(customer: Uuid, points: i64) -> Arc<LedgerStore> {
        let store = Arc::new(LedgerStore::new(Arc::new(BalanceCache::new())));
        store
            .append(NewLedgerEntry::earned(
                customer,
                points,
                "seed".to_string(),
                None,
                None,
            ))
            .unwrap();
        store
    }

    #[test]
    fn test_redeem_exact_balance_drains_to_zero() {
        let customer = Uuid::new_v4();
        let store = store_with_balance(customer, 250);
        let service = RedemptionService::new(store.clone());

        let entry = service.redeem(customer, 250, "gift card").unwrap();
        assert_eq!(entry.kind, EntryKind::Redeemed);
        assert_eq!(entry.points, -250);
        assert_eq!(store.balance_snapshot(customer).current_points, 0);
    }

    #[test]
    fn test_redeem_one_over_balance_writes_nothing() {
        let customer = Uuid::new_v4();
        let store = store_with_balance(customer, 250);
        let service = RedemptionService::new(store.clone());

        let result = service.redeem(customer, 251, "gift card");
        assert!(matches!(
            result,
            Err(LoyaltyError::InsufficientPoints {
                requested: 251,
                available: 250
            })
        ));
        assert_eq!(store.entries_snapshot(customer).0.len(), 1);
        assert_eq!(store.balance_snapshot(customer).current_points, 250);
    }

    #[test]
    fn test_redeem_validates_before_reading_balance() {
        let customer = Uuid::new_v4();
        let store = store_with_balance(customer, 100);
        let service = RedemptionService::new(store);

        assert!(matches!(
            service.redeem(customer, 0, "gift card"),
            Err(LoyaltyError::Validation(_))
        ));
        assert!(matches!(
            service.redeem(customer, -10, "gift card"),
            Err(LoyaltyError::Validation(_))
        ));
        assert!(matches!(
            service.redeem(customer, 10, ""),
            Err(LoyaltyError::Validation(_))
        ));
    }

    #[test]
    fn test_redeem_from_unknown_customer_is_insufficient() {
        let store = Arc::new(LedgerStore::new(Arc::new(BalanceCache::new())));
        let service = RedemptionService::new(store);

        let result = service.redeem(Uuid::new_v4(), 10, "gift card");
        assert!(matches!(
            result,
            Err(LoyaltyError::InsufficientPoints {
                requested: 10,
                available: 0
            })
        ));
    }

    // A writer sneaking in between the snapshot and the commit triggers
    // one transparent retry; the spend still lands when covered.
    #[test]
    fn test_commit_spend_retries_once_after_conflict() {
        let customer = Uuid::new_v4();
        let store = store_with_balance(customer, 100);

        let stale = store.balance_snapshot(customer);
        store
            .append(NewLedgerEntry::earned(
                customer,
                5,
                "interleaved".to_string(),
                None,
                None,
            ))
            .unwrap();
        // The direct conditional append with the stale version conflicts...
        assert!(matches!(
            store.append_conditional(
                NewLedgerEntry::redeemed(customer, 60, "gift card".to_string()),
                stale.version,
            ),
            Err(LoyaltyError::ConcurrencyConflict(_))
        ));
        // ...while commit_spend re-reads and lands the spend.
        let entry = commit_spend(
            &store,
            NewLedgerEntry::redeemed(customer, 60, "gift card".to_string()),
        )
        .unwrap();
        assert_eq!(entry.points, -60);
        assert_eq!(store.balance_snapshot(customer).current_points, 45);
    }
}
