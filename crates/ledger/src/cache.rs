//! Per-customer balance projection cache.
//!
//! There is no TTL: the ledger store invalidates a customer's entry
//! immediately after every successful append, so staleness is bounded by
//! the gap between an append and the next read, not by a timer.

use dashmap::DashMap;
use loyalty_core::ledger::CustomerLoyaltyBalance;
use uuid::Uuid;

/// Lock-free cache of derived balances keyed by customer.
pub struct BalanceCache {
    store: DashMap<Uuid, CustomerLoyaltyBalance>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self {
            store: DashMap::new(),
        }
    }

    pub fn get(&self, customer_id: &Uuid) -> Option<CustomerLoyaltyBalance> {
        let hit = self.store.get(customer_id).map(|e| e.value().clone());
        if hit.is_some() {
            metrics::counter!("loyalty.balance_cache.hits").increment(1);
        } else {
            metrics::counter!("loyalty.balance_cache.misses").increment(1);
        }
        hit
    }

    pub fn put(&self, balance: CustomerLoyaltyBalance) {
        self.store.insert(balance.customer_id, balance);
    }

    /// Invalidation hook, called by the store after every append.
    pub fn invalidate(&self, customer_id: &Uuid) {
        if self.store.remove(customer_id).is_some() {
            metrics::counter!("loyalty.balance_cache.invalidations").increment(1);
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for BalanceCache {
    fn default() -> Self {
        Self::new()
    }
}
