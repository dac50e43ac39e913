//! Balance aggregation — the derived `CustomerLoyaltyBalance` projection
//! with write-through-invalidated caching.

use loyalty_core::config::LoyaltyConfig;
use loyalty_core::ledger::{CustomerLoyaltyBalance, HistoryPage};
use loyalty_core::tier::TierPolicy;
use loyalty_ledger::{BalanceCache, LedgerStore, LedgerVerification};
use std::sync::Arc;
use uuid::Uuid;

pub struct BalanceAggregator {
    store: Arc<LedgerStore>,
    cache: Arc<BalanceCache>,
    policy: TierPolicy,
    history_page_limit: u32,
    history_max_limit: u32,
}

impl BalanceAggregator {
    pub fn new(
        store: Arc<LedgerStore>,
        cache: Arc<BalanceCache>,
        policy: TierPolicy,
        config: &LoyaltyConfig,
    ) -> Self {
        Self {
            store,
            cache,
            policy,
            history_page_limit: config.history_page_limit,
            history_max_limit: config.history_max_limit,
        }
    }

    /// Current balance, lifetime points, and tier standing.
    ///
    /// Served from the cache when the ledger has not moved since the last
    /// read; the store invalidates the entry on every append.
    pub fn get_balance(&self, customer_id: Uuid) -> CustomerLoyaltyBalance {
        if let Some(cached) = self.cache.get(&customer_id) {
            return cached;
        }

        let snapshot = self.store.balance_snapshot(customer_id);
        let balance = self.project(
            customer_id,
            snapshot.current_points,
            snapshot.lifetime_points,
        );
        self.cache.put(balance.clone());
        balance
    }

    /// Ledger history, newest first. The limit is clamped to the
    /// configured maximum; a missing limit takes the configured default.
    pub fn list_history(
        &self,
        customer_id: Uuid,
        page: u32,
        limit: Option<u32>,
    ) -> HistoryPage {
        let limit = limit
            .unwrap_or(self.history_page_limit)
            .clamp(1, self.history_max_limit);
        self.store.list_by_customer(customer_id, page.max(1), limit)
    }

    /// Replay-based consistency check for one customer's ledger.
    pub fn verify(&self, customer_id: Uuid) -> LedgerVerification {
        self.store.verify(customer_id)
    }

    fn project(
        &self,
        customer_id: Uuid,
        current_points: i64,
        lifetime_points: i64,
    ) -> CustomerLoyaltyBalance {
        let tier = self.policy.resolve(lifetime_points);
        let next = self.policy.next_tier(lifetime_points);
        CustomerLoyaltyBalance {
            customer_id,
            current_points,
            lifetime_points,
            tier: tier.name.clone(),
            next_tier: next.map(|(t, _)| t.name.clone()),
            points_to_next_tier: next.map(|(_, gap)| gap),
        }
    }
}
