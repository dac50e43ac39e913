//! Append-only ledger store.
//!
//! One in-memory table of entries per customer with transactionally
//! maintained balance counters, a per-customer write lock, optimistic
//! versioning for check-then-write callers, and tamper-evident hash
//! chaining.
//!
//! Production: replace with PostgreSQL (sqlx) or similar ACID store.
//! This provides the same API surface for development and testing.

use crate::cache::BalanceCache;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::ledger::{EntryKind, HistoryPage, LedgerEntry, NewLedgerEntry};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const GENESIS_HASH: &str = "genesis";

/// Per-customer ledger page: entries in insertion order plus the counters
/// maintained under the same lock as every append.
struct CustomerLedger {
    entries: Vec<LedgerEntry>,
    current_points: i64,
    lifetime_points: i64,
    /// Bumped on every append; the optimistic guard for conditional writes.
    version: u64,
    sequence: u64,
    last_hash: String,
}

impl CustomerLedger {
    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            current_points: 0,
            lifetime_points: 0,
            version: 0,
            sequence: 0,
            last_hash: GENESIS_HASH.to_string(),
        }
    }
}

/// Counter snapshot used for optimistic check-then-write.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BalanceSnapshot {
    pub customer_id: Uuid,
    pub current_points: i64,
    pub lifetime_points: i64,
    pub version: u64,
}

/// Result of replaying and hash-checking one customer's ledger.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerVerification {
    pub customer_id: Uuid,
    pub total_entries: usize,
    pub counter_current_points: i64,
    pub replayed_current_points: i64,
    pub counter_lifetime_points: i64,
    pub replayed_lifetime_points: i64,
    /// Expiry-aware sum as of now; drifts below the counter by exactly
    /// the lapsed points the sweeper has not yet materialized.
    pub active_points_now: i64,
    pub chain_intact: bool,
    pub consistent: bool,
}

/// Thread-safe in-memory ledger keyed by customer.
pub struct LedgerStore {
    customers: DashMap<Uuid, Arc<Mutex<CustomerLedger>>>,
    cache: Arc<BalanceCache>,
}

impl LedgerStore {
    pub fn new(cache: Arc<BalanceCache>) -> Self {
        info!("Ledger store initialized (in-memory, development mode)");
        Self {
            customers: DashMap::new(),
            cache,
        }
    }

    /// Append without a version guard. Used for earns and authorized
    /// administrative corrections, which carry no balance precondition.
    pub fn append(&self, entry: NewLedgerEntry) -> LoyaltyResult<LedgerEntry> {
        self.append_inner(entry, None, false)
    }

    /// Append with the optimistic guard and the non-negative floor.
    ///
    /// Fails with `ConcurrencyConflict` when the customer's version moved
    /// since the caller's snapshot, and with `InsufficientPoints` when the
    /// delta would overdraw the balance. Nothing is written on failure.
    pub fn append_conditional(
        &self,
        entry: NewLedgerEntry,
        expected_version: u64,
    ) -> LoyaltyResult<LedgerEntry> {
        self.append_inner(entry, Some(expected_version), true)
    }

    /// All-or-nothing batch append under one version guard. Used by the
    /// expiry sweeper, whose deltas are derived from the snapshot itself.
    pub fn append_batch_conditional(
        &self,
        customer_id: Uuid,
        batch: Vec<NewLedgerEntry>,
        expected_version: u64,
    ) -> LoyaltyResult<Vec<LedgerEntry>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let cell = self.customer(customer_id);
        let mut ledger = cell.lock();

        if ledger.version != expected_version {
            metrics::counter!("loyalty.ledger.conflicts").increment(1);
            return Err(LoyaltyError::ConcurrencyConflict(customer_id));
        }

        let written: Vec<LedgerEntry> = batch
            .into_iter()
            .map(|entry| Self::materialize(&mut ledger, entry))
            .collect();
        ledger.version += 1;
        drop(ledger);

        self.cache.invalidate(&customer_id);
        Ok(written)
    }

    fn append_inner(
        &self,
        entry: NewLedgerEntry,
        expected_version: Option<u64>,
        enforce_floor: bool,
    ) -> LoyaltyResult<LedgerEntry> {
        let customer_id = entry.customer_id;
        let cell = self.customer(customer_id);
        let mut ledger = cell.lock();

        if let Some(expected) = expected_version {
            if ledger.version != expected {
                metrics::counter!("loyalty.ledger.conflicts").increment(1);
                return Err(LoyaltyError::ConcurrencyConflict(customer_id));
            }
        }
        if enforce_floor && ledger.current_points + entry.points < 0 {
            return Err(LoyaltyError::InsufficientPoints {
                requested: -entry.points,
                available: ledger.current_points,
            });
        }

        let written = Self::materialize(&mut ledger, entry);
        ledger.version += 1;
        drop(ledger);

        self.cache.invalidate(&customer_id);
        Ok(written)
    }

    /// Assign id, timestamp, sequence, and chain links, then apply the
    /// entry to the maintained counters. Caller holds the customer lock.
    fn materialize(ledger: &mut CustomerLedger, entry: NewLedgerEntry) -> LedgerEntry {
        ledger.sequence += 1;
        let created_at = Utc::now();
        let previous_hash = ledger.last_hash.clone();
        let entry_hash = chain_hash(
            entry.customer_id,
            ledger.sequence,
            entry.kind,
            entry.points,
            created_at,
            &previous_hash,
        );

        let written = LedgerEntry {
            id: Uuid::new_v4(),
            customer_id: entry.customer_id,
            points: entry.points,
            kind: entry.kind,
            description: entry.description,
            order_id: entry.order_id,
            created_at,
            expires_at: entry.expires_at,
            source_entry_id: entry.source_entry_id,
            sequence: ledger.sequence,
            entry_hash: entry_hash.clone(),
            previous_hash,
        };

        ledger.last_hash = entry_hash;
        ledger.current_points += written.points;
        if written.points > 0
            && matches!(written.kind, EntryKind::Earned | EntryKind::Adjusted)
        {
            ledger.lifetime_points += written.points;
        }
        ledger.entries.push(written.clone());

        metrics::counter!("loyalty.ledger.appends", "kind" => written.kind.as_str())
            .increment(1);
        debug!(
            customer_id = %written.customer_id,
            kind = %written.kind,
            points = written.points,
            sequence = written.sequence,
            "Ledger entry appended"
        );

        written
    }

    /// Current counters and version. Zeroes for an unknown customer.
    pub fn balance_snapshot(&self, customer_id: Uuid) -> BalanceSnapshot {
        match self.existing(customer_id) {
            Some(cell) => {
                let ledger = cell.lock();
                BalanceSnapshot {
                    customer_id,
                    current_points: ledger.current_points,
                    lifetime_points: ledger.lifetime_points,
                    version: ledger.version,
                }
            }
            None => BalanceSnapshot {
                customer_id,
                current_points: 0,
                lifetime_points: 0,
                version: 0,
            },
        }
    }

    /// All entries in insertion order plus the version they were read at.
    pub fn entries_snapshot(&self, customer_id: Uuid) -> (Vec<LedgerEntry>, u64) {
        match self.existing(customer_id) {
            Some(cell) => {
                let ledger = cell.lock();
                (ledger.entries.clone(), ledger.version)
            }
            None => (Vec::new(), 0),
        }
    }

    /// One page of the customer's history, newest first.
    pub fn list_by_customer(&self, customer_id: Uuid, page: u32, limit: u32) -> HistoryPage {
        let page = page.max(1);
        let limit = limit.max(1);
        let (entries, total_entries) = match self.existing(customer_id) {
            Some(cell) => {
                let ledger = cell.lock();
                let total = ledger.entries.len() as u64;
                let offset = (page as usize - 1) * limit as usize;
                let entries: Vec<LedgerEntry> = ledger
                    .entries
                    .iter()
                    .rev()
                    .skip(offset)
                    .take(limit as usize)
                    .cloned()
                    .collect();
                (entries, total)
            }
            None => (Vec::new(), 0),
        };

        HistoryPage {
            customer_id,
            page,
            limit,
            total_entries,
            entries,
        }
    }

    /// Fast-path expiry-aware sum: entries that are not `expired` and have
    /// not lapsed as of the given instant.
    pub fn sum_active_points(&self, customer_id: Uuid, as_of: DateTime<Utc>) -> i64 {
        match self.existing(customer_id) {
            Some(cell) => active_sum(&cell.lock().entries, as_of),
            None => 0,
        }
    }

    /// Every customer with at least one ledger entry.
    pub fn customer_ids(&self) -> Vec<Uuid> {
        self.customers.iter().map(|r| *r.key()).collect()
    }

    /// Replay the customer's ledger and check it against the maintained
    /// counters and the hash chain.
    pub fn verify(&self, customer_id: Uuid) -> LedgerVerification {
        let now = Utc::now();
        let (entries, counter_current, counter_lifetime) = match self.existing(customer_id) {
            Some(cell) => {
                let ledger = cell.lock();
                (
                    ledger.entries.clone(),
                    ledger.current_points,
                    ledger.lifetime_points,
                )
            }
            None => (Vec::new(), 0, 0),
        };

        let replayed_current: i64 = entries.iter().map(|e| e.points).sum();
        let replayed_lifetime: i64 = entries
            .iter()
            .filter(|e| {
                e.points > 0 && matches!(e.kind, EntryKind::Earned | EntryKind::Adjusted)
            })
            .map(|e| e.points)
            .sum();

        let mut chain_intact = true;
        let mut expected_prev = GENESIS_HASH.to_string();
        for entry in &entries {
            let recomputed = chain_hash(
                entry.customer_id,
                entry.sequence,
                entry.kind,
                entry.points,
                entry.created_at,
                &entry.previous_hash,
            );
            if entry.previous_hash != expected_prev || recomputed != entry.entry_hash {
                chain_intact = false;
                break;
            }
            expected_prev = entry.entry_hash.clone();
        }

        let consistent = chain_intact
            && replayed_current == counter_current
            && replayed_lifetime == counter_lifetime;

        LedgerVerification {
            customer_id,
            total_entries: entries.len(),
            counter_current_points: counter_current,
            replayed_current_points: replayed_current,
            counter_lifetime_points: counter_lifetime,
            replayed_lifetime_points: replayed_lifetime,
            active_points_now: active_sum(&entries, now),
            chain_intact,
            consistent,
        }
    }

    fn customer(&self, customer_id: Uuid) -> Arc<Mutex<CustomerLedger>> {
        self.customers
            .entry(customer_id)
            .or_insert_with(|| Arc::new(Mutex::new(CustomerLedger::empty())))
            .clone()
    }

    fn existing(&self, customer_id: Uuid) -> Option<Arc<Mutex<CustomerLedger>>> {
        self.customers.get(&customer_id).map(|r| r.value().clone())
    }
}

fn active_sum(entries: &[LedgerEntry], as_of: DateTime<Utc>) -> i64 {
    entries
        .iter()
        .filter(|e| e.kind != EntryKind::Expired)
        .filter(|e| e.expires_at.map(|x| x > as_of).unwrap_or(true))
        .map(|e| e.points)
        .sum()
}

fn chain_hash(
    customer_id: Uuid,
    sequence: u64,
    kind: EntryKind,
    points: i64,
    created_at: DateTime<Utc>,
    previous_hash: &str,
) -> String {
    let content = format!(
        "{}:{}:{}:{}:{}:{}",
        customer_id,
        sequence,
        kind,
        points,
        created_at.to_rfc3339(),
        previous_hash,
    );
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
