//! Ledger domain types — the append-only event model the rest of the
//! service derives from.
//!
//! A customer's balance is never stored as independent truth: it is the
//! sum of that customer's ledger entries, projected on demand and cached.
//! Entries are immutable once appended; corrections are offsetting
//! `adjusted` entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of point-affecting event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Points credited by an order or activity. Always positive.
    Earned,
    /// Customer-initiated spend. Always negative.
    Redeemed,
    /// Lapsed remainder of an earned entry, written by the sweeper.
    Expired,
    /// Administrative correction, either sign.
    Adjusted,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Earned => "earned",
            EntryKind::Redeemed => "redeemed",
            EntryKind::Expired => "expired",
            EntryKind::Adjusted => "adjusted",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable point-affecting event for a customer.
///
/// `created_at` insertion order is authoritative for replay. Each entry is
/// chained to its predecessor in the customer's ledger via a SHA-256 hash,
/// so any rewrite of history is detectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub customer_id: Uuid,
    /// Signed delta: positive = earn/adjust-up, negative =
    /// redeem/expire/adjust-down.
    pub points: i64,
    pub kind: EntryKind,
    /// Order reference, adjustment note, or redemption purpose.
    pub description: String,
    /// Order that generated the entry, when there is one.
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Only meaningful for earned entries. None = never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// For expired entries, the earned entry whose remainder this offsets.
    pub source_entry_id: Option<Uuid>,
    /// Position in the customer's chain, starting at 1.
    pub sequence: u64,
    /// SHA-256 over this entry's content and the previous hash.
    pub entry_hash: String,
    /// Hash of the previous entry in the customer's chain ("genesis" for
    /// the first).
    pub previous_hash: String,
}

/// Payload for an append; the store assigns id, timestamp, sequence, and
/// the hash-chain fields.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub customer_id: Uuid,
    pub points: i64,
    pub kind: EntryKind,
    pub description: String,
    pub order_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub source_entry_id: Option<Uuid>,
}

impl NewLedgerEntry {
    pub fn earned(
        customer_id: Uuid,
        points: i64,
        description: String,
        order_id: Option<Uuid>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            customer_id,
            points,
            kind: EntryKind::Earned,
            description,
            order_id,
            expires_at,
            source_entry_id: None,
        }
    }

    /// `points` is the positive amount being spent; the entry is stored
    /// with the negated delta.
    pub fn redeemed(customer_id: Uuid, points: i64, description: String) -> Self {
        Self {
            customer_id,
            points: -points,
            kind: EntryKind::Redeemed,
            description,
            order_id: None,
            expires_at: None,
            source_entry_id: None,
        }
    }

    /// `points` is the positive lapsed amount; the entry is stored with
    /// the negated delta and a back-reference to the earn it offsets.
    pub fn expired(
        customer_id: Uuid,
        points: i64,
        source_entry_id: Uuid,
        description: String,
    ) -> Self {
        Self {
            customer_id,
            points: -points,
            kind: EntryKind::Expired,
            description,
            order_id: None,
            expires_at: None,
            source_entry_id: Some(source_entry_id),
        }
    }

    pub fn adjusted(customer_id: Uuid, points: i64, description: String) -> Self {
        Self {
            customer_id,
            points,
            kind: EntryKind::Adjusted,
            description,
            order_id: None,
            expires_at: None,
            source_entry_id: None,
        }
    }
}

/// Derived balance projection. Always reconstructible from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerLoyaltyBalance {
    pub customer_id: Uuid,
    /// Spendable balance right now.
    pub current_points: i64,
    /// Cumulative points ever earned; unaffected by spending or expiry.
    pub lifetime_points: i64,
    pub tier: String,
    /// None when the customer is in the highest tier.
    pub next_tier: Option<String>,
    pub points_to_next_tier: Option<i64>,
}

/// One page of ledger history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub customer_id: Uuid,
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
    pub total_entries: u64,
    pub entries: Vec<LedgerEntry>,
}
