//! FIFO lot replay over a customer's ledger.
//!
//! Earned entries (and positive adjustments) open lots. Redemptions and
//! negative adjustments draw down the oldest lots that were still
//! unexpired at spend time. Expired entries close out the remainder of
//! the earn they reference. Replay order is ledger insertion order, so
//! the same entry slice always produces the same lots, which is the
//! invariant the expiry sweeper's idempotence rests on.

use chrono::{DateTime, Utc};
use loyalty_core::ledger::{EntryKind, LedgerEntry};
use uuid::Uuid;

/// Remaining unconsumed amount of one earning event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarnLot {
    pub entry_id: Uuid,
    pub earned_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub original_points: i64,
    pub remaining: i64,
}

impl EarnLot {
    /// Whether the lot had lapsed as of the given instant.
    pub fn lapsed(&self, as_of: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= as_of).unwrap_or(false)
    }
}

/// Replay a customer's entries (ascending insertion order) into lots.
pub fn remaining_lots(entries: &[LedgerEntry]) -> Vec<EarnLot> {
    let mut lots: Vec<EarnLot> = Vec::new();

    for entry in entries {
        match entry.kind {
            EntryKind::Earned => lots.push(EarnLot {
                entry_id: entry.id,
                earned_at: entry.created_at,
                expires_at: entry.expires_at,
                original_points: entry.points,
                remaining: entry.points,
            }),
            // Positive corrections behave like a non-expiring earn.
            EntryKind::Adjusted if entry.points > 0 => lots.push(EarnLot {
                entry_id: entry.id,
                earned_at: entry.created_at,
                expires_at: None,
                original_points: entry.points,
                remaining: entry.points,
            }),
            EntryKind::Redeemed | EntryKind::Adjusted => {
                consume(&mut lots, -entry.points, entry.created_at);
            }
            EntryKind::Expired => {
                if let Some(source) = entry.source_entry_id {
                    if let Some(lot) = lots.iter_mut().find(|l| l.entry_id == source) {
                        lot.remaining = (lot.remaining + entry.points).max(0);
                    }
                }
            }
        }
    }

    lots
}

/// Draw `amount` points down from the oldest lots unexpired at spend time.
///
/// Spend that outruns the live lots (lapsed points redeemed before a
/// sweep materialized them) falls back to the oldest remaining lots so
/// the totals stay conserved.
fn consume(lots: &mut [EarnLot], mut amount: i64, spent_at: DateTime<Utc>) {
    for lot in lots.iter_mut() {
        if amount == 0 {
            return;
        }
        if lot.remaining == 0 || lot.lapsed(spent_at) {
            continue;
        }
        let take = amount.min(lot.remaining);
        lot.remaining -= take;
        amount -= take;
    }
    for lot in lots.iter_mut() {
        if amount == 0 {
            return;
        }
        if lot.remaining == 0 {
            continue;
        }
        let take = amount.min(lot.remaining);
        lot.remaining -= take;
        amount -= take;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(
        kind: EntryKind,
        points: i64,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        source_entry_id: Option<Uuid>,
    ) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            points,
            kind,
            description: "test".to_string(),
            order_id: None,
            created_at,
            expires_at,
            source_entry_id,
            sequence: 0,
            entry_hash: String::new(),
            previous_hash: String::new(),
        }
    }

    #[test]
    fn test_redemption_consumes_oldest_first() {
        let t0 = Utc::now();
        let entries = vec![
            entry(EntryKind::Earned, 100, t0, None, None),
            entry(EntryKind::Earned, 50, t0 + Duration::hours(1), None, None),
            entry(EntryKind::Redeemed, -120, t0 + Duration::hours(2), None, None),
        ];

        let lots = remaining_lots(&entries);
        assert_eq!(lots.len(), 2);
        assert_eq!(lots[0].remaining, 0);
        assert_eq!(lots[1].remaining, 30);
    }

    #[test]
    fn test_redemption_skips_lapsed_lots() {
        let t0 = Utc::now();
        let lapsed_at = t0 + Duration::hours(1);
        let entries = vec![
            entry(EntryKind::Earned, 100, t0, Some(lapsed_at), None),
            entry(EntryKind::Earned, 80, t0 + Duration::minutes(30), None, None),
            // Spend happens after the first lot lapsed: the live lot pays.
            entry(EntryKind::Redeemed, -50, t0 + Duration::hours(2), None, None),
        ];

        let lots = remaining_lots(&entries);
        assert_eq!(lots[0].remaining, 100);
        assert_eq!(lots[1].remaining, 30);
    }

    #[test]
    fn test_overflow_spend_falls_back_to_lapsed_lots() {
        let t0 = Utc::now();
        let lapsed_at = t0 + Duration::hours(1);
        let entries = vec![
            entry(EntryKind::Earned, 100, t0, Some(lapsed_at), None),
            entry(EntryKind::Earned, 40, t0 + Duration::minutes(30), None, None),
            // 90 > the 40 live points; the remainder draws from the lapsed lot.
            entry(EntryKind::Redeemed, -90, t0 + Duration::hours(2), None, None),
        ];

        let lots = remaining_lots(&entries);
        assert_eq!(lots[0].remaining, 50);
        assert_eq!(lots[1].remaining, 0);
    }

    #[test]
    fn test_expired_entry_reduces_source_lot() {
        let t0 = Utc::now();
        let earn = entry(EntryKind::Earned, 100, t0, Some(t0 + Duration::hours(1)), None);
        let earn_id = earn.id;
        let entries = vec![
            earn,
            entry(EntryKind::Redeemed, -30, t0 + Duration::minutes(10), None, None),
            entry(
                EntryKind::Expired,
                -70,
                t0 + Duration::hours(2),
                None,
                Some(earn_id),
            ),
        ];

        let lots = remaining_lots(&entries);
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].remaining, 0);
        assert_eq!(lots[0].original_points, 100);
    }

    #[test]
    fn test_positive_adjustment_opens_non_expiring_lot() {
        let t0 = Utc::now();
        let entries = vec![
            entry(EntryKind::Adjusted, 60, t0, None, None),
            entry(EntryKind::Redeemed, -20, t0 + Duration::minutes(5), None, None),
        ];

        let lots = remaining_lots(&entries);
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].expires_at, None);
        assert_eq!(lots[0].remaining, 40);
    }

    #[test]
    fn test_negative_adjustment_consumes_like_redemption() {
        let t0 = Utc::now();
        let entries = vec![
            entry(EntryKind::Earned, 100, t0, None, None),
            entry(EntryKind::Adjusted, -25, t0 + Duration::minutes(5), None, None),
        ];

        let lots = remaining_lots(&entries);
        assert_eq!(lots[0].remaining, 75);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let t0 = Utc::now();
        let entries = vec![
            entry(EntryKind::Earned, 100, t0, Some(t0 + Duration::days(1)), None),
            entry(EntryKind::Earned, 200, t0 + Duration::hours(1), None, None),
            entry(EntryKind::Redeemed, -150, t0 + Duration::hours(2), None, None),
        ];

        assert_eq!(remaining_lots(&entries), remaining_lots(&entries));
    }
}
