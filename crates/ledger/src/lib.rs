//! Append-only points ledger: per-customer ordered storage with maintained
//! balance counters, FIFO lot replay, and the write-through-invalidated
//! balance cache.

pub mod cache;
pub mod lots;
pub mod store;

pub use cache::BalanceCache;
pub use lots::{remaining_lots, EarnLot};
pub use store::{BalanceSnapshot, LedgerStore, LedgerVerification};
