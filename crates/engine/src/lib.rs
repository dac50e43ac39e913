//! Loyalty engine: accrual, redemption, balance aggregation, and the
//! expiry sweeper, all built on the append-only ledger.

pub mod accrual;
pub mod balance;
pub mod redemption;
pub mod sweeper;

pub use accrual::AccrualService;
pub use balance::BalanceAggregator;
pub use redemption::RedemptionService;
pub use sweeper::{ExpirySweeper, SweepReport};
