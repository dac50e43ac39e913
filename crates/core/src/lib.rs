pub mod config;
pub mod error;
pub mod ledger;
pub mod tier;

pub use config::AppConfig;
pub use error::{LoyaltyError, LoyaltyResult};
