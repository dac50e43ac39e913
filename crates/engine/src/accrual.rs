//! Earn and adjustment paths — the inbound contracts for the
//! order-completion collaborator and the administrative console.

use crate::redemption;
use chrono::{DateTime, Duration, Utc};
use loyalty_core::config::LoyaltyConfig;
use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::ledger::{LedgerEntry, NewLedgerEntry};
use loyalty_ledger::LedgerStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct AccrualService {
    store: Arc<LedgerStore>,
    default_expiry_days: u32,
}

impl AccrualService {
    pub fn new(store: Arc<LedgerStore>, config: &LoyaltyConfig) -> Self {
        Self {
            store,
            default_expiry_days: config.default_expiry_days,
        }
    }

    /// Credit points earned from a completed order or activity. Never
    /// validated against a balance ceiling.
    ///
    /// When the caller passes no expiry, the configured default horizon
    /// applies (or none, if the program disables default expiry).
    pub fn earn(
        &self,
        customer_id: Uuid,
        points: i64,
        description: &str,
        order_id: Option<Uuid>,
        expires_at: Option<DateTime<Utc>>,
    ) -> LoyaltyResult<LedgerEntry> {
        if points <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "earned points must be positive, got {points}"
            )));
        }
        let description = validate_description(description)?;
        let expires_at = expires_at.or_else(|| self.default_expiry());

        let entry = self.store.append(NewLedgerEntry::earned(
            customer_id,
            points,
            description,
            order_id,
            expires_at,
        ))?;

        metrics::counter!("loyalty.points_earned").increment(points as u64);
        info!(
            customer_id = %customer_id,
            points,
            order_id = ?order_id,
            expires_at = ?expires_at,
            "Points earned"
        );
        Ok(entry)
    }

    /// Apply a signed administrative correction.
    ///
    /// Negative adjustments follow the same non-negative-balance rule as
    /// redemption unless explicitly authorized as an override, the one
    /// sanctioned path that may take a balance below zero.
    pub fn adjust(
        &self,
        customer_id: Uuid,
        points: i64,
        description: &str,
        authorized_override: bool,
    ) -> LoyaltyResult<LedgerEntry> {
        if points == 0 {
            return Err(LoyaltyError::Validation(
                "adjustment points must be non-zero".to_string(),
            ));
        }
        let description = validate_description(description)?;
        let new_entry = NewLedgerEntry::adjusted(customer_id, points, description);

        let entry = if points > 0 || authorized_override {
            self.store.append(new_entry)?
        } else {
            redemption::commit_spend(&self.store, new_entry)?
        };

        metrics::counter!("loyalty.adjustments").increment(1);
        info!(
            customer_id = %customer_id,
            points,
            authorized_override,
            "Balance adjusted"
        );
        Ok(entry)
    }

    fn default_expiry(&self) -> Option<DateTime<Utc>> {
        (self.default_expiry_days > 0)
            .then(|| Utc::now() + Duration::days(self.default_expiry_days as i64))
    }
}

/// Descriptions travel to the customer-facing history; blank ones are
/// rejected before anything is written.
pub(crate) fn validate_description(description: &str) -> LoyaltyResult<String> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(LoyaltyError::Validation(
            "description must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_ledger::BalanceCache;

    fn service(default_expiry_days: u32) -> AccrualService {
        let config = LoyaltyConfig {
            default_expiry_days,
            ..LoyaltyConfig::default()
        };
        let store = Arc::new(LedgerStore::new(Arc::new(BalanceCache::new())));
        AccrualService::new(store, &config)
    }

    #[test]
    fn test_earn_rejects_non_positive_points() {
        let service = service(0);
        let customer = Uuid::new_v4();

        assert!(matches!(
            service.earn(customer, 0, "order #1", None, None),
            Err(LoyaltyError::Validation(_))
        ));
        assert!(matches!(
            service.earn(customer, -5, "order #1", None, None),
            Err(LoyaltyError::Validation(_))
        ));
    }

    #[test]
    fn test_earn_rejects_blank_description() {
        let service = service(0);
        let result = service.earn(Uuid::new_v4(), 10, "   ", None, None);
        assert!(matches!(result, Err(LoyaltyError::Validation(_))));
    }

    #[test]
    fn test_earn_applies_default_expiry() {
        let service = service(30);
        let entry = service
            .earn(Uuid::new_v4(), 10, "order #1", None, None)
            .unwrap();
        let expires_at = entry.expires_at.unwrap();
        let days_out = (expires_at - Utc::now()).num_days();
        assert!((29..=30).contains(&days_out));
    }

    #[test]
    fn test_earn_without_default_expiry_never_expires() {
        let service = service(0);
        let entry = service
            .earn(Uuid::new_v4(), 10, "order #1", None, None)
            .unwrap();
        assert!(entry.expires_at.is_none());
    }

    #[test]
    fn test_explicit_expiry_wins_over_default() {
        let service = service(30);
        let explicit = Utc::now() + Duration::days(7);
        let entry = service
            .earn(Uuid::new_v4(), 10, "order #1", None, Some(explicit))
            .unwrap();
        assert_eq!(entry.expires_at, Some(explicit));
    }

    #[test]
    fn test_negative_adjust_requires_balance() {
        let service = service(0);
        let customer = Uuid::new_v4();
        service.earn(customer, 50, "seed", None, None).unwrap();

        let result = service.adjust(customer, -80, "clawback", false);
        assert!(matches!(
            result,
            Err(LoyaltyError::InsufficientPoints {
                requested: 80,
                available: 50
            })
        ));
    }

    #[test]
    fn test_override_permits_overdraw() {
        let service = service(0);
        let customer = Uuid::new_v4();
        service.earn(customer, 50, "seed", None, None).unwrap();

        let entry = service
            .adjust(customer, -80, "fraud clawback", true)
            .unwrap();
        assert_eq!(entry.points, -80);
    }

    #[test]
    fn test_zero_adjust_rejected() {
        let service = service(0);
        let result = service.adjust(Uuid::new_v4(), 0, "noop", true);
        assert!(matches!(result, Err(LoyaltyError::Validation(_))));
    }
}
