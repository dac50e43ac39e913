//! Tier policy — pure mapping from lifetime points to a named tier.
//!
//! Thresholds are configuration data, validated once at startup into an
//! ordered ladder. Tier standing is a function of lifetime points only,
//! so redemptions and expiries never demote a customer.

use crate::config::TierThreshold;
use crate::error::{LoyaltyError, LoyaltyResult};
use serde::{Deserialize, Serialize};

/// A named tier with its inclusive lower bound on lifetime points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tier {
    pub name: String,
    pub min_lifetime_points: i64,
}

/// Validated, ascending tier ladder.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    tiers: Vec<Tier>,
}

impl TierPolicy {
    /// Build a policy from configured thresholds.
    ///
    /// The list must be non-empty and strictly increasing by threshold.
    /// The lowest tier's threshold is forced to zero so that any lifetime
    /// value, including zero, resolves to a tier.
    pub fn new(thresholds: &[TierThreshold]) -> LoyaltyResult<Self> {
        if thresholds.is_empty() {
            return Err(LoyaltyError::Config(
                "tier ladder must not be empty".to_string(),
            ));
        }

        let mut tiers: Vec<Tier> = thresholds
            .iter()
            .map(|t| Tier {
                name: t.name.clone(),
                min_lifetime_points: t.min_lifetime_points,
            })
            .collect();
        tiers[0].min_lifetime_points = 0;

        for pair in tiers.windows(2) {
            if pair[1].min_lifetime_points <= pair[0].min_lifetime_points {
                return Err(LoyaltyError::Config(format!(
                    "tier thresholds must be strictly increasing: '{}' ({}) does not exceed '{}' ({})",
                    pair[1].name,
                    pair[1].min_lifetime_points,
                    pair[0].name,
                    pair[0].min_lifetime_points,
                )));
            }
        }

        Ok(Self { tiers })
    }

    /// The highest tier whose threshold is <= the given lifetime points.
    /// Negative input clamps to the lowest tier; there is no error path.
    pub fn resolve(&self, lifetime_points: i64) -> &Tier {
        self.tiers
            .iter()
            .rev()
            .find(|t| t.min_lifetime_points <= lifetime_points)
            .unwrap_or(&self.tiers[0])
    }

    /// The smallest tier strictly above the given lifetime points, with
    /// the remaining gap. None at or past the top threshold. Negative
    /// input clamps to zero, matching `resolve`.
    pub fn next_tier(&self, lifetime_points: i64) -> Option<(&Tier, i64)> {
        let lifetime_points = lifetime_points.max(0);
        self.tiers
            .iter()
            .find(|t| t.min_lifetime_points > lifetime_points)
            .map(|t| (t, t.min_lifetime_points - lifetime_points))
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold(name: &str, min_lifetime_points: i64) -> TierThreshold {
        TierThreshold {
            name: name.to_string(),
            min_lifetime_points,
        }
    }

    fn default_policy() -> TierPolicy {
        TierPolicy::new(&[
            threshold("Bronze", 0),
            threshold("Silver", 200),
            threshold("Gold", 500),
            threshold("Platinum", 1000),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_below_first_boundary() {
        let policy = default_policy();
        assert_eq!(policy.resolve(199).name, "Bronze");

        let (next, gap) = policy.next_tier(199).unwrap();
        assert_eq!(next.name, "Silver");
        assert_eq!(gap, 1);
    }

    #[test]
    fn test_resolve_inclusive_lower_bound() {
        let policy = default_policy();
        assert_eq!(policy.resolve(500).name, "Gold");
        assert_eq!(policy.resolve(200).name, "Silver");
        assert_eq!(policy.resolve(999).name, "Gold");
    }

    #[test]
    fn test_top_tier_has_no_next() {
        let policy = default_policy();
        assert_eq!(policy.resolve(1000).name, "Platinum");
        assert!(policy.next_tier(1000).is_none());
        assert!(policy.next_tier(50_000).is_none());
    }

    #[test]
    fn test_negative_lifetime_clamps_to_lowest() {
        let policy = default_policy();
        assert_eq!(policy.resolve(-10).name, "Bronze");
        assert_eq!(policy.resolve(0).name, "Bronze");

        let (next, gap) = policy.next_tier(-10).unwrap();
        assert_eq!(next.name, "Silver");
        assert_eq!(gap, 200);
    }

    #[test]
    fn test_empty_ladder_rejected() {
        assert!(TierPolicy::new(&[]).is_err());
    }

    #[test]
    fn test_unsorted_ladder_rejected() {
        let result = TierPolicy::new(&[
            threshold("Bronze", 0),
            threshold("Gold", 500),
            threshold("Silver", 200),
        ]);
        assert!(matches!(result, Err(LoyaltyError::Config(_))));
    }

    #[test]
    fn test_duplicate_threshold_rejected() {
        let result = TierPolicy::new(&[
            threshold("Bronze", 0),
            threshold("Silver", 200),
            threshold("Gold", 200),
        ]);
        assert!(matches!(result, Err(LoyaltyError::Config(_))));
    }

    #[test]
    fn test_first_threshold_clamped_to_zero() {
        let policy = TierPolicy::new(&[threshold("Member", 100), threshold("Elite", 300)]).unwrap();
        assert_eq!(policy.resolve(0).name, "Member");
        assert_eq!(policy.tiers()[0].min_lifetime_points, 0);
    }
}
