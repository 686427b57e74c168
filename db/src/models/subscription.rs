use std::{fmt, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Inactive,
    Cancelled,
}

impl SubscriptionStatus {
    /// Subscriptions only move forward: PENDING -> ACTIVE -> INACTIVE/CANCELLED,
    /// or straight from PENDING to a terminal state.
    pub fn can_transition_to(self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, next),
            (Pending, Active) | (Pending, Inactive) | (Pending, Cancelled)
                | (Active, Inactive)
                | (Active, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "PENDING",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Inactive => "INACTIVE",
            SubscriptionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pricing tier a subscription was bought for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "plan_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Single,
    Monthly,
    Yearly,
}

impl Tier {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Tier::Single)
    }

    /// Length of one billing cycle; `None` for one-time purchases.
    pub fn billing_months(&self) -> Option<u32> {
        match self {
            Tier::Single => None,
            Tier::Monthly => Some(1),
            Tier::Yearly => Some(12),
        }
    }

    pub fn default_package_limit(&self) -> i32 {
        match self {
            Tier::Single => 1,
            Tier::Monthly | Tier::Yearly => -1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Single => "Single Package",
            Tier::Monthly => "Monthly",
            Tier::Yearly => "Yearly",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Single => "single",
            Tier::Monthly => "monthly",
            Tier::Yearly => "yearly",
        }
    }

    /// Billing period starting at `start`. Month arithmetic clamps to the
    /// last day of shorter months (Jan 31 + 1 month = Feb 28/29).
    pub fn period_from(&self, start: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let months = self.billing_months()?;
        let end = start.checked_add_months(Months::new(months))?;
        Some((start, end))
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" | "onetime" | "one-time" | "single package" => Ok(Tier::Single),
            "monthly" => Ok(Tier::Monthly),
            "yearly" => Ok(Tier::Yearly),
            other => Err(format!("Unknown plan type: {}", other)),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub paypal_plan_id: Option<String>,
    pub paypal_subscription_id: Option<String>,
    pub status: SubscriptionStatus,
    pub tier_name: Tier,
    /// True for every recurring tier, yearly included.
    pub is_monthly: bool,
    /// -1 means unlimited.
    pub package_limit: i32,
    pub amount: BigDecimal,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_unlimited(&self) -> bool {
        self.package_limit < 0
    }

    /// Start of the billing cycle packages are counted against. Falls back to
    /// the last update (activation) for rows without a stored period.
    pub fn cycle_start(&self) -> DateTime<Utc> {
        self.current_period_start.unwrap_or(self.updated_at)
    }

    pub fn has_credit(&self, packages_used: i64) -> bool {
        self.is_unlimited() || packages_used < i64::from(self.package_limit)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn subscriptions_never_move_backwards() {
        use SubscriptionStatus::*;

        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Inactive));
        assert!(!Active.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Active));
        assert!(!Inactive.can_transition_to(Active));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn monthly_period_clamps_to_month_end() {
        let start = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();

        let (from, to) = Tier::Monthly.period_from(start).unwrap();

        assert_eq!(from, start);
        assert_eq!(to, Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap());
    }

    #[test]
    fn yearly_period_spans_twelve_months_and_single_has_none() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        let (_, to) = Tier::Yearly.period_from(start).unwrap();

        assert_eq!(to, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        assert!(Tier::Single.period_from(start).is_none());
    }

    #[test]
    fn parses_plan_type_aliases() {
        assert_eq!("onetime".parse(), Ok(Tier::Single));
        assert_eq!("Single Package".parse(), Ok(Tier::Single));
        assert_eq!("MONTHLY".parse(), Ok(Tier::Monthly));
        assert!("weekly".parse::<Tier>().is_err());
    }
}
