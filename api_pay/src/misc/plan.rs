use std::str::FromStr;

use bigdecimal::BigDecimal;
use common::{
    env_config::PayPalConfig,
    error::{AppError, Res},
};
use db::models::subscription::Tier;
use serde::Serialize;

pub const PLAN_ID_REQUIRED: &str = "PayPal Plan ID is required for subscriptions.";

/// One purchasable plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub tier: Tier,
    pub name: &'static str,
    pub price: BigDecimal,
    pub is_recurring: bool,
    /// -1 means unlimited.
    pub package_limit: i32,
    pub paypal_plan_id: Option<String>,
}

/// Prices are fixed here; only the PayPal plan ids come from configuration.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    monthly_plan_id: Option<String>,
    yearly_plan_id: Option<String>,
}

impl PlanCatalog {
    pub fn new(monthly_plan_id: Option<String>, yearly_plan_id: Option<String>) -> Self {
        PlanCatalog {
            monthly_plan_id,
            yearly_plan_id,
        }
    }

    pub fn from_config(config: &PayPalConfig) -> Self {
        Self::new(config.monthly_plan_id.clone(), config.yearly_plan_id.clone())
    }

    pub fn price(&self, tier: Tier) -> BigDecimal {
        let price = match tier {
            Tier::Single => "1.99",
            Tier::Monthly => "3.49",
            Tier::Yearly => "34.90",
        };
        BigDecimal::from_str(price).unwrap_or_default()
    }

    pub fn configured_plan_id(&self, tier: Tier) -> Option<&str> {
        match tier {
            Tier::Single => None,
            Tier::Monthly => self.monthly_plan_id.as_deref(),
            Tier::Yearly => self.yearly_plan_id.as_deref(),
        }
    }

    pub fn plan(&self, tier: Tier) -> Plan {
        Plan {
            tier,
            name: tier.label(),
            price: self.price(tier),
            is_recurring: tier.is_recurring(),
            package_limit: tier.default_package_limit(),
            paypal_plan_id: self.configured_plan_id(tier).map(str::to_string),
        }
    }

    /// Parses the client-supplied price and checks it against the catalog.
    pub fn validate_price(&self, tier: Tier, price: &str) -> Res<BigDecimal> {
        let expected = self.price(tier);
        let given = BigDecimal::from_str(price.trim())
            .map_err(|_| AppError::BadRequest(format!("Invalid price: {}", price)))?;

        if given != expected {
            return Err(AppError::BadRequest(format!(
                "Price {} does not match the {} plan price {}",
                price.trim(),
                tier.label(),
                expected
            )));
        }
        Ok(expected)
    }

    /// PayPal plan for a recurring tier: the requested one if given, else the
    /// configured one. One-time purchases have no plan.
    pub fn resolve_plan_id(&self, tier: Tier, requested: Option<&str>) -> Res<Option<String>> {
        if !tier.is_recurring() {
            return Ok(None);
        }

        requested
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or_else(|| self.configured_plan_id(tier))
            .map(|id| Some(id.to_string()))
            .ok_or_else(|| AppError::BadRequest(PLAN_ID_REQUIRED.to_string()))
    }
}

/// Amount string in the two-decimal form PayPal expects.
pub fn format_amount(amount: &BigDecimal) -> String {
    amount.with_scale(2).to_string()
}

#[cfg(test)]
mod tests {
    use claim::{assert_err, assert_none, assert_ok};

    use super::*;

    fn catalog() -> PlanCatalog {
        PlanCatalog::new(Some("P-MONTH".to_string()), None)
    }

    #[test]
    fn accepts_catalog_prices_regardless_of_trailing_zeros() {
        let catalog = catalog();

        assert_ok!(catalog.validate_price(Tier::Single, "1.99"));
        assert_ok!(catalog.validate_price(Tier::Yearly, "34.9"));
        assert_ok!(catalog.validate_price(Tier::Monthly, " 3.490 "));
    }

    #[test]
    fn rejects_tampered_or_garbage_prices() {
        let catalog = catalog();

        assert_err!(catalog.validate_price(Tier::Monthly, "0.01"));
        assert_err!(catalog.validate_price(Tier::Single, "free"));
    }

    #[test]
    fn one_time_purchases_need_no_plan() {
        assert_none!(catalog().resolve_plan_id(Tier::Single, Some("P-X")).unwrap());
    }

    #[test]
    fn requested_plan_wins_over_configured_one() {
        let catalog = catalog();

        assert_eq!(
            catalog.resolve_plan_id(Tier::Monthly, Some("P-OTHER")).unwrap(),
            Some("P-OTHER".to_string())
        );
        assert_eq!(
            catalog.resolve_plan_id(Tier::Monthly, Some("  ")).unwrap(),
            Some("P-MONTH".to_string())
        );
    }

    #[test]
    fn recurring_tier_without_any_plan_is_rejected() {
        let error = catalog().resolve_plan_id(Tier::Yearly, None).unwrap_err();
        assert!(matches!(error, AppError::BadRequest(message) if message == PLAN_ID_REQUIRED));
    }

    #[test]
    fn plan_details_follow_the_tier() {
        let plan = catalog().plan(Tier::Single);

        assert_eq!(plan.package_limit, 1);
        assert!(!plan.is_recurring);
        assert_eq!(format_amount(&plan.price), "1.99");
        assert_eq!(format_amount(&catalog().price(Tier::Yearly)), "34.90");
    }
}
