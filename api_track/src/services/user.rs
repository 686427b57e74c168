use api_pay::PlanCatalog;
use common::error::{AppError, Res};
use db::{
    models::{
        subscription::{Subscription, Tier},
        user::Channel,
    },
    store::Store,
};

use crate::dtos::user::{
    PrepareRequest, PrepareResponse, SubscriptionStatusResponse, SwitchPlanResponse,
};

const DEFAULT_CARRIER: &str = "usps";

fn required<'a>(value: &'a str, name: &str) -> Res<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", name)));
    }
    Ok(value)
}

/// Recurring subscriptions with room for one more package in this cycle.
async fn has_credit(store: &dyn Store, subscription: &Subscription) -> Res<bool> {
    if !subscription.is_monthly {
        return Ok(false);
    }
    let used = store.count_active_packages_in_cycle(subscription).await?;
    Ok(subscription.has_credit(used))
}

/// Resolves the user and the package a checkout starts from, and reports
/// whether the user can skip payment.
pub async fn prepare_checkout(store: &dyn Store, req: PrepareRequest) -> Res<PrepareResponse> {
    let tracking_number = required(&req.tracking_number, "trackingNumber")?;
    let contact = required(&req.contact_info, "contactInfo")?;
    let carrier = req
        .carrier
        .as_deref()
        .map(str::trim)
        .filter(|carrier| !carrier.is_empty())
        .unwrap_or(DEFAULT_CARRIER);

    let user = store
        .find_or_create_user(contact, req.notification_type)
        .await?;
    let package = store
        .find_or_create_pending_package(user.id, tracking_number, carrier)
        .await?;
    let subscription = store.get_user_active_subscription(user.id).await?;

    let has_credit = match &subscription {
        Some(subscription) => has_credit(store, subscription).await?,
        None => false,
    };

    Ok(PrepareResponse {
        user_id: user.id,
        pending_package_id: package.id,
        package_status: package.status,
        has_active_subscription: subscription.is_some(),
        tier_name: subscription.as_ref().map(|subscription| subscription.tier_name),
        has_credit,
        current_paypal_subscription_id: subscription
            .and_then(|subscription| subscription.paypal_subscription_id),
    })
}

pub async fn get_active_subscription(store: &dyn Store, user_id: i64) -> Res<Subscription> {
    store
        .get_user_active_subscription(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No active subscription found".to_string()))
}

/// Looks a user up by contact without creating one.
pub async fn subscription_status(
    store: &dyn Store,
    plans: &PlanCatalog,
    contact: &str,
    channel: Channel,
) -> Res<SubscriptionStatusResponse> {
    let contact = required(contact, "contactInfo")?;

    let Some(user) = store.find_user_by_contact(contact, channel).await? else {
        return Ok(SubscriptionStatusResponse {
            user_id: None,
            current_tier: None,
        });
    };

    let current_tier = store
        .get_user_active_subscription(user.id)
        .await?
        .map(|subscription| plans.plan(subscription.tier_name));

    Ok(SubscriptionStatusResponse {
        user_id: Some(user.id),
        current_tier,
    })
}

/// Details the buyer needs to start a create-reference call for another
/// tier. Nothing changes until that purchase is approved.
pub async fn switch_plan(
    store: &dyn Store,
    plans: &PlanCatalog,
    user_id: i64,
    new_tier: &str,
) -> Res<SwitchPlanResponse> {
    let tier: Tier = new_tier.parse().map_err(AppError::BadRequest)?;
    let current = store.get_user_active_subscription(user_id).await?;

    if let Some(current) = &current {
        if current.tier_name == tier {
            return Err(AppError::BadRequest(format!(
                "You are already on the {} plan",
                tier.label()
            )));
        }
    }

    Ok(SwitchPlanResponse {
        user_id,
        current_tier: current.as_ref().map(|subscription| subscription.tier_name),
        plan: plans.plan(tier),
        cancel_previous_paypal_sub_id: current
            .and_then(|subscription| subscription.paypal_subscription_id),
    })
}
