use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};

use crate::{
    Tables,
    dtos::subscription::SubscriptionCreateRequest,
    models::subscription::{Subscription, SubscriptionStatus},
};

pub async fn get_subscription_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    subscription_id: i64,
) -> Res<Option<Subscription>> {
    let sql = format!("SELECT * FROM {} WHERE id = $1", tables.subscriptions);
    sqlx::query_as::<_, Subscription>(&sql)
        .bind(subscription_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Same as [`get_subscription_by_id`] but row-locks the subscription until the
/// surrounding transaction ends.
pub async fn lock_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    subscription_id: i64,
) -> Res<Option<Subscription>> {
    let sql = format!(
        "SELECT * FROM {} WHERE id = $1 FOR UPDATE",
        tables.subscriptions
    );
    sqlx::query_as::<_, Subscription>(&sql)
        .bind(subscription_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Most recent ACTIVE subscription of a user; `recurring_only` skips one-time purchases.
pub async fn get_user_active_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    user_id: i64,
    recurring_only: bool,
) -> Res<Option<Subscription>> {
    let sql = format!(
        "SELECT * FROM {} WHERE user_id = $1 AND status = 'ACTIVE' AND ($2 = FALSE OR is_monthly = TRUE) \
         ORDER BY created_at DESC LIMIT 1",
        tables.subscriptions
    );
    sqlx::query_as::<_, Subscription>(&sql)
        .bind(user_id)
        .bind(recurring_only)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn insert_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    data: SubscriptionCreateRequest,
) -> Res<Subscription> {
    let sql = format!(
        r#"
        INSERT INTO {} (user_id, tier_name, is_monthly, paypal_plan_id, package_limit, amount, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'PENDING')
        RETURNING *
        "#,
        tables.subscriptions
    );
    sqlx::query_as::<_, Subscription>(&sql)
        .bind(data.user_id)
        .bind(data.tier)
        .bind(data.tier.is_recurring())
        .bind(data.paypal_plan_id)
        .bind(data.package_limit)
        .bind(data.amount)
        .fetch_one(executor)
        .await
        .map_err(AppError::from)
}

/// Moves every other ACTIVE subscription of the user to INACTIVE.
pub async fn deactivate_other_active<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    user_id: i64,
    keep_subscription_id: i64,
) -> Res<u64> {
    let sql = format!(
        "UPDATE {} SET status = 'INACTIVE', updated_at = NOW() \
         WHERE user_id = $1 AND status = 'ACTIVE' AND id <> $2",
        tables.subscriptions
    );
    sqlx::query(&sql)
        .bind(user_id)
        .bind(keep_subscription_id)
        .execute(executor)
        .await
        .map(|result| result.rows_affected())
        .map_err(AppError::from)
}

/// Conditional PENDING -> ACTIVE update. `None` when the row is missing or
/// no longer PENDING.
pub async fn activate_pending<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    subscription_id: i64,
    paypal_subscription_id: Option<&str>,
    period: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Res<Option<Subscription>> {
    let sql = format!(
        r#"
        UPDATE {} SET status = 'ACTIVE', paypal_subscription_id = $2,
            current_period_start = $3, current_period_end = $4, updated_at = NOW()
        WHERE id = $1 AND status = 'PENDING'
        RETURNING *
        "#,
        tables.subscriptions
    );
    sqlx::query_as::<_, Subscription>(&sql)
        .bind(subscription_id)
        .bind(paypal_subscription_id)
        .bind(period.map(|(start, _)| start))
        .bind(period.map(|(_, end)| end))
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn set_subscription_status<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    subscription_id: i64,
    status: SubscriptionStatus,
    paypal_subscription_id: Option<&str>,
) -> Res<Option<Subscription>> {
    let sql = format!(
        "UPDATE {} SET status = $2, paypal_subscription_id = COALESCE($3, paypal_subscription_id), \
         updated_at = NOW() WHERE id = $1 RETURNING *",
        tables.subscriptions
    );
    sqlx::query_as::<_, Subscription>(&sql)
        .bind(subscription_id)
        .bind(status)
        .bind(paypal_subscription_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}
