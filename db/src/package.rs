use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};

use crate::{
    Tables,
    models::package::{Package, PackageStatus},
};

pub async fn find_package_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    package_id: i64,
) -> Res<Option<Package>> {
    let sql = format!("SELECT * FROM {} WHERE id = $1", tables.packages);
    sqlx::query_as::<_, Package>(&sql)
        .bind(package_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Latest package with this tracking number, optionally restricted to a status.
pub async fn find_latest_by_tracking<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    tracking_number: &str,
    status: Option<PackageStatus>,
) -> Res<Option<Package>> {
    let sql = format!(
        "SELECT * FROM {} WHERE tracking_number = $1 AND ($2::package_status IS NULL OR status = $2) \
         ORDER BY created_at DESC LIMIT 1",
        tables.packages
    );
    sqlx::query_as::<_, Package>(&sql)
        .bind(tracking_number)
        .bind(status)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Latest PENDING package of a user, optionally matching the carrier too.
pub async fn find_pending_for_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    user_id: i64,
    tracking_number: &str,
    carrier: Option<&str>,
) -> Res<Option<Package>> {
    let sql = format!(
        "SELECT * FROM {} WHERE user_id = $1 AND tracking_number = $2 AND status = 'PENDING' \
         AND ($3::text IS NULL OR carrier = $3) ORDER BY created_at DESC LIMIT 1",
        tables.packages
    );
    sqlx::query_as::<_, Package>(&sql)
        .bind(user_id)
        .bind(tracking_number)
        .bind(carrier)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn insert_pending_package<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    user_id: i64,
    tracking_number: &str,
    carrier: &str,
) -> Res<Package> {
    let sql = format!(
        "INSERT INTO {} (user_id, tracking_number, carrier, status, subscription_id) \
         VALUES ($1, $2, $3, 'PENDING', NULL) RETURNING *",
        tables.packages
    );
    sqlx::query_as::<_, Package>(&sql)
        .bind(user_id)
        .bind(tracking_number)
        .bind(carrier)
        .fetch_one(executor)
        .await
        .map_err(AppError::from)
}

/// Moves an INACTIVE package back to PENDING under a (possibly new) carrier.
pub async fn reopen_package<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    package_id: i64,
    carrier: &str,
) -> Res<Option<Package>> {
    let sql = format!(
        "UPDATE {} SET status = 'PENDING', carrier = $2, updated_at = NOW() \
         WHERE id = $1 AND status = 'INACTIVE' RETURNING *",
        tables.packages
    );
    sqlx::query_as::<_, Package>(&sql)
        .bind(package_id)
        .bind(carrier)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Sets the status and, when given, links the package to a subscription.
pub async fn update_package_status<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    package_id: i64,
    status: PackageStatus,
    subscription_id: Option<i64>,
) -> Res<Option<Package>> {
    let sql = format!(
        "UPDATE {} SET status = $2, subscription_id = COALESCE($3, subscription_id), updated_at = NOW() \
         WHERE id = $1 RETURNING *",
        tables.packages
    );
    sqlx::query_as::<_, Package>(&sql)
        .bind(package_id)
        .bind(status)
        .bind(subscription_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn count_active_since<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    subscription_id: i64,
    since: DateTime<Utc>,
) -> Res<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE subscription_id = $1 AND status = 'ACTIVE' AND updated_at >= $2",
        tables.packages
    );
    sqlx::query_scalar::<_, i64>(&sql)
        .bind(subscription_id)
        .bind(since)
        .fetch_one(executor)
        .await
        .map_err(AppError::from)
}
