use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};

use crate::{
    Tables, dtos::tracking::TrackingUpdateCreateRequest, models::tracking::TrackingUpdate,
};

/// Inserts the update unless the (tracking number, status) pair is already
/// stored; returns `None` in that case.
pub async fn insert_tracking_update<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    data: TrackingUpdateCreateRequest,
) -> Res<Option<TrackingUpdate>> {
    let sql = format!(
        r#"
        INSERT INTO {} (tracking_number, status, status_details, status_date, carrier, location)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (tracking_number, status) DO NOTHING
        RETURNING *
        "#,
        tables.tracking_updates
    );
    sqlx::query_as::<_, TrackingUpdate>(&sql)
        .bind(data.tracking_number)
        .bind(data.status)
        .bind(data.status_details)
        .bind(data.status_date)
        .bind(data.carrier)
        .bind(data.location)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn find_tracking_update<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    tracking_number: &str,
    status: &str,
) -> Res<Option<TrackingUpdate>> {
    let sql = format!(
        "SELECT * FROM {} WHERE tracking_number = $1 AND status = $2",
        tables.tracking_updates
    );
    sqlx::query_as::<_, TrackingUpdate>(&sql)
        .bind(tracking_number)
        .bind(status)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_tracking_updates<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    tracking_number: &str,
) -> Res<Vec<TrackingUpdate>> {
    let sql = format!(
        "SELECT * FROM {} WHERE tracking_number = $1 ORDER BY status_date DESC",
        tables.tracking_updates
    );
    sqlx::query_as::<_, TrackingUpdate>(&sql)
        .bind(tracking_number)
        .fetch_all(executor)
        .await
        .map_err(AppError::from)
}
