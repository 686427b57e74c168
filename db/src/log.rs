use crate::{Tables, models::log::RequestLog};
use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};

pub async fn insert_log<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    log: RequestLog,
) -> Res<()> {
    let sql = format!(
        "INSERT INTO {} (timestamp, method, path, status_code, duration_ms, user_id, params, request_body, response_body, ip_address, user_agent) 
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        tables.request_logs
    );
    sqlx::query(&sql)
        .bind(log.timestamp)
        .bind(&log.method)
        .bind(&log.path)
        .bind(log.status_code)
        .bind(log.duration_ms)
        .bind(log.user_id)
        .bind(log.params)
        .bind(log.request_body)
        .bind(log.response_body)
        .bind(log.ip_address)
        .bind(log.user_agent)
        .execute(executor)
        .await
        .map_err(AppError::from)?;

    Ok(())
}
