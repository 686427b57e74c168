use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};

use crate::{
    Tables, dtos::notification::NotificationCreateRequest,
    models::notification::NotificationLog,
};

pub async fn insert_notification<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    data: NotificationCreateRequest,
) -> Res<NotificationLog> {
    let sql = format!(
        r#"
        INSERT INTO {} (package_id, user_id, notification_type, contact_info, purpose, tracking_number, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
        tables.notifications
    );
    sqlx::query_as::<_, NotificationLog>(&sql)
        .bind(data.package_id)
        .bind(data.user_id)
        .bind(data.channel)
        .bind(data.contact_info)
        .bind(data.purpose)
        .bind(data.tracking_number)
        .bind(data.status)
        .fetch_one(executor)
        .await
        .map_err(AppError::from)
}
