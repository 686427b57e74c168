use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};

use crate::{
    Tables,
    models::user::{Channel, User},
};

pub async fn find_user_by_contact<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    contact: &str,
    channel: Channel,
) -> Res<Option<User>> {
    let sql = format!(
        "SELECT * FROM {} WHERE {} = $1 ORDER BY id LIMIT 1",
        tables.users,
        channel.contact_column()
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(contact)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn find_user_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    user_id: i64,
) -> Res<Option<User>> {
    let sql = format!("SELECT * FROM {} WHERE id = $1", tables.users);
    sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Inserts a user identified by `contact`, preferring `channel` for notifications.
pub async fn insert_user<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    contact: &str,
    channel: Channel,
) -> Res<User> {
    let sql = format!(
        "INSERT INTO {} ({}, notification_preference) VALUES ($1, $2) RETURNING *",
        tables.users,
        channel.contact_column()
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(contact)
        .bind(channel)
        .fetch_one(executor)
        .await
        .map_err(AppError::from)
}
