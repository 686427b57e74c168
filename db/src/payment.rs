use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};

use crate::{Tables, dtos::payment::PaymentCreateRequest, models::payment::Payment};

pub async fn insert_payment<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    data: PaymentCreateRequest,
) -> Res<Payment> {
    let sql = format!(
        r#"
        INSERT INTO {} (user_id, subscription_id, package_id, paypal_order_id, paypal_capture_id,
            paypal_subscription_id, amount, currency, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
        tables.payments
    );
    sqlx::query_as::<_, Payment>(&sql)
        .bind(data.user_id)
        .bind(data.subscription_id)
        .bind(data.package_id)
        .bind(data.paypal_order_id)
        .bind(data.paypal_capture_id)
        .bind(data.paypal_subscription_id)
        .bind(data.amount)
        .bind(data.currency)
        .bind(data.status)
        .fetch_one(executor)
        .await
        .map_err(AppError::from)
}

pub async fn find_payment_by_order_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    tables: &Tables,
    paypal_order_id: &str,
) -> Res<Option<Payment>> {
    let sql = format!("SELECT * FROM {} WHERE paypal_order_id = $1", tables.payments);
    sqlx::query_as::<_, Payment>(&sql)
        .bind(paypal_order_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}
