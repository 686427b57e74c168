use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::error::{AppError, Res};
use sqlx::PgPool;

use crate::{
    Tables,
    dtos::{
        notification::NotificationCreateRequest, payment::PaymentCreateRequest,
        subscription::SubscriptionCreateRequest, tracking::TrackingUpdateCreateRequest,
    },
    models::{
        notification::NotificationLog,
        package::{Package, PackageStatus},
        payment::Payment,
        subscription::{Subscription, SubscriptionStatus},
        tracking::TrackingUpdate,
        user::{Channel, User},
    },
    notification, package, payment, subscription, tracking, user,
};

pub const TRACKED_BY_ANOTHER_USER: &str =
    "This tracking number is already being tracked by another user";

/// Persistence operations used by the HTTP handlers and the payment flows.
///
/// [`PgStore`] is the production implementation; the `memory` feature adds
/// an in-process one for tests.
#[async_trait]
pub trait Store: Send + Sync {
    // === USERS ===
    async fn find_user_by_contact(&self, contact: &str, channel: Channel) -> Res<Option<User>>;
    async fn find_user_by_id(&self, user_id: i64) -> Res<Option<User>>;
    async fn create_user(&self, contact: &str, channel: Channel) -> Res<User>;

    // === PACKAGES ===
    async fn find_package_by_id(&self, package_id: i64) -> Res<Option<Package>>;
    async fn find_active_package_by_tracking(&self, tracking_number: &str)
    -> Res<Option<Package>>;
    async fn find_any_package_by_tracking(&self, tracking_number: &str) -> Res<Option<Package>>;
    async fn find_pending_package_by_tracking(
        &self,
        user_id: i64,
        tracking_number: &str,
    ) -> Res<Option<Package>>;
    async fn find_pending_package(
        &self,
        user_id: i64,
        tracking_number: &str,
        carrier: &str,
    ) -> Res<Option<Package>>;
    async fn create_pending_package(
        &self,
        user_id: i64,
        tracking_number: &str,
        carrier: &str,
    ) -> Res<Package>;
    /// INACTIVE -> PENDING; `None` if the package is not INACTIVE.
    async fn reopen_package(&self, package_id: i64, carrier: &str) -> Res<Option<Package>>;
    async fn update_package_status(
        &self,
        package_id: i64,
        status: PackageStatus,
        subscription_id: Option<i64>,
    ) -> Res<Package>;

    // === SUBSCRIPTIONS ===
    async fn get_subscription_by_id(&self, subscription_id: i64) -> Res<Option<Subscription>>;
    async fn get_user_active_subscription(&self, user_id: i64) -> Res<Option<Subscription>>;
    async fn get_user_active_recurring_subscription(
        &self,
        user_id: i64,
    ) -> Res<Option<Subscription>>;
    async fn create_subscription_record(&self, data: SubscriptionCreateRequest)
    -> Res<Subscription>;
    /// PENDING -> ACTIVE. Every other ACTIVE subscription of the user is
    /// deactivated in the same unit of work.
    async fn activate_subscription(
        &self,
        subscription_id: i64,
        paypal_subscription_id: Option<&str>,
        user_id: i64,
    ) -> Res<Subscription>;
    async fn update_subscription_status(
        &self,
        subscription_id: i64,
        status: SubscriptionStatus,
        paypal_subscription_id: Option<&str>,
    ) -> Res<Subscription>;
    /// ACTIVE packages linked to the subscription during its current cycle.
    async fn count_active_packages_in_cycle(&self, subscription: &Subscription) -> Res<i64>;

    // === PAYMENTS ===
    async fn create_payment_record(&self, data: PaymentCreateRequest) -> Res<Payment>;
    async fn find_payment_by_order_id(&self, paypal_order_id: &str) -> Res<Option<Payment>>;

    // === NOTIFICATIONS & TRACKING ===
    async fn create_notification_log(
        &self,
        data: NotificationCreateRequest,
    ) -> Res<NotificationLog>;
    /// Stores the update unless (tracking number, status) is known. The flag
    /// tells whether the returned row was just inserted.
    async fn create_tracking_update(
        &self,
        data: TrackingUpdateCreateRequest,
    ) -> Res<(TrackingUpdate, bool)>;
    async fn get_tracking_updates(&self, tracking_number: &str) -> Res<Vec<TrackingUpdate>>;

    async fn find_or_create_user(&self, contact: &str, channel: Channel) -> Res<User> {
        if let Some(user) = self.find_user_by_contact(contact, channel).await? {
            return Ok(user);
        }
        self.create_user(contact, channel).await
    }

    /// Returns the package a user may pay for: their PENDING or ACTIVE
    /// package, a reopened INACTIVE one, or a fresh PENDING row.
    async fn find_or_create_pending_package(
        &self,
        user_id: i64,
        tracking_number: &str,
        carrier: &str,
    ) -> Res<Package> {
        if let Some(package) = claim_existing_package(self, user_id, tracking_number, carrier).await?
        {
            return Ok(package);
        }

        match self
            .create_pending_package(user_id, tracking_number, carrier)
            .await
        {
            Ok(package) => Ok(package),
            // Lost an insert race on the tracking number index.
            Err(error) if error.is_unique_violation() => {
                match claim_existing_package(self, user_id, tracking_number, carrier).await? {
                    Some(package) => Ok(package),
                    None => Err(error),
                }
            }
            Err(error) => Err(error),
        }
    }

    async fn log_notification(&self, data: NotificationCreateRequest) {
        let tracking_number = data.tracking_number.clone();
        if let Err(error) = self.create_notification_log(data).await {
            log::error!(
                "Failed to log notification for {}: {}",
                tracking_number,
                error
            );
        }
    }
}

async fn claim_existing_package<S: Store + ?Sized>(
    store: &S,
    user_id: i64,
    tracking_number: &str,
    carrier: &str,
) -> Res<Option<Package>> {
    let Some(existing) = store.find_any_package_by_tracking(tracking_number).await? else {
        return Ok(None);
    };

    if existing.user_id != user_id {
        return Err(AppError::Conflict(TRACKED_BY_ANOTHER_USER.to_string()));
    }

    match existing.status {
        PackageStatus::Inactive => {
            log::info!("Reopening inactive package {}", existing.id);
            match store.reopen_package(existing.id, carrier).await? {
                Some(package) => Ok(Some(package)),
                None => store.find_package_by_id(existing.id).await,
            }
        }
        PackageStatus::Pending | PackageStatus::Active => Ok(Some(existing)),
    }
}

pub(crate) fn activation_conflict(subscription_id: i64, status: SubscriptionStatus) -> AppError {
    AppError::Conflict(format!(
        "Failed to activate subscription {}. Current status: {}. Expected PENDING.",
        subscription_id, status
    ))
}

pub(crate) fn transition_conflict(
    subscription_id: i64,
    from: SubscriptionStatus,
    to: SubscriptionStatus,
) -> AppError {
    AppError::Conflict(format!(
        "Subscription {} cannot move from {} to {}",
        subscription_id, from, to
    ))
}

#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
    tables: Tables,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>, tables: Tables) -> Self {
        PgStore { pool, tables }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user_by_contact(&self, contact: &str, channel: Channel) -> Res<Option<User>> {
        user::find_user_by_contact(&*self.pool, &self.tables, contact, channel).await
    }

    async fn find_user_by_id(&self, user_id: i64) -> Res<Option<User>> {
        user::find_user_by_id(&*self.pool, &self.tables, user_id).await
    }

    async fn create_user(&self, contact: &str, channel: Channel) -> Res<User> {
        user::insert_user(&*self.pool, &self.tables, contact, channel).await
    }

    async fn find_package_by_id(&self, package_id: i64) -> Res<Option<Package>> {
        package::find_package_by_id(&*self.pool, &self.tables, package_id).await
    }

    async fn find_active_package_by_tracking(
        &self,
        tracking_number: &str,
    ) -> Res<Option<Package>> {
        package::find_latest_by_tracking(
            &*self.pool,
            &self.tables,
            tracking_number,
            Some(PackageStatus::Active),
        )
        .await
    }

    async fn find_any_package_by_tracking(&self, tracking_number: &str) -> Res<Option<Package>> {
        package::find_latest_by_tracking(&*self.pool, &self.tables, tracking_number, None).await
    }

    async fn find_pending_package_by_tracking(
        &self,
        user_id: i64,
        tracking_number: &str,
    ) -> Res<Option<Package>> {
        package::find_pending_for_user(&*self.pool, &self.tables, user_id, tracking_number, None)
            .await
    }

    async fn find_pending_package(
        &self,
        user_id: i64,
        tracking_number: &str,
        carrier: &str,
    ) -> Res<Option<Package>> {
        package::find_pending_for_user(
            &*self.pool,
            &self.tables,
            user_id,
            tracking_number,
            Some(carrier),
        )
        .await
    }

    async fn create_pending_package(
        &self,
        user_id: i64,
        tracking_number: &str,
        carrier: &str,
    ) -> Res<Package> {
        package::insert_pending_package(&*self.pool, &self.tables, user_id, tracking_number, carrier)
            .await
    }

    async fn reopen_package(&self, package_id: i64, carrier: &str) -> Res<Option<Package>> {
        package::reopen_package(&*self.pool, &self.tables, package_id, carrier).await
    }

    async fn update_package_status(
        &self,
        package_id: i64,
        status: PackageStatus,
        subscription_id: Option<i64>,
    ) -> Res<Package> {
        package::update_package_status(
            &*self.pool,
            &self.tables,
            package_id,
            status,
            subscription_id,
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Package {} not found", package_id)))
    }

    async fn get_subscription_by_id(&self, subscription_id: i64) -> Res<Option<Subscription>> {
        subscription::get_subscription_by_id(&*self.pool, &self.tables, subscription_id).await
    }

    async fn get_user_active_subscription(&self, user_id: i64) -> Res<Option<Subscription>> {
        subscription::get_user_active_subscription(&*self.pool, &self.tables, user_id, false).await
    }

    async fn get_user_active_recurring_subscription(
        &self,
        user_id: i64,
    ) -> Res<Option<Subscription>> {
        subscription::get_user_active_subscription(&*self.pool, &self.tables, user_id, true).await
    }

    async fn create_subscription_record(
        &self,
        data: SubscriptionCreateRequest,
    ) -> Res<Subscription> {
        subscription::insert_subscription(&*self.pool, &self.tables, data).await
    }

    async fn activate_subscription(
        &self,
        subscription_id: i64,
        paypal_subscription_id: Option<&str>,
        user_id: i64,
    ) -> Res<Subscription> {
        let mut tx = self.pool.begin().await?;

        let current = subscription::lock_subscription(&mut *tx, &self.tables, subscription_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Subscription {} not found", subscription_id))
            })?;

        if current.user_id != user_id {
            return Err(AppError::Forbidden(format!(
                "Subscription {} does not belong to user {}",
                subscription_id, user_id
            )));
        }
        if current.status != SubscriptionStatus::Pending {
            return Err(activation_conflict(subscription_id, current.status));
        }

        let deactivated =
            subscription::deactivate_other_active(&mut *tx, &self.tables, user_id, subscription_id)
                .await?;
        if deactivated > 0 {
            log::info!(
                "Deactivated {} previous subscription(s) of user {}",
                deactivated,
                user_id
            );
        }

        let period = current.tier_name.period_from(Utc::now());
        let activated = subscription::activate_pending(
            &mut *tx,
            &self.tables,
            subscription_id,
            paypal_subscription_id,
            period,
        )
        .await?
        .ok_or_else(|| activation_conflict(subscription_id, current.status))?;

        tx.commit().await?;

        log::info!(
            "Subscription {} activated for user {}",
            subscription_id,
            user_id
        );
        Ok(activated)
    }

    async fn update_subscription_status(
        &self,
        subscription_id: i64,
        status: SubscriptionStatus,
        paypal_subscription_id: Option<&str>,
    ) -> Res<Subscription> {
        let mut tx = self.pool.begin().await?;

        let current = subscription::lock_subscription(&mut *tx, &self.tables, subscription_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Subscription {} not found", subscription_id))
            })?;

        if !current.status.can_transition_to(status) {
            return Err(transition_conflict(subscription_id, current.status, status));
        }

        let updated = subscription::set_subscription_status(
            &mut *tx,
            &self.tables,
            subscription_id,
            status,
            paypal_subscription_id,
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", subscription_id)))?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn count_active_packages_in_cycle(&self, subscription: &Subscription) -> Res<i64> {
        package::count_active_since(
            &*self.pool,
            &self.tables,
            subscription.id,
            subscription.cycle_start(),
        )
        .await
    }

    async fn create_payment_record(&self, data: PaymentCreateRequest) -> Res<Payment> {
        payment::insert_payment(&*self.pool, &self.tables, data).await
    }

    async fn find_payment_by_order_id(&self, paypal_order_id: &str) -> Res<Option<Payment>> {
        payment::find_payment_by_order_id(&*self.pool, &self.tables, paypal_order_id).await
    }

    async fn create_notification_log(
        &self,
        data: NotificationCreateRequest,
    ) -> Res<NotificationLog> {
        notification::insert_notification(&*self.pool, &self.tables, data).await
    }

    async fn create_tracking_update(
        &self,
        data: TrackingUpdateCreateRequest,
    ) -> Res<(TrackingUpdate, bool)> {
        let tracking_number = data.tracking_number.clone();
        let status = data.status.clone();

        if let Some(inserted) =
            tracking::insert_tracking_update(&*self.pool, &self.tables, data).await?
        {
            return Ok((inserted, true));
        }

        let existing =
            tracking::find_tracking_update(&*self.pool, &self.tables, &tracking_number, &status)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "Tracking update {}/{} vanished after conflict",
                        tracking_number, status
                    ))
                })?;
        Ok((existing, false))
    }

    async fn get_tracking_updates(&self, tracking_number: &str) -> Res<Vec<TrackingUpdate>> {
        tracking::get_tracking_updates(&*self.pool, &self.tables, tracking_number).await
    }
}
