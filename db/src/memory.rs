//! In-process [`Store`] for tests. Mirrors the Postgres semantics closely
//! enough for the payment and notification flows: unique tracking numbers,
//! conditional PENDING activation and forward-only subscription states.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use common::error::{AppError, Res};

use crate::{
    dtos::{
        notification::NotificationCreateRequest, payment::PaymentCreateRequest,
        subscription::SubscriptionCreateRequest, tracking::TrackingUpdateCreateRequest,
    },
    models::{
        notification::NotificationLog,
        package::{Package, PackageStatus},
        payment::Payment,
        subscription::{Subscription, SubscriptionStatus, Tier},
        tracking::TrackingUpdate,
        user::{Channel, User},
    },
    store::{Store, activation_conflict, transition_conflict},
};

#[derive(Default)]
struct State {
    next_id: i64,
    users: Vec<User>,
    packages: Vec<Package>,
    subscriptions: Vec<Subscription>,
    payments: Vec<Payment>,
    notifications: Vec<NotificationLog>,
    tracking_updates: Vec<TrackingUpdate>,
    fail_notification_log: bool,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn users(&self) -> Vec<User> {
        self.lock().users.clone()
    }

    pub fn packages(&self) -> Vec<Package> {
        self.lock().packages.clone()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock().subscriptions.clone()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.lock().payments.clone()
    }

    pub fn notifications(&self) -> Vec<NotificationLog> {
        self.lock().notifications.clone()
    }

    /// Makes every later notification-log insert fail.
    pub fn fail_notification_log(&self) {
        self.lock().fail_notification_log = true;
    }

    pub fn seed_user(&self, email: Option<&str>, phone: Option<&str>, preference: Channel) -> User {
        let mut state = self.lock();
        let now = Utc::now();
        let user = User {
            id: state.next_id(),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            notification_preference: preference,
            created_at: now,
            updated_at: now,
        };
        state.users.push(user.clone());
        user
    }

    pub fn seed_package(
        &self,
        user_id: i64,
        tracking_number: &str,
        carrier: &str,
        status: PackageStatus,
        subscription_id: Option<i64>,
    ) -> Package {
        let mut state = self.lock();
        let now = Utc::now();
        let package = Package {
            id: state.next_id(),
            user_id,
            subscription_id,
            tracking_number: tracking_number.to_string(),
            carrier: carrier.to_string(),
            status,
            created_at: now,
            updated_at: now,
        };
        state.packages.push(package.clone());
        package
    }

    pub fn seed_subscription(
        &self,
        user_id: i64,
        tier: Tier,
        status: SubscriptionStatus,
        amount: BigDecimal,
    ) -> Subscription {
        let mut state = self.lock();
        let now = Utc::now();
        let period = match status {
            SubscriptionStatus::Active => tier.period_from(now),
            _ => None,
        };
        let subscription = Subscription {
            id: state.next_id(),
            user_id,
            paypal_plan_id: None,
            paypal_subscription_id: None,
            status,
            tier_name: tier,
            is_monthly: tier.is_recurring(),
            package_limit: tier.default_package_limit(),
            amount,
            current_period_start: period.map(|(start, _)| start),
            current_period_end: period.map(|(_, end)| end),
            created_at: now,
            updated_at: now,
        };
        state.subscriptions.push(subscription.clone());
        subscription
    }

    /// Overrides the package limit of a stored subscription.
    pub fn set_package_limit(&self, subscription_id: i64, package_limit: i32) {
        let mut state = self.lock();
        if let Some(subscription) = state
            .subscriptions
            .iter_mut()
            .find(|subscription| subscription.id == subscription_id)
        {
            subscription.package_limit = package_limit;
        }
    }

    /// Latest row first, like the `ORDER BY created_at DESC` queries.
    fn latest<'a, T, F>(rows: &'a [T], predicate: F) -> Option<&'a T>
    where
        F: Fn(&T) -> bool,
    {
        rows.iter().rev().find(|row| predicate(row))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user_by_contact(&self, contact: &str, channel: Channel) -> Res<Option<User>> {
        let state = self.lock();
        Ok(state
            .users
            .iter()
            .find(|user| {
                let stored = match channel {
                    Channel::Email => user.email.as_deref(),
                    Channel::Sms => user.phone.as_deref(),
                };
                stored == Some(contact)
            })
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: i64) -> Res<Option<User>> {
        Ok(self.lock().users.iter().find(|user| user.id == user_id).cloned())
    }

    async fn create_user(&self, contact: &str, channel: Channel) -> Res<User> {
        let (email, phone) = match channel {
            Channel::Email => (Some(contact), None),
            Channel::Sms => (None, Some(contact)),
        };
        Ok(self.seed_user(email, phone, channel))
    }

    async fn find_package_by_id(&self, package_id: i64) -> Res<Option<Package>> {
        Ok(self
            .lock()
            .packages
            .iter()
            .find(|package| package.id == package_id)
            .cloned())
    }

    async fn find_active_package_by_tracking(
        &self,
        tracking_number: &str,
    ) -> Res<Option<Package>> {
        let state = self.lock();
        Ok(Self::latest(&state.packages, |package| {
            package.tracking_number == tracking_number && package.status == PackageStatus::Active
        })
        .cloned())
    }

    async fn find_any_package_by_tracking(&self, tracking_number: &str) -> Res<Option<Package>> {
        let state = self.lock();
        Ok(Self::latest(&state.packages, |package| {
            package.tracking_number == tracking_number
        })
        .cloned())
    }

    async fn find_pending_package_by_tracking(
        &self,
        user_id: i64,
        tracking_number: &str,
    ) -> Res<Option<Package>> {
        let state = self.lock();
        Ok(Self::latest(&state.packages, |package| {
            package.user_id == user_id
                && package.tracking_number == tracking_number
                && package.status == PackageStatus::Pending
        })
        .cloned())
    }

    async fn find_pending_package(
        &self,
        user_id: i64,
        tracking_number: &str,
        carrier: &str,
    ) -> Res<Option<Package>> {
        let state = self.lock();
        Ok(Self::latest(&state.packages, |package| {
            package.user_id == user_id
                && package.tracking_number == tracking_number
                && package.carrier == carrier
                && package.status == PackageStatus::Pending
        })
        .cloned())
    }

    async fn create_pending_package(
        &self,
        user_id: i64,
        tracking_number: &str,
        carrier: &str,
    ) -> Res<Package> {
        let taken = self
            .lock()
            .packages
            .iter()
            .any(|package| package.tracking_number == tracking_number);
        if taken {
            return Err(AppError::Conflict(format!(
                "duplicate tracking number {}",
                tracking_number
            )));
        }
        Ok(self.seed_package(user_id, tracking_number, carrier, PackageStatus::Pending, None))
    }

    async fn reopen_package(&self, package_id: i64, carrier: &str) -> Res<Option<Package>> {
        let mut state = self.lock();
        let Some(package) = state
            .packages
            .iter_mut()
            .find(|package| package.id == package_id && package.status == PackageStatus::Inactive)
        else {
            return Ok(None);
        };
        package.status = PackageStatus::Pending;
        package.carrier = carrier.to_string();
        package.updated_at = Utc::now();
        Ok(Some(package.clone()))
    }

    async fn update_package_status(
        &self,
        package_id: i64,
        status: PackageStatus,
        subscription_id: Option<i64>,
    ) -> Res<Package> {
        let mut state = self.lock();
        let package = state
            .packages
            .iter_mut()
            .find(|package| package.id == package_id)
            .ok_or_else(|| AppError::NotFound(format!("Package {} not found", package_id)))?;
        package.status = status;
        if subscription_id.is_some() {
            package.subscription_id = subscription_id;
        }
        package.updated_at = Utc::now();
        Ok(package.clone())
    }

    async fn get_subscription_by_id(&self, subscription_id: i64) -> Res<Option<Subscription>> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .find(|subscription| subscription.id == subscription_id)
            .cloned())
    }

    async fn get_user_active_subscription(&self, user_id: i64) -> Res<Option<Subscription>> {
        let state = self.lock();
        Ok(Self::latest(&state.subscriptions, |subscription| {
            subscription.user_id == user_id && subscription.status == SubscriptionStatus::Active
        })
        .cloned())
    }

    async fn get_user_active_recurring_subscription(
        &self,
        user_id: i64,
    ) -> Res<Option<Subscription>> {
        let state = self.lock();
        Ok(Self::latest(&state.subscriptions, |subscription| {
            subscription.user_id == user_id
                && subscription.status == SubscriptionStatus::Active
                && subscription.is_monthly
        })
        .cloned())
    }

    async fn create_subscription_record(
        &self,
        data: SubscriptionCreateRequest,
    ) -> Res<Subscription> {
        let mut subscription =
            self.seed_subscription(data.user_id, data.tier, SubscriptionStatus::Pending, data.amount);
        subscription.paypal_plan_id = data.paypal_plan_id;
        subscription.package_limit = data.package_limit;

        let mut state = self.lock();
        if let Some(stored) = state
            .subscriptions
            .iter_mut()
            .find(|stored| stored.id == subscription.id)
        {
            *stored = subscription.clone();
        }
        Ok(subscription)
    }

    async fn activate_subscription(
        &self,
        subscription_id: i64,
        paypal_subscription_id: Option<&str>,
        user_id: i64,
    ) -> Res<Subscription> {
        let mut state = self.lock();
        let current = state
            .subscriptions
            .iter()
            .find(|subscription| subscription.id == subscription_id)
            .cloned()
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

        let now = Utc::now();
        let period = current.tier_name.period_from(now);
        let mut activated = None;
        for subscription in state.subscriptions.iter_mut() {
            if subscription.id == subscription_id {
                subscription.status = SubscriptionStatus::Active;
                subscription.paypal_subscription_id = paypal_subscription_id.map(str::to_string);
                subscription.current_period_start = period.map(|(start, _)| start);
                subscription.current_period_end = period.map(|(_, end)| end);
                subscription.updated_at = now;
                activated = Some(subscription.clone());
            } else if subscription.user_id == user_id
                && subscription.status == SubscriptionStatus::Active
            {
                subscription.status = SubscriptionStatus::Inactive;
                subscription.updated_at = now;
            }
        }

        activated.ok_or_else(|| activation_conflict(subscription_id, current.status))
    }

    async fn update_subscription_status(
        &self,
        subscription_id: i64,
        status: SubscriptionStatus,
        paypal_subscription_id: Option<&str>,
    ) -> Res<Subscription> {
        let mut state = self.lock();
        let subscription = state
            .subscriptions
            .iter_mut()
            .find(|subscription| subscription.id == subscription_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("Subscription {} not found", subscription_id))
            })?;

        if !subscription.status.can_transition_to(status) {
            return Err(transition_conflict(subscription_id, subscription.status, status));
        }

        subscription.status = status;
        if let Some(paypal_id) = paypal_subscription_id {
            subscription.paypal_subscription_id = Some(paypal_id.to_string());
        }
        subscription.updated_at = Utc::now();
        Ok(subscription.clone())
    }

    async fn count_active_packages_in_cycle(&self, subscription: &Subscription) -> Res<i64> {
        let since = subscription.cycle_start();
        let count = self
            .lock()
            .packages
            .iter()
            .filter(|package| {
                package.subscription_id == Some(subscription.id)
                    && package.status == PackageStatus::Active
                    && package.updated_at >= since
            })
            .count();
        Ok(count as i64)
    }

    async fn create_payment_record(&self, data: PaymentCreateRequest) -> Res<Payment> {
        let mut state = self.lock();
        if let Some(order_id) = data.paypal_order_id.as_deref() {
            if state
                .payments
                .iter()
                .any(|payment| payment.paypal_order_id.as_deref() == Some(order_id))
            {
                return Err(AppError::Conflict(format!(
                    "duplicate payment for order {}",
                    order_id
                )));
            }
        }

        let payment = Payment {
            id: state.next_id(),
            user_id: data.user_id,
            subscription_id: data.subscription_id,
            package_id: data.package_id,
            paypal_order_id: data.paypal_order_id,
            paypal_capture_id: data.paypal_capture_id,
            paypal_subscription_id: data.paypal_subscription_id,
            amount: data.amount,
            currency: data.currency,
            status: data.status,
            created_at: Utc::now(),
        };
        state.payments.push(payment.clone());
        Ok(payment)
    }

    async fn find_payment_by_order_id(&self, paypal_order_id: &str) -> Res<Option<Payment>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|payment| payment.paypal_order_id.as_deref() == Some(paypal_order_id))
            .cloned())
    }

    async fn create_notification_log(
        &self,
        data: NotificationCreateRequest,
    ) -> Res<NotificationLog> {
        let mut state = self.lock();
        if state.fail_notification_log {
            return Err(AppError::Internal("notification log unavailable".to_string()));
        }
        let entry = NotificationLog {
            id: state.next_id(),
            package_id: data.package_id,
            user_id: data.user_id,
            notification_type: data.channel,
            contact_info: data.contact_info,
            purpose: data.purpose,
            tracking_number: data.tracking_number,
            status: data.status,
            created_at: Utc::now(),
        };
        state.notifications.push(entry.clone());
        Ok(entry)
    }

    async fn create_tracking_update(
        &self,
        data: TrackingUpdateCreateRequest,
    ) -> Res<(TrackingUpdate, bool)> {
        let mut state = self.lock();
        if let Some(existing) = state.tracking_updates.iter().find(|update| {
            update.tracking_number == data.tracking_number && update.status == data.status
        }) {
            return Ok((existing.clone(), false));
        }

        let update = TrackingUpdate {
            id: state.next_id(),
            tracking_number: data.tracking_number,
            status: data.status,
            status_details: data.status_details,
            status_date: data.status_date,
            carrier: data.carrier,
            location: data.location,
            created_at: Utc::now(),
        };
        state.tracking_updates.push(update.clone());
        Ok((update, true))
    }

    async fn get_tracking_updates(&self, tracking_number: &str) -> Res<Vec<TrackingUpdate>> {
        let mut updates: Vec<TrackingUpdate> = self
            .lock()
            .tracking_updates
            .iter()
            .filter(|update| update.tracking_number == tracking_number)
            .cloned()
            .collect();
        updates.sort_by(|a, b| b.status_date.cmp(&a.status_date));
        Ok(updates)
    }
}
