use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use common::error::{AppError, Res};
use db::{
    dtos::{payment::PaymentCreateRequest, subscription::SubscriptionCreateRequest},
    models::{
        package::{Package, PackageStatus},
        subscription::{Subscription, SubscriptionStatus, Tier},
        user::{Channel, User},
    },
    store::Store,
};
use notify::{NotificationDispatcher, NotifyFailure};
use tracking::ShippoClient;

use crate::{
    dtos::{
        pay::{CreateReferenceRequest, CreateReferenceResponse, OneTimePaymentResponse, ReferenceKind},
        sub::{ActivateSubscriptionRequest, CreditActivationResponse, SubscriptionActivationResponse},
    },
    misc::{
        correlation::{CorrelationMetadata, MISSING_CAPTURE_IDS},
        plan::{PlanCatalog, format_amount},
    },
    services::paypal::{OrderRequest, PayPalClient},
};

pub const DEFAULT_CARRIER: &str = "usps";
pub const WEBHOOK_WARNING: &str = "Failed to set up tracking updates.";
pub const ACTIVATION_FAILED: &str =
    "Payment successful, but error activating service. Contact support.";
pub const MISSING_ACTIVATION_FIELDS: &str =
    "Missing required fields: subscriptionId, paypalSubscriptionId, and userId";

const CURRENCY: &str = "USD";
const COMPLETED: &str = "COMPLETED";

/// A captured one-time order with its correlation ids recovered.
#[derive(Debug, Clone)]
pub struct CapturedPayment {
    pub order_id: String,
    pub status: String,
    pub capture_id: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    pub tracking_number: Option<String>,
    pub metadata: CorrelationMetadata,
}

/// Whether a failed confirmation should reach the buyer as a warning.
/// Rejected credentials are an operator problem. A missing phone number does
/// not matter when the user prefers email and has one.
pub fn notification_warning(failure: &NotifyFailure, user: Option<&User>) -> Option<String> {
    match failure {
        NotifyFailure::CredentialsRejected { channel, reason } => {
            log::warn!(
                "Suppressing {} credential failure from the response: {}",
                channel,
                reason
            );
            None
        }
        NotifyFailure::MissingContact(Channel::Sms)
            if user.is_some_and(|user| {
                user.notification_preference == Channel::Email
                    && user.contact_for(Channel::Email).is_some()
            }) =>
        {
            None
        }
        other => Some(other.to_string()),
    }
}

fn join_warnings(warnings: Vec<String>) -> Option<String> {
    (!warnings.is_empty()).then(|| warnings.join(" "))
}

fn order_description(tier: Tier) -> String {
    let name = tier.as_str();
    let mut chars = name.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    format!("{} Plan - Package Tracking Notification", capitalized)
}

/// Drives PayPal purchases from reference creation to activation and the
/// follow-up notification.
pub struct PaymentOrchestrator {
    store: Arc<dyn Store>,
    paypal: Arc<PayPalClient>,
    shippo: Arc<ShippoClient>,
    notifier: Arc<NotificationDispatcher>,
    plans: PlanCatalog,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        paypal: Arc<PayPalClient>,
        shippo: Arc<ShippoClient>,
        notifier: Arc<NotificationDispatcher>,
        plans: PlanCatalog,
    ) -> Self {
        PaymentOrchestrator {
            store,
            paypal,
            shippo,
            notifier,
            plans,
        }
    }

    pub fn plans(&self) -> &PlanCatalog {
        &self.plans
    }

    async fn resolve_user(&self, req: &CreateReferenceRequest) -> Res<User> {
        if let Some(user_id) = req.user_id {
            return self
                .store
                .find_user_by_id(user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)));
        }

        match (req.contact_info.as_deref().map(str::trim), req.notification_type) {
            (Some(contact), Some(channel)) if !contact.is_empty() => {
                self.store.find_or_create_user(contact, channel).await
            }
            _ => Err(AppError::BadRequest(
                "userId or contactInfo and notificationType are required".to_string(),
            )),
        }
    }

    async fn resolve_package(&self, user_id: i64, req: &CreateReferenceRequest) -> Res<Package> {
        if let Some(package_id) = req.pending_package_id {
            return self.owned_package(user_id, package_id).await;
        }

        let tracking_number = req.tracking_number.trim();
        if tracking_number.is_empty() {
            return Err(AppError::BadRequest("trackingNumber is required".to_string()));
        }
        let carrier = req
            .carrier
            .as_deref()
            .map(str::trim)
            .filter(|carrier| !carrier.is_empty())
            .unwrap_or(DEFAULT_CARRIER);

        self.store
            .find_or_create_pending_package(user_id, tracking_number, carrier)
            .await
    }

    async fn owned_package(&self, user_id: i64, package_id: i64) -> Res<Package> {
        let package = self
            .store
            .find_package_by_id(package_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Package {} not found", package_id)))?;

        if package.user_id != user_id {
            return Err(AppError::Forbidden(format!(
                "Package {} does not belong to user {}",
                package_id, user_id
            )));
        }
        Ok(package)
    }

    async fn activate_package(
        &self,
        user_id: i64,
        package_id: i64,
        subscription_id: i64,
    ) -> Res<Package> {
        self.owned_package(user_id, package_id).await?;
        self.store
            .update_package_status(package_id, PackageStatus::Active, Some(subscription_id))
            .await
    }

    /// Creates the PENDING subscription row and the PayPal order or
    /// subscription the buyer will approve.
    pub async fn create_reference(
        &self,
        req: CreateReferenceRequest,
    ) -> Res<CreateReferenceResponse> {
        let tier: Tier = req.plan_type.parse().map_err(AppError::BadRequest)?;
        let amount = self.plans.validate_price(tier, &req.price)?;
        let plan_id = self
            .plans
            .resolve_plan_id(tier, req.paypal_plan_id.as_deref())?;

        let user = self.resolve_user(&req).await?;
        let package = self.resolve_package(user.id, &req).await?;

        if tier.is_recurring() {
            if let Some(previous) = req
                .cancel_previous_paypal_sub_id
                .as_deref()
                .filter(|id| !id.trim().is_empty())
            {
                log::info!("Cancelling previous PayPal subscription {}", previous);
                if let Err(error) = self.paypal.cancel_subscription(previous).await {
                    log::error!(
                        "Failed to cancel previous PayPal subscription {}: {}",
                        previous,
                        error
                    );
                }
            }
        }

        let subscription = self
            .store
            .create_subscription_record(SubscriptionCreateRequest {
                user_id: user.id,
                tier,
                paypal_plan_id: plan_id.clone(),
                package_limit: tier.default_package_limit(),
                amount: amount.clone(),
            })
            .await?;

        let custom_id = CorrelationMetadata {
            db_sub_id: subscription.id,
            pending_package_id: Some(package.id),
            db_user_id: user.id,
        }
        .encode()?;

        let (kind, reference) = match plan_id {
            Some(plan_id) => (
                ReferenceKind::Subscription,
                self.paypal.create_subscription(&plan_id, &custom_id).await?,
            ),
            None => {
                let description = order_description(tier);
                let amount = format_amount(&amount);
                let request_id = format!(
                    "order-{}-{}",
                    subscription.id,
                    Utc::now().timestamp_millis()
                );
                let order = OrderRequest {
                    tracking_number: &package.tracking_number,
                    description: &description,
                    custom_id: &custom_id,
                    amount: &amount,
                    request_id: &request_id,
                };
                (
                    ReferenceKind::Order,
                    self.paypal.create_order(order).await?,
                )
            }
        };

        log::info!(
            "Created PayPal {:?} {} for subscription {} (user {}, package {})",
            kind,
            reference.id,
            subscription.id,
            user.id,
            package.id
        );

        Ok(CreateReferenceResponse {
            kind,
            id: reference.id,
            db_subscription_id: subscription.id,
            user_id: user.id,
            pending_package_id: package.id,
        })
    }

    /// Captures an approved order and recovers the ids we sent along with it.
    pub async fn capture_order(&self, order_id: &str) -> Res<CapturedPayment> {
        let captured = self.paypal.capture_order(order_id).await?;

        let metadata = captured
            .custom_id
            .as_deref()
            .ok_or_else(|| AppError::Internal(MISSING_CAPTURE_IDS.to_string()))
            .and_then(CorrelationMetadata::parse)?;

        let amount = captured
            .amount
            .as_deref()
            .and_then(|value| value.parse::<BigDecimal>().ok())
            .unwrap_or_default();

        Ok(CapturedPayment {
            order_id: captured.order_id,
            status: captured.status,
            capture_id: captured.capture_id,
            amount,
            currency: captured.currency.unwrap_or_else(|| CURRENCY.to_string()),
            tracking_number: captured.reference_id,
            metadata,
        })
    }

    /// Confirmation and tracking webhook after an activation. Neither can
    /// undo the purchase, so failures come back as one warning string.
    async fn after_activation(
        &self,
        user_id: i64,
        package: &Package,
        subscription_id: i64,
    ) -> Option<String> {
        let mut warnings = Vec::new();

        match self
            .notifier
            .send_confirmation(user_id, &package.tracking_number)
            .await
        {
            Ok(delivery) => log::info!("Confirmation for package {}: {}", package.id, delivery),
            Err(failure) => {
                log::warn!("Confirmation for package {} failed: {}", package.id, failure);
                let user = if matches!(failure, NotifyFailure::MissingContact(Channel::Sms)) {
                    self.store.find_user_by_id(user_id).await.ok().flatten()
                } else {
                    None
                };
                if let Some(warning) = notification_warning(&failure, user.as_ref()) {
                    warnings.push(warning);
                }
            }
        }

        if let Err(error) = self
            .shippo
            .register_webhook(&package.tracking_number, &package.carrier, subscription_id)
            .await
        {
            log::error!(
                "Tracking webhook for {} failed: {}",
                package.tracking_number,
                error
            );
            warnings.push(WEBHOOK_WARNING.to_string());
        }

        join_warnings(warnings)
    }

    /// Captures a one-time order and activates what it paid for. Capturing
    /// the same order twice is answered from the stored payment.
    pub async fn process_one_time_payment(&self, order_id: &str) -> Res<OneTimePaymentResponse> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(AppError::BadRequest("orderId is required".to_string()));
        }

        if let Some(payment) = self.store.find_payment_by_order_id(order_id).await? {
            log::info!("Order {} already processed as payment {}", order_id, payment.id);
            // A replay repeats the first outcome: the paid package must be
            // active and linked to the paid subscription.
            let activated = match payment.package_id {
                Some(package_id) => self
                    .store
                    .find_package_by_id(package_id)
                    .await?
                    .filter(|package| {
                        package.status == PackageStatus::Active
                            && payment.subscription_id.is_some()
                            && package.subscription_id == payment.subscription_id
                    })
                    .map(|package| package.id),
                None => None,
            };
            let (success, message) = match activated {
                Some(_) => (true, "Payment already processed.".to_string()),
                None => {
                    log::warn!("Order {} was paid but its package is not active", order_id);
                    (false, ACTIVATION_FAILED.to_string())
                }
            };
            return Ok(OneTimePaymentResponse {
                success,
                message,
                paypal_order_id: order_id.to_string(),
                capture_id: payment.paypal_capture_id,
                db_subscription_id: payment.subscription_id,
                activated_package_id: activated,
                warning: None,
            });
        }

        let captured = self.capture_order(order_id).await?;
        if captured.status != COMPLETED {
            return Err(AppError::Upstream(format!(
                "Payment capture failed or is pending. Status: {}",
                captured.status
            )));
        }

        let CorrelationMetadata {
            db_sub_id,
            pending_package_id,
            db_user_id,
        } = captured.metadata;
        let package_id = pending_package_id.ok_or_else(|| {
            AppError::Internal(
                "Internal processing error: Missing necessary IDs for subscription or package."
                    .to_string(),
            )
        })?;

        if let Err(error) = self
            .store
            .create_payment_record(PaymentCreateRequest {
                user_id: Some(db_user_id),
                subscription_id: Some(db_sub_id),
                package_id: Some(package_id),
                paypal_order_id: Some(captured.order_id.clone()),
                paypal_capture_id: captured.capture_id.clone(),
                paypal_subscription_id: None,
                amount: captured.amount.clone(),
                currency: captured.currency.clone(),
                status: captured.status.clone(),
            })
            .await
        {
            log::error!("Failed to record payment for order {}: {}", order_id, error);
        }

        self.store
            .get_subscription_by_id(db_sub_id)
            .await?
            .filter(|subscription| subscription.status == SubscriptionStatus::Pending)
            .ok_or_else(|| {
                AppError::Conflict("Subscription record not found or already processed.".to_string())
            })?;

        let activation = async {
            self.store
                .activate_subscription(db_sub_id, None, db_user_id)
                .await?;
            self.activate_package(db_user_id, package_id, db_sub_id)
                .await
        };

        let package = match activation.await {
            Ok(package) => package,
            Err(error) => {
                log::error!(
                    "Activation after capture of order {} failed: {}",
                    order_id,
                    error
                );
                return Ok(OneTimePaymentResponse {
                    success: false,
                    message: ACTIVATION_FAILED.to_string(),
                    paypal_order_id: captured.order_id,
                    capture_id: captured.capture_id,
                    db_subscription_id: Some(db_sub_id),
                    activated_package_id: None,
                    warning: None,
                });
            }
        };

        let warning = self.after_activation(db_user_id, &package, db_sub_id).await;

        Ok(OneTimePaymentResponse {
            success: true,
            message: "Payment successful and subscription activated.".to_string(),
            paypal_order_id: captured.order_id,
            capture_id: captured.capture_id,
            db_subscription_id: Some(db_sub_id),
            activated_package_id: Some(package.id),
            warning,
        })
    }

    fn already_in_state(subscription: &Subscription) -> SubscriptionActivationResponse {
        SubscriptionActivationResponse {
            success: true,
            message: format!("Subscription already in {} state.", subscription.status),
            db_subscription_id: subscription.id,
            activated_package_id: None,
            subscription: subscription.into(),
            warning: None,
        }
    }

    /// Activates a recurring subscription the buyer approved at PayPal, and
    /// the package it was bought for.
    pub async fn process_subscription_activation(
        &self,
        req: ActivateSubscriptionRequest,
    ) -> Res<SubscriptionActivationResponse> {
        let paypal_subscription_id = req
            .paypal_subscription_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        let (Some(subscription_id), Some(paypal_subscription_id), Some(user_id)) =
            (req.subscription_id, paypal_subscription_id, req.user_id)
        else {
            return Err(AppError::BadRequest(MISSING_ACTIVATION_FIELDS.to_string()));
        };

        let subscription = self
            .store
            .get_subscription_by_id(subscription_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Subscription {} not found", subscription_id))
            })?;

        if subscription.user_id != user_id {
            return Err(AppError::Forbidden(format!(
                "Subscription {} does not belong to user {}",
                subscription_id, user_id
            )));
        }
        if subscription.status != SubscriptionStatus::Pending {
            return Ok(Self::already_in_state(&subscription));
        }

        if let Err(error) = self
            .store
            .create_payment_record(PaymentCreateRequest {
                user_id: Some(user_id),
                subscription_id: Some(subscription_id),
                package_id: req.pending_package_id,
                paypal_order_id: None,
                paypal_capture_id: None,
                paypal_subscription_id: Some(paypal_subscription_id.to_string()),
                amount: subscription.amount.clone(),
                currency: CURRENCY.to_string(),
                status: COMPLETED.to_string(),
            })
            .await
        {
            log::error!(
                "Failed to record payment for PayPal subscription {}: {}",
                paypal_subscription_id,
                error
            );
        }

        let activated = match self
            .store
            .activate_subscription(subscription_id, Some(paypal_subscription_id), user_id)
            .await
        {
            Ok(activated) => activated,
            Err(AppError::Conflict(message)) => {
                log::info!("Activation race lost: {}", message);
                let current = self
                    .store
                    .get_subscription_by_id(subscription_id)
                    .await?
                    .unwrap_or(subscription);
                return Ok(Self::already_in_state(&current));
            }
            Err(error) => return Err(error),
        };

        let package_id = match req.pending_package_id {
            Some(id) => Some(id),
            None => match req
                .tracking_number
                .as_deref()
                .map(str::trim)
                .filter(|number| !number.is_empty())
            {
                Some(number) => self
                    .store
                    .find_pending_package_by_tracking(user_id, number)
                    .await?
                    .map(|package| package.id),
                None => None,
            },
        };

        let (message, package, warning) = match package_id {
            None => (
                "Subscription activated successfully (no package linked)".to_string(),
                None,
                None,
            ),
            Some(package_id) => match self
                .activate_package(user_id, package_id, subscription_id)
                .await
            {
                Ok(package) => {
                    let warning = self
                        .after_activation(user_id, &package, subscription_id)
                        .await;
                    (
                        "Subscription and package activated successfully".to_string(),
                        Some(package),
                        warning,
                    )
                }
                Err(error) => {
                    log::error!(
                        "Package {} activation for subscription {} failed: {}",
                        package_id,
                        subscription_id,
                        error
                    );
                    (
                        format!(
                            "Subscription activated but package activation failed: {}",
                            error
                        ),
                        None,
                        None,
                    )
                }
            },
        };

        Ok(SubscriptionActivationResponse {
            success: true,
            message,
            db_subscription_id: activated.id,
            activated_package_id: package.map(|package| package.id),
            subscription: (&activated).into(),
            warning,
        })
    }

    /// Activates a package against the credit of the user's recurring
    /// subscription, without a new payment.
    pub async fn activate_with_credit(
        &self,
        user_id: i64,
        package_id: i64,
    ) -> Res<CreditActivationResponse> {
        let package = self.owned_package(user_id, package_id).await?;

        if package.status == PackageStatus::Active && package.subscription_id.is_some() {
            return Ok(CreditActivationResponse {
                success: true,
                message: "Package is already active.".to_string(),
                db_subscription_id: package.subscription_id,
                activated_package_id: package.id,
                warning: None,
            });
        }

        let subscription = self
            .store
            .get_user_active_recurring_subscription(user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("No active recurring subscription found for this user".to_string())
            })?;

        let used = self
            .store
            .count_active_packages_in_cycle(&subscription)
            .await?;
        if !subscription.has_credit(used) {
            return Err(AppError::Conflict(format!(
                "No package credits remaining in the current billing cycle ({} of {} used).",
                used, subscription.package_limit
            )));
        }

        let activated = self
            .store
            .update_package_status(package.id, PackageStatus::Active, Some(subscription.id))
            .await?;
        let warning = self
            .after_activation(user_id, &activated, subscription.id)
            .await;

        Ok(CreditActivationResponse {
            success: true,
            message: "Package activated using your subscription.".to_string(),
            db_subscription_id: Some(subscription.id),
            activated_package_id: activated.id,
            warning,
        })
    }

    pub async fn cancel_paypal_subscription(&self, paypal_subscription_id: &str) -> Res<()> {
        self.paypal.cancel_subscription(paypal_subscription_id).await
    }

    /// Cancels the user's active subscription here and at PayPal.
    pub async fn cancel_user_subscription(&self, user_id: i64) -> Res<Subscription> {
        let subscription = self
            .store
            .get_user_active_subscription(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No active subscription found".to_string()))?;

        if let Some(paypal_id) = subscription.paypal_subscription_id.as_deref() {
            self.cancel_paypal_subscription(paypal_id).await?;
        }

        self.store
            .update_subscription_status(subscription.id, SubscriptionStatus::Cancelled, None)
            .await
    }
}
