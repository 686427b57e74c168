use std::{str::FromStr, sync::Arc};

use api_pay::{
    PayPalClient, PaymentOrchestrator, PlanCatalog, TokenCache,
    dtos::{pay::CreateReferenceRequest, pay::ReferenceKind, sub::ActivateSubscriptionRequest},
    misc::correlation::{CorrelationMetadata, MISSING_CAPTURE_IDS},
    services::orchestrator::{ACTIVATION_FAILED, MISSING_ACTIVATION_FIELDS, WEBHOOK_WARNING},
};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use claim::{assert_matches, assert_none, assert_ok, assert_some};
use common::{
    env_config::{PayPalConfig, ShippoConfig},
    error::AppError,
    misc::Environment,
};
use db::{
    memory::MemoryStore,
    models::{
        package::PackageStatus,
        subscription::{SubscriptionStatus, Tier},
        user::Channel,
    },
    store::Store,
};
use notify::{ChannelError, EmailChannel, NotificationDispatcher, SmsChannel};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, header_exists, method, path},
};

struct BrokenEmail;

#[async_trait]
impl EmailChannel for BrokenEmail {
    async fn send_templated(&self, _: &str, _: &str, _: &Value) -> Result<(), ChannelError> {
        Err(ChannelError::Provider("mailbox unavailable".to_string()))
    }

    async fn send_text(&self, _: &str, _: &str, _: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Provider("mailbox unavailable".to_string()))
    }
}

struct NoSms;

#[async_trait]
impl SmsChannel for NoSms {
    async fn send_text(&self, _: &str, _: &str) -> Result<(), ChannelError> {
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    orchestrator: PaymentOrchestrator,
    paypal: MockServer,
    shippo: MockServer,
}

/// Orchestrator over an in-memory store, with PayPal and Shippo mocked.
/// `simulate` switches the dispatcher to simulated delivery; otherwise every
/// email fails.
async fn harness(simulate: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let paypal = MockServer::start().await;
    let shippo = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "A21-token", "expires_in": 32400 })),
        )
        .mount(&paypal)
        .await;

    let paypal_config = PayPalConfig {
        api_url: paypal.uri(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        monthly_plan_id: Some("P-MONTHLY".to_string()),
        yearly_plan_id: Some("P-YEARLY".to_string()),
        return_url: "https://example.com/return".to_string(),
        cancel_url: "https://example.com/cancel".to_string(),
    };
    let shippo_config = ShippoConfig {
        api_url: shippo.uri(),
        api_key: "shippo_live_key".to_string(),
        webhook_token: None,
    };

    let shippo_client = Arc::new(tracking::ShippoClient::new(
        &shippo_config,
        Environment::Production,
    ));
    let notifier = Arc::new(NotificationDispatcher::new(
        store.clone() as Arc<dyn Store>,
        Arc::new(BrokenEmail),
        Arc::new(NoSms),
        shippo_client.clone(),
        simulate,
        "https://notifytracking.com",
    ));
    let orchestrator = PaymentOrchestrator::new(
        store.clone() as Arc<dyn Store>,
        Arc::new(PayPalClient::new(&paypal_config, Arc::new(TokenCache::new()))),
        shippo_client,
        notifier,
        PlanCatalog::from_config(&paypal_config),
    );

    Harness {
        store,
        orchestrator,
        paypal,
        shippo,
    }
}

async fn accept_webhooks(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/tracks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "object_id": "trk_1" })))
        .mount(server)
        .await;
}

fn price(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

fn reference_request(plan_type: &str, price: &str) -> CreateReferenceRequest {
    CreateReferenceRequest {
        price: price.to_string(),
        tracking_number: "9400111899223197428490".to_string(),
        carrier: Some("usps".to_string()),
        plan_type: plan_type.to_string(),
        paypal_plan_id: None,
        user_id: None,
        pending_package_id: None,
        contact_info: Some("buyer@example.com".to_string()),
        notification_type: Some(Channel::Email),
        cancel_previous_paypal_sub_id: None,
    }
}

fn capture_body(status: &str, custom_id: Option<String>) -> Value {
    let mut capture = json!({
        "id": "CAPTURE-1",
        "status": status,
        "amount": { "currency_code": "USD", "value": "1.99" }
    });
    if let Some(custom_id) = custom_id {
        capture["custom_id"] = json!(custom_id);
    }
    json!({
        "id": "ORDER-1",
        "status": status,
        "purchase_units": [{
            "reference_id": "9400111899223197428490",
            "payments": { "captures": [capture] }
        }]
    })
}

async fn mock_capture(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/ORDER-1/capture"))
        .and(header("Authorization", "Bearer A21-token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn single_purchase_creates_an_order_and_pending_rows() {
    let h = harness(true).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .and(header_exists("PayPal-Request-Id"))
        .and(body_partial_json(json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": "9400111899223197428490",
                "description": "Single Plan - Package Tracking Notification",
                "amount": { "currency_code": "USD", "value": "1.99" }
            }]
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": "ORDER-1", "status": "CREATED" })),
        )
        .expect(1)
        .mount(&h.paypal)
        .await;

    let reference = assert_ok!(
        h.orchestrator
            .create_reference(reference_request("single", "1.99"))
            .await
    );

    assert_eq!(reference.kind, ReferenceKind::Order);
    assert_eq!(reference.id, "ORDER-1");
    let subscriptions = h.store.subscriptions();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].status, SubscriptionStatus::Pending);
    assert_eq!(subscriptions[0].tier_name, Tier::Single);
    assert_eq!(subscriptions[0].package_limit, 1);
    let packages = h.store.packages();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].id, reference.pending_package_id);
    assert_eq!(packages[0].status, PackageStatus::Pending);
}

#[tokio::test]
async fn tampered_price_is_rejected_before_anything_is_written() {
    let h = harness(true).await;

    let result = h
        .orchestrator
        .create_reference(reference_request("monthly", "0.01"))
        .await;

    assert_matches!(result, Err(AppError::BadRequest(_)));
    assert!(h.store.users().is_empty());
    assert!(h.store.subscriptions().is_empty());
}

#[tokio::test]
async fn plan_switch_continues_when_the_old_subscription_cannot_be_cancelled() {
    let h = harness(true).await;
    Mock::given(method("POST"))
        .and(path("/v1/billing/subscriptions/I-OLD/cancel"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({ "name": "UNPROCESSABLE" })))
        .expect(1)
        .mount(&h.paypal)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/billing/subscriptions"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({ "plan_id": "P-YEARLY" })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "id": "I-NEW", "status": "APPROVAL_PENDING" })),
        )
        .expect(1)
        .mount(&h.paypal)
        .await;

    let mut req = reference_request("yearly", "34.90");
    req.cancel_previous_paypal_sub_id = Some("I-OLD".to_string());
    let reference = assert_ok!(h.orchestrator.create_reference(req).await);

    assert_eq!(reference.kind, ReferenceKind::Subscription);
    assert_eq!(reference.id, "I-NEW");
    let subscription = &h.store.subscriptions()[0];
    assert!(subscription.is_monthly);
    assert_eq!(subscription.paypal_plan_id.as_deref(), Some("P-YEARLY"));
}

#[tokio::test]
async fn paypal_rejection_of_the_order_is_fatal() {
    let h = harness(true).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "Invalid amount" })),
        )
        .mount(&h.paypal)
        .await;

    let result = h
        .orchestrator
        .create_reference(reference_request("single", "1.99"))
        .await;

    assert_matches!(result, Err(AppError::Upstream(message)) if message == "Invalid amount");
}

/// A user with a pending package and the pending single-tier subscription
/// that pays for it, as left behind by `create_reference`.
fn seed_checkout(store: &MemoryStore) -> (i64, i64, i64) {
    let user = store.seed_user(Some("buyer@example.com"), None, Channel::Email);
    let package = store.seed_package(
        user.id,
        "9400111899223197428490",
        "usps",
        PackageStatus::Pending,
        None,
    );
    let subscription =
        store.seed_subscription(user.id, Tier::Single, SubscriptionStatus::Pending, price("1.99"));
    (user.id, package.id, subscription.id)
}

fn metadata(user_id: i64, package_id: i64, subscription_id: i64) -> String {
    CorrelationMetadata {
        db_sub_id: subscription_id,
        pending_package_id: Some(package_id),
        db_user_id: user_id,
    }
    .encode()
    .unwrap()
}

#[tokio::test]
async fn captured_order_activates_subscription_and_package_once() {
    let h = harness(true).await;
    accept_webhooks(&h.shippo).await;
    let (user_id, package_id, subscription_id) = seed_checkout(&h.store);
    mock_capture(
        &h.paypal,
        capture_body("COMPLETED", Some(metadata(user_id, package_id, subscription_id))),
    )
    .await;

    let first = assert_ok!(h.orchestrator.process_one_time_payment("ORDER-1").await);

    assert!(first.success);
    assert_eq!(first.capture_id.as_deref(), Some("CAPTURE-1"));
    assert_eq!(first.activated_package_id, Some(package_id));
    assert_none!(first.warning);
    let package = &h.store.packages()[0];
    assert_eq!(package.status, PackageStatus::Active);
    assert_eq!(package.subscription_id, Some(subscription_id));
    assert_eq!(h.store.subscriptions()[0].status, SubscriptionStatus::Active);
    assert_eq!(h.store.payments().len(), 1);

    // The capture mock expects a single call; a replay is answered locally.
    let replay = assert_ok!(h.orchestrator.process_one_time_payment("ORDER-1").await);
    assert!(replay.success);
    assert_eq!(replay.message, "Payment already processed.");
    assert_eq!(replay.db_subscription_id, Some(subscription_id));
    assert_eq!(h.store.payments().len(), 1);
}

#[tokio::test]
async fn pending_capture_activates_nothing() {
    let h = harness(true).await;
    let (user_id, package_id, subscription_id) = seed_checkout(&h.store);
    mock_capture(
        &h.paypal,
        capture_body("PENDING", Some(metadata(user_id, package_id, subscription_id))),
    )
    .await;

    let result = h.orchestrator.process_one_time_payment("ORDER-1").await;

    assert_matches!(
        result,
        Err(AppError::Upstream(message)) if message == "Payment capture failed or is pending. Status: PENDING"
    );
    assert_eq!(h.store.subscriptions()[0].status, SubscriptionStatus::Pending);
    assert!(h.store.payments().is_empty());
}

#[tokio::test]
async fn order_ids_cannot_escape_the_capture_path() {
    let h = harness(true).await;
    seed_checkout(&h.store);
    Mock::given(method("POST"))
        .and(path("/v1/billing/subscriptions/I-VICTIM/cancel"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&h.paypal)
        .await;

    let result = h
        .orchestrator
        .process_one_time_payment("../../../v1/billing/subscriptions/I-VICTIM/cancel?x=")
        .await;

    assert_matches!(result, Err(AppError::BadRequest(_)));
    let requests = h.paypal.received_requests().await.unwrap_or_default();
    assert!(requests.iter().all(|request| {
        let path = request.url.path();
        path == "/v1/oauth2/token"
            || (path.starts_with("/v2/checkout/orders/") && path.ends_with("/capture"))
    }));
    assert!(h.store.payments().is_empty());
}

#[tokio::test]
async fn capture_without_metadata_is_an_internal_error() {
    let h = harness(true).await;
    seed_checkout(&h.store);
    mock_capture(&h.paypal, capture_body("COMPLETED", None)).await;

    let result = h.orchestrator.process_one_time_payment("ORDER-1").await;

    assert_matches!(result, Err(AppError::Internal(message)) if message == MISSING_CAPTURE_IDS);
    assert_eq!(h.store.packages()[0].status, PackageStatus::Pending);
}

#[tokio::test]
async fn capture_for_an_already_active_subscription_is_a_conflict() {
    let h = harness(true).await;
    let user = h.store.seed_user(Some("buyer@example.com"), None, Channel::Email);
    let package = h.store.seed_package(
        user.id,
        "9400111899223197428490",
        "usps",
        PackageStatus::Pending,
        None,
    );
    let subscription =
        h.store
            .seed_subscription(user.id, Tier::Single, SubscriptionStatus::Active, price("1.99"));
    mock_capture(
        &h.paypal,
        capture_body("COMPLETED", Some(metadata(user.id, package.id, subscription.id))),
    )
    .await;

    let result = h.orchestrator.process_one_time_payment("ORDER-1").await;

    assert_matches!(result, Err(AppError::Conflict(_)));
    assert_eq!(h.store.packages()[0].status, PackageStatus::Pending);
}

#[tokio::test]
async fn activation_failure_after_capture_is_reported_not_raised() {
    let h = harness(true).await;
    let (user_id, _, subscription_id) = seed_checkout(&h.store);
    // The package id in the metadata points at nothing.
    mock_capture(
        &h.paypal,
        capture_body("COMPLETED", Some(metadata(user_id, 9_999, subscription_id))),
    )
    .await;

    let outcome = assert_ok!(h.orchestrator.process_one_time_payment("ORDER-1").await);

    assert!(!outcome.success);
    assert_eq!(outcome.message, ACTIVATION_FAILED);
    assert_none!(outcome.activated_package_id);

    // Retrying the order repeats the failure instead of reporting success.
    let replay = assert_ok!(h.orchestrator.process_one_time_payment("ORDER-1").await);
    assert!(!replay.success);
    assert_eq!(replay.message, ACTIVATION_FAILED);
    assert_none!(replay.activated_package_id);
    assert_eq!(h.store.packages()[0].status, PackageStatus::Pending);
}

#[tokio::test]
async fn follow_up_failures_are_joined_into_one_warning() {
    let h = harness(false).await;
    Mock::given(method("POST"))
        .and(path("/tracks"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "down" })))
        .mount(&h.shippo)
        .await;
    let (user_id, package_id, subscription_id) = seed_checkout(&h.store);
    mock_capture(
        &h.paypal,
        capture_body("COMPLETED", Some(metadata(user_id, package_id, subscription_id))),
    )
    .await;

    let outcome = assert_ok!(h.orchestrator.process_one_time_payment("ORDER-1").await);

    assert!(outcome.success);
    assert_eq!(
        outcome.warning.as_deref(),
        Some("Notification failed: mailbox unavailable Failed to set up tracking updates.")
    );
    // The failed attempt is still logged.
    assert_eq!(h.store.notifications().len(), 1);
}

#[tokio::test]
async fn webhook_failure_alone_becomes_the_warning() {
    let h = harness(true).await;
    Mock::given(method("POST"))
        .and(path("/tracks"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.shippo)
        .await;
    let (user_id, package_id, subscription_id) = seed_checkout(&h.store);
    mock_capture(
        &h.paypal,
        capture_body("COMPLETED", Some(metadata(user_id, package_id, subscription_id))),
    )
    .await;

    let outcome = assert_ok!(h.orchestrator.process_one_time_payment("ORDER-1").await);

    assert_eq!(outcome.warning.as_deref(), Some(WEBHOOK_WARNING));
}

#[tokio::test]
async fn subscription_activation_requires_all_ids() {
    let h = harness(true).await;

    let result = h
        .orchestrator
        .process_subscription_activation(ActivateSubscriptionRequest {
            subscription_id: Some(1),
            paypal_subscription_id: Some("  ".to_string()),
            user_id: Some(1),
            ..Default::default()
        })
        .await;

    assert_matches!(result, Err(AppError::BadRequest(message)) if message == MISSING_ACTIVATION_FIELDS);
}

#[tokio::test]
async fn subscription_of_another_user_is_forbidden() {
    let h = harness(true).await;
    let owner = h.store.seed_user(Some("owner@example.com"), None, Channel::Email);
    let other = h.store.seed_user(Some("other@example.com"), None, Channel::Email);
    let subscription =
        h.store
            .seed_subscription(owner.id, Tier::Monthly, SubscriptionStatus::Pending, price("3.49"));

    let result = h
        .orchestrator
        .process_subscription_activation(ActivateSubscriptionRequest {
            subscription_id: Some(subscription.id),
            paypal_subscription_id: Some("I-1".to_string()),
            user_id: Some(other.id),
            ..Default::default()
        })
        .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
    assert_eq!(h.store.subscriptions()[0].status, SubscriptionStatus::Pending);
}

#[tokio::test]
async fn approved_subscription_activates_and_replaces_the_previous_one() {
    let h = harness(true).await;
    accept_webhooks(&h.shippo).await;
    let user = h.store.seed_user(Some("buyer@example.com"), None, Channel::Email);
    let previous =
        h.store
            .seed_subscription(user.id, Tier::Monthly, SubscriptionStatus::Active, price("3.49"));
    let package = h.store.seed_package(
        user.id,
        "9400111899223197428490",
        "usps",
        PackageStatus::Pending,
        None,
    );
    let pending =
        h.store
            .seed_subscription(user.id, Tier::Yearly, SubscriptionStatus::Pending, price("34.90"));
    let req = ActivateSubscriptionRequest {
        subscription_id: Some(pending.id),
        paypal_subscription_id: Some("I-YEARLY".to_string()),
        tracking_number: Some("9400111899223197428490".to_string()),
        user_id: Some(user.id),
        ..Default::default()
    };

    let outcome = assert_ok!(
        h.orchestrator
            .process_subscription_activation(req.clone())
            .await
    );

    assert!(outcome.success);
    assert_eq!(outcome.message, "Subscription and package activated successfully");
    assert_eq!(outcome.activated_package_id, Some(package.id));
    assert_eq!(outcome.subscription.status, SubscriptionStatus::Active);
    assert_eq!(
        outcome.subscription.paypal_subscription_id.as_deref(),
        Some("I-YEARLY")
    );
    let subscriptions = h.store.subscriptions();
    let active: Vec<_> = subscriptions
        .iter()
        .filter(|subscription| subscription.status == SubscriptionStatus::Active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, pending.id);
    assert!(
        subscriptions
            .iter()
            .any(|subscription| subscription.id == previous.id
                && subscription.status == SubscriptionStatus::Inactive)
    );
    let payment = &h.store.payments()[0];
    assert_eq!(payment.amount, price("34.90"));
    assert_eq!(payment.status, "COMPLETED");

    let replay = assert_ok!(h.orchestrator.process_subscription_activation(req).await);
    assert_eq!(replay.message, "Subscription already in ACTIVE state.");
    assert_none!(replay.activated_package_id);
}

#[tokio::test]
async fn activation_without_a_package_still_activates_the_subscription() {
    let h = harness(true).await;
    let user = h.store.seed_user(Some("buyer@example.com"), None, Channel::Email);
    let pending =
        h.store
            .seed_subscription(user.id, Tier::Monthly, SubscriptionStatus::Pending, price("3.49"));

    let outcome = assert_ok!(
        h.orchestrator
            .process_subscription_activation(ActivateSubscriptionRequest {
                subscription_id: Some(pending.id),
                paypal_subscription_id: Some("I-1".to_string()),
                user_id: Some(user.id),
                ..Default::default()
            })
            .await
    );

    assert_eq!(outcome.message, "Subscription activated successfully (no package linked)");
    assert_none!(outcome.activated_package_id);
}

#[tokio::test]
async fn credit_activation_respects_the_package_limit() {
    let h = harness(true).await;
    accept_webhooks(&h.shippo).await;
    let user = h.store.seed_user(Some("buyer@example.com"), None, Channel::Email);
    let subscription =
        h.store
            .seed_subscription(user.id, Tier::Monthly, SubscriptionStatus::Active, price("3.49"));
    h.store.set_package_limit(subscription.id, 1);
    let first = h
        .store
        .seed_package(user.id, "TRACK-1", "usps", PackageStatus::Pending, None);
    let second = h
        .store
        .seed_package(user.id, "TRACK-2", "usps", PackageStatus::Pending, None);

    let outcome = assert_ok!(h.orchestrator.activate_with_credit(user.id, first.id).await);
    assert!(outcome.success);
    assert_eq!(outcome.db_subscription_id, Some(subscription.id));

    let result = h.orchestrator.activate_with_credit(user.id, second.id).await;
    assert_matches!(result, Err(AppError::Conflict(_)));

    let again = assert_ok!(h.orchestrator.activate_with_credit(user.id, first.id).await);
    assert_eq!(again.message, "Package is already active.");
}

#[tokio::test]
async fn credit_activation_of_someone_elses_package_is_forbidden() {
    let h = harness(true).await;
    let owner = h.store.seed_user(Some("owner@example.com"), None, Channel::Email);
    let other = h.store.seed_user(Some("other@example.com"), None, Channel::Email);
    h.store
        .seed_subscription(other.id, Tier::Monthly, SubscriptionStatus::Active, price("3.49"));
    let package = h
        .store
        .seed_package(owner.id, "TRACK-1", "usps", PackageStatus::Pending, None);

    let result = h.orchestrator.activate_with_credit(other.id, package.id).await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn cancelling_cancels_at_paypal_first() {
    let h = harness(true).await;
    Mock::given(method("POST"))
        .and(path("/v1/billing/subscriptions/I-LIVE/cancel"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&h.paypal)
        .await;
    let user = h.store.seed_user(Some("buyer@example.com"), None, Channel::Email);
    let pending =
        h.store
            .seed_subscription(user.id, Tier::Monthly, SubscriptionStatus::Pending, price("3.49"));
    assert_ok!(
        h.store
            .activate_subscription(pending.id, Some("I-LIVE"), user.id)
            .await
    );

    let cancelled = assert_ok!(h.orchestrator.cancel_user_subscription(user.id).await);

    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert_none!(assert_ok!(h.store.get_user_active_subscription(user.id).await));
}

#[tokio::test]
async fn failed_paypal_cancellation_keeps_the_subscription_active() {
    let h = harness(true).await;
    Mock::given(method("POST"))
        .and(path("/v1/billing/subscriptions/I-LIVE/cancel"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "name": "SUBSCRIPTION_STATUS_INVALID" })),
        )
        .mount(&h.paypal)
        .await;
    let user = h.store.seed_user(Some("buyer@example.com"), None, Channel::Email);
    let pending =
        h.store
            .seed_subscription(user.id, Tier::Monthly, SubscriptionStatus::Pending, price("3.49"));
    assert_ok!(
        h.store
            .activate_subscription(pending.id, Some("I-LIVE"), user.id)
            .await
    );

    let result = h.orchestrator.cancel_user_subscription(user.id).await;

    assert_matches!(result, Err(AppError::Upstream(message)) if message.starts_with("PayPal API Error: 422"));
    assert_some!(assert_ok!(h.store.get_user_active_subscription(user.id).await));
}
