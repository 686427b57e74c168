use std::{str::FromStr, sync::Arc};

use actix_web::{App, http::StatusCode, test, web};
use api_pay::{PayPalClient, PaymentOrchestrator, PlanCatalog, TokenCache};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use claim::assert_ok;
use common::{
    env_config::{AwsConfig, Config, PayPalConfig, ShippoConfig},
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
use tracking::ShippoClient;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

struct Unused;

#[async_trait]
impl EmailChannel for Unused {
    async fn send_templated(&self, _: &str, _: &str, _: &Value) -> Result<(), ChannelError> {
        Err(ChannelError::Provider("not wired".to_string()))
    }

    async fn send_text(&self, _: &str, _: &str, _: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Provider("not wired".to_string()))
    }
}

#[async_trait]
impl SmsChannel for Unused {
    async fn send_text(&self, _: &str, _: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Provider("not wired".to_string()))
    }
}

fn config(paypal_url: &str, webhook_token: Option<&str>) -> Config {
    Config {
        environment: Environment::Test,
        database_url: "postgres://localhost/unused".to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 8080,
        num_workers: 1,
        cors_allowed_origin: "http://localhost:3000".to_string(),
        console_logging_enabled: false,
        log_file: "test.log".to_string(),
        site_url: "https://notifytracking.com".to_string(),
        paypal: PayPalConfig {
            api_url: paypal_url.to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            monthly_plan_id: Some("P-MONTHLY".to_string()),
            yearly_plan_id: Some("P-YEARLY".to_string()),
            return_url: "https://example.com/return".to_string(),
            cancel_url: "https://example.com/cancel".to_string(),
        },
        shippo: ShippoConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            // `shippo_test` keys put the client in mock mode.
            api_key: "shippo_test_key".to_string(),
            webhook_token: webhook_token.map(str::to_string),
        },
        aws: AwsConfig {
            region: "us-east-1".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            ses_source_email: "notifications@notifytracking.com".to_string(),
            sms_origination_number: "+15555550100".to_string(),
        },
    }
}

struct Deps {
    config: Arc<Config>,
    store: Arc<MemoryStore>,
    shippo: Arc<ShippoClient>,
    dispatcher: Arc<NotificationDispatcher>,
    orchestrator: Arc<PaymentOrchestrator>,
}

fn deps(paypal_url: &str, webhook_token: Option<&str>) -> Deps {
    let config = Arc::new(config(paypal_url, webhook_token));
    let store = Arc::new(MemoryStore::new());
    let shippo = Arc::new(ShippoClient::new(&config.shippo, config.environment));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone() as Arc<dyn Store>,
        Arc::new(Unused),
        Arc::new(Unused),
        shippo.clone(),
        true,
        config.site_url.clone(),
    ));
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        store.clone() as Arc<dyn Store>,
        Arc::new(PayPalClient::new(&config.paypal, Arc::new(TokenCache::new()))),
        shippo.clone(),
        dispatcher.clone(),
        PlanCatalog::from_config(&config.paypal),
    ));

    Deps {
        config,
        store,
        shippo,
        dispatcher,
        orchestrator,
    }
}

macro_rules! app {
    ($deps:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($deps.config.clone()))
                .app_data(web::Data::new($deps.store.clone() as Arc<dyn Store>))
                .app_data(web::Data::new($deps.shippo.clone()))
                .app_data(web::Data::new($deps.dispatcher.clone()))
                .app_data(web::Data::new($deps.orchestrator.clone()))
                .service(
                    web::scope("/api")
                        .service(api_track::mount_user())
                        .service(api_track::mount_package())
                        .service(api_track::mount_webhook()),
                ),
        )
        .await
    };
}

fn price(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

fn track_updated(tracking_number: &str, status: &str) -> Value {
    json!({
        "event": "track_updated",
        "data": {
            "tracking_number": tracking_number,
            "carrier": "usps",
            "tracking_status": {
                "status": status,
                "status_details": "Out for delivery",
                "status_date": "2025-04-01T10:00:00Z",
                "location": { "city": "Austin", "state": "TX", "zip": "78701", "country": "US" }
            }
        }
    })
}

#[actix_web::test]
async fn prepare_creates_user_and_pending_package_once() {
    let deps = deps("http://127.0.0.1:9", None);
    let app = app!(deps);
    let body = json!({
        "trackingNumber": "9400111899223197428490",
        "carrier": "usps",
        "notificationType": "email",
        "contactInfo": "buyer@example.com"
    });

    let first: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/user/check-status-and-prepare")
            .set_json(&body)
            .to_request(),
    )
    .await;
    let second: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/user/check-status-and-prepare")
            .set_json(&body)
            .to_request(),
    )
    .await;

    assert_eq!(first["userId"], second["userId"]);
    assert_eq!(first["pendingPackageId"], second["pendingPackageId"]);
    assert_eq!(first["packageStatus"], "PENDING");
    assert_eq!(first["hasActiveSubscription"], false);
    assert_eq!(first["hasCredit"], false);
    assert_eq!(deps.store.users().len(), 1);
    assert_eq!(deps.store.packages().len(), 1);
}

#[actix_web::test]
async fn prepare_reports_credit_of_a_recurring_subscription() {
    let deps = deps("http://127.0.0.1:9", None);
    let user = deps
        .store
        .seed_user(Some("buyer@example.com"), None, Channel::Email);
    deps.store
        .seed_subscription(user.id, Tier::Monthly, SubscriptionStatus::Active, price("3.49"));
    let app = app!(deps);

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/user/check-status-and-prepare")
            .set_json(json!({
                "trackingNumber": "TRACK-1",
                "notificationType": "email",
                "contactInfo": "buyer@example.com"
            }))
            .to_request(),
    )
    .await;

    assert_eq!(body["userId"], user.id);
    assert_eq!(body["hasActiveSubscription"], true);
    assert_eq!(body["tierName"], "monthly");
    assert_eq!(body["hasCredit"], true);
}

#[actix_web::test]
async fn number_tracked_by_someone_else_is_a_conflict() {
    let deps = deps("http://127.0.0.1:9", None);
    let owner = deps
        .store
        .seed_user(Some("owner@example.com"), None, Channel::Email);
    deps.store
        .seed_package(owner.id, "TRACK-1", "usps", PackageStatus::Active, None);
    let app = app!(deps);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/user/check-status-and-prepare")
            .set_json(json!({
                "trackingNumber": "TRACK-1",
                "notificationType": "email",
                "contactInfo": "other@example.com"
            }))
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn package_status_includes_the_active_package() {
    let deps = deps("http://127.0.0.1:9", None);
    let owner = deps
        .store
        .seed_user(Some("owner@example.com"), None, Channel::Email);
    let package = deps
        .store
        .seed_package(owner.id, "TRACK-1", "usps", PackageStatus::Active, Some(77));
    let app = app!(deps);

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/package/status?trackingNumber=TRACK-1&carrier=usps")
            .to_request(),
    )
    .await;

    assert!(body["trackingStatus"].is_object());
    assert_eq!(body["activePackageInfo"]["packageId"], package.id);
    assert_eq!(body["activePackageInfo"]["subscriptionId"], 77);
}

#[actix_web::test]
async fn active_subscription_lookup_is_404_without_one() {
    let deps = deps("http://127.0.0.1:9", None);
    let user = deps
        .store
        .seed_user(Some("buyer@example.com"), None, Channel::Email);
    let app = app!(deps);

    let response = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/user/subscription?userId={}", user.id))
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn subscription_status_never_creates_users() {
    let deps = deps("http://127.0.0.1:9", None);
    let app = app!(deps);

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/user/subscription-status")
            .set_json(json!({ "contactInfo": "5555550100", "contactType": "sms" }))
            .to_request(),
    )
    .await;

    assert_eq!(body["userId"], Value::Null);
    assert_eq!(body["currentTier"], Value::Null);
    assert!(deps.store.users().is_empty());
}

#[actix_web::test]
async fn switch_plan_hands_back_the_subscription_to_cancel() {
    let deps = deps("http://127.0.0.1:9", None);
    let user = deps
        .store
        .seed_user(Some("buyer@example.com"), None, Channel::Email);
    let pending =
        deps.store
            .seed_subscription(user.id, Tier::Monthly, SubscriptionStatus::Pending, price("3.49"));
    assert_ok!(
        deps.store
            .activate_subscription(pending.id, Some("I-MONTHLY"), user.id)
            .await
    );
    let app = app!(deps);

    let switch: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/user/switch-plan")
            .set_json(json!({ "userId": user.id, "newTier": "yearly" }))
            .to_request(),
    )
    .await;
    assert_eq!(switch["cancelPreviousPayPalSubId"], "I-MONTHLY");
    assert_eq!(switch["plan"]["paypalPlanId"], "P-YEARLY");
    assert_eq!(switch["plan"]["price"], "34.90");

    let same = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/user/switch-plan")
            .set_json(json!({ "userId": user.id, "newTier": "monthly" }))
            .to_request(),
    )
    .await;
    assert_eq!(same.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn cancel_subscription_goes_through_paypal() {
    let paypal = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "A21-token", "expires_in": 32400 })),
        )
        .mount(&paypal)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/billing/subscriptions/I-MONTHLY/cancel"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&paypal)
        .await;
    let deps = deps(&paypal.uri(), None);
    let user = deps
        .store
        .seed_user(Some("buyer@example.com"), None, Channel::Email);
    let pending =
        deps.store
            .seed_subscription(user.id, Tier::Monthly, SubscriptionStatus::Pending, price("3.49"));
    assert_ok!(
        deps.store
            .activate_subscription(pending.id, Some("I-MONTHLY"), user.id)
            .await
    );
    let app = app!(deps);

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/user/cancel-subscription")
            .set_json(json!({ "userId": user.id }))
            .to_request(),
    )
    .await;

    assert_eq!(body["success"], true);
    assert_eq!(body["subscription"]["status"], "CANCELLED");
}

#[actix_web::test]
async fn activate_existing_uses_subscription_credit() {
    let deps = deps("http://127.0.0.1:9", None);
    let user = deps
        .store
        .seed_user(Some("buyer@example.com"), None, Channel::Email);
    let subscription =
        deps.store
            .seed_subscription(user.id, Tier::Yearly, SubscriptionStatus::Active, price("34.90"));
    let package = deps
        .store
        .seed_package(user.id, "TRACK-1", "usps", PackageStatus::Pending, None);
    let app = app!(deps);

    let body: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/package/activate-existing")
            .set_json(json!({ "userId": user.id, "pendingPackageId": package.id }))
            .to_request(),
    )
    .await;

    assert_eq!(body["success"], true);
    assert_eq!(body["activatedPackageId"], package.id);
    let stored = &deps.store.packages()[0];
    assert_eq!(stored.status, PackageStatus::Active);
    assert_eq!(stored.subscription_id, Some(subscription.id));
}

#[actix_web::test]
async fn webhook_rejects_a_wrong_token() {
    let deps = deps("http://127.0.0.1:9", Some("hook-secret"));
    let app = app!(deps);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/webhook/tracking?token=guess")
            .set_json(track_updated("TRACK-1", "TRANSIT"))
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn webhook_records_each_status_once_and_alerts_the_owner() {
    let deps = deps("http://127.0.0.1:9", Some("hook-secret"));
    let owner = deps
        .store
        .seed_user(Some("owner@example.com"), None, Channel::Email);
    deps.store
        .seed_package(owner.id, "TRACK-1", "usps", PackageStatus::Active, Some(5));
    let app = app!(deps);

    let first: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/webhook/tracking?token=hook-secret")
            .set_json(track_updated("TRACK-1", "TRANSIT"))
            .to_request(),
    )
    .await;
    let repeat: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/webhook/tracking?token=hook-secret")
            .set_json(track_updated("TRACK-1", "TRANSIT"))
            .to_request(),
    )
    .await;

    assert_eq!(first, json!({ "received": true, "recorded": true, "notified": true }));
    assert_eq!(repeat, json!({ "received": true, "recorded": false, "notified": false }));

    let updates: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/package/updates?trackingNumber=TRACK-1")
            .to_request(),
    )
    .await;
    assert_eq!(updates["updates"].as_array().map(Vec::len), Some(1));
    assert_eq!(updates["updates"][0]["status"], "TRANSIT");
}

#[actix_web::test]
async fn webhook_without_tracking_status_is_a_bad_request() {
    let deps = deps("http://127.0.0.1:9", None);
    let app = app!(deps);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/webhook/tracking")
            .set_json(json!({ "event": "track_updated", "data": { "tracking_number": "TRACK-1" } }))
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
