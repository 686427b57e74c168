mod cors;

use std::sync::Arc;

use actix_web::{
    App, HttpServer,
    web::{self},
};
use api_pay::{PayPalClient, PaymentOrchestrator, PlanCatalog, TokenCache};
use common::env_config::Config;
use db::{
    Tables,
    store::{PgStore, Store},
};
use notify::{NotificationDispatcher, PinpointSmsChannel, SesEmailChannel};
use tracking::ShippoClient;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let config_data = config.clone();

    let origin = config.cors_allowed_origin.clone();
    let console_logging = config.console_logging_enabled;

    // init logger
    if console_logging {
        logger::setup(&config.log_file).expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup(&config.database_url, config.environment.is_production())
        .await
        .expect("Failed to set up database");
    let tables = Tables::for_environment(config.environment);
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone(), tables.clone()));

    // providers
    let shippo = Arc::new(ShippoClient::new(&config.shippo, config.environment));
    let aws = notify::load_aws_config(&config.aws).await;
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        Arc::new(SesEmailChannel::new(&aws, config.aws.ses_source_email.clone())),
        Arc::new(PinpointSmsChannel::new(
            &aws,
            config.aws.sms_origination_number.clone(),
        )),
        shippo.clone(),
        config.environment.simulates_notifications(),
        config.site_url.clone(),
    ));
    let paypal = Arc::new(PayPalClient::new(&config.paypal, Arc::new(TokenCache::new())));
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        store.clone(),
        paypal,
        shippo.clone(),
        dispatcher.clone(),
        PlanCatalog::from_config(&config.paypal),
    ));

    log::info!(
        "Starting in {} mode on {}:{} (shippo mock: {})",
        config.environment,
        config.server_host,
        config.server_port,
        shippo.is_mock()
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config_data.clone()))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(shippo.clone()))
            .app_data(web::Data::new(dispatcher.clone()))
            .app_data(web::Data::new(orchestrator.clone()))
            .wrap(logger::middleware(pool.clone(), tables.clone(), console_logging)) // 2nd
            .wrap(cors::middleware(&origin)) // 1st
            .service(
                web::scope("/api")
                    .service(api_pay::mount_payment())
                    .service(api_pay::mount_subscription())
                    .service(api_track::mount_user())
                    .service(api_track::mount_package())
                    .service(api_track::mount_webhook()),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
