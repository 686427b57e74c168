use std::{env, sync::Arc};

use crate::misc::Environment;

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// Holds the database connection details, server host and port, worker
/// count, CORS settings, logging preferences and the credentials of the
/// three external providers (PayPal, Shippo and AWS).
pub struct Config {
    /// development, test or production
    pub environment: Environment,
    /// The URL of the database to connect to.
    pub database_url: String,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The allowed origin for CORS (Cross-Origin Resource Sharing).
    pub cors_allowed_origin: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// File the logger mirrors stdout into.
    pub log_file: String,
    /// Public site URL, used in SMS bodies.
    pub site_url: String,
    pub paypal: PayPalConfig,
    pub shippo: ShippoConfig,
    pub aws: AwsConfig,
}

#[derive(Clone, Debug)]
/// Credentials and plan ids for the PayPal REST API.
pub struct PayPalConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub monthly_plan_id: Option<String>,
    pub yearly_plan_id: Option<String>,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Clone, Debug)]
pub struct ShippoConfig {
    pub api_url: String,
    /// Empty when not configured; lookups then fail at call time.
    pub api_key: String,
    /// Shared secret expected as `?token=` on incoming tracking webhooks.
    pub webhook_token: Option<String>,
}

#[derive(Clone, Debug)]
/// AWS settings for SES email and Pinpoint SMS.
pub struct AwsConfig {
    pub region: String,
    /// When both keys are empty the default AWS credential chain is used.
    pub access_key_id: String,
    pub secret_access_key: String,
    pub ses_source_email: String,
    pub sms_origination_number: String,
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `ENVIRONMENT`: development, test or production
    /// - `DATABASE_URL`: Connection string for the database
    ///
    /// Optional (with defaults):
    /// - `IP`: Server host (default: "127.0.0.1")
    /// - `PORT`: Server port (default: 8080)
    /// - `WORKERS`: Number of worker threads (default: 4)
    /// - `CORS_ALLOWED_ORIGIN`: Allowed CORS origin (default: "http://localhost:3000")
    /// - `ENABLE_CONSOLE_LOGGING`: Whether to enable console logging (default: true)
    /// - `PAYPAL_*`, `SHIPPO_*`, `REGION`, `ACCESS_KEY_ID`, `SECRET_ACCESS_KEY`,
    ///   `SES_SOURCE_EMAIL`, `SMS_ORIGINATION_NUMBER` (see implementation for defaults)
    ///
    /// # Panics
    ///
    /// This function will panic if required environment variables are missing or if
    /// `ENVIRONMENT` is not a known environment name.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .expect("ENVIRONMENT must be set")
            .parse::<Environment>()
            .expect("ENVIRONMENT must be development, test or production");

        Arc::new(Config {
            environment,
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            num_workers: env::var("WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "notifytracking.log".to_string()),
            site_url: env::var("SITE_URL")
                .unwrap_or_else(|_| "https://notifytracking.com".to_string()),
            paypal: PayPalConfig {
                api_url: env::var("PAYPAL_API_URL")
                    .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string()),
                client_id: env::var("PAYPAL_CLIENT_ID").unwrap_or_default(),
                client_secret: env::var("PAYPAL_CLIENT_SECRET").unwrap_or_default(),
                monthly_plan_id: optional_var("PAYPAL_MONTHLY_PLAN_ID"),
                yearly_plan_id: optional_var("PAYPAL_YEARLY_PLAN_ID"),
                return_url: env::var("PAYPAL_RETURN_URL")
                    .unwrap_or_else(|_| "https://example.com/return".to_string()),
                cancel_url: env::var("PAYPAL_CANCEL_URL")
                    .unwrap_or_else(|_| "https://example.com/cancel".to_string()),
            },
            shippo: ShippoConfig {
                api_url: env::var("SHIPPO_API_URL")
                    .unwrap_or_else(|_| "https://api.goshippo.com".to_string()),
                api_key: env::var("SHIPPO_API_KEY").unwrap_or_default(),
                webhook_token: optional_var("SHIPPO_WEBHOOK_TOKEN"),
            },
            aws: AwsConfig {
                region: env::var("REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key_id: env::var("ACCESS_KEY_ID").unwrap_or_default(),
                secret_access_key: env::var("SECRET_ACCESS_KEY").unwrap_or_default(),
                ses_source_email: env::var("SES_SOURCE_EMAIL")
                    .unwrap_or_else(|_| "notifications@notifytracking.com".to_string()),
                sms_origination_number: env::var("SMS_ORIGINATION_NUMBER")
                    .unwrap_or_else(|_| "+16018439964".to_string()),
            },
        })
    }
}
