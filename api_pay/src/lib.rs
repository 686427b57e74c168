use actix_web::web::{self};

pub mod routes {
    pub mod pay;
    pub mod sub;
}

pub mod services {
    pub mod orchestrator;
    pub mod paypal;
    pub mod token;
}

pub mod dtos {
    pub mod pay;
    pub mod sub;
}

pub mod misc {
    pub mod correlation;
    pub mod plan;
}

pub use misc::plan::{Plan, PlanCatalog};
pub use services::{
    orchestrator::PaymentOrchestrator,
    paypal::PayPalClient,
    token::{AccessToken, TokenCache},
};

pub fn mount_payment() -> actix_web::Scope {
    web::scope("/payment")
        .service(routes::pay::post_create_reference)
        .service(routes::pay::post_capture_reference)
}

pub fn mount_subscription() -> actix_web::Scope {
    web::scope("/subscription")
        .service(routes::sub::post_activate)
        .service(routes::sub::post_cancel)
}
