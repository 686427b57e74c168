use actix_web::web::{self};

pub mod routes {
    pub mod package;
    pub mod user;
    pub mod webhook;
}

mod services {
    pub(crate) mod package;
    pub(crate) mod user;
    pub(crate) mod webhook;
}

pub mod dtos {
    pub mod package;
    pub mod user;
    pub mod webhook;
}

pub fn mount_user() -> actix_web::Scope {
    web::scope("/user")
        .service(routes::user::post_check_status_and_prepare)
        .service(routes::user::get_subscription)
        .service(routes::user::post_subscription_status)
        .service(routes::user::post_switch_plan)
        .service(routes::user::post_cancel_subscription)
}

pub fn mount_package() -> actix_web::Scope {
    web::scope("/package")
        .service(routes::package::get_status)
        .service(routes::package::post_activate_existing)
        .service(routes::package::get_updates)
}

pub fn mount_webhook() -> actix_web::Scope {
    web::scope("/webhook").service(routes::webhook::post_tracking)
}
