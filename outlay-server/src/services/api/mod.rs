use actix_web::web::*;

mod auth;
mod category;
mod report;
mod transaction;
mod user;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/api")
            .configure(auth::configure)
            .configure(category::configure)
            .configure(report::configure)
            .configure(transaction::configure)
            .configure(user::configure),
    );
}
