use actix_web::web::*;

use crate::handlers::report;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/reports")
            .service(resource("/transactions").route(get().to(report::transaction_report))),
    );
}
