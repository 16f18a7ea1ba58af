use actix_web::web::*;

use crate::handlers::transaction;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/transactions")
            .service(
                resource("")
                    .route(get().to(transaction::list_transactions))
                    .route(post().to(transaction::create_transaction)),
            )
            .service(
                resource("/{transaction_id}")
                    .route(get().to(transaction::get_transaction))
                    .route(patch().to(transaction::edit_transaction))
                    .route(delete().to(transaction::delete_transaction)),
            ),
    );
}
