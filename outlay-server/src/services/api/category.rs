use actix_web::web::*;

use crate::handlers::category;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/categories")
            .service(
                resource("")
                    .route(get().to(category::list_categories))
                    .route(post().to(category::create_category)),
            )
            .service(
                resource("/{category_id}")
                    .route(get().to(category::get_category))
                    .route(patch().to(category::edit_category))
                    .route(delete().to(category::delete_category)),
            ),
    );
}
