use actix_web::web::*;

use crate::handlers::user;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/users")
            .service(resource("").route(get().to(user::list_users)))
            // Registered ahead of the `{user_id}` routes so "email" is never
            // taken for a user id
            .service(
                resource("/email/verify/{token}")
                    .route(get().to(user::verify_email_change_token)),
            )
            .service(
                resource("/{user_id}")
                    .route(get().to(user::get_user))
                    .route(patch().to(user::edit_user))
                    .route(delete().to(user::delete_user)),
            )
            .service(resource("/{user_id}/password").route(post().to(user::update_password)))
            .service(resource("/{user_id}/email").route(post().to(user::request_email_change)))
            .service(
                resource("/{user_id}/email/confirm")
                    .route(post().to(user::confirm_email_change)),
            ),
    );
}
