use actix_web::web::*;

use crate::handlers::auth;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/auth")
            .service(resource("/sign-up").route(post().to(auth::sign_up)))
            .service(resource("/verify/{token}").route(get().to(auth::verify_user)))
            .service(
                resource("/resend-verification").route(post().to(auth::resend_verification)),
            )
            .service(resource("/login").route(post().to(auth::login)))
            .service(resource("/logout").route(post().to(auth::logout)))
            .service(resource("/token/refresh").route(post().to(auth::refresh_tokens)))
            .service(resource("/password-reset").route(post().to(auth::request_password_reset)))
            .service(
                resource("/password-reset/{token}")
                    .route(post().to(auth::confirm_password_reset)),
            ),
    );
}
