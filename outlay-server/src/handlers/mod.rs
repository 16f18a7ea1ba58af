pub mod auth;
pub mod category;
pub mod report;
pub mod transaction;
pub mod user;

use outlay_common::cache::TokenCache;
use outlay_common::db::{self, DbAsyncPool};
use outlay_common::models::user::User;

use self::error::HttpErrorResponse;

/// Resolves the actor behind a verified access token. The signature must
/// have a live ledger row; a missing row means the token was revoked, no
/// matter how valid its signature is.
pub async fn resolve_actor(
    db_async_pool: &DbAsyncPool,
    token_signature: &[u8],
) -> Result<User, HttpErrorResponse> {
    let auth_dao = db::auth::Dao::new(db_async_pool);

    let user = auth_dao
        .get_user_by_access_token_signature(token_signature)
        .await?;

    match user {
        Some(user) if !user.is_deleted => Ok(user),
        _ => Err(HttpErrorResponse::BadToken(String::from(
            "Token has been revoked",
        ))),
    }
}

const DEFAULT_PER_PAGE: u32 = 10;
const MAX_PER_PAGE: u32 = 100;

/// Pagination inputs are clamped rather than rejected.
pub fn clamp_page_params(page: Option<u32>, per_page: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);

    (page, per_page)
}

/// Fails with a RateLimited validation error while the cooldown key lives.
pub async fn check_cooldown(
    token_cache: &TokenCache,
    cooldown_key: &str,
    action: &str,
) -> Result<(), HttpErrorResponse> {
    if let Some(minutes) = token_cache.minutes_until_allowed(cooldown_key).await? {
        return Err(HttpErrorResponse::RateLimited(format!(
            "Please wait {minutes} minutes before requesting another {action}"
        )));
    }

    Ok(())
}

/// Argon2id is CPU-bound; never run it on the async executor.
pub async fn hash_password_blocking(password: String) -> Result<String, HttpErrorResponse> {
    use outlay_common::password::{self, HashParams};

    let hash_result = tokio::task::spawn_blocking(move || {
        password::hash_password(
            &password,
            &HashParams {
                salt_length: crate::env::CONF.hash_salt_length,
                hash_length: crate::env::CONF.hash_length,
                iterations: crate::env::CONF.hash_iterations,
                mem_cost_kib: crate::env::CONF.hash_mem_cost_kib,
                threads: crate::env::CONF.hash_threads,
            },
            &crate::env::CONF.hashing_key,
        )
    })
    .await
    .map_err(|_| HttpErrorResponse::InternalError(String::from("Failed to hash password")))?;

    hash_result.map_err(|e| {
        log::error!("{e}");
        HttpErrorResponse::InternalError(String::from("Failed to hash password"))
    })
}

pub async fn verify_password_blocking(
    password: String,
    password_hash: String,
) -> Result<bool, HttpErrorResponse> {
    use outlay_common::password;

    let verify_result = tokio::task::spawn_blocking(move || {
        password::verify_password(&password, &password_hash, &crate::env::CONF.hashing_key)
    })
    .await
    .map_err(|_| HttpErrorResponse::InternalError(String::from("Failed to verify password")))?;

    verify_result.map_err(|e| {
        log::error!("{e}");
        HttpErrorResponse::InternalError(String::from("Failed to verify password"))
    })
}

pub mod error {
    use outlay_common::cache::CacheError;
    use outlay_common::db::DaoError;
    use outlay_common::request_io::ErrorResponse;
    use outlay_common::token::TokenError;

    use actix_web::http::{header, StatusCode};
    use actix_web::{HttpResponse, HttpResponseBuilder};
    use std::fmt;

    #[derive(Debug)]
    pub enum HttpErrorResponse {
        // 400
        IncorrectlyFormed(String),
        InvalidState(String),
        ConflictWithExisting(String),
        RateLimited(String),

        // 401
        IncorrectCredential(String),
        BadToken(String),
        TokenExpired(String),
        TokenMissing(String),
        WrongTokenType(String),

        // 403
        UserDisallowed(String),

        // 404
        DoesNotExist(String),

        // 503
        DependencyUnavailable(String),

        // 500
        InternalError(String),
    }

    impl std::error::Error for HttpErrorResponse {}

    impl fmt::Display for HttpErrorResponse {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let response: ErrorResponse = self.into();
            write!(f, "{}", response.error)
        }
    }

    impl From<&HttpErrorResponse> for ErrorResponse {
        fn from(resp: &HttpErrorResponse) -> Self {
            let message = match resp {
                HttpErrorResponse::IncorrectlyFormed(msg)
                | HttpErrorResponse::InvalidState(msg)
                | HttpErrorResponse::ConflictWithExisting(msg)
                | HttpErrorResponse::RateLimited(msg)
                | HttpErrorResponse::IncorrectCredential(msg)
                | HttpErrorResponse::BadToken(msg)
                | HttpErrorResponse::TokenExpired(msg)
                | HttpErrorResponse::TokenMissing(msg)
                | HttpErrorResponse::WrongTokenType(msg)
                | HttpErrorResponse::UserDisallowed(msg)
                | HttpErrorResponse::DoesNotExist(msg) => msg.clone(),

                // Detail for dependency and internal failures is logged
                // server-side only
                HttpErrorResponse::DependencyUnavailable(_) => {
                    String::from("A backing service is temporarily unavailable")
                }
                HttpErrorResponse::InternalError(_) => {
                    String::from("An unexpected error occurred")
                }
            };

            ErrorResponse { error: message }
        }
    }

    impl actix_web::error::ResponseError for HttpErrorResponse {
        fn error_response(&self) -> HttpResponse {
            if let HttpErrorResponse::InternalError(msg) = self {
                log::error!("Internal error: {msg}");
            }

            if let HttpErrorResponse::DependencyUnavailable(msg) = self {
                log::error!("Dependency unavailable: {msg}");
            }

            HttpResponseBuilder::new(self.status_code())
                .insert_header((header::CONTENT_TYPE, "application/json"))
                .json(ErrorResponse::from(self))
        }

        fn status_code(&self) -> StatusCode {
            match *self {
                HttpErrorResponse::IncorrectlyFormed(_)
                | HttpErrorResponse::InvalidState(_)
                | HttpErrorResponse::ConflictWithExisting(_)
                | HttpErrorResponse::RateLimited(_) => StatusCode::BAD_REQUEST,
                HttpErrorResponse::IncorrectCredential(_)
                | HttpErrorResponse::BadToken(_)
                | HttpErrorResponse::TokenExpired(_)
                | HttpErrorResponse::TokenMissing(_)
                | HttpErrorResponse::WrongTokenType(_) => StatusCode::UNAUTHORIZED,
                HttpErrorResponse::UserDisallowed(_) => StatusCode::FORBIDDEN,
                HttpErrorResponse::DoesNotExist(_) => StatusCode::NOT_FOUND,
                HttpErrorResponse::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                HttpErrorResponse::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    impl From<DaoError> for HttpErrorResponse {
        fn from(err: DaoError) -> Self {
            log::error!("{err}");
            HttpErrorResponse::InternalError(err.to_string())
        }
    }

    impl From<CacheError> for HttpErrorResponse {
        fn from(err: CacheError) -> Self {
            HttpErrorResponse::DependencyUnavailable(err.to_string())
        }
    }

    impl From<TokenError> for HttpErrorResponse {
        fn from(err: TokenError) -> Self {
            match err {
                TokenError::TokenInvalid => {
                    HttpErrorResponse::BadToken(String::from("Invalid token"))
                }
                TokenError::TokenExpired => {
                    HttpErrorResponse::TokenExpired(String::from("Token expired"))
                }
                TokenError::TokenMissing => {
                    HttpErrorResponse::TokenMissing(String::from("Missing token"))
                }
                TokenError::WrongTokenType => {
                    HttpErrorResponse::WrongTokenType(String::from("Wrong token type"))
                }
            }
        }
    }
}
