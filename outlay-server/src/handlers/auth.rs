use outlay_common::cache::{keys, CachePool, TokenCache};
use outlay_common::db::{self, DbAsyncPool};
use outlay_common::models::queued_job::JobPayload;
use outlay_common::models::user::User;
use outlay_common::otp::UrlSafeToken;
use outlay_common::request_io::{
    CredentialPair, InputEmail, InputNewPassword, InputUser, MessageResponse, OutputUserProfile,
    RefreshedAccessToken, TokenPair,
};
use outlay_common::token::auth_token::{
    AuthToken, AuthTokenClaims, AuthTokenType, SignedAuthToken,
};
use outlay_common::validators::{self, Validity};

use actix_web::web;
use actix_web::HttpResponse;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::env;
use crate::handlers::error::HttpErrorResponse;
use crate::handlers::{check_cooldown, hash_password_blocking, verify_password_blocking};
use crate::middleware::auth::{Access, Refresh, VerifiedToken};
use crate::middleware::FromBearerHeader;

/// Identical for a wrong password and a missing user so responses cannot be
/// used to enumerate accounts.
const INVALID_CREDENTIALS_MSG: &str = "Invalid username/email or password";

fn expiration_from_now(lifetime: std::time::Duration) -> u64 {
    (SystemTime::now() + lifetime)
        .duration_since(UNIX_EPOCH)
        .expect("System time is before the Unix epoch")
        .as_secs()
}

/// Signs an access token and records it in the revocation ledger before it is
/// handed out.
pub async fn issue_access_token(
    db_async_pool: &DbAsyncPool,
    user_id: Uuid,
    fresh: bool,
) -> Result<SignedAuthToken, HttpErrorResponse> {
    let claims = AuthTokenClaims {
        user_id,
        expiration: expiration_from_now(env::CONF.access_token_lifetime),
        token_type: AuthTokenType::Access,
        fresh,
    };

    let signed = AuthToken::sign_new(claims, &env::CONF.token_signing_key);

    let auth_dao = db::auth::Dao::new(db_async_pool);
    auth_dao
        .save_access_token(&signed.signature, user_id)
        .await?;

    Ok(signed)
}

/// Refresh tokens are deliberately not ledger-tracked; they are validated by
/// signature and expiry alone.
fn issue_refresh_token(user_id: Uuid) -> String {
    let claims = AuthTokenClaims {
        user_id,
        expiration: expiration_from_now(env::CONF.refresh_token_lifetime),
        token_type: AuthTokenType::Refresh,
        fresh: false,
    };

    AuthToken::sign_new(claims, &env::CONF.token_signing_key).token
}

/// Issues a single-use verification link token and queues the email. Shared
/// by signup and the resend endpoint; both are bound by the same cooldown.
pub async fn send_verification_link(
    user: &User,
    db_async_pool: &DbAsyncPool,
    token_cache: &TokenCache,
) -> Result<(), HttpErrorResponse> {
    let cooldown_key = keys::verification_rate_limit(user.id);
    check_cooldown(token_cache, &cooldown_key, "verification link").await?;

    let token = UrlSafeToken::generate(32);

    token_cache
        .put(
            &keys::verification_token(&token),
            &user.id.to_string(),
            env::CONF.verification_token_lifetime,
        )
        .await?;
    token_cache
        .put(&cooldown_key, "1", env::CONF.verification_cooldown)
        .await?;

    let job_dao = db::job_queue::Dao::new(db_async_pool);
    let payload = JobPayload::SendVerificationEmail {
        user_email: user.email.clone(),
        verification_url: format!("{}/{}", env::CONF.user_verification_url, token),
    };

    if let Err(e) = job_dao.enqueue(&payload).await {
        log::error!("Failed to enqueue verification email job: {e}");
    }

    Ok(())
}

pub async fn sign_up(
    db_async_pool: web::Data<DbAsyncPool>,
    cache_pool: web::Data<CachePool>,
    user_data: web::Json<InputUser>,
) -> Result<HttpResponse, HttpErrorResponse> {
    if let Validity::Invalid(msg) = user_data.validate() {
        return Err(HttpErrorResponse::IncorrectlyFormed(msg));
    }

    let user_dao = db::user::Dao::new(&db_async_pool);

    if user_dao.username_in_use(&user_data.username).await? {
        return Err(HttpErrorResponse::ConflictWithExisting(String::from(
            "Username already exists",
        )));
    }

    if user_dao.email_in_use(&user_data.email).await? {
        return Err(HttpErrorResponse::ConflictWithExisting(String::from(
            "Email already exists",
        )));
    }

    let password_hash = hash_password_blocking(user_data.password.clone()).await?;

    let user = match user_dao
        .create_user(
            &user_data.username,
            &user_data.email,
            &password_hash,
            &user_data.name,
            false,
        )
        .await
    {
        Ok(u) => u,
        // Lost a race with a concurrent signup using the same identifiers
        Err(e) if e.is_unique_violation() => {
            return Err(HttpErrorResponse::ConflictWithExisting(String::from(
                "Username or email already exists",
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let token_cache = TokenCache::new(&cache_pool);
    send_verification_link(&user, &db_async_pool, &token_cache).await?;

    log::info!("User {} registered (unverified)", user.id);

    Ok(HttpResponse::Created().json(OutputUserProfile::from(&user)))
}

pub async fn verify_user(
    db_async_pool: web::Data<DbAsyncPool>,
    cache_pool: web::Data<CachePool>,
    token: web::Path<String>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let token_cache = TokenCache::new(&cache_pool);

    // take() is the single-use serialization point; of two concurrent
    // requests with the same token, only one sees the value
    let stored_user_id = token_cache
        .take(&keys::verification_token(&token))
        .await?
        .ok_or_else(|| {
            HttpErrorResponse::InvalidState(String::from(
                "Invalid or expired verification token",
            ))
        })?;

    let user_id = Uuid::from_str(&stored_user_id).map_err(|_| {
        HttpErrorResponse::InvalidState(String::from("Invalid or expired verification token"))
    })?;

    let user_dao = db::user::Dao::new(&db_async_pool);
    let user = user_dao
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| HttpErrorResponse::DoesNotExist(String::from("User not found")))?;

    if user.is_verified {
        return Ok(
            HttpResponse::Ok().json(MessageResponse::from("Email already verified"))
        );
    }

    user_dao.set_user_verified(user.id).await?;

    log::info!("User {} verified", user.id);

    Ok(HttpResponse::Ok().json(MessageResponse::from("Email verified successfully")))
}

pub async fn resend_verification(
    db_async_pool: web::Data<DbAsyncPool>,
    cache_pool: web::Data<CachePool>,
    email: web::Json<InputEmail>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let user_dao = db::user::Dao::new(&db_async_pool);

    let user = user_dao
        .get_non_deleted_user_by_email(&email.email)
        .await?
        .ok_or_else(|| HttpErrorResponse::InvalidState(String::from("Email not registered")))?;

    if user.is_verified {
        return Err(HttpErrorResponse::InvalidState(String::from(
            "User is already verified",
        )));
    }

    let token_cache = TokenCache::new(&cache_pool);
    send_verification_link(&user, &db_async_pool, &token_cache).await?;

    Ok(HttpResponse::Ok().json(MessageResponse::from(
        "Verification link resent successfully. Please check your email.",
    )))
}

pub async fn login(
    db_async_pool: web::Data<DbAsyncPool>,
    credentials: web::Json<CredentialPair>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let user_dao = db::user::Dao::new(&db_async_pool);

    let user = if validators::is_email_address(&credentials.username_or_email) {
        user_dao
            .get_non_deleted_user_by_email(&credentials.username_or_email)
            .await?
    } else {
        user_dao
            .get_non_deleted_user_by_username(&credentials.username_or_email)
            .await?
    };

    let Some(user) = user else {
        return Err(HttpErrorResponse::IncorrectCredential(String::from(
            INVALID_CREDENTIALS_MSG,
        )));
    };

    if !user.is_verified {
        return Err(HttpErrorResponse::InvalidState(String::from(
            "Please verify your email before logging in",
        )));
    }

    let password_matches =
        verify_password_blocking(credentials.password.clone(), user.password_hash.clone())
            .await?;

    if !password_matches {
        return Err(HttpErrorResponse::IncorrectCredential(String::from(
            INVALID_CREDENTIALS_MSG,
        )));
    }

    let access_token = issue_access_token(&db_async_pool, user.id, true).await?;
    let refresh_token = issue_refresh_token(user.id);

    log::info!("User {} logged in", user.id);

    Ok(HttpResponse::Ok().json(TokenPair {
        access_token: access_token.token,
        refresh_token,
    }))
}

pub async fn refresh_tokens(
    db_async_pool: web::Data<DbAsyncPool>,
    refresh_token: VerifiedToken<Refresh, FromBearerHeader>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let user_dao = db::user::Dao::new(&db_async_pool);

    let user = user_dao
        .get_user_by_id(refresh_token.claims.user_id)
        .await?;

    match user {
        Some(user) if !user.is_deleted => {
            let access_token = issue_access_token(&db_async_pool, user.id, false).await?;

            Ok(HttpResponse::Ok().json(RefreshedAccessToken {
                access_token: access_token.token,
                token_type: String::from("Bearer"),
            }))
        }
        _ => Err(HttpErrorResponse::DoesNotExist(String::from(
            "User not found",
        ))),
    }
}

pub async fn logout(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let auth_dao = db::auth::Dao::new(&db_async_pool);

    // Idempotent; deleting an already-revoked token is a no-op
    auth_dao
        .delete_access_token(&access_token.signature)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse::from("Successfully logged out")))
}

pub async fn request_password_reset(
    db_async_pool: web::Data<DbAsyncPool>,
    cache_pool: web::Data<CachePool>,
    email: web::Json<InputEmail>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let user_dao = db::user::Dao::new(&db_async_pool);

    let user = user_dao
        .get_non_deleted_user_by_email(&email.email)
        .await?
        .ok_or_else(|| HttpErrorResponse::InvalidState(String::from("Email not registered")))?;

    if !user.is_verified {
        return Err(HttpErrorResponse::InvalidState(String::from(
            "Please verify your email before requesting a password reset",
        )));
    }

    let token_cache = TokenCache::new(&cache_pool);

    let cooldown_key = keys::password_reset_rate_limit(user.id);
    check_cooldown(&token_cache, &cooldown_key, "reset link").await?;

    let token = UrlSafeToken::generate(32);

    token_cache
        .put(
            &keys::password_reset(&token),
            &user.id.to_string(),
            env::CONF.password_reset_token_lifetime,
        )
        .await?;
    token_cache
        .put(&cooldown_key, "1", env::CONF.password_reset_cooldown)
        .await?;

    let job_dao = db::job_queue::Dao::new(&db_async_pool);
    let payload = JobPayload::SendPasswordResetEmail {
        user_email: user.email.clone(),
        reset_url: format!("{}/{}", env::CONF.password_reset_url, token),
    };

    if let Err(e) = job_dao.enqueue(&payload).await {
        log::error!("Failed to enqueue password reset email job: {e}");
    }

    Ok(HttpResponse::Ok().json(MessageResponse::from(
        "Check your inbox, you will receive a password reset link shortly.",
    )))
}

pub async fn confirm_password_reset(
    db_async_pool: web::Data<DbAsyncPool>,
    cache_pool: web::Data<CachePool>,
    token: web::Path<String>,
    new_password: web::Json<InputNewPassword>,
) -> Result<HttpResponse, HttpErrorResponse> {
    if new_password.password != new_password.confirm_password {
        return Err(HttpErrorResponse::IncorrectlyFormed(String::from(
            "Passwords must match",
        )));
    }

    if let Validity::Invalid(msg) = validators::validate_password_strength(&new_password.password)
    {
        return Err(HttpErrorResponse::IncorrectlyFormed(msg));
    }

    let token_cache = TokenCache::new(&cache_pool);

    let stored_user_id = token_cache
        .take(&keys::password_reset(&token))
        .await?
        .ok_or_else(|| {
            HttpErrorResponse::InvalidState(String::from("Invalid or expired reset token"))
        })?;

    let user_id = Uuid::from_str(&stored_user_id).map_err(|_| {
        HttpErrorResponse::InvalidState(String::from("Invalid or expired reset token"))
    })?;

    let user_dao = db::user::Dao::new(&db_async_pool);
    let user = user_dao
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| HttpErrorResponse::DoesNotExist(String::from("User not found")))?;

    let password_hash = hash_password_blocking(new_password.password.clone()).await?;
    user_dao.update_password_hash(user.id, &password_hash).await?;

    // Total logout; every outstanding access token is revoked before the
    // response goes out
    let auth_dao = db::auth::Dao::new(&db_async_pool);
    auth_dao.delete_all_access_tokens_for_user(user.id).await?;

    log::info!("Password reset completed for user {}", user.id);

    Ok(HttpResponse::Ok().json(MessageResponse::from(
        "Password has been reset successfully",
    )))
}
