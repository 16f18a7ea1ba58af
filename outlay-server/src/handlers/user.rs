use outlay_common::cache::{keys, CachePool, TokenCache};
use outlay_common::db::{self, DbAsyncPool};
use outlay_common::models::queued_job::JobPayload;
use outlay_common::otp::{Otp, UrlSafeToken};
use outlay_common::permissions::{self, Actor, ObjectView, Operation, Resource};
use outlay_common::request_io::{
    CurrentAndNewPasswordPair, InputEditUser, InputEmailChangeOtps, InputNewEmail, InputPage,
    InputUserDeletion, MessageResponse, OutputPage, OutputUserProfile,
};
use outlay_common::validators::{self, Validity};

use actix_web::web;
use actix_web::HttpResponse;
use std::str::FromStr;
use uuid::Uuid;

use crate::env;
use crate::handlers::error::HttpErrorResponse;
use crate::handlers::{
    check_cooldown, clamp_page_params, hash_password_blocking, resolve_actor,
    verify_password_blocking,
};
use crate::middleware::auth::{Access, VerifiedToken};
use crate::middleware::FromBearerHeader;

const USER_NOT_FOUND_MSG: &str = "User not found";

fn parse_user_id(user_id: &str) -> Result<Uuid, HttpErrorResponse> {
    Uuid::from_str(user_id)
        .map_err(|_| HttpErrorResponse::IncorrectlyFormed(String::from("Invalid user_id format")))
}

/// Object-level denials come back as 404, indistinguishable from a missing
/// row, so inaccessible profiles cannot be probed for existence.
async fn get_target_user(
    db_async_pool: &DbAsyncPool,
    actor: &Actor,
    user_id: &str,
    operation: Operation,
) -> Result<outlay_common::models::user::User, HttpErrorResponse> {
    let target_id = parse_user_id(user_id)?;

    let user_dao = db::user::Dao::new(db_async_pool);
    let target = user_dao
        .get_user_by_id(target_id)
        .await?
        .ok_or_else(|| HttpErrorResponse::DoesNotExist(String::from(USER_NOT_FOUND_MSG)))?;

    if !permissions::is_allowed(
        Resource::UserProfile,
        actor,
        &ObjectView::from(&target),
        operation,
    ) {
        return Err(HttpErrorResponse::DoesNotExist(String::from(
            USER_NOT_FOUND_MSG,
        )));
    }

    Ok(target)
}

pub async fn list_users(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    page_params: web::Query<InputPage>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    if !actor.is_staff {
        return Err(HttpErrorResponse::UserDisallowed(String::from(
            "Only staff users may list users",
        )));
    }

    let (page, per_page) = clamp_page_params(page_params.page, page_params.per_page);

    let user_dao = db::user::Dao::new(&db_async_pool);
    let (users, total) = user_dao.list_non_deleted_users(page, per_page).await?;

    let profiles = users
        .iter()
        .map(OutputUserProfile::from)
        .collect::<Vec<_>>();

    Ok(HttpResponse::Ok().json(OutputPage::new(profiles, total, page, per_page)))
}

pub async fn get_user(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    user_id: web::Path<String>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let target = get_target_user(
        &db_async_pool,
        &Actor::from(&actor),
        &user_id,
        Operation::Read,
    )
    .await?;

    Ok(HttpResponse::Ok().json(OutputUserProfile::from(&target)))
}

pub async fn edit_user(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    user_id: web::Path<String>,
    edits: web::Json<InputEditUser>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let target = get_target_user(
        &db_async_pool,
        &Actor::from(&actor),
        &user_id,
        Operation::Write,
    )
    .await?;

    if let Some(username) = edits.username.as_deref() {
        if let Validity::Invalid(msg) = validators::validate_username(username) {
            return Err(HttpErrorResponse::IncorrectlyFormed(msg));
        }

        let user_dao = db::user::Dao::new(&db_async_pool);
        if username != target.username
            && user_dao
                .is_username_taken_by_other(username, target.id)
                .await?
        {
            return Err(HttpErrorResponse::ConflictWithExisting(String::from(
                "Username already exists",
            )));
        }
    }

    if let Some(name) = edits.name.as_deref() {
        if name.is_empty() || name.len() > 100 {
            return Err(HttpErrorResponse::IncorrectlyFormed(String::from(
                "Name length should be between 1 to 100",
            )));
        }
    }

    let user_dao = db::user::Dao::new(&db_async_pool);
    let updated = user_dao
        .update_user_profile(target.id, edits.username.as_deref(), edits.name.as_deref())
        .await?;

    log::info!("User {} updated profile of user {}", actor.id, updated.id);

    Ok(HttpResponse::Ok().json(OutputUserProfile::from(&updated)))
}

pub async fn delete_user(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    user_id: web::Path<String>,
    deletion: Option<web::Json<InputUserDeletion>>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let target = get_target_user(
        &db_async_pool,
        &Actor::from(&actor),
        &user_id,
        Operation::Write,
    )
    .await?;

    // Self-deletion requires the current password; staff deleting another
    // user does not, and may omit the body entirely
    if actor.id == target.id {
        let password = deletion
            .as_ref()
            .and_then(|d| d.password.clone())
            .ok_or_else(|| {
                HttpErrorResponse::IncorrectlyFormed(String::from(
                    "Password is required to delete your own account",
                ))
            })?;

        let password_matches =
            verify_password_blocking(password, target.password_hash.clone()).await?;

        if !password_matches {
            return Err(HttpErrorResponse::IncorrectCredential(String::from(
                "Password is incorrect",
            )));
        }
    }

    let user_dao = db::user::Dao::new(&db_async_pool);
    user_dao.soft_delete_user(target.id).await?;

    // Revocation is committed before the response; the cascade job re-runs it
    // idempotently along with the child soft-deletes
    let auth_dao = db::auth::Dao::new(&db_async_pool);
    auth_dao
        .delete_all_access_tokens_for_user(target.id)
        .await?;

    let job_dao = db::job_queue::Dao::new(&db_async_pool);
    let payload = JobPayload::CascadeDeleteUser { user_id: target.id };

    if let Err(e) = job_dao.enqueue(&payload).await {
        log::error!("Failed to enqueue cascade delete job for user {}: {e}", target.id);
    }

    log::info!("User {} deleted by {}", target.id, actor.id);

    Ok(HttpResponse::Ok().json(MessageResponse::from("User deleted successfully")))
}

pub async fn update_password(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    user_id: web::Path<String>,
    passwords: web::Json<CurrentAndNewPasswordPair>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let target_id = parse_user_id(&user_id)?;

    let user_dao = db::user::Dao::new(&db_async_pool);
    let target = user_dao
        .get_user_by_id(target_id)
        .await?
        .ok_or_else(|| HttpErrorResponse::DoesNotExist(String::from(USER_NOT_FOUND_MSG)))?;

    // Staff are excluded here; no one changes another user's password
    if !permissions::is_allowed(
        Resource::PasswordUpdate,
        &Actor::from(&actor),
        &ObjectView::from(&target),
        Operation::Write,
    ) {
        return Err(HttpErrorResponse::DoesNotExist(String::from(
            USER_NOT_FOUND_MSG,
        )));
    }

    if passwords.new_password != passwords.confirm_password {
        return Err(HttpErrorResponse::IncorrectlyFormed(String::from(
            "Passwords must match",
        )));
    }

    if let Validity::Invalid(msg) =
        validators::validate_password_strength(&passwords.new_password)
    {
        return Err(HttpErrorResponse::IncorrectlyFormed(msg));
    }

    let current_matches = verify_password_blocking(
        passwords.current_password.clone(),
        target.password_hash.clone(),
    )
    .await?;

    if !current_matches {
        return Err(HttpErrorResponse::IncorrectCredential(String::from(
            "Current password is incorrect",
        )));
    }

    let password_hash = hash_password_blocking(passwords.new_password.clone()).await?;
    user_dao
        .update_password_hash(target.id, &password_hash)
        .await?;

    // Every other session is logged out; the token used for this request
    // stays valid
    let auth_dao = db::auth::Dao::new(&db_async_pool);
    auth_dao
        .delete_all_access_tokens_except(target.id, &access_token.signature)
        .await?;

    log::info!("Password updated for user {}", target.id);

    Ok(HttpResponse::Ok().json(MessageResponse::from("Password updated successfully")))
}

pub async fn request_email_change(
    db_async_pool: web::Data<DbAsyncPool>,
    cache_pool: web::Data<CachePool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    user_id: web::Path<String>,
    new_email: web::Json<InputNewEmail>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let target_id = parse_user_id(&user_id)?;

    let user_dao = db::user::Dao::new(&db_async_pool);
    let target = user_dao
        .get_user_by_id(target_id)
        .await?
        .ok_or_else(|| HttpErrorResponse::DoesNotExist(String::from(USER_NOT_FOUND_MSG)))?;

    if !permissions::is_allowed(
        Resource::EmailChange,
        &Actor::from(&actor),
        &ObjectView::from(&target),
        Operation::Write,
    ) {
        return Err(HttpErrorResponse::DoesNotExist(String::from(
            USER_NOT_FOUND_MSG,
        )));
    }

    if let Validity::Invalid(msg) = validators::validate_email_address(&new_email.new_email) {
        return Err(HttpErrorResponse::IncorrectlyFormed(msg));
    }

    if target.email == new_email.new_email.to_lowercase() {
        return Err(HttpErrorResponse::IncorrectlyFormed(String::from(
            "New email must be different from your current email",
        )));
    }

    if user_dao.email_in_use(&new_email.new_email).await? {
        return Err(HttpErrorResponse::ConflictWithExisting(String::from(
            "Email already exists",
        )));
    }

    let token_cache = TokenCache::new(&cache_pool);

    if actor.id == target.id {
        // Self-service: two independent OTPs bound together with the pending
        // address; the entry itself is the rate limiter
        let entry_key = keys::email_change(target.id);
        check_cooldown(&token_cache, &entry_key, "email change").await?;

        let current_email_otp = Otp::generate(6);
        let new_email_otp = Otp::generate(6);

        token_cache
            .put(
                &entry_key,
                &format!(
                    "{}:{}:{}",
                    new_email.new_email, current_email_otp, new_email_otp
                ),
                env::CONF.email_change_otp_lifetime,
            )
            .await?;

        let job_dao = db::job_queue::Dao::new(&db_async_pool);
        let payload = JobPayload::SendEmailChangeOtps {
            current_email: target.email.clone(),
            new_email: new_email.new_email.clone(),
            current_email_otp,
            new_email_otp,
        };

        if let Err(e) = job_dao.enqueue(&payload).await {
            log::error!("Failed to enqueue email change OTP job: {e}");
        }

        return Ok(HttpResponse::Ok().json(MessageResponse::from(
            "Enter the OTPs sent to your current and new email addresses",
        )));
    }

    // Staff acting on another user: a link token is emailed to the NEW
    // address; whoever holds the link completes the change
    let cooldown_key = keys::staff_email_change_rate_limit(target.id);
    check_cooldown(&token_cache, &cooldown_key, "email change").await?;

    let token = UrlSafeToken::generate(32);

    token_cache
        .put(
            &keys::staff_email_change(&token),
            &format!("{}:{}", target.id, new_email.new_email),
            env::CONF.staff_email_change_token_lifetime,
        )
        .await?;
    token_cache
        .put(&cooldown_key, "1", env::CONF.staff_email_change_cooldown)
        .await?;

    let job_dao = db::job_queue::Dao::new(&db_async_pool);
    let payload = JobPayload::SendStaffEmailChangeEmail {
        new_email: new_email.new_email.clone(),
        verification_url: format!("{}/{}", env::CONF.staff_email_change_url, token),
        username: target.username.clone(),
    };

    if let Err(e) = job_dao.enqueue(&payload).await {
        log::error!("Failed to enqueue staff email change job: {e}");
    }

    log::info!(
        "Staff {} initiated email change for user {}",
        actor.id,
        target.id
    );

    Ok(HttpResponse::Ok().json(MessageResponse::from(&format!(
        "Verification link sent to {}. The user must click the link to confirm the change.",
        new_email.new_email
    ))))
}

pub async fn confirm_email_change(
    db_async_pool: web::Data<DbAsyncPool>,
    cache_pool: web::Data<CachePool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    user_id: web::Path<String>,
    otps: web::Json<InputEmailChangeOtps>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let target_id = parse_user_id(&user_id)?;

    // Only the account holder can confirm; the OTPs were sent to addresses
    // only they control
    if actor.id != target_id {
        return Err(HttpErrorResponse::DoesNotExist(String::from(
            USER_NOT_FOUND_MSG,
        )));
    }

    let token_cache = TokenCache::new(&cache_pool);
    let entry_key = keys::email_change(target_id);

    let stored = token_cache
        .get(&entry_key)
        .await?
        .ok_or_else(|| HttpErrorResponse::InvalidState(String::from("OTP is expired")))?;

    let mut parts = stored.splitn(3, ':');
    let (new_email, stored_current_otp, stored_new_otp) =
        match (parts.next(), parts.next(), parts.next()) {
            (Some(email), Some(current), Some(new)) => (email, current, new),
            _ => {
                return Err(HttpErrorResponse::InternalError(String::from(
                    "Stored email change entry is malformed",
                )))
            }
        };

    let current_matches = Otp::are_equal(&otps.current_email_otp, stored_current_otp);
    let new_matches = Otp::are_equal(&otps.new_email_otp, stored_new_otp);

    if !current_matches && !new_matches {
        return Err(HttpErrorResponse::IncorrectCredential(String::from(
            "Both current and new email OTPs are incorrect",
        )));
    }

    if !current_matches {
        return Err(HttpErrorResponse::IncorrectCredential(String::from(
            "Incorrect current email OTP",
        )));
    }

    if !new_matches {
        return Err(HttpErrorResponse::IncorrectCredential(String::from(
            "Incorrect new email OTP",
        )));
    }

    let user_dao = db::user::Dao::new(&db_async_pool);
    user_dao.update_user_email(target_id, new_email).await?;

    token_cache.delete(&entry_key).await?;

    log::info!("Email changed for user {}", target_id);

    Ok(HttpResponse::Ok().json(MessageResponse::from("Email address updated successfully")))
}

/// Completes a staff-initiated email change. No authentication; possession
/// of the single-use link token is the credential.
pub async fn verify_email_change_token(
    db_async_pool: web::Data<DbAsyncPool>,
    cache_pool: web::Data<CachePool>,
    token: web::Path<String>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let token_cache = TokenCache::new(&cache_pool);

    let stored = token_cache
        .take(&keys::staff_email_change(&token))
        .await?
        .ok_or_else(|| {
            HttpErrorResponse::InvalidState(String::from(
                "Invalid or expired verification token",
            ))
        })?;

    let (user_id, new_email) = stored.split_once(':').ok_or_else(|| {
        HttpErrorResponse::InternalError(String::from("Stored email change entry is malformed"))
    })?;

    let user_id = Uuid::from_str(user_id).map_err(|_| {
        HttpErrorResponse::InternalError(String::from("Stored email change entry is malformed"))
    })?;

    let user_dao = db::user::Dao::new(&db_async_pool);
    let user = user_dao
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| HttpErrorResponse::DoesNotExist(String::from(USER_NOT_FOUND_MSG)))?;

    user_dao.update_user_email(user.id, new_email).await?;

    log::info!("Staff-initiated email change completed for user {}", user.id);

    Ok(HttpResponse::Ok().json(MessageResponse::from("Email address updated successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use actix_web::http::StatusCode;
    use actix_web::test::{self, TestRequest};
    use actix_web::web::Data;
    use actix_web::App;
    use std::time::Duration;

    use outlay_common::threadrand::SecureRng;

    use crate::handlers::test_utils::{self, bearer, ledgered_access_token};
    use crate::services;

    macro_rules! test_app {
        () => {
            test::init_service(
                App::new()
                    .app_data(Data::new(env::testing::DB_ASYNC_POOL.clone()))
                    .app_data(Data::new(env::testing::CACHE_POOL.clone()))
                    .configure(services::api::configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_only_staff_may_list_users() {
        let app = test_app!();

        let user = test_utils::insert_verified_user_with_password("s3cure-Pa55word!").await;
        let staff = test_utils::insert_verified_staff_with_password("s3cure-Pa55word!").await;

        let user_token = ledgered_access_token(&user).await;
        let staff_token = ledgered_access_token(&staff).await;

        let req = TestRequest::get()
            .uri("/api/users")
            .insert_header(bearer(&user_token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = TestRequest::get()
            .uri("/api/users")
            .insert_header(bearer(&staff_token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        test_utils::delete_user(user.id).await;
        test_utils::delete_user(staff.id).await;
    }

    #[actix_web::test]
    async fn test_profile_access_denial_reads_as_not_found() {
        let app = test_app!();

        let user = test_utils::insert_verified_user_with_password("s3cure-Pa55word!").await;
        let other = test_utils::insert_verified_user_with_password("s3cure-Pa55word!").await;
        let staff = test_utils::insert_verified_staff_with_password("s3cure-Pa55word!").await;

        let user_token = ledgered_access_token(&user).await;
        let staff_token = ledgered_access_token(&staff).await;

        let req = TestRequest::get()
            .uri(&format!("/api/users/{}", user.id))
            .insert_header(bearer(&user_token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // Another user's profile is 404, not 403
        let req = TestRequest::get()
            .uri(&format!("/api/users/{}", other.id))
            .insert_header(bearer(&user_token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = TestRequest::get()
            .uri(&format!("/api/users/{}", other.id))
            .insert_header(bearer(&staff_token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // Malformed ids fail before the permission check
        let req = TestRequest::get()
            .uri("/api/users/not-a-uuid")
            .insert_header(bearer(&user_token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        test_utils::delete_user(user.id).await;
        test_utils::delete_user(other.id).await;
        test_utils::delete_user(staff.id).await;
    }

    #[actix_web::test]
    async fn test_password_update_keeps_only_the_current_token() {
        let app = test_app!();

        let user = test_utils::insert_verified_user_with_password("s3cure-Pa55word!").await;

        let current_token = ledgered_access_token(&user).await;
        let other_token = ledgered_access_token(&user).await;

        let req = TestRequest::post()
            .uri(&format!("/api/users/{}/password", user.id))
            .insert_header(bearer(&current_token))
            .set_json(CurrentAndNewPasswordPair {
                current_password: String::from("s3cure-Pa55word!"),
                new_password: String::from("brand-New-Pa55!"),
                confirm_password: String::from("brand-New-Pa55!"),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // The other session is logged out; this one is not
        let req = TestRequest::get()
            .uri(&format!("/api/users/{}", user.id))
            .insert_header(bearer(&other_token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = TestRequest::get()
            .uri(&format!("/api/users/{}", user.id))
            .insert_header(bearer(&current_token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        test_utils::delete_user(user.id).await;
    }

    #[actix_web::test]
    async fn test_staff_cannot_update_another_users_password() {
        let app = test_app!();

        let user = test_utils::insert_verified_user_with_password("s3cure-Pa55word!").await;
        let staff = test_utils::insert_verified_staff_with_password("s3cure-Pa55word!").await;

        let staff_token = ledgered_access_token(&staff).await;

        let req = TestRequest::post()
            .uri(&format!("/api/users/{}/password", user.id))
            .insert_header(bearer(&staff_token))
            .set_json(CurrentAndNewPasswordPair {
                current_password: String::from("s3cure-Pa55word!"),
                new_password: String::from("brand-New-Pa55!"),
                confirm_password: String::from("brand-New-Pa55!"),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        test_utils::delete_user(user.id).await;
        test_utils::delete_user(staff.id).await;
    }

    #[actix_web::test]
    async fn test_self_deletion_requires_the_correct_password() {
        let app = test_app!();

        let user = test_utils::insert_verified_user_with_password("s3cure-Pa55word!").await;
        let token = ledgered_access_token(&user).await;

        let req = TestRequest::delete()
            .uri(&format!("/api/users/{}", user.id))
            .insert_header(bearer(&token))
            .set_json(InputUserDeletion { password: None })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = TestRequest::delete()
            .uri(&format!("/api/users/{}", user.id))
            .insert_header(bearer(&token))
            .set_json(InputUserDeletion {
                password: Some(String::from("wrong-Pa55word!")),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = TestRequest::delete()
            .uri(&format!("/api/users/{}", user.id))
            .insert_header(bearer(&token))
            .set_json(InputUserDeletion {
                password: Some(String::from("s3cure-Pa55word!")),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // The ledger was cleared before the response returned
        let req = TestRequest::get()
            .uri(&format!("/api/users/{}", user.id))
            .insert_header(bearer(&token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let user_dao = db::user::Dao::new(&env::testing::DB_ASYNC_POOL);
        let reloaded = user_dao.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(reloaded.is_deleted);

        test_utils::delete_user(user.id).await;
    }

    #[actix_web::test]
    async fn test_staff_deletes_another_user_without_password() {
        let app = test_app!();

        let user = test_utils::insert_verified_user_with_password("s3cure-Pa55word!").await;
        let staff = test_utils::insert_verified_staff_with_password("s3cure-Pa55word!").await;
        let staff_token = ledgered_access_token(&staff).await;

        // No password and no body at all
        let req = TestRequest::delete()
            .uri(&format!("/api/users/{}", user.id))
            .insert_header(bearer(&staff_token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let user_dao = db::user::Dao::new(&env::testing::DB_ASYNC_POOL);
        let reloaded = user_dao.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(reloaded.is_deleted);

        test_utils::delete_user(user.id).await;
        test_utils::delete_user(staff.id).await;
    }

    #[actix_web::test]
    async fn test_dual_otp_email_change_error_messages_are_distinct() {
        let app = test_app!();

        let user = test_utils::insert_verified_user_with_password("s3cure-Pa55word!").await;
        let token = ledgered_access_token(&user).await;

        let new_email = format!("changed-{}@outlay.test", SecureRng::next_u128());

        let req = TestRequest::post()
            .uri(&format!("/api/users/{}/email", user.id))
            .insert_header(bearer(&token))
            .set_json(InputNewEmail {
                new_email: new_email.clone(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // The OTP pair is bound together under one cache entry
        let token_cache = TokenCache::new(&env::testing::CACHE_POOL);
        let stored = token_cache
            .get(&keys::email_change(user.id))
            .await
            .unwrap()
            .unwrap();

        let mut parts = stored.splitn(3, ':');
        let stored_email = parts.next().unwrap().to_string();
        let current_otp = parts.next().unwrap().to_string();
        let new_otp = parts.next().unwrap().to_string();
        assert_eq!(stored_email, new_email);

        let confirm = |current: String, new: String| {
            TestRequest::post()
                .uri(&format!("/api/users/{}/email/confirm", user.id))
                .insert_header(bearer(&token))
                .set_json(InputEmailChangeOtps {
                    current_email_otp: current,
                    new_email_otp: new,
                })
                .to_request()
        };

        let wrong = |otp: &str| {
            // Flip a digit to guarantee a mismatch of the same length
            let first = otp.as_bytes()[0];
            let flipped = if first == b'9' { b'0' } else { first + 1 };
            let mut s = otp.to_string().into_bytes();
            s[0] = flipped;
            String::from_utf8(s).unwrap()
        };

        // Both wrong
        let resp =
            test::call_service(&app, confirm(wrong(&current_otp), wrong(&new_otp))).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let both_wrong = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        assert!(String::from_utf8(both_wrong.to_vec())
            .unwrap()
            .contains("Both"));

        // Only the current-email OTP wrong
        let resp =
            test::call_service(&app, confirm(wrong(&current_otp), new_otp.clone())).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let current_wrong = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        assert!(String::from_utf8(current_wrong.to_vec())
            .unwrap()
            .contains("current email OTP"));

        // Only the new-email OTP wrong
        let resp =
            test::call_service(&app, confirm(current_otp.clone(), wrong(&new_otp))).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let new_wrong = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        assert!(String::from_utf8(new_wrong.to_vec())
            .unwrap()
            .contains("new email OTP"));

        // Both correct
        let resp = test::call_service(&app, confirm(current_otp, new_otp)).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let user_dao = db::user::Dao::new(&env::testing::DB_ASYNC_POOL);
        let reloaded = user_dao.get_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.email, new_email.to_lowercase());

        // The entry is gone after a successful confirmation
        assert!(token_cache
            .get(&keys::email_change(user.id))
            .await
            .unwrap()
            .is_none());

        test_utils::delete_user(user.id).await;
    }

    #[actix_web::test]
    async fn test_second_email_change_request_is_rate_limited() {
        let app = test_app!();

        let user = test_utils::insert_verified_user_with_password("s3cure-Pa55word!").await;
        let token = ledgered_access_token(&user).await;

        let request_change = |email: String| {
            TestRequest::post()
                .uri(&format!("/api/users/{}/email", user.id))
                .insert_header(bearer(&token))
                .set_json(InputNewEmail { new_email: email })
                .to_request()
        };

        let resp = test::call_service(
            &app,
            request_change(format!("first-{}@outlay.test", SecureRng::next_u128())),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(
            &app,
            request_change(format!("second-{}@outlay.test", SecureRng::next_u128())),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let token_cache = TokenCache::new(&env::testing::CACHE_POOL);
        token_cache
            .delete(&keys::email_change(user.id))
            .await
            .unwrap();
        test_utils::delete_user(user.id).await;
    }

    #[actix_web::test]
    async fn test_staff_email_change_link_is_single_use() {
        let app = test_app!();

        let user = test_utils::insert_verified_user_with_password("s3cure-Pa55word!").await;

        let new_email = format!("staff-changed-{}@outlay.test", SecureRng::next_u128());
        let link_token = UrlSafeToken::generate(32);

        let token_cache = TokenCache::new(&env::testing::CACHE_POOL);
        token_cache
            .put(
                &keys::staff_email_change(&link_token),
                &format!("{}:{}", user.id, new_email),
                Duration::from_secs(600),
            )
            .await
            .unwrap();

        // No authentication on the confirmation endpoint
        let req = TestRequest::get()
            .uri(&format!("/api/users/email/verify/{link_token}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let user_dao = db::user::Dao::new(&env::testing::DB_ASYNC_POOL);
        let reloaded = user_dao.get_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.email, new_email.to_lowercase());

        // The link token was consumed
        let req = TestRequest::get()
            .uri(&format!("/api/users/email/verify/{link_token}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        test_utils::delete_user(user.id).await;
    }
}
