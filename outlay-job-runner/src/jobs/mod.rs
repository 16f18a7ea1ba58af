mod cascade_delete;
mod emails;

use outlay_common::db::{DaoError, DbAsyncPool};
use outlay_common::email::{EmailError, SendEmail};
use outlay_common::models::queued_job::JobPayload;

use std::fmt;

#[derive(Debug)]
pub enum JobError {
    DaoFailure(DaoError),
    EmailFailure(EmailError),
    MalformedPayload(String),
}

impl std::error::Error for JobError {}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::DaoFailure(e) => write!(f, "JobError: {e}"),
            JobError::EmailFailure(e) => write!(f, "JobError: {e}"),
            JobError::MalformedPayload(e) => write!(f, "JobError: Malformed payload: {e}"),
        }
    }
}

impl JobError {
    /// Retrying a malformed payload can never succeed; such jobs are
    /// abandoned on first failure.
    pub fn is_permanent(&self) -> bool {
        matches!(self, JobError::MalformedPayload(_))
    }
}

impl From<DaoError> for JobError {
    fn from(e: DaoError) -> Self {
        JobError::DaoFailure(e)
    }
}

impl From<EmailError> for JobError {
    fn from(e: EmailError) -> Self {
        JobError::EmailFailure(e)
    }
}

pub fn decode_payload(encoded: &str) -> Result<JobPayload, JobError> {
    serde_json::from_str(encoded).map_err(|e| JobError::MalformedPayload(e.to_string()))
}

/// Dispatches a decoded payload to its job. Every job is idempotent; a retry
/// after a partial failure must converge on the same end state.
pub async fn execute_payload(
    payload: JobPayload,
    db_async_pool: &DbAsyncPool,
    email_sender: &dyn SendEmail,
) -> Result<(), JobError> {
    match payload {
        JobPayload::SendVerificationEmail {
            user_email,
            verification_url,
        } => emails::send_verification_email(email_sender, &user_email, &verification_url).await,
        JobPayload::SendPasswordResetEmail {
            user_email,
            reset_url,
        } => emails::send_password_reset_email(email_sender, &user_email, &reset_url).await,
        JobPayload::SendEmailChangeOtps {
            current_email,
            new_email,
            current_email_otp,
            new_email_otp,
        } => {
            emails::send_email_change_otps(
                email_sender,
                &current_email,
                &new_email,
                &current_email_otp,
                &new_email_otp,
            )
            .await
        }
        JobPayload::SendStaffEmailChangeEmail {
            new_email,
            verification_url,
            username,
        } => {
            emails::send_staff_email_change_email(
                email_sender,
                &new_email,
                &verification_url,
                &username,
            )
            .await
        }
        JobPayload::CascadeDeleteUser { user_id } => {
            cascade_delete::cascade_delete_user(db_async_pool, user_id).await
        }
    }
}
