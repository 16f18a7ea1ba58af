use diesel::{Insertable, Queryable};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::queued_jobs;

#[derive(Clone, Debug, Serialize, Deserialize, Identifiable, Queryable)]
#[diesel(table_name = queued_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct QueuedJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: String,
    pub attempts: i32,
    pub available_timestamp: SystemTime,
    pub created_timestamp: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = queued_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewQueuedJob<'a> {
    pub id: Uuid,
    pub job_type: &'a str,
    pub payload: &'a str,
    pub attempts: i32,
    pub available_timestamp: SystemTime,
    pub created_timestamp: SystemTime,
}

/// Job descriptors carried through the durable queue. Workers match on the
/// variant; unknown payloads are abandoned with a log entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    SendVerificationEmail {
        user_email: String,
        verification_url: String,
    },
    SendPasswordResetEmail {
        user_email: String,
        reset_url: String,
    },
    SendEmailChangeOtps {
        current_email: String,
        new_email: String,
        current_email_otp: String,
        new_email_otp: String,
    },
    SendStaffEmailChangeEmail {
        new_email: String,
        verification_url: String,
        username: String,
    },
    CascadeDeleteUser {
        user_id: Uuid,
    },
}

impl JobPayload {
    pub fn job_type(&self) -> &'static str {
        match self {
            JobPayload::SendVerificationEmail { .. } => "send_verification_email",
            JobPayload::SendPasswordResetEmail { .. } => "send_password_reset_email",
            JobPayload::SendEmailChangeOtps { .. } => "send_email_change_otps",
            JobPayload::SendStaffEmailChangeEmail { .. } => "send_staff_email_change_email",
            JobPayload::CascadeDeleteUser { .. } => "cascade_delete_user",
        }
    }
}
