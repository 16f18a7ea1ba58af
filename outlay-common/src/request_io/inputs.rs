use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validators::{self, Validity};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: String,
}

impl InputUser {
    pub fn validate(&self) -> Validity {
        if let v @ Validity::Invalid(_) = validators::validate_username(&self.username) {
            return v;
        }

        if let v @ Validity::Invalid(_) = validators::validate_email_address(&self.email) {
            return v;
        }

        if let v @ Validity::Invalid(_) = validators::validate_password_strength(&self.password) {
            return v;
        }

        if self.name.is_empty() || self.name.len() > 100 {
            return Validity::Invalid(String::from("Name length should be between 1 to 100"));
        }

        Validity::Valid
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CredentialPair {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputEmail {
    pub email: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputNewPassword {
    pub password: String,
    pub confirm_password: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CurrentAndNewPasswordPair {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputEditUser {
    pub username: Option<String>,
    pub name: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputUserDeletion {
    pub password: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputNewEmail {
    pub new_email: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputEmailChangeOtps {
    pub current_email_otp: String,
    pub new_email_otp: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputCategory {
    pub name: String,
    pub user_id: Uuid,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputEditCategory {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputTransaction {
    pub user_id: Uuid,
    pub transaction_type: String,
    pub category_id: Uuid,
    pub amount: f64,
    /// Unix seconds; defaults to the creation time when omitted
    pub transaction_timestamp: Option<u64>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputEditTransaction {
    pub category_id: Option<Uuid>,
    pub amount: Option<f64>,
    pub transaction_timestamp: Option<u64>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InputPage {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CategoryListQuery {
    pub user_id: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TransactionListQuery {
    pub user_id: Option<String>,
    pub transaction_type: Option<String>,
    pub category_id: Option<String>,
    /// Unix seconds, inclusive
    pub from_date: Option<u64>,
    /// Unix seconds; pushed to the end of that day
    pub to_date: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub user_id: Option<String>,
}
