use bigdecimal::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::models::category::Category;
use crate::models::transaction::{Transaction, TransactionType};
use crate::models::user::User;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn from(message: &str) -> Self {
        Self {
            message: String::from(message),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshedAccessToken {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputUserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub name: String,
    pub is_staff: bool,
    pub is_verified: bool,
    pub is_deleted: bool,
    pub created_timestamp: SystemTime,
    pub modified_timestamp: SystemTime,
}

impl From<&User> for OutputUserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            is_staff: user.is_staff,
            is_verified: user.is_verified,
            is_deleted: user.is_deleted,
            created_timestamp: user.created_timestamp,
            modified_timestamp: user.modified_timestamp,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputCategory {
    pub id: Uuid,
    pub name: String,
    pub user_id: Uuid,
    pub is_predefined: bool,
    pub is_deleted: bool,
    pub created_timestamp: SystemTime,
    pub modified_timestamp: SystemTime,
}

impl From<&Category> for OutputCategory {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            user_id: category.user_id,
            is_predefined: category.is_predefined,
            is_deleted: category.is_deleted,
            created_timestamp: category.created_timestamp,
            modified_timestamp: category.modified_timestamp,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub category_id: Uuid,
    pub amount: f64,
    pub transaction_timestamp: SystemTime,
    pub description: Option<String>,
    pub is_deleted: bool,
    pub created_timestamp: SystemTime,
    pub modified_timestamp: SystemTime,
}

impl From<&Transaction> for OutputTransaction {
    fn from(transaction: &Transaction) -> Self {
        Self {
            id: transaction.id,
            user_id: transaction.user_id,
            transaction_type: transaction.transaction_type,
            category_id: transaction.category_id,
            amount: transaction.amount.to_f64().unwrap_or(0.0),
            transaction_timestamp: transaction.transaction_timestamp,
            description: transaction.description.clone(),
            is_deleted: transaction.is_deleted,
            created_timestamp: transaction.created_timestamp,
            modified_timestamp: transaction.modified_timestamp,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaginationData {
    pub total_items: i64,
    pub total_pages: u32,
    pub current_page: u32,
    pub per_page: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputPage<T> {
    pub items: Vec<T>,
    pub pagination: PaginationData,
}

impl<T> OutputPage<T> {
    pub fn new(items: Vec<T>, total_items: i64, page: u32, per_page: u32) -> Self {
        let total_pages = if total_items == 0 {
            0
        } else {
            ((total_items as u64).div_ceil(per_page as u64)) as u32
        };

        Self {
            items,
            pagination: PaginationData {
                total_items,
                total_pages,
                current_page: page,
                per_page,
                has_next: page < total_pages,
                has_prev: page > 1 && total_pages != 0,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputCategorySummary {
    pub category_name: String,
    pub total_credit: f64,
    pub total_debit: f64,
    pub transaction_count: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputReportTransactions {
    pub credit_transactions: Vec<OutputTransaction>,
    pub debit_transactions: Vec<OutputTransaction>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputTransactionReport {
    pub total_income: f64,
    pub total_expense: f64,
    pub category_wise_income_expense: Vec<OutputCategorySummary>,
    pub transactions: OutputReportTransactions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_metadata() {
        let page = OutputPage::new(vec![1, 2, 3], 25, 2, 10);

        assert_eq!(page.pagination.total_items, 25);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.current_page, 2);
        assert!(page.pagination.has_next);
        assert!(page.pagination.has_prev);

        let first = OutputPage::new(vec![1], 25, 1, 10);
        assert!(first.pagination.has_next);
        assert!(!first.pagination.has_prev);

        let last = OutputPage::new(vec![1], 25, 3, 10);
        assert!(!last.pagination.has_next);
        assert!(last.pagination.has_prev);

        let empty: OutputPage<i32> = OutputPage::new(Vec::new(), 0, 1, 10);
        assert_eq!(empty.pagination.total_pages, 0);
        assert!(!empty.pagination.has_next);
        assert!(!empty.pagination.has_prev);
    }
}
