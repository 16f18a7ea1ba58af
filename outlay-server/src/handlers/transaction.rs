use bigdecimal::{BigDecimal, FromPrimitive, RoundingMode};
use outlay_common::db::{self, DbAsyncPool};
use outlay_common::models::transaction::{Transaction, TransactionType};
use outlay_common::permissions::{self, Actor, ObjectView, Operation, Resource};
use outlay_common::request_io::{
    InputEditTransaction, InputTransaction, MessageResponse, OutputPage, OutputTransaction,
    TransactionListQuery,
};

use actix_web::web;
use actix_web::HttpResponse;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::handlers::error::HttpErrorResponse;
use crate::handlers::{clamp_page_params, resolve_actor};
use crate::middleware::auth::{Access, VerifiedToken};
use crate::middleware::FromBearerHeader;

const TRANSACTION_NOT_FOUND_MSG: &str = "Transaction not found";

const AMOUNT_MIN: f64 = 1.0;
const AMOUNT_MAX: f64 = 99_999_999.99;

const SECONDS_PER_DAY: u64 = 86400;

fn parse_amount(amount: f64) -> Result<BigDecimal, HttpErrorResponse> {
    if !(AMOUNT_MIN..=AMOUNT_MAX).contains(&amount) {
        return Err(HttpErrorResponse::IncorrectlyFormed(String::from(
            "Amount must be between 1 and 99999999.99",
        )));
    }

    BigDecimal::from_f64(amount)
        .map(|a| a.with_scale_round(2, RoundingMode::HalfUp))
        .ok_or_else(|| {
            HttpErrorResponse::IncorrectlyFormed(String::from("Amount is not a valid number"))
        })
}

fn timestamp_from_unix(seconds: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(seconds)
}

/// Pushes a date given in unix seconds to the last second of that UTC day.
fn end_of_day(seconds: u64) -> u64 {
    seconds - seconds % SECONDS_PER_DAY + (SECONDS_PER_DAY - 1)
}

/// The category must exist, be non-deleted, and be either predefined or
/// owned by the transaction's user.
async fn validate_category_for_user(
    db_async_pool: &DbAsyncPool,
    category_id: Uuid,
    user_id: Uuid,
) -> Result<(), HttpErrorResponse> {
    let category_dao = db::category::Dao::new(db_async_pool);

    let category = category_dao
        .get_category_by_id(category_id)
        .await?
        .filter(|c| !c.is_deleted)
        .ok_or_else(|| HttpErrorResponse::InvalidState(String::from("Category not found")))?;

    if !category.is_predefined && category.user_id != user_id {
        return Err(HttpErrorResponse::InvalidState(String::from(
            "Category does not belong to the provided user",
        )));
    }

    Ok(())
}

async fn get_permitted_transaction(
    db_async_pool: &DbAsyncPool,
    actor: &Actor,
    transaction_id: &str,
    operation: Operation,
) -> Result<Transaction, HttpErrorResponse> {
    let transaction_id = Uuid::from_str(transaction_id).map_err(|_| {
        HttpErrorResponse::IncorrectlyFormed(String::from("Invalid transaction_id format"))
    })?;

    let transaction_dao = db::transaction::Dao::new(db_async_pool);
    let transaction = transaction_dao
        .get_transaction_by_id(transaction_id)
        .await?
        .ok_or_else(|| {
            HttpErrorResponse::DoesNotExist(String::from(TRANSACTION_NOT_FOUND_MSG))
        })?;

    if !permissions::is_allowed(
        Resource::Transaction,
        actor,
        &ObjectView::from(&transaction),
        operation,
    ) {
        return Err(HttpErrorResponse::DoesNotExist(String::from(
            TRANSACTION_NOT_FOUND_MSG,
        )));
    }

    Ok(transaction)
}

pub async fn list_transactions(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    query: web::Query<TransactionListQuery>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let (page, per_page) = clamp_page_params(query.page, query.per_page);

    let mut filter = db::transaction::ListFilter::default();

    if actor.is_staff {
        filter.include_deleted = true;

        if let Some(raw) = query.user_id.as_deref() {
            filter.user_id = Some(Uuid::from_str(raw).map_err(|_| {
                HttpErrorResponse::IncorrectlyFormed(format!("Invalid user_id format: {raw}"))
            })?);
        }
    } else {
        // Whatever user_id was supplied, a regular user sees only their own
        filter.user_id = Some(actor.id);
    }

    if let Some(raw) = query.transaction_type.as_deref() {
        filter.transaction_type = Some(TransactionType::from_str(raw).map_err(|_| {
            HttpErrorResponse::IncorrectlyFormed(format!("Invalid transaction type: {raw}"))
        })?);
    }

    if let Some(raw) = query.category_id.as_deref() {
        filter.category_id = Some(Uuid::from_str(raw).map_err(|_| {
            HttpErrorResponse::IncorrectlyFormed(format!("Invalid category_id format: {raw}"))
        })?);
    }

    if let Some(from) = query.from_date {
        filter.from_timestamp = Some(timestamp_from_unix(from));
    }

    if let Some(to) = query.to_date {
        filter.to_timestamp = Some(timestamp_from_unix(end_of_day(to)));
    }

    let transaction_dao = db::transaction::Dao::new(&db_async_pool);
    let (transactions, total) = transaction_dao
        .list_transactions(filter, page, per_page)
        .await?;

    let items = transactions
        .iter()
        .map(OutputTransaction::from)
        .collect::<Vec<_>>();

    Ok(HttpResponse::Ok().json(OutputPage::new(items, total, page, per_page)))
}

pub async fn create_transaction(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    transaction_data: web::Json<InputTransaction>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let user_dao = db::user::Dao::new(&db_async_pool);
    let owner = user_dao
        .get_user_by_id(transaction_data.user_id)
        .await?
        .filter(|u| !u.is_deleted)
        .ok_or_else(|| HttpErrorResponse::InvalidState(String::from("User not found")))?;

    if !actor.is_staff {
        if owner.id != actor.id {
            return Err(HttpErrorResponse::InvalidState(String::from(
                "You can create transactions for yourself only",
            )));
        }
    } else if owner.is_staff {
        // Unlike categories, staff transact only on behalf of regular users,
        // their own account included
        return Err(HttpErrorResponse::InvalidState(String::from(
            "Staff cannot create transactions for staff users",
        )));
    }

    let transaction_type =
        TransactionType::from_str(&transaction_data.transaction_type).map_err(|_| {
            HttpErrorResponse::IncorrectlyFormed(format!(
                "Invalid transaction type: {}",
                transaction_data.transaction_type
            ))
        })?;

    let amount = parse_amount(transaction_data.amount)?;

    validate_category_for_user(&db_async_pool, transaction_data.category_id, owner.id).await?;

    // May be backdated or future-dated; defaults to now
    let transaction_timestamp = transaction_data
        .transaction_timestamp
        .map(timestamp_from_unix)
        .unwrap_or_else(SystemTime::now);

    let transaction_dao = db::transaction::Dao::new(&db_async_pool);
    let transaction = transaction_dao
        .create_transaction(
            owner.id,
            transaction_data.category_id,
            transaction_type,
            &amount,
            transaction_timestamp,
            transaction_data.description.as_deref(),
        )
        .await?;

    log::info!(
        "Transaction {} created by user {}",
        transaction.id,
        actor.id
    );

    Ok(HttpResponse::Created().json(OutputTransaction::from(&transaction)))
}

pub async fn get_transaction(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    transaction_id: web::Path<String>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let transaction = get_permitted_transaction(
        &db_async_pool,
        &Actor::from(&actor),
        &transaction_id,
        Operation::Read,
    )
    .await?;

    Ok(HttpResponse::Ok().json(OutputTransaction::from(&transaction)))
}

pub async fn edit_transaction(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    transaction_id: web::Path<String>,
    edits: web::Json<InputEditTransaction>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let transaction = get_permitted_transaction(
        &db_async_pool,
        &Actor::from(&actor),
        &transaction_id,
        Operation::Write,
    )
    .await?;

    // The owner and the credit/debit type are immutable
    if let Some(category_id) = edits.category_id {
        validate_category_for_user(&db_async_pool, category_id, transaction.user_id).await?;
    }

    let amount = match edits.amount {
        Some(raw) => Some(parse_amount(raw)?),
        None => None,
    };

    let transaction_dao = db::transaction::Dao::new(&db_async_pool);
    let updated = transaction_dao
        .update_transaction(
            transaction.id,
            edits.category_id,
            amount.as_ref(),
            edits.transaction_timestamp.map(timestamp_from_unix),
            edits.description.as_deref(),
        )
        .await?;

    log::info!("Transaction {} updated by user {}", updated.id, actor.id);

    Ok(HttpResponse::Ok().json(OutputTransaction::from(&updated)))
}

pub async fn delete_transaction(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    transaction_id: web::Path<String>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let transaction = get_permitted_transaction(
        &db_async_pool,
        &Actor::from(&actor),
        &transaction_id,
        Operation::Write,
    )
    .await?;

    let transaction_dao = db::transaction::Dao::new(&db_async_pool);
    transaction_dao
        .soft_delete_transaction(transaction.id)
        .await?;

    log::info!(
        "Transaction {} deleted by user {}",
        transaction.id,
        actor.id
    );

    Ok(HttpResponse::Ok().json(MessageResponse::from("Transaction deleted successfully")))
}
