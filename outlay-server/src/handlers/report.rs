use bigdecimal::ToPrimitive;
use chrono::NaiveDate;
use outlay_common::db::{self, DbAsyncPool};
use outlay_common::request_io::{
    OutputCategorySummary, OutputReportTransactions, OutputTransaction, OutputTransactionReport,
    ReportQuery,
};

use actix_web::web;
use actix_web::HttpResponse;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::handlers::error::HttpErrorResponse;
use crate::handlers::resolve_actor;
use crate::middleware::auth::{Access, VerifiedToken};
use crate::middleware::FromBearerHeader;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn date_to_timestamp(date: NaiveDate, end_of_day: bool) -> Result<SystemTime, HttpErrorResponse> {
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };

    let seconds = time
        .map(|t| t.and_utc().timestamp())
        .filter(|secs| *secs >= 0)
        .ok_or_else(|| {
            HttpErrorResponse::IncorrectlyFormed(String::from(
                "Invalid date format. Use YYYY-MM-DD",
            ))
        })?;

    Ok(UNIX_EPOCH + Duration::from_secs(seconds as u64))
}

/// Both dates are required, inclusive, with the end date pushed to the last
/// second of its day.
fn parse_report_range(
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<(SystemTime, SystemTime), HttpErrorResponse> {
    let (start_date, end_date) = match (start_date, end_date) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Err(HttpErrorResponse::IncorrectlyFormed(String::from(
                "Both start_date and end_date are required",
            )))
        }
    };

    let parse = |raw: &str| {
        NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
            HttpErrorResponse::IncorrectlyFormed(String::from(
                "Invalid date format. Use YYYY-MM-DD",
            ))
        })
    };

    let start = parse(start_date)?;
    let end = parse(end_date)?;

    if start > end {
        return Err(HttpErrorResponse::IncorrectlyFormed(String::from(
            "Start date cannot be after end date",
        )));
    }

    Ok((
        date_to_timestamp(start, false)?,
        date_to_timestamp(end, true)?,
    ))
}

pub async fn transaction_report(
    db_async_pool: web::Data<DbAsyncPool>,
    access_token: VerifiedToken<Access, FromBearerHeader>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let actor = resolve_actor(&db_async_pool, &access_token.signature).await?;

    let (range_start, range_end) =
        parse_report_range(query.start_date.as_deref(), query.end_date.as_deref())?;

    // A regular user reports on themselves, any user_id ignored; staff must
    // name a regular user
    let target_id = if !actor.is_staff {
        actor.id
    } else {
        let raw = query.user_id.as_deref().ok_or_else(|| {
            HttpErrorResponse::IncorrectlyFormed(String::from(
                "Staff users must provide a user_id of a normal user",
            ))
        })?;

        let target_id = Uuid::from_str(raw).map_err(|_| {
            HttpErrorResponse::IncorrectlyFormed(String::from("Invalid user_id format"))
        })?;

        let user_dao = db::user::Dao::new(&db_async_pool);
        let target = user_dao
            .get_user_by_id(target_id)
            .await?
            .ok_or_else(|| HttpErrorResponse::InvalidState(String::from("User not found")))?;

        if target.is_staff {
            return Err(HttpErrorResponse::InvalidState(String::from(
                "No data exists on behalf of staff users",
            )));
        }

        target.id
    };

    let transaction_dao = db::transaction::Dao::new(&db_async_pool);
    let report = transaction_dao
        .report_for_user(target_id, range_start, range_end)
        .await?;

    let category_wise_income_expense = report
        .category_summaries
        .iter()
        .map(|summary| OutputCategorySummary {
            category_name: summary.category_name.clone(),
            total_credit: summary.total_credit.to_f64().unwrap_or(0.0),
            total_debit: summary.total_debit.to_f64().unwrap_or(0.0),
            transaction_count: summary.transaction_count,
        })
        .collect();

    log::info!(
        "Transaction report generated for user {} by user {}",
        target_id,
        actor.id
    );

    Ok(HttpResponse::Ok().json(OutputTransactionReport {
        total_income: report.total_income.to_f64().unwrap_or(0.0),
        total_expense: report.total_expense.to_f64().unwrap_or(0.0),
        category_wise_income_expense,
        transactions: OutputReportTransactions {
            credit_transactions: report
                .credit_transactions
                .iter()
                .map(OutputTransaction::from)
                .collect(),
            debit_transactions: report
                .debit_transactions
                .iter()
                .map(OutputTransaction::from)
                .collect(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use actix_web::test::{self, TestRequest};
    use actix_web::web::Data;
    use actix_web::App;
    use bigdecimal::BigDecimal;

    use outlay_common::models::transaction::TransactionType;

    use crate::env;
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

    #[test]
    fn test_parse_report_range() {
        assert!(parse_report_range(None, Some("2024-01-31")).is_err());
        assert!(parse_report_range(Some("2024-01-01"), None).is_err());
        assert!(parse_report_range(Some("01/01/2024"), Some("2024-01-31")).is_err());
        assert!(parse_report_range(Some("2024-02-01"), Some("2024-01-01")).is_err());

        let (start, end) = parse_report_range(Some("2024-01-01"), Some("2024-01-01")).unwrap();

        // Inclusive single-day range spans the whole day
        let span = end.duration_since(start).unwrap();
        assert_eq!(span.as_secs(), 86399);
    }

    #[actix_web::test]
    async fn test_report_totals_for_own_transactions() {
        let app = test_app!();

        let user = test_utils::insert_verified_user_with_password("s3cure-Pa55word!").await;
        let token = ledgered_access_token(&user).await;

        let category_dao = db::category::Dao::new(&env::testing::DB_ASYNC_POOL);
        let salary = category_dao
            .create_category(user.id, "Salary", false)
            .await
            .unwrap();
        let food = category_dao
            .create_category(user.id, "Food", false)
            .await
            .unwrap();

        let transaction_dao = db::transaction::Dao::new(&env::testing::DB_ASYNC_POOL);
        let entries = [
            (salary.id, TransactionType::Credit, 2000),
            (food.id, TransactionType::Debit, 150),
            (food.id, TransactionType::Debit, 50),
        ];
        for (category_id, transaction_type, amount) in entries {
            transaction_dao
                .create_transaction(
                    user.id,
                    category_id,
                    transaction_type,
                    &BigDecimal::from(amount),
                    SystemTime::now(),
                    None,
                )
                .await
                .unwrap();
        }

        let today = chrono::Utc::now().date_naive();
        let req = TestRequest::get()
            .uri(&format!(
                "/api/reports/transactions?start_date={}&end_date={}",
                today.format(DATE_FORMAT),
                today.format(DATE_FORMAT),
            ))
            .insert_header(bearer(&token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let report: OutputTransactionReport = serde_json::from_slice(&body).unwrap();

        assert_eq!(report.total_income, 2000.0);
        assert_eq!(report.total_expense, 200.0);
        assert_eq!(report.transactions.credit_transactions.len(), 1);
        assert_eq!(report.transactions.debit_transactions.len(), 2);

        assert_eq!(report.category_wise_income_expense.len(), 2);
        assert_eq!(
            report.category_wise_income_expense[0].category_name,
            "Salary"
        );
        assert_eq!(report.category_wise_income_expense[1].category_name, "Food");
        assert_eq!(
            report.category_wise_income_expense[1].transaction_count,
            2
        );

        test_utils::delete_user(user.id).await;
    }

    #[actix_web::test]
    async fn test_staff_must_name_a_regular_user() {
        let app = test_app!();

        let staff = test_utils::insert_verified_staff_with_password("s3cure-Pa55word!").await;
        let other_staff =
            test_utils::insert_verified_staff_with_password("s3cure-Pa55word!").await;
        let user = test_utils::insert_verified_user_with_password("s3cure-Pa55word!").await;
        let staff_token = ledgered_access_token(&staff).await;

        let range = "start_date=2024-01-01&end_date=2024-12-31";

        // Missing user_id
        let req = TestRequest::get()
            .uri(&format!("/api/reports/transactions?{range}"))
            .insert_header(bearer(&staff_token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // Staff target
        let req = TestRequest::get()
            .uri(&format!(
                "/api/reports/transactions?{range}&user_id={}",
                other_staff.id
            ))
            .insert_header(bearer(&staff_token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // Regular target
        let req = TestRequest::get()
            .uri(&format!(
                "/api/reports/transactions?{range}&user_id={}",
                user.id
            ))
            .insert_header(bearer(&staff_token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        test_utils::delete_user(staff.id).await;
        test_utils::delete_user(other_staff.id).await;
        test_utils::delete_user(user.id).await;
    }
}
