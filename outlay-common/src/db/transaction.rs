use bigdecimal::BigDecimal;
use diesel::{dsl, BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::RunQueryDsl;
use std::collections::HashMap;
use std::time::SystemTime;
use uuid::Uuid;

use crate::db::{DaoError, DbAsyncPool};
use crate::models::transaction::{
    NewTransaction, Transaction, TransactionChangeset, TransactionType,
};
use crate::schema::categories as category_fields;
use crate::schema::categories::dsl::categories;
use crate::schema::transactions as transaction_fields;
use crate::schema::transactions::dsl::transactions;

/// Filters for the transaction listing. `user_id` is `None` only for staff
/// listings over every user; `include_deleted` is likewise staff-only.
#[derive(Clone, Copy, Debug, Default)]
pub struct ListFilter {
    pub user_id: Option<Uuid>,
    pub include_deleted: bool,
    pub transaction_type: Option<TransactionType>,
    pub category_id: Option<Uuid>,
    pub from_timestamp: Option<SystemTime>,
    pub to_timestamp: Option<SystemTime>,
}

#[derive(Clone, Debug)]
pub struct CategorySummary {
    pub category_name: String,
    pub total_credit: BigDecimal,
    pub total_debit: BigDecimal,
    pub transaction_count: i64,
}

#[derive(Debug)]
pub struct TransactionReport {
    pub total_income: BigDecimal,
    pub total_expense: BigDecimal,
    pub category_summaries: Vec<CategorySummary>,
    pub credit_transactions: Vec<Transaction>,
    pub debit_transactions: Vec<Transaction>,
}

pub struct Dao {
    db_async_pool: DbAsyncPool,
}

impl Dao {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_transaction(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        transaction_type: TransactionType,
        amount: &BigDecimal,
        transaction_timestamp: SystemTime,
        description: Option<&str>,
    ) -> Result<Transaction, DaoError> {
        let current_time = SystemTime::now();
        let transaction_id = Uuid::now_v7();

        let new_transaction = NewTransaction {
            id: transaction_id,
            user_id,
            category_id,
            transaction_type,
            amount,
            transaction_timestamp,
            description,
            is_deleted: false,

            created_timestamp: current_time,
            modified_timestamp: current_time,
        };

        let mut conn = self.db_async_pool.get().await?;

        dsl::insert_into(transactions)
            .values(&new_transaction)
            .execute(&mut conn)
            .await?;

        Ok(transactions
            .find(transaction_id)
            .get_result(&mut conn)
            .await?)
    }

    pub async fn get_transaction_by_id(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(transactions
            .find(transaction_id)
            .get_result(&mut conn)
            .await
            .optional()?)
    }

    pub async fn update_transaction(
        &self,
        transaction_id: Uuid,
        category_id: Option<Uuid>,
        amount: Option<&BigDecimal>,
        transaction_timestamp: Option<SystemTime>,
        description: Option<&str>,
    ) -> Result<Transaction, DaoError> {
        let changeset = TransactionChangeset {
            category_id,
            amount,
            transaction_timestamp,
            description,
            modified_timestamp: SystemTime::now(),
        };

        let mut conn = self.db_async_pool.get().await?;

        dsl::update(transactions.find(transaction_id))
            .set(&changeset)
            .execute(&mut conn)
            .await?;

        Ok(transactions
            .find(transaction_id)
            .get_result(&mut conn)
            .await?)
    }

    pub async fn soft_delete_transaction(&self, transaction_id: Uuid) -> Result<(), DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        dsl::update(transactions.find(transaction_id))
            .set((
                transaction_fields::is_deleted.eq(true),
                transaction_fields::modified_timestamp.eq(SystemTime::now()),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Cascade step for user deletion; re-running is a no-op.
    pub async fn soft_delete_all_for_user(&self, user_id: Uuid) -> Result<usize, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(dsl::update(
            transactions.filter(
                transaction_fields::user_id
                    .eq(user_id)
                    .and(transaction_fields::is_deleted.eq(false)),
            ),
        )
        .set((
            transaction_fields::is_deleted.eq(true),
            transaction_fields::modified_timestamp.eq(SystemTime::now()),
        ))
        .execute(&mut conn)
        .await?)
    }

    pub async fn list_transactions(
        &self,
        filter: ListFilter,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<Transaction>, i64), DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        let build = || {
            let mut query = transactions.into_boxed();

            if let Some(owner) = filter.user_id {
                query = query.filter(transaction_fields::user_id.eq(owner));
            }

            if !filter.include_deleted {
                query = query.filter(transaction_fields::is_deleted.eq(false));
            }

            if let Some(transaction_type) = filter.transaction_type {
                query = query.filter(transaction_fields::transaction_type.eq(transaction_type));
            }

            if let Some(category) = filter.category_id {
                query = query.filter(transaction_fields::category_id.eq(category));
            }

            if let Some(from) = filter.from_timestamp {
                query = query.filter(transaction_fields::transaction_timestamp.ge(from));
            }

            if let Some(to) = filter.to_timestamp {
                query = query.filter(transaction_fields::transaction_timestamp.le(to));
            }

            query
        };

        let total = build().count().get_result::<i64>(&mut conn).await?;

        let page_items = build()
            .order(transaction_fields::transaction_timestamp.desc())
            .limit(i64::from(per_page))
            .offset(i64::from(per_page) * i64::from(page.saturating_sub(1)))
            .load::<Transaction>(&mut conn)
            .await?;

        Ok((page_items, total))
    }

    /// One pass over the user's non-deleted transactions in the range,
    /// newest first; totals and per-category sums are folded from the same
    /// rows the listings are built from.
    pub async fn report_for_user(
        &self,
        user_id: Uuid,
        range_start: SystemTime,
        range_end: SystemTime,
    ) -> Result<TransactionReport, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        let rows = transactions
            .inner_join(categories)
            .filter(transaction_fields::user_id.eq(user_id))
            .filter(transaction_fields::is_deleted.eq(false))
            .filter(transaction_fields::transaction_timestamp.between(range_start, range_end))
            .order(transaction_fields::transaction_timestamp.desc())
            .select((
                crate::schema::transactions::all_columns,
                category_fields::name,
            ))
            .load::<(Transaction, String)>(&mut conn)
            .await?;

        let mut total_income = BigDecimal::from(0);
        let mut total_expense = BigDecimal::from(0);
        let mut summaries: HashMap<String, CategorySummary> = HashMap::new();
        let mut credit_transactions = Vec::new();
        let mut debit_transactions = Vec::new();

        for (transaction, category_name) in rows {
            let summary =
                summaries
                    .entry(category_name.clone())
                    .or_insert_with(|| CategorySummary {
                        category_name,
                        total_credit: BigDecimal::from(0),
                        total_debit: BigDecimal::from(0),
                        transaction_count: 0,
                    });
            summary.transaction_count += 1;

            match transaction.transaction_type {
                TransactionType::Credit => {
                    total_income += &transaction.amount;
                    summary.total_credit += &transaction.amount;
                    credit_transactions.push(transaction);
                }
                TransactionType::Debit => {
                    total_expense += &transaction.amount;
                    summary.total_debit += &transaction.amount;
                    debit_transactions.push(transaction);
                }
            }
        }

        let mut category_summaries = summaries.into_values().collect::<Vec<_>>();
        category_summaries.sort_by(|a, b| {
            let a_volume = &a.total_credit + &a.total_debit;
            let b_volume = &b.total_credit + &b.total_debit;
            b_volume.cmp(&a_volume)
        });

        Ok(TransactionReport {
            total_income,
            total_expense,
            category_summaries,
            credit_transactions,
            debit_transactions,
        })
    }
}
