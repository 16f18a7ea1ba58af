use diesel::{dsl, BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::RunQueryDsl;
use std::time::SystemTime;
use uuid::Uuid;

use crate::db::{DaoError, DbAsyncPool};
use crate::models::category::{Category, NewCategory};
use crate::schema::categories as category_fields;
use crate::schema::categories::dsl::categories;
use crate::schema::transactions as transaction_fields;
use crate::schema::transactions::dsl::transactions;

pub struct Dao {
    db_async_pool: DbAsyncPool,
}

impl Dao {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }

    pub async fn create_category(
        &self,
        user_id: Uuid,
        name: &str,
        is_predefined: bool,
    ) -> Result<Category, DaoError> {
        let current_time = SystemTime::now();
        let category_id = Uuid::now_v7();

        let new_category = NewCategory {
            id: category_id,
            user_id,
            name,
            is_predefined,
            is_deleted: false,

            created_timestamp: current_time,
            modified_timestamp: current_time,
        };

        let mut conn = self.db_async_pool.get().await?;

        dsl::insert_into(categories)
            .values(&new_category)
            .execute(&mut conn)
            .await?;

        Ok(categories.find(category_id).get_result(&mut conn).await?)
    }

    pub async fn get_category_by_id(
        &self,
        category_id: Uuid,
    ) -> Result<Option<Category>, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(categories
            .find(category_id)
            .get_result(&mut conn)
            .await
            .optional()?)
    }

    /// True when a non-deleted category with this name is already visible to
    /// the owner (their own or a predefined one). Names are stored
    /// normalized, so an exact match suffices.
    pub async fn visible_name_exists(
        &self,
        owner_id: Uuid,
        name: &str,
        excluded_category_id: Option<Uuid>,
    ) -> Result<bool, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        let visible = category_fields::is_deleted.eq(false).and(
            category_fields::name.eq(name).and(
                category_fields::user_id
                    .eq(owner_id)
                    .or(category_fields::is_predefined.eq(true)),
            ),
        );

        match excluded_category_id {
            Some(excluded) => Ok(dsl::select(dsl::exists(
                categories
                    .filter(visible)
                    .filter(category_fields::id.ne(excluded)),
            ))
            .get_result(&mut conn)
            .await?),
            None => Ok(dsl::select(dsl::exists(categories.filter(visible)))
                .get_result(&mut conn)
                .await?),
        }
    }

    pub async fn rename_category(
        &self,
        category_id: Uuid,
        name: &str,
    ) -> Result<Category, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        dsl::update(categories.find(category_id))
            .set((
                category_fields::name.eq(name),
                category_fields::modified_timestamp.eq(SystemTime::now()),
            ))
            .execute(&mut conn)
            .await?;

        Ok(categories.find(category_id).get_result(&mut conn).await?)
    }

    pub async fn has_non_deleted_transactions(
        &self,
        category_id: Uuid,
    ) -> Result<bool, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(dsl::select(dsl::exists(
            transactions.filter(
                transaction_fields::category_id
                    .eq(category_id)
                    .and(transaction_fields::is_deleted.eq(false)),
            ),
        ))
        .get_result(&mut conn)
        .await?)
    }

    pub async fn soft_delete_category(&self, category_id: Uuid) -> Result<(), DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        dsl::update(categories.find(category_id))
            .set((
                category_fields::is_deleted.eq(true),
                category_fields::modified_timestamp.eq(SystemTime::now()),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Cascade step for user deletion. Only rows not yet flagged are touched,
    /// which makes re-running the cascade a no-op.
    pub async fn soft_delete_all_for_user(&self, user_id: Uuid) -> Result<usize, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(dsl::update(
            categories.filter(
                category_fields::user_id
                    .eq(user_id)
                    .and(category_fields::is_deleted.eq(false)),
            ),
        )
        .set((
            category_fields::is_deleted.eq(true),
            category_fields::modified_timestamp.eq(SystemTime::now()),
        ))
        .execute(&mut conn)
        .await?)
    }

    /// Staff listing. Soft-deleted rows are included; `filter_user` narrows
    /// to one owner.
    pub async fn list_all(
        &self,
        filter_user: Option<Uuid>,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<Category>, i64), DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        let (total, page_items) = match filter_user {
            Some(owner) => {
                let total = categories
                    .filter(category_fields::user_id.eq(owner))
                    .count()
                    .get_result::<i64>(&mut conn)
                    .await?;

                let page_items = categories
                    .filter(category_fields::user_id.eq(owner))
                    .order(category_fields::created_timestamp.asc())
                    .limit(i64::from(per_page))
                    .offset(i64::from(per_page) * i64::from(page.saturating_sub(1)))
                    .load::<Category>(&mut conn)
                    .await?;

                (total, page_items)
            }
            None => {
                let total = categories.count().get_result::<i64>(&mut conn).await?;

                let page_items = categories
                    .order(category_fields::created_timestamp.asc())
                    .limit(i64::from(per_page))
                    .offset(i64::from(per_page) * i64::from(page.saturating_sub(1)))
                    .load::<Category>(&mut conn)
                    .await?;

                (total, page_items)
            }
        };

        Ok((page_items, total))
    }

    /// Listing for a regular user: their own non-deleted categories plus the
    /// predefined set.
    pub async fn list_visible_to(
        &self,
        user_id: Uuid,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<Category>, i64), DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        let visible = category_fields::is_deleted.eq(false).and(
            category_fields::user_id
                .eq(user_id)
                .or(category_fields::is_predefined.eq(true)),
        );

        let total = categories
            .filter(visible)
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        let page_items = categories
            .filter(visible)
            .order(category_fields::created_timestamp.asc())
            .limit(i64::from(per_page))
            .offset(i64::from(per_page) * i64::from(page.saturating_sub(1)))
            .load::<Category>(&mut conn)
            .await?;

        Ok((page_items, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    use crate::db::test_utils;
    use crate::models::transaction::TransactionType;

    fn dao() -> Dao {
        Dao::new(test_utils::db_async_pool())
    }

    #[tokio::test]
    async fn test_create_and_visible_name_uniqueness() {
        let dao = dao();
        let user = test_utils::insert_user(false, true).await;
        let staff = test_utils::insert_user(true, true).await;

        let own = dao
            .create_category(user.id, "Groceries", false)
            .await
            .unwrap();
        assert!(!own.is_predefined);

        assert!(dao
            .visible_name_exists(user.id, "Groceries", None)
            .await
            .unwrap());
        assert!(!dao
            .visible_name_exists(user.id, "Rent", None)
            .await
            .unwrap());

        // A predefined category is visible to every user
        dao.create_category(staff.id, "Utilities", true)
            .await
            .unwrap();
        assert!(dao
            .visible_name_exists(user.id, "Utilities", None)
            .await
            .unwrap());

        // The row itself is excluded when renaming in place
        assert!(!dao
            .visible_name_exists(user.id, "Groceries", Some(own.id))
            .await
            .unwrap());

        test_utils::delete_user(user.id).await;
        test_utils::delete_user(staff.id).await;
    }

    #[tokio::test]
    async fn test_delete_refused_while_transactions_reference_category() {
        let dao = dao();
        let user = test_utils::insert_user(false, true).await;

        let category_id = test_utils::insert_category(user.id, "Travel", false).await;
        let amount = BigDecimal::from_str("25.50").unwrap();
        let transaction_id =
            test_utils::insert_transaction(user.id, category_id, TransactionType::Debit, &amount)
                .await;

        assert!(dao
            .has_non_deleted_transactions(category_id)
            .await
            .unwrap());

        // Soft-deleting the transaction frees the category
        let transaction_dao =
            crate::db::transaction::Dao::new(test_utils::db_async_pool());
        transaction_dao
            .soft_delete_transaction(transaction_id)
            .await
            .unwrap();

        assert!(!dao
            .has_non_deleted_transactions(category_id)
            .await
            .unwrap());

        dao.soft_delete_category(category_id).await.unwrap();
        let reloaded = dao
            .get_category_by_id(category_id)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.is_deleted);

        test_utils::delete_user(user.id).await;
    }

    #[tokio::test]
    async fn test_cascade_soft_delete_is_idempotent() {
        let dao = dao();
        let user = test_utils::insert_user(false, true).await;

        test_utils::insert_category(user.id, "One", false).await;
        test_utils::insert_category(user.id, "Two", false).await;

        let first_run = dao.soft_delete_all_for_user(user.id).await.unwrap();
        assert_eq!(first_run, 2);

        let second_run = dao.soft_delete_all_for_user(user.id).await.unwrap();
        assert_eq!(second_run, 0);

        test_utils::delete_user(user.id).await;
    }

    #[tokio::test]
    async fn test_visible_listing_excludes_deleted_and_foreign() {
        let dao = dao();
        let user = test_utils::insert_user(false, true).await;
        let other = test_utils::insert_user(false, true).await;
        let staff = test_utils::insert_user(true, true).await;

        let own_id = test_utils::insert_category(user.id, "Mine", false).await;
        test_utils::insert_category(other.id, "Theirs", false).await;
        test_utils::insert_category(staff.id, "Shared", true).await;

        let deleted_id = test_utils::insert_category(user.id, "Gone", false).await;
        dao.soft_delete_category(deleted_id).await.unwrap();

        let (page_items, _) = dao.list_visible_to(user.id, 1, 100).await.unwrap();
        let names = page_items
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>();

        assert!(names.contains(&"Mine"));
        assert!(names.contains(&"Shared"));
        assert!(!names.contains(&"Theirs"));
        assert!(!names.contains(&"Gone"));

        // Staff listing narrowed to one user includes the soft-deleted row
        let (staff_items, staff_total) = dao.list_all(Some(user.id), 1, 100).await.unwrap();
        assert_eq!(staff_total, 2);
        assert!(staff_items.iter().any(|c| c.id == own_id));
        assert!(staff_items.iter().any(|c| c.id == deleted_id));

        test_utils::delete_user(user.id).await;
        test_utils::delete_user(other.id).await;
        test_utils::delete_user(staff.id).await;
    }
}
