use diesel::{dsl, BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::RunQueryDsl;
use std::time::SystemTime;
use uuid::Uuid;

use crate::db::{DaoError, DbAsyncPool};
use crate::models::user::{NewUser, User};
use crate::schema::users as user_fields;
use crate::schema::users::dsl::users;

pub struct Dao {
    db_async_pool: DbAsyncPool,
}

impl Dao {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        name: &str,
        is_staff: bool,
    ) -> Result<User, DaoError> {
        let current_time = SystemTime::now();
        let user_id = Uuid::now_v7();

        let email_lowercase = email.to_lowercase();

        let new_user = NewUser {
            id: user_id,
            username,
            email: &email_lowercase,
            password_hash,
            name,
            is_staff,
            is_verified: false,
            is_deleted: false,

            created_timestamp: current_time,
            modified_timestamp: current_time,
        };

        let mut conn = self.db_async_pool.get().await?;

        dsl::insert_into(users)
            .values(&new_user)
            .execute(&mut conn)
            .await?;

        Ok(users.find(user_id).get_result(&mut conn).await?)
    }

    /// Uniqueness is checked across every row, soft-deleted ones included, so
    /// a released username or email can never be reused.
    pub async fn username_in_use(&self, username: &str) -> Result<bool, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(dsl::select(dsl::exists(
            users.filter(user_fields::username.eq(username)),
        ))
        .get_result(&mut conn)
        .await?)
    }

    pub async fn email_in_use(&self, email: &str) -> Result<bool, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(dsl::select(dsl::exists(
            users.filter(user_fields::email.eq(email.to_lowercase())),
        ))
        .get_result(&mut conn)
        .await?)
    }

    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(users
            .find(user_id)
            .get_result(&mut conn)
            .await
            .optional()?)
    }

    pub async fn get_non_deleted_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(users
            .filter(user_fields::email.eq(email.to_lowercase()))
            .filter(user_fields::is_deleted.eq(false))
            .get_result(&mut conn)
            .await
            .optional()?)
    }

    pub async fn get_non_deleted_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(users
            .filter(user_fields::username.eq(username))
            .filter(user_fields::is_deleted.eq(false))
            .get_result(&mut conn)
            .await
            .optional()?)
    }

    pub async fn set_user_verified(&self, user_id: Uuid) -> Result<(), DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        dsl::update(users.find(user_id))
            .set((
                user_fields::is_verified.eq(true),
                user_fields::modified_timestamp.eq(SystemTime::now()),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn update_user_profile(
        &self,
        user_id: Uuid,
        username: Option<&str>,
        name: Option<&str>,
    ) -> Result<User, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        match (username, name) {
            (Some(username), Some(name)) => {
                dsl::update(users.find(user_id))
                    .set((
                        user_fields::username.eq(username),
                        user_fields::name.eq(name),
                        user_fields::modified_timestamp.eq(SystemTime::now()),
                    ))
                    .execute(&mut conn)
                    .await?;
            }
            (Some(username), None) => {
                dsl::update(users.find(user_id))
                    .set((
                        user_fields::username.eq(username),
                        user_fields::modified_timestamp.eq(SystemTime::now()),
                    ))
                    .execute(&mut conn)
                    .await?;
            }
            (None, Some(name)) => {
                dsl::update(users.find(user_id))
                    .set((
                        user_fields::name.eq(name),
                        user_fields::modified_timestamp.eq(SystemTime::now()),
                    ))
                    .execute(&mut conn)
                    .await?;
            }
            (None, None) => (),
        }

        Ok(users.find(user_id).get_result(&mut conn).await?)
    }

    pub async fn update_user_email(&self, user_id: Uuid, email: &str) -> Result<(), DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        dsl::update(users.find(user_id))
            .set((
                user_fields::email.eq(email.to_lowercase()),
                user_fields::modified_timestamp.eq(SystemTime::now()),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        dsl::update(users.find(user_id))
            .set((
                user_fields::password_hash.eq(password_hash),
                user_fields::modified_timestamp.eq(SystemTime::now()),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Soft delete. The row stays behind so uniqueness and referential
    /// integrity hold; no hard delete exists in this DAO.
    pub async fn soft_delete_user(&self, user_id: Uuid) -> Result<(), DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        dsl::update(users.find(user_id))
            .set((
                user_fields::is_deleted.eq(true),
                user_fields::modified_timestamp.eq(SystemTime::now()),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn list_non_deleted_users(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<User>, i64), DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        let total = users
            .filter(user_fields::is_deleted.eq(false))
            .count()
            .get_result::<i64>(&mut conn)
            .await?;

        let page_items = users
            .filter(user_fields::is_deleted.eq(false))
            .order(user_fields::created_timestamp.desc())
            .limit(i64::from(per_page))
            .offset(i64::from(per_page) * i64::from(page.saturating_sub(1)))
            .load::<User>(&mut conn)
            .await?;

        Ok((page_items, total))
    }

    pub async fn is_username_taken_by_other(
        &self,
        username: &str,
        user_id: Uuid,
    ) -> Result<bool, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(dsl::select(dsl::exists(
            users.filter(
                user_fields::username
                    .eq(username)
                    .and(user_fields::id.ne(user_id)),
            ),
        ))
        .get_result(&mut conn)
        .await?)
    }
}
