use diesel_async::pooled_connection::bb8::Pool as AsyncPool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use std::fmt;

pub mod auth;
pub mod category;
pub mod job_queue;
pub mod transaction;
pub mod user;

pub type DbAsyncPool = AsyncPool<AsyncPgConnection>;
pub type DbAsyncConnection =
    bb8::PooledConnection<'static, AsyncDieselConnectionManager<AsyncPgConnection>>;

pub async fn create_db_async_pool(database_uri: &str, max_db_connections: u32) -> DbAsyncPool {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_uri);
    AsyncPool::builder()
        .max_size(max_db_connections)
        .build(config)
        .await
        .expect("Failed to create async DB pool")
}

#[derive(Debug)]
pub enum DaoError {
    DbAsyncPoolFailure(String),
    QueryFailure(diesel::result::Error),
    WontRunQuery, // This error indicates that the DAO refuses to run a query
}

impl std::error::Error for DaoError {}

impl fmt::Display for DaoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaoError::DbAsyncPoolFailure(e) => {
                write!(f, "DaoError: Failed to obtain async DB connection: {e}")
            }
            DaoError::QueryFailure(e) => {
                write!(f, "DaoError: Query failed: {e}")
            }
            DaoError::WontRunQuery => {
                write!(f, "DaoError: DAO will not run query")
            }
        }
    }
}

impl DaoError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            DaoError::QueryFailure(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ))
        )
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<bb8::RunError<E>> for DaoError {
    fn from(error: bb8::RunError<E>) -> Self {
        DaoError::DbAsyncPoolFailure(error.to_string())
    }
}

impl From<diesel::result::Error> for DaoError {
    fn from(error: diesel::result::Error) -> Self {
        DaoError::QueryFailure(error)
    }
}

#[cfg(test)]
pub mod test_utils {
    use once_cell::sync::Lazy;
    use std::time::SystemTime;
    use uuid::Uuid;

    use bigdecimal::BigDecimal;
    use diesel::{dsl, ExpressionMethods, QueryDsl};
    use diesel_async::RunQueryDsl;

    use crate::db::{create_db_async_pool, DbAsyncConnection, DbAsyncPool};

    use crate::models::category::NewCategory;
    use crate::models::transaction::{NewTransaction, TransactionType};
    use crate::models::user::{NewUser, User};
    use crate::schema::users as user_fields;
    use crate::schema::users::dsl::users;
    use crate::threadrand::SecureRng;

    const DB_USERNAME_VAR: &str = "OUTLAY_DB_USERNAME";
    const DB_PASSWORD_VAR: &str = "OUTLAY_DB_PASSWORD";
    const DB_HOSTNAME_VAR: &str = "OUTLAY_DB_HOSTNAME";
    const DB_PORT_VAR: &str = "OUTLAY_DB_PORT";
    const DB_NAME_VAR: &str = "OUTLAY_DB_NAME";
    const DB_MAX_CONNECTIONS_VAR: &str = "OUTLAY_DB_MAX_CONNECTIONS";

    pub static DB_ASYNC_POOL: Lazy<DbAsyncPool> = Lazy::new(|| {
        let username = env_or(DB_USERNAME_VAR, "postgres");
        let password = env_or(DB_PASSWORD_VAR, "postgres");
        let hostname = env_or(DB_HOSTNAME_VAR, "127.0.0.1");
        let port = env_or(DB_PORT_VAR, "5432");
        let db_name = env_or(DB_NAME_VAR, "outlay");

        let max_connections = env_or(DB_MAX_CONNECTIONS_VAR, "48")
            .parse()
            .expect("Invalid DB max connections");

        let db_uri = format!(
            "postgres://{}:{}@{}:{}/{}",
            username, password, hostname, port, db_name
        );

        // block_on works within async test contexts
        futures::executor::block_on(create_db_async_pool(&db_uri, max_connections))
    });

    pub fn db_async_pool() -> &'static DbAsyncPool {
        &DB_ASYNC_POOL
    }

    pub async fn db_async_conn() -> DbAsyncConnection {
        DB_ASYNC_POOL
            .get()
            .await
            .expect("Failed to obtain pooled DB connection for tests")
    }

    pub fn unique_username() -> String {
        format!("user_{}", SecureRng::next_u128())
    }

    pub fn unique_email() -> String {
        format!("db-test-{}@outlay.test", SecureRng::next_u128())
    }

    pub async fn insert_user(is_staff: bool, is_verified: bool) -> User {
        let user_id = Uuid::now_v7();
        let current_time = SystemTime::now();

        let username = unique_username();
        let email = unique_email();

        let new_user = NewUser {
            id: user_id,
            username: &username,
            email: &email,
            password_hash: "$argon2id$test-hash-placeholder",
            name: "Test User",
            is_staff,
            is_verified,
            is_deleted: false,

            created_timestamp: current_time,
            modified_timestamp: current_time,
        };

        let mut conn = db_async_conn().await;

        dsl::insert_into(users)
            .values(&new_user)
            .execute(&mut conn)
            .await
            .expect("Failed to insert test user");

        users
            .find(user_id)
            .get_result(&mut conn)
            .await
            .expect("Failed to load test user")
    }

    pub async fn insert_category(user_id: Uuid, name: &str, is_predefined: bool) -> Uuid {
        let category_id = Uuid::now_v7();
        let current_time = SystemTime::now();

        let new_category = NewCategory {
            id: category_id,
            user_id,
            name,
            is_predefined,
            is_deleted: false,

            created_timestamp: current_time,
            modified_timestamp: current_time,
        };

        let mut conn = db_async_conn().await;

        dsl::insert_into(crate::schema::categories::dsl::categories)
            .values(&new_category)
            .execute(&mut conn)
            .await
            .expect("Failed to insert test category");

        category_id
    }

    pub async fn insert_transaction(
        user_id: Uuid,
        category_id: Uuid,
        transaction_type: TransactionType,
        amount: &BigDecimal,
    ) -> Uuid {
        let transaction_id = Uuid::now_v7();
        let current_time = SystemTime::now();

        let new_transaction = NewTransaction {
            id: transaction_id,
            user_id,
            category_id,
            transaction_type,
            amount,
            transaction_timestamp: current_time,
            description: None,
            is_deleted: false,

            created_timestamp: current_time,
            modified_timestamp: current_time,
        };

        let mut conn = db_async_conn().await;

        dsl::insert_into(crate::schema::transactions::dsl::transactions)
            .values(&new_transaction)
            .execute(&mut conn)
            .await
            .expect("Failed to insert test transaction");

        transaction_id
    }

    /// Hard-deletes a test user and everything hanging off it. Only tests may
    /// do this; the public contract has no hard delete.
    pub async fn delete_user(user_id: Uuid) {
        let mut conn = db_async_conn().await;

        let _ = diesel::delete(
            crate::schema::transactions::dsl::transactions
                .filter(crate::schema::transactions::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await;

        let _ = diesel::delete(
            crate::schema::categories::dsl::categories
                .filter(crate::schema::categories::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await;

        let _ = diesel::delete(
            crate::schema::active_access_tokens::dsl::active_access_tokens
                .filter(crate::schema::active_access_tokens::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await;

        let _ = diesel::delete(users.filter(user_fields::id.eq(user_id)))
            .execute(&mut conn)
            .await;
    }

    fn env_or(key: &str, default: &str) -> String {
        std::env::var(key).unwrap_or_else(|_| String::from(default))
    }
}
