use outlay_common::db::{self, DbAsyncPool};
use outlay_common::models::queued_job::NewQueuedJob;
use outlay_common::models::user::User;
use outlay_common::schema::{active_access_tokens, categories, queued_jobs, transactions, users};
use outlay_common::threadrand::SecureRng;

use diesel::{dsl, ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

pub async fn insert_user(pool: &DbAsyncPool) -> User {
    let user_dao = db::user::Dao::new(pool);

    let username = format!("job_user_{}", SecureRng::next_u128());
    let email = format!("job-test-{}@outlay.test", SecureRng::next_u128());

    user_dao
        .create_user(&username, &email, "$argon2id$test-hash", "Job Test", false)
        .await
        .expect("Failed to create test user")
}

pub async fn delete_user(pool: &DbAsyncPool, user_id: Uuid) {
    let mut conn = pool.get().await.expect("Failed to obtain DB connection");

    let _ = diesel::delete(
        transactions::dsl::transactions.filter(transactions::user_id.eq(user_id)),
    )
    .execute(&mut conn)
    .await;
    let _ = diesel::delete(categories::dsl::categories.filter(categories::user_id.eq(user_id)))
        .execute(&mut conn)
        .await;
    let _ = diesel::delete(
        active_access_tokens::dsl::active_access_tokens
            .filter(active_access_tokens::user_id.eq(user_id)),
    )
    .execute(&mut conn)
    .await;
    let _ = diesel::delete(users::dsl::users.filter(users::id.eq(user_id)))
        .execute(&mut conn)
        .await;
}

/// Makes a leased job immediately claimable again with a chosen attempt
/// count.
pub async fn force_job_due(pool: &DbAsyncPool, job_id: Uuid, attempts: i32) {
    let mut conn = pool.get().await.expect("Failed to obtain DB connection");

    dsl::update(queued_jobs::dsl::queued_jobs.find(job_id))
        .set((
            queued_jobs::attempts.eq(attempts),
            queued_jobs::available_timestamp.eq(SystemTime::now() - Duration::from_secs(1)),
        ))
        .execute(&mut conn)
        .await
        .expect("Failed to update test job");
}

/// Polls until the job row disappears. Another test's worker may have
/// claimed the row and still be running it; a bounded wait keeps these
/// tests from racing each other.
pub async fn wait_until_job_gone(pool: &DbAsyncPool, job_id: Uuid) -> bool {
    for _ in 0..50 {
        if !job_exists(pool, job_id).await {
            return true;
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    false
}

pub async fn job_exists(pool: &DbAsyncPool, job_id: Uuid) -> bool {
    let mut conn = pool.get().await.expect("Failed to obtain DB connection");

    dsl::select(dsl::exists(queued_jobs::dsl::queued_jobs.find(job_id)))
        .get_result(&mut conn)
        .await
        .expect("Failed to query test job")
}

/// Inserts a queue row bypassing the typed enqueue path, for exercising the
/// worker against payloads it cannot decode.
pub async fn insert_raw_job(pool: &DbAsyncPool, job_type: &str, payload: &str) -> Uuid {
    let job_id = Uuid::now_v7();
    let current_time = SystemTime::now();

    let new_job = NewQueuedJob {
        id: job_id,
        job_type,
        payload,
        attempts: 0,
        available_timestamp: current_time,
        created_timestamp: current_time,
    };

    let mut conn = pool.get().await.expect("Failed to obtain DB connection");

    dsl::insert_into(queued_jobs::dsl::queued_jobs)
        .values(&new_job)
        .execute(&mut conn)
        .await
        .expect("Failed to insert raw test job");

    job_id
}
