use diesel::{dsl, ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::db::{DaoError, DbAsyncPool};
use crate::models::queued_job::{JobPayload, NewQueuedJob, QueuedJob};
use crate::schema::queued_jobs as job_fields;
use crate::schema::queued_jobs::dsl::queued_jobs;

/// A job is run once plus up to three retries before workers abandon it.
pub const MAX_JOB_ATTEMPTS: i32 = 4;

const RETRY_BACKOFF_BASE_SECS: u64 = 60;
const RETRY_BACKOFF_CAP_SECS: u64 = 240;

/// Exponential backoff for the next run after `attempts` executions have
/// started: 60s, 120s, 240s.
pub fn retry_backoff(attempts: i32) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 31) as u32;
    let secs = RETRY_BACKOFF_BASE_SECS.saturating_mul(1u64 << exponent);

    Duration::from_secs(secs.min(RETRY_BACKOFF_CAP_SECS))
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

    /// Fire-and-forget from the workflow's perspective; the workflow contract
    /// ends once the row is committed.
    pub async fn enqueue(&self, payload: &JobPayload) -> Result<Uuid, DaoError> {
        let job_id = Uuid::now_v7();
        let current_time = SystemTime::now();

        let encoded = serde_json::to_string(payload).map_err(|e| {
            log::error!("Failed to serialize job payload: {e}");
            DaoError::WontRunQuery
        })?;

        let new_job = NewQueuedJob {
            id: job_id,
            job_type: payload.job_type(),
            payload: &encoded,
            attempts: 0,
            available_timestamp: current_time,
            created_timestamp: current_time,
        };

        let mut conn = self.db_async_pool.get().await?;

        dsl::insert_into(queued_jobs)
            .values(&new_job)
            .execute(&mut conn)
            .await?;

        Ok(job_id)
    }

    /// Claims up to `max_jobs` due jobs. Each claim leases the row by bumping
    /// `attempts` and pushing `available_timestamp` out by the retry backoff,
    /// so a crashed worker's claim expires on its own. `SKIP LOCKED` keeps
    /// concurrent workers from claiming the same rows. Returned jobs carry
    /// the bumped attempt count.
    pub async fn claim_due_jobs(&self, max_jobs: i64) -> Result<Vec<QueuedJob>, DaoError> {
        let mut db_connection = self.db_async_pool.get().await?;

        let claimed = db_connection
            .build_transaction()
            .run::<_, diesel::result::Error, _>(|conn| {
                Box::pin(async move {
                    let now = SystemTime::now();

                    let due = queued_jobs
                        .filter(job_fields::available_timestamp.le(now))
                        .order(job_fields::available_timestamp.asc())
                        .limit(max_jobs)
                        .for_update()
                        .skip_locked()
                        .load::<QueuedJob>(conn)
                        .await?;

                    let mut claimed = Vec::with_capacity(due.len());

                    for mut job in due {
                        job.attempts += 1;
                        job.available_timestamp = now + retry_backoff(job.attempts);

                        dsl::update(queued_jobs.find(job.id))
                            .set((
                                job_fields::attempts.eq(job.attempts),
                                job_fields::available_timestamp.eq(job.available_timestamp),
                            ))
                            .execute(conn)
                            .await?;

                        claimed.push(job);
                    }

                    Ok(claimed)
                })
            })
            .await?;

        Ok(claimed)
    }

    /// Removes a finished (or abandoned) job from the queue.
    pub async fn delete_job(&self, job_id: Uuid) -> Result<(), DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        diesel::delete(queued_jobs.find(job_id))
            .execute(&mut conn)
            .await?;

        Ok(())
    }
}
