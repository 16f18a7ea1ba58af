use outlay_common::db::job_queue::{Dao as JobQueueDao, MAX_JOB_ATTEMPTS};
use outlay_common::db::DbAsyncPool;
use outlay_common::email::SendEmail;
use outlay_common::models::queued_job::QueuedJob;

use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::jobs::{self, JobError};

pub struct Worker {
    db_async_pool: DbAsyncPool,
    email_sender: Arc<Box<dyn SendEmail>>,
    poll_frequency: Duration,
    batch_size: i64,
}

impl Worker {
    pub fn new(
        db_async_pool: DbAsyncPool,
        email_sender: Arc<Box<dyn SendEmail>>,
        poll_frequency: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            db_async_pool,
            email_sender,
            poll_frequency,
            batch_size,
        }
    }

    pub async fn run(&self) -> ! {
        log::info!(
            "Job worker started; polling every {} seconds",
            self.poll_frequency.as_secs()
        );

        loop {
            match self.run_pending_once().await {
                Ok(executed) => {
                    if executed > 0 {
                        log::info!("Executed {executed} jobs");
                        // Drain the backlog before sleeping again
                        continue;
                    }
                }
                Err(e) => {
                    log::error!("Failed to poll job queue: {e}");
                }
            }

            time::sleep(self.poll_frequency).await;
        }
    }

    /// Claims one batch of due jobs and runs them to completion. Returns how
    /// many jobs were executed (successfully or not).
    pub async fn run_pending_once(&self) -> Result<usize, JobError> {
        let job_dao = JobQueueDao::new(&self.db_async_pool);

        let claimed = job_dao.claim_due_jobs(self.batch_size).await?;
        let claimed_count = claimed.len();

        for job in claimed {
            self.run_job(&job_dao, job).await;
        }

        Ok(claimed_count)
    }

    /// Job outcomes never propagate to the request that enqueued them; a job
    /// that keeps failing is eventually abandoned and only the logs know.
    async fn run_job(&self, job_dao: &JobQueueDao, job: QueuedJob) {
        if job.attempts > MAX_JOB_ATTEMPTS {
            log::error!(
                "Abandoning job {} ({}) after {} attempts",
                job.id,
                job.job_type,
                job.attempts - 1,
            );

            if let Err(e) = job_dao.delete_job(job.id).await {
                log::error!("Failed to delete abandoned job {}: {e}", job.id);
            }

            return;
        }

        let payload = match jobs::decode_payload(&job.payload) {
            Ok(p) => p,
            Err(e) => {
                log::error!("Abandoning job {} ({}): {e}", job.id, job.job_type);

                if let Err(e) = job_dao.delete_job(job.id).await {
                    log::error!("Failed to delete abandoned job {}: {e}", job.id);
                }

                return;
            }
        };

        match jobs::execute_payload(payload, &self.db_async_pool, &**self.email_sender).await {
            Ok(()) => {
                if let Err(e) = job_dao.delete_job(job.id).await {
                    // The lease makes the job due again later; idempotence
                    // makes the re-run harmless
                    log::error!("Failed to delete finished job {}: {e}", job.id);
                }
            }
            Err(e) if e.is_permanent() => {
                log::error!("Abandoning job {} ({}): {e}", job.id, job.job_type);

                if let Err(e) = job_dao.delete_job(job.id).await {
                    log::error!("Failed to delete abandoned job {}: {e}", job.id);
                }
            }
            Err(e) => {
                // The row stays leased until its backoff elapses, then a
                // worker picks it up again
                log::error!(
                    "Job {} ({}) failed on attempt {}: {e}",
                    job.id,
                    job.job_type,
                    job.attempts,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bigdecimal::BigDecimal;
    use std::time::SystemTime;

    use outlay_common::db;
    use outlay_common::models::queued_job::JobPayload;
    use outlay_common::models::transaction::TransactionType;

    use crate::env;
    use crate::test_utils;

    fn worker() -> Worker {
        Worker::new(
            env::testing::DB_ASYNC_POOL.clone(),
            env::testing::EMAIL_SENDER.clone(),
            Duration::from_secs(1),
            100,
        )
    }

    #[tokio::test]
    async fn test_worker_executes_cascade_and_email_jobs() {
        let pool = &*env::testing::DB_ASYNC_POOL;
        let worker = worker();

        let user = test_utils::insert_user(pool).await;

        let category_dao = db::category::Dao::new(pool);
        let category = category_dao
            .create_category(user.id, "Queued away", false)
            .await
            .unwrap();

        let transaction_dao = db::transaction::Dao::new(pool);
        transaction_dao
            .create_transaction(
                user.id,
                category.id,
                TransactionType::Credit,
                &BigDecimal::from(3),
                SystemTime::now(),
                None,
            )
            .await
            .unwrap();

        let job_dao = db::job_queue::Dao::new(pool);
        let cascade_job_id = job_dao
            .enqueue(&JobPayload::CascadeDeleteUser { user_id: user.id })
            .await
            .unwrap();
        let email_job_id = job_dao
            .enqueue(&JobPayload::SendVerificationEmail {
                user_email: user.email.clone(),
                verification_url: String::from("https://example.com/verify/abc"),
            })
            .await
            .unwrap();

        worker.run_pending_once().await.unwrap();

        // Both rows leave the queue and the cascade takes effect
        assert!(test_utils::wait_until_job_gone(pool, cascade_job_id).await);
        assert!(test_utils::wait_until_job_gone(pool, email_job_id).await);

        let category = category_dao
            .get_category_by_id(category.id)
            .await
            .unwrap()
            .unwrap();
        assert!(category.is_deleted);

        test_utils::delete_user(pool, user.id).await;
    }

    #[tokio::test]
    async fn test_exhausted_jobs_are_abandoned() {
        let pool = &*env::testing::DB_ASYNC_POOL;
        let worker = worker();

        let job_dao = db::job_queue::Dao::new(pool);
        let job_id = job_dao
            .enqueue(&JobPayload::CascadeDeleteUser {
                user_id: uuid::Uuid::now_v7(),
            })
            .await
            .unwrap();

        // Simulate a job that has burned through its retries
        test_utils::force_job_due(pool, job_id, MAX_JOB_ATTEMPTS).await;

        worker.run_pending_once().await.unwrap();

        assert!(test_utils::wait_until_job_gone(pool, job_id).await);
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_abandoned_immediately() {
        let pool = &*env::testing::DB_ASYNC_POOL;
        let worker = worker();

        let job_id = test_utils::insert_raw_job(pool, "send_verification_email", "{not-json").await;

        worker.run_pending_once().await.unwrap();

        assert!(test_utils::wait_until_job_gone(pool, job_id).await);
    }
}
