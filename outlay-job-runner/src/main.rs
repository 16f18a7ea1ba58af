use outlay_common::db::create_db_async_pool;
use outlay_common::email::senders::{MockSender, SmtpRelay};
use outlay_common::email::SendEmail;

use flexi_logger::{Age, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming, WriteMode};
use std::sync::Arc;
use zeroize::Zeroizing;

mod env;
mod jobs;
mod runner;

#[cfg(test)]
mod test_utils;

use runner::Worker;

fn main() {
    let db_uri = Zeroizing::new(format!(
        "postgres://{}:{}@{}:{}/{}",
        env::CONF.db_username,
        env::CONF.db_password,
        env::CONF.db_hostname,
        env::CONF.db_port,
        env::CONF.db_name,
    ));

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(env::CONF.worker_threads)
        .max_blocking_threads(env::CONF.max_blocking_threads)
        .enable_all()
        .build()
        .expect("Failed to launch asynchronous runtime")
        .block_on(async move {
            Logger::try_with_str(&env::CONF.log_level)
                .expect(
                    "Invalid log level. Options: ERROR, WARN, INFO, DEBUG, TRACE. \
                     Example: `info, my::critical::module=trace`",
                )
                .log_to_file(FileSpec::default().directory("./logs"))
                .rotate(
                    Criterion::Age(Age::Day),
                    Naming::Timestamps,
                    Cleanup::KeepLogAndCompressedFiles(60, 365),
                )
                .cleanup_in_background_thread(true)
                .duplicate_to_stdout(Duplicate::All)
                .write_mode(WriteMode::BufferAndFlush)
                .format(|writer, now, record| {
                    write!(
                        writer,
                        "{:5} | {} | {}:{} | {}",
                        record.level(),
                        now.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
                        record.module_path().unwrap_or("<unknown>"),
                        record.line().unwrap_or(0),
                        record.args()
                    )
                })
                .use_utc()
                .start()
                .expect("Failed to start logger");

            log::info!("Connecting to database...");
            let db_async_pool =
                create_db_async_pool(&db_uri, env::CONF.db_max_connections).await;
            log::info!("Successfully connected to database");

            let email_sender: Box<dyn SendEmail> = if env::CONF.email_enabled {
                log::info!("Connecting to SMTP relay...");

                let relay = SmtpRelay::with_credentials(
                    &env::CONF.smtp_username,
                    &env::CONF.smtp_key,
                    &env::CONF.smtp_address,
                    env::CONF.max_smtp_connections,
                    env::CONF.smtp_idle_timeout,
                )
                .expect("Failed to connect to SMTP relay");

                match relay.test_connection().await {
                    Ok(true) => (),
                    Ok(false) => panic!("Failed to connect to SMTP relay"),
                    Err(e) => panic!("Failed to connect to SMTP relay: {e}"),
                }

                log::info!("Successfully connected to SMTP relay");

                Box::new(relay)
            } else {
                log::info!("Emails are disabled. Using mock sender.");
                Box::new(MockSender::new())
            };

            let worker = Worker::new(
                db_async_pool,
                Arc::new(email_sender),
                env::CONF.poll_frequency,
                env::CONF.job_batch_size,
            );

            worker.run().await
        });
}
