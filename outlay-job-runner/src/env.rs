use lettre::message::Mailbox;
use once_cell::sync::Lazy;
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroize;

pub static CONF: Lazy<Config> = Lazy::new(|| Config::from_env().expect("Failed to load config"));

const DB_USERNAME_VAR: &str = "OUTLAY_DB_USERNAME";
const DB_PASSWORD_VAR: &str = "OUTLAY_DB_PASSWORD";
const DB_HOSTNAME_VAR: &str = "OUTLAY_DB_HOSTNAME";
const DB_PORT_VAR: &str = "OUTLAY_DB_PORT";
const DB_NAME_VAR: &str = "OUTLAY_DB_NAME";
const DB_MAX_CONNECTIONS_VAR: &str = "OUTLAY_DB_MAX_CONNECTIONS";

const EMAIL_ENABLED_VAR: &str = "OUTLAY_EMAIL_ENABLED";
const EMAIL_FROM_ADDR_VAR: &str = "OUTLAY_EMAIL_FROM_ADDR";
const EMAIL_REPLY_TO_ADDR_VAR: &str = "OUTLAY_EMAIL_REPLY_TO_ADDR";
const SMTP_USERNAME_VAR: &str = "OUTLAY_SMTP_USERNAME";
const SMTP_KEY_VAR: &str = "OUTLAY_SMTP_KEY";
const SMTP_ADDRESS_VAR: &str = "OUTLAY_SMTP_ADDRESS";
const MAX_SMTP_CONNECTIONS_VAR: &str = "OUTLAY_MAX_SMTP_CONNECTIONS";
const SMTP_IDLE_TIMEOUT_SECS_VAR: &str = "OUTLAY_SMTP_IDLE_TIMEOUT_SECS";

const POLL_FREQUENCY_SECS_VAR: &str = "OUTLAY_JOB_POLL_FREQUENCY_SECS";
const JOB_BATCH_SIZE_VAR: &str = "OUTLAY_JOB_BATCH_SIZE";
const WORKER_THREADS_VAR: &str = "OUTLAY_JOB_WORKER_THREADS";
const MAX_BLOCKING_THREADS_VAR: &str = "OUTLAY_JOB_MAX_BLOCKING_THREADS";

const VERIFICATION_TOKEN_LIFETIME_MINS_VAR: &str = "OUTLAY_VERIFICATION_TOKEN_LIFETIME_MINS";
const PASSWORD_RESET_TOKEN_LIFETIME_MINS_VAR: &str = "OUTLAY_PASSWORD_RESET_TOKEN_LIFETIME_MINS";
const EMAIL_CHANGE_OTP_LIFETIME_MINS_VAR: &str = "OUTLAY_EMAIL_CHANGE_OTP_LIFETIME_MINS";
const STAFF_EMAIL_CHANGE_TOKEN_LIFETIME_HOURS_VAR: &str =
    "OUTLAY_STAFF_EMAIL_CHANGE_TOKEN_LIFETIME_HOURS";

const LOG_LEVEL_VAR: &str = "OUTLAY_LOG_LEVEL";

#[derive(Zeroize)]
pub struct ConfigInner {
    pub db_username: String,
    pub db_password: String,
    pub db_hostname: String,
    pub db_port: u16,
    pub db_name: String,
    #[zeroize(skip)]
    pub db_max_connections: u32,

    #[zeroize(skip)]
    pub email_enabled: bool,
    #[zeroize(skip)]
    pub email_from_address: Mailbox,
    #[zeroize(skip)]
    pub email_reply_to_address: Mailbox,
    pub smtp_username: String,
    pub smtp_key: String,
    pub smtp_address: String,
    #[zeroize(skip)]
    pub max_smtp_connections: u32,
    #[zeroize(skip)]
    pub smtp_idle_timeout: Duration,

    #[zeroize(skip)]
    pub poll_frequency: Duration,
    #[zeroize(skip)]
    pub job_batch_size: i64,
    #[zeroize(skip)]
    pub worker_threads: usize,
    #[zeroize(skip)]
    pub max_blocking_threads: usize,

    #[zeroize(skip)]
    pub verification_token_lifetime: Duration,
    #[zeroize(skip)]
    pub password_reset_token_lifetime: Duration,
    #[zeroize(skip)]
    pub email_change_otp_lifetime: Duration,
    #[zeroize(skip)]
    pub staff_email_change_token_lifetime: Duration,

    #[zeroize(skip)]
    pub log_level: String,
}

pub struct Config {
    inner: UnsafeCell<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        // Safe as long as `unsafe Config::zeroize()` hasn't been called
        unsafe { &*self.inner.get() }
    }
}

// Safe to be shared across threads as long as `unsafe Config::zeroize()` hasn't been called
unsafe impl Sync for Config {}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let email_enabled = if cfg!(test) {
            false
        } else {
            env_var_or(EMAIL_ENABLED_VAR, false)
        };

        let email_from_address: Mailbox =
            env_var_or(EMAIL_FROM_ADDR_VAR, String::from("Outlay <no-reply@outlay.app>"))
                .parse()
                .map_err(|_| ConfigError::InvalidVar(EMAIL_FROM_ADDR_VAR))?;
        let email_reply_to_address: Mailbox =
            env_var_or(EMAIL_REPLY_TO_ADDR_VAR, String::from("Outlay <support@outlay.app>"))
                .parse()
                .map_err(|_| ConfigError::InvalidVar(EMAIL_REPLY_TO_ADDR_VAR))?;

        let inner = ConfigInner {
            db_username: env_var_or(DB_USERNAME_VAR, String::from("postgres")),
            db_password: env_var_or(DB_PASSWORD_VAR, String::from("postgres")),
            db_hostname: env_var_or(DB_HOSTNAME_VAR, String::from("127.0.0.1")),
            db_port: env_var_or(DB_PORT_VAR, 5432),
            db_name: env_var_or(DB_NAME_VAR, String::from("outlay")),
            db_max_connections: env_var_or(DB_MAX_CONNECTIONS_VAR, 24),

            email_enabled,
            email_from_address,
            email_reply_to_address,
            smtp_username: env_var_or(SMTP_USERNAME_VAR, String::new()),
            smtp_key: env_var_or(SMTP_KEY_VAR, String::new()),
            smtp_address: env_var_or(SMTP_ADDRESS_VAR, String::new()),
            max_smtp_connections: env_var_or(MAX_SMTP_CONNECTIONS_VAR, 16),
            smtp_idle_timeout: Duration::from_secs(env_var_or(SMTP_IDLE_TIMEOUT_SECS_VAR, 25)),

            poll_frequency: Duration::from_secs(env_var_or(POLL_FREQUENCY_SECS_VAR, 5)),
            job_batch_size: env_var_or(JOB_BATCH_SIZE_VAR, 20),
            worker_threads: env_var_or(WORKER_THREADS_VAR, num_cpus::get()),
            max_blocking_threads: env_var_or(MAX_BLOCKING_THREADS_VAR, 16),

            verification_token_lifetime: Duration::from_secs(
                env_var_or(VERIFICATION_TOKEN_LIFETIME_MINS_VAR, 60) * 60,
            ),
            password_reset_token_lifetime: Duration::from_secs(
                env_var_or(PASSWORD_RESET_TOKEN_LIFETIME_MINS_VAR, 15) * 60,
            ),
            email_change_otp_lifetime: Duration::from_secs(
                env_var_or(EMAIL_CHANGE_OTP_LIFETIME_MINS_VAR, 5) * 60,
            ),
            staff_email_change_token_lifetime: Duration::from_secs(
                env_var_or(STAFF_EMAIL_CHANGE_TOKEN_LIFETIME_HOURS_VAR, 12) * 3600,
            ),

            log_level: env_var_or(LOG_LEVEL_VAR, String::from("info")),
        };

        Ok(Config {
            inner: UnsafeCell::new(inner),
        })
    }

    /// # Safety
    ///
    /// Safe only if the Config isn't being used by other threads or across an async
    /// boundary. Generally, this should only be used at the end of the main function once
    /// all threads have been joined.
    pub unsafe fn zeroize(&self) {
        unsafe {
            (*self.inner.get()).zeroize();
        }
    }
}

fn env_var_or<T: FromStr>(key: &'static str, default: T) -> T {
    let Ok(var) = std::env::var(key) else {
        return default;
    };

    var.parse().unwrap_or(default)
}

#[derive(Clone, Copy, Debug)]
pub enum ConfigError {
    InvalidVar(&'static str),
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVar(key) => write!(f, "Environment variable '{}' is invalid", key),
        }
    }
}

#[cfg(test)]
pub mod testing {
    use outlay_common::db::{create_db_async_pool, DbAsyncPool};
    use outlay_common::email::senders::MockSender;
    use outlay_common::email::SendEmail;

    use std::sync::Arc;

    use super::*;

    pub static DB_ASYNC_POOL: Lazy<DbAsyncPool> = Lazy::new(|| {
        let db_uri = format!(
            "postgres://{}:{}@{}:{}/{}",
            CONF.db_username, CONF.db_password, CONF.db_hostname, CONF.db_port, CONF.db_name,
        );

        futures::executor::block_on(create_db_async_pool(&db_uri, CONF.db_max_connections))
    });

    pub static EMAIL_SENDER: Lazy<Arc<Box<dyn SendEmail>>> =
        Lazy::new(|| Arc::new(Box::new(MockSender::new())));
}
