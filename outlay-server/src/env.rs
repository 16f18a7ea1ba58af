use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use once_cell::sync::Lazy;
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;
use zeroize::{Zeroize, Zeroizing};

pub static CONF: Lazy<Config> = Lazy::new(|| Config::from_env().expect("Failed to load config"));

const DB_USERNAME_VAR: &str = "OUTLAY_DB_USERNAME";
const DB_PASSWORD_VAR: &str = "OUTLAY_DB_PASSWORD";
const DB_HOSTNAME_VAR: &str = "OUTLAY_DB_HOSTNAME";
const DB_PORT_VAR: &str = "OUTLAY_DB_PORT";
const DB_NAME_VAR: &str = "OUTLAY_DB_NAME";
const DB_MAX_CONNECTIONS_VAR: &str = "OUTLAY_DB_MAX_CONNECTIONS";

const REDIS_URI_VAR: &str = "OUTLAY_REDIS_URI";
const REDIS_MAX_CONNECTIONS_VAR: &str = "OUTLAY_REDIS_MAX_CONNECTIONS";

const HASHING_KEY_VAR: &str = "OUTLAY_HASHING_KEY_B64";
const TOKEN_SIGNING_KEY_VAR: &str = "OUTLAY_TOKEN_SIGNING_KEY_B64";

const HASH_LENGTH_VAR: &str = "OUTLAY_HASH_LENGTH";
const HASH_ITERATIONS_VAR: &str = "OUTLAY_HASH_ITERATIONS";
const HASH_MEM_COST_KIB_VAR: &str = "OUTLAY_HASH_MEM_COST_KIB";
const HASH_THREADS_VAR: &str = "OUTLAY_HASH_THREADS";
const HASH_SALT_LENGTH_VAR: &str = "OUTLAY_HASH_SALT_LENGTH";

const USER_VERIFICATION_URL_VAR: &str = "OUTLAY_USER_VERIFICATION_URL";
const PASSWORD_RESET_URL_VAR: &str = "OUTLAY_PASSWORD_RESET_URL";
const STAFF_EMAIL_CHANGE_URL_VAR: &str = "OUTLAY_STAFF_EMAIL_CHANGE_URL";

const ACCESS_TOKEN_LIFETIME_MINS_VAR: &str = "OUTLAY_ACCESS_TOKEN_LIFETIME_MINS";
const REFRESH_TOKEN_LIFETIME_DAYS_VAR: &str = "OUTLAY_REFRESH_TOKEN_LIFETIME_DAYS";
const VERIFICATION_TOKEN_LIFETIME_MINS_VAR: &str = "OUTLAY_VERIFICATION_TOKEN_LIFETIME_MINS";
const VERIFICATION_COOLDOWN_MINS_VAR: &str = "OUTLAY_VERIFICATION_COOLDOWN_MINS";
const PASSWORD_RESET_TOKEN_LIFETIME_MINS_VAR: &str = "OUTLAY_PASSWORD_RESET_TOKEN_LIFETIME_MINS";
const PASSWORD_RESET_COOLDOWN_MINS_VAR: &str = "OUTLAY_PASSWORD_RESET_COOLDOWN_MINS";
const EMAIL_CHANGE_OTP_LIFETIME_MINS_VAR: &str = "OUTLAY_EMAIL_CHANGE_OTP_LIFETIME_MINS";
const STAFF_EMAIL_CHANGE_TOKEN_LIFETIME_HOURS_VAR: &str =
    "OUTLAY_STAFF_EMAIL_CHANGE_TOKEN_LIFETIME_HOURS";
const STAFF_EMAIL_CHANGE_COOLDOWN_MINS_VAR: &str = "OUTLAY_STAFF_EMAIL_CHANGE_COOLDOWN_MINS";

const ACTIX_WORKER_COUNT_VAR: &str = "OUTLAY_ACTIX_WORKER_COUNT";
const LOG_LEVEL_VAR: &str = "OUTLAY_LOG_LEVEL";

const HASHING_KEY_SIZE: usize = 32;
const TOKEN_SIGNING_KEY_SIZE: usize = 64;

#[derive(Zeroize)]
pub struct ConfigInner {
    pub db_username: String,
    pub db_password: String,
    pub db_hostname: String,
    pub db_port: u16,
    pub db_name: String,
    #[zeroize(skip)]
    pub db_max_connections: u32,

    pub redis_uri: String,
    #[zeroize(skip)]
    pub redis_max_connections: usize,

    pub hashing_key: [u8; HASHING_KEY_SIZE],
    pub token_signing_key: [u8; TOKEN_SIGNING_KEY_SIZE],

    #[zeroize(skip)]
    pub hash_length: u32,
    #[zeroize(skip)]
    pub hash_iterations: u32,
    #[zeroize(skip)]
    pub hash_mem_cost_kib: u32,
    #[zeroize(skip)]
    pub hash_threads: u32,
    #[zeroize(skip)]
    pub hash_salt_length: u32,

    #[zeroize(skip)]
    pub user_verification_url: String,
    #[zeroize(skip)]
    pub password_reset_url: String,
    #[zeroize(skip)]
    pub staff_email_change_url: String,

    #[zeroize(skip)]
    pub access_token_lifetime: Duration,
    #[zeroize(skip)]
    pub refresh_token_lifetime: Duration,
    #[zeroize(skip)]
    pub verification_token_lifetime: Duration,
    #[zeroize(skip)]
    pub verification_cooldown: Duration,
    #[zeroize(skip)]
    pub password_reset_token_lifetime: Duration,
    #[zeroize(skip)]
    pub password_reset_cooldown: Duration,
    #[zeroize(skip)]
    pub email_change_otp_lifetime: Duration,
    #[zeroize(skip)]
    pub staff_email_change_token_lifetime: Duration,
    #[zeroize(skip)]
    pub staff_email_change_cooldown: Duration,

    #[zeroize(skip)]
    pub actix_worker_count: usize,

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
        let hashing_key = secret_key::<HASHING_KEY_SIZE>(HASHING_KEY_VAR)?;
        let token_signing_key = secret_key::<TOKEN_SIGNING_KEY_SIZE>(TOKEN_SIGNING_KEY_VAR)?;

        let inner = ConfigInner {
            db_username: env_var_or(DB_USERNAME_VAR, String::from("postgres")),
            db_password: env_var_or(DB_PASSWORD_VAR, String::from("postgres")),
            db_hostname: env_var_or(DB_HOSTNAME_VAR, String::from("127.0.0.1")),
            db_port: env_var_or(DB_PORT_VAR, 5432),
            db_name: env_var_or(DB_NAME_VAR, String::from("outlay")),
            db_max_connections: env_var_or(DB_MAX_CONNECTIONS_VAR, 48),

            redis_uri: env_var_or(REDIS_URI_VAR, String::from("redis://127.0.0.1:6379")),
            redis_max_connections: env_var_or(REDIS_MAX_CONNECTIONS_VAR, 48),

            hashing_key,
            token_signing_key,

            hash_length: env_var_or(HASH_LENGTH_VAR, 32),
            hash_iterations: env_var_or(HASH_ITERATIONS_VAR, 2),
            hash_mem_cost_kib: env_var_or(HASH_MEM_COST_KIB_VAR, 62500),
            hash_threads: env_var_or(HASH_THREADS_VAR, 2),
            hash_salt_length: env_var_or(HASH_SALT_LENGTH_VAR, 16),

            user_verification_url: env_var_or(
                USER_VERIFICATION_URL_VAR,
                String::from("http://127.0.0.1:9000/api/auth/verify"),
            ),
            password_reset_url: env_var_or(
                PASSWORD_RESET_URL_VAR,
                String::from("http://127.0.0.1:9000/api/auth/password-reset"),
            ),
            staff_email_change_url: env_var_or(
                STAFF_EMAIL_CHANGE_URL_VAR,
                String::from("http://127.0.0.1:9000/api/users/email/verify"),
            ),

            access_token_lifetime: Duration::from_secs(
                env_var_or(ACCESS_TOKEN_LIFETIME_MINS_VAR, 60) * 60,
            ),
            refresh_token_lifetime: Duration::from_secs(
                env_var_or(REFRESH_TOKEN_LIFETIME_DAYS_VAR, 30) * 86400,
            ),
            verification_token_lifetime: Duration::from_secs(
                env_var_or(VERIFICATION_TOKEN_LIFETIME_MINS_VAR, 60) * 60,
            ),
            verification_cooldown: Duration::from_secs(
                env_var_or(VERIFICATION_COOLDOWN_MINS_VAR, 10) * 60,
            ),
            password_reset_token_lifetime: Duration::from_secs(
                env_var_or(PASSWORD_RESET_TOKEN_LIFETIME_MINS_VAR, 15) * 60,
            ),
            password_reset_cooldown: Duration::from_secs(
                env_var_or(PASSWORD_RESET_COOLDOWN_MINS_VAR, 10) * 60,
            ),
            email_change_otp_lifetime: Duration::from_secs(
                env_var_or(EMAIL_CHANGE_OTP_LIFETIME_MINS_VAR, 5) * 60,
            ),
            staff_email_change_token_lifetime: Duration::from_secs(
                env_var_or(STAFF_EMAIL_CHANGE_TOKEN_LIFETIME_HOURS_VAR, 12) * 3600,
            ),
            staff_email_change_cooldown: Duration::from_secs(
                env_var_or(STAFF_EMAIL_CHANGE_COOLDOWN_MINS_VAR, 10) * 60,
            ),

            actix_worker_count: env_var_or(ACTIX_WORKER_COUNT_VAR, num_cpus::get()),

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

fn secret_key<const N: usize>(var_name: &'static str) -> Result<[u8; N], ConfigError> {
    // Tests run without deployment secrets
    if cfg!(test) {
        if std::env::var(var_name).is_err() {
            return Ok([7; N]);
        }
    }

    let encoded = env_var::<String>(var_name)?;
    let decoded = Zeroizing::new(
        b64.decode(encoded.as_bytes())
            .map_err(|_| ConfigError::InvalidVar(var_name))?,
    );

    decoded[..]
        .try_into()
        .map_err(|_| ConfigError::InvalidVar(var_name))
}

fn env_var<T: FromStr>(key: &'static str) -> Result<T, ConfigError> {
    let var = std::env::var(key).map_err(|_| ConfigError::MissingVar(key))?;
    let var: T = var.parse().map_err(|_| ConfigError::InvalidVar(key))?;
    Ok(var)
}

fn env_var_or<T: FromStr>(key: &'static str, default: T) -> T {
    let Ok(var) = std::env::var(key) else {
        return default;
    };

    var.parse().unwrap_or(default)
}

#[derive(Clone, Copy, Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar(&'static str),
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVar(key) => write!(f, "Missing environment variable '{}'", key),
            Self::InvalidVar(key) => write!(f, "Environment variable '{}' is invalid", key),
        }
    }
}
