use std::fmt;
use std::str::FromStr;

#[derive(Debug)]
pub enum PasswordError {
    HashFailure(String),
    InvalidHash(String),
}

impl std::error::Error for PasswordError {}

impl fmt::Display for PasswordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordError::HashFailure(e) => {
                write!(f, "PasswordError: Failed to hash password: {e}")
            }
            PasswordError::InvalidHash(e) => {
                write!(f, "PasswordError: Stored hash is invalid: {e}")
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct HashParams {
    pub salt_length: u32,
    pub hash_length: u32,
    pub iterations: u32,
    pub mem_cost_kib: u32,
    pub threads: u32,
}

/// Argon2id with a server-side secret. Hashing is CPU-bound; callers on an
/// async executor must offload to a blocking thread.
pub fn hash_password(
    password: &str,
    params: &HashParams,
    hashing_key: &[u8],
) -> Result<String, PasswordError> {
    let hash = argon2_kdf::Hasher::default()
        .algorithm(argon2_kdf::Algorithm::Argon2id)
        .salt_length(params.salt_length)
        .hash_length(params.hash_length)
        .iterations(params.iterations)
        .memory_cost_kib(params.mem_cost_kib)
        .threads(params.threads)
        .secret(argon2_kdf::Secret::using(hashing_key))
        .hash(password.as_bytes())
        .map_err(|e| PasswordError::HashFailure(e.to_string()))?;

    Ok(hash.to_string())
}

pub fn verify_password(
    password: &str,
    password_hash: &str,
    hashing_key: &[u8],
) -> Result<bool, PasswordError> {
    let hash = argon2_kdf::Hash::from_str(password_hash)
        .map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    Ok(hash.verify_with_secret(
        password.as_bytes(),
        argon2_kdf::Secret::using(hashing_key),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: [u8; 32] = [7; 32];

    fn test_params() -> HashParams {
        HashParams {
            salt_length: 16,
            hash_length: 32,
            iterations: 2,
            mem_cost_kib: 1024,
            threads: 1,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("c0rrect-h0rse!", &test_params(), &TEST_KEY).unwrap();

        assert!(verify_password("c0rrect-h0rse!", &hash, &TEST_KEY).unwrap());
        assert!(!verify_password("wrong-h0rse!", &hash, &TEST_KEY).unwrap());
    }

    #[test]
    fn test_verify_fails_with_wrong_key() {
        let hash = hash_password("c0rrect-h0rse!", &test_params(), &TEST_KEY).unwrap();

        assert!(!verify_password("c0rrect-h0rse!", &hash, &[8; 32]).unwrap());
    }

    #[test]
    fn test_last_set_password_wins() {
        let first = hash_password("first-passw0rd!", &test_params(), &TEST_KEY).unwrap();
        let second = hash_password("second-passw0rd!", &test_params(), &TEST_KEY).unwrap();

        assert!(!verify_password("first-passw0rd!", &second, &TEST_KEY).unwrap());
        assert!(verify_password("second-passw0rd!", &second, &TEST_KEY).unwrap());
        assert!(verify_password("first-passw0rd!", &first, &TEST_KEY).unwrap());
    }

    #[test]
    fn test_invalid_stored_hash_is_an_error() {
        assert!(matches!(
            verify_password("whatever1!", "not-an-argon2-hash", &TEST_KEY),
            Err(PasswordError::InvalidHash(_))
        ));
    }
}
