use base64::engine::general_purpose::URL_SAFE_NO_PAD as b64_urlsafe;
use base64::Engine;
use rand::Rng;

use crate::threadrand::SecureRng;

pub struct Otp {}

impl Otp {
    pub fn generate(length: usize) -> String {
        let mut rng = SecureRng;
        (0..length)
            .map(|_| (b'0' + rng.gen_range(0..10)) as char)
            .collect()
    }

    pub fn are_equal(given: &str, saved: &str) -> bool {
        let given = given.as_bytes();
        let saved = saved.as_bytes();

        if given.len() != saved.len() {
            return false;
        }

        let mut otps_dont_match = 0u8;

        // Do bitwise comparison to prevent timing attacks
        for (i, saved_char) in saved.iter().enumerate() {
            unsafe {
                otps_dont_match |= saved_char ^ given.get_unchecked(i);
            }
        }

        otps_dont_match == 0
    }
}

/// Random URL-safe secret for single-use links (verification, password reset,
/// staff email change).
pub struct UrlSafeToken {}

impl UrlSafeToken {
    pub fn generate(byte_length: usize) -> String {
        let mut rng = SecureRng;
        let mut bytes = vec![0u8; byte_length];
        rng.fill(&mut bytes[..]);

        b64_urlsafe.encode(&bytes)
    }
}
