use crate::token::{Expiring, HmacSha256Verifier, Token, TokenError};

use base64::engine::general_purpose::URL_SAFE as b64_urlsafe;
use base64::Engine;
use hmac::Mac;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::HmacSha256;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum AuthTokenType {
    Access,
    Refresh,
}

impl std::convert::TryFrom<u8> for AuthTokenType {
    type Error = TokenError;

    fn try_from(value: u8) -> Result<Self, TokenError> {
        match value {
            0 => Ok(AuthTokenType::Access),
            1 => Ok(AuthTokenType::Refresh),
            _ => Err(TokenError::WrongTokenType),
        }
    }
}

impl std::convert::From<AuthTokenType> for u8 {
    fn from(token_type: AuthTokenType) -> Self {
        match token_type {
            AuthTokenType::Access => 0,
            AuthTokenType::Refresh => 1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthTokenClaims {
    #[serde(rename = "uid")]
    pub user_id: Uuid,
    #[serde(rename = "exp")]
    pub expiration: u64,
    #[serde(rename = "typ")]
    pub token_type: AuthTokenType,
    #[serde(rename = "fsh")]
    pub fresh: bool,
}

impl Expiring for AuthTokenClaims {
    fn expiration(&self) -> u64 {
        self.expiration
    }
}

/// A freshly signed token together with its raw HMAC signature. The ledger
/// stores only the signature bytes.
#[derive(Clone, Debug)]
pub struct SignedAuthToken {
    pub token: String,
    pub signature: Vec<u8>,
}

pub struct AuthToken {}

impl AuthToken {
    pub fn sign_new(claims: AuthTokenClaims, signing_key: &[u8]) -> SignedAuthToken {
        let mut token_unencoded =
            serde_json::to_vec(&claims).expect("Failed to transform claims into JSON");

        let mut mac = HmacSha256::new_from_slice(signing_key).expect("HMAC key should not fail");
        mac.update(&token_unencoded);
        let signature = Vec::from(mac.finalize().into_bytes().as_slice());
        token_unencoded.extend_from_slice(&signature);

        SignedAuthToken {
            token: b64_urlsafe.encode(&token_unencoded),
            signature,
        }
    }
}

impl Token for AuthToken {
    type Claims = AuthTokenClaims;
    type Verifier = HmacSha256Verifier;

    fn token_name() -> &'static str {
        "AuthToken"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[test]
    fn test_sign_and_verify() {
        let user_id = Uuid::now_v7();
        let exp = (SystemTime::now() + Duration::from_secs(10))
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let signing_key = [9; 64];

        let claims = AuthTokenClaims {
            user_id,
            expiration: exp,
            token_type: AuthTokenType::Access,
            fresh: true,
        };

        let signed = AuthToken::sign_new(claims, &signing_key);
        let t = AuthToken::decode(&signed.token).unwrap();

        // The decoded signature is the same one reported at signing time
        assert_eq!(t.signature, signed.signature);

        let claims = t.verify(&signing_key).unwrap();

        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.expiration, exp);
        assert_eq!(claims.token_type, AuthTokenType::Access);
        assert!(claims.fresh);
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let exp = (SystemTime::now() + Duration::from_secs(10))
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let signing_key = [9; 64];

        let claims = AuthTokenClaims {
            user_id: Uuid::now_v7(),
            expiration: exp,
            token_type: AuthTokenType::Refresh,
            fresh: false,
        };

        let token = AuthToken::sign_new(claims, &signing_key).token;
        let mut t = b64_urlsafe.decode(token).unwrap();

        // Make the signature invalid
        let last_byte = t.pop().unwrap();
        if last_byte == 0x01 {
            t.push(0x02);
        } else {
            t.push(0x01);
        }

        let t = b64_urlsafe.encode(t);

        assert!(AuthToken::decode(&t)
            .unwrap()
            .verify(&signing_key)
            .is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let exp = (SystemTime::now() - Duration::from_secs(10))
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let signing_key = [9; 64];

        let claims = AuthTokenClaims {
            user_id: Uuid::now_v7(),
            expiration: exp,
            token_type: AuthTokenType::Access,
            fresh: true,
        };

        let token = AuthToken::sign_new(claims, &signing_key).token;
        assert!(AuthToken::decode(&token)
            .unwrap()
            .verify(&signing_key)
            .is_err());
    }
}
