use outlay_common::token::auth_token::{AuthToken, AuthTokenClaims, AuthTokenType};
use outlay_common::token::{DecodedToken, Token, TokenError};

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use futures::future;
use std::marker::PhantomData;

use crate::env;
use crate::middleware::{into_actix_error_res, TokenLocation};

pub trait RequestAuthTokenType {
    fn token_name() -> &'static str;
    fn token_type() -> AuthTokenType;
}

pub struct Access {}
pub struct Refresh {}

impl RequestAuthTokenType for Access {
    fn token_name() -> &'static str {
        "Authorization"
    }
    fn token_type() -> AuthTokenType {
        AuthTokenType::Access
    }
}

impl RequestAuthTokenType for Refresh {
    fn token_name() -> &'static str {
        "Authorization"
    }
    fn token_type() -> AuthTokenType {
        AuthTokenType::Refresh
    }
}

type AuthDecodedToken = DecodedToken<<AuthToken as Token>::Claims, <AuthToken as Token>::Verifier>;

/// A structurally valid, signature-verified token. Possession is necessary
/// but not sufficient for access tokens; handlers still resolve the
/// signature against the ledger.
#[derive(Debug)]
pub struct VerifiedToken<T: RequestAuthTokenType, L: TokenLocation> {
    pub claims: AuthTokenClaims,
    pub signature: Vec<u8>,
    _marker: PhantomData<(T, L)>,
}

impl<T, L> FromRequest for VerifiedToken<T, L>
where
    T: RequestAuthTokenType,
    L: TokenLocation,
{
    type Error = crate::handlers::error::HttpErrorResponse;
    type Future = future::Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let decoded = match into_actix_error_res(get_and_decode_token::<T, L>(req)) {
            Ok(t) => t,
            Err(e) => return future::err(e),
        };

        let claims = match into_actix_error_res(verify_token(&decoded, T::token_type())) {
            Ok(c) => c,
            Err(e) => return future::err(e),
        };

        future::ok(VerifiedToken {
            claims,
            signature: decoded.signature,
            _marker: PhantomData,
        })
    }
}

#[inline]
fn get_and_decode_token<T, L>(req: &HttpRequest) -> Result<AuthDecodedToken, TokenError>
where
    T: RequestAuthTokenType,
    L: TokenLocation,
{
    let extracted = match L::get_from_request(req, T::token_name()) {
        Some(t) => t,
        None => return Err(TokenError::TokenMissing),
    };

    AuthToken::decode(extracted)
}

#[inline]
fn verify_token(
    decoded_token: &AuthDecodedToken,
    expected_type: AuthTokenType,
) -> Result<AuthTokenClaims, TokenError> {
    let claims = decoded_token.verify(&env::CONF.token_signing_key)?;

    if claims.token_type != expected_type {
        return Err(TokenError::WrongTokenType);
    }

    Ok(claims.clone())
}
