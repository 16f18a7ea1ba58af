pub mod auth;

use outlay_common::token::TokenError;

use actix_web::HttpRequest;

use crate::handlers::error::HttpErrorResponse;

/// Where a token is pulled from on an inbound request. The only location this
/// API uses is the `Authorization: Bearer <token>` header, but the extractors
/// stay generic over it.
pub trait TokenLocation {
    fn get_from_request<'a>(req: &'a HttpRequest, key: &str) -> Option<&'a str>;
}

pub struct FromBearerHeader {}

impl TokenLocation for FromBearerHeader {
    fn get_from_request<'a>(req: &'a HttpRequest, key: &str) -> Option<&'a str> {
        let header = req.headers().get(key)?;
        let header = header.to_str().ok()?;

        header.strip_prefix("Bearer ")
    }
}

#[inline(always)]
fn into_actix_error_res<T>(result: Result<T, TokenError>) -> Result<T, HttpErrorResponse> {
    match result {
        Ok(t) => Ok(t),
        Err(TokenError::TokenInvalid) => Err(HttpErrorResponse::BadToken(String::from(
            "Token is invalid",
        ))),
        Err(TokenError::TokenExpired) => Err(HttpErrorResponse::TokenExpired(String::from(
            "Token is expired",
        ))),
        Err(TokenError::TokenMissing) => Err(HttpErrorResponse::TokenMissing(String::from(
            "Token is missing",
        ))),
        Err(TokenError::WrongTokenType) => Err(HttpErrorResponse::WrongTokenType(String::from(
            "Incorrect token type",
        ))),
    }
}
