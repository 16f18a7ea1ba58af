use diesel::{dsl, BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::RunQueryDsl;
use std::time::SystemTime;
use uuid::Uuid;

use crate::db::{DaoError, DbAsyncPool};
use crate::models::active_access_token::NewActiveAccessToken;
use crate::models::user::User;
use crate::schema::active_access_tokens as token_fields;
use crate::schema::active_access_tokens::dsl::active_access_tokens;
use crate::schema::users::dsl::users;

pub struct Dao {
    db_async_pool: DbAsyncPool,
}

impl Dao {
    pub fn new(db_async_pool: &DbAsyncPool) -> Self {
        Self {
            db_async_pool: db_async_pool.clone(),
        }
    }

    /// Records an issued access token in the revocation ledger. Only the HMAC
    /// signature is stored; the claims are already inside the token itself.
    pub async fn save_access_token(
        &self,
        token_signature: &[u8],
        user_id: Uuid,
    ) -> Result<(), DaoError> {
        let new_token = NewActiveAccessToken {
            token_signature,
            user_id,
            created_timestamp: SystemTime::now(),
        };

        let mut conn = self.db_async_pool.get().await?;

        dsl::insert_into(active_access_tokens)
            .values(&new_token)
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    /// Resolves a presented token to its user. Absence of the ledger row is
    /// equivalent to revocation, regardless of the token's signature.
    pub async fn get_user_by_access_token_signature(
        &self,
        token_signature: &[u8],
    ) -> Result<Option<User>, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(active_access_tokens
            .inner_join(users)
            .filter(token_fields::token_signature.eq(token_signature))
            .select(crate::schema::users::all_columns)
            .get_result::<User>(&mut conn)
            .await
            .optional()?)
    }

    pub async fn delete_access_token(&self, token_signature: &[u8]) -> Result<(), DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        diesel::delete(
            active_access_tokens.filter(token_fields::token_signature.eq(token_signature)),
        )
        .execute(&mut conn)
        .await?;

        Ok(())
    }

    pub async fn delete_all_access_tokens_for_user(&self, user_id: Uuid) -> Result<usize, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(
            diesel::delete(active_access_tokens.filter(token_fields::user_id.eq(user_id)))
                .execute(&mut conn)
                .await?,
        )
    }

    /// Revokes everything except the token authenticating the current
    /// request, so a password change does not log the caller out.
    pub async fn delete_all_access_tokens_except(
        &self,
        user_id: Uuid,
        kept_token_signature: &[u8],
    ) -> Result<usize, DaoError> {
        let mut conn = self.db_async_pool.get().await?;

        Ok(diesel::delete(
            active_access_tokens.filter(
                token_fields::user_id
                    .eq(user_id)
                    .and(token_fields::token_signature.ne(kept_token_signature)),
            ),
        )
        .execute(&mut conn)
        .await?)
    }
}
