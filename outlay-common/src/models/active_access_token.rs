use diesel::{Insertable, Queryable};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::models::user::User;
use crate::schema::active_access_tokens;

#[derive(Clone, Debug, Serialize, Deserialize, Associations, Identifiable, Queryable)]
#[diesel(belongs_to(User, foreign_key = user_id))]
#[diesel(table_name = active_access_tokens)]
#[diesel(primary_key(token_signature))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ActiveAccessToken {
    pub token_signature: Vec<u8>,
    pub user_id: Uuid,
    pub created_timestamp: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = active_access_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewActiveAccessToken<'a> {
    pub token_signature: &'a [u8],
    pub user_id: Uuid,
    pub created_timestamp: SystemTime,
}
