use bigdecimal::BigDecimal;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::SmallInt;
use diesel::{Insertable, Queryable};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::models::category::Category;
use crate::models::user::User;
use crate::schema::transactions;

#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl ToSql<SmallInt, Pg> for TransactionType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let value: i16 = match self {
            TransactionType::Credit => 0,
            TransactionType::Debit => 1,
        };

        <i16 as ToSql<SmallInt, Pg>>::to_sql(&value, &mut out.reborrow())
    }
}

impl FromSql<SmallInt, Pg> for TransactionType {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match <i16 as FromSql<SmallInt, Pg>>::from_sql(bytes)? {
            0 => Ok(TransactionType::Credit),
            1 => Ok(TransactionType::Debit),
            t => Err(format!("Unrecognized transaction type {t}").into()),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(TransactionType::Credit),
            "debit" => Ok(TransactionType::Debit),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Associations, Identifiable, Queryable)]
#[diesel(belongs_to(User, foreign_key = user_id))]
#[diesel(belongs_to(Category, foreign_key = category_id))]
#[diesel(table_name = transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: BigDecimal,
    pub transaction_timestamp: SystemTime,
    pub description: Option<String>,
    pub is_deleted: bool,

    pub created_timestamp: SystemTime,
    pub modified_timestamp: SystemTime,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = transactions)]
pub struct TransactionChangeset<'a> {
    pub category_id: Option<Uuid>,
    pub amount: Option<&'a BigDecimal>,
    pub transaction_timestamp: Option<SystemTime>,
    pub description: Option<&'a str>,
    pub modified_timestamp: SystemTime,
}

#[derive(Clone, Debug, Insertable)]
#[diesel(table_name = transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewTransaction<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: &'a BigDecimal,
    pub transaction_timestamp: SystemTime,
    pub description: Option<&'a str>,
    pub is_deleted: bool,

    pub created_timestamp: SystemTime,
    pub modified_timestamp: SystemTime,
}
