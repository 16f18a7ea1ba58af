use outlay_common::db::{self, DbAsyncPool};

use uuid::Uuid;

use crate::jobs::JobError;

/// Propagates a user soft-delete to everything hanging off the account:
/// ledger tokens are revoked, then categories and transactions are flagged.
/// Every step skips rows already in their target state, so the job can run
/// any number of times. A user that no longer matches anything is a
/// successful no-op.
pub async fn cascade_delete_user(
    db_async_pool: &DbAsyncPool,
    user_id: Uuid,
) -> Result<(), JobError> {
    let auth_dao = db::auth::Dao::new(db_async_pool);
    let revoked = auth_dao.delete_all_access_tokens_for_user(user_id).await?;

    let category_dao = db::category::Dao::new(db_async_pool);
    let categories_deleted = category_dao.soft_delete_all_for_user(user_id).await?;

    let transaction_dao = db::transaction::Dao::new(db_async_pool);
    let transactions_deleted = transaction_dao.soft_delete_all_for_user(user_id).await?;

    log::info!(
        "Cascade delete for user {user_id}: {revoked} tokens revoked, \
         {categories_deleted} categories and {transactions_deleted} transactions soft-deleted"
    );

    Ok(())
}
