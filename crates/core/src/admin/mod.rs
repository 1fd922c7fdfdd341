//! Role-gated operator surface: service statistics, per-account summaries
//! and manual token grants.

use std::sync::Arc;

use archrender_types::{Account, Role, TransactionKind, is_admin};
use tracing::info;

use crate::{
    db::{AccountSummary, DbManager, ServiceStats},
    error::{ServiceError, ServiceResult},
};

#[derive(Clone)]
pub struct AdminService {
    db: Arc<DbManager>,
}

impl AdminService {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn authorize(caller: &Account) -> ServiceResult<()> {
        if is_admin(caller) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "Administrator role required".to_string(),
            ))
        }
    }

    pub fn stats(&self, caller: &Account) -> ServiceResult<ServiceStats> {
        Self::authorize(caller)?;
        Ok(self.db.service_stats()?)
    }

    pub fn account_summaries(&self, caller: &Account) -> ServiceResult<Vec<AccountSummary>> {
        Self::authorize(caller)?;
        Ok(self.db.account_summaries()?)
    }

    /// Credit `amount` free tokens to `account_id`. Returns the new balance.
    pub fn grant_bonus(
        &self,
        caller: &Account,
        account_id: i32,
        amount: i64,
        description: Option<&str>,
    ) -> ServiceResult<i64> {
        Self::authorize(caller)?;
        if amount <= 0 {
            return Err(ServiceError::InvalidInput(
                "Bonus amount must be positive".to_string(),
            ));
        }
        let balance = self.db.credit_tokens(
            account_id,
            amount,
            TransactionKind::Bonus,
            None,
            None,
            description,
        )?;
        info!(
            account_id,
            admin_id = caller.id,
            "Granted {} bonus tokens",
            amount
        );
        Ok(balance)
    }

    pub fn set_role(&self, caller: &Account, account_id: i32, role: Role) -> ServiceResult<Account> {
        Self::authorize(caller)?;
        self.db.set_account_role(account_id, role)?;
        info!(account_id, admin_id = caller.id, "Role set to {}", role);
        Ok(self.db.get_account(account_id)?)
    }
}
