//! Ledger store: the only code that changes an account balance.
//!
//! Every balance change is a single conditional `UPDATE ... RETURNING` on the
//! account row followed by an append to `ledger_transactions`, executed inside
//! the caller's database transaction. The debit condition
//! (`token_balance >= amount`) is evaluated by the database against the
//! current row, so concurrent debits and credits on one account serialize on
//! that row and can never lose an update or overdraw.

use archrender_types::{
    LedgerTransaction, ParseEnumError, PaymentStatus, TransactionKind, now_millis,
};
use diesel::prelude::*;
use tracing::debug;

use super::PaymentCredit;
use crate::db::{DbError, DbResult, PooledConnection, schema::*};

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = ledger_transactions)]
pub struct LedgerTransactionModel {
    pub id: i32,
    pub account_id: i32,
    pub kind: String,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub package_id: Option<i32>,
    pub render_job_id: Option<i32>,
    pub price_in_cents: Option<i64>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    pub description: Option<String>,
    pub created_at: i64,
}

impl TryFrom<LedgerTransactionModel> for LedgerTransaction {
    type Error = ParseEnumError;

    fn try_from(model: LedgerTransactionModel) -> Result<Self, Self::Error> {
        Ok(LedgerTransaction {
            id: model.id,
            account_id: model.account_id,
            kind: model.kind.parse()?,
            amount: model.amount,
            balance_before: model.balance_before,
            balance_after: model.balance_after,
            package_id: model.package_id,
            render_job_id: model.render_job_id,
            price_in_cents: model.price_in_cents,
            payment_status: model
                .payment_status
                .as_deref()
                .map(str::parse::<PaymentStatus>)
                .transpose()?,
            payment_method: model.payment_method,
            description: model.description,
            created_at: model.created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = ledger_transactions)]
pub struct NewLedgerTransaction<'a> {
    pub account_id: i32,
    pub kind: &'a str,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub package_id: Option<i32>,
    pub render_job_id: Option<i32>,
    pub price_in_cents: Option<i64>,
    pub payment_status: Option<&'a str>,
    pub payment_method: Option<&'a str>,
    pub description: Option<&'a str>,
    pub created_at: i64,
}

impl NewLedgerTransaction<'_> {
    pub fn insert(&self, conn: &mut PooledConnection) -> QueryResult<usize> {
        debug!(
            "Appending {} ledger row for account {}: {:+} ({} -> {})",
            self.kind, self.account_id, self.amount, self.balance_before, self.balance_after
        );
        diesel::insert_into(ledger_transactions::table)
            .values(self)
            .execute(conn)
    }
}

fn current_balance(conn: &mut PooledConnection, account_id: i32) -> QueryResult<Option<i64>> {
    accounts::table
        .find(account_id)
        .select(accounts::token_balance)
        .first::<i64>(conn)
        .optional()
}

/// Subtract `amount` tokens and append a `usage` row. Returns the new balance.
pub fn debit(
    conn: &mut PooledConnection,
    account_id: i32,
    amount: i64,
    render_job_id: Option<i32>,
    description: Option<&str>,
) -> DbResult<i64> {
    let balance_after = diesel::update(
        accounts::table
            .filter(accounts::id.eq(account_id))
            .filter(accounts::token_balance.ge(amount)),
    )
    .set((
        accounts::token_balance.eq(accounts::token_balance - amount),
        accounts::updated_at.eq(now_millis()),
    ))
    .returning(accounts::token_balance)
    .get_result::<i64>(conn)
    .optional()?;

    let Some(balance_after) = balance_after else {
        return Err(match current_balance(conn, account_id)? {
            Some(balance) => DbError::InsufficientBalance {
                account_id,
                balance,
                requested: amount,
            },
            None => DbError::AccountNotFound(account_id),
        });
    };

    let default_description = render_job_id.map(|id| format!("Render #{}", id));
    NewLedgerTransaction {
        account_id,
        kind: TransactionKind::Usage.as_str(),
        amount: -amount,
        balance_before: balance_after + amount,
        balance_after,
        package_id: None,
        render_job_id,
        price_in_cents: None,
        payment_status: Some(PaymentStatus::Completed.as_str()),
        payment_method: None,
        description: description.or(default_description.as_deref()),
        created_at: now_millis(),
    }
    .insert(conn)?;

    Ok(balance_after)
}

/// Add `amount` tokens and append a row of `kind`. Returns the new balance.
pub fn credit(
    conn: &mut PooledConnection,
    account_id: i32,
    amount: i64,
    kind: TransactionKind,
    package_id: Option<i32>,
    price_in_cents: Option<i64>,
    description: Option<&str>,
) -> DbResult<i64> {
    apply_credit(
        conn,
        account_id,
        amount,
        kind,
        package_id,
        price_in_cents,
        None,
        description,
    )
}

/// Credit for a reconciled checkout; the ledger row records how it was paid.
pub fn credit_purchase(conn: &mut PooledConnection, purchase: &PaymentCredit<'_>) -> DbResult<i64> {
    apply_credit(
        conn,
        purchase.account_id,
        purchase.token_amount,
        TransactionKind::Purchase,
        purchase.package_id,
        Some(purchase.price_in_cents),
        purchase.payment_method,
        purchase.description,
    )
}

#[allow(clippy::too_many_arguments)]
fn apply_credit(
    conn: &mut PooledConnection,
    account_id: i32,
    amount: i64,
    kind: TransactionKind,
    package_id: Option<i32>,
    price_in_cents: Option<i64>,
    payment_method: Option<&str>,
    description: Option<&str>,
) -> DbResult<i64> {
    debug_assert!(kind.is_credit(), "credit called with a debit kind");

    let balance_after = diesel::update(accounts::table.find(account_id))
        .set((
            accounts::token_balance.eq(accounts::token_balance + amount),
            accounts::updated_at.eq(now_millis()),
        ))
        .returning(accounts::token_balance)
        .get_result::<i64>(conn)
        .optional()?
        .ok_or(DbError::AccountNotFound(account_id))?;

    let default_description = match kind {
        TransactionKind::Bonus => format!("Bonus of {} tokens", amount),
        TransactionKind::Refund => format!("Refund of {} tokens", amount),
        TransactionKind::Purchase | TransactionKind::Usage => {
            format!("Purchase of {} tokens", amount)
        }
    };
    NewLedgerTransaction {
        account_id,
        kind: kind.as_str(),
        amount,
        balance_before: balance_after - amount,
        balance_after,
        package_id,
        render_job_id: None,
        price_in_cents,
        payment_status: Some(PaymentStatus::Completed.as_str()),
        payment_method,
        description: Some(description.unwrap_or(&default_description)),
        created_at: now_millis(),
    }
    .insert(conn)?;

    Ok(balance_after)
}

pub fn list_by_account(
    conn: &mut PooledConnection,
    account_id: i32,
) -> DbResult<Vec<LedgerTransaction>> {
    let models = ledger_transactions::table
        .filter(ledger_transactions::account_id.eq(account_id))
        .order(ledger_transactions::id.desc())
        .select(LedgerTransactionModel::as_select())
        .load(conn)
        .map_err(DbError::ListLedgerError)?;
    Ok(models
        .into_iter()
        .map(LedgerTransaction::try_from)
        .collect::<Result<_, _>>()?)
}
