use std::collections::HashMap;

use archrender_types::{Account, PaymentStatus, TransactionKind};
use diesel::{
    dsl::{count_star, sql},
    expression::SqlLiteral,
    prelude::*,
    sql_types::{BigInt, Nullable},
};
use serde::Serialize;

use crate::db::{DbResult, PooledConnection, models::account, schema::*};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub total_accounts: i64,
    pub total_tokens_purchased: i64,
    pub total_tokens_used: i64,
    pub total_renders: i64,
    /// Sum of completed payment amounts, in minor currency units
    pub total_revenue_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    #[serde(flatten)]
    pub account: Account,
    pub tokens_purchased: i64,
    pub tokens_used: i64,
    pub render_count: i64,
    pub total_spent_cents: i64,
}

#[derive(Default)]
struct Totals {
    tokens_purchased: i64,
    tokens_used: i64,
    render_count: i64,
    spent_cents: i64,
}

/// `SUM(amount)` as BIGINT; Postgres would otherwise widen it to NUMERIC.
fn sum_amount() -> SqlLiteral<BigInt> {
    sql::<BigInt>("CAST(SUM(amount) AS BIGINT)")
}

fn total_amount() -> SqlLiteral<Nullable<BigInt>> {
    sql::<Nullable<BigInt>>("CAST(SUM(amount) AS BIGINT)")
}

fn totals_by_account(conn: &mut PooledConnection) -> QueryResult<HashMap<i32, Totals>> {
    let mut totals = HashMap::<i32, Totals>::new();

    let ledger = ledger_transactions::table
        .filter(ledger_transactions::kind.eq_any([
            TransactionKind::Purchase.as_str(),
            TransactionKind::Usage.as_str(),
        ]))
        .group_by((ledger_transactions::account_id, ledger_transactions::kind))
        .select((
            ledger_transactions::account_id,
            ledger_transactions::kind,
            sum_amount(),
        ))
        .load::<(i32, String, i64)>(conn)?;
    for (account_id, kind, amount) in ledger {
        let entry = totals.entry(account_id).or_default();
        if kind == TransactionKind::Purchase.as_str() {
            entry.tokens_purchased = amount;
        } else {
            entry.tokens_used = -amount;
        }
    }

    let renders = render_jobs::table
        .group_by(render_jobs::account_id)
        .select((render_jobs::account_id, count_star()))
        .load::<(i32, i64)>(conn)?;
    for (account_id, count) in renders {
        totals.entry(account_id).or_default().render_count = count;
    }

    let payments = payment_transactions::table
        .filter(payment_transactions::status.eq(PaymentStatus::Completed.as_str()))
        .group_by(payment_transactions::account_id)
        .select((payment_transactions::account_id, sum_amount()))
        .load::<(i32, i64)>(conn)?;
    for (account_id, amount) in payments {
        totals.entry(account_id).or_default().spent_cents = amount;
    }

    Ok(totals)
}

fn ledger_total(conn: &mut PooledConnection, kind: TransactionKind) -> QueryResult<i64> {
    let total = ledger_transactions::table
        .filter(ledger_transactions::kind.eq(kind.as_str()))
        .select(total_amount())
        .first::<Option<i64>>(conn)?;
    Ok(total.unwrap_or(0))
}

pub fn service_stats(conn: &mut PooledConnection) -> QueryResult<ServiceStats> {
    let total_accounts = accounts::table.count().get_result::<i64>(conn)?;
    let total_renders = render_jobs::table.count().get_result::<i64>(conn)?;
    let total_revenue_cents = payment_transactions::table
        .filter(payment_transactions::status.eq(PaymentStatus::Completed.as_str()))
        .select(total_amount())
        .first::<Option<i64>>(conn)?
        .unwrap_or(0);

    Ok(ServiceStats {
        total_accounts,
        total_tokens_purchased: ledger_total(conn, TransactionKind::Purchase)?,
        total_tokens_used: -ledger_total(conn, TransactionKind::Usage)?,
        total_renders,
        total_revenue_cents,
    })
}

pub fn account_summaries(conn: &mut PooledConnection) -> DbResult<Vec<AccountSummary>> {
    let mut totals = totals_by_account(conn)?;
    let summaries = account::list(conn)?
        .into_iter()
        .map(|account| {
            let t = totals.remove(&account.id).unwrap_or_default();
            AccountSummary {
                account,
                tokens_purchased: t.tokens_purchased,
                tokens_used: t.tokens_used,
                render_count: t.render_count,
                total_spent_cents: t.spent_cents,
            }
        })
        .collect();
    Ok(summaries)
}
