use archrender_types::{ParseEnumError, PaymentStatus, PaymentTransaction, now_millis};
use diesel::prelude::*;
use tracing::{debug, info};

use crate::db::{DbResult, PooledConnection, models::coupon, models::ledger_transaction, schema::*};

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = payment_transactions)]
pub struct PaymentTransactionModel {
    pub id: i32,
    pub account_id: i32,
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub package_id: Option<i32>,
    pub token_amount: i64,
    pub status: String,
    pub payment_method: Option<String>,
    pub coupon_code: Option<String>,
    pub discount_amount: i64,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl TryFrom<PaymentTransactionModel> for PaymentTransaction {
    type Error = ParseEnumError;

    fn try_from(model: PaymentTransactionModel) -> Result<Self, Self::Error> {
        Ok(PaymentTransaction {
            id: model.id,
            account_id: model.account_id,
            session_id: model.session_id,
            payment_intent_id: model.payment_intent_id,
            amount: model.amount,
            currency: model.currency,
            package_id: model.package_id,
            token_amount: model.token_amount,
            status: model.status.parse()?,
            payment_method: model.payment_method,
            coupon_code: model.coupon_code,
            discount_amount: model.discount_amount,
            created_at: model.created_at,
            completed_at: model.completed_at,
        })
    }
}

/// A checkout session that has been created but not yet reconciled.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payment_transactions)]
pub struct NewPaymentTransaction {
    pub account_id: i32,
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub package_id: Option<i32>,
    pub token_amount: i64,
    pub status: String,
    pub coupon_code: Option<String>,
    pub discount_amount: i64,
    pub created_at: i64,
}

impl NewPaymentTransaction {
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        account_id: i32,
        session_id: String,
        payment_intent_id: Option<String>,
        amount: i64,
        currency: &str,
        package_id: i32,
        token_amount: i64,
        coupon_code: Option<String>,
        discount_amount: i64,
    ) -> Self {
        Self {
            account_id,
            session_id,
            payment_intent_id,
            amount,
            currency: currency.to_lowercase(),
            package_id: (package_id > 0).then_some(package_id),
            token_amount,
            status: PaymentStatus::Pending.as_str().to_string(),
            coupon_code,
            discount_amount,
            created_at: now_millis(),
        }
    }

    pub fn insert(&self, conn: &mut PooledConnection) -> QueryResult<i32> {
        debug!(
            "Inserting pending payment {} for account {} ({} {})",
            self.session_id, self.account_id, self.amount, self.currency
        );
        diesel::insert_into(payment_transactions::table)
            .values(self)
            .returning(payment_transactions::id)
            .get_result(conn)
    }
}

/// What a successful payment credits, read back from the checkout session.
#[derive(Debug, Clone)]
pub struct PaymentCredit<'a> {
    pub account_id: i32,
    pub token_amount: i64,
    pub package_id: Option<i32>,
    pub price_in_cents: i64,
    pub payment_intent_id: Option<&'a str>,
    pub payment_method: Option<&'a str>,
    pub coupon_code: Option<&'a str>,
    pub description: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentCompletion {
    /// Tokens were credited; carries the account's new balance
    Credited { new_balance: i64 },
    /// The payment had already left `pending`; nothing changed
    NotPending(PaymentStatus),
    /// No payment transaction exists for the session
    UnknownSession,
}

#[derive(AsChangeset)]
#[diesel(table_name = payment_transactions)]
struct Completion<'a> {
    status: &'a str,
    payment_intent_id: Option<&'a str>,
    payment_method: Option<&'a str>,
    completed_at: i64,
}

/// Claim the pending row, credit the account and count the coupon use.
/// Must run inside a database transaction: a failed credit rolls the claim
/// back so the row is still `pending` for the caller to fail.
pub fn complete(
    conn: &mut PooledConnection,
    session_id: &str,
    credit: &PaymentCredit<'_>,
) -> DbResult<PaymentCompletion> {
    let claimed = diesel::update(
        payment_transactions::table
            .filter(payment_transactions::session_id.eq(session_id))
            .filter(payment_transactions::status.eq(PaymentStatus::Pending.as_str())),
    )
    .set(Completion {
        status: PaymentStatus::Completed.as_str(),
        payment_intent_id: credit.payment_intent_id,
        payment_method: credit.payment_method,
        completed_at: now_millis(),
    })
    .execute(conn)?;

    if claimed == 0 {
        return Ok(match find_by_session(conn, session_id)? {
            Some(payment) => PaymentCompletion::NotPending(payment.status),
            None => PaymentCompletion::UnknownSession,
        });
    }

    let new_balance = ledger_transaction::credit_purchase(conn, credit)?;

    if let Some(code) = credit.coupon_code {
        if !coupon::increment_usage(conn, code)? {
            debug!("Coupon {} used by session {} no longer exists", code, session_id);
        }
    }

    info!(
        "Payment {} completed: {} tokens credited to account {}",
        session_id, credit.token_amount, credit.account_id
    );
    Ok(PaymentCompletion::Credited { new_balance })
}

pub fn fail(conn: &mut PooledConnection, session_id: &str) -> QueryResult<bool> {
    let updated = diesel::update(
        payment_transactions::table
            .filter(payment_transactions::session_id.eq(session_id))
            .filter(payment_transactions::status.eq(PaymentStatus::Pending.as_str())),
    )
    .set((
        payment_transactions::status.eq(PaymentStatus::Failed.as_str()),
        payment_transactions::completed_at.eq(Some(now_millis())),
    ))
    .execute(conn)?;
    Ok(updated > 0)
}

pub fn find_by_session(
    conn: &mut PooledConnection,
    session_id: &str,
) -> DbResult<Option<PaymentTransaction>> {
    let model = payment_transactions::table
        .filter(payment_transactions::session_id.eq(session_id))
        .select(PaymentTransactionModel::as_select())
        .first(conn)
        .optional()?;
    Ok(model.map(PaymentTransaction::try_from).transpose()?)
}

pub fn list_by_account(
    conn: &mut PooledConnection,
    account_id: i32,
) -> DbResult<Vec<PaymentTransaction>> {
    let models = payment_transactions::table
        .filter(payment_transactions::account_id.eq(account_id))
        .order((
            payment_transactions::created_at.desc(),
            payment_transactions::id.desc(),
        ))
        .select(PaymentTransactionModel::as_select())
        .load(conn)?;
    Ok(models
        .into_iter()
        .map(PaymentTransaction::try_from)
        .collect::<Result<_, _>>()?)
}
