use archrender_types::{
    Account, Coupon, CouponSpec, LedgerTransaction, ParseEnumError, PaymentTransaction, RenderJob,
    RenderOutcome, RenderStatus, Role, TokenPackage, TokenPackageSpec, TransactionKind,
};
use diesel::{
    prelude::*,
    r2d2::{ConnectionManager, Pool},
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info};

pub mod models;
pub mod schema;

pub use models::{
    AccountSummary, NewPaymentTransaction, NewRenderJob, PaymentCompletion, ServiceStats,
};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./src/db/migrations");

#[cfg(feature = "sqlite")]
type DbConnection = diesel::sqlite::SqliteConnection;
#[cfg(feature = "postgres")]
type DbConnection = diesel::pg::PgConnection;

pub type PooledConnection = diesel::r2d2::PooledConnection<ConnectionManager<DbConnection>>;

pub type DbPool = Pool<ConnectionManager<DbConnection>>;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),
    #[error("Database migration error")]
    MigrationError(#[from] Box<dyn std::error::Error + Send + Sync>),
    #[error("Database query error: {0}")]
    QueryError(#[from] diesel::result::Error),
    #[error("Stored row could not be decoded: {0}")]
    InvalidRow(#[from] ParseEnumError),
    #[error("Account {0} not found")]
    AccountNotFound(i32),
    #[error("Account {account_id} has {balance} tokens, {requested} requested")]
    InsufficientBalance {
        account_id: i32,
        balance: i64,
        requested: i64,
    },
    #[error("Render job {0} not found")]
    RenderJobNotFound(i32),
    #[error("Render job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: i32,
        from: RenderStatus,
        to: RenderStatus,
    },
    #[error("Failed to insert payment transaction: {0}")]
    InsertPaymentError(diesel::result::Error),
    #[error("Failed to insert render job: {0}")]
    InsertRenderJobError(diesel::result::Error),
    #[error("Failed to list render jobs: {0}")]
    ListRenderJobsError(diesel::result::Error),
    #[error("Failed to list ledger transactions: {0}")]
    ListLedgerError(diesel::result::Error),
    #[error("Failed to list token packages: {0}")]
    ListPackagesError(diesel::result::Error),
}

fn run_migrations(conn: &mut PooledConnection) -> Result<(), DbError> {
    conn.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}

/// Applied to every pooled SQLite connection: writers wait on each other
/// instead of failing with `SQLITE_BUSY`.
#[cfg(feature = "sqlite")]
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas;

#[cfg(feature = "sqlite")]
impl diesel::r2d2::CustomizeConnection<DbConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut DbConnection) -> Result<(), diesel::r2d2::Error> {
        use diesel::connection::SimpleConnection;
        conn.batch_execute(
            "PRAGMA busy_timeout = 10000; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Owns the connection pool and exposes every persistent operation the
/// service needs. Methods are synchronous; each one checks a connection out
/// of the pool for its duration.
#[derive(Debug, Clone)]
pub struct DbManager {
    db_conn: DbPool,
}

impl DbManager {
    pub fn new(database_url: &str) -> DbResult<Self> {
        debug!("Establishing connection to database at {}", database_url);
        let manager = ConnectionManager::<DbConnection>::new(database_url);
        let builder = Pool::builder();
        #[cfg(feature = "sqlite")]
        let builder = builder.connection_customizer(Box::new(SqlitePragmas));
        let pool = builder
            .build(manager)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        let mut pooled_connection = pool
            .get()
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;

        debug!("Running database migrations...");
        run_migrations(&mut pooled_connection)?;
        info!("Database ready");

        Ok(Self { db_conn: pool })
    }

    fn conn(&self) -> DbResult<PooledConnection> {
        self.db_conn
            .get()
            .map_err(|e| DbError::ConnectionError(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Find the account for `external_id`, creating it with `initial_tokens`
    /// when it does not exist yet. Refreshes `last_signed_in` and profile
    /// fields on every call.
    pub fn ensure_account(
        &self,
        external_id: &str,
        email: Option<&str>,
        name: Option<&str>,
        initial_tokens: i64,
        role: Role,
    ) -> DbResult<Account> {
        let mut conn = self.conn()?;
        models::account::ensure(&mut conn, external_id, email, name, initial_tokens, role)
    }

    pub fn find_account(&self, account_id: i32) -> DbResult<Option<Account>> {
        let mut conn = self.conn()?;
        models::account::find(&mut conn, account_id)
    }

    pub fn get_account(&self, account_id: i32) -> DbResult<Account> {
        self.find_account(account_id)?
            .ok_or(DbError::AccountNotFound(account_id))
    }

    pub fn set_account_role(&self, account_id: i32, role: Role) -> DbResult<()> {
        let mut conn = self.conn()?;
        models::account::set_role(&mut conn, account_id, role)
    }

    pub fn list_accounts(&self) -> DbResult<Vec<Account>> {
        let mut conn = self.conn()?;
        models::account::list(&mut conn)
    }

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    /// Debit `amount` tokens and append a `usage` row. Fails with
    /// [`DbError::InsufficientBalance`] without touching the balance when
    /// the account cannot cover it.
    pub fn debit_tokens(
        &self,
        account_id: i32,
        amount: i64,
        render_job_id: Option<i32>,
        description: Option<&str>,
    ) -> DbResult<i64> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            models::ledger_transaction::debit(conn, account_id, amount, render_job_id, description)
        })
    }

    /// Credit `amount` tokens and append a row of `kind` (purchase or bonus).
    pub fn credit_tokens(
        &self,
        account_id: i32,
        amount: i64,
        kind: TransactionKind,
        package_id: Option<i32>,
        price_in_cents: Option<i64>,
        description: Option<&str>,
    ) -> DbResult<i64> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            models::ledger_transaction::credit(
                conn,
                account_id,
                amount,
                kind,
                package_id,
                price_in_cents,
                description,
            )
        })
    }

    /// Ledger rows for an account, newest first.
    pub fn list_ledger_transactions(&self, account_id: i32) -> DbResult<Vec<LedgerTransaction>> {
        let mut conn = self.conn()?;
        models::ledger_transaction::list_by_account(&mut conn, account_id)
    }

    // ------------------------------------------------------------------
    // Render jobs
    // ------------------------------------------------------------------

    pub fn create_render_job(&self, job: &NewRenderJob) -> DbResult<i32> {
        let mut conn = self.conn()?;
        job.insert(&mut conn).map_err(DbError::InsertRenderJobError)
    }

    /// Apply a status transition. Terminal jobs are never overwritten: the
    /// call fails with [`DbError::InvalidTransition`] instead.
    pub fn update_render_status(&self, job_id: i32, outcome: &RenderOutcome) -> DbResult<()> {
        let mut conn = self.conn()?;
        models::render_job::update_status(&mut conn, job_id, outcome)
    }

    pub fn find_render_job(&self, job_id: i32) -> DbResult<Option<RenderJob>> {
        let mut conn = self.conn()?;
        models::render_job::find(&mut conn, job_id)
    }

    /// Jobs owned by an account, newest first.
    pub fn list_render_jobs(&self, account_id: i32) -> DbResult<Vec<RenderJob>> {
        let mut conn = self.conn()?;
        models::render_job::list_by_account(&mut conn, account_id)
    }

    // ------------------------------------------------------------------
    // Token packages
    // ------------------------------------------------------------------

    /// Active packages ordered by display rank.
    pub fn list_active_packages(&self) -> DbResult<Vec<TokenPackage>> {
        let mut conn = self.conn()?;
        models::token_package::list_active(&mut conn).map_err(DbError::ListPackagesError)
    }

    pub fn find_package(&self, package_id: i32) -> DbResult<Option<TokenPackage>> {
        let mut conn = self.conn()?;
        Ok(models::token_package::find(&mut conn, package_id)?)
    }

    /// Insert or update a package keyed by name.
    pub fn upsert_package(&self, spec: &TokenPackageSpec) -> DbResult<i32> {
        let mut conn = self.conn()?;
        Ok(models::token_package::upsert(&mut conn, spec)?)
    }

    // ------------------------------------------------------------------
    // Coupons
    // ------------------------------------------------------------------

    /// Look up a coupon; `code` is normalized before matching.
    pub fn find_coupon(&self, code: &str) -> DbResult<Option<Coupon>> {
        let mut conn = self.conn()?;
        models::coupon::find_by_code(&mut conn, code)
    }

    /// Insert or update a coupon keyed by its normalized code. Existing usage
    /// counts are preserved.
    pub fn upsert_coupon(&self, spec: &CouponSpec) -> DbResult<i32> {
        let mut conn = self.conn()?;
        Ok(models::coupon::upsert(&mut conn, spec)?)
    }

    // ------------------------------------------------------------------
    // Payment transactions
    // ------------------------------------------------------------------

    pub fn insert_payment_transaction(&self, payment: &NewPaymentTransaction) -> DbResult<i32> {
        let mut conn = self.conn()?;
        payment
            .insert(&mut conn)
            .map_err(DbError::InsertPaymentError)
    }

    pub fn find_payment_by_session(&self, session_id: &str) -> DbResult<Option<PaymentTransaction>> {
        let mut conn = self.conn()?;
        models::payment_transaction::find_by_session(&mut conn, session_id)
    }

    /// Move a pending payment to `completed`, credit its tokens and count
    /// the coupon use, all in one database transaction. A payment that is no
    /// longer pending is left untouched and reported as such.
    pub fn complete_payment(
        &self,
        session_id: &str,
        credit: &models::PaymentCredit<'_>,
    ) -> DbResult<PaymentCompletion> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| models::payment_transaction::complete(conn, session_id, credit))
    }

    /// Mark a pending payment `failed`. Returns whether a row changed.
    pub fn fail_payment(&self, session_id: &str) -> DbResult<bool> {
        let mut conn = self.conn()?;
        Ok(models::payment_transaction::fail(&mut conn, session_id)?)
    }

    /// Payment transactions for an account, newest first.
    pub fn list_payments(&self, account_id: i32) -> DbResult<Vec<PaymentTransaction>> {
        let mut conn = self.conn()?;
        models::payment_transaction::list_by_account(&mut conn, account_id)
    }

    // ------------------------------------------------------------------
    // Admin statistics
    // ------------------------------------------------------------------

    pub fn service_stats(&self) -> DbResult<ServiceStats> {
        let mut conn = self.conn()?;
        Ok(models::stats::service_stats(&mut conn)?)
    }

    pub fn account_summaries(&self) -> DbResult<Vec<AccountSummary>> {
        let mut conn = self.conn()?;
        models::stats::account_summaries(&mut conn)
    }
}
