pub mod account;
pub mod coupon;
pub mod ledger_transaction;
pub mod payment_transaction;
pub mod render_job;
pub mod stats;
pub mod token_package;

pub use payment_transaction::{NewPaymentTransaction, PaymentCompletion, PaymentCredit};
pub use render_job::NewRenderJob;
pub use stats::{AccountSummary, ServiceStats};
