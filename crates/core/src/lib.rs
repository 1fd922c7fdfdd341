//! Core service for archrender: the token ledger, render job lifecycle,
//! checkout sessions and webhook reconciliation, plus the HTTP API that
//! exposes them.

pub mod admin;
pub mod api;
pub mod checkout;
pub mod config;
pub mod db;
pub mod error;
pub mod render;
pub mod renderer;
pub mod storage;
pub mod webhook;

pub use api::{AppState, create_router, start_server};
pub use config::AppConfig;
pub use error::{ServiceError, ServiceResult};
