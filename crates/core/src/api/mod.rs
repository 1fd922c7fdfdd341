pub mod admin;
pub mod extract;
pub mod files;
pub mod renders;
pub mod tokens;
pub mod webhooks;

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::DefaultBodyLimit,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    admin::AdminService,
    checkout::{CheckoutGateway, PaymentSessionManager, stripe::StripeCheckoutGateway},
    config::AppConfig,
    db::DbManager,
    error::ServiceError,
    render::RenderOrchestrator,
    renderer::{HttpRenderClient, RenderClient},
    storage::{FsObjectStore, ObjectStore},
    webhook::WebhookReconciler,
};

pub use extract::CurrentAccount;

/// Shared handles for every HTTP handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DbManager>,
    pub store: Arc<dyn ObjectStore>,
    pub renders: RenderOrchestrator,
    pub payments: PaymentSessionManager,
    pub webhooks: WebhookReconciler,
    pub admin: AdminService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: Arc<DbManager>,
        store: Arc<dyn ObjectStore>,
        renderer: Arc<dyn RenderClient>,
        gateway: Arc<dyn CheckoutGateway>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            renders: RenderOrchestrator::new(
                db.clone(),
                store.clone(),
                renderer,
                config.render_cost,
            ),
            payments: PaymentSessionManager::new(db.clone(), gateway, config.clone()),
            webhooks: WebhookReconciler::new(
                db.clone(),
                config.stripe_webhook_secret.clone(),
                config.webhook_tolerance_secs,
            ),
            admin: AdminService::new(db.clone()),
            config,
            db,
            store,
        }
    }

    /// Wire the production collaborators described by `config`: the diesel
    /// database, a filesystem object store, the HTTP renderer and Stripe.
    pub fn from_config(config: AppConfig) -> Result<Self, ServiceError> {
        let db = Arc::new(DbManager::new(&config.database_url)?);
        let store = Arc::new(FsObjectStore::new(
            config.storage_dir.clone(),
            config.public_base_url.as_str(),
        ));
        let renderer = Arc::new(HttpRenderClient::new(config.renderer.clone()).map_err(|e| {
            ServiceError::Internal(format!("Unable to build renderer client: {}", e))
        })?);
        let gateway = Arc::new(StripeCheckoutGateway::new(
            config.stripe_secret_key.as_deref(),
        ));
        Ok(Self::new(config, db, store, renderer, gateway))
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub object: &'static str,
    pub data: Vec<T>,
    pub url: &'static str,
}

impl<T> ListResponse<T> {
    pub fn new(url: &'static str, data: Vec<T>) -> Self {
        Self {
            object: "list",
            data,
            url,
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    let api = Router::new()
        .route("/me", get(admin::me))
        // Renders
        .route(
            "/renders",
            post(renders::create_render)
                .layer(upload_limit)
                .get(renders::list_renders),
        )
        .route("/renders/{id}", get(renders::get_render))
        .route("/renders/{id}/refine", post(renders::refine_render))
        // Tokens and payments
        .route("/tokens/packages", get(tokens::list_packages))
        .route("/tokens/transactions", get(tokens::list_transactions))
        .route("/coupons/validate", post(tokens::validate_coupon))
        .route("/checkout", post(tokens::create_checkout))
        .route("/payments", get(tokens::list_payments))
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Admin
        .route("/admin/stats", get(admin::stats))
        .route("/admin/accounts", get(admin::list_accounts))
        .route("/admin/accounts/{id}/bonus", post(admin::grant_bonus))
        .route("/admin/accounts/{id}/role", post(admin::set_role));

    Router::new()
        .route("/health", get(health))
        .route("/files/{*key}", get(files::serve_file))
        .nest("/api", api)
        .layer(Extension(state))
        .layer(cors_layer)
}

/// Start the API server on the specified port
pub async fn start_server(state: AppState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Starting archrender API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
