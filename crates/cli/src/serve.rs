use std::{path::PathBuf, time::Duration};

use anyhow::Context as _;
use archrender_core::{
    AppConfig, AppState,
    checkout::stripe::StripeCheckoutGateway,
    config::{
        DEFAULT_CURRENCY, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_RENDERER_API_URL,
        DEFAULT_RENDERER_TIMEOUT_SECS,
    },
};
use console::style;
use url::Url;

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct ServeCommand {
    /// Port to run the server on
    #[arg(long, env = "PORT", default_value = "8488")]
    pub port: u16,

    /// Database location (SQLite file path, or a Postgres URL with the postgres feature)
    #[arg(long, env = "DATABASE_URL", default_value = "archrender.sqlite")]
    pub database_url: String,

    /// Externally reachable base URL of this service
    #[arg(long, env = "PUBLIC_BASE_URL", default_value = "http://localhost:8488")]
    pub public_base_url: Url,

    /// Directory for uploaded and rendered images
    #[arg(long, env = "STORAGE_DIR", default_value = "storage")]
    pub storage_dir: PathBuf,

    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    pub stripe_secret_key: Option<String>,

    #[arg(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    pub stripe_webhook_secret: Option<String>,

    #[arg(long, env = "RENDERER_API_URL", default_value = DEFAULT_RENDERER_API_URL)]
    pub renderer_api_url: String,

    #[arg(long, env = "RAPIDAPI_KEY", hide_env_values = true)]
    pub renderer_api_key: Option<String>,

    /// Seconds before a render call is abandoned and its job failed
    #[arg(long, env = "RENDERER_TIMEOUT_SECS", default_value_t = DEFAULT_RENDERER_TIMEOUT_SECS)]
    pub renderer_timeout_secs: u64,

    /// ISO currency code charged at checkout
    #[arg(long, env = "CURRENCY", default_value = DEFAULT_CURRENCY)]
    pub currency: String,

    /// Largest accepted render upload request, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Comma-separated external account ids granted the admin role
    #[arg(long, env = "ARCHRENDER_ADMIN_ACCOUNTS", value_delimiter = ',')]
    pub admin_accounts: Vec<String>,
}

impl ServeCommand {
    pub fn app_config(&self) -> AppConfig {
        AppConfig::new(
            &self.database_url,
            self.public_base_url.clone(),
            self.storage_dir.clone(),
        )
        .with_stripe(
            self.stripe_secret_key.clone(),
            self.stripe_webhook_secret.clone(),
        )
        .with_renderer(&self.renderer_api_url, self.renderer_api_key.clone())
        .with_renderer_timeout(Duration::from_secs(self.renderer_timeout_secs))
        .with_currency(&self.currency)
        .with_max_upload_bytes(self.max_upload_bytes)
        .with_admin_accounts(
            self.admin_accounts
                .iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        )
    }

    pub async fn execute(&self) -> anyhow::Result<()> {
        println!();
        println!("{}{}", style("Arch").white(), style("Render").green());
        println!("{}", style("Starting API server").dim());
        println!();

        let config = self.app_config();
        let stripe_mode = match config.stripe_secret_key.as_deref() {
            Some(key) if StripeCheckoutGateway::is_test_mode(key) => "test",
            Some(_) => "live",
            None => "not configured",
        };
        let webhook = if config.stripe_webhook_secret.is_some() {
            "verifying signatures"
        } else {
            "rejecting all events (no secret)"
        };
        let renderer = if config.renderer.api_key.is_some() {
            config.renderer.api_url.as_str()
        } else {
            "not configured"
        };

        println!("{} {}", style("Database").dim(), config.database_url);
        println!("{} {}", style("Storage").dim(), config.storage_dir.display());
        println!("{} {}", style("Stripe").dim(), stripe_mode);
        println!("{} {}", style("Webhook").dim(), webhook);
        println!("{} {}", style("Renderer").dim(), renderer);
        println!("{} {}", style("Currency").dim(), config.currency);
        println!("{} {}", style("Port").dim(), self.port);
        println!();

        std::fs::create_dir_all(&config.storage_dir).with_context(|| {
            format!(
                "Failed to create storage directory {}",
                config.storage_dir.display()
            )
        })?;
        let state = AppState::from_config(config).context("Failed to initialise services")?;

        println!("{}", style("Press Ctrl+C to stop").dim());
        println!();

        archrender_core::start_server(state, self.port)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))
    }
}
