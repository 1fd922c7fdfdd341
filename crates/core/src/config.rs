use std::{path::PathBuf, time::Duration};

use archrender_types::accounts::DEFAULT_INITIAL_TOKENS;
use url::Url;

pub const DEFAULT_CURRENCY: &str = "brl";
pub const DEFAULT_RENDER_COST: i64 = 1;
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
/// Request body cap for render uploads (base64 inflates images by a third)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
/// Renders usually take 10-30s; anything past this is treated as a failure
pub const DEFAULT_RENDERER_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RENDERER_API_URL: &str =
    "https://architecture-rendering-api.p.rapidapi.com/render";

/// Runtime settings for the archrender service
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Externally reachable base URL, used for checkout redirects and
    /// stored-object links
    pub public_base_url: Url,
    /// Root directory of the local object store
    pub storage_dir: PathBuf,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub webhook_tolerance_secs: i64,
    /// Largest accepted render request body, in bytes
    pub max_upload_bytes: usize,
    pub renderer: RendererConfig,
    pub currency: String,
    /// Tokens granted to an account when it is first seen
    pub initial_tokens: i64,
    /// Tokens debited per render or refinement
    pub render_cost: i64,
    /// External ids that are given the admin role on sign-in
    pub admin_accounts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    /// Whole-request timeout for one render call
    pub timeout: Duration,
}

impl RendererConfig {
    /// Value of the `x-rapidapi-host` header, derived from the API URL.
    pub fn api_host(&self) -> Option<String> {
        Url::parse(&self.api_url)
            .ok()?
            .host_str()
            .map(str::to_string)
    }
}

impl AppConfig {
    pub fn new(database_url: &str, public_base_url: Url, storage_dir: PathBuf) -> Self {
        Self {
            database_url: database_url.to_string(),
            public_base_url,
            storage_dir,
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            renderer: RendererConfig {
                api_url: DEFAULT_RENDERER_API_URL.to_string(),
                api_key: None,
                timeout: Duration::from_secs(DEFAULT_RENDERER_TIMEOUT_SECS),
            },
            currency: DEFAULT_CURRENCY.to_string(),
            initial_tokens: DEFAULT_INITIAL_TOKENS,
            render_cost: DEFAULT_RENDER_COST,
            admin_accounts: vec![],
        }
    }

    pub fn with_stripe(mut self, secret_key: Option<String>, webhook_secret: Option<String>) -> Self {
        self.stripe_secret_key = secret_key;
        self.stripe_webhook_secret = webhook_secret;
        self
    }

    pub fn with_renderer(mut self, api_url: &str, api_key: Option<String>) -> Self {
        self.renderer.api_url = api_url.to_string();
        self.renderer.api_key = api_key;
        self
    }

    pub fn with_renderer_timeout(mut self, timeout: Duration) -> Self {
        self.renderer.timeout = timeout;
        self
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_lowercase();
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn with_admin_accounts(mut self, admin_accounts: Vec<String>) -> Self {
        self.admin_accounts = admin_accounts;
        self
    }

    pub fn is_admin_account(&self, external_id: &str) -> bool {
        self.admin_accounts.iter().any(|id| id == external_id)
    }

    /// Absolute URL below the public base, e.g. `checkout/success`.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn checkout_success_url(&self) -> String {
        format!(
            "{}?session_id={{CHECKOUT_SESSION_ID}}",
            self.public_url("checkout/success")
        )
    }

    pub fn checkout_cancel_url(&self) -> String {
        self.public_url("tokens")
    }
}
