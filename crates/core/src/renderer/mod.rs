//! Client for the external architectural rendering API.

use archrender_types::{OutputFormat, SceneType};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RendererConfig;

pub const DEFAULT_FAILURE_MESSAGE: &str = "Renderer returned no rendered image";

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("Renderer API key is not configured")]
    NotConfigured,
    #[error("Renderer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Renderer responded with {status}: {message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Rejected(String),
}

impl RendererError {
    /// Message recorded on a failed render job
    pub fn job_message(&self) -> String {
        match self {
            RendererError::Rejected(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Body sent to the rendering API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub scene_type: SceneType,
    pub output_format: OutputFormat,
    /// URL of the source image
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[async_trait]
pub trait RenderClient: Send + Sync {
    /// Run one render and return the URL of the output image.
    async fn render(&self, request: &RenderRequest) -> Result<String, RendererError>;
}

/// Pick the output URL out of a renderer response, or the most specific
/// failure message it carries.
pub fn interpret_response(body: &Value) -> Result<String, RendererError> {
    let field = |name: &str| {
        body.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    if let Some(output) = field("output") {
        return Ok(output.to_string());
    }
    let message = field("error")
        .or_else(|| field("message"))
        .unwrap_or(DEFAULT_FAILURE_MESSAGE);
    Err(RendererError::Rejected(message.to_string()))
}

/// [`RenderClient`] calling the RapidAPI-hosted rendering service
#[derive(Debug, Clone)]
pub struct HttpRenderClient {
    http: reqwest::Client,
    config: RendererConfig,
}

impl HttpRenderClient {
    /// A renderer that does not answer within `config.timeout` fails the
    /// call, which fails the job.
    pub fn new(config: RendererConfig) -> Result<Self, RendererError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl RenderClient for HttpRenderClient {
    async fn render(&self, request: &RenderRequest) -> Result<String, RendererError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(RendererError::NotConfigured)?;

        debug!(
            "Calling renderer at {} ({} / {})",
            self.config.api_url, request.scene_type, request.output_format
        );
        let mut builder = self
            .http
            .post(&self.config.api_url)
            .header("x-rapidapi-key", api_key)
            .json(request);
        if let Some(host) = self.config.api_host() {
            builder = builder.header("x-rapidapi-host", host);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("Renderer error response ({}): {}", status, text);
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|body| interpret_response(&body).err())
                .map(|e| e.job_message())
                .unwrap_or_else(|| status.to_string());
            return Err(RendererError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<Value>().await?;
        interpret_response(&body)
    }
}
