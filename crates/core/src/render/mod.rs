//! Render orchestration: balance check, upload, job creation, token debit
//! and the detached call to the external renderer.
//!
//! A submission returns as soon as the job exists and its token has been
//! debited. The renderer call runs on a spawned task that moves the job to
//! `completed` or `failed`; clients poll the job store for the outcome.
//! Nothing recovers a job whose task dies with the process: it stays in
//! `processing`.

use std::sync::Arc;

use archrender_types::{
    Account, OutputFormat, RenderAdjustments, RenderJob, RenderOutcome, SceneType, now_millis,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    db::{DbManager, NewRenderJob},
    error::{ServiceError, ServiceResult},
    renderer::{RenderClient, RenderRequest},
    storage::{ObjectStore, decode_image, original_image_key},
};

pub const TOKEN_PAYMENT_FAILED: &str = "Token payment could not be processed";

#[derive(Debug, Clone)]
pub struct SubmitRender {
    pub scene_type: SceneType,
    pub output_format: OutputFormat,
    /// Data URI or bare base64
    pub image: String,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RefineRender {
    pub parent_job_id: i32,
    pub prompt: Option<String>,
    pub adjustments: RenderAdjustments,
}

/// Handle on an accepted render. Dropping `completion` detaches the
/// background task; awaiting it waits for the job to reach a terminal state.
#[derive(Debug)]
pub struct RenderTicket {
    pub job_id: i32,
    pub completion: JoinHandle<()>,
}

#[derive(Clone)]
pub struct RenderOrchestrator {
    db: Arc<DbManager>,
    store: Arc<dyn ObjectStore>,
    renderer: Arc<dyn RenderClient>,
    render_cost: i64,
}

impl RenderOrchestrator {
    pub fn new(
        db: Arc<DbManager>,
        store: Arc<dyn ObjectStore>,
        renderer: Arc<dyn RenderClient>,
        render_cost: i64,
    ) -> Self {
        Self {
            db,
            store,
            renderer,
            render_cost,
        }
    }

    fn ensure_affordable(&self, account_id: i32) -> ServiceResult<Account> {
        let account = self.db.get_account(account_id)?;
        if !account.can_afford(self.render_cost) {
            return Err(ServiceError::InsufficientBalance {
                balance: account.token_balance,
                required: self.render_cost,
            });
        }
        Ok(account)
    }

    pub async fn submit_render(
        &self,
        account_id: i32,
        request: SubmitRender,
    ) -> ServiceResult<RenderTicket> {
        self.ensure_affordable(account_id)?;

        let image = decode_image(&request.image)?;
        let stored_format = image
            .media_type
            .as_deref()
            .and_then(|m| m.strip_prefix("image/"))
            .and_then(|subtype| subtype.parse::<OutputFormat>().ok())
            .unwrap_or(request.output_format);
        let key = original_image_key(account_id, now_millis(), stored_format.extension());
        let stored = self
            .store
            .put(&key, image.bytes, stored_format.content_type())
            .await?;

        let render_request = RenderRequest {
            scene_type: request.scene_type,
            output_format: request.output_format,
            image: stored.url.clone(),
            prompt: request.prompt.clone(),
        };
        let job = NewRenderJob::processing(
            account_id,
            stored.url,
            request.scene_type,
            request.output_format,
            request.prompt,
            None,
            RenderAdjustments::default(),
        );
        self.start(account_id, &job, "Render", render_request)
            .await
    }

    pub async fn refine_render(
        &self,
        account_id: i32,
        request: RefineRender,
    ) -> ServiceResult<RenderTicket> {
        request
            .adjustments
            .validate()
            .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
        self.ensure_affordable(account_id)?;

        let parent = self
            .db
            .find_render_job(request.parent_job_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("Render job {}", request.parent_job_id)))?;
        if parent.account_id != account_id {
            return Err(ServiceError::Forbidden(
                "Render job belongs to another account".to_string(),
            ));
        }
        let source = parent.refinable_output().ok_or_else(|| {
            ServiceError::InvalidState("Only completed renders can be refined".to_string())
        })?;

        let render_request = RenderRequest {
            scene_type: parent.scene_type,
            output_format: parent.output_format,
            image: source.to_string(),
            prompt: refinement_prompt(request.prompt.as_deref(), &request.adjustments),
        };
        let job = NewRenderJob::processing(
            account_id,
            source.to_string(),
            parent.scene_type,
            parent.output_format,
            request.prompt,
            Some(parent.id),
            request.adjustments,
        );
        self.start(account_id, &job, "Refinement", render_request)
            .await
    }

    /// Create the job, pay for it and hand it to the renderer.
    async fn start(
        &self,
        account_id: i32,
        job: &NewRenderJob,
        label: &str,
        request: RenderRequest,
    ) -> ServiceResult<RenderTicket> {
        let job_id = self.db.create_render_job(job)?;
        let description = format!("{} #{}", label, job_id);

        if let Err(e) = self
            .db
            .debit_tokens(account_id, self.render_cost, Some(job_id), Some(&description))
        {
            error!(job_id, account_id, "Token debit failed: {}", e);
            let failed = RenderOutcome::Failed {
                error_message: TOKEN_PAYMENT_FAILED.to_string(),
                completed_at: now_millis(),
            };
            if let Err(e) = self.db.update_render_status(job_id, &failed) {
                error!(job_id, "Unable to mark render job as failed: {}", e);
            }
            return Err(ServiceError::Internal(format!(
                "{} for job {}: {}",
                TOKEN_PAYMENT_FAILED, job_id, e
            )));
        }

        info!(job_id, account_id, "{} accepted", description);

        let db = self.db.clone();
        let renderer = self.renderer.clone();
        let completion = tokio::spawn(async move {
            complete_render(db, renderer, job_id, request).await;
        });
        Ok(RenderTicket { job_id, completion })
    }

    /// One job, checked against the caller's ownership.
    pub fn get_render(&self, account_id: i32, job_id: i32) -> ServiceResult<RenderJob> {
        let job = self
            .db
            .find_render_job(job_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("Render job {}", job_id)))?;
        if job.account_id != account_id {
            return Err(ServiceError::Forbidden(
                "Render job belongs to another account".to_string(),
            ));
        }
        Ok(job)
    }

    pub fn list_renders(&self, account_id: i32) -> ServiceResult<Vec<RenderJob>> {
        Ok(self.db.list_render_jobs(account_id)?)
    }
}

/// Prompt sent to the renderer for a refinement: the caller's text plus
/// any non-zero adjustments.
fn refinement_prompt(prompt: Option<&str>, adjustments: &RenderAdjustments) -> Option<String> {
    let prompt = prompt.map(str::trim).filter(|p| !p.is_empty());
    match (prompt, adjustments.describe()) {
        (Some(p), Some(adj)) => Some(format!("{}; adjust {}", p, adj)),
        (Some(p), None) => Some(p.to_string()),
        (None, Some(adj)) => Some(format!("adjust {}", adj)),
        (None, None) => None,
    }
}

/// Background half of a render. Either renderer outcome ends with the job in
/// a terminal state; there is a single attempt and no retry.
async fn complete_render(
    db: Arc<DbManager>,
    renderer: Arc<dyn RenderClient>,
    job_id: i32,
    request: RenderRequest,
) {
    info!(job_id, "Calling renderer");
    let outcome = match renderer.render(&request).await {
        Ok(output) => {
            info!(job_id, "Render completed");
            RenderOutcome::Completed {
                rendered_image_url: output,
                completed_at: now_millis(),
            }
        }
        Err(e) => {
            warn!(job_id, "Render failed: {}", e);
            RenderOutcome::Failed {
                error_message: e.job_message(),
                completed_at: now_millis(),
            }
        }
    };
    if let Err(e) = db.update_render_status(job_id, &outcome) {
        error!(job_id, "Unable to record render outcome: {}", e);
    }
}
