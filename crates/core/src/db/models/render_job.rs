use archrender_types::{
    OutputFormat, ParseEnumError, RenderAdjustments, RenderJob, RenderOutcome, RenderStatus,
    SceneType, now_millis,
};
use diesel::prelude::*;
use tracing::debug;

use crate::db::{DbError, DbResult, PooledConnection, schema::*};

const ALL_STATUSES: [RenderStatus; 4] = [
    RenderStatus::Pending,
    RenderStatus::Processing,
    RenderStatus::Completed,
    RenderStatus::Failed,
];

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = render_jobs)]
pub struct RenderJobModel {
    pub id: i32,
    pub account_id: i32,
    pub original_image_url: String,
    pub rendered_image_url: Option<String>,
    pub scene_type: String,
    pub output_format: String,
    pub prompt: Option<String>,
    pub parent_job_id: Option<i32>,
    pub adjustment_saturation: Option<i32>,
    pub adjustment_brightness: Option<i32>,
    pub adjustment_contrast: Option<i32>,
    pub adjustment_lighting: Option<i32>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl TryFrom<RenderJobModel> for RenderJob {
    type Error = ParseEnumError;

    fn try_from(model: RenderJobModel) -> Result<Self, Self::Error> {
        Ok(RenderJob {
            id: model.id,
            account_id: model.account_id,
            original_image_url: model.original_image_url,
            rendered_image_url: model.rendered_image_url,
            scene_type: model.scene_type.parse()?,
            output_format: model.output_format.parse()?,
            prompt: model.prompt,
            parent_job_id: model.parent_job_id,
            adjustments: RenderAdjustments {
                saturation: model.adjustment_saturation,
                brightness: model.adjustment_brightness,
                contrast: model.adjustment_contrast,
                lighting: model.adjustment_lighting,
            },
            status: model.status.parse()?,
            error_message: model.error_message,
            created_at: model.created_at,
            completed_at: model.completed_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = render_jobs)]
pub struct NewRenderJob {
    pub account_id: i32,
    pub original_image_url: String,
    pub scene_type: String,
    pub output_format: String,
    pub prompt: Option<String>,
    pub parent_job_id: Option<i32>,
    pub adjustment_saturation: Option<i32>,
    pub adjustment_brightness: Option<i32>,
    pub adjustment_contrast: Option<i32>,
    pub adjustment_lighting: Option<i32>,
    pub status: String,
    pub created_at: i64,
}

impl NewRenderJob {
    /// A job that starts in `processing`, the state it is created in once
    /// the caller is known to be able to pay for it.
    pub fn processing(
        account_id: i32,
        original_image_url: String,
        scene_type: SceneType,
        output_format: OutputFormat,
        prompt: Option<String>,
        parent_job_id: Option<i32>,
        adjustments: RenderAdjustments,
    ) -> Self {
        Self {
            account_id,
            original_image_url,
            scene_type: scene_type.as_str().to_string(),
            output_format: output_format.as_str().to_string(),
            prompt,
            parent_job_id,
            adjustment_saturation: adjustments.saturation,
            adjustment_brightness: adjustments.brightness,
            adjustment_contrast: adjustments.contrast,
            adjustment_lighting: adjustments.lighting,
            status: RenderStatus::Processing.as_str().to_string(),
            created_at: now_millis(),
        }
    }

    pub fn insert(&self, conn: &mut PooledConnection) -> QueryResult<i32> {
        debug!(
            "Inserting render job for account {} (parent: {:?})",
            self.account_id, self.parent_job_id
        );
        diesel::insert_into(render_jobs::table)
            .values(self)
            .returning(render_jobs::id)
            .get_result(conn)
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = render_jobs)]
struct StatusChange<'a> {
    status: &'a str,
    rendered_image_url: Option<&'a str>,
    error_message: Option<&'a str>,
    completed_at: Option<i64>,
}

impl<'a> From<&'a RenderOutcome> for StatusChange<'a> {
    fn from(outcome: &'a RenderOutcome) -> Self {
        let status = outcome.status().as_str();
        match outcome {
            RenderOutcome::Processing => StatusChange {
                status,
                rendered_image_url: None,
                error_message: None,
                completed_at: None,
            },
            RenderOutcome::Completed {
                rendered_image_url,
                completed_at,
            } => StatusChange {
                status,
                rendered_image_url: Some(rendered_image_url),
                error_message: None,
                completed_at: Some(*completed_at),
            },
            RenderOutcome::Failed {
                error_message,
                completed_at,
            } => StatusChange {
                status,
                rendered_image_url: None,
                error_message: Some(error_message),
                completed_at: Some(*completed_at),
            },
        }
    }
}

/// Moves a job to `outcome`, but only from a status that may legally
/// precede it. The guard is part of the `UPDATE`, so a terminal outcome can
/// never be replaced by a concurrent writer.
pub fn update_status(
    conn: &mut PooledConnection,
    job_id: i32,
    outcome: &RenderOutcome,
) -> DbResult<()> {
    let target = outcome.status();
    let allowed_from = ALL_STATUSES
        .iter()
        .filter(|from| from.can_transition_to(target))
        .map(RenderStatus::as_str)
        .collect::<Vec<_>>();

    let updated = diesel::update(
        render_jobs::table
            .filter(render_jobs::id.eq(job_id))
            .filter(render_jobs::status.eq_any(allowed_from)),
    )
    .set(StatusChange::from(outcome))
    .execute(conn)?;

    if updated == 1 {
        debug!("Render job {} is now {}", job_id, target);
        return Ok(());
    }

    match find(conn, job_id)? {
        Some(job) => Err(DbError::InvalidTransition {
            job_id,
            from: job.status,
            to: target,
        }),
        None => Err(DbError::RenderJobNotFound(job_id)),
    }
}

pub fn find(conn: &mut PooledConnection, job_id: i32) -> DbResult<Option<RenderJob>> {
    let model = render_jobs::table
        .find(job_id)
        .select(RenderJobModel::as_select())
        .first(conn)
        .optional()?;
    Ok(model.map(RenderJob::try_from).transpose()?)
}

pub fn list_by_account(conn: &mut PooledConnection, account_id: i32) -> DbResult<Vec<RenderJob>> {
    let models = render_jobs::table
        .filter(render_jobs::account_id.eq(account_id))
        .order((render_jobs::created_at.desc(), render_jobs::id.desc()))
        .select(RenderJobModel::as_select())
        .load(conn)
        .map_err(DbError::ListRenderJobsError)?;
    Ok(models
        .into_iter()
        .map(RenderJob::try_from)
        .collect::<Result<_, _>>()?)
}
