use archrender_types::{OutputFormat, RenderAdjustments, RenderJob, RenderStatus, SceneType};
use axum::{
    Extension, Json,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use super::{AppState, CurrentAccount, ListResponse};
use crate::{
    error::ServiceResult,
    render::{RefineRender, RenderTicket, SubmitRender},
};

#[derive(Debug, Deserialize)]
pub struct CreateRenderRequest {
    pub scene_type: SceneType,
    pub output_format: OutputFormat,
    /// `data:image/...;base64,...` or bare base64
    pub image: String,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefineRenderRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub adjustments: RenderAdjustments,
}

#[derive(Debug, Serialize)]
pub struct RenderAccepted {
    pub id: i32,
    pub status: RenderStatus,
}

impl From<RenderTicket> for RenderAccepted {
    fn from(ticket: RenderTicket) -> Self {
        // the completion task keeps running detached
        Self {
            id: ticket.job_id,
            status: RenderStatus::Processing,
        }
    }
}

/// POST /api/renders
pub async fn create_render(
    Extension(state): Extension<AppState>,
    CurrentAccount(account): CurrentAccount,
    Json(request): Json<CreateRenderRequest>,
) -> ServiceResult<impl IntoResponse> {
    let ticket = state
        .renders
        .submit_render(
            account.id,
            SubmitRender {
                scene_type: request.scene_type,
                output_format: request.output_format,
                image: request.image,
                prompt: request.prompt,
            },
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(RenderAccepted::from(ticket))))
}

/// POST /api/renders/{id}/refine
pub async fn refine_render(
    Extension(state): Extension<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(parent_job_id): Path<i32>,
    Json(request): Json<RefineRenderRequest>,
) -> ServiceResult<impl IntoResponse> {
    let ticket = state
        .renders
        .refine_render(
            account.id,
            RefineRender {
                parent_job_id,
                prompt: request.prompt,
                adjustments: request.adjustments,
            },
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(RenderAccepted::from(ticket))))
}

/// GET /api/renders
pub async fn list_renders(
    Extension(state): Extension<AppState>,
    CurrentAccount(account): CurrentAccount,
) -> ServiceResult<Json<ListResponse<RenderJob>>> {
    let jobs = state.renders.list_renders(account.id)?;
    Ok(Json(ListResponse::new("/api/renders", jobs)))
}

/// GET /api/renders/{id}
pub async fn get_render(
    Extension(state): Extension<AppState>,
    CurrentAccount(account): CurrentAccount,
    Path(job_id): Path<i32>,
) -> ServiceResult<Json<RenderJob>> {
    Ok(Json(state.renders.get_render(account.id, job_id)?))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use archrender_types::Role;
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        api::tests::{TestApp, get_as, json_body, post_json_as, test_app, test_app_with},
        render::tests::PNG_DATA_URI,
    };

    fn render_body() -> Value {
        json!({
            "scene_type": "exterior",
            "output_format": "webp",
            "image": PNG_DATA_URI,
            "prompt": "brutalist facade at dusk"
        })
    }

    async fn wait_for_terminal(app: &TestApp, job_id: i32) -> RenderJob {
        for _ in 0..100 {
            let job = app.state.db.find_render_job(job_id).unwrap().unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("render job {} never finished", job_id);
    }

    #[tokio::test]
    async fn test_create_render_then_list() {
        let app = test_app();
        let response = app
            .send(post_json_as("/api/renders", "alice", render_body()))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "processing");
        let job_id = body["id"].as_i64().unwrap() as i32;

        let job = wait_for_terminal(&app, job_id).await;
        assert_eq!(job.status, RenderStatus::Completed);

        let listed = json_body(app.send(get_as("/api/renders", "alice")).await).await;
        assert_eq!(listed["object"], "list");
        assert_eq!(listed["data"][0]["id"], job_id);
        assert_eq!(
            listed["data"][0]["rendered_image_url"],
            "https://cdn.test/out.webp"
        );

        let me = json_body(app.send(get_as("/api/me", "alice")).await).await;
        assert_eq!(me["token_balance"], 2);
    }

    fn large_image_body(encoded_len: usize) -> Value {
        json!({
            "scene_type": "interior",
            "output_format": "png",
            "image": format!("data:image/png;base64,{}", "A".repeat(encoded_len)),
        })
    }

    #[tokio::test]
    async fn test_photo_sized_upload_is_accepted() {
        let app = test_app();
        let response = app
            .send(post_json_as(
                "/api/renders",
                "alice",
                large_image_body(3 * 1024 * 1024),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let job_id = json_body(response).await["id"].as_i64().unwrap() as i32;
        assert_eq!(
            wait_for_terminal(&app, job_id).await.status,
            RenderStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_upload_over_configured_limit_is_413() {
        let app = test_app_with(|config| config.with_max_upload_bytes(64 * 1024));
        let response = app
            .send(post_json_as(
                "/api/renders",
                "alice",
                large_image_body(128 * 1024),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let listed = json_body(app.send(get_as("/api/renders", "alice")).await).await;
        assert!(listed["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_400() {
        let app = test_app();
        app.state
            .db
            .ensure_account("broke", None, None, 0, Role::User)
            .unwrap();

        let response = app
            .send(post_json_as("/api/renders", "broke", render_body()))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["type"], "insufficient_balance");

        let listed = json_body(app.send(get_as("/api/renders", "broke")).await).await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_unknown_scene_type_is_rejected() {
        let app = test_app();
        let mut body = render_body();
        body["scene_type"] = json!("underwater");
        let response = app.send(post_json_as("/api/renders", "alice", body)).await;
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_other_accounts_job_is_forbidden() {
        let app = test_app();
        let body = json_body(
            app.send(post_json_as("/api/renders", "alice", render_body()))
                .await,
        )
        .await;
        let job_id = body["id"].as_i64().unwrap();

        let response = app
            .send(get_as(&format!("/api/renders/{}", job_id), "mallory"))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.send(get_as("/api/renders/9999", "alice")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_refine_completed_render() {
        let app = test_app();
        let body = json_body(
            app.send(post_json_as("/api/renders", "alice", render_body()))
                .await,
        )
        .await;
        let parent_id = body["id"].as_i64().unwrap() as i32;
        wait_for_terminal(&app, parent_id).await;

        let response = app
            .send(post_json_as(
                &format!("/api/renders/{}/refine", parent_id),
                "alice",
                json!({"prompt": "warmer light", "adjustments": {"lighting": 20}}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let child_id = json_body(response).await["id"].as_i64().unwrap() as i32;

        let child = wait_for_terminal(&app, child_id).await;
        assert_eq!(child.parent_job_id, Some(parent_id));
        assert_eq!(child.original_image_url, "https://cdn.test/out.webp");
        assert_eq!(child.adjustments.lighting, Some(20));

        let response = app
            .send(post_json_as(
                &format!("/api/renders/{}/refine", parent_id),
                "alice",
                json!({"adjustments": {"lighting": 31}}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"]["type"],
            "invalid_request_error"
        );
    }
}
