use archrender_types::OutputFormat;
use axum::{
    Extension,
    extract::Path,
    http::header,
    response::IntoResponse,
};

use super::AppState;
use crate::error::{ServiceError, ServiceResult};

fn content_type_for(key: &str) -> &'static str {
    key.rsplit_once('.')
        .and_then(|(_, ext)| ext.to_ascii_lowercase().parse::<OutputFormat>().ok())
        .map(|format| format.content_type())
        .unwrap_or("application/octet-stream")
}

/// GET /files/{*key} - objects written by the local object store
pub async fn serve_file(
    Extension(state): Extension<AppState>,
    Path(key): Path<String>,
) -> ServiceResult<impl IntoResponse> {
    let bytes = state
        .store
        .get(&key)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("File {}", key)))?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&key))], bytes))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{
        api::{AppState, create_router},
        checkout::tests::{RecordingGateway, test_config},
        db::test_support::temp_db,
        render::tests::ScriptedRenderer,
        storage::{FsObjectStore, ObjectStore},
    };

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(content_type_for("renders/1/original-1-abc.png"), "image/png");
        assert_eq!(content_type_for("renders/1/a.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("notes.txt"), "application/octet-stream");
        assert_eq!(content_type_for("no-extension"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_serves_stored_object() {
        let (_dir, db) = temp_db();
        let files = tempfile::tempdir().unwrap();
        let store = Arc::new(FsObjectStore::new(files.path(), "https://render.test"));
        let stored = store
            .put("renders/1/original-1-abc.webp", vec![1, 2, 3], "image/webp")
            .await
            .unwrap();
        assert_eq!(
            stored.url,
            "https://render.test/files/renders/1/original-1-abc.webp"
        );

        let state = AppState::new(
            test_config(),
            Arc::new(db),
            store,
            Arc::new(ScriptedRenderer::succeeding("unused")),
            Arc::new(RecordingGateway::default()),
        );
        let router = create_router(state);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/files/renders/1/original-1-abc.webp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/webp");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), &[1, 2, 3]);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/files/renders/1/missing.webp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
