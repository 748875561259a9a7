use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tracing::{info, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{
    AssembleResponse, FileDetail, FileSummary, MissingResponse, UploadChunkResponse,
    UploadInitRequest, UploadInitResponse,
};
use crate::api::AppState;
use crate::events::TransferEvent;
use crate::store::{
    ChunkMeta, CreateManifestOutcome, Manifest, TransferStatus, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE,
};

/// §6: "Limits: max request body 100 MiB." Chunks themselves may be up to
/// `MAX_CHUNK_SIZE` (10 MiB, §3); the multipart envelope around one adds
/// some overhead, so the route's limit is set to the spec's own ceiling
/// rather than derived from `MAX_CHUNK_SIZE`. axum's `DefaultBodyLimit` is
/// 2 MiB, which would reject any valid chunk above that before it ever
/// reaches `upload_chunk`.
const MAX_UPLOAD_BODY_BYTES: usize = 100 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload/init", post(upload_init))
        .route(
            "/upload/chunk",
            post(upload_chunk).layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES)),
        )
        .route("/upload/missing/:file_id", get(upload_missing))
        .route("/assemble/:file_id", post(assemble))
        .route("/api/files", get(list_files))
        .route("/api/files/:file_id", get(get_file))
        .route("/download/:file_id", get(download))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[instrument(skip(state, req), fields(file_id = %req.file_id))]
async fn upload_init(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadInitRequest>,
) -> ApiResult<Json<UploadInitResponse>> {
    if req.file_id.is_empty() {
        return Err(ApiError::InvalidRequest("file_id is required".into()));
    }
    if req.size < 1 {
        return Err(ApiError::InvalidRequest("size must be >= 1".into()));
    }
    if req.chunk_size < MIN_CHUNK_SIZE || req.chunk_size > MAX_CHUNK_SIZE {
        return Err(ApiError::InvalidRequest(format!(
            "chunk_size must be within [{MIN_CHUNK_SIZE}, {MAX_CHUNK_SIZE}]"
        )));
    }
    if req.chunks.is_empty() {
        return Err(ApiError::InvalidRequest("chunks must be non-empty".into()));
    }

    let manifest = Manifest {
        file_id: req.file_id.clone(),
        filename: req.filename,
        size: req.size,
        chunk_size: req.chunk_size,
        total_chunks: req.chunks.len() as u32,
        priority: req.priority,
        status: TransferStatus::Active,
        created_at: Utc::now().timestamp(),
        completed_at: None,
    };
    let chunk_meta: Vec<ChunkMeta> = req
        .chunks
        .into_iter()
        .map(|c| ChunkMeta {
            chunk_id: c.chunk_id,
            size: c.size,
            checksum: c.checksum.to_ascii_lowercase(),
        })
        .collect();

    let outcome = state.store.create_manifest(&manifest, &chunk_meta).await?;

    match outcome {
        CreateManifestOutcome::Created => {
            state.events.publish(TransferEvent::Manifest {
                file_id: manifest.file_id.clone(),
                filename: manifest.filename.clone(),
                total_chunks: manifest.total_chunks,
            });
            crate::metrics::record_transfer_started();
            info!(file_id = %manifest.file_id, total_chunks = manifest.total_chunks, "manifest registered");
            Ok(Json(UploadInitResponse::Ok { status: "ok" }))
        }
        CreateManifestOutcome::Resumed { received } => Ok(Json(UploadInitResponse::Resumed {
            status: "resumed",
            received_chunks: received,
        })),
    }
}

async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadChunkResponse>> {
    let mut file_id: Option<String> = None;
    let mut chunk_id: Option<String> = None;
    let mut checksum: Option<String> = None;
    let mut bytes: Option<bytes::Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file_id" => {
                file_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?,
                )
            }
            "chunk_id" => {
                chunk_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?,
                )
            }
            "checksum" => {
                checksum = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?,
                )
            }
            "chunk" => {
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?,
                )
            }
            _ => {}
        }
    }

    let file_id = file_id.ok_or_else(|| ApiError::InvalidRequest("file_id is required".into()))?;
    let chunk_id =
        chunk_id.ok_or_else(|| ApiError::InvalidRequest("chunk_id is required".into()))?;
    let checksum =
        checksum.ok_or_else(|| ApiError::InvalidRequest("checksum is required".into()))?;
    let bytes =
        bytes.ok_or_else(|| ApiError::InvalidRequest("chunk file part is required".into()))?;

    let outcome = state
        .ingestor
        .ingest(&file_id, &chunk_id, &checksum, &bytes)
        .await?;

    Ok(Json(UploadChunkResponse {
        status: "ok",
        received: outcome.received,
        total: outcome.total,
        speed: outcome.speed,
        progress: outcome.progress,
        duplicate: outcome.duplicate,
    }))
}

async fn upload_missing(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<MissingResponse>> {
    if state.store.get_manifest(&file_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("unknown file_id {file_id}")));
    }
    let missing = state.registry.list_missing(&file_id).await?;
    Ok(Json(MissingResponse { missing }))
}

async fn assemble(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<AssembleResponse>> {
    let path = state.assembler.assemble(&file_id).await?;
    Ok(Json(AssembleResponse {
        status: "ok",
        path: path.display().to_string(),
    }))
}

async fn list_files(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<FileSummary>>> {
    let manifests = state.registry.list().await?;
    Ok(Json(manifests.into_iter().map(summary).collect()))
}

async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<FileDetail>> {
    let manifest = state
        .store
        .get_manifest(&file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown file_id {file_id}")))?;
    let progress = state
        .registry
        .get(&file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown file_id {file_id}")))?;

    Ok(Json(FileDetail {
        summary: summary(manifest),
        total_chunks: progress.total_chunks,
        received_chunks: progress.received_chunks,
        progress: progress.progress_percent,
    }))
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let manifest = state
        .store
        .get_manifest(&file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown file_id {file_id}")))?;

    if manifest.status != TransferStatus::Completed {
        return Err(ApiError::Conflict(format!(
            "transfer is {}, not completed",
            manifest.status.as_str()
        )));
    }

    let path = state.staging.assembled_path(&manifest.filename);
    let contents = tokio::fs::read(&path).await.map_err(ApiError::Io)?;

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", manifest.filename),
        ),
    ];
    Ok((StatusCode::OK, headers, contents))
}

fn summary(manifest: Manifest) -> FileSummary {
    FileSummary {
        file_id: manifest.file_id,
        filename: manifest.filename,
        size: manifest.size,
        status: manifest.status,
        created_at: manifest.created_at,
        completed_at: manifest.completed_at,
        priority: manifest.priority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::Assembler;
    use crate::events::EventBus;
    use crate::ingest::Ingestor;
    use crate::registry::TransferRegistry;
    use crate::staging::ChunkStaging;
    use crate::store::Store;
    use http_body_util::BodyExt;
    use sha2::{Digest, Sha256};
    use tower::ServiceExt;

    async fn test_state() -> (Arc<AppState>, tempfile::TempDir) {
        let store = Arc::new(Store::new_in_memory().await.unwrap());
        let dir = tempfile::tempdir().unwrap();
        let staging = Arc::new(ChunkStaging::new(dir.path()));
        let events = Arc::new(EventBus::new());

        let state = Arc::new(AppState {
            ingestor: Ingestor::new(store.clone(), staging.clone(), events.clone()),
            assembler: Assembler::new(store.clone(), staging.clone(), events.clone()),
            registry: TransferRegistry::new(store.clone()),
            store,
            staging,
            events,
        });
        (state, dir)
    }

    #[tokio::test]
    async fn health_check_ok() {
        let (state, _dir) = test_state().await;
        let app = router(state);
        let req = axum::http::Request::builder()
            .uri("/health")
            .body(axum::body::Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn upload_init_then_chunk_then_assemble_roundtrip() {
        let (state, _dir) = test_state().await;
        let data = b"chunkrelay test payload bytes";
        let checksum = hex::encode(Sha256::digest(data));

        let init_body = serde_json::json!({
            "file_id": "f1",
            "filename": "out.bin",
            "size": data.len(),
            "chunk_size": 65536,
            "chunks": [{"chunk_id": 0, "size": data.len(), "checksum": checksum}],
            "priority": "normal",
        });

        let app = router(state.clone());
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/upload/init")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(init_body.to_string()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let boundary = "X-TEST-BOUNDARY";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"file_id\"\r\n\r\nf1\r\n");
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"chunk_id\"\r\n\r\n0\r\n");
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"checksum\"\r\n\r\n{checksum}\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"chunk\"; filename=\"chunk\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        let app = router(state.clone());
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/upload/chunk")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(axum::body::Body::from(body))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body_bytes = res.into_body().collect().await.unwrap().to_bytes();
        let parsed: UploadChunkResponse = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(parsed.received, 1);
        assert!(!parsed.duplicate);

        let app = router(state.clone());
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/assemble/f1")
            .body(axum::body::Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let app = router(state.clone());
        let req = axum::http::Request::builder()
            .uri("/download/f1")
            .body(axum::body::Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let downloaded = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&downloaded[..], data);
    }

    #[tokio::test]
    async fn download_before_completion_is_conflict() {
        let (state, _dir) = test_state().await;
        state
            .store
            .create_manifest(
                &Manifest {
                    file_id: "f1".into(),
                    filename: "out.bin".into(),
                    size: 10,
                    chunk_size: 65536,
                    total_chunks: 1,
                    priority: Default::default(),
                    status: TransferStatus::Active,
                    created_at: Utc::now().timestamp(),
                    completed_at: None,
                },
                &[ChunkMeta {
                    chunk_id: 0,
                    size: 10,
                    checksum: "a".repeat(64),
                }],
            )
            .await
            .unwrap();

        let app = router(state.clone());
        let req = axum::http::Request::builder()
            .uri("/download/f1")
            .body(axum::body::Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }
}
