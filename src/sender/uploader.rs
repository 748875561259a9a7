//! Splits a file, posts the manifest, uploads missing chunks with
//! retry+backoff, and requests assembly. Mirrors the original prototype's
//! upload loop, adapted onto `reqwest` and the `backoff` crate's
//! permanent/transient error distinction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{UploadError, UploadResult};
use super::network::{adaptive_chunk_size, NetworkMonitor};

const PERMANENT_STATUS_CODES: [u16; 3] = [400, 404, 409];
const MAX_CONSECUTIVE_CHUNK_ABORTS: u32 = 5;
const LOOP_IDLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub initial_chunk_size: u64,
    pub max_retries: u32,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 30,
            initial_chunk_size: 256 * 1024,
            max_retries: 10,
        }
    }
}

struct ChunkPlan {
    chunk_id: u32,
    size: u64,
    checksum: String,
}

#[derive(Deserialize)]
struct UploadChunkApiResponse {
    received: u32,
    total: u32,
    speed: f64,
    #[serde(default)]
    duplicate: bool,
}

#[derive(Deserialize)]
struct MissingApiResponse {
    missing: Vec<u32>,
}

pub struct Uploader {
    client: reqwest::Client,
    config: UploaderConfig,
    monitor: NetworkMonitor,
}

impl Uploader {
    pub fn new(config: UploaderConfig) -> UploadResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            monitor: NetworkMonitor::new(),
        })
    }

    /// Runs the full upload loop for `path`; returns the `file_id` used.
    pub async fn upload_file(&self, path: &Path, filename: &str) -> UploadResult<String> {
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() == 0 {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "file is empty",
            )));
        }

        let file_id = Uuid::new_v4().to_string();
        let mut chunk_size = self.config.initial_chunk_size;
        let mut plan = self.split_plan(path, chunk_size).await?;

        self.post_manifest(&file_id, filename, metadata.len(), chunk_size, &plan)
            .await?;
        info!(file_id = %file_id, total_chunks = plan.len(), "manifest posted");

        loop {
            let missing = self.get_missing(&file_id).await?;
            if missing.is_empty() {
                break;
            }

            let success_rate = self.monitor.success_rate();
            let avg_speed = self.monitor.avg_speed();
            let candidate = adaptive_chunk_size(chunk_size, success_rate, avg_speed);
            if (candidate as f64 - chunk_size as f64).abs() > 0.5 * chunk_size as f64 {
                info!(from = chunk_size, to = candidate, "re-chunking transfer");
                chunk_size = candidate;
                plan = self.split_plan(path, chunk_size).await?;
                self.post_manifest(&file_id, filename, metadata.len(), chunk_size, &plan)
                    .await?;
            }

            let mut consecutive_aborts = 0u32;
            for chunk_id in missing {
                let bytes = self.read_chunk(path, chunk_id, chunk_size).await?;
                let checksum = hex::encode(Sha256::digest(&bytes));

                match self.upload_chunk_with_retry(&file_id, chunk_id, &checksum, bytes).await {
                    Ok(_) => consecutive_aborts = 0,
                    Err(UploadError::Aborted { chunk_id }) => {
                        consecutive_aborts += 1;
                        warn!(chunk_id, consecutive_aborts, "chunk upload aborted");
                        if consecutive_aborts >= MAX_CONSECUTIVE_CHUNK_ABORTS {
                            return Err(UploadError::Aborted { chunk_id });
                        }
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }

            tokio::time::sleep(LOOP_IDLE_DELAY).await;
        }

        self.request_assemble(&file_id).await?;
        Ok(file_id)
    }

    async fn split_plan(&self, path: &Path, chunk_size: u64) -> UploadResult<Vec<ChunkPlan>> {
        let len = tokio::fs::metadata(path).await?.len();
        let total_chunks = len.div_ceil(chunk_size);
        let mut plan = Vec::with_capacity(total_chunks as usize);

        for chunk_id in 0..total_chunks as u32 {
            let bytes = self.read_chunk(path, chunk_id, chunk_size).await?;
            plan.push(ChunkPlan {
                chunk_id,
                size: bytes.len() as u64,
                checksum: hex::encode(Sha256::digest(&bytes)),
            });
        }
        Ok(plan)
    }

    async fn read_chunk(&self, path: &Path, chunk_id: u32, chunk_size: u64) -> UploadResult<Vec<u8>> {
        let mut file = tokio::fs::File::open(path).await?;
        file.seek(std::io::SeekFrom::Start(chunk_id as u64 * chunk_size))
            .await?;
        let mut buf = vec![0u8; chunk_size as usize];
        let mut filled = 0usize;
        loop {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
            if filled == buf.len() {
                break;
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    async fn post_manifest(
        &self,
        file_id: &str,
        filename: &str,
        size: u64,
        chunk_size: u64,
        plan: &[ChunkPlan],
    ) -> UploadResult<()> {
        let chunks: Vec<_> = plan
            .iter()
            .map(|c| {
                serde_json::json!({
                    "chunk_id": c.chunk_id,
                    "size": c.size,
                    "checksum": c.checksum,
                })
            })
            .collect();

        let body = serde_json::json!({
            "file_id": file_id,
            "filename": filename,
            "size": size,
            "chunk_size": chunk_size,
            "chunks": chunks,
            "priority": "normal",
        });

        let response = self
            .client
            .post(format!("{}/upload/init", self.config.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UploadError::ManifestRejected(text));
        }
        Ok(())
    }

    async fn get_missing(&self, file_id: &str) -> UploadResult<Vec<u32>> {
        let response = self
            .client
            .get(format!(
                "{}/upload/missing/{file_id}",
                self.config.base_url
            ))
            .send()
            .await?
            .error_for_status()?;
        let parsed: MissingApiResponse = response.json().await?;
        Ok(parsed.missing)
    }

    async fn upload_chunk_with_retry(
        &self,
        file_id: &str,
        chunk_id: u32,
        checksum: &str,
        bytes: Vec<u8>,
    ) -> UploadResult<UploadChunkApiResponse> {
        for attempt in 1..=self.config.max_retries {
            let started = std::time::Instant::now();
            let part = reqwest::multipart::Part::bytes(bytes.clone())
                .file_name("chunk")
                .mime_str("application/octet-stream")?;
            let form = reqwest::multipart::Form::new()
                .text("file_id", file_id.to_string())
                .text("chunk_id", chunk_id.to_string())
                .text("checksum", checksum.to_string())
                .part("chunk", part);

            let result = self
                .client
                .post(format!("{}/upload/chunk", self.config.base_url))
                .multipart(form)
                .send()
                .await;

            match classify(result, chunk_id).await {
                Ok(parsed) => {
                    self.monitor
                        .record_success(bytes.len() as u64, started.elapsed().as_secs_f64());
                    return Ok(parsed);
                }
                Err(backoff::Error::Permanent(e)) => {
                    self.monitor.record_failure();
                    return Err(e);
                }
                Err(backoff::Error::Transient { .. }) => {
                    self.monitor.record_failure();
                    if attempt == self.config.max_retries {
                        return Err(UploadError::Aborted { chunk_id });
                    }
                    let delay = backoff_delay(self.monitor.success_rate(), attempt);
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(UploadError::Aborted { chunk_id })
    }

    async fn request_assemble(&self, file_id: &str) -> UploadResult<String> {
        let response = self
            .client
            .post(format!("{}/assemble/{file_id}", self.config.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UploadError::AssemblyFailed(text));
        }
        let body: serde_json::Value = response.json().await?;
        Ok(body
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

/// Classifies a chunk-upload attempt using `backoff::Error`'s
/// permanent/transient distinction: `{400, 404, 409}` are permanent (no
/// further retries for this chunk), everything else — transport errors,
/// other status codes — is transient and eligible for another attempt.
async fn classify(
    result: Result<reqwest::Response, reqwest::Error>,
    chunk_id: u32,
) -> Result<UploadChunkApiResponse, backoff::Error<UploadError>> {
    let response = match result {
        Ok(r) => r,
        Err(_) => return Err(backoff::Error::transient(UploadError::Aborted { chunk_id })),
    };

    if response.status().is_success() {
        return response
            .json()
            .await
            .map_err(|e| backoff::Error::transient(UploadError::Http(e)));
    }

    if PERMANENT_STATUS_CODES.contains(&response.status().as_u16()) {
        return Err(backoff::Error::Permanent(UploadError::Aborted { chunk_id }));
    }

    Err(backoff::Error::transient(UploadError::Aborted { chunk_id }))
}

/// Backoff duration for a given attempt: under an unreliable network
/// (`success_rate < 0.5`) back off exponentially up to 30s; otherwise back
/// off linearly up to 5s.
fn backoff_delay(success_rate: f64, attempt: u32) -> Duration {
    if success_rate < 0.5 {
        Duration::from_secs_f64(2f64.powi(attempt as i32).min(30.0))
    } else {
        Duration::from_secs_f64((0.5 * attempt as f64).min(5.0))
    }
}

pub fn resolve_path(input: &str) -> PathBuf {
    PathBuf::from(input)
}
