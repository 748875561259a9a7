use serde::{Deserialize, Serialize};

use crate::store::{Priority, TransferStatus};

#[derive(Debug, Deserialize)]
pub struct ChunkSpec {
    pub chunk_id: u32,
    pub size: u64,
    pub checksum: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadInitRequest {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub chunk_size: u64,
    pub chunks: Vec<ChunkSpec>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UploadInitResponse {
    Ok {
        status: &'static str,
    },
    Resumed {
        status: &'static str,
        received_chunks: u32,
    },
}

#[derive(Debug, Serialize)]
pub struct UploadChunkResponse {
    pub status: &'static str,
    pub received: u32,
    pub total: u32,
    pub speed: f64,
    pub progress: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

#[derive(Debug, Serialize)]
pub struct MissingResponse {
    pub missing: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub struct AssembleResponse {
    pub status: &'static str,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct FileSummary {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub status: TransferStatus,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub priority: Priority,
}

#[derive(Debug, Serialize)]
pub struct FileDetail {
    #[serde(flatten)]
    pub summary: FileSummary,
    pub total_chunks: u32,
    pub received_chunks: u32,
    pub progress: f64,
}
