use serde::{Deserialize, Serialize};

pub const MIN_CHUNK_SIZE: u64 = 64 * 1024;
pub const MAX_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Active,
    Completed,
    Stale,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Active => "active",
            TransferStatus::Completed => "completed",
            TransferStatus::Stale => "stale",
            TransferStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TransferStatus::Active),
            "completed" => Some(TransferStatus::Completed),
            "stale" => Some(TransferStatus::Stale),
            "failed" => Some(TransferStatus::Failed),
            _ => None,
        }
    }
}

/// One row per transfer. Unique by `file_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub priority: Priority,
    pub status: TransferStatus,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// Declared per-chunk metadata, supplied by the sender at manifest init.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub chunk_id: u32,
    pub size: u64,
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransferStats {
    pub file_id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub total_bytes: u64,
    pub chunks_received: u32,
    pub errors: u32,
    pub avg_speed: f64,
}

/// Result of `Store::create_manifest`: whether this was a fresh
/// registration or an idempotent resend of an identical chunk set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateManifestOutcome {
    Created,
    Resumed { received: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub file_id: String,
    pub filename: String,
    pub status: TransferStatus,
    pub total_chunks: u32,
    pub received_chunks: u32,
    pub progress_percent: f64,
}
