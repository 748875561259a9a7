//! Accepts one chunk upload: validates, verifies checksum, writes to
//! staging, updates the Store atomically, emits events.

mod error;

pub use error::{IngestError, IngestResult};

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::events::{EventBus, TransferEvent};
use crate::staging::ChunkStaging;
use crate::store::{Store, TransferStatus};

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub received: u32,
    pub total: u32,
    pub speed: f64,
    pub progress: f64,
    pub duplicate: bool,
}

pub struct Ingestor {
    store: Arc<Store>,
    staging: Arc<ChunkStaging>,
    events: Arc<EventBus>,
}

impl Ingestor {
    pub fn new(store: Arc<Store>, staging: Arc<ChunkStaging>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            staging,
            events,
        }
    }

    pub async fn ingest(
        &self,
        file_id: &str,
        chunk_id_raw: &str,
        declared_checksum: &str,
        bytes: &[u8],
    ) -> IngestResult<IngestOutcome> {
        // 1. Input validation.
        if file_id.is_empty() {
            return Err(IngestError::Malformed("file_id is required".into()));
        }
        if declared_checksum.len() != 64 || !declared_checksum.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IngestError::Malformed("checksum must be 64 hex characters".into()));
        }
        if bytes.is_empty() {
            return Err(IngestError::Malformed("chunk bytes are empty".into()));
        }
        let chunk_id: u32 = chunk_id_raw
            .parse()
            .map_err(|_| IngestError::Malformed("chunk_id must be a non-negative integer".into()))?;

        // 2. Checksum verify, before any disk write.
        let computed = hex::encode(Sha256::digest(bytes));
        let declared_lower = declared_checksum.to_ascii_lowercase();
        if computed != declared_lower {
            self.store.increment_errors(file_id).await?;
            self.events.publish(TransferEvent::Error {
                file_id: file_id.to_string(),
                message: "checksum mismatch".to_string(),
            });
            crate::metrics::record_chunk_error();
            warn!(file_id, chunk_id, "checksum mismatch on chunk upload");
            return Err(IngestError::ChecksumMismatch);
        }

        // 3. Manifest lookup.
        let manifest = self
            .store
            .get_manifest(file_id)
            .await?
            .ok_or(IngestError::NotFound)?;

        if manifest.status != TransferStatus::Active {
            return Err(IngestError::Conflict(format!(
                "transfer is {}",
                manifest.status.as_str()
            )));
        }
        if chunk_id >= manifest.total_chunks {
            return Err(IngestError::Malformed(format!(
                "chunk_id {chunk_id} out of range [0, {})",
                manifest.total_chunks
            )));
        }
        let expected_checksum = self
            .store
            .get_chunk_checksum(file_id, chunk_id)
            .await?
            .ok_or_else(|| IngestError::Malformed(format!("no chunk row for chunk_id {chunk_id}")))?;
        if expected_checksum != declared_lower {
            return Err(IngestError::Malformed(
                "declared checksum does not match the checksum recorded at manifest init".into(),
            ));
        }

        // 4. Idempotency check (fast path). A `true` read here is reliable —
        // `received` only ever flips 0 -> 1 — but a `false` read is not a
        // promise that we'll win the commit below; a concurrent uploader of
        // the same chunk may flip it between this read and our own attempt.
        let already_received = self
            .store
            .chunk_received(file_id, chunk_id)
            .await?
            .unwrap_or(false);

        if already_received {
            return self.duplicate_outcome(file_id, manifest.total_chunks).await;
        }

        // 5. Stage write. Harmless if raced: a losing caller below writes
        // the same declared-checksum bytes to the same path.
        self.staging
            .write_chunk_atomic(file_id, chunk_id, bytes)
            .await?;

        // 6. Commit. `mark_chunk_received` is a single atomic
        // `UPDATE ... WHERE received = 0`, so exactly one concurrent caller
        // for a given chunk observes `flipped = true`; everyone else is a
        // duplicate and must not touch cumulative stats (§8 invariant 2).
        let now = Utc::now().timestamp();
        let flipped = self.store.mark_chunk_received(file_id, chunk_id, now).await?;
        if !flipped {
            return self.duplicate_outcome(file_id, manifest.total_chunks).await;
        }

        // Stats are folded in with their own atomic transaction so two
        // distinct-chunk commits racing each other can't both read the same
        // pre-update `total_bytes` and clobber one another.
        let stats = self
            .store
            .record_chunk_commit(file_id, bytes.len() as u64, now)
            .await?;
        let received = stats.chunks_received;
        crate::metrics::record_chunk_received(bytes.len() as u64);

        // 7. Emit.
        self.events.publish(TransferEvent::Chunk {
            file_id: file_id.to_string(),
            chunk_id,
            received,
            total: manifest.total_chunks,
            filename: manifest.filename.clone(),
            chunk_size: manifest.chunk_size,
            speed: stats.avg_speed,
        });

        // `record_chunk_commit`'s returned `chunks_received` is a unique,
        // monotonic sequence number for this transfer, so exactly one
        // commit observes the transition to `total_chunks`.
        if received == manifest.total_chunks {
            self.events.publish(TransferEvent::TransferComplete {
                file_id: file_id.to_string(),
                filename: manifest.filename.clone(),
            });
            info!(file_id, "all chunks received");
        }

        // 8. Respond.
        let progress = progress_percent(received, manifest.total_chunks);
        Ok(IngestOutcome {
            received,
            total: manifest.total_chunks,
            speed: stats.avg_speed,
            progress,
            duplicate: false,
        })
    }

    /// Builds the `duplicate=true` response from a fresh snapshot of the
    /// current counts, without touching stats or re-emitting events.
    async fn duplicate_outcome(&self, file_id: &str, total: u32) -> IngestResult<IngestOutcome> {
        let received = self.store.count_received(file_id).await?;
        let progress = progress_percent(received, total);
        Ok(IngestOutcome {
            received,
            total,
            speed: 0.0,
            progress,
            duplicate: true,
        })
    }
}

fn progress_percent(received: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        (received as f64 / total as f64) * 100.0
    }
}
