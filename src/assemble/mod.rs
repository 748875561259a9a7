//! On demand, concatenates received chunks in order into a single output
//! artifact; verifies completeness.

mod error;

pub use error::{AssembleError, AssembleResult};

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{error, info};

use crate::events::{EventBus, TransferEvent};
use crate::staging::ChunkStaging;
use crate::store::{Store, TransferStatus};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

pub struct Assembler {
    store: Arc<Store>,
    staging: Arc<ChunkStaging>,
    events: Arc<EventBus>,
}

impl Assembler {
    pub fn new(store: Arc<Store>, staging: Arc<ChunkStaging>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            staging,
            events,
        }
    }

    pub async fn assemble(&self, file_id: &str) -> AssembleResult<PathBuf> {
        let manifest = self
            .store
            .get_manifest(file_id)
            .await?
            .ok_or(AssembleError::NotFound)?;

        let output_path = self.staging.assembled_path(&manifest.filename);

        if manifest.status == TransferStatus::Completed
            && tokio::fs::metadata(&output_path).await.is_ok()
        {
            return Ok(output_path);
        }

        // Verify all chunks are present before opening the output stream.
        for chunk_id in 0..manifest.total_chunks {
            if !self.staging.chunk_exists(file_id, chunk_id).await {
                return Err(AssembleError::MissingChunk(chunk_id));
            }
        }

        match self.concatenate(file_id, &manifest.filename, manifest.total_chunks).await {
            Ok(()) => {
                let now = Utc::now().timestamp();
                self.store
                    .set_status(file_id, TransferStatus::Completed, now)
                    .await?;
                self.events.publish(TransferEvent::Assembled {
                    file_id: file_id.to_string(),
                    filename: manifest.filename.clone(),
                    path: output_path.display().to_string(),
                });
                crate::metrics::record_transfer_completed();
                info!(file_id, "assembly complete");
                Ok(output_path)
            }
            Err(AssembleFailure::Corrupt(chunk_id)) => {
                self.staging.remove_file(&output_path).await.ok();
                self.store
                    .set_status(file_id, TransferStatus::Failed, Utc::now().timestamp())
                    .await?;
                let message = format!("chunk {chunk_id} failed checksum verification during assembly");
                self.events.publish(TransferEvent::Error {
                    file_id: file_id.to_string(),
                    message: message.clone(),
                });
                error!(file_id, chunk_id, "hard corruption detected during assembly");
                Err(AssembleError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    message,
                )))
            }
            Err(AssembleFailure::Io(e)) => {
                self.staging.remove_file(&output_path).await.ok();
                // Manifest stays active: this is a retryable failure.
                Err(AssembleError::Io(e))
            }
        }
    }

    async fn concatenate(
        &self,
        file_id: &str,
        filename: &str,
        total_chunks: u32,
    ) -> Result<(), AssembleFailure> {
        let output_path = self.staging.assembled_path(filename);
        let mut out = tokio::fs::File::create(&output_path)
            .await
            .map_err(AssembleFailure::Io)?;

        for chunk_id in 0..total_chunks {
            let expected = self
                .store
                .get_chunk_checksum(file_id, chunk_id)
                .await
                .map_err(|e| AssembleFailure::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

            let chunk_path = self.staging.chunk_path(file_id, chunk_id);
            let mut chunk_file = tokio::fs::File::open(&chunk_path)
                .await
                .map_err(AssembleFailure::Io)?;

            let mut hasher = Sha256::new();
            let mut buf = vec![0u8; COPY_BUFFER_SIZE];
            loop {
                let n = chunk_file
                    .read(&mut buf)
                    .await
                    .map_err(AssembleFailure::Io)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                out.write_all(&buf[..n]).await.map_err(AssembleFailure::Io)?;
            }

            if let Some(expected) = expected {
                let actual = hex::encode(hasher.finalize());
                if actual != expected {
                    return Err(AssembleFailure::Corrupt(chunk_id));
                }
            }
        }

        out.flush().await.map_err(AssembleFailure::Io)?;
        Ok(())
    }
}

enum AssembleFailure {
    Corrupt(u32),
    Io(std::io::Error),
}
