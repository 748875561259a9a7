//! Filesystem area holding received chunks for in-flight transfers and
//! assembled outputs. Partitioned by `file_id`; a chunk file without a
//! corresponding `received=1` store row must be treated as garbage.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct ChunkStaging {
    root: PathBuf,
}

impl ChunkStaging {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn transfer_dir(&self, file_id: &str) -> PathBuf {
        self.root.join(file_id)
    }

    /// `<staging>/<file_id>/chunk_<chunk_id:06d>.bin`
    pub fn chunk_path(&self, file_id: &str, chunk_id: u32) -> PathBuf {
        self.transfer_dir(file_id)
            .join(format!("chunk_{chunk_id:06}.bin"))
    }

    /// `<staging>/assembled_<filename>`
    pub fn assembled_path(&self, filename: &str) -> PathBuf {
        self.root.join(format!("assembled_{filename}"))
    }

    /// Writes `bytes` to the chunk's path via write-to-temp + rename, so a
    /// cancelled or crashed write never leaves partial bytes visible.
    pub async fn write_chunk_atomic(
        &self,
        file_id: &str,
        chunk_id: u32,
        bytes: &[u8],
    ) -> std::io::Result<()> {
        let dir = self.transfer_dir(file_id);
        fs::create_dir_all(&dir).await?;

        let final_path = self.chunk_path(file_id, chunk_id);
        let tmp_path = dir.join(format!("chunk_{chunk_id:06}.bin.tmp"));

        let mut f = fs::File::create(&tmp_path).await?;
        f.write_all(bytes).await?;
        f.flush().await?;
        drop(f);

        fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    pub async fn chunk_exists(&self, file_id: &str, chunk_id: u32) -> bool {
        fs::metadata(self.chunk_path(file_id, chunk_id)).await.is_ok()
    }

    pub async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
