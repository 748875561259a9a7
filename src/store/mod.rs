//! Durable persistence for manifests, chunk rows, and per-transfer stats.
//!
//! Backed by SQLite through `sqlx`. Operations are named after, and map
//! 1:1 onto, the Store operations enumerated in the design: `create_manifest`,
//! `get_manifest`, `mark_chunk_received`, `count_received`, `list_missing`,
//! `record_chunk_commit` (the spec's `update_stats`, made a single atomic
//! increment instead of a read-modify-write), `set_status`, `sweep_stale`,
//! `list_manifests`, `get_progress`.

mod error;
mod types;

pub use error::{StoreError, StoreResult};
pub use types::{
    ChunkMeta, CreateManifestOutcome, Manifest, Priority, Progress, TransferStats, TransferStatus,
};
pub use types::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};

use sqlx::{Row, SqlitePool};

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn new(db_path: &str) -> StoreResult<Self> {
        let pool = SqlitePool::connect(db_path).await?;
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn new_in_memory() -> StoreResult<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn init_schema(pool: &SqlitePool) -> StoreResult<()> {
        // Bounded wait under contention instead of failing outright.
        sqlx::query("PRAGMA busy_timeout = 30000")
            .execute(pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS manifests (
                file_id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                size INTEGER NOT NULL,
                chunk_size INTEGER NOT NULL,
                total_chunks INTEGER NOT NULL,
                priority TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                completed_at INTEGER
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                file_id TEXT NOT NULL,
                chunk_id INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                received INTEGER NOT NULL DEFAULT 0,
                received_at INTEGER,
                retry_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (file_id, chunk_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transfer_stats (
                file_id TEXT PRIMARY KEY,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                total_bytes INTEGER NOT NULL DEFAULT 0,
                chunks_received INTEGER NOT NULL DEFAULT 0,
                errors INTEGER NOT NULL DEFAULT 0,
                avg_speed REAL NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_file_received ON chunks(file_id, received)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_manifests_status ON manifests(status)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Insert or replace the manifest row and all chunk rows in a single
    /// transaction; initializes the TransferStats row with `start_time=now`.
    ///
    /// Re-posting an identical manifest (same `file_id`, same ordered
    /// `(chunk_id, checksum)` set) is a no-op with respect to received
    /// chunks: existing chunk rows, their `received` flags, and the stats
    /// row are left untouched, and `Resumed` is returned with the count
    /// already on file. Only a genuine re-chunking (different chunk set)
    /// wipes and recreates the chunk rows, per the re-split design note.
    pub async fn create_manifest(
        &self,
        manifest: &Manifest,
        chunk_meta: &[ChunkMeta],
    ) -> StoreResult<CreateManifestOutcome> {
        let existing = self.existing_chunk_signature(&manifest.file_id).await?;
        let incoming_signature: Vec<(u32, &str)> = chunk_meta
            .iter()
            .map(|m| (m.chunk_id, m.checksum.as_str()))
            .collect();

        if let Some(existing) = &existing {
            let existing_refs: Vec<(u32, &str)> =
                existing.iter().map(|(id, c)| (*id, c.as_str())).collect();
            if existing_refs == incoming_signature {
                let received = self.count_received(&manifest.file_id).await?;
                return Ok(CreateManifestOutcome::Resumed { received });
            }
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO manifests
            (file_id, filename, size, chunk_size, total_chunks, priority, status, created_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&manifest.file_id)
        .bind(&manifest.filename)
        .bind(manifest.size as i64)
        .bind(manifest.chunk_size as i64)
        .bind(manifest.total_chunks as i64)
        .bind(priority_str(manifest.priority))
        .bind(manifest.status.as_str())
        .bind(manifest.created_at)
        .bind(manifest.completed_at)
        .execute(&mut *tx)
        .await?;

        // Re-registration replaces the chunk row set wholesale (§9: a size
        // change requires re-registering under the same file_id).
        sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(&manifest.file_id)
            .execute(&mut *tx)
            .await?;

        for meta in chunk_meta {
            sqlx::query(
                "INSERT INTO chunks (file_id, chunk_id, checksum, received, received_at, retry_count) VALUES (?, ?, ?, 0, NULL, 0)",
            )
            .bind(&manifest.file_id)
            .bind(meta.chunk_id as i64)
            .bind(&meta.checksum)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO transfer_stats
            (file_id, start_time, end_time, total_bytes, chunks_received, errors, avg_speed)
            VALUES (?, ?, NULL, 0, 0, 0, 0)
            "#,
        )
        .bind(&manifest.file_id)
        .bind(manifest.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CreateManifestOutcome::Created)
    }

    async fn existing_chunk_signature(
        &self,
        file_id: &str,
    ) -> StoreResult<Option<Vec<(u32, String)>>> {
        let manifest_exists = self.get_manifest(file_id).await?.is_some();
        if !manifest_exists {
            return Ok(None);
        }
        let rows = sqlx::query(
            "SELECT chunk_id, checksum FROM chunks WHERE file_id = ? ORDER BY chunk_id ASC",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        let mut signature = Vec::with_capacity(rows.len());
        for row in rows {
            let chunk_id: i64 = row.try_get("chunk_id")?;
            let checksum: String = row.try_get("checksum")?;
            signature.push((chunk_id as u32, checksum));
        }
        Ok(Some(signature))
    }

    pub async fn get_manifest(&self, file_id: &str) -> StoreResult<Option<Manifest>> {
        let row = sqlx::query(
            "SELECT file_id, filename, size, chunk_size, total_chunks, priority, status, created_at, completed_at FROM manifests WHERE file_id = ?",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_manifest).transpose()
    }

    /// CAS-style: atomically flips `received` 0 -> 1 and bumps `retry_count`
    /// in a single statement guarded by `WHERE received = 0`, so concurrent
    /// uploads of the same chunk can never both observe themselves as the
    /// winner. Returns `true` iff THIS call performed the flip; `false` if
    /// the row was already received (by this or a racing caller) or does
    /// not exist. `retry_count` is therefore only bumped on an actual flip,
    /// matching the idempotency short-circuit in `Ingestor::ingest`.
    pub async fn mark_chunk_received(
        &self,
        file_id: &str,
        chunk_id: u32,
        when: i64,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE chunks SET received = 1, received_at = ?, retry_count = retry_count + 1 \
             WHERE file_id = ? AND chunk_id = ? AND received = 0",
        )
        .bind(when)
        .bind(file_id)
        .bind(chunk_id as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Atomically folds one committed chunk into `transfer_stats`: adds
    /// `bytes` to `total_bytes`, increments `chunks_received`, and
    /// recomputes `avg_speed = total_bytes / elapsed`, all within one
    /// transaction so two concurrent distinct-chunk commits can never read
    /// the same pre-update counters and clobber each other (a plain
    /// read-modify-write would lose bytes under that race). The
    /// transaction also serializes the post-update read against other
    /// writers, so the returned `chunks_received` is a unique, monotonic
    /// sequence number for this transfer — the one caller whose returned
    /// value equals `total_chunks` is the sole transfer-complete winner.
    pub async fn record_chunk_commit(
        &self,
        file_id: &str,
        bytes: u64,
        now: i64,
    ) -> StoreResult<TransferStats> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE transfer_stats
            SET total_bytes = total_bytes + ?1,
                chunks_received = chunks_received + 1,
                avg_speed = CAST(total_bytes + ?1 AS REAL) / MAX(?2 - start_time, 1)
            WHERE file_id = ?3
            "#,
        )
        .bind(bytes as i64)
        .bind(now)
        .bind(file_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "SELECT file_id, start_time, end_time, total_bytes, chunks_received, errors, avg_speed FROM transfer_stats WHERE file_id = ?",
        )
        .bind(file_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::ManifestNotFound(file_id.to_string()))?;

        tx.commit().await?;

        Ok(TransferStats {
            file_id: row.try_get("file_id")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            total_bytes: row.try_get::<i64, _>("total_bytes")? as u64,
            chunks_received: row.try_get::<i64, _>("chunks_received")? as u32,
            errors: row.try_get::<i64, _>("errors")? as u32,
            avg_speed: row.try_get("avg_speed")?,
        })
    }

    /// Non-mutating read of a chunk row's `received` flag. `None` means the
    /// row does not exist (chunk_id not registered for this manifest).
    pub async fn chunk_received(&self, file_id: &str, chunk_id: u32) -> StoreResult<Option<bool>> {
        let row = sqlx::query("SELECT received FROM chunks WHERE file_id = ? AND chunk_id = ?")
            .bind(file_id)
            .bind(chunk_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<i64, _>("received").map(|v| v == 1))
            .transpose()
            .map_err(StoreError::from)
    }

    pub async fn count_received(&self, file_id: &str) -> StoreResult<u32> {
        let row = sqlx::query(
            "SELECT COUNT(*) as n FROM chunks WHERE file_id = ? AND received = 1",
        )
        .bind(file_id)
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u32)
    }

    /// Ascending list of chunk_ids with received=0.
    pub async fn list_missing(&self, file_id: &str) -> StoreResult<Vec<u32>> {
        let rows = sqlx::query(
            "SELECT chunk_id FROM chunks WHERE file_id = ? AND received = 0 ORDER BY chunk_id ASC",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.try_get::<i64, _>("chunk_id").map(|v| v as u32))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    /// Returns the checksum a sender declared for (file_id, chunk_id), if any.
    pub async fn get_chunk_checksum(
        &self,
        file_id: &str,
        chunk_id: u32,
    ) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT checksum FROM chunks WHERE file_id = ? AND chunk_id = ?")
            .bind(file_id)
            .bind(chunk_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<String, _>("checksum"))
            .transpose()
            .map_err(StoreError::from)
    }

    pub async fn increment_errors(&self, file_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE transfer_stats SET errors = errors + 1 WHERE file_id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_stats(&self, file_id: &str) -> StoreResult<Option<TransferStats>> {
        let row = sqlx::query(
            "SELECT file_id, start_time, end_time, total_bytes, chunks_received, errors, avg_speed FROM transfer_stats WHERE file_id = ?",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(TransferStats {
                file_id: r.try_get("file_id")?,
                start_time: r.try_get("start_time")?,
                end_time: r.try_get("end_time")?,
                total_bytes: r.try_get::<i64, _>("total_bytes")? as u64,
                chunks_received: r.try_get::<i64, _>("chunks_received")? as u32,
                errors: r.try_get::<i64, _>("errors")? as u32,
                avg_speed: r.try_get("avg_speed")?,
            })
        })
        .transpose()
    }

    /// Enforces legal transitions: active -> {completed, stale, failed}.
    /// Setting completed also stamps `completed_at = at`.
    pub async fn set_status(
        &self,
        file_id: &str,
        new_status: TransferStatus,
        at: i64,
    ) -> StoreResult<()> {
        let manifest = self
            .get_manifest(file_id)
            .await?
            .ok_or_else(|| StoreError::ManifestNotFound(file_id.to_string()))?;

        let legal = matches!(
            (manifest.status, new_status),
            (TransferStatus::Active, TransferStatus::Completed)
                | (TransferStatus::Active, TransferStatus::Stale)
                | (TransferStatus::Active, TransferStatus::Failed)
        ) || manifest.status as u8 == new_status as u8;

        if !legal {
            return Err(StoreError::IllegalTransition {
                file_id: file_id.to_string(),
                from: manifest.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        if matches!(new_status, TransferStatus::Completed) {
            sqlx::query("UPDATE manifests SET status = ?, completed_at = ? WHERE file_id = ?")
                .bind(new_status.as_str())
                .bind(at)
                .bind(file_id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("UPDATE manifests SET status = ? WHERE file_id = ?")
                .bind(new_status.as_str())
                .bind(file_id)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Sets status=stale for all active manifests with created_at < before.
    pub async fn sweep_stale(&self, before: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE manifests SET status = 'stale' WHERE status = 'active' AND created_at < ?",
        )
        .bind(before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_manifests(&self) -> StoreResult<Vec<Manifest>> {
        let rows = sqlx::query(
            "SELECT file_id, filename, size, chunk_size, total_chunks, priority, status, created_at, completed_at FROM manifests ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_manifest).collect()
    }

    pub async fn get_progress(&self, file_id: &str) -> StoreResult<Option<Progress>> {
        let Some(manifest) = self.get_manifest(file_id).await? else {
            return Ok(None);
        };
        let received = self.count_received(file_id).await?;
        let percent = if manifest.total_chunks == 0 {
            0.0
        } else {
            (received as f64 / manifest.total_chunks as f64) * 100.0
        };

        Ok(Some(Progress {
            file_id: manifest.file_id,
            filename: manifest.filename,
            status: manifest.status,
            total_chunks: manifest.total_chunks,
            received_chunks: received,
            progress_percent: percent,
        }))
    }
}

fn priority_str(p: Priority) -> &'static str {
    match p {
        Priority::High => "high",
        Priority::Normal => "normal",
        Priority::Low => "low",
    }
}

fn row_to_manifest(row: sqlx::sqlite::SqliteRow) -> StoreResult<Manifest> {
    let priority_raw: String = row.try_get("priority")?;
    let status_raw: String = row.try_get("status")?;

    let priority = match priority_raw.as_str() {
        "high" => Priority::High,
        "normal" => Priority::Normal,
        "low" => Priority::Low,
        other => return Err(StoreError::InvalidPriority(other.to_string())),
    };
    let status = TransferStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::InvalidStatus(status_raw.clone()))?;

    Ok(Manifest {
        file_id: row.try_get("file_id")?,
        filename: row.try_get("filename")?,
        size: row.try_get::<i64, _>("size")? as u64,
        chunk_size: row.try_get::<i64, _>("chunk_size")? as u64,
        total_chunks: row.try_get::<i64, _>("total_chunks")? as u32,
        priority,
        status,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manifest(file_id: &str, total_chunks: u32) -> (Manifest, Vec<ChunkMeta>) {
        let manifest = Manifest {
            file_id: file_id.to_string(),
            filename: "test.bin".to_string(),
            size: 1024 * total_chunks as u64,
            chunk_size: 1024,
            total_chunks,
            priority: Priority::Normal,
            status: TransferStatus::Active,
            created_at: 1_000,
            completed_at: None,
        };
        let chunks = (0..total_chunks)
            .map(|i| ChunkMeta {
                chunk_id: i,
                size: 1024,
                checksum: format!("{:064x}", i),
            })
            .collect();
        (manifest, chunks)
    }

    #[tokio::test]
    async fn create_and_get_manifest() {
        let store = Store::new_in_memory().await.unwrap();
        let (manifest, chunks) = test_manifest("f1", 4);
        store.create_manifest(&manifest, &chunks).await.unwrap();

        let loaded = store.get_manifest("f1").await.unwrap().unwrap();
        assert_eq!(loaded.file_id, "f1");
        assert_eq!(loaded.total_chunks, 4);
        assert_eq!(loaded.status, TransferStatus::Active);

        let missing = store.list_missing("f1").await.unwrap();
        assert_eq!(missing, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn mark_chunk_received_is_cas() {
        let store = Store::new_in_memory().await.unwrap();
        let (manifest, chunks) = test_manifest("f1", 2);
        store.create_manifest(&manifest, &chunks).await.unwrap();

        let flipped = store.mark_chunk_received("f1", 0, 100).await.unwrap();
        assert!(flipped);
        assert_eq!(store.count_received("f1").await.unwrap(), 1);

        // Re-marking an already-received chunk flips nothing and reports
        // false — the caller did not win the CAS, so retry_count is not
        // bumped again.
        let flipped_again = store.mark_chunk_received("f1", 0, 200).await.unwrap();
        assert!(!flipped_again);
        assert_eq!(store.count_received("f1").await.unwrap(), 1);
        assert_eq!(store.list_missing("f1").await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn concurrent_mark_chunk_received_has_exactly_one_winner() {
        use std::sync::Arc;

        let store = Arc::new(Store::new_in_memory().await.unwrap());
        let (manifest, chunks) = test_manifest("f1", 1);
        store.create_manifest(&manifest, &chunks).await.unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.mark_chunk_received("f1", 0, 100).await.unwrap() })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.mark_chunk_received("f1", 0, 101).await.unwrap() })
        };

        let (a, b) = tokio::join!(a, b);
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a, b, "exactly one caller should win the CAS");
        assert_eq!(store.count_received("f1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn chunk_received_reads_without_mutating() {
        let store = Store::new_in_memory().await.unwrap();
        let (manifest, chunks) = test_manifest("f1", 2);
        store.create_manifest(&manifest, &chunks).await.unwrap();

        assert_eq!(store.chunk_received("f1", 0).await.unwrap(), Some(false));
        assert_eq!(store.chunk_received("f1", 99).await.unwrap(), None);

        store.mark_chunk_received("f1", 0, 100).await.unwrap();
        assert_eq!(store.chunk_received("f1", 0).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn mark_chunk_received_unknown_row() {
        let store = Store::new_in_memory().await.unwrap();
        let (manifest, chunks) = test_manifest("f1", 1);
        store.create_manifest(&manifest, &chunks).await.unwrap();

        let prior = store.mark_chunk_received("f1", 99, 100).await.unwrap();
        assert!(!prior);
        assert_eq!(store.count_received("f1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_status_enforces_legal_transitions() {
        let store = Store::new_in_memory().await.unwrap();
        let (manifest, chunks) = test_manifest("f1", 1);
        store.create_manifest(&manifest, &chunks).await.unwrap();

        store
            .set_status("f1", TransferStatus::Completed, 500)
            .await
            .unwrap();
        let loaded = store.get_manifest("f1").await.unwrap().unwrap();
        assert_eq!(loaded.status, TransferStatus::Completed);
        assert_eq!(loaded.completed_at, Some(500));

        // completed -> stale is illegal.
        let err = store.set_status("f1", TransferStatus::Stale, 600).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn sweep_stale_only_touches_active_past_cutoff() {
        let store = Store::new_in_memory().await.unwrap();
        let (mut manifest, chunks) = test_manifest("old", 1);
        manifest.created_at = 0;
        store.create_manifest(&manifest, &chunks).await.unwrap();

        let (mut fresh, chunks2) = test_manifest("fresh", 1);
        fresh.created_at = 10_000;
        store.create_manifest(&fresh, &chunks2).await.unwrap();

        let swept = store.sweep_stale(5_000).await.unwrap();
        assert_eq!(swept, 1);

        assert_eq!(
            store.get_manifest("old").await.unwrap().unwrap().status,
            TransferStatus::Stale
        );
        assert_eq!(
            store.get_manifest("fresh").await.unwrap().unwrap().status,
            TransferStatus::Active
        );
    }

    #[tokio::test]
    async fn reregistering_manifest_replaces_chunk_rows() {
        let store = Store::new_in_memory().await.unwrap();
        let (manifest, chunks) = test_manifest("f1", 4);
        store.create_manifest(&manifest, &chunks).await.unwrap();
        store.mark_chunk_received("f1", 0, 100).await.unwrap();

        let (manifest2, chunks2) = test_manifest("f1", 2);
        store.create_manifest(&manifest2, &chunks2).await.unwrap();

        // Fresh chunk rows: prior received flag is gone.
        assert_eq!(store.count_received("f1").await.unwrap(), 0);
        assert_eq!(store.list_missing("f1").await.unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn reposting_identical_manifest_is_a_resume_no_op() {
        let store = Store::new_in_memory().await.unwrap();
        let (manifest, chunks) = test_manifest("f1", 4);
        let outcome = store.create_manifest(&manifest, &chunks).await.unwrap();
        assert_eq!(outcome, CreateManifestOutcome::Created);

        store.mark_chunk_received("f1", 0, 100).await.unwrap();
        store.mark_chunk_received("f1", 1, 150).await.unwrap();

        // Sender retries the exact same manifest post (e.g. after a dropped
        // response); received chunks must survive untouched.
        let outcome = store.create_manifest(&manifest, &chunks).await.unwrap();
        assert_eq!(outcome, CreateManifestOutcome::Resumed { received: 2 });
        assert_eq!(store.count_received("f1").await.unwrap(), 2);
        assert_eq!(store.list_missing("f1").await.unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn record_chunk_commit_accumulates_bytes_atomically() {
        use std::sync::Arc;

        let store = Arc::new(Store::new_in_memory().await.unwrap());
        let (mut manifest, chunks) = test_manifest("f1", 2);
        manifest.created_at = 0;
        store.create_manifest(&manifest, &chunks).await.unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.record_chunk_commit("f1", 1000, 10).await.unwrap() })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.record_chunk_commit("f1", 2000, 10).await.unwrap() })
        };
        let (a, b) = tokio::join!(a, b);
        let (a, b) = (a.unwrap(), b.unwrap());

        // Both concurrent commits' bytes must be reflected; neither lost.
        let stats = store.get_stats("f1").await.unwrap().unwrap();
        assert_eq!(stats.total_bytes, 3000);
        assert_eq!(stats.chunks_received, 2);

        // The two returned `chunks_received` values are a unique sequence.
        assert_ne!(a.chunks_received, b.chunks_received);
        assert_eq!(
            [a.chunks_received, b.chunks_received].iter().max().copied(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn get_progress_reports_percent() {
        let store = Store::new_in_memory().await.unwrap();
        let (manifest, chunks) = test_manifest("f1", 4);
        store.create_manifest(&manifest, &chunks).await.unwrap();
        store.mark_chunk_received("f1", 0, 100).await.unwrap();
        store.mark_chunk_received("f1", 1, 100).await.unwrap();

        let progress = store.get_progress("f1").await.unwrap().unwrap();
        assert_eq!(progress.received_chunks, 2);
        assert!((progress.progress_percent - 50.0).abs() < f64::EPSILON);
    }
}
