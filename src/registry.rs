//! Read-side API over the Store: pure queries with snapshot semantics per
//! call, no caching.

use std::sync::Arc;

use crate::store::{Manifest, Progress, Store, StoreResult};

pub struct TransferRegistry {
    store: Arc<Store>,
}

impl TransferRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> StoreResult<Vec<Manifest>> {
        self.store.list_manifests().await
    }

    pub async fn get(&self, file_id: &str) -> StoreResult<Option<Progress>> {
        self.store.get_progress(file_id).await
    }

    pub async fn list_missing(&self, file_id: &str) -> StoreResult<Vec<u32>> {
        self.store.list_missing(file_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChunkMeta, Priority, TransferStatus};
    use chrono::Utc;

    #[tokio::test]
    async fn list_and_get_reflect_store_state() {
        let store = Arc::new(Store::new_in_memory().await.unwrap());
        let registry = TransferRegistry::new(store.clone());

        let manifest = Manifest {
            file_id: "f1".to_string(),
            filename: "a.bin".to_string(),
            size: 100,
            chunk_size: 50,
            total_chunks: 2,
            priority: Priority::Normal,
            status: TransferStatus::Active,
            created_at: Utc::now().timestamp(),
            completed_at: None,
        };
        let chunks = vec![
            ChunkMeta { chunk_id: 0, size: 50, checksum: "a".repeat(64) },
            ChunkMeta { chunk_id: 1, size: 50, checksum: "b".repeat(64) },
        ];
        store.create_manifest(&manifest, &chunks).await.unwrap();

        let listed = registry.list().await.unwrap();
        assert_eq!(listed.len(), 1);

        let missing = registry.list_missing("f1").await.unwrap();
        assert_eq!(missing, vec![0, 1]);

        let progress = registry.get("f1").await.unwrap().unwrap();
        assert_eq!(progress.received_chunks, 0);
    }
}
