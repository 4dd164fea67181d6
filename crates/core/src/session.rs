use crate::orchestrator::QueryPipeline;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The single active query pipeline of the process.
///
/// Replacing the pipeline is an `Arc` swap under a write lock, and readers
/// only hold the lock long enough to clone the `Arc`. A query that already
/// holds a pipeline finishes against that index even if an ingestion swaps
/// in a new one meanwhile. Concurrent ingestions remain last-writer-wins.
#[derive(Default)]
pub struct SessionState {
    slot: RwLock<Option<Arc<QueryPipeline>>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally installs `pipeline`, returning the one it replaced.
    pub async fn set(&self, pipeline: Arc<QueryPipeline>) -> Option<Arc<QueryPipeline>> {
        self.slot.write().await.replace(pipeline)
    }

    pub async fn get(&self) -> Option<Arc<QueryPipeline>> {
        self.slot.read().await.clone()
    }

    pub async fn clear(&self) -> Option<Arc<QueryPipeline>> {
        self.slot.write().await.take()
    }
}
