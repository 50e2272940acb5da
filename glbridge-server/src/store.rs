//! In-memory store for the latest published artifact
//!
//! The store holds at most one artifact behind an `Arc`. Publishing swaps the
//! pointer under a write lock that is held only for the swap, so readers
//! either see the previous artifact or the new one, never a mix of both.

use crate::artifact::{size_mb, PublishedArtifact};
use glbridge_core::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Acknowledgement returned to whoever published an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub size: usize,
    pub size_mb: String,
}

/// Destination for exported artifacts
pub trait Publisher: Send + Sync {
    fn publish(&self, artifact: PublishedArtifact) -> Result<PublishReceipt>;
}

#[derive(Debug, Default)]
pub struct ModelStore {
    latest: RwLock<Option<Arc<PublishedArtifact>>>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored artifact, returning the previous one
    pub fn swap(&self, artifact: PublishedArtifact) -> Option<Arc<PublishedArtifact>> {
        let next = Arc::new(artifact);
        self.latest.write().replace(next)
    }

    pub fn latest(&self) -> Option<Arc<PublishedArtifact>> {
        self.latest.read().clone()
    }

    pub fn clear(&self) {
        if self.latest.write().take().is_some() {
            debug!("model store cleared");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.latest.read().is_none()
    }
}

impl Publisher for ModelStore {
    fn publish(&self, artifact: PublishedArtifact) -> Result<PublishReceipt> {
        let receipt = PublishReceipt {
            size: artifact.len(),
            size_mb: size_mb(artifact.len()),
        };
        let filename = artifact.metadata.filename.clone();
        self.swap(artifact);
        info!(filename = %filename, size = receipt.size, "artifact published");
        Ok(receipt)
    }
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn publish(&self, artifact: PublishedArtifact) -> Result<PublishReceipt> {
        (**self).publish(artifact)
    }
}
