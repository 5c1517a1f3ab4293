//! Narrow capabilities the engine hands to its collaborators
//!
//! The tracker only needs to read snapshots, the sleep timer only needs to
//! pause and flush, and the remote bridge only needs transport controls.
//! Splitting them out keeps those components testable without a real engine.

use crate::error::EngineResult;
use async_trait::async_trait;
use taleplay_core::PlaybackSnapshot;

/// Read access to the latest published snapshot
pub trait SnapshotSource: Send + Sync {
    fn current_snapshot(&self) -> PlaybackSnapshot;
}

/// Transport controls exposed to the sleep timer and remote commands
#[async_trait]
pub trait PlaybackControl: SnapshotSource {
    async fn pause(&self) -> EngineResult<()>;

    async fn resume(&self) -> EngineResult<()>;

    async fn seek(&self, position_secs: f64) -> EngineResult<()>;

    async fn skip_by(&self, delta_secs: f64) -> EngineResult<()>;
}

/// Persists the current position on demand
#[async_trait]
pub trait ProgressFlush: Send + Sync {
    async fn flush(&self) -> EngineResult<()>;
}
