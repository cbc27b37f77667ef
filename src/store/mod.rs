//! State Store
//!
//! Persistence seam for board snapshots and asset records. The sync
//! engine and the HTTP surface only ever talk to the `StateStore` trait;
//! the implementations here are an in-memory store (tests, default) and a
//! JSON-file store (one document per board).

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::board::{Asset, BoardId, Piece, SnapshotId, SnapshotSummary};

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Board, snapshot or asset not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Underlying I/O failure.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt or unreadable persisted document.
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Receipt returned by a successful save.
#[derive(Clone, Debug)]
pub struct SaveReceipt {
    /// Id of the snapshot that was created.
    pub state_id: SnapshotId,
    /// When it was saved.
    pub saved_at: DateTime<Utc>,
}

/// Persists and retrieves board snapshots and asset records.
///
/// The store has no partial-update primitive: callers read the current
/// piece set, modify it, and save the whole set back. Serializing those
/// read-modify-write cycles is the caller's job (the engine holds a
/// per-board write lock).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Pieces of the board's current snapshot; empty when the board has no
    /// resolvable current state.
    async fn get_current_state(&self, board: &BoardId) -> Result<Vec<Piece>, StoreError>;

    /// Append a snapshot of `pieces` and make it the board's current state.
    /// Creates the board record on first save.
    async fn save_state(
        &self,
        board: &BoardId,
        pieces: Vec<Piece>,
        name: Option<String>,
        is_manual: bool,
    ) -> Result<SaveReceipt, StoreError>;

    /// List snapshots, newest first.
    async fn list_states(
        &self,
        board: &BoardId,
        limit: usize,
        manual_only: bool,
    ) -> Result<Vec<SnapshotSummary>, StoreError>;

    /// Point the board's current state at an existing snapshot.
    /// Returns false when the snapshot does not exist.
    async fn switch_to_state(&self, state: &SnapshotId, board: &BoardId)
        -> Result<bool, StoreError>;

    /// Delete one snapshot. Deleting the current snapshot leaves the board
    /// with no current state (it reads as empty).
    async fn delete_state(&self, state: &SnapshotId, board: &BoardId) -> Result<bool, StoreError>;

    /// Create an empty board record.
    async fn create_board(&self, board: &BoardId, name: &str) -> Result<(), StoreError>;

    /// Ids of every known board.
    async fn list_boards(&self) -> Result<Vec<BoardId>, StoreError>;

    /// Register an asset record.
    async fn put_asset(&self, asset: Asset) -> Result<(), StoreError>;

    /// All registered assets, newest first.
    async fn list_assets(&self) -> Result<Vec<Asset>, StoreError>;

    /// One asset record by id.
    async fn get_asset(&self, id: &str) -> Result<Option<Asset>, StoreError>;

    /// Remove an asset record. Idempotent.
    async fn delete_asset(&self, id: &str) -> Result<bool, StoreError>;
}
