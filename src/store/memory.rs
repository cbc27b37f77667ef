//! In-Memory State Store
//!
//! Default store for tests and single-process deployments. Holds every
//! board record behind one RwLock; snapshot history is append-only with
//! automatic saves pruned to the retention window.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::board::{Asset, BoardId, Piece, Snapshot, SnapshotId, SnapshotSummary};
use crate::store::{SaveReceipt, StateStore, StoreError};
use crate::AUTOSAVE_KEEP;

/// Per-board record: snapshot history plus the current pointer.
#[derive(Debug, Default)]
pub(crate) struct BoardRecord {
    pub(crate) snapshots: Vec<Snapshot>,
    pub(crate) current: Option<SnapshotId>,
}

impl BoardRecord {
    pub(crate) fn current_pieces(&self) -> Vec<Piece> {
        // The pointer must reference an existing snapshot; otherwise the
        // board reads as empty.
        self.current
            .as_ref()
            .and_then(|id| self.snapshots.iter().find(|s| &s.id == id))
            .map(|s| s.pieces.clone())
            .unwrap_or_default()
    }

    pub(crate) fn append_snapshot(
        &mut self,
        pieces: Vec<Piece>,
        name: Option<String>,
        manual: bool,
    ) -> SaveReceipt {
        let now = chrono::Utc::now();
        let id = match &name {
            Some(n) => SnapshotId::new(n.clone()),
            None => {
                // Tie-break saves landing in the same millisecond.
                let mut seq = 0;
                loop {
                    let candidate = SnapshotId::generated(now, seq);
                    if !self.snapshots.iter().any(|s| s.id == candidate) {
                        break candidate;
                    }
                    seq += 1;
                }
            }
        };

        // A named save replaces any previous snapshot with the same name.
        self.snapshots.retain(|s| s.id != id);
        let snapshot = Snapshot::take(id.clone(), name, pieces, manual);
        let saved_at = snapshot.saved_at;
        self.snapshots.push(snapshot);
        self.current = Some(id.clone());

        self.prune_autosaves();

        SaveReceipt {
            state_id: id,
            saved_at,
        }
    }

    fn prune_autosaves(&mut self) {
        let auto_count = self.snapshots.iter().filter(|s| !s.manual).count();
        if auto_count <= AUTOSAVE_KEEP {
            return;
        }
        let mut excess = auto_count - AUTOSAVE_KEEP;
        let current = self.current.clone();
        self.snapshots.retain(|s| {
            if excess > 0 && !s.manual && Some(&s.id) != current.as_ref() {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }
}

/// In-memory implementation of [`StateStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    boards: RwLock<BTreeMap<BoardId, BoardRecord>>,
    assets: RwLock<Vec<Asset>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_current_state(&self, board: &BoardId) -> Result<Vec<Piece>, StoreError> {
        let boards = self.boards.read().await;
        Ok(boards
            .get(board)
            .map(BoardRecord::current_pieces)
            .unwrap_or_default())
    }

    async fn save_state(
        &self,
        board: &BoardId,
        pieces: Vec<Piece>,
        name: Option<String>,
        is_manual: bool,
    ) -> Result<SaveReceipt, StoreError> {
        let mut boards = self.boards.write().await;
        let record = boards.entry(board.clone()).or_default();
        Ok(record.append_snapshot(pieces, name, is_manual))
    }

    async fn list_states(
        &self,
        board: &BoardId,
        limit: usize,
        manual_only: bool,
    ) -> Result<Vec<SnapshotSummary>, StoreError> {
        let boards = self.boards.read().await;
        let record = boards
            .get(board)
            .ok_or_else(|| StoreError::NotFound(format!("board {board}")))?;

        let mut summaries: Vec<SnapshotSummary> = record
            .snapshots
            .iter()
            .filter(|s| !manual_only || s.manual)
            .map(SnapshotSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn switch_to_state(
        &self,
        state: &SnapshotId,
        board: &BoardId,
    ) -> Result<bool, StoreError> {
        let mut boards = self.boards.write().await;
        let Some(record) = boards.get_mut(board) else {
            return Ok(false);
        };
        if record.snapshots.iter().any(|s| &s.id == state) {
            record.current = Some(state.clone());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete_state(&self, state: &SnapshotId, board: &BoardId) -> Result<bool, StoreError> {
        let mut boards = self.boards.write().await;
        let Some(record) = boards.get_mut(board) else {
            return Ok(false);
        };
        let before = record.snapshots.len();
        record.snapshots.retain(|s| &s.id != state);
        Ok(record.snapshots.len() < before)
    }

    async fn create_board(&self, board: &BoardId, _name: &str) -> Result<(), StoreError> {
        let mut boards = self.boards.write().await;
        boards.entry(board.clone()).or_default();
        Ok(())
    }

    async fn list_boards(&self) -> Result<Vec<BoardId>, StoreError> {
        let boards = self.boards.read().await;
        Ok(boards.keys().cloned().collect())
    }

    async fn put_asset(&self, asset: Asset) -> Result<(), StoreError> {
        let mut assets = self.assets.write().await;
        assets.retain(|a| a.id != asset.id);
        assets.push(asset);
        Ok(())
    }

    async fn list_assets(&self) -> Result<Vec<Asset>, StoreError> {
        let assets = self.assets.read().await;
        let mut list = assets.clone();
        list.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(list)
    }

    async fn get_asset(&self, id: &str) -> Result<Option<Asset>, StoreError> {
        let assets = self.assets.read().await;
        Ok(assets.iter().find(|a| a.id == id).cloned())
    }

    async fn delete_asset(&self, id: &str) -> Result<bool, StoreError> {
        let mut assets = self.assets.write().await;
        let before = assets.len();
        assets.retain(|a| a.id != id);
        Ok(assets.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::PieceId;

    fn board() -> BoardId {
        BoardId::new("b1")
    }

    fn pieces(n: usize) -> Vec<Piece> {
        (0..n)
            .map(|i| Piece::new(PieceId::new(format!("p{i}")), "/a.png", i as f64, 0.0))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_board_reads_empty() {
        let store = MemoryStore::new();
        let state = store.get_current_state(&board()).await.unwrap();
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_read_back() {
        let store = MemoryStore::new();
        let receipt = store
            .save_state(&board(), pieces(2), None, false)
            .await
            .unwrap();
        assert!(receipt.state_id.as_str().starts_with("state-"));

        let state = store.get_current_state(&board()).await.unwrap();
        assert_eq!(state.len(), 2);
    }

    #[tokio::test]
    async fn test_switch_to_state() {
        let store = MemoryStore::new();
        let first = store
            .save_state(&board(), pieces(1), None, false)
            .await
            .unwrap();
        store
            .save_state(&board(), pieces(3), None, false)
            .await
            .unwrap();
        assert_eq!(store.get_current_state(&board()).await.unwrap().len(), 3);

        assert!(store
            .switch_to_state(&first.state_id, &board())
            .await
            .unwrap());
        assert_eq!(store.get_current_state(&board()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_switch_to_missing_state_is_false() {
        let store = MemoryStore::new();
        store
            .save_state(&board(), pieces(1), None, false)
            .await
            .unwrap();
        let ok = store
            .switch_to_state(&SnapshotId::new("ghost"), &board())
            .await
            .unwrap();
        assert!(!ok);
        // Current state untouched.
        assert_eq!(store.get_current_state(&board()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deleting_current_snapshot_empties_board() {
        let store = MemoryStore::new();
        let receipt = store
            .save_state(&board(), pieces(2), None, false)
            .await
            .unwrap();
        assert!(store
            .delete_state(&receipt.state_id, &board())
            .await
            .unwrap());
        // Dangling pointer: the board reads as empty, not as an error.
        assert!(store.get_current_state(&board()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_states_newest_first_with_limit() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .save_state(&board(), pieces(i), None, false)
                .await
                .unwrap();
        }
        let list = store.list_states(&board(), 3, false).await.unwrap();
        assert_eq!(list.len(), 3);
        assert!(list[0].saved_at >= list[1].saved_at);
    }

    #[tokio::test]
    async fn test_manual_only_listing() {
        let store = MemoryStore::new();
        store
            .save_state(&board(), pieces(1), None, false)
            .await
            .unwrap();
        store
            .save_state(&board(), pieces(2), Some("opening".into()), true)
            .await
            .unwrap();

        let list = store.list_states(&board(), 10, true).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name.as_deref(), Some("opening"));
    }

    #[tokio::test]
    async fn test_autosave_pruning_spares_manual_saves() {
        let store = MemoryStore::new();
        store
            .save_state(&board(), pieces(1), Some("keep-me".into()), true)
            .await
            .unwrap();
        for _ in 0..(AUTOSAVE_KEEP + 10) {
            store
                .save_state(&board(), pieces(1), None, false)
                .await
                .unwrap();
        }

        let all = store.list_states(&board(), usize::MAX, false).await.unwrap();
        let autos = all.iter().filter(|s| !s.manual).count();
        assert!(autos <= AUTOSAVE_KEEP);
        assert!(all.iter().any(|s| s.name.as_deref() == Some("keep-me")));
    }

    #[tokio::test]
    async fn test_named_save_replaces_same_name() {
        let store = MemoryStore::new();
        store
            .save_state(&board(), pieces(1), Some("opening".into()), true)
            .await
            .unwrap();
        store
            .save_state(&board(), pieces(4), Some("opening".into()), true)
            .await
            .unwrap();

        let list = store.list_states(&board(), 10, true).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(store.get_current_state(&board()).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_asset_crud() {
        let store = MemoryStore::new();
        let asset = Asset {
            id: "a1".into(),
            filename: "a1.png".into(),
            original_name: "dragon.png".into(),
            mime_type: "image/png".into(),
            size: 1024,
            uploaded_at: chrono::Utc::now(),
        };
        store.put_asset(asset.clone()).await.unwrap();

        assert_eq!(store.list_assets().await.unwrap().len(), 1);
        assert!(store.get_asset("a1").await.unwrap().is_some());
        assert!(store.delete_asset("a1").await.unwrap());
        assert!(!store.delete_asset("a1").await.unwrap());
    }
}
