//! JSON File State Store
//!
//! One JSON document per board under a data directory, rewritten in full
//! on every save (write to a temp file, then rename). Asset records live
//! in a single `assets.json`. Durability beyond the rename is out of
//! scope; the document format is an implementation detail.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::board::{Asset, BoardId, Piece, Snapshot, SnapshotId, SnapshotSummary};
use crate::store::{SaveReceipt, StateStore, StoreError};
use crate::AUTOSAVE_KEEP;

/// Persisted per-board document.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoardDocument {
    id: String,
    name: String,
    snapshots: Vec<Snapshot>,
    current: Option<SnapshotId>,
}

impl BoardDocument {
    fn current_pieces(&self) -> Vec<Piece> {
        self.current
            .as_ref()
            .and_then(|id| self.snapshots.iter().find(|s| &s.id == id))
            .map(|s| s.pieces.clone())
            .unwrap_or_default()
    }

    fn append_snapshot(
        &mut self,
        pieces: Vec<Piece>,
        name: Option<String>,
        manual: bool,
    ) -> SaveReceipt {
        let now = chrono::Utc::now();
        let id = match &name {
            Some(n) => SnapshotId::new(n.clone()),
            None => {
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

        self.snapshots.retain(|s| s.id != id);
        let snapshot = Snapshot::take(id.clone(), name, pieces, manual);
        let saved_at = snapshot.saved_at;
        self.snapshots.push(snapshot);
        self.current = Some(id.clone());

        let auto_count = self.snapshots.iter().filter(|s| !s.manual).count();
        if auto_count > AUTOSAVE_KEEP {
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

        SaveReceipt {
            state_id: id,
            saved_at,
        }
    }
}

/// File-backed implementation of [`StateStore`].
///
/// A single mutex serializes document rewrites; reads load from disk so a
/// concurrently restarted process sees the same files.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn board_path(&self, board: &BoardId) -> PathBuf {
        // Board ids come off the wire; flatten anything path-like.
        let safe: String = board
            .as_str()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("board-{safe}.json"))
    }

    fn assets_path(&self) -> PathBuf {
        self.dir.join("assets.json")
    }

    async fn load_board(&self, board: &BoardId) -> Result<Option<BoardDocument>, StoreError> {
        match tokio::fs::read(self.board_path(board)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn load_assets(&self) -> Result<Vec<Asset>, StoreError> {
        match tokio::fs::read(self.assets_path()).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn get_current_state(&self, board: &BoardId) -> Result<Vec<Piece>, StoreError> {
        Ok(self
            .load_board(board)
            .await?
            .map(|doc| doc.current_pieces())
            .unwrap_or_default())
    }

    async fn save_state(
        &self,
        board: &BoardId,
        pieces: Vec<Piece>,
        name: Option<String>,
        is_manual: bool,
    ) -> Result<SaveReceipt, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load_board(board).await?.unwrap_or_else(|| BoardDocument {
            id: board.as_str().to_string(),
            name: board.as_str().to_string(),
            ..Default::default()
        });
        let receipt = doc.append_snapshot(pieces, name, is_manual);
        self.write_json(&self.board_path(board), &doc).await?;
        Ok(receipt)
    }

    async fn list_states(
        &self,
        board: &BoardId,
        limit: usize,
        manual_only: bool,
    ) -> Result<Vec<SnapshotSummary>, StoreError> {
        let doc = self
            .load_board(board)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("board {board}")))?;

        let mut summaries: Vec<SnapshotSummary> = doc
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
        let _guard = self.write_lock.lock().await;
        let Some(mut doc) = self.load_board(board).await? else {
            return Ok(false);
        };
        if !doc.snapshots.iter().any(|s| &s.id == state) {
            return Ok(false);
        }
        doc.current = Some(state.clone());
        self.write_json(&self.board_path(board), &doc).await?;
        Ok(true)
    }

    async fn delete_state(&self, state: &SnapshotId, board: &BoardId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut doc) = self.load_board(board).await? else {
            return Ok(false);
        };
        let before = doc.snapshots.len();
        doc.snapshots.retain(|s| &s.id != state);
        let removed = doc.snapshots.len() < before;
        if removed {
            self.write_json(&self.board_path(board), &doc).await?;
        }
        Ok(removed)
    }

    async fn create_board(&self, board: &BoardId, name: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.load_board(board).await?.is_some() {
            return Ok(());
        }
        let doc = BoardDocument {
            id: board.as_str().to_string(),
            name: name.to_string(),
            ..Default::default()
        };
        self.write_json(&self.board_path(board), &doc).await
    }

    async fn list_boards(&self) -> Result<Vec<BoardId>, StoreError> {
        let mut boards = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = name.strip_prefix("board-").and_then(|n| n.strip_suffix(".json")) {
                // The filename is a flattened form; the real id lives in
                // the document.
                let board = BoardId::new(stem);
                match self.load_board(&board).await {
                    Ok(Some(doc)) => boards.push(BoardId::new(doc.id)),
                    Ok(None) => {}
                    Err(e) => warn!("skipping unreadable board file {name}: {e}"),
                }
            }
        }
        boards.sort();
        Ok(boards)
    }

    async fn put_asset(&self, asset: Asset) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut assets = self.load_assets().await?;
        assets.retain(|a| a.id != asset.id);
        assets.push(asset);
        self.write_json(&self.assets_path(), &assets).await
    }

    async fn list_assets(&self) -> Result<Vec<Asset>, StoreError> {
        let mut assets = self.load_assets().await?;
        assets.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(assets)
    }

    async fn get_asset(&self, id: &str) -> Result<Option<Asset>, StoreError> {
        Ok(self.load_assets().await?.into_iter().find(|a| a.id == id))
    }

    async fn delete_asset(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut assets = self.load_assets().await?;
        let before = assets.len();
        assets.retain(|a| a.id != id);
        let removed = assets.len() < before;
        if removed {
            self.write_json(&self.assets_path(), &assets).await?;
        }
        Ok(removed)
    }
}
