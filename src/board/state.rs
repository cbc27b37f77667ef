//! Board State
//!
//! The in-memory representation of one board's piece set and the mutation
//! rules over it. Uses BTreeMap for stable iteration order.
//!
//! Mutations are only ever driven by the sync engine, which persists each
//! one through the state store; nothing here performs I/O.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::board::piece::{BoardId, ConnectionId, Piece, PieceId};

/// Board bookkeeping carried alongside the piece set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMetadata {
    /// Human-readable board name.
    pub name: String,

    /// When the board was created.
    pub created_at: DateTime<Utc>,

    /// When the board last accepted a mutation.
    pub last_modified_at: DateTime<Utc>,
}

impl BoardMetadata {
    /// Fresh metadata for a new board.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            created_at: now,
            last_modified_at: now,
        }
    }
}

/// One board: an isolated namespace of pieces.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardState {
    /// Board identifier.
    pub id: BoardId,

    /// Pieces keyed by id. The map key is the identity; inserting an
    /// existing id shadows the old piece (caller error, not enforced).
    pub pieces: BTreeMap<PieceId, Piece>,

    /// Board metadata.
    pub metadata: BoardMetadata,
}

impl BoardState {
    /// Create an empty board.
    pub fn new(id: BoardId, name: impl Into<String>) -> Self {
        Self {
            id,
            pieces: BTreeMap::new(),
            metadata: BoardMetadata::new(name),
        }
    }

    /// Rebuild a board from a persisted piece set.
    pub fn with_pieces(id: BoardId, name: impl Into<String>, pieces: Vec<Piece>) -> Self {
        let mut board = Self::new(id, name);
        for piece in pieces {
            board.pieces.insert(piece.id.clone(), piece);
        }
        board
    }

    /// Add a piece. No uniqueness check beyond the map key: a duplicate id
    /// replaces the previous entry.
    pub fn add_piece(&mut self, piece: Piece) {
        self.pieces.insert(piece.id.clone(), piece);
        self.touch();
    }

    /// Merge a position update into the matching piece, recording the mover.
    ///
    /// Returns false (no-op) when no piece with that id exists.
    pub fn update_piece(
        &mut self,
        id: &PieceId,
        x: f64,
        y: f64,
        mover: ConnectionId,
    ) -> bool {
        match self.pieces.get_mut(id) {
            Some(piece) => {
                piece.x = x;
                piece.y = y;
                piece.owner = Some(mover);
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Remove a piece. Idempotent: removing an absent id returns false
    /// without error.
    pub fn remove_piece(&mut self, id: &PieceId) -> bool {
        let removed = self.pieces.remove(id).is_some();
        if removed {
            self.touch();
        }
        removed
    }

    /// Look up a piece by id.
    pub fn get_piece(&self, id: &PieceId) -> Option<&Piece> {
        self.pieces.get(id)
    }

    /// Read-only snapshot of the piece set.
    pub fn all_pieces(&self) -> Vec<Piece> {
        self.pieces.values().cloned().collect()
    }

    /// Number of pieces on the board.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    fn touch(&mut self) {
        self.metadata.last_modified_at = Utc::now();
    }
}
