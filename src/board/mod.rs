//! Board Domain Model
//!
//! Pieces, boards, snapshots and the lock-token authority.
//! Everything in this module is plain owned state; all I/O lives in
//! `store/` and `network/`.

pub mod piece;
pub mod snapshot;
pub mod state;
pub mod token;

pub use piece::{BoardId, ConnectionId, Piece, PieceId};
pub use snapshot::{Asset, Snapshot, SnapshotId, SnapshotSummary};
pub use state::{BoardMetadata, BoardState};
pub use token::{Grant, Token, TokenAuthority};
