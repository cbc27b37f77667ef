//! Piece and Identifier Types
//!
//! Identity newtypes for boards, pieces and connections, plus the piece
//! record itself. Board and piece ids are caller-supplied strings (they
//! travel on the wire verbatim); connection ids are server-generated UUIDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// CONNECTION ID
// =============================================================================

/// Opaque identifier for one connected client session (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct ConnectionId(pub [u8; 16]);

impl ConnectionId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random id for a newly accepted connection.
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Parse from a UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(|u| Self(*u.as_bytes()))
    }

    /// Render as a UUID string (this is the wire-facing `playerId`).
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_uuid_string())
    }
}

// =============================================================================
// BOARD / PIECE IDS
// =============================================================================

/// Identifier for one board (one room = one board namespace).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(pub String);

impl BoardId {
    /// Wrap a room code / board name.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BoardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for one piece, unique within its board.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PieceId(pub String);

impl PieceId {
    /// Wrap a caller-supplied piece id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PieceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// PIECE
// =============================================================================

/// A positioned, asset-referencing movable object on a board.
///
/// `owner` records the last connection that performed an authorized move,
/// not a permanent possession; lock state lives in the token authority.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Piece {
    /// Unique id within the board.
    pub id: PieceId,

    /// X position on the board.
    pub x: f64,

    /// Y position on the board.
    pub y: f64,

    /// Reference to the image asset this piece renders with.
    pub asset_ref: String,

    /// Last authorized mover (None until first authorized mutation).
    pub owner: Option<ConnectionId>,

    /// When the piece was added to the board.
    pub created_at: DateTime<Utc>,
}

impl Piece {
    /// Create a new piece at a position.
    pub fn new(id: PieceId, asset_ref: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id,
            x,
            y,
            asset_ref: asset_ref.into(),
            owner: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_uuid_roundtrip() {
        let id = ConnectionId::random();
        let s = id.to_uuid_string();
        let parsed = ConnectionId::from_uuid_str(&s).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_connection_id_rejects_bad_string() {
        assert!(ConnectionId::from_uuid_str("not-a-uuid").is_none());
    }

    #[test]
    fn test_piece_serde_field_names() {
        let piece = Piece::new(PieceId::new("p1"), "/assets/a.png", 10.0, 20.0);
        let json = serde_json::to_string(&piece).unwrap();
        assert!(json.contains("\"assetRef\""));
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"p1\""));
    }

    #[test]
    fn test_board_id_transparent_serde() {
        let id = BoardId::new("room-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"room-42\"");
    }
}
