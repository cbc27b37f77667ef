//! Saved States
//!
//! Snapshots are immutable, timestamped copies of a board's piece set.
//! History is append-only; each board also carries a single "current"
//! pointer selecting which snapshot is live. Asset records are the
//! metadata side of uploaded images referenced by pieces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::board::piece::Piece;

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Identifier for one saved state.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    /// Wrap a caller-supplied or generated id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Auto-generated id for an unnamed save: `state-<millis>`, with a
    /// sequence suffix to break ties inside one millisecond.
    pub fn generated(at: DateTime<Utc>, seq: u64) -> Self {
        if seq == 0 {
            Self(format!("state-{}", at.timestamp_millis()))
        } else {
            Self(format!("state-{}-{}", at.timestamp_millis(), seq))
        }
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable saved copy of a board's piece set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Snapshot identifier (generated or caller-supplied name-derived).
    pub id: SnapshotId,

    /// Caller-supplied name, if the save was named.
    pub name: Option<String>,

    /// The saved piece set.
    pub pieces: Vec<Piece>,

    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,

    /// Manual saves are kept forever; automatic ones are pruned.
    pub manual: bool,
}

impl Snapshot {
    /// Take a snapshot of a piece set now.
    pub fn take(id: SnapshotId, name: Option<String>, pieces: Vec<Piece>, manual: bool) -> Self {
        Self {
            id,
            name,
            pieces,
            saved_at: Utc::now(),
            manual,
        }
    }
}

/// Summary row returned by state listings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    /// Snapshot identifier.
    pub id: SnapshotId,
    /// Caller-supplied name, if any.
    pub name: Option<String>,
    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,
    /// Whether the save was manual.
    pub manual: bool,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(s: &Snapshot) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            saved_at: s.saved_at,
            manual: s.manual,
        }
    }
}

// =============================================================================
// ASSET METADATA
// =============================================================================

/// Registered metadata for an uploaded image referenced by `asset_ref`.
///
/// Storage of the actual bytes is out of scope; this is the record the
/// HTTP surface serves and pieces point at.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Asset identifier.
    pub id: String,

    /// Stored filename.
    pub filename: String,

    /// Filename as uploaded by the client.
    pub original_name: String,

    /// MIME type.
    pub mime_type: String,

    /// Size in bytes.
    pub size: u64,

    /// When the asset was registered.
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::piece::PieceId;

    #[test]
    fn test_generated_id_format() {
        let at = Utc::now();
        let id = SnapshotId::generated(at, 0);
        assert_eq!(id.as_str(), format!("state-{}", at.timestamp_millis()));

        let tied = SnapshotId::generated(at, 3);
        assert_eq!(tied.as_str(), format!("state-{}-3", at.timestamp_millis()));
    }

    #[test]
    fn test_snapshot_serde_shape() {
        let snap = Snapshot::take(
            SnapshotId::new("state-1"),
            Some("opening".into()),
            vec![Piece::new(PieceId::new("p1"), "/a.png", 1.0, 2.0)],
            true,
        );
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"savedAt\""));
        assert!(json.contains("\"manual\":true"));

        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pieces.len(), 1);
        assert_eq!(back.name.as_deref(), Some("opening"));
    }

    #[test]
    fn test_summary_from_snapshot() {
        let snap = Snapshot::take(SnapshotId::new("s"), None, Vec::new(), false);
        let summary = SnapshotSummary::from(&snap);
        assert_eq!(summary.id, snap.id);
        assert!(!summary.manual);
    }
}
