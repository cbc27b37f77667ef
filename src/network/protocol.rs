//! Protocol Events
//!
//! Wire format for client-server communication over WebSocket, serialized
//! as JSON. Event names and payload field names are a compatibility
//! contract with existing clients and must not change: the `type` tag is
//! kebab-case and payload fields are camelCase.

use serde::{Deserialize, Serialize};

use crate::board::Piece;

// =============================================================================
// CLIENT -> SERVER EVENTS
// =============================================================================

/// Events sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Request the full current state of the joined board.
    GetGameState,

    /// Request an exclusive lock token on a piece.
    RequestToken { piece_id: String },

    /// Release a held lock token.
    ReleaseToken { piece_id: String },

    /// High-frequency, unpersisted drag position update.
    DragPiece { piece_id: String, x: f64, y: f64 },

    /// Authoritative position commit (drag end).
    MovePiece { piece_id: String, x: f64, y: f64 },

    /// Add a new piece to the board.
    AddPiece {
        piece_id: String,
        asset_url: String,
        x: f64,
        y: f64,
    },

    /// Remove a piece from the board.
    RemovePiece { piece_id: String },

    /// Join a room (leaving any previous room).
    JoinRoom { room_code: String },
}

// =============================================================================
// SERVER -> CLIENT EVENTS
// =============================================================================

/// Events sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Full board state, sent to one requester or joiner.
    GameState { room: String, pieces: Vec<Piece> },

    /// Lock token granted to the requester.
    TokenGranted { piece_id: String },

    /// Lock token denied to the requester.
    TokenDenied { piece_id: String },

    /// Another player locked a piece.
    PieceLocked { piece_id: String, player_id: String },

    /// A piece's lock was released, explicitly or on disconnect.
    PieceUnlocked { piece_id: String },

    /// Ephemeral drag position from another player.
    PieceDragged {
        piece_id: String,
        x: f64,
        y: f64,
        player_id: String,
    },

    /// Authoritative piece move.
    PieceMoved {
        piece_id: String,
        x: f64,
        y: f64,
        player_id: String,
    },

    /// A piece was added.
    PieceAdded {
        piece_id: String,
        x: f64,
        y: f64,
        asset_url: String,
        player_id: String,
    },

    /// A piece was removed.
    PieceRemoved { piece_id: String, player_id: String },

    /// A player joined the room.
    PlayerJoined { player_id: String },

    /// A player left the room.
    PlayerLeft { player_id: String },

    /// Request failed; human-readable reason.
    Error { message: String },
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientEvent {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerEvent {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_names() {
        let event = ClientEvent::MovePiece {
            piece_id: "p1".into(),
            x: 10.0,
            y: 20.0,
        };
        let json = event.to_json().unwrap();
        assert!(json.contains("\"type\":\"move-piece\""));
        assert!(json.contains("\"pieceId\":\"p1\""));
    }

    #[test]
    fn test_client_event_json_roundtrip() {
        let json = r#"{"type":"add-piece","pieceId":"p2","assetUrl":"/a.png","x":1.5,"y":2.5}"#;
        let event = ClientEvent::from_json(json).unwrap();
        match event {
            ClientEvent::AddPiece {
                piece_id,
                asset_url,
                x,
                y,
            } => {
                assert_eq!(piece_id, "p2");
                assert_eq!(asset_url, "/a.png");
                assert_eq!((x, y), (1.5, 2.5));
            }
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn test_join_room_wire_name() {
        let json = r#"{"type":"join-room","roomCode":"table-7"}"#;
        let event = ClientEvent::from_json(json).unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom { room_code } if room_code == "table-7"));
    }

    #[test]
    fn test_server_event_wire_names() {
        let cases = vec![
            (
                ServerEvent::TokenGranted {
                    piece_id: "p1".into(),
                },
                "token-granted",
            ),
            (
                ServerEvent::PieceLocked {
                    piece_id: "p1".into(),
                    player_id: "c1".into(),
                },
                "piece-locked",
            ),
            (
                ServerEvent::PieceUnlocked {
                    piece_id: "p1".into(),
                },
                "piece-unlocked",
            ),
            (
                ServerEvent::PlayerLeft {
                    player_id: "c1".into(),
                },
                "player-left",
            ),
            (
                ServerEvent::Error {
                    message: "nope".into(),
                },
                "error",
            ),
        ];

        for (event, name) in cases {
            let json = event.to_json().unwrap();
            assert!(
                json.contains(&format!("\"type\":\"{name}\"")),
                "missing {name} in {json}"
            );
        }
    }

    #[test]
    fn test_game_state_carries_pieces() {
        use crate::board::PieceId;

        let event = ServerEvent::GameState {
            room: "table-7".into(),
            pieces: vec![Piece::new(PieceId::new("p1"), "/a.png", 3.0, 4.0)],
        };
        let json = event.to_json().unwrap();
        assert!(json.contains("\"type\":\"game-state\""));
        assert!(json.contains("\"assetRef\""));

        let back = ServerEvent::from_json(&json).unwrap();
        match back {
            ServerEvent::GameState { pieces, .. } => assert_eq!(pieces.len(), 1),
            other => panic!("wrong event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        assert!(ClientEvent::from_json(r#"{"type":"fire-missiles"}"#).is_err());
    }
}
