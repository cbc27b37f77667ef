//! Sync Engine
//!
//! The protocol state machine: interprets each client-originated event,
//! enforces lock-token authority, mutates board state through the state
//! store, and fans resulting events out through the session registry.
//!
//! Every mutating operation on a board runs under that board's write lock
//! for the whole read-modify-write cycle. The store only has a
//! whole-state save primitive, so without the lock two concurrent moves
//! on different pieces of the same board could overwrite each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::board::{BoardId, BoardState, ConnectionId, Piece, PieceId, TokenAuthority};
use crate::network::protocol::{ClientEvent, ServerEvent};
use crate::network::registry::SessionRegistry;
use crate::store::StateStore;

/// Per-board write locks, created on demand.
#[derive(Default)]
struct BoardLocks {
    inner: Mutex<BTreeMap<BoardId, Arc<Mutex<()>>>>,
}

impl BoardLocks {
    async fn acquire(&self, board: &BoardId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            locks
                .entry(board.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Validates, applies and broadcasts every client event.
///
/// Owns the token authority; borrows the store and registry shared with
/// the rest of the server.
pub struct SyncEngine {
    store: Arc<dyn StateStore>,
    registry: Arc<SessionRegistry>,
    tokens: Mutex<TokenAuthority>,
    board_locks: BoardLocks,
}

impl SyncEngine {
    /// Create an engine with the protocol token TTL.
    pub fn new(store: Arc<dyn StateStore>, registry: Arc<SessionRegistry>) -> Self {
        Self::with_authority(store, registry, TokenAuthority::new())
    }

    /// Create an engine around a specific token authority (tests use short
    /// TTLs here).
    pub fn with_authority(
        store: Arc<dyn StateStore>,
        registry: Arc<SessionRegistry>,
        authority: TokenAuthority,
    ) -> Self {
        Self {
            store,
            registry,
            tokens: Mutex::new(authority),
            board_locks: BoardLocks::default(),
        }
    }

    /// Register a freshly accepted connection.
    pub async fn handle_connect(
        &self,
        conn: ConnectionId,
        sender: tokio::sync::mpsc::Sender<ServerEvent>,
    ) {
        self.registry.register(conn, sender).await;
        debug!(conn = %conn, "connection registered");
    }

    /// Tear down a connection: release all its tokens, notify its room,
    /// drop registry bookkeeping. Idempotent and best-effort.
    pub async fn handle_disconnect(&self, conn: ConnectionId) {
        let released = {
            let mut tokens = self.tokens.lock().await;
            tokens.release_all(conn)
        };

        let room = self.registry.unregister(conn).await;

        if let Some(room) = room {
            for piece in released {
                self.registry
                    .send_to_room(
                        &room,
                        ServerEvent::PieceUnlocked {
                            piece_id: piece.0.clone(),
                        },
                        None,
                    )
                    .await;
            }
            self.registry
                .send_to_room(
                    &room,
                    ServerEvent::PlayerLeft {
                        player_id: conn.to_uuid_string(),
                    },
                    None,
                )
                .await;
        }
        debug!(conn = %conn, "connection cleaned up");
    }

    /// Dispatch one inbound event.
    pub async fn handle_event(&self, conn: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom { room_code } => self.handle_join_room(conn, room_code).await,
            ClientEvent::GetGameState => self.handle_get_game_state(conn).await,
            ClientEvent::RequestToken { piece_id } => {
                self.handle_request_token(conn, PieceId::new(piece_id)).await
            }
            ClientEvent::ReleaseToken { piece_id } => {
                self.handle_release_token(conn, PieceId::new(piece_id)).await
            }
            ClientEvent::DragPiece { piece_id, x, y } => {
                self.handle_drag_piece(conn, PieceId::new(piece_id), x, y).await
            }
            ClientEvent::MovePiece { piece_id, x, y } => {
                self.handle_move_piece(conn, PieceId::new(piece_id), x, y).await
            }
            ClientEvent::AddPiece {
                piece_id,
                asset_url,
                x,
                y,
            } => {
                self.handle_add_piece(conn, PieceId::new(piece_id), asset_url, x, y)
                    .await
            }
            ClientEvent::RemovePiece { piece_id } => {
                self.handle_remove_piece(conn, PieceId::new(piece_id)).await
            }
        }
    }

    async fn handle_join_room(&self, conn: ConnectionId, room_code: String) {
        let room = BoardId::new(room_code);

        let old_room = self.registry.join(conn, room.clone()).await;

        // Locks must not leak across rooms: leaving releases everything the
        // switcher held and tells the old room.
        if let Some(old) = old_room {
            let released = {
                let mut tokens = self.tokens.lock().await;
                tokens.release_all(conn)
            };
            for piece in released {
                self.registry
                    .send_to_room(
                        &old,
                        ServerEvent::PieceUnlocked {
                            piece_id: piece.0.clone(),
                        },
                        None,
                    )
                    .await;
            }
            self.registry
                .send_to_room(
                    &old,
                    ServerEvent::PlayerLeft {
                        player_id: conn.to_uuid_string(),
                    },
                    None,
                )
                .await;
        }

        if let Err(e) = self.store.create_board(&room, room.as_str()).await {
            warn!(room = %room, "could not ensure board record: {e}");
        }

        self.registry
            .send_to_room(
                &room,
                ServerEvent::PlayerJoined {
                    player_id: conn.to_uuid_string(),
                },
                Some(conn),
            )
            .await;

        self.send_game_state(conn, &room).await;
    }

    async fn handle_get_game_state(&self, conn: ConnectionId) {
        let Some(room) = self.registry.room_of(conn).await else {
            self.send_error(conn, "not in a room").await;
            return;
        };
        self.send_game_state(conn, &room).await;
    }

    async fn handle_request_token(&self, conn: ConnectionId, piece: PieceId) {
        let Some(room) = self.registry.room_of(conn).await else {
            // No room, no scope for a grant.
            self.registry
                .send(
                    conn,
                    ServerEvent::TokenDenied {
                        piece_id: piece.0.clone(),
                    },
                )
                .await;
            return;
        };

        let grant = {
            let mut tokens = self.tokens.lock().await;
            tokens.grant(piece.clone(), conn)
        };
        if let Some(displaced) = grant.displaced {
            debug!(piece = %piece, old = %displaced, new = %conn, "token displaced");
        }

        self.registry
            .send(
                conn,
                ServerEvent::TokenGranted {
                    piece_id: piece.0.clone(),
                },
            )
            .await;
        self.registry
            .send_to_room(
                &room,
                ServerEvent::PieceLocked {
                    piece_id: piece.0.clone(),
                    player_id: conn.to_uuid_string(),
                },
                Some(conn),
            )
            .await;
    }

    async fn handle_release_token(&self, conn: ConnectionId, piece: PieceId) {
        let Some(room) = self.registry.room_of(conn).await else {
            return;
        };

        let released = {
            let mut tokens = self.tokens.lock().await;
            tokens.release(&piece, conn)
        };
        if released {
            self.registry
                .send_to_room(
                    &room,
                    ServerEvent::PieceUnlocked {
                        piece_id: piece.0.clone(),
                    },
                    Some(conn),
                )
                .await;
        }
    }

    async fn handle_drag_piece(&self, conn: ConnectionId, piece: PieceId, x: f64, y: f64) {
        let Some(room) = self.registry.room_of(conn).await else {
            return;
        };

        // Unauthorized drags are dropped without a reply; at drag frequency
        // an error per event would flood the sender.
        let authorized = {
            let mut tokens = self.tokens.lock().await;
            tokens.check(&piece, conn)
        };
        if !authorized {
            return;
        }

        self.registry
            .send_to_room(
                &room,
                ServerEvent::PieceDragged {
                    piece_id: piece.0.clone(),
                    x,
                    y,
                    player_id: conn.to_uuid_string(),
                },
                Some(conn),
            )
            .await;
    }

    async fn handle_move_piece(&self, conn: ConnectionId, piece: PieceId, x: f64, y: f64) {
        let Some(room) = self.registry.room_of(conn).await else {
            self.send_error(conn, "not in a room").await;
            return;
        };

        // Re-checked on every commit: the token can expire mid-drag.
        let authorized = {
            let mut tokens = self.tokens.lock().await;
            tokens.check(&piece, conn)
        };
        if !authorized {
            self.send_error(conn, &format!("no lock token for piece {piece}"))
                .await;
            return;
        }

        {
            let _guard = self.board_locks.acquire(&room).await;

            let pieces = match self.store.get_current_state(&room).await {
                Ok(pieces) => pieces,
                Err(e) => {
                    error!(room = %room, "state store read failed: {e}");
                    self.send_error(conn, "storage error").await;
                    return;
                }
            };

            let mut board = BoardState::with_pieces(room.clone(), room.as_str(), pieces);
            if !board.update_piece(&piece, x, y, conn) {
                self.send_error(conn, &format!("piece {piece} not found")).await;
                return;
            }

            if let Err(e) = self
                .store
                .save_state(&room, board.all_pieces(), None, false)
                .await
            {
                error!(room = %room, "state store write failed: {e}");
                self.send_error(conn, "storage error").await;
                return;
            }
        }

        self.registry
            .send_to_room(
                &room,
                ServerEvent::PieceMoved {
                    piece_id: piece.0.clone(),
                    x,
                    y,
                    player_id: conn.to_uuid_string(),
                },
                None,
            )
            .await;
    }

    async fn handle_add_piece(
        &self,
        conn: ConnectionId,
        piece: PieceId,
        asset_url: String,
        x: f64,
        y: f64,
    ) {
        let Some(room) = self.registry.room_of(conn).await else {
            self.send_error(conn, "not in a room").await;
            return;
        };

        {
            let _guard = self.board_locks.acquire(&room).await;

            let pieces = match self.store.get_current_state(&room).await {
                Ok(pieces) => pieces,
                Err(e) => {
                    error!(room = %room, "state store read failed: {e}");
                    self.send_error(conn, "storage error").await;
                    return;
                }
            };

            let mut board = BoardState::with_pieces(room.clone(), room.as_str(), pieces);
            let mut new_piece = Piece::new(piece.clone(), asset_url.clone(), x, y);
            new_piece.owner = Some(conn);
            board.add_piece(new_piece);

            if let Err(e) = self
                .store
                .save_state(&room, board.all_pieces(), None, false)
                .await
            {
                error!(room = %room, "state store write failed: {e}");
                self.send_error(conn, "storage error").await;
                return;
            }
        }

        // The adder starts out holding the lock.
        {
            let mut tokens = self.tokens.lock().await;
            tokens.grant(piece.clone(), conn);
        }

        self.registry
            .send_to_room(
                &room,
                ServerEvent::PieceAdded {
                    piece_id: piece.0.clone(),
                    x,
                    y,
                    asset_url,
                    player_id: conn.to_uuid_string(),
                },
                None,
            )
            .await;
    }

    async fn handle_remove_piece(&self, conn: ConnectionId, piece: PieceId) {
        let Some(room) = self.registry.room_of(conn).await else {
            self.send_error(conn, "not in a room").await;
            return;
        };

        let authorized = {
            let mut tokens = self.tokens.lock().await;
            tokens.check(&piece, conn)
        };
        if !authorized {
            self.send_error(conn, &format!("no lock token for piece {piece}"))
                .await;
            return;
        }

        {
            let _guard = self.board_locks.acquire(&room).await;

            let pieces = match self.store.get_current_state(&room).await {
                Ok(pieces) => pieces,
                Err(e) => {
                    error!(room = %room, "state store read failed: {e}");
                    self.send_error(conn, "storage error").await;
                    return;
                }
            };

            let mut board = BoardState::with_pieces(room.clone(), room.as_str(), pieces);
            if !board.remove_piece(&piece) {
                self.send_error(conn, &format!("piece {piece} not found")).await;
                return;
            }

            if let Err(e) = self
                .store
                .save_state(&room, board.all_pieces(), None, false)
                .await
            {
                error!(room = %room, "state store write failed: {e}");
                self.send_error(conn, "storage error").await;
                return;
            }
        }

        {
            let mut tokens = self.tokens.lock().await;
            tokens.release(&piece, conn);
        }

        self.registry
            .send_to_room(
                &room,
                ServerEvent::PieceRemoved {
                    piece_id: piece.0.clone(),
                    player_id: conn.to_uuid_string(),
                },
                None,
            )
            .await;
    }

    async fn send_game_state(&self, conn: ConnectionId, room: &BoardId) {
        match self.store.get_current_state(room).await {
            Ok(pieces) => {
                self.registry
                    .send(
                        conn,
                        ServerEvent::GameState {
                            room: room.as_str().to_string(),
                            pieces,
                        },
                    )
                    .await;
            }
            Err(e) => {
                error!(room = %room, "state store read failed: {e}");
                self.send_error(conn, "storage error").await;
            }
        }
    }

    async fn send_error(&self, conn: ConnectionId, message: &str) {
        self.registry
            .send(
                conn,
                ServerEvent::Error {
                    message: message.to_string(),
                },
            )
            .await;
    }
}
