//! # Tabletop Sync Server
//!
//! Real-time synchronization of a shared 2D board of movable pieces,
//! guarded by per-piece, time-bounded lock tokens.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TABLETOP SYNC SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  board/          - Domain model                              │
//! │  ├── piece.rs    - Ids, piece record                         │
//! │  ├── state.rs    - Board piece set + mutation rules          │
//! │  ├── snapshot.rs - Saved states, asset records               │
//! │  └── token.rs    - Exclusive lock-token authority            │
//! │                                                              │
//! │  store/          - Persistence seam                          │
//! │  ├── memory.rs   - In-memory store (tests, default)          │
//! │  └── file.rs     - JSON document per board                   │
//! │                                                              │
//! │  network/        - Real-time layer                           │
//! │  ├── protocol.rs - Wire events (names are a contract)        │
//! │  ├── registry.rs - Connection/room bookkeeping + delivery    │
//! │  ├── engine.rs   - Protocol state machine                    │
//! │  └── server.rs   - WebSocket server                          │
//! │                                                              │
//! │  http/           - REST CRUD (boards, states, assets)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority model
//!
//! Every mutation of a piece requires the mutating connection to hold
//! that piece's lock token. Grants are permissive (a new grant displaces
//! the current holder), tokens expire after [`TOKEN_TTL_SECS`] seconds,
//! and all authority decisions re-check ownership at commit time.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod board;
pub mod http;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use board::{BoardId, BoardState, ConnectionId, Piece, PieceId, TokenAuthority};
pub use network::{ClientEvent, ServerEvent, SessionRegistry, SyncEngine, SyncServer};
pub use store::{JsonFileStore, MemoryStore, StateStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lock token time-to-live in seconds
pub const TOKEN_TTL_SECS: u64 = 30;

/// Automatic snapshots retained per board (manual saves are never pruned)
pub const AUTOSAVE_KEEP: usize = 50;
