//! Network Layer
//!
//! WebSocket transport, wire protocol, session bookkeeping and the sync
//! engine that ties them to the board domain.

pub mod engine;
pub mod protocol;
pub mod rate_limit;
pub mod registry;
pub mod server;

pub use engine::SyncEngine;
pub use protocol::{ClientEvent, ServerEvent};
pub use rate_limit::RateLimiter;
pub use registry::SessionRegistry;
pub use server::{ServerConfig, SyncServer, SyncServerError};
