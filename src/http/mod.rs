//! HTTP Surface
//!
//! REST CRUD over boards, saved states and asset records. Pure
//! request/response plumbing around the state store; nothing here touches
//! tokens or live connections.

pub mod api;

pub use api::{router, ApiError};
