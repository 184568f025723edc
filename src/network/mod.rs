//! Network Layer
//!
//! The outward-facing surface: the HTTP wagering endpoints, the viewer
//! WebSocket stream, and the broadcast hub that fans round events out to
//! connected viewers. No game logic lives here.

pub mod hub;
pub mod protocol;
pub mod server;

pub use hub::{BroadcastHub, SessionId};
pub use protocol::StreamMessage;
pub use server::{router, AppState, ServerConfig};
