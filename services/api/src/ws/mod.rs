//! WebSocket Session Management
//!
//! Each connection hosts one turn-taking session:
//!
//! - `protocol`: JSON messages exchanged with the browser client.
//! - `backend`: the `MediaBackend` that forwards track operations to the client.
//! - `session`: connection lifecycle and the relay loop around the core dispatch loop.

pub mod backend;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
