//! Duplex API Library Crate
//!
//! Hosts one turn-taking session per WebSocket connection. The browser relays
//! its transport events into the socket and executes the media operations the
//! session sends back. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
