//! Clicker Relay - relays classroom clicker votes to TCP clients
//!
//! Votes from a base station, and commands from connected clients and the
//! local console, all pass through one command queue. A single dispatcher
//! runs them in order and broadcasts the results as line-delimited JSON.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod hardware;

// Re-export main components
pub use config::*;
pub use constants::*;
