//! Core I/O layer of the relay

pub mod connection;
pub mod filter;
pub mod message;
pub mod queue;
pub mod server;
pub mod session;
pub mod state;

// Re-export main components for convenience
pub use connection::ClientSession;
pub use filter::{Filter, FilterAction, FilterChain};
pub use message::{Choice, Vote};
pub use queue::{CommandQueue, QueuedCommand};
pub use server::{start, ClickerServer, RelayHandle};
pub use session::{create_session_manager, SessionManager, Sessions};
pub use state::{ServerState, SharedState};
