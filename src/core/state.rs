//! Voting state shared between the dispatcher, the poller and filters

use std::sync::{Arc, RwLock};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerState {
    pub accepting_votes: bool,
    pub instructor_id: String,
    pub hardware_connected: bool,
}

impl ServerState {
    pub fn new(instructor_id: impl Into<String>) -> Self {
        Self {
            accepting_votes: false,
            instructor_id: instructor_id.into(),
            hardware_connected: false,
        }
    }
}

/// Synchronized accessor around [`ServerState`].
///
/// `accepting_votes` is only written by command handlers on the dispatcher
/// task and `hardware_connected` only by the poller.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<RwLock<ServerState>>,
}

impl SharedState {
    pub fn new(state: ServerState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn snapshot(&self) -> Result<ServerState> {
        Ok(self.inner.read()?.clone())
    }

    pub fn is_accepting_votes(&self) -> Result<bool> {
        Ok(self.inner.read()?.accepting_votes)
    }

    pub fn set_accepting_votes(&self, accepting: bool) -> Result<()> {
        self.inner.write()?.accepting_votes = accepting;
        Ok(())
    }

    pub fn instructor_id(&self) -> Result<String> {
        Ok(self.inner.read()?.instructor_id.clone())
    }

    pub fn is_hardware_connected(&self) -> Result<bool> {
        Ok(self.inner.read()?.hardware_connected)
    }

    /// Record the base station status; returns the previous value
    pub fn set_hardware_connected(&self, connected: bool) -> Result<bool> {
        let mut state = self.inner.write()?;
        let previous = state.hardware_connected;
        state.hardware_connected = connected;
        Ok(previous)
    }
}
