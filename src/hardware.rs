//! Base station collaborator
//!
//! The relay only needs two things from the vote-collection hardware: a way
//! to drain pending votes and a way to ask whether it is attached. Driver
//! calls may block, so the poller runs them on the blocking pool.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::core::message::Vote;
use crate::error::{ClickerError, Result};

pub trait VoteSource: Send + Sync {
    /// Take every vote received since the previous call
    fn request_votes(&self) -> Result<Vec<Vote>>;

    fn is_connected(&self) -> bool;
}

/// Used when no base station is attached; the poller stays idle
pub struct NoBaseStation;

impl VoteSource for NoBaseStation {
    fn request_votes(&self) -> Result<Vec<Vote>> {
        Ok(Vec::new())
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// In-process vote source fed by the embedding application
pub struct QueuedVoteSource {
    pending: Mutex<VecDeque<Vote>>,
    failures: Mutex<VecDeque<String>>,
    connected: AtomicBool,
}

impl QueuedVoteSource {
    pub fn new(connected: bool) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            failures: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(connected),
        }
    }

    pub fn push(&self, vote: Vote) -> Result<()> {
        self.pending.lock()?.push_back(vote);
        Ok(())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make the next `request_votes` call fail with `reason`
    pub fn fail_next(&self, reason: impl Into<String>) -> Result<()> {
        self.failures.lock()?.push_back(reason.into());
        Ok(())
    }
}

impl VoteSource for QueuedVoteSource {
    fn request_votes(&self) -> Result<Vec<Vote>> {
        if let Some(reason) = self.failures.lock()?.pop_front() {
            return Err(ClickerError::Driver(reason));
        }
        Ok(self.pending.lock()?.drain(..).collect())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
