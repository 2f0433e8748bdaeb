//! The single command queue every input source feeds

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::core::connection::ClientSession;

/// Raw command text plus the session it came from, if any
pub struct QueuedCommand {
    pub message: String,
    /// `None` for the console and the base station poller
    pub origin: Option<Arc<ClientSession>>,
}

impl QueuedCommand {
    pub fn new(message: impl Into<String>, origin: Option<Arc<ClientSession>>) -> Self {
        Self {
            message: message.into(),
            origin,
        }
    }
}

/// Producer handle of the bounded command queue.
///
/// Pushing never blocks: when the queue is full the command is dropped.
#[derive(Clone)]
pub struct CommandQueue {
    sender: mpsc::Sender<QueuedCommand>,
}

impl CommandQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<QueuedCommand>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queue a command; returns false when it had to be dropped
    pub fn push(&self, message: impl Into<String>, origin: Option<Arc<ClientSession>>) -> bool {
        match self.sender.try_send(QueuedCommand::new(message, origin)) {
            Ok(()) => true,
            Err(TrySendError::Full(cmd)) => {
                log::warn!("No space left in server input queue, dropping: {}", cmd.message);
                false
            }
            Err(TrySendError::Closed(cmd)) => {
                log::warn!("Server input queue closed, dropping: {}", cmd.message);
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let (queue, mut rx) = CommandQueue::bounded(2);
        assert!(queue.push("one", None));
        assert!(queue.push("two", None));
        assert!(!queue.push("three", None));

        assert_eq!(rx.try_recv().unwrap().message, "one");
        assert_eq!(rx.try_recv().unwrap().message, "two");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_queue_drops() {
        let (queue, rx) = CommandQueue::bounded(2);
        drop(rx);
        assert!(queue.is_closed());
        assert!(!queue.push("late", None));
    }
}
