//! Periodically drains the base station into the command queue
//!
//! Hardware votes are queued as ordinary `choose` commands, so they reach
//! clients through exactly the same path as votes submitted over a socket.

use log::{error, info, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::constants::COMMAND_DISABLE_CHOICES;
use crate::core::message::{ChoiceMessage, CommandMessage};
use crate::core::queue::CommandQueue;
use crate::core::state::SharedState;
use crate::hardware::VoteSource;

pub struct VotePoller {
    source: Arc<dyn VoteSource>,
    queue: CommandQueue,
    state: SharedState,
    interval: Duration,
}

impl VotePoller {
    pub fn new(
        source: Arc<dyn VoteSource>,
        queue: CommandQueue,
        state: SharedState,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            queue,
            state,
            interval,
        }
    }

    /// Poll until the task is aborted or the command queue goes away
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.queue.is_closed() {
                break;
            }
            self.poll_once().await;
        }
        warn!("Command queue closed, base station poller exiting");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// One tick; returns the number of votes queued
    pub async fn poll_once(&self) -> usize {
        let connected = self.source.is_connected();
        self.track_connection(connected);
        if !connected {
            return 0;
        }

        let source = self.source.clone();
        let votes = match tokio::task::spawn_blocking(move || source.request_votes()).await {
            Ok(Ok(votes)) => votes,
            Ok(Err(e)) => {
                warn!("Failed to request votes: {}", e);
                return 0;
            }
            Err(e) => {
                error!("Base station request aborted: {}", e);
                return 0;
            }
        };

        if votes.is_empty() {
            return 0;
        }

        match ChoiceMessage::choose_command(&votes).to_json() {
            Ok(message) => {
                if self.queue.push(message, None) {
                    votes.len()
                } else {
                    0
                }
            }
            Err(e) => {
                error!("Failed to encode {} base station votes: {}", votes.len(), e);
                0
            }
        }
    }

    fn track_connection(&self, connected: bool) {
        let previous = match self.state.set_hardware_connected(connected) {
            Ok(previous) => previous,
            Err(e) => {
                error!("Failed to record base station status: {}", e);
                return;
            }
        };

        match (previous, connected) {
            (false, true) => info!("Base station connected."),
            (true, false) => {
                info!("Base station removed.");
                // Votes can't arrive any more, so close voting
                let stop = CommandMessage::new(COMMAND_DISABLE_CHOICES, Value::Null);
                if let Ok(message) = stop.to_json() {
                    self.queue.push(message, None);
                }
            }
            _ => {}
        }
    }
}
