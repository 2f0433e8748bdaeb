//! Runs queued commands one at a time

use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::queue::QueuedCommand;
use crate::handlers::commands::CommandController;

/// Sole consumer of the command queue.
///
/// Commands run strictly in arrival order and each finishes before the next
/// is taken, which makes this task the only place voting state changes.
pub struct Dispatcher {
    controller: CommandController,
    receiver: mpsc::Receiver<QueuedCommand>,
}

impl Dispatcher {
    pub fn new(controller: CommandController, receiver: mpsc::Receiver<QueuedCommand>) -> Self {
        Self {
            controller,
            receiver,
        }
    }

    pub async fn run(mut self) {
        info!("Command dispatcher started");
        while let Some(command) = self.receiver.recv().await {
            self.controller.run_command(command);
        }
        info!("Command queue closed, dispatcher exiting");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
