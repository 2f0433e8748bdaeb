//! Command table and the handlers behind it
//!
//! Handlers only run on the dispatcher task, one at a time, so they read and
//! write the voting state without further coordination.

use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::constants::{
    CLICKS_LOG_TARGET, COMMAND_CHOOSE, COMMAND_DISABLE_CHOICES, COMMAND_ENABLE_CHOICES,
    COMMAND_PING, COMMAND_STATUS,
};
use crate::core::connection::ClientSession;
use crate::core::message::{ChoiceMessage, CommandMessage, ServerMessage, StatusMessage, Vote};
use crate::core::queue::QueuedCommand;
use crate::core::session::Sessions;
use crate::core::state::SharedState;
use crate::error::{ClickerError, Result};

/// A parsed command as seen by its handler
pub struct CommandRequest<'a> {
    pub name: &'a str,
    pub arguments: &'a Value,
    /// Session that sent the command; `None` for console and poller input
    pub origin: Option<&'a Arc<ClientSession>>,
}

pub type CommandHandler =
    Box<dyn Fn(&CommandController, &CommandRequest<'_>) -> Result<()> + Send + Sync>;

/// Who a reply is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyScope {
    Broadcast,
    Origin,
}

pub struct CommandController {
    state: SharedState,
    sessions: Sessions,
    handlers: HashMap<String, CommandHandler>,
}

impl CommandController {
    pub fn new(state: SharedState, sessions: Sessions) -> Self {
        let mut controller = Self {
            state,
            sessions,
            handlers: HashMap::new(),
        };
        controller.register_defaults();
        controller
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// Add or replace the handler for `name`
    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&CommandController, &CommandRequest<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Box::new(handler));
    }

    fn register_defaults(&mut self) {
        // Shows the client it is connected; never echoed locally
        self.register(COMMAND_PING, |ctl, req| {
            ctl.output_response(req, Value::Null, ReplyScope::Origin, false)
        });

        self.register(COMMAND_ENABLE_CHOICES, |ctl, req| {
            ctl.state.set_accepting_votes(true)?;
            ctl.output_response(req, Value::Null, ReplyScope::Broadcast, true)
        });

        self.register(COMMAND_DISABLE_CHOICES, |ctl, req| {
            ctl.state.set_accepting_votes(false)?;
            ctl.output_response(req, Value::Null, ReplyScope::Broadcast, true)
        });

        self.register(COMMAND_STATUS, |ctl, req| {
            let status = serde_json::to_value(ctl.status()?)?;
            ctl.output_response(req, status, ReplyScope::Origin, true)
        });

        // Votes submitted over a socket, the console, or the poller
        self.register(COMMAND_CHOOSE, |ctl, req| {
            let votes = votes_from_json(req.arguments)?;
            ctl.output_choices(&votes).map(|_| ())
        });
    }

    /// Run one queued command to completion.
    ///
    /// Nothing that goes wrong here escapes: parse failures and unknown
    /// commands are logged, handler errors and panics are broadcast as an
    /// error message naming the raw command.
    pub fn run_command(&self, command: QueuedCommand) {
        let QueuedCommand { message, origin } = command;

        let message = match self.sessions.filters().input(message) {
            Some(message) => message,
            None => return,
        };

        let envelope = match parse_envelope(&message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Error running command {}: {}", message, e);
                return;
            }
        };

        let handler = match self.handler(&envelope.command) {
            Ok(handler) => handler,
            Err(e) => {
                warn!("Unable to find command for {}: {}", message, e);
                return;
            }
        };

        let request = CommandRequest {
            name: &envelope.command,
            arguments: &envelope.arguments,
            origin: origin.as_ref(),
        };

        let failure = match panic::catch_unwind(AssertUnwindSafe(|| handler(self, &request))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(payload) => ClickerError::Handler(panic_message(payload.as_ref())),
        };

        error!("Exception while running command {}: {}", message, failure);
        self.output_error(&failure.to_string(), &message);
    }

    /// Look up the handler registered for `name`
    pub fn handler(&self, name: &str) -> Result<&CommandHandler> {
        self.handlers
            .get(name)
            .ok_or_else(|| ClickerError::UnknownCommand(name.to_string()))
    }

    /// Deliver a message and echo it to the local log when asked
    pub fn output(
        &self,
        message: &str,
        target: Option<&Arc<ClientSession>>,
        print_local: bool,
    ) -> Result<usize> {
        if print_local {
            match target {
                Some(session) => info!("[output for {}] {}", session, message),
                None => info!("[output] {}", message),
            }
        }
        self.sessions.output(message, target)
    }

    /// Acknowledge `request`, with `data` as the payload
    pub fn output_response(
        &self,
        request: &CommandRequest<'_>,
        data: Value,
        scope: ReplyScope,
        print_local: bool,
    ) -> Result<()> {
        let message = ServerMessage::response(request.name, data).to_json()?;
        match (scope, request.origin) {
            (ReplyScope::Broadcast, _) => {
                self.output(&message, None, print_local)?;
            }
            (ReplyScope::Origin, Some(origin)) => {
                self.output(&message, Some(origin), print_local)?;
            }
            // Console and poller commands have nobody to answer
            (ReplyScope::Origin, None) => {
                if print_local {
                    info!("[local] {}", message);
                } else {
                    debug!("[local] {}", message);
                }
            }
        }
        Ok(())
    }

    /// Broadcast the votes that may be shown right now.
    ///
    /// While voting is closed only the instructor's votes pass, as a live
    /// preview. Returns the number of clients reached.
    pub fn output_choices(&self, votes: &[Vote]) -> Result<usize> {
        if votes.is_empty() {
            return Ok(0);
        }

        let state = self.state.snapshot()?;
        let data: Vec<ChoiceMessage> = votes
            .iter()
            .filter(|vote| state.accepting_votes || vote.is_instructor(&state.instructor_id))
            .map(|vote| {
                info!(target: CLICKS_LOG_TARGET, "{}:{}", vote.id, vote.choice);
                ChoiceMessage::from_vote(vote, &state.instructor_id)
            })
            .collect();

        if data.is_empty() {
            return Ok(0);
        }

        let message = ServerMessage::choices(data).to_json()?;
        self.output(&message, None, true)
    }

    pub fn output_error(&self, error: &str, command: &str) {
        let result = ServerMessage::error(error, command)
            .to_json()
            .and_then(|message| self.output(&message, None, true));
        if let Err(e) = result {
            error!("Failed to send error message for {}: {}", command, e);
        }
    }

    pub fn status(&self) -> Result<StatusMessage> {
        let state = self.state.snapshot()?;
        Ok(StatusMessage {
            accepting_choices: state.accepting_votes,
            instructor_id: state.instructor_id,
            num_clients: self.sessions.client_count()?,
            hardware_connected: state.hardware_connected,
            time: Utc::now().timestamp_millis(),
        })
    }
}

fn parse_envelope(message: &str) -> Result<CommandMessage> {
    Ok(serde_json::from_str(message)?)
}

/// Convert `choose` arguments into votes, skipping unusable entries
pub fn votes_from_json(arguments: &Value) -> Result<Vec<Vote>> {
    if !arguments.is_array() {
        return Err(ClickerError::InvalidArguments(
            "choices must be an array".to_string(),
        ));
    }
    let entries: Vec<Option<ChoiceMessage>> = serde_json::from_value(arguments.clone())
        .map_err(|e| ClickerError::InvalidArguments(e.to_string()))?;

    Ok(entries
        .iter()
        .flatten()
        .filter_map(ChoiceMessage::to_vote)
        .collect())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "command handler panicked".to_string()
    }
}
