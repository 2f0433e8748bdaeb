//! Ordered message filters applied to inbound commands and outbound output
//!
//! Filters run in registration order. The first filter that drops a message
//! stops the chain and the message is discarded without an error.

use std::sync::Arc;

use crate::constants::CLICKS_LOG_TARGET;
use crate::core::state::SharedState;
use crate::error::{ClickerError, Result};

/// Outcome of running one filter over a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterAction {
    Pass(String),
    Drop,
}

/// A pluggable transform-or-drop step
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    /// Called once at startup, before any message flows
    fn initialize(&self, _state: &SharedState) -> Result<()> {
        Ok(())
    }

    /// Inbound command text, before it is parsed
    fn input(&self, message: String) -> FilterAction {
        FilterAction::Pass(message)
    }

    /// Outbound text, before it is queued for any client
    fn output(&self, message: String) -> FilterAction {
        FilterAction::Pass(message)
    }
}

/// Immutable, ordered list of filters
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    /// Build a chain from configured built-in filter names
    pub fn from_names(names: &[String], max_message_length: usize) -> Result<Self> {
        let mut filters: Vec<Arc<dyn Filter>> = Vec::with_capacity(names.len());
        for name in names {
            let filter: Arc<dyn Filter> = match name.as_str() {
                LogFilter::NAME => Arc::new(LogFilter),
                MaxLengthFilter::NAME => Arc::new(MaxLengthFilter::new(max_message_length)),
                other => {
                    return Err(ClickerError::Config(format!("unknown filter '{}'", other)))
                }
            };
            filters.push(filter);
        }
        Ok(Self { filters })
    }

    /// Initialize every filter; those that fail are left out of the chain
    pub fn initialize(self, state: &SharedState) -> Self {
        let filters = self
            .filters
            .into_iter()
            .filter(|filter| match filter.initialize(state) {
                Ok(()) => {
                    log::info!("Initialized filter {}", filter.name());
                    true
                }
                Err(e) => {
                    log::error!("Filter {} failed to initialize, skipping it: {}", filter.name(), e);
                    false
                }
            })
            .collect();
        Self { filters }
    }

    pub fn input(&self, message: String) -> Option<String> {
        self.run(message, |filter, msg| filter.input(msg), "input")
    }

    pub fn output(&self, message: String) -> Option<String> {
        self.run(message, |filter, msg| filter.output(msg), "output")
    }

    fn run<F>(&self, message: String, step: F, direction: &str) -> Option<String>
    where
        F: Fn(&dyn Filter, String) -> FilterAction,
    {
        let mut current = message;
        for filter in &self.filters {
            match step(filter.as_ref(), current) {
                FilterAction::Pass(next) => current = next,
                FilterAction::Drop => {
                    log::debug!("Filter {} dropped {} message", filter.name(), direction);
                    return None;
                }
            }
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// Writes every message to the `clicks` log target
pub struct LogFilter;

impl LogFilter {
    pub const NAME: &'static str = "log";
}

impl Filter for LogFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn input(&self, message: String) -> FilterAction {
        log::info!(target: CLICKS_LOG_TARGET, "[in] {}", message);
        FilterAction::Pass(message)
    }

    fn output(&self, message: String) -> FilterAction {
        log::info!(target: CLICKS_LOG_TARGET, "[out] {}", message);
        FilterAction::Pass(message)
    }
}

/// Drops inbound commands longer than a byte limit
pub struct MaxLengthFilter {
    max_length: usize,
}

impl MaxLengthFilter {
    pub const NAME: &'static str = "max-length";

    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Filter for MaxLengthFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn initialize(&self, _state: &SharedState) -> Result<()> {
        if self.max_length == 0 {
            return Err(ClickerError::Config("max-length must be positive".to_string()));
        }
        Ok(())
    }

    fn input(&self, message: String) -> FilterAction {
        if message.len() > self.max_length {
            log::warn!("Dropping {} byte command (limit {})", message.len(), self.max_length);
            return FilterAction::Drop;
        }
        FilterAction::Pass(message)
    }
}
