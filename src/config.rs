//! Server configuration module
//! Loads the relay settings from `.env`, the environment and the command line

use crate::constants::{
    DEFAULT_CHANNEL, DEFAULT_COMMAND_QUEUE_SIZE, DEFAULT_HOST, DEFAULT_INSTRUCTOR_ID,
    DEFAULT_MAX_MESSAGE_LENGTH, DEFAULT_OUTBOUND_QUEUE_SIZE, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_PORT,
};
use crate::error::{ClickerError, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Base station radio frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    A,
    B,
    C,
    D,
}

impl FromStr for Frequency {
    type Err = ClickerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Frequency::A),
            "B" => Ok(Frequency::B),
            "C" => Ok(Frequency::C),
            "D" => Ok(Frequency::D),
            other => Err(ClickerError::Config(format!(
                "invalid channel '{}', expected one of A, B, C, D",
                other
            ))),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Frequency::A => "A",
            Frequency::B => "B",
            Frequency::C => "C",
            Frequency::D => "D",
        };
        f.write_str(name)
    }
}

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Clicker id whose votes always pass through, even while voting is closed
    pub instructor_id: String,
    pub channel1: Frequency,
    pub channel2: Frequency,
    /// Capacity of the shared command queue
    pub command_queue_size: usize,
    /// Capacity of each client's outbound queue
    pub outbound_queue_size: usize,
    pub poll_interval: Duration,
    /// Filter names, in the order they run
    pub filters: Vec<String>,
    pub max_message_length: usize,
}

impl ServerConfig {
    /// Configuration with every default and an ephemeral loopback port
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            instructor_id: "INSTR".to_string(),
            channel1: Frequency::A,
            channel2: Frequency::A,
            command_queue_size: DEFAULT_COMMAND_QUEUE_SIZE,
            outbound_queue_size: DEFAULT_OUTBOUND_QUEUE_SIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            filters: Vec::new(),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let host = env::var("CLICKER_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = parse_var("CLICKER_PORT", DEFAULT_PORT)?;

        let instructor_id =
            env::var("CLICKER_INSTRUCTOR_ID").unwrap_or(DEFAULT_INSTRUCTOR_ID.to_string());

        let channel1 = env::var("CLICKER_CHANNEL_1")
            .unwrap_or(DEFAULT_CHANNEL.to_string())
            .parse()?;
        let channel2 = env::var("CLICKER_CHANNEL_2")
            .unwrap_or(DEFAULT_CHANNEL.to_string())
            .parse()?;

        let command_queue_size =
            parse_var("CLICKER_COMMAND_QUEUE_SIZE", DEFAULT_COMMAND_QUEUE_SIZE)?;
        let outbound_queue_size =
            parse_var("CLICKER_OUTBOUND_QUEUE_SIZE", DEFAULT_OUTBOUND_QUEUE_SIZE)?;
        let poll_ms = parse_var("CLICKER_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        let max_message_length =
            parse_var("CLICKER_MAX_MESSAGE_LENGTH", DEFAULT_MAX_MESSAGE_LENGTH)?;

        let filters = env::var("CLICKER_FILTERS")
            .map(|v| parse_filter_list(&v))
            .unwrap_or_default();

        let config = Self {
            host,
            port,
            instructor_id,
            channel1,
            channel2,
            command_queue_size,
            outbound_queue_size,
            poll_interval: Duration::from_millis(poll_ms),
            filters,
            max_message_length,
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply positional overrides: `[instructor-id [channel1 channel2 [port]]]`
    pub fn apply_args<S: AsRef<str>>(&mut self, args: &[S]) -> Result<()> {
        if let Some(id) = args.first() {
            self.instructor_id = id.as_ref().to_string();
        }
        if args.len() > 2 {
            self.channel1 = args[1].as_ref().parse()?;
            self.channel2 = args[2].as_ref().parse()?;
        }
        if let Some(port) = args.get(3) {
            self.port = port.as_ref().parse().map_err(|_| {
                ClickerError::Config(format!("invalid port '{}'", port.as_ref()))
            })?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.instructor_id.trim().is_empty() {
            return Err(ClickerError::Config(
                "instructor id must not be empty".to_string(),
            ));
        }
        if self.command_queue_size == 0 || self.outbound_queue_size == 0 {
            return Err(ClickerError::Config(
                "queue sizes must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ClickerError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ClickerError::Config(format!("invalid value '{}' for {}", raw, name))),
        Err(_) => Ok(default),
    }
}

fn parse_filter_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
