use std::error::Error;
use std::fmt;
use std::io;
use std::sync::PoisonError;

#[derive(Debug)]
pub enum ClickerError {
    // Listener errors
    Bind(String),
    Accept(String),

    // Session errors
    SessionLock(String),
    ConnectionClosed,

    // Queue errors
    QueueFull,

    // Command errors
    MessageParse(String),
    UnknownCommand(String),
    InvalidArguments(String),
    Handler(String),

    // Base station errors
    Driver(String),

    // Configuration errors
    Config(String),

    // System errors
    Io(io::Error),
}

impl fmt::Display for ClickerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(msg) => write!(f, "Could not listen: {}", msg),
            Self::Accept(msg) => write!(f, "Server socket accept failed: {}", msg),
            Self::SessionLock(msg) => write!(f, "Session lock error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::QueueFull => write!(f, "No space left in queue"),
            Self::MessageParse(msg) => write!(f, "Message parse error: {}", msg),
            Self::UnknownCommand(name) => write!(f, "Unknown command: {}", name),
            Self::InvalidArguments(msg) => write!(f, "Invalid arguments: {}", msg),
            Self::Handler(msg) => write!(f, "{}", msg),
            Self::Driver(msg) => write!(f, "Base station error: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl Error for ClickerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ClickerError {
    fn from(err: io::Error) -> Self {
        ClickerError::Io(err)
    }
}

impl From<serde_json::Error> for ClickerError {
    fn from(err: serde_json::Error) -> Self {
        ClickerError::MessageParse(err.to_string())
    }
}

// Converting from PoisonError to facilitate poisoned mutex handling
impl<T> From<PoisonError<T>> for ClickerError {
    fn from(err: PoisonError<T>) -> Self {
        ClickerError::SessionLock(format!("Mutex poisoned: {}", err))
    }
}

// Generic result type for the relay
pub type Result<T> = std::result::Result<T, ClickerError>;
