// Listener defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 4444;

// Voting defaults
pub const DEFAULT_INSTRUCTOR_ID: &str = "371BA68A";
pub const DEFAULT_CHANNEL: &str = "A";

// Queue sizing
pub const DEFAULT_COMMAND_QUEUE_SIZE: usize = 1024;
pub const DEFAULT_OUTBOUND_QUEUE_SIZE: usize = 256;
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 8192;

// Base station polling period in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 150;

// Command names
pub const COMMAND_PING: &str = "ping";
pub const COMMAND_ENABLE_CHOICES: &str = "enable-choices";
pub const COMMAND_DISABLE_CHOICES: &str = "disable-choices";
pub const COMMAND_STATUS: &str = "status";
pub const COMMAND_CHOOSE: &str = "choose";

// Log target for the vote trail
pub const CLICKS_LOG_TARGET: &str = "clicks";
