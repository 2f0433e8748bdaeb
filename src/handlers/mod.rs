pub mod commands;
pub mod dispatcher;
pub mod poller;
pub mod stdin;

pub use commands::{CommandController, CommandRequest, ReplyScope};
pub use dispatcher::Dispatcher;
pub use poller::VotePoller;
