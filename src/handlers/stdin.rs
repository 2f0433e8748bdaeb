//! Local console input
//!
//! `choose 1A2B3C4D:A 11223344:c` enters votes by hand, a line starting with
//! `{` is sent as-is, and anything else is taken as a bare command name.
//! Console commands have no origin session, so nobody gets a unicast reply.

use chrono::Utc;
use log::{info, warn};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::constants::COMMAND_CHOOSE;
use crate::core::message::{ChoiceMessage, CommandMessage};
use crate::core::queue::CommandQueue;
use crate::error::Result;

/// Translate one console line into a command envelope; `None` to skip it
pub fn parse_console_line(line: &str) -> Result<Option<String>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.starts_with('{') {
        return Ok(Some(line.to_string()));
    }

    let mut words = line.split_whitespace();
    if words.next() == Some(COMMAND_CHOOSE) {
        let time = Some(Utc::now().timestamp_millis());
        let entries: Vec<ChoiceMessage> = words
            .filter_map(|pair| match pair.split_once(':') {
                Some((id, choice)) if !id.is_empty() && !choice.is_empty() => Some(ChoiceMessage {
                    id: id.to_string(),
                    choice: Some(choice.to_string()),
                    instructor: false,
                    time,
                }),
                _ => {
                    warn!("Ignoring malformed vote '{}', expected id:choice", pair);
                    None
                }
            })
            .collect();

        if entries.is_empty() {
            warn!("No votes in console line: {}", line);
            return Ok(None);
        }
        let command = CommandMessage::new(COMMAND_CHOOSE, serde_json::to_value(entries)?);
        return command.to_json().map(Some);
    }

    CommandMessage::new(line, Value::Null).to_json().map(Some)
}

/// Feed every line of `reader` into the command queue until end of input
pub async fn relay_lines<R>(reader: R, queue: CommandQueue) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        match parse_console_line(&line) {
            Ok(Some(message)) => {
                queue.push(message, None);
            }
            Ok(None) => {}
            Err(e) => warn!("Could not read console command '{}': {}", line, e),
        }
    }
    info!("Console input closed");
    Ok(())
}

/// Relay the process's standard input
pub async fn run(queue: CommandQueue) -> Result<()> {
    relay_lines(BufReader::new(tokio::io::stdin()), queue).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(line: &str) -> Value {
        serde_json::from_str(&parse_console_line(line).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_bare_command() {
        assert_eq!(parse("  enable-choices "), json!({"command": "enable-choices", "arguments": null}));
    }

    #[test]
    fn test_choose_line_shares_timestamp() {
        let value = parse("choose 1A2B3C4D:A bad INSTR:c");
        assert_eq!(value["command"], "choose");

        let votes = value["arguments"].as_array().unwrap();
        assert_eq!(votes.len(), 2);
        assert_eq!(votes[0]["id"], "1A2B3C4D");
        assert_eq!(votes[1]["choice"], "c");
        assert_eq!(votes[0]["time"], votes[1]["time"]);
    }

    #[test]
    fn test_json_passes_verbatim() {
        let raw = r#"{"command":"status"}"#;
        assert_eq!(parse_console_line(raw).unwrap().as_deref(), Some(raw));
    }

    #[test]
    fn test_blank_and_empty_vote_lines_are_skipped() {
        assert!(parse_console_line("   ").unwrap().is_none());
        assert!(parse_console_line("choose nothing-here").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_relay_has_no_origin() {
        let (queue, mut rx) = CommandQueue::bounded(8);
        let input: &[u8] = b"status\n\nchoose A:B\n";

        relay_lines(input, queue).await.unwrap();

        let first = rx.try_recv().unwrap();
        assert!(first.origin.is_none());
        assert_eq!(first.message, r#"{"command":"status","arguments":null}"#);
        assert!(rx.try_recv().unwrap().message.contains("\"choose\""));
        assert!(rx.try_recv().is_err());
    }
}
