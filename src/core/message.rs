//! Wire messages exchanged with clients and the vote model behind them

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ClickerError;

/// Button on a physical clicker. Votes carry their choice as text, so
/// software clients are not limited to these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
    C,
    D,
    E,
}

impl FromStr for Choice {
    type Err = ClickerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Choice::A),
            "B" => Ok(Choice::B),
            "C" => Ok(Choice::C),
            "D" => Ok(Choice::D),
            "E" => Ok(Choice::E),
            _ => Err(ClickerError::InvalidArguments(format!("illegal choice {}", s))),
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Choice::A => "A",
            Choice::B => "B",
            Choice::C => "C",
            Choice::D => "D",
            Choice::E => "E",
        };
        f.write_str(name)
    }
}

impl From<Choice> for String {
    fn from(choice: Choice) -> Self {
        choice.to_string()
    }
}

/// A single vote, from the base station or a client
#[derive(Debug, Clone, PartialEq)]
pub struct Vote {
    pub id: String,
    /// Upper-cased, never empty
    pub choice: String,
    pub time: DateTime<Utc>,
}

impl Vote {
    pub fn new(id: impl Into<String>, choice: impl Into<String>) -> Self {
        Self::at(id, choice, Utc::now())
    }

    pub fn at(id: impl Into<String>, choice: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            choice: choice.into().trim().to_ascii_uppercase(),
            time,
        }
    }

    pub fn is_instructor(&self, instructor_id: &str) -> bool {
        self.id == instructor_id
    }
}

/// Client-to-server command envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMessage {
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

impl CommandMessage {
    pub fn new(command: impl Into<String>, arguments: Value) -> Self {
        Self {
            command: command.into(),
            arguments,
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One entry of a choices batch, both inbound (`choose`) and outbound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub id: String,
    pub choice: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub instructor: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

impl From<&Vote> for ChoiceMessage {
    fn from(vote: &Vote) -> Self {
        Self {
            id: vote.id.clone(),
            choice: Some(vote.choice.clone()),
            instructor: false,
            time: Some(vote.time.timestamp_millis()),
        }
    }
}

impl ChoiceMessage {
    /// Outbound entry, flagged when the vote is the instructor's
    pub fn from_vote(vote: &Vote, instructor_id: &str) -> Self {
        Self {
            instructor: vote.is_instructor(instructor_id),
            ..Self::from(vote)
        }
    }

    /// Build a `choose` command carrying `votes`
    pub fn choose_command(votes: &[Vote]) -> CommandMessage {
        let entries: Vec<ChoiceMessage> = votes.iter().map(ChoiceMessage::from).collect();
        CommandMessage::new(
            crate::constants::COMMAND_CHOOSE,
            serde_json::to_value(entries).unwrap_or(Value::Null),
        )
    }

    /// Convert to a vote; `None` when the entry carries no usable choice
    pub fn to_vote(&self) -> Option<Vote> {
        let choice = self.choice.as_deref()?.trim();
        if choice.is_empty() {
            log::error!("Discarding empty vote by {}", self.id);
            return None;
        }
        let time = self
            .time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);
        Some(Vote::at(self.id.clone(), choice, time))
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Server-to-client messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Vote broadcast, `type` is always "choices"
    Choices {
        #[serde(rename = "type")]
        kind: String,
        data: Vec<ChoiceMessage>,
    },
    /// Command acknowledgment
    Response { command: String, data: Value },
    /// Command failure
    Error { error: String, command: String },
}

impl ServerMessage {
    pub fn choices(data: Vec<ChoiceMessage>) -> Self {
        ServerMessage::Choices {
            kind: "choices".to_string(),
            data,
        }
    }

    pub fn response(command: impl Into<String>, data: Value) -> Self {
        ServerMessage::Response {
            command: command.into(),
            data,
        }
    }

    pub fn error(error: impl Into<String>, command: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: error.into(),
            command: command.into(),
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Payload of the `status` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub accepting_choices: bool,
    pub instructor_id: String,
    pub num_clients: usize,
    pub hardware_connected: bool,
    pub time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_choice_parsing_is_case_insensitive() {
        assert_eq!("c".parse::<Choice>().unwrap(), Choice::C);
        assert!("X".parse::<Choice>().is_err());
    }

    #[test]
    fn test_choices_wire_format() {
        let time = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let votes = vec![Vote::at("INSTR", Choice::B, time), Vote::at("A1", Choice::C, time)];
        let data = votes
            .iter()
            .map(|v| ChoiceMessage::from_vote(v, "INSTR"))
            .collect();

        let value: Value = serde_json::from_str(&ServerMessage::choices(data).to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "choices",
                "data": [
                    {"id": "INSTR", "choice": "B", "instructor": true, "time": 1_700_000_000_000i64},
                    {"id": "A1", "choice": "C", "time": 1_700_000_000_000i64}
                ]
            })
        );
    }

    #[test]
    fn test_error_and_response_wire_format() {
        let error: Value =
            serde_json::from_str(&ServerMessage::error("boom", "{\"command\":\"x\"}").to_json().unwrap()).unwrap();
        assert_eq!(error, json!({"error": "boom", "command": "{\"command\":\"x\"}"}));

        let ack: Value =
            serde_json::from_str(&ServerMessage::response("ping", Value::Null).to_json().unwrap()).unwrap();
        assert_eq!(ack, json!({"command": "ping", "data": null}));
    }

    #[test]
    fn test_any_non_empty_choice_is_a_vote() {
        let mut entry = ChoiceMessage {
            id: "A1".to_string(),
            choice: Some("x".to_string()),
            instructor: false,
            time: None,
        };
        assert_eq!(entry.to_vote().unwrap().choice, "X");

        entry.choice = Some("  ".to_string());
        assert!(entry.to_vote().is_none());
    }

    #[test]
    fn test_button_converts_to_choice_text() {
        assert_eq!(Vote::new("A1", Choice::D).choice, "D");
    }

    #[test]
    fn test_missing_arguments_default_to_null() {
        let cmd: CommandMessage = serde_json::from_str(r#"{"command":"status"}"#).unwrap();
        assert_eq!(cmd.command, "status");
        assert!(cmd.arguments.is_null());
    }
}
