//! Client command batches and their serial encoding.
//!
//! Clients write to the device by sending one JSON object per WebSocket frame:
//!
//! ```json
//! {"cmds": ["AT+ID?", "AT+FREQ=915000000"]}
//! ```
//!
//! Every non-empty string in `cmds` becomes one serial line.  Entries of any
//! other type, and empty strings, are dropped without failing the batch.
//! Extra top-level keys are ignored.

use serde_json::Value;
use thiserror::Error;

use super::framing::LINE_TERMINATOR;

/// Name of the envelope field that carries the command list.
pub const COMMANDS_FIELD: &str = "cmds";

/// Reasons a client message is not a usable command batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The message is not syntactically valid JSON.
    #[error("message is not valid JSON: {0}")]
    InvalidJson(String),

    /// The message is valid JSON but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// The object has no `cmds` field.
    #[error("message has no \"cmds\" field")]
    MissingCommands,

    /// The `cmds` field is present but not an array.
    #[error("\"cmds\" is not a list")]
    NotAList,
}

/// An ordered list of commands destined for the serial device.
///
/// Only non-empty strings survive parsing, so every entry can be written as
/// is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
    commands: Vec<String>,
}

impl CommandBatch {
    /// Parses a client text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] describing why the message was unusable.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rf_telemetry_core::CommandBatch;
    ///
    /// let batch = CommandBatch::parse(r#"{"cmds": ["AT+OK", 42, ""]}"#).unwrap();
    /// assert_eq!(batch.commands(), ["AT+OK"]);
    /// ```
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CommandError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Parses a client binary frame holding UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Same as [`parse`](Self::parse).
    pub fn parse_slice(bytes: &[u8]) -> Result<Self, CommandError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| CommandError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, CommandError> {
        let Value::Object(mut envelope) = value else {
            return Err(CommandError::NotAnObject);
        };

        let entries = match envelope.remove(COMMANDS_FIELD) {
            None => return Err(CommandError::MissingCommands),
            Some(Value::Array(entries)) => entries,
            Some(_) => return Err(CommandError::NotAList),
        };

        let commands = entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect();

        Ok(Self { commands })
    }

    /// The surviving commands, in the order the client sent them.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.commands.iter()
    }
}

impl IntoIterator for CommandBatch {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

impl<'a> IntoIterator for &'a CommandBatch {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

/// Encodes one command as the bytes written to the serial device.
///
/// Trailing `\n` characters are trimmed and exactly one terminator is
/// appended, so `"AT"` and `"AT\n"` both become `b"AT\n"`.
///
/// # Examples
///
/// ```rust
/// use rf_telemetry_core::encode_command;
///
/// assert_eq!(encode_command("AT+ID?"), b"AT+ID?\n");
/// assert_eq!(encode_command("AT\n\n"), b"AT\n");
/// ```
pub fn encode_command(command: &str) -> Vec<u8> {
    let body = command.trim_end_matches('\n');
    let mut bytes = Vec::with_capacity(body.len() + 1);
    bytes.extend_from_slice(body.as_bytes());
    bytes.push(LINE_TERMINATOR);
    bytes
}

// ── Tests ─────────────────────────────────────────────────────────────────────
