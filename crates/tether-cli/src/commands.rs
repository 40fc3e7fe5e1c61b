//! Command parsing for the shell.
//!
//! This module parses command strings into structured [`Command`] values.

use serde_json::Value;

/// Parsed command from user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start connecting.
    Connect,

    /// Tear down the channel.
    Disconnect,

    /// Drop the channel and reconnect with a fresh budget.
    Reconnect,

    /// Report the app coming to the foreground.
    Foreground,

    /// Report the app going to the background.
    Background,

    /// Store a credential pair.
    Login {
        /// Access token.
        access_token: String,
        /// Refresh token.
        refresh_token: String,
    },

    /// Remove the stored credential pair and disconnect.
    Logout,

    /// Print connection state.
    Status,

    /// Quit the shell.
    Quit,

    /// Send a named event with a JSON payload.
    Send {
        /// Event name.
        event: String,
        /// Payload.
        payload: Value,
    },

    /// Send plain text as a `message` event.
    Message {
        /// Message content.
        content: String,
    },

    /// Unknown or invalid command.
    Unknown {
        /// The original input.
        input: String,
    },

    /// Command with missing or invalid arguments.
    InvalidArgs {
        /// Command name.
        command: String,
        /// Error message.
        error: String,
    },
}

/// Parse a user input string into a command.
///
/// Commands start with `/`. Anything else is treated as a message.
pub fn parse(input: &str) -> Command {
    let input = input.trim();

    if input.is_empty() {
        return Command::Message { content: String::new() };
    }

    let Some(cmd_str) = input.strip_prefix('/') else {
        return Command::Message { content: input.to_string() };
    };

    let (command, rest) = match cmd_str.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (cmd_str, ""),
    };
    let parts: Vec<&str> = rest.split_whitespace().collect();

    match command {
        "connect" => Command::Connect,
        "disconnect" => Command::Disconnect,
        "reconnect" => Command::Reconnect,
        "foreground" | "fg" => Command::Foreground,
        "background" | "bg" => Command::Background,
        "status" => Command::Status,
        "logout" => Command::Logout,

        "login" => match parts.as_slice() {
            [access, refresh] => Command::Login {
                access_token: (*access).to_string(),
                refresh_token: (*refresh).to_string(),
            },
            _ => Command::InvalidArgs {
                command: "login".into(),
                error: "Usage: /login <access_token> <refresh_token>".into(),
            },
        },

        "send" => match rest.split_once(char::is_whitespace) {
            Some((event, json)) => match serde_json::from_str::<Value>(json.trim()) {
                Ok(payload) => Command::Send { event: event.to_string(), payload },
                Err(e) => Command::InvalidArgs {
                    command: "send".into(),
                    error: format!("Invalid JSON payload: {e}"),
                },
            },
            None if !rest.is_empty() => Command::Send { event: rest.to_string(), payload: Value::Null },
            None => Command::InvalidArgs {
                command: "send".into(),
                error: "Usage: /send <event> [json]".into(),
            },
        },

        "quit" | "q" => Command::Quit,

        _ => Command::Unknown { input: input.to_string() },
    }
}
