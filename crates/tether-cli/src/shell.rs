//! Command execution against a live client.

use std::io::Write;

use serde_json::{Value, json};
use tether_client::{CredentialStore, RealtimeClient};
use tether_core::{AppState, CredentialPair, Environment, KeyValueStore};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{
    commands::{self, Command},
    error::CliError,
};

/// Whether the shell keeps reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line.
    Continue,
    /// Stop.
    Quit,
}

/// Executes parsed commands.
#[derive(Debug)]
pub struct Shell<S, E> {
    client: RealtimeClient,
    credentials: CredentialStore<S, E>,
}

impl<S: KeyValueStore, E: Environment> Shell<S, E> {
    /// Shell driving `client`, with `/login` and `/logout` writing to
    /// `credentials`.
    pub fn new(client: RealtimeClient, credentials: CredentialStore<S, E>) -> Self {
        Self { client, credentials }
    }

    /// Client under control.
    pub fn client(&self) -> &RealtimeClient {
        &self.client
    }

    /// Execute one command, writing feedback to `out`.
    pub async fn execute<W: Write>(&self, command: Command, out: &mut W) -> Result<Flow, CliError> {
        match command {
            Command::Connect => {
                self.client.connect().await;
                writeln!(out, "connecting")?;
            },
            Command::Disconnect => {
                self.client.disconnect();
                writeln!(out, "disconnected")?;
            },
            Command::Reconnect => {
                self.client.force_reconnect();
                writeln!(out, "reconnecting")?;
            },
            Command::Foreground => self.client.set_app_state(AppState::Active),
            Command::Background => self.client.set_app_state(AppState::Background),
            Command::Login { access_token, refresh_token } => {
                self.credentials.write(&CredentialPair::new(access_token, refresh_token)).await?;
                writeln!(out, "credentials stored")?;
            },
            Command::Logout => {
                self.client.disconnect();
                self.credentials.clear().await?;
                writeln!(out, "logged out")?;
            },
            Command::Status => {
                writeln!(
                    out,
                    "state: {:?}, connected: {}",
                    self.client.state(),
                    self.client.is_connected()
                )?;
            },
            Command::Quit => return Ok(Flow::Quit),
            Command::Send { event, payload } => self.send(out, event, payload)?,
            Command::Message { content } if content.is_empty() => {},
            Command::Message { content } => {
                self.send(out, "message".to_string(), json!({ "text": content }))?;
            },
            Command::Unknown { input } => writeln!(out, "unknown command: {input}")?,
            Command::InvalidArgs { command, error } => writeln!(out, "/{command}: {error}")?,
        }
        Ok(Flow::Continue)
    }

    /// Execute commands line by line until input ends or `/quit`.
    pub async fn run<R, W>(&self, input: R, out: &mut W) -> Result<(), CliError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if self.execute(commands::parse(&line), out).await? == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    /// Disconnect and stop the client.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }

    fn send<W: Write>(&self, out: &mut W, event: String, payload: Value) -> Result<(), CliError> {
        if !self.client.send_message(event.clone(), payload) {
            writeln!(out, "not connected, {event} dropped")?;
        }
        Ok(())
    }
}
