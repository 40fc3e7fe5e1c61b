//! Tether shell binary.

use std::{io::Write, path::PathBuf, time::Duration};

use clap::Parser;
use tether_cli::{CliError, Shell};
use tether_client::{
    ClientConfig, CredentialStore, FileStore, HttpTokenExchange, RealtimeClient, WsTransport,
};
use tether_core::SystemEnv;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

/// Interactive client for a realtime backend.
#[derive(Debug, Parser)]
#[command(name = "tether", version)]
struct Args {
    /// Realtime endpoint.
    #[arg(long, env = "TETHER_URL")]
    url: String,

    /// Token refresh endpoint.
    #[arg(long, env = "TETHER_REFRESH_URL")]
    refresh_url: String,

    /// File holding the credential pair.
    #[arg(long, env = "TETHER_STORE", default_value = "tether-session.json")]
    store: PathBuf,

    /// Handshake timeout in seconds.
    #[arg(long, default_value_t = 20)]
    handshake_timeout: u64,

    /// Connect immediately.
    #[arg(long)]
    connect: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let env = SystemEnv;
    let store = FileStore::new(&args.store);

    let config = ClientConfig::new(args.url)
        .with_handshake_timeout(Duration::from_secs(args.handshake_timeout));
    let client = RealtimeClient::spawn(
        config,
        WsTransport::new(),
        store.clone(),
        HttpTokenExchange::new(args.refresh_url),
        env,
    );

    client.set_message_handler(|message| {
        let _ = writeln!(std::io::stdout().lock(), "<- {} {}", message.event, message.payload);
    });
    client.set_error_handler(|error| {
        let _ = writeln!(std::io::stdout().lock(), "!! {error}");
    });

    let shell = Shell::new(client, CredentialStore::new(store, env));
    if args.connect {
        shell.client().connect().await;
    }

    let result = shell.run(BufReader::new(tokio::io::stdin()), &mut std::io::stdout()).await;
    shell.shutdown().await;
    result
}
