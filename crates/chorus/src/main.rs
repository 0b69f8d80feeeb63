//! # chorus
//!
//! The chorus chat binary: `chorus serve` runs the broadcast server,
//! `chorus connect` runs a client. Both attach a deliberately thin
//! line-oriented console — the stand-in for the presentation layer, which
//! talks to the core through exactly two surfaces: submit an outgoing
//! message, observe inbound events and membership.

#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chorus_client::{ClientConfig, ClientEvent, Connector};
use chorus_core::{FixedDelay, ReconnectPolicy};
use chorus_server::{ChatServer, ServerConfig};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// chorus chat service.
#[derive(Parser, Debug)]
#[command(name = "chorus", about = "Real-time text broadcast service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the chat server.
    Serve {
        /// Host to bind.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind (0 for auto-assign).
        #[arg(long, default_value = "12345")]
        port: u16,
    },
    /// Connect to a chat server.
    Connect {
        /// Server host.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Server port.
        #[arg(long, default_value = "12345")]
        port: u16,

        /// Display name to register under.
        #[arg(long)]
        name: String,

        /// Seconds between reconnect attempts.
        #[arg(long, default_value = "5")]
        retry_delay_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match Cli::parse().command {
        Command::Serve { host, port } => serve(host, port).await,
        Command::Connect {
            host,
            port,
            name,
            retry_delay_secs,
        } => connect(host, port, name, retry_delay_secs).await,
    }
}

/// Run the server with an operator console: every non-empty stdin line is
/// broadcast as `Server: <line>`; `/quit` or Ctrl-C stops the server.
async fn serve(host: String, port: u16) -> Result<()> {
    let config = ServerConfig {
        host,
        port,
        ..ServerConfig::default()
    };
    let server = ChatServer::bind(config)
        .await
        .context("failed to start server")?;
    println!("Server started on {}", server.local_addr());
    println!("Waiting for clients to connect...");

    let handle = server.handle();
    let run = tokio::spawn(server.run());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(line) if line.trim() == "/quit" => break,
                Some(line) if !line.trim().is_empty() => {
                    let text = line.trim();
                    handle.operator(text);
                    println!("{} Server: {text}", stamp(Utc::now()));
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    println!("Stopping ({} online)...", handle.online());
    handle.stop();
    run.await?.context("server failed")?;
    Ok(())
}

/// Run the client console: stdin lines go out as chat, events are rendered
/// as they arrive; `/quit` or Ctrl-C closes the client.
async fn connect(host: String, port: u16, name: String, retry_delay_secs: u64) -> Result<()> {
    let delay = Duration::from_secs(retry_delay_secs);
    let policy: Arc<dyn ReconnectPolicy> = Arc::new(FixedDelay::new(delay));

    // Initial-connect retry loop; after this, reconnection is the
    // library's job.
    println!("Connecting…");
    let mut handle = loop {
        let connector = Connector::new(ClientConfig::new(host.clone(), port, name.clone()))
            .with_policy(policy.clone());
        match connector.connect().await {
            Ok(handle) => break handle,
            Err(e) => {
                println!("{e}. Retrying in {retry_delay_secs}s...");
                tokio::time::sleep(delay).await;
            }
        }
    };

    let sender = handle.sender();
    let mut input = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line == "/quit" {
                break;
            }
            if line.is_empty() {
                continue;
            }
            if sender.send(line).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut input => break,
            event = handle.next_event() => match event {
                Some(event) => render(&event),
                None => break,
            },
        }
    }

    input.abort();
    handle.close();
    handle.closed().await;
    println!("Disconnected");
    Ok(())
}

/// Render one inbound event as a console line.
fn render(event: &ClientEvent) {
    match event {
        ClientEvent::Chat { from, text, at } => println!("{} {from}: {text}", stamp(*at)),
        ClientEvent::System { text, at } => println!("{} {text}", stamp(*at)),
        ClientEvent::Presence { names } => println!("Online users: {}", names.join(", ")),
        ClientEvent::State(state) => println!("[{state}]"),
        ClientEvent::DeliveryFailed { .. } => println!("Message not sent. Server is offline."),
    }
}

/// `[YYYY-mm-dd HH:MM:SS]` in local time, matching the original console.
fn stamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("[%Y-%m-%d %H:%M:%S]")
        .to_string()
}
