//! streamd — the streaming cache daemon.
//!
//! Assembles the session pool, chunk cache, fetcher, prefetch engine, and
//! loopback range server into one process and exposes them through
//! [`streamd::StreamOrchestrator`].
//!
//! This binary has no production [`stream_transport::RemoteTransport`] to
//! wire in — the workspace's only implementation is
//! [`stream_transport::MockTransport`] — so `serve` optionally registers one
//! demo stream against the mock at startup and otherwise just keeps the
//! session pool warm until shutdown. A host embedding this crate as a
//! library would supply its own `TransportFactory` and drive
//! `start_stream`/`stop_stream` directly instead of going through this CLI.

use std::path::PathBuf;

use clap::Parser;
use streamd::{StartStreamRequest, StreamOrchestrator};
use tracing::info;

#[derive(Parser)]
#[command(name = "streamd", about = "Streaming cache and range server daemon")]
struct Cli {
    /// Path to `stream.toml`. Missing file falls back to built-in defaults.
    #[arg(long, default_value = "stream.toml")]
    config: PathBuf,

    /// Directory holding the persisted credential file.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Register one demo stream at startup: `chat_id:message_id:stream_id`.
    #[arg(long)]
    demo_stream: Option<String>,

    /// File size in bytes of the demo stream (required with `--demo-stream`).
    #[arg(long, default_value = "0")]
    demo_size: u64,

    /// MIME type of the demo stream.
    #[arg(long, default_value = "application/octet-stream")]
    demo_mime: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,streamd=debug,stream_core=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let settings = stream_core::Settings::from_file_or_default(&cli.config)?;
    info!(?settings, "loaded settings");

    let credential_path = cli
        .data_dir
        .map(|dir| dir.join("credential.json"))
        .unwrap_or_else(stream_transport::credential::default_credential_path);

    let mock = stream_transport::MockTransport::new();

    let demo_request = match cli.demo_stream.as_deref() {
        Some(spec) => Some(parse_demo_stream(spec, cli.demo_size, &cli.demo_mime, &mock)?),
        None => None,
    };

    let orchestrator = StreamOrchestrator::new(settings, Box::new(mock), credential_path);

    if let Some(request) = demo_request {
        let response = orchestrator.start_stream(request).await?;
        info!(url = %response.url, "demo stream ready");
    }

    info!("streamd running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    orchestrator.shutdown().await;
    info!("streamd stopped");
    Ok(())
}

fn parse_demo_stream(
    spec: &str,
    size: u64,
    mime: &str,
    mock: &stream_transport::MockTransport,
) -> anyhow::Result<StartStreamRequest> {
    let mut parts = spec.splitn(3, ':');
    let chat_id: i64 = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("--demo-stream must be chat_id:message_id:stream_id"))?
        .parse()?;
    let message_id: i64 = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("--demo-stream must be chat_id:message_id:stream_id"))?
        .parse()?;
    let stream_id = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("--demo-stream must be chat_id:message_id:stream_id"))?
        .to_string();

    if size == 0 {
        anyhow::bail!("--demo-size must be nonzero when --demo-stream is set");
    }

    mock.register_stream(chat_id, message_id, stream_id.clone(), size, mime, 1);

    Ok(StartStreamRequest {
        stream_id,
        chat_id,
        message_id,
        api_id: 0,
        api_hash: String::new(),
        bot_token: String::new(),
        mime_type: None,
        total_size: None,
        parts: Vec::new(),
    })
}
