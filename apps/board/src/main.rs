//! Terminal client for the shared message board.
//!
//! Type a line and press enter to post it. `/refresh` reloads the list,
//! `/clear` empties the input, `/restart` reconnects, `/quit` leaves.

use std::{
    io::{BufReader, IsTerminal},
    path::PathBuf,
    sync::Arc,
};

use anyhow::Context;
use clap::Parser;
use client_core::RestGateway;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod controller;
mod input_bridge;
mod ui;

#[cfg(test)]
mod test_support;

use app::App;
use config::{load_settings, Settings};
use controller::{Coordinator, SystemClock};
use ui::TerminalView;

const GESTURE_QUEUE_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "board", about = "Post to and follow a shared message board")]
struct Args {
    /// Base url of the table service, e.g. https://<project>.example.co
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    anon_key: Option<String>,
    #[arg(long)]
    table: Option<String>,
    /// Settings file; defaults to ./board.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(v) = &self.backend_url {
            settings.backend_url = v.clone();
        }
        if let Some(v) = &self.anon_key {
            settings.anon_key = v.clone();
        }
        if let Some(v) = &self.table {
            settings.table = v.clone();
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    args.apply(&mut settings);
    let gateway = RestGateway::new(settings.gateway_config()?);
    info!(
        backend_url = %settings.backend_url,
        table = %settings.table,
        channel = %settings.channel,
        "board: starting"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build board runtime")?;
    runtime.block_on(run(settings, gateway))
}

async fn run(settings: Settings, gateway: RestGateway) -> anyhow::Result<()> {
    let (gesture_tx, gestures) = mpsc::channel(GESTURE_QUEUE_CAPACITY);
    let (push_tx, pushes) = mpsc::unbounded_channel();

    let stdout = std::io::stdout();
    let view = TerminalView::new(stdout, settings.toast_duration())
        .with_clear_screen(std::io::stdout().is_terminal());
    let coordinator = Coordinator::new(
        gateway,
        view,
        Arc::new(SystemClock),
        push_tx,
        settings.max_message_length,
    );

    // the reader thread stays blocked on stdin after the loop ends; exiting
    // the process reclaims it
    input_bridge::spawn_input_reader(BufReader::new(std::io::stdin()), gesture_tx)
        .context("failed to start input reader")?;

    App::new(coordinator, gestures, pushes).run().await;
    Ok(())
}
