mod cli;
mod config;
mod console;
mod error;
mod kubernetes;
mod parser;
mod receiver;
mod runner;
mod streamer;
#[cfg(test)]
mod testing;
mod theme;
mod types;
mod watcher;

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use cli::Cli;
use config::Config;
use console::Console;
use kubernetes::{KubePods, create_client};
use runner::Runner;
use theme::Theme;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Tailed logs own stdout; the tool's own diagnostics go to stderr.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path).context("couldn't read config")?,
        None => Config::default(),
    };
    if let Some(ns) = &cli.namespace {
        config.namespace = ns.clone();
    }
    if let Some(since) = cli.since {
        config.seconds_before = since;
    }
    let config = config.prepared().context("invalid config")?;

    let client = create_client(cli.context.as_deref())
        .await
        .context("failed to create k8s client")?;
    let pods = KubePods::new(client, config.namespace());

    let theme = if cli.no_color || !std::io::stdout().is_terminal() {
        Theme::plain()
    } else {
        Theme::default()
    };
    let runner = Arc::new(Runner::new(
        pods,
        Arc::new(config),
        Arc::new(theme),
        Console::stdout(),
    ));

    let mut watch = runner.run();
    tokio::select! {
        res = shutdown_signal() => res?,
        res = &mut watch => {
            // Watch failures are fatal to discovery only; keep tailing what is live.
            if let Ok(Err(_)) | Err(_) = res {
                error!("Pod discovery stopped; already open streams continue until interrupted");
            }
            shutdown_signal().await?;
        }
    }

    info!(
        "Shutting down, closing {} streams",
        runner.active_targets().await.len()
    );
    runner.stop().await;
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}
