// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root for `otusd` (spec §4, §6): loads config, wires the
//! Task Manager/Store/Command Handler, restores persisted tasks, and
//! serves the UDS and (if enabled) Kafka command transports until a
//! shutdown signal or `daemon_shutdown` RPC arrives.

use clap::Parser;
use otus_core::AgentId;
use otus_daemon::config::GlobalConfig;
use otus_daemon::{command_handler::CommandHandler, metrics, rpc_server::RpcServer, tracing_setup};
use otus_pipeline::TaskManager;
use otus_storage::TaskStore;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "otusd", about = "Otus packet-capture and observability agent")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "/etc/otus/otus.toml")]
    config: PathBuf,

    /// Log format override; defaults to the value in the config file.
    #[arg(long)]
    log_format: Option<String>,

    /// Skip restoring previously running tasks from disk on startup.
    #[arg(long)]
    no_restore: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match GlobalConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config at {}: {err}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    let log_format = cli.log_format.as_deref().unwrap_or(&config.otus.log.format);
    tracing_setup::init(&config.otus.log.level, log_format);

    if let Err(err) = run(cli.config, config, cli.no_restore).await {
        error!(error = %err, "otusd exited with an error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(config_path: PathBuf, config: GlobalConfig, no_restore: bool) -> Result<(), Box<dyn std::error::Error>> {
    let hostname = hostname::get()?.to_string_lossy().to_string();
    info!(hostname, config = %config_path.display(), "starting otusd");

    metrics::install(&config.otus.metrics.listen_addr)?;

    let store = Arc::new(TaskStore::new(&config.otus.data_dir)?);
    let manager = Arc::new(TaskManager::new(AgentId::new(hostname.clone())));
    let max_history = config.otus.persistence.max_task_history;
    let handler = Arc::new(CommandHandler::new(Arc::clone(&manager), Arc::clone(&store), config.clone(), config_path, hostname.clone()));

    let restored = handler.restore(!no_restore).await;
    info!(restored, no_restore, "task restore complete");

    let cancel = CancellationToken::new();

    let rpc_server = RpcServer::bind(&config.otus.control_socket_path)?;
    let rpc_handler = Arc::clone(&handler);
    let rpc_cancel = cancel.clone();
    let rpc_task = tokio::spawn(async move { rpc_server.serve(rpc_handler, rpc_cancel).await });

    #[cfg(feature = "kafka")]
    let kafka_task = {
        let kafka_config = config.otus.command_channel.kafka.clone();
        let effective_brokers: Vec<String> = kafka_config.effective_brokers(&config.otus.kafka).to_vec();
        if effective_brokers.is_empty() {
            info!("no kafka brokers configured, command channel consumer disabled");
            None
        } else {
            let consumer = otus_daemon::kafka_consumer::KafkaCommandConsumer::new(kafka_config, &effective_brokers, hostname.clone())?;
            let kafka_handler = Arc::clone(&handler);
            let kafka_cancel = cancel.clone();
            Some(tokio::spawn(async move { consumer.run(kafka_handler, kafka_cancel).await }))
        }
    };

    let gc_handler = Arc::clone(&handler);
    let gc_cancel = cancel.clone();
    let gc_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = gc_cancel.cancelled() => break,
                _ = ticker.tick() => gc_handler.gc_old_tasks(max_history),
            }
        }
    });

    wait_for_shutdown_signal(&cancel).await?;
    info!("shutdown signal received, stopping transports");

    cancel.cancel();
    let _ = rpc_task.await;
    #[cfg(feature = "kafka")]
    if let Some(kafka_task) = kafka_task {
        let _ = kafka_task.await;
    }
    let _ = gc_task.await;

    manager.stop_all(16, Duration::from_secs(30)).await;
    info!("otusd shut down cleanly");
    Ok(())
}

async fn wait_for_shutdown_signal(cancel: &CancellationToken) -> std::io::Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
        _ = cancel.cancelled() => {}
    }
    Ok(())
}
