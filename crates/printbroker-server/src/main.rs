// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process entry point: load configuration, open the store, restore the
// queue, wire up security and the printer backend, then run the TLS
// listener, dispatcher, and periodic sweep concurrently until a shutdown
// signal arrives.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use printbroker_core::AppConfig;
use printbroker_dispatcher::Dispatcher;
use printbroker_printer::{MockBackend, NativeBackend, PrinterBackend};
use printbroker_queue::PriorityQueue;
use printbroker_security::{AuthManager, RateLimiter};
use printbroker_server::{config_loader, handler::AppState, tls};
use printbroker_store::JobStore;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "printbroker-server", about = "Network print broker server")]
struct Cli {
    /// Path to a TOML configuration file. Missing keys keep their defaults.
    #[arg(long, env = "PRINTBROKER_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config_loader::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal: failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.logging.level);

    if config.security.tls_enabled
        && (config.security.certfile.is_none() || config.security.keyfile.is_none())
    {
        error!("security.tls_enabled is true but certfile/keyfile are not both configured");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("fatal: failed to start tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async_main(config))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn async_main(config: AppConfig) -> ExitCode {
    info!(version = env!("CARGO_PKG_VERSION"), "printbroker starting");

    if let Err(err) = ensure_dirs(&config).await {
        error!(%err, "failed to prepare data directories");
        return ExitCode::FAILURE;
    }

    let store = match JobStore::open(&config.database.url) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(%err, "failed to open job store");
            return ExitCode::FAILURE;
        }
    };

    let queue = Arc::new(PriorityQueue::new());
    if let Err(err) = queue.restore_from_store(&store) {
        error!(%err, "failed to restore priority queue from store");
        return ExitCode::FAILURE;
    }

    let auth = Arc::new(AuthManager::new(
        config.security.jwt_secret_key.clone(),
        config.security.token_expiration_hours,
    ));
    let rate_limiter = Arc::new(RateLimiter::new(
        config.security.requests_per_minute,
        config.security.effective_burst_size(),
    ));

    let backend: Arc<dyn PrinterBackend> = if config.printer.use_mock {
        info!("using mock printer backend");
        Arc::new(MockBackend::new())
    } else {
        Arc::new(NativeBackend::new(config.printer.name.clone()))
    };

    let config = Arc::new(config);

    let state = Arc::new(AppState {
        store: store.clone(),
        queue: queue.clone(),
        auth: auth.clone(),
        rate_limiter: rate_limiter.clone(),
        config: config.clone(),
    });

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        queue.clone(),
        backend,
        config.temp_folder.clone(),
    ));
    let dispatcher_shutdown = dispatcher.shutdown_handle();
    let dispatcher_task = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run().await })
    };

    let sweep_shutdown = Arc::new(Notify::new());
    let sweep_task = spawn_sweep_task(
        auth.clone(),
        rate_limiter.clone(),
        Duration::from_secs(config.rate_limit.sweep_interval_secs),
        Duration::from_secs(config.rate_limit.max_idle_secs),
        sweep_shutdown.clone(),
    );

    let listener_shutdown = Arc::new(Notify::new());
    let listener_task = {
        let config = config.clone();
        let state = state.clone();
        let listener_shutdown = listener_shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = tls::run_listener(config, state, listener_shutdown).await {
                error!(%err, "TLS listener exited with an error");
            }
        })
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => warn!(%err, "failed to listen for shutdown signal, shutting down anyway"),
    }

    listener_shutdown.notify_one();
    sweep_shutdown.notify_one();
    dispatcher_shutdown.notify_one();

    let _ = listener_task.await;
    let _ = sweep_task.await;
    let _ = dispatcher_task.await;

    let remaining = queue.drain().len();
    info!(remaining, "shutdown complete, remaining jobs stay pending for next boot");

    ExitCode::SUCCESS
}

async fn ensure_dirs(config: &AppConfig) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&config.temp_folder).await?;
    if let Some(parent) = Path::new(&config.database.url).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

fn spawn_sweep_task(
    auth: Arc<AuthManager>,
    rate_limiter: Arc<RateLimiter>,
    interval: Duration,
    max_idle: Duration,
    shutdown: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("sweep task shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    let evicted_buckets = rate_limiter.sweep_idle(max_idle);
                    let evicted_tokens = auth.sweep_cache(max_idle);
                    if evicted_buckets > 0 || evicted_tokens > 0 {
                        info!(evicted_buckets, evicted_tokens, "periodic sweep completed");
                    }
                }
            }
        }
    })
}
