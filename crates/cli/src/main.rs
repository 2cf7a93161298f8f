// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cv`: operator entry point for the Conveyor pipeline services.
//!
//! One binary, one subcommand per service. Periodic services take `run` for
//! a single pass or `loop` to keep going; event-driven services always run
//! until terminated. Startup configuration errors exit non-zero; running
//! services never exit on transient upstream failures.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cv_catalog::{RuntimeKindDef, Secrets, Settings};
use cv_client::{HttpBlobStore, HttpEventBus, HttpNodeStore};
use cv_core::SystemClock;
use cv_pipeline::api::UserApi;
use cv_pipeline::auth::UserTokens;
use cv_pipeline::callback::{self, AppState, Ingestor};
use cv_pipeline::forward::Forwarder;
use cv_pipeline::reconcile::Reconciler;
use cv_pipeline::regression::RegressionDetector;
use cv_pipeline::report::HttpReportSink;
use cv_pipeline::scheduler::Scheduler;
use cv_pipeline::tarball::{GitMirror, Tarball};
use cv_pipeline::trigger::Trigger;
use cv_pipeline::watch::Watcher;
use cv_pipeline::{run_loop, Blobs, Bus, Service, Store, DRAIN_GRACE};
use cv_runtimes::{build_adapter, CommandRenderer};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Cadence for polling poll-driven runtimes alongside the scheduler.
const WATCH_INTERVAL: Duration = Duration::from_secs(30);

/// Blob uploads carry multi-gigabyte tarballs.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(1800);

#[derive(Parser)]
#[command(name = "cv", version, about = "Conveyor: kernel CI pipeline services")]
struct Cli {
    /// Settings catalog (TOML)
    #[arg(long, global = true, default_value = "conveyor.toml")]
    settings: PathBuf,

    /// Secrets file (TOML)
    #[arg(long, global = true)]
    secrets: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// One pass, then exit
    Run,
    /// Keep running until SIGINT/SIGTERM
    Loop,
}

#[derive(Subcommand)]
enum Command {
    /// Watch upstream trees and create checkout nodes
    Trigger {
        #[arg(value_enum, default_value = "loop")]
        mode: Mode,
        /// Bypass frequency gates
        #[arg(long)]
        force: bool,
    },
    /// Turn fresh checkouts into uploaded source tarballs
    Tarball {
        #[arg(value_enum, default_value = "loop")]
        mode: Mode,
    },
    /// Match node events against the catalog and dispatch jobs
    Scheduler {
        /// Runtime names to serve (default: all configured)
        #[arg(long, value_delimiter = ',')]
        runtimes: Vec<String>,
    },
    /// Serve the callback ingestor and the user-facing APIs
    Callback,
    /// Drive timeouts, holdoffs, and parent aggregation
    Reconcile {
        #[arg(value_enum, default_value = "loop")]
        mode: Mode,
    },
    /// Record pass-to-fail transitions as regression nodes
    Regression,
    /// Forward terminal nodes to the downstream reporting sink
    Forward {
        #[arg(value_enum, default_value = "loop")]
        mode: Mode,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let settings = Arc::new(
        Settings::load(&cli.settings)
            .with_context(|| format!("loading settings from {}", cli.settings.display()))?,
    );
    let secrets = Arc::new(match &cli.secrets {
        Some(path) => Secrets::load(path)
            .with_context(|| format!("loading secrets from {}", path.display()))?,
        None => Secrets::default(),
    });

    let shutdown = shutdown_token();
    let (store, bus, blobs) = collaborators(&settings)?;

    match cli.command {
        Command::Trigger { mode, force } => {
            let trigger =
                Trigger::new(settings.clone(), store, SystemClock).with_force(force);
            match mode {
                Mode::Run => trigger.tick().await?,
                Mode::Loop => {
                    let interval = Duration::from_secs(settings.trigger.poll_interval_secs);
                    run_loop(&trigger, interval, shutdown).await;
                }
            }
        }

        Command::Tarball { mode } => {
            let mirror = Arc::new(GitMirror::new(settings.trigger.mirrors.clone()));
            let tarball =
                Tarball::new(settings.clone(), store, blobs, mirror, SystemClock);
            match mode {
                Mode::Run => tarball.tick().await?,
                Mode::Loop => {
                    let interval =
                        Duration::from_secs(settings.timeouts.sweep_interval_secs);
                    let events = tarball.run(bus.as_ref(), shutdown.clone());
                    let sweeps = run_loop(&tarball, interval, shutdown.clone());
                    with_drain(async { tokio::join!(events, sweeps); }, shutdown).await;
                }
            }
        }

        Command::Scheduler { runtimes } => {
            let selected: Vec<String> = if runtimes.is_empty() {
                settings.runtimes.keys().cloned().collect()
            } else {
                runtimes
            };
            let renderer = Arc::new(CommandRenderer::new(
                settings.renderer.command.clone(),
                settings.renderer.templates.clone(),
            ));
            let mut scheduler =
                Scheduler::new(settings.clone(), store.clone(), renderer, SystemClock);
            let mut watcher =
                Watcher::new(settings.clone(), store.clone(), blobs, SystemClock);
            for name in &selected {
                let Some(def) = settings.runtime(name) else {
                    bail!("unknown runtime {name:?} in --runtimes");
                };
                let adapter =
                    build_adapter(name, def, secrets.runtime(name), &settings.callback).await?;
                scheduler.register_runtime(name, adapter.clone());
                watcher.register_adapter(name, adapter);
            }
            info!(runtimes = %selected.join(","), "scheduler serving runtimes");
            let events = scheduler.run(bus.as_ref(), shutdown.clone());
            let polls = run_loop(&watcher, WATCH_INTERVAL, shutdown.clone());
            with_drain(async { tokio::join!(events, polls); }, shutdown).await;
        }

        Command::Callback => {
            let mut ingestor =
                Ingestor::new(store.clone(), settings.clone(), secrets.clone(), SystemClock);
            // callback-driven runtimes contribute their payload parsers
            for (name, def) in &settings.runtimes {
                if matches!(def.kind, RuntimeKindDef::Lava { .. } | RuntimeKindDef::Pull { .. }) {
                    let adapter =
                        build_adapter(name, def, secrets.runtime(name), &settings.callback)
                            .await?;
                    ingestor.register_adapter(name, adapter);
                }
            }
            let trigger = Arc::new(Trigger::new(settings.clone(), store.clone(), SystemClock));
            let tokens = secrets.user_token_secret.clone().map(UserTokens::new);
            let api = Arc::new(UserApi::new(
                store,
                trigger,
                settings.clone(),
                tokens,
                SystemClock,
            ));
            let router = callback::router(AppState { ingestor: Arc::new(ingestor), api });
            callback::serve(router, &settings.callback.listen, shutdown).await?;
        }

        Command::Reconcile { mode } => {
            let reconciler = Reconciler::new(settings.clone(), store, SystemClock);
            match mode {
                Mode::Run => reconciler.sweep().await?,
                Mode::Loop => {
                    run_loop(&reconciler, reconciler.sweep_interval(), shutdown).await;
                }
            }
        }

        Command::Regression => {
            let detector = RegressionDetector::new(store);
            with_drain(detector.run(bus.as_ref(), shutdown.clone()), shutdown).await;
        }

        Command::Forward { mode } => {
            let reporting = secrets
                .reporting
                .as_ref()
                .context("reporting sink credentials missing from secrets file")?;
            let sink = Arc::new(HttpReportSink::new(&reporting.url, reporting.token.clone()));
            let forwarder = Forwarder::new(settings.clone(), store, sink, SystemClock);
            match mode {
                Mode::Run => forwarder.batch().await?,
                Mode::Loop => {
                    with_drain(forwarder.run(bus.as_ref(), shutdown.clone()), shutdown).await;
                }
            }
        }
    }

    info!("clean shutdown");
    Ok(())
}

fn collaborators(settings: &Settings) -> Result<(Store, Bus, Blobs)> {
    let timeout = Duration::from_secs(settings.api.timeout_secs);
    let store: Store = Arc::new(HttpNodeStore::new(
        &settings.api.url,
        settings.api.token.clone(),
        timeout,
    )?);
    // long-poll requests outlive the normal call timeout
    let bus: Bus = Arc::new(HttpEventBus::new(
        &settings.api.url,
        settings.api.token.clone(),
        timeout.max(Duration::from_secs(90)),
    )?);
    let blobs: Blobs = Arc::new(HttpBlobStore::new(
        &settings.storage.url,
        settings.storage.token.clone(),
        UPLOAD_TIMEOUT,
    )?);
    Ok((store, bus, blobs))
}

/// Cancel on SIGINT/SIGTERM.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trip = token.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
        #[cfg(not(unix))]
        let _ = ctrl_c.await;
        info!("shutdown requested, draining");
        trip.cancel();
    });
    token
}

/// Let a service future drain for a bounded grace period after shutdown.
async fn with_drain<F: Future<Output = ()>>(fut: F, shutdown: CancellationToken) {
    tokio::pin!(fut);
    tokio::select! {
        _ = &mut fut => {}
        _ = shutdown.cancelled() => {
            let _ = tokio::time::timeout(DRAIN_GRACE, &mut fut).await;
        }
    }
}
