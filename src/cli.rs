use crate::action_gate;
use crate::audit_log::{verify_chain, AuditLogger};
use crate::config_loader::{self, AuditBackend, GateConfig};
use crate::engine::Engine;
use crate::replay;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level CLI interface for the enforcement engine
#[derive(Parser)]
#[command(
    name = "verdictctl",
    version,
    about = "Deterministic content and action enforcement"
)]
pub struct Cli {
    /// Configuration file (defaults to ./verdict_gate.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decide on one request file and print the public verdict
    Evaluate {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Recompute every logged decision and report mismatches
    Replay {
        #[arg(short, long)]
        log: Option<PathBuf>,
        #[arg(long)]
        backend: Option<AuditBackend>,
    },

    /// Check the hash links of an audit log
    VerifyChain {
        #[arg(short, long)]
        log: Option<PathBuf>,
        #[arg(long)]
        backend: Option<AuditBackend>,
    },

    /// Serve the HTTP API (enforce, action, health)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Gate one real-world action request file
    Action {
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn log_location(config: &GateConfig, log: Option<PathBuf>, backend: Option<AuditBackend>) -> (AuditBackend, PathBuf) {
    (
        backend.unwrap_or(config.audit.backend),
        log.unwrap_or_else(|| config.audit.path.clone()),
    )
}

pub fn dispatch(cli: Cli) -> Result<()> {
    let config = GateConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Evaluate { input } => {
            let request = read_json(&input)?;
            let engine = Engine::from_config(&config).context("initializing engine")?;
            print_json(&engine.enforce_value(&request).public())
        }
        Commands::Replay { log, backend } => {
            let (backend, path) = log_location(&config, log, backend);
            let sink = config_loader::open_sink(backend, &path)
                .with_context(|| format!("opening audit log {}", path.display()))?;
            // replay must not append to the log it is reading
            let engine = Engine::builtin(AuditLogger::disabled()).context("initializing engine")?;
            let summary = replay::replay_all(&engine, sink.as_ref())?;
            print_json(&summary)?;
            if !summary.is_clean() {
                bail!(
                    "{} of {} records did not replay",
                    summary.mismatched.len(),
                    summary.total
                );
            }
            Ok(())
        }
        Commands::VerifyChain { log, backend } => {
            let (backend, path) = log_location(&config, log, backend);
            let sink = config_loader::open_sink(backend, &path)
                .with_context(|| format!("opening audit log {}", path.display()))?;
            let report = verify_chain(&sink.entries()?);
            match report.first_break {
                None => {
                    println!("chain intact: {} entries", report.entries);
                    Ok(())
                }
                Some(broken) => bail!("chain broken at sequence {}: {}", broken.sequence, broken.reason),
            }
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let engine = Arc::new(Engine::from_config(&config).context("initializing engine")?);
            if engine.runtime().kill_switch {
                tracing::warn!("kill switch engaged, every decision will terminate");
            }
            let app = crate::gateweb::build_router(engine);

            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("building tokio runtime")?;

            rt.block_on(async move {
                let addr = format!("{host}:{port}");
                let listener = tokio::net::TcpListener::bind(&addr)
                    .await
                    .with_context(|| format!("binding {addr}"))?;
                tracing::info!(%addr, "HTTP server listening");
                axum::serve(listener, app).await.context("server error")
            })
        }
        Commands::Action { input } => {
            let request = read_json(&input)?;
            print_json(&action_gate::approve_value(&request))
        }
    }
}
