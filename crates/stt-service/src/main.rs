//! STT service shell binary. One process serves every call.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use stt_service::engine::ScriptedInferenceContext;
use stt_service::model::SharedInferenceContext;
use stt_service::registration::{self, Registry};

/// STT service: UDP registration, shared warmed model, LLM forwarding.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the model file. The engine's internals are an external
    /// collaborator; only the file's presence is checked here.
    #[arg(long)]
    model: std::path::PathBuf,

    /// Path to the read-only SQLite configuration store. Accepted for
    /// compatibility with the external control plane; this service's scope
    /// ends at the audio/text plane, so the file itself is never opened.
    #[arg(long)]
    database: Option<std::path::PathBuf>,

    #[arg(long, default_value_t = num_cpus::get())]
    threads: usize,

    #[arg(long, default_value = "127.0.0.1")]
    llama_host: String,

    #[arg(long, default_value_t = audio_proto_registration::LLM_PORT)]
    llama_port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let _ = &args.database;

    if std::fs::metadata(&args.model).is_err() {
        error!(path = ?args.model, "model file is not readable");
        return ExitCode::from(1);
    }

    let engine: Box<dyn stt_service::model::InferenceContext> = Box::new(ScriptedInferenceContext::new());
    let model = match SharedInferenceContext::warm_up(engine, args.threads).await {
        Ok(model) => model,
        Err(e) => {
            error!(error = %e, "model warm-up failed");
            return ExitCode::from(1);
        }
    };
    info!(threads = args.threads, "stt-service running");

    let registry = Arc::new(Registry::new(model, args.llama_host.clone(), args.llama_port));
    let active = Arc::new(AtomicBool::new(true));

    let run_handle = {
        let registry = registry.clone();
        let active = active.clone();
        tokio::spawn(async move { registration::run(registry, active).await })
    };
    let sweep_handle = {
        let registry = registry.clone();
        let active = active.clone();
        tokio::spawn(async move { registration::run_idle_sweep(registry, active).await })
    };

    let exit_code = tokio::select! {
        result = run_handle => {
            match result {
                Ok(Ok(())) => ExitCode::SUCCESS,
                Ok(Err(e)) => {
                    error!(error = %e, "registration listener failed");
                    ExitCode::from(1)
                }
                Err(e) => {
                    error!(error = %e, "registration listener task panicked");
                    ExitCode::from(1)
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received, shutting down");
            ExitCode::SUCCESS
        }
        _ = terminate_signal() => {
            info!("SIGTERM received, shutting down");
            ExitCode::SUCCESS
        }
    };

    active.store(false, Ordering::Release);
    sweep_handle.abort();
    registry.shutdown().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    exit_code
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    term.recv().await;
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
