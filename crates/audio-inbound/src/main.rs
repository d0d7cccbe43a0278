//! Inbound audio processor binary. One process per active call.

use clap::Parser;
use tracing::{error, info};

use audio_inbound_processor::InboundProcessor;
use audio_proto_registration::CallId;

/// Inbound audio processor: SHM -> VAD -> STT TCP stream.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base port; unused directly by C3 (the STT audio port is derived
    /// from `base + call_id`), accepted for CLI uniformity with C4.
    #[arg(long, default_value_t = 9001)]
    port: u16,

    /// Call id this processor instance serves.
    #[arg(long)]
    call_id: u32,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let call_id = CallId::new(args.call_id);
    let _ = args.port; // port derivation is fixed; kept for CLI parity.

    info!(%call_id, "starting inbound audio processor");
    let processor = std::sync::Arc::new(InboundProcessor::new(call_id));

    let run_handle = {
        let processor = processor.clone();
        tokio::spawn(async move { processor.run().await })
    };

    tokio::select! {
        result = run_handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(%call_id, error = %e, "inbound processor failed");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!(%call_id, error = %e, "inbound processor task panicked");
                    std::process::exit(1);
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!(%call_id, "SIGINT received, deactivating call");
            processor.deactivate();
            // Give the run loop a brief window to send BYE and close
            // sockets, then force-exit regardless.
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
        _ = terminate_signal() => {
            info!(%call_id, "SIGTERM received, deactivating call");
            processor.deactivate();
            // Unlike SIGINT, let the run loop finish its own BYE/close and
            // stop on its own rather than forcing the process down.
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    }
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
