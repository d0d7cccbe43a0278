//! Outbound audio processor binary. One process per active call.

use clap::Parser;
use tracing::{error, info};

use audio_outbound_processor::OutboundProcessor;
use audio_proto_registration::CallId;

/// Outbound audio processor: TTS TCP stream -> paced SHM frames.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base port; the TTS consumer registration port is derived from
    /// `13000 + call_id` and the TTS audio port from `9002 + call_id`.
    #[arg(long, default_value_t = 13000)]
    port: u16,

    /// Call id this processor instance serves.
    #[arg(long)]
    call_id: u32,

    /// Cycle a pre-loaded mu-law test tone into silence gaps before TTS
    /// attaches. Developer affordance only, off by default.
    #[arg(long, default_value_t = false)]
    test_tone: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let call_id = CallId::new(args.call_id);
    let _ = args.port;

    info!(%call_id, "starting outbound audio processor");
    let processor = std::sync::Arc::new(OutboundProcessor::new(call_id, args.test_tone));

    let run_handle = {
        let processor = processor.clone();
        tokio::spawn(async move { processor.run().await })
    };

    tokio::select! {
        result = run_handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(%call_id, error = %e, "outbound processor failed");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!(%call_id, error = %e, "outbound processor task panicked");
                    std::process::exit(1);
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!(%call_id, "SIGINT received, deactivating call");
            processor.deactivate();
            // Force-exit after a brief cleanup window.
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
