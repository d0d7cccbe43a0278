//! UDP registration listener, the TCP/session maps it guards, and the
//! idle-timeout sweep.
//!
//! Lock ordering is a total order for deadlock freedom:
//! `tcp_mutex -> sessions_mutex -> (release all) -> model_mutex -> (release)
//! -> per-call buffers`. No code path may acquire a lock earlier in this
//! order while holding one later in it. The registration handler never
//! performs I/O while holding either map lock; connects happen after both
//! are released.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use audio_proto_registration::framing::{read_hello, read_stt_audio_frame, FramingError, SttAudioFrame};
use audio_proto_registration::{inbound_audio_port, CallId, RegistrationMessage, STT_REGISTRATION_PORT};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::llm_client::LlmConnections;
use crate::model::SharedInferenceContext;
use crate::session::SttSession;

const RECV_TIMEOUT: Duration = Duration::from_secs(1);
const RECV_BUFFER_BYTES: usize = 256 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallStage {
    Connecting,
    Connected,
}

struct TcpEntry {
    stage: CallStage,
    task: Option<JoinHandle<()>>,
}

/// Everything the registration listener and per-call tasks share: the two
/// tcp/sessions maps, the LLM connection pool, and the model handle.
pub struct Registry {
    tcp: Mutex<HashMap<CallId, TcpEntry>>,
    sessions: Mutex<HashMap<CallId, Arc<SttSession>>>,
    llm: LlmConnections,
    model: Arc<SharedInferenceContext>,
}

impl Registry {
    pub fn new(model: Arc<SharedInferenceContext>, llama_host: String, llama_port: u16) -> Self {
        Self {
            tcp: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            llm: LlmConnections::new(llama_host, llama_port),
            model,
        }
    }

    pub async fn shutdown(&self) {
        self.llm.close_all().await;
    }

    /// Number of live sessions. Exposed for tests exercising the
    /// invariant that REGISTER/BYE leaves no zombie map entries.
    pub async fn active_session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether a reservation or live connection is still tracked for
    /// `call_id`. Exposed for the same reason as `active_session_count`.
    pub async fn has_tcp_entry(&self, call_id: CallId) -> bool {
        self.tcp.lock().await.contains_key(&call_id)
    }
}

/// Runs the UDP registration listener until `active` is cleared. Never
/// blocks on downstream I/O: REGISTER/BYE handling is spawned off.
pub async fn run(registry: Arc<Registry>, active: Arc<AtomicBool>) -> Result<()> {
    let socket = bind_registration_socket()?;
    let mut buf = [0u8; 256];

    while active.load(Ordering::Acquire) {
        match tokio::time::timeout(RECV_TIMEOUT, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, peer))) => dispatch_datagram(&registry, &buf[..len], peer),
            Ok(Err(e)) => warn!(error = %e, "registration socket error"),
            Err(_elapsed) => {
                // Timed out; loop back around to re-check `active`.
            }
        }
    }
    Ok(())
}

fn dispatch_datagram(registry: &Arc<Registry>, datagram: &[u8], peer: SocketAddr) {
    match RegistrationMessage::parse(datagram) {
        Ok(RegistrationMessage::Register(call_id)) => {
            debug!(%call_id, %peer, "REGISTER received");
            tokio::spawn(handle_register(registry.clone(), call_id));
        }
        Ok(RegistrationMessage::Bye(call_id)) => {
            debug!(%call_id, %peer, "BYE received");
            tokio::spawn(handle_bye(registry.clone(), call_id));
        }
        Err(e) => warn!(%peer, error = %e, "ignoring malformed registration datagram"),
    }
}

fn bind_registration_socket() -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_recv_buffer_size(RECV_BUFFER_BYTES)?;
    let addr: SocketAddr = ([127, 0, 0, 1], STT_REGISTRATION_PORT).into();
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// `REGISTER:<id>` -> if not already reserved/connected and no live session
/// exists, mark a reservation and spawn a connect task. Two simultaneous
/// REGISTERs for the same id collapse into exactly one connect;
/// a REGISTER while a session is already live is a no-op.
async fn handle_register(registry: Arc<Registry>, call_id: CallId) {
    let should_spawn = {
        let mut tcp = registry.tcp.lock().await;
        if tcp.contains_key(&call_id) {
            false
        } else {
            let sessions = registry.sessions.lock().await;
            if sessions.contains_key(&call_id) {
                false
            } else {
                drop(sessions);
                tcp.insert(
                    call_id,
                    TcpEntry {
                        stage: CallStage::Connecting,
                        task: None,
                    },
                );
                true
            }
        }
    };
    if !should_spawn {
        return;
    }

    let task_registry = registry.clone();
    let handle = tokio::spawn(async move {
        run_call(task_registry, call_id).await;
    });

    let mut tcp = registry.tcp.lock().await;
    match tcp.get_mut(&call_id) {
        Some(entry) => entry.task = Some(handle),
        None => handle.abort(), // reservation vanished (raced with BYE)
    }
}

/// `BYE:<id>` -> abort the call's task (if any) and erase both map entries.
/// A BYE for an unknown id is a no-op.
async fn handle_bye(registry: Arc<Registry>, call_id: CallId) {
    let task = {
        let mut tcp = registry.tcp.lock().await;
        tcp.remove(&call_id).and_then(|entry| entry.task)
    };
    registry.sessions.lock().await.remove(&call_id);
    if let Some(task) = task {
        task.abort();
    }
}

/// One call's lifecycle from reservation to teardown: connect to the audio
/// source, create the session, run its receive loop, then erase both map
/// entries atomically with respect to external observers. The connect
/// timeout and retry budget live here, not in the listener.
async fn run_call(registry: Arc<Registry>, call_id: CallId) {
    let port = inbound_audio_port(call_id);
    let connect = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await;
    let stream = match connect {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(%call_id, error = %e, "audio source connect failed");
            registry.tcp.lock().await.remove(&call_id);
            return;
        }
        Err(_elapsed) => {
            warn!(%call_id, "audio source connect timed out");
            registry.tcp.lock().await.remove(&call_id);
            return;
        }
    };

    {
        let mut tcp = registry.tcp.lock().await;
        if let Some(entry) = tcp.get_mut(&call_id) {
            entry.stage = CallStage::Connected;
        }
    }

    let session = Arc::new(SttSession::new(call_id, registry.model.clone()));
    registry.sessions.lock().await.insert(call_id, session.clone());
    info!(%call_id, "session active");

    run_session_loop(call_id, stream, &session, &registry).await;

    let mut tcp = registry.tcp.lock().await;
    let mut sessions = registry.sessions.lock().await;
    tcp.remove(&call_id);
    sessions.remove(&call_id);
    debug!(%call_id, "session closed, map entries erased");
}

async fn run_session_loop(call_id: CallId, mut stream: TcpStream, session: &Arc<SttSession>, registry: &Arc<Registry>) {
    match read_hello(&mut stream).await {
        Ok(hello) if hello == call_id.to_string() => {}
        Ok(hello) => warn!(%call_id, %hello, "HELLO call id mismatch, continuing anyway"),
        Err(e) => {
            warn!(%call_id, error = %e, "failed to read HELLO from audio source");
            return;
        }
    }

    loop {
        match read_stt_audio_frame(&mut stream).await {
            Ok(SttAudioFrame::Bye) => {
                debug!(%call_id, "audio source sent BYE");
                return;
            }
            Ok(SttAudioFrame::Chunk(samples)) => match session.process_audio(&samples).await {
                Ok(Some(text)) => registry.llm.send(call_id, &text).await,
                Ok(None) => {}
                Err(e) => warn!(%call_id, error = %e, "inference failed for chunk"),
            },
            Err(FramingError::Eof) => {
                debug!(%call_id, "audio source connection closed");
                return;
            }
            Err(e) => {
                warn!(%call_id, error = %e, "fatal framing error on audio source connection");
                return;
            }
        }
    }
}

/// Tears down sessions idle beyond the 5-minute timeout, using
/// the same teardown path BYE uses so both maps stay consistent.
pub async fn run_idle_sweep(registry: Arc<Registry>, active: Arc<AtomicBool>) {
    let mut interval = tokio::time::interval(IDLE_SWEEP_INTERVAL);
    while active.load(Ordering::Acquire) {
        interval.tick().await;
        let idle: Vec<CallId> = {
            let sessions = registry.sessions.lock().await;
            let mut idle = Vec::new();
            for (call_id, session) in sessions.iter() {
                if session.idle_for().await >= SESSION_IDLE_TIMEOUT {
                    idle.push(*call_id);
                }
            }
            idle
        };
        for call_id in idle {
            info!(%call_id, "session idle timeout, tearing down");
            handle_bye(registry.clone(), call_id).await;
        }
    }
}
