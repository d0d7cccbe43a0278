//! Persistent per-call TCP connection to the downstream LLM. Kept open
//! and reused across sessions of the same call id; closed
//! only on service stop or on a write failure, in which case the next send
//! reconnects.

use std::collections::HashMap;
use std::time::Duration;

use audio_proto_registration::framing::{write_hello, write_text_frame};
use audio_proto_registration::CallId;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const CONNECT_RETRIES: u32 = 10;
const FAST_RETRY_COUNT: u32 = 5;
const FAST_RETRY_DELAY: Duration = Duration::from_millis(200);
const SLOW_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct LlmConnections {
    host: String,
    port: u16,
    sockets: Mutex<HashMap<CallId, TcpStream>>,
}

impl LlmConnections {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            sockets: Mutex::new(HashMap::new()),
        }
    }

    /// Forward `text` to the LLM for `call_id`, connecting (with retries)
    /// first if there is no live connection. A write failure drops the
    /// socket so the next call reconnects rather than failing forever.
    ///
    /// The retrying connect runs with the map lock released, so one call's
    /// connect storm never blocks another call's forwarding; the lock is
    /// only held for the map lookup/insert/remove itself.
    pub async fn send(&self, call_id: CallId, text: &str) {
        let needs_connect = !self.sockets.lock().await.contains_key(&call_id);
        if needs_connect {
            match self.connect_with_retry(call_id).await {
                Ok(stream) => {
                    self.sockets.lock().await.insert(call_id, stream);
                }
                Err(e) => {
                    warn!(%call_id, error = %e, "giving up on LLM connect after retries");
                    return;
                }
            }
        }

        let mut sockets = self.sockets.lock().await;
        let Some(stream) = sockets.get_mut(&call_id) else {
            return;
        };
        if write_text_frame(stream, text).await.is_err() {
            warn!(%call_id, "LLM write failed, dropping connection for reconnect");
            sockets.remove(&call_id);
        }
    }

    /// Close every open LLM connection. Called only at service shutdown;
    /// per-call sessions ending on BYE/idle-timeout must NOT call this.
    pub async fn close_all(&self) {
        self.sockets.lock().await.clear();
    }

    async fn connect_with_retry(&self, call_id: CallId) -> std::io::Result<TcpStream> {
        let mut attempt = 0u32;
        loop {
            match TcpStream::connect((self.host.as_str(), self.port)).await {
                Ok(mut stream) => match write_hello(&mut stream, &call_id.to_string()).await {
                    Ok(()) => return Ok(stream),
                    Err(e) => {
                        attempt += 1;
                        if attempt >= CONNECT_RETRIES {
                            return Err(std::io::Error::new(std::io::ErrorKind::Other, e));
                        }
                    }
                },
                Err(e) => {
                    attempt += 1;
                    if attempt >= CONNECT_RETRIES {
                        return Err(e);
                    }
                    debug!(%call_id, attempt, error = %e, "LLM connect failed, retrying");
                    let delay = if attempt <= FAST_RETRY_COUNT { FAST_RETRY_DELAY } else { SLOW_RETRY_DELAY };
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
