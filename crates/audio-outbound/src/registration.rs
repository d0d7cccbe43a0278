//! Waits for the `REGISTER:<id>` UDP datagram that tells this call's
//! outbound processor a TTS stream wants to attach.

use std::time::Duration;

use audio_proto_registration::{tts_consumer_registration_port, CallId, RegistrationMessage};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// How long a single `recv` waits before re-checking for shutdown.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Block (with periodic timeout so shutdown is observed) until a
/// `REGISTER:<call_id>` datagram for this call arrives on
/// `13000 + call_id`, or until `should_stop` reports true.
pub async fn wait_for_register(
    call_id: CallId,
    should_stop: impl Fn() -> bool,
) -> std::io::Result<bool> {
    let port = tts_consumer_registration_port(call_id);
    let socket = UdpSocket::bind(("127.0.0.1", port)).await?;
    let mut buf = [0u8; 256];

    loop {
        if should_stop() {
            return Ok(false);
        }
        match tokio::time::timeout(RECV_TIMEOUT, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, peer))) => match RegistrationMessage::parse(&buf[..len]) {
                Ok(RegistrationMessage::Register(id)) if id == call_id => {
                    debug!(%call_id, %peer, "received REGISTER for this call");
                    return Ok(true);
                }
                Ok(other) => {
                    debug!(%call_id, ?other, "ignoring registration message for a different call");
                }
                Err(e) => {
                    warn!(%call_id, error = %e, "ignoring malformed registration datagram");
                }
            },
            Ok(Err(e)) => {
                warn!(%call_id, error = %e, "registration socket error");
            }
            Err(_elapsed) => {
                // Timed out; loop back around to re-check should_stop.
            }
        }
    }
}
