use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use audio_proto_registration::framing::{
    read_hello, read_text_frame, write_hello, write_stt_audio_bye, write_stt_audio_chunk,
};
use audio_proto_registration::{inbound_audio_port, CallId};
use serial_test::serial;
use stt_service::engine::ScriptedInferenceContext;
use stt_service::model::SharedInferenceContext;
use stt_service::registration::{self, Registry};
use tokio::net::{TcpListener, UdpSocket};

async fn send_datagram(text: &str) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(text.as_bytes(), "127.0.0.1:13000").await.unwrap();
}

async fn spawn_fake_llm() -> (u16, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _call_id = read_hello(&mut stream).await.unwrap();
        read_text_frame(&mut stream).await.unwrap().unwrap_or_default()
    });
    (port, handle)
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn single_call_happy_path_forwards_one_transcription() {
    let call_id = CallId::new(50);
    let audio_port = inbound_audio_port(call_id);
    let audio_listener = TcpListener::bind(("127.0.0.1", audio_port)).await.unwrap();

    let (llm_port, llm_handle) = spawn_fake_llm().await;

    let model = SharedInferenceContext::warm_up(
        Box::new(ScriptedInferenceContext::with_script(vec![vec!["hello".to_string()]])),
        1,
    )
    .await
    .unwrap();
    let registry = Arc::new(Registry::new(model, "127.0.0.1".to_string(), llm_port));
    let active = Arc::new(AtomicBool::new(true));
    let run_handle = {
        let registry = registry.clone();
        let active = active.clone();
        tokio::spawn(async move { registration::run(registry, active).await })
    };

    send_datagram("REGISTER:50").await;

    let (mut audio_stream, _) = audio_listener.accept().await.unwrap();
    write_hello(&mut audio_stream, "50").await.unwrap();
    write_stt_audio_chunk(&mut audio_stream, &[0.5f32; 16_000]).await.unwrap();
    write_stt_audio_bye(&mut audio_stream).await.unwrap();

    let transcription = tokio::time::timeout(Duration::from_secs(3), llm_handle)
        .await
        .expect("LLM never received a transcription")
        .unwrap();
    assert_eq!(transcription, "Hello");

    send_datagram("BYE:50").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.active_session_count().await, 0);
    assert!(!registry.has_tcp_entry(call_id).await);

    active.store(false, Ordering::Release);
    run_handle.abort();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn rapid_reregister_leaves_no_zombie_reservation() {
    let call_id = CallId::new(51);
    let audio_port = inbound_audio_port(call_id);
    let audio_listener = TcpListener::bind(("127.0.0.1", audio_port)).await.unwrap();

    let (llm_port, _llm_handle) = spawn_fake_llm().await;
    let model = SharedInferenceContext::warm_up(Box::new(ScriptedInferenceContext::new()), 1)
        .await
        .unwrap();
    let registry = Arc::new(Registry::new(model, "127.0.0.1".to_string(), llm_port));
    let active = Arc::new(AtomicBool::new(true));
    let run_handle = {
        let registry = registry.clone();
        let active = active.clone();
        tokio::spawn(async move { registration::run(registry, active).await })
    };

    send_datagram("REGISTER:51").await;
    let (mut audio_stream, _) = audio_listener.accept().await.unwrap();
    write_hello(&mut audio_stream, "51").await.unwrap();

    send_datagram("BYE:51").await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(registry.active_session_count().await, 0);
    assert!(!registry.has_tcp_entry(call_id).await);

    active.store(false, Ordering::Release);
    run_handle.abort();
}
