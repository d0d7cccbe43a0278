use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use audio_outbound_processor::pacer::Pacer;
use audio_outbound_processor::queue::OutputQueue;
use audio_shm_channel::ShmChannel;
use serial_test::serial;

fn unique_channel(tag: &str) -> String {
    format!(
        "/ap_out_test_{tag}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    )
}

#[tokio::test]
#[serial]
async fn pacer_emits_about_one_frame_per_20ms_under_starvation() {
    let name = unique_channel("starve");
    let shm = ShmChannel::create_or_open(&name, 3, 2048, 160, true).unwrap();

    let pacer = Arc::new(Pacer::new());
    let queue = Arc::new(Mutex::new(OutputQueue::new()));
    let active = Arc::new(AtomicBool::new(true));
    let tts_connected = Arc::new(AtomicBool::new(false));

    let task = {
        let pacer = pacer.clone();
        let active = active.clone();
        tokio::spawn(async move {
            pacer.run(shm, queue, active, tts_connected).await;
        })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    active.store(false, Ordering::Release);
    task.await.unwrap();

    // ~25 ticks expected in 500ms at 20ms cadence; allow generous slack
    // for a loaded CI host.
    let emitted = pacer.frames_emitted.load(Ordering::Relaxed);
    assert!(emitted >= 15 && emitted <= 35, "emitted={emitted}");

    ShmChannel::unlink(&name).unwrap();
}

#[tokio::test]
#[serial]
async fn pacer_drains_queue_before_falling_back_to_silence() {
    let name = unique_channel("drain");
    let mut shm = ShmChannel::create_or_open(&name, 4, 2048, 160, true).unwrap();
    shm.set_role_consumer();

    let queue = Arc::new(Mutex::new(OutputQueue::new()));
    queue.lock().unwrap().push(&[0x00u8; 160]);

    let pacer = Arc::new(Pacer::new());
    let active = Arc::new(AtomicBool::new(true));
    let tts_connected = Arc::new(AtomicBool::new(true));

    let mut producer_shm = ShmChannel::create_or_open(&name, 4, 2048, 160, false).unwrap();
    producer_shm.set_role_producer();

    let task = {
        let pacer = pacer.clone();
        let active = active.clone();
        let queue = queue.clone();
        tokio::spawn(async move {
            pacer.run(producer_shm, queue, active, tts_connected).await;
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    active.store(false, Ordering::Release);
    task.await.unwrap();

    let first_frame = shm.read_frame().unwrap();
    assert_eq!(first_frame, vec![0x00u8; 160]);

    ShmChannel::unlink(&name).unwrap();
}
