mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{eventually, Bridge, FakeMic, FakeSpeaker, WAIT};
use live_session::pcm;
use live_session::types::{CaptureMode, SessionConfig};
use live_session::{
    Client, ClientConfig, MediaBackends, ReconnectPolicy, SessionController, SessionEvent,
};
use serde_json::json;
use tokio::sync::mpsc;

async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("controller dropped");
        if !matches!(event, SessionEvent::StateChanged(_)) {
            return event;
        }
    }
}

fn controller_for(
    bridge: &Bridge,
    mic: &FakeMic,
    speaker: &Arc<FakeSpeaker>,
    reconnect: ReconnectPolicy,
) -> (SessionController, mpsc::UnboundedReceiver<SessionEvent>) {
    let client = Client::new(
        ClientConfig::builder()
            .with_base_url(&bridge.url)
            .with_reconnect(reconnect.clone())
            .build(),
    );
    let backends = MediaBackends {
        microphone: Arc::new(FakeMic {
            counters: mic.counters.clone(),
        }),
        video: None,
        speaker: speaker.clone(),
    };
    SessionController::new(Arc::new(client), SessionConfig::new(), reconnect, backends)
}

#[tokio::test]
async fn test_audio_session_end_to_end() {
    let mut bridge = Bridge::start().await;
    let mic = FakeMic::new();
    let speaker = Arc::new(FakeSpeaker::default());
    let (controller, mut events) =
        controller_for(&bridge, &mic, &speaker, ReconnectPolicy::default());
    let (handle, task) = controller.spawn();

    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);
    let mut peer = bridge.accept().await;
    handle.start(CaptureMode::Audio).await.unwrap();

    let config = peer.next_frame().await;
    assert_eq!(config["type"], "config");
    for _ in 0..3 {
        let frame = peer.next_frame().await;
        assert_eq!(frame["type"], "audio");
        let samples = pcm::decode(frame["data"].as_str().unwrap()).unwrap();
        assert_eq!(samples.len(), 512);
    }

    peer.send(json!({ "type": "audio", "data": pcm::encode(&[0.5; 480]) }));
    peer.send(json!({ "type": "text", "text": "hello back" }));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Text("hello back".into())
    );
    eventually(|| *speaker.played.lock().unwrap() == vec![480]).await;

    handle.stop().await.unwrap();
    eventually(|| mic.counters.stopped.load(Ordering::SeqCst) == 1).await;
    assert!(speaker.stops.load(Ordering::SeqCst) >= 1);

    // Anything captured before the stop may still be in flight.
    tokio::time::sleep(Duration::from_millis(50)).await;
    peer.drain_frames();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(peer.drain_frames().is_empty());

    // The transport outlives the stream.
    handle.send_text("still connected?").await.unwrap();
    assert_eq!(
        peer.next_frame().await,
        json!({ "type": "text", "data": "still connected?" })
    );

    handle.shutdown().await.unwrap();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unexpected_close_stops_capture_and_reconnects_idle() {
    let mut bridge = Bridge::start().await;
    let mic = FakeMic::new();
    let speaker = Arc::new(FakeSpeaker::default());
    let policy = ReconnectPolicy::fixed(Duration::from_millis(50));
    let (controller, mut events) = controller_for(&bridge, &mic, &speaker, policy);
    let (handle, task) = controller.spawn();

    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);
    let mut first = bridge.accept().await;
    handle.start(CaptureMode::Audio).await.unwrap();
    assert_eq!(first.next_frame().await["type"], "config");
    assert_eq!(first.next_frame().await["type"], "audio");

    first.close();
    assert_eq!(next_event(&mut events).await, SessionEvent::Disconnected);
    assert_eq!(mic.counters.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(50)
        }
    );

    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);
    let mut second = bridge.accept().await;
    let config = second.next_frame().await;
    assert_eq!(config["type"], "config");
    assert!(config["config"].get("currentMode").is_none());

    // Reconnecting does not resume capture.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(second.drain_frames().is_empty());
    assert_eq!(mic.counters.opened.load(Ordering::SeqCst), 1);

    handle.shutdown().await.unwrap();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unreachable_bridge_keeps_retrying() {
    let mic = FakeMic::new();
    let speaker = Arc::new(FakeSpeaker::default());
    let client = Client::new(
        ClientConfig::builder()
            .with_base_url("ws://127.0.0.1:1")
            .build(),
    );
    let backends = MediaBackends {
        microphone: Arc::new(FakeMic {
            counters: mic.counters.clone(),
        }),
        video: None,
        speaker,
    };
    let policy = ReconnectPolicy::fixed(Duration::from_millis(10));
    let (controller, mut events) =
        SessionController::new(Arc::new(client), SessionConfig::new(), policy, backends);
    let (handle, task) = controller.spawn();

    let mut attempts = Vec::new();
    while attempts.len() < 3 {
        match next_event(&mut events).await {
            SessionEvent::Reconnecting { attempt, .. } => attempts.push(attempt),
            SessionEvent::Error(_) => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(attempts, vec![1, 2, 3]);

    handle.shutdown().await.unwrap();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}
