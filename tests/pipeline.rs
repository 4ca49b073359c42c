//! Capture and playback pipeline integration tests
//!
//! Hardware is replaced by `ManualCaptureBackend` and `NullSink`; everything
//! else runs as wired by `App`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tts_server::audio::NullSink;
use tts_server::domain::{StateChange, SynthPlayState};
use tts_server::error::ErrorKind;
use tts_server::ports::AudioStreamPort;

mod common;
use common::{
    FailingEngine, ToneEngine, test_app, test_app_with_sink, test_app_with_speed, write_wav,
};

fn drain(rx: &mut mpsc::Receiver<StateChange>) -> Vec<StateChange> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[test]
fn test_capture_fans_out_through_port() {
    let test = test_app(Arc::new(ToneEngine::new(0.1)));
    let capture: Arc<dyn AudioStreamPort> = test.app.capture.clone();

    let a = capture.subscribe("a", 16);
    let b = capture.subscribe("b", 16);
    capture.start().unwrap();
    assert_eq!(capture.subscriber_count(), 2);

    for _ in 0..5 {
        assert!(test.feed.push_f32(&[0.25; 1024]));
    }

    for reader in [&a, &b] {
        let seqs: Vec<u64> = std::iter::from_fn(|| reader.read(Some(Duration::ZERO)))
            .map(|f| f.sequence)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(reader.dropped(), 0);
    }

    capture.stop();
    assert!(a.is_closed() && b.is_closed());
    assert_eq!(capture.subscriber_count(), 0);
}

#[test]
fn test_slow_subscriber_keeps_oldest_frames() {
    let test = test_app(Arc::new(ToneEngine::new(0.1)));
    let capture = Arc::clone(&test.app.capture);

    let slow = capture.subscribe("slow", 3);
    let fast = capture.subscribe("fast", 16);
    capture.start().unwrap();
    for _ in 0..6 {
        test.feed.push_f32(&[0.0; 16]);
    }

    let slow_seqs: Vec<u64> = std::iter::from_fn(|| slow.read(Some(Duration::ZERO)))
        .map(|f| f.sequence)
        .collect();
    assert_eq!(slow_seqs, vec![0, 1, 2]);
    assert_eq!(slow.dropped(), 3);

    let fast_seqs: Vec<u64> = std::iter::from_fn(|| fast.read(Some(Duration::ZERO)))
        .map(|f| f.sequence)
        .collect();
    assert_eq!(fast_seqs.len(), 6);
}

#[test]
fn test_stop_wakes_blocked_reader() {
    let test = test_app(Arc::new(ToneEngine::new(0.1)));
    let capture = Arc::clone(&test.app.capture);
    let reader = capture.subscribe("blocked", 4);
    capture.start().unwrap();

    let waiter = std::thread::spawn(move || reader.read(None));
    std::thread::sleep(Duration::from_millis(50));
    capture.stop();

    assert!(waiter.join().unwrap().is_none());
    // A second stop is a no-op
    capture.stop();
    assert!(!capture.is_running());
}

#[tokio::test]
async fn test_synth_play_reports_each_state() {
    let test = test_app(Arc::new(ToneEngine::new(0.2)));
    let (tx, mut rx) = mpsc::channel::<StateChange>(8);

    let status = test
        .app
        .synth_play
        .synthesize_and_play("Hello there", "en", None, Some(&tx))
        .await
        .unwrap();

    let states: Vec<SynthPlayState> = drain(&mut rx).iter().map(|c| c.state).collect();
    assert_eq!(
        states,
        vec![
            SynthPlayState::Synthesizing,
            SynthPlayState::Playing,
            SynthPlayState::Completed
        ]
    );
    assert!((status.duration_seconds.unwrap() - 0.2).abs() < 0.01);
    assert_eq!(test.sink.played(), 1);
}

#[tokio::test]
async fn test_synth_play_speaks_at_configured_speed() {
    let engine = Arc::new(ToneEngine::new(0.1));
    let test = test_app_with_speed(engine.clone(), 0.8);

    test.app
        .synth_play
        .synthesize_and_play("Slowly now", "en", None, None)
        .await
        .unwrap();

    let requests = engine.requests();
    assert_eq!(requests.len(), 1);
    assert!((requests[0].0.speed - 0.8).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_synth_play_failure_stops_before_playback() {
    let test = test_app(Arc::new(FailingEngine));
    let (tx, mut rx) = mpsc::channel::<StateChange>(8);

    let err = test
        .app
        .synth_play
        .synthesize_and_play("Hello", "en", None, Some(&tx))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Synthesis);

    let changes = drain(&mut rx);
    let states: Vec<SynthPlayState> = changes.iter().map(|c| c.state).collect();
    assert_eq!(states, vec![SynthPlayState::Synthesizing, SynthPlayState::Error]);
    let message = changes[1].message.as_deref().unwrap();
    assert!(message.starts_with("synthesizing: "));
    assert!(message.contains("engine unavailable"));
    assert_eq!(test.sink.played(), 0);
}

#[tokio::test]
async fn test_synth_play_survives_dropped_observer() {
    let test = test_app(Arc::new(ToneEngine::new(0.1)));
    let (tx, rx) = mpsc::channel::<StateChange>(1);
    drop(rx);

    let status = test
        .app
        .synth_play
        .synthesize_and_play("Hello", "en", None, Some(&tx))
        .await
        .unwrap();
    assert!(!status.is_playing);
}

#[tokio::test]
async fn test_stop_interrupts_playback() {
    let test = test_app_with_sink(Arc::new(ToneEngine::new(0.1)), NullSink::realtime());
    let path = write_wav(test.dir.path(), "long.wav", 5.0);

    let playback = Arc::clone(&test.app.playback);
    let file = path.to_str().unwrap().to_string();
    let task = tokio::spawn(async move { playback.play_file(&file).await });

    tokio::time::timeout(Duration::from_secs(2), async {
        while !test.app.playback.is_playing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    test.app.playback.stop().await;
    assert!(!test.app.playback.is_playing());

    let result = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("playback should end promptly after stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_new_playback_supersedes_current() {
    let test = test_app_with_sink(Arc::new(ToneEngine::new(0.1)), NullSink::realtime());
    let long = write_wav(test.dir.path(), "long.wav", 5.0);
    let short = write_wav(test.dir.path(), "short.wav", 0.05);

    let playback = Arc::clone(&test.app.playback);
    let file = long.to_str().unwrap().to_string();
    let first = tokio::spawn(async move { playback.play_file(&file).await });

    tokio::time::timeout(Duration::from_secs(2), async {
        while !test.app.playback.is_playing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    test.app
        .playback
        .play_file(short.to_str().unwrap())
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), first)
        .await
        .expect("superseded clip should end")
        .unwrap()
        .unwrap();
    assert!(!test.app.playback.is_playing());
    assert_eq!(test.sink.played(), 2);
}
