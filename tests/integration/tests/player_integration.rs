//! Integration tests for player-bridge
//!
//! These tests drive players the way a host does: over the plugin, command
//! and event channels of the in-process messenger. They cover:
//! - Event ordering across commands and engine callbacks
//! - Frame delivery to the compositor
//! - Teardown and resource cleanup

use anyhow::Result;
use mockall::mock;
use mockall::predicate::eq;
use parking_lot::Mutex;
use player_bridge::bridge::{method, BridgeContext, BridgePlayer, PlaybackState};
use player_bridge::engine::{
    event_code, EngineCall, EngineEvent, EngineEventListener, FrameListener, NativePlayer,
    PixelBuffer,
};
use player_bridge::host::{
    EventSink, HeadlessTextureRegistry, PixelProvider, RecordingSink, SinkMessage, StreamHandler,
    TextureId, TextureRegistry,
};
use player_bridge::Config;
use player_bridge_integration_tests::{events, TestFixture, DURATION_MS, FRAME_SIZE};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

mock! {
    pub Engine {}

    impl NativePlayer for Engine {
        fn set_data_source(&self, url: &str) -> player_bridge::Result<()>;
        fn prepare_async(&self) -> player_bridge::Result<()>;
        fn start(&self) -> player_bridge::Result<()>;
        fn pause(&self) -> player_bridge::Result<()>;
        fn stop(&self) -> player_bridge::Result<()>;
        fn reset(&self) -> player_bridge::Result<()>;
        fn seek_to(&self, msec: i64) -> player_bridge::Result<()>;
        fn set_volume(&self, left: f32, right: f32);
        fn set_speed(&self, speed: f32);
        fn set_loop(&self, count: i32);
        fn set_option(&self, category: i32, key: &str, value: &str);
        fn set_int_option(&self, category: i32, key: &str, value: i64);
        fn current_position(&self) -> i64;
        fn duration(&self) -> i64;
        fn set_event_listener(&self, listener: EngineEventListener);
        fn set_frame_listener(&self, listener: FrameListener);
        fn shutdown(&self);
    }
}

mock! {
    pub Compositor {}

    impl TextureRegistry for Compositor {
        fn register_texture(&self, provider: Arc<dyn PixelProvider>) -> player_bridge::Result<TextureId>;
        fn unregister_texture(&self, id: TextureId) -> player_bridge::Result<()>;
        fn mark_frame_available(&self, id: TextureId) -> player_bridge::Result<()>;
    }
}

const STARTED: i64 = PlaybackState::Started as i64;
const PAUSED: i64 = PlaybackState::Paused as i64;
const RELEASED: i64 = PlaybackState::Released as i64;

/// Mock engine that accepts creation and teardown and hands out its listener
fn mock_engine(listener: Arc<Mutex<Option<EngineEventListener>>>) -> MockEngine {
    let mut engine = MockEngine::new();
    engine
        .expect_set_option()
        .withf(|cat, key, value| *cat == 4 && key == "overlay-format" && value == "fcc-rgba")
        .times(1)
        .return_const(());
    engine
        .expect_set_event_listener()
        .times(1)
        .returning(move |l| *listener.lock() = Some(l));
    engine.expect_set_frame_listener().times(1).return_const(());
    engine.expect_shutdown().times(1).return_const(());
    engine
}

#[tokio::test]
async fn test_create_and_release_over_channels() -> Result<()> {
    let fixture = TestFixture::new()?;
    let (id, sink) = fixture.create_player()?;
    assert_eq!(id, 1);
    assert_eq!(fixture.registry.len(), 1);

    fixture.release_player(id)?;

    assert!(fixture.registry.is_empty());
    assert_eq!(sink.state_changes(), vec![(RELEASED, 0)]);
    assert!(!fixture.messenger.has_method_handler("player_bridge/player/1"));
    assert!(fixture.call(id, method::START, Value::Null).is_err());

    // the engine saw the default option, then exactly one shutdown
    assert_eq!(
        fixture.probe(id).calls(),
        vec![
            EngineCall::SetOption(4, "overlay-format".to_string(), "fcc-rgba".to_string()),
            EngineCall::Shutdown,
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_command_sequence_events() -> Result<()> {
    let fixture = TestFixture::new()?;
    let (id, sink) = fixture.create_player()?;
    let probe = fixture.probe(id);

    let reply = fixture.call(id, method::SET_DATE_SOURCE, json!({ "url": "https://example.com/v.mp4" }))?;
    assert_eq!(reply, Value::Null);
    // the state event is already delivered when the reply comes back
    assert_eq!(sink.events(), vec![events::state_change(1, 0)]);

    fixture.call(id, method::PREPARE_ASYNC, Value::Null)?;
    probe.set_duration(DURATION_MS);
    probe.emit(EngineEvent::new(event_code::PREPARED, 0, 0));
    probe.emit(EngineEvent::new(event_code::PLAYBACK_STATE_CHANGED, 3, 2));
    fixture.call(id, method::START, Value::Null)?;
    probe.emit(EngineEvent::new(event_code::PLAYBACK_STATE_CHANGED, 4, 3));
    probe.emit(EngineEvent::new(event_code::PLAYBACK_STATE_CHANGED, 6, 4));
    fixture.call(id, method::SEEK_TO, json!({ "msec": 1000 }))?;

    assert_eq!(
        sink.events(),
        vec![
            events::state_change(1, 0),
            events::state_change(2, 1),
            json!({ "event": "prepared", "duration": DURATION_MS }),
            events::state_change(3, 2),
            events::state_change(4, 3),
            events::state_change(6, 4),
            events::state_change(5, 6),
        ]
    );
    assert_eq!(probe.calls().last(), Some(&EngineCall::SeekTo(1000)));
    assert_eq!(fixture.context.counters().playable(), 1);
    assert_eq!(fixture.context.counters().playing(), 0);

    Ok(())
}

#[tokio::test]
async fn test_events_buffered_until_listen() -> Result<()> {
    let fixture = TestFixture::new()?;
    let player = fixture.registry.create_player()?;
    let id = player.id();

    fixture.call(id, method::SET_DATE_SOURCE, json!({ "url": "a.mp4" }))?;
    fixture.call(id, method::PREPARE_ASYNC, Value::Null)?;

    let sink = RecordingSink::new();
    let events_channel = fixture.context.config().channels.event_channel(id);
    fixture.messenger.listen(&events_channel, Value::Null, sink.clone())?;
    assert_eq!(
        sink.events(),
        vec![events::state_change(1, 0), events::state_change(2, 1)]
    );

    // cancelled streams buffer again until the next listen
    fixture.messenger.cancel(&events_channel, Value::Null)?;
    fixture.call(id, method::STOP, Value::Null)?;
    assert_eq!(sink.events().len(), 2);
    fixture.messenger.listen(&events_channel, Value::Null, sink.clone())?;
    assert_eq!(sink.events().last(), Some(&events::state_change(7, 2)));

    Ok(())
}

#[tokio::test]
async fn test_malformed_arguments_are_no_ops() -> Result<()> {
    let fixture = TestFixture::new()?;
    let (id, sink) = fixture.create_player()?;
    let probe = fixture.probe(id);
    probe.clear_calls();

    fixture.call(id, method::SEEK_TO, json!({ "msec": "later" }))?;
    fixture.call(id, method::SET_VOLUME, json!({ "level": 1.0 }))?;
    fixture.call(id, method::SET_SPEED, Value::Null)?;
    fixture.call(id, method::SET_OPTION, json!({ "cat": 4, "key": "framedrop" }))?;
    fixture.call(id, method::APPLY_OPTIONS, json!([1, 2, 3]))?;

    assert!(probe.calls().is_empty());
    assert!(sink.messages().is_empty());

    let unknown = fixture.call(id, "fastForward", Value::Null);
    assert!(unknown.is_err());

    Ok(())
}

#[tokio::test]
async fn test_engine_error_reaches_host() -> Result<()> {
    let fixture = TestFixture::new()?;
    let (id, sink) = fixture.create_player()?;
    let probe = fixture.probe(id);

    // a failing engine never fails the command
    probe.set_failing(true);
    fixture.call(id, method::START, Value::Null)?;
    fixture.call(id, method::SEEK_TO, json!({ "msec": 10 }))?;

    probe.emit(EngineEvent::new(event_code::ERROR, -1004, 0).with_extra("io error"));
    assert_eq!(
        sink.messages(),
        vec![SinkMessage::Error {
            code: "-1004".to_string(),
            message: "io error".to_string(),
            details: json!({ "extra": 0, "state": 0 }),
        }]
    );

    Ok(())
}

#[tokio::test]
async fn test_frames_reach_the_compositor() -> Result<()> {
    let fixture = TestFixture::new()?;
    let (id, _sink) = fixture.create_player()?;
    let probe = fixture.probe(id);

    let texture = fixture
        .call(id, method::SETUP_SURFACE, Value::Null)?
        .as_i64()
        .expect("texture id");
    assert!(fixture.textures.pull(texture, 64, 36).is_none());

    for shade in 1..=3u8 {
        probe.emit_frame(PixelBuffer::solid(4, 4, [shade, shade, shade, 0xff]));
    }
    assert_eq!(fixture.textures.frames_available(texture), 3);

    let frame = fixture.textures.pull(texture, 64, 36).expect("frame");
    assert_eq!(frame.pixels[0], 3);

    let stats = fixture.registry.player(id).expect("player").frame_stats();
    assert_eq!(stats.frames_produced, 3);
    assert_eq!(stats.frames_overwritten, 2);

    fixture.release_player(id)?;
    assert!(!fixture.textures.is_registered(texture));

    Ok(())
}

#[tokio::test]
async fn test_auto_engine_session() -> Result<()> {
    let fixture = TestFixture::auto()?;
    let (id, sink) = fixture.create_player()?;

    let texture = fixture
        .call(id, method::SETUP_SURFACE, Value::Null)?
        .as_i64()
        .expect("texture id");
    fixture.call(id, method::SET_DATE_SOURCE, json!({ "url": "loopback://clip" }))?;
    fixture.call(id, method::PREPARE_ASYNC, Value::Null)?;
    fixture.call(id, method::START, Value::Null)?;

    let waiter = sink.clone();
    let started = tokio::task::spawn_blocking(move || {
        waiter.wait_for(Duration::from_secs(5), |messages| {
            messages.contains(&SinkMessage::Event(events::state_change(STARTED, 3)))
        })
    })
    .await?;
    assert!(started, "player never reported started");

    let (width, height) = FRAME_SIZE;
    assert_eq!(
        sink.events(),
        vec![
            events::state_change(1, 0),
            events::state_change(2, 1),
            json!({ "event": "prepared", "duration": DURATION_MS }),
            events::state_change(3, 2),
            json!({ "event": "size_changed", "width": width, "height": height }),
            json!({ "event": "rendering_start", "type": "video" }),
            events::state_change(STARTED, 3),
        ]
    );

    let frame = fixture.textures.pull(texture, width, height).expect("frame");
    assert_eq!((frame.width, frame.height), FRAME_SIZE);
    assert_eq!(fixture.context.counters().playing(), 1);

    fixture.call(id, method::PAUSE, Value::Null)?;
    let waiter = sink.clone();
    let paused = tokio::task::spawn_blocking(move || {
        waiter.wait_for(Duration::from_secs(5), |messages| {
            messages.contains(&SinkMessage::Event(events::state_change(PAUSED, STARTED)))
        })
    })
    .await?;
    assert!(paused, "player never reported paused");

    fixture.release_player(id)?;
    assert_eq!(sink.state_changes().last(), Some(&(RELEASED, PAUSED)));
    assert_eq!(fixture.context.counters().playable(), 0);
    assert_eq!(fixture.context.counters().playing(), 0);

    Ok(())
}

#[tokio::test]
async fn test_seek_from_completed_reports_paused_before_seeking() -> Result<()> {
    let listener = Arc::new(Mutex::new(None));
    let sink = RecordingSink::new();
    let seen_at_seek = Arc::new(Mutex::new(Vec::new()));

    let mut engine = mock_engine(Arc::clone(&listener));
    let seek_sink = sink.clone();
    let seek_seen = Arc::clone(&seen_at_seek);
    engine
        .expect_seek_to()
        .with(eq(0))
        .times(1)
        .returning(move |_| {
            *seek_seen.lock() = seek_sink.state_changes();
            Ok(())
        });

    let player = BridgePlayer::new(
        BridgeContext::new(Config::default()),
        Arc::new(engine),
        Arc::new(HeadlessTextureRegistry::new()),
    );
    player.on_listen(&Value::Null, sink.clone());

    let notify = listener.lock().clone().expect("listener installed");
    notify(EngineEvent::new(event_code::PLAYBACK_STATE_CHANGED, 6, 4));
    player.handle_command(method::SEEK_TO, &json!({ "msec": 0 }))?;

    assert_eq!(*seen_at_seek.lock(), vec![(6, 0), (PAUSED, 6)]);
    assert_eq!(player.state(), PlaybackState::Paused);

    player.release();
    Ok(())
}

/// Sink that fires an engine callback from another thread as soon as it sees
/// the paused transition
struct CallbackOnPaused {
    inner: Arc<RecordingSink>,
    notify: EngineEventListener,
    racer: Mutex<Option<JoinHandle<()>>>,
}

impl EventSink for CallbackOnPaused {
    fn success(&self, event: Value) {
        let paused = event == events::state_change(PAUSED, 6);
        self.inner.success(event);
        if paused {
            let notify = Arc::clone(&self.notify);
            *self.racer.lock() = Some(thread::spawn(move || {
                notify(EngineEvent::new(event_code::BUFFERING_START, 0, 0));
            }));
        }
    }

    fn error(&self, code: &str, message: &str, details: Value) {
        self.inner.error(code, message, details);
    }
}

#[tokio::test]
async fn test_callback_cannot_land_between_paused_and_seek() -> Result<()> {
    let listener = Arc::new(Mutex::new(None));
    let recorded = RecordingSink::new();
    let seen_at_seek = Arc::new(Mutex::new(Vec::new()));

    let mut engine = mock_engine(Arc::clone(&listener));
    let seek_sink = recorded.clone();
    let seek_seen = Arc::clone(&seen_at_seek);
    engine
        .expect_seek_to()
        .with(eq(0))
        .times(1)
        .returning(move |_| {
            // give the competing callback time to run if nothing holds it off
            thread::sleep(Duration::from_millis(50));
            *seek_seen.lock() = seek_sink.events();
            Ok(())
        });

    let player = BridgePlayer::new(
        BridgeContext::new(Config::default()),
        Arc::new(engine),
        Arc::new(HeadlessTextureRegistry::new()),
    );
    let notify = listener.lock().clone().expect("listener installed");
    let sink = Arc::new(CallbackOnPaused {
        inner: recorded.clone(),
        notify: Arc::clone(&notify),
        racer: Mutex::new(None),
    });
    player.on_listen(&Value::Null, sink.clone());

    notify(EngineEvent::new(event_code::PLAYBACK_STATE_CHANGED, 6, 4));
    player.handle_command(method::SEEK_TO, &json!({ "msec": 0 }))?;

    let racer = sink.racer.lock().take().expect("paused was delivered");
    racer.join().expect("callback thread panicked");

    let at_seek = seen_at_seek.lock().clone();
    assert_eq!(at_seek.last(), Some(&events::state_change(PAUSED, 6)));
    assert!(events::names(&at_seek).iter().all(|name| name != "freeze"));

    let all = recorded.events();
    assert_eq!(all.last(), Some(&json!({ "event": "freeze", "value": true })));

    player.release();
    Ok(())
}

#[tokio::test]
async fn test_data_source_failure_still_initializes() -> Result<()> {
    let listener = Arc::new(Mutex::new(None));
    let mut engine = mock_engine(listener);
    engine
        .expect_set_data_source()
        .withf(|url| url == "rtsp://unreachable")
        .times(1)
        .returning(|_| Err(player_bridge::BridgeError::engine_error("connection refused")));

    let player = BridgePlayer::new(
        BridgeContext::new(Config::default()),
        Arc::new(engine),
        Arc::new(HeadlessTextureRegistry::new()),
    );
    let sink = RecordingSink::new();
    player.on_listen(&Value::Null, sink.clone());

    let reply = player.handle_command(method::SET_DATE_SOURCE, &json!({ "url": "rtsp://unreachable" }))?;

    assert_eq!(reply, Value::Null);
    assert_eq!(sink.events(), vec![events::state_change(1, 0)]);

    player.release();
    Ok(())
}

#[tokio::test]
async fn test_render_target_registered_and_unregistered_once() -> Result<()> {
    let mut compositor = MockCompositor::new();
    compositor
        .expect_register_texture()
        .times(1)
        .returning(|_| Ok(7));
    compositor
        .expect_mark_frame_available()
        .with(eq(7))
        .returning(|_| Ok(()));
    compositor
        .expect_unregister_texture()
        .with(eq(7))
        .times(1)
        .returning(|_| Ok(()));

    let listener = Arc::new(Mutex::new(None));
    let player = BridgePlayer::new(
        BridgeContext::new(Config::default()),
        Arc::new(mock_engine(listener)),
        Arc::new(compositor),
    );

    assert_eq!(player.handle_command(method::SETUP_SURFACE, &Value::Null)?, json!(7));
    assert_eq!(player.handle_command(method::SETUP_SURFACE, &Value::Null)?, json!(7));
    player.on_frame(Arc::new(PixelBuffer::solid(2, 2, [0; 4])));

    assert!(player.release());
    assert!(!player.release());
    assert_eq!(player.texture_id(), None);

    Ok(())
}

#[tokio::test]
async fn test_render_target_failure_fails_setup() -> Result<()> {
    let mut compositor = MockCompositor::new();
    compositor
        .expect_register_texture()
        .returning(|_| Err(player_bridge::BridgeError::Texture("no slots".to_string())));

    let listener = Arc::new(Mutex::new(None));
    let player = BridgePlayer::new(
        BridgeContext::new(Config::default()),
        Arc::new(mock_engine(listener)),
        Arc::new(compositor),
    );

    assert!(player.handle_command(method::SETUP_SURFACE, &Value::Null).is_err());
    player.release();
    Ok(())
}

#[tokio::test]
async fn test_concurrent_callbacks_keep_per_thread_order() -> Result<()> {
    let fixture = TestFixture::new()?;
    let (id, sink) = fixture.create_player()?;
    let probe = fixture.probe(id);
    let player = fixture.registry.player(id).expect("player");

    let producers: Vec<_> = (0..4)
        .map(|thread_id| {
            let probe = probe.clone();
            thread::spawn(move || {
                for seq in 0..100 {
                    probe.emit(EngineEvent::new(event_code::BUFFERING_UPDATE, thread_id, seq));
                }
            })
        })
        .collect();

    // flap the listener while the producers run
    for _ in 0..20 {
        player.on_cancel(&Value::Null);
        player.on_listen(&Value::Null, sink.clone());
    }
    for producer in producers {
        producer.join().expect("producer panicked");
    }

    let received = sink.events();
    assert_eq!(received.len(), 400);
    for thread_id in 0..4 {
        let seqs: Vec<i64> = received
            .iter()
            .filter(|e| e["head"] == thread_id)
            .filter_map(|e| e["percent"].as_i64())
            .collect();
        assert_eq!(seqs, (0..100).collect::<Vec<i64>>());
    }

    Ok(())
}

#[tokio::test]
async fn test_concurrent_creation_ids_unique() -> Result<()> {
    let fixture = TestFixture::new()?;
    let registry = &fixture.registry;

    let ids: Vec<i64> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| registry.create_player().map(|p| p.id())))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("creator panicked"))
            .collect::<player_bridge::Result<Vec<_>>>()
    })?;

    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted, (1..=8).collect::<Vec<i64>>());
    assert_eq!(registry.len(), 8);

    registry.release_all();
    assert!(registry.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_creation_keeps_engines_with_their_players() -> Result<()> {
    let fixture = TestFixture::new()?;

    let players: Vec<(i64, Arc<RecordingSink>)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| fixture.create_player()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("creator panicked"))
            .collect::<Result<Vec<_>>>()
    })?;

    // tag each engine's callback with the id its player was given
    for (id, _) in &players {
        fixture
            .probe(*id)
            .emit(EngineEvent::new(event_code::BUFFERING_UPDATE, *id as i32, 0));
    }

    for (id, sink) in &players {
        let heads: Vec<i64> = sink
            .events()
            .iter()
            .filter_map(|e| e["head"].as_i64())
            .collect();
        assert_eq!(heads, vec![*id], "player {} got another engine's callback", id);
    }

    for (id, _) in &players {
        fixture.release_player(*id)?;
    }
    assert!(fixture.registry.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_custom_channel_names_from_config_file() -> Result<()> {
    let scratch = TestFixture::new()?;
    let path = scratch.write_config(
        r#"
[channels]
plugin = "video"
method_prefix = "video/cmd"
event_prefix = "video/evt"

[[player.default_options]]
category = 4
key = "framedrop"
value = 1
"#,
    )?;
    let config = Config::load_from(&path)?;

    let fixture = TestFixture::with_config(config)?;
    let (id, _sink) = fixture.create_player()?;

    assert!(fixture.messenger.has_method_handler("video"));
    assert!(fixture.messenger.has_method_handler("video/cmd/1"));
    assert!(fixture.messenger.has_stream_handler("video/evt/1"));
    assert_eq!(
        fixture.probe(id).calls(),
        vec![EngineCall::SetIntOption(4, "framedrop".to_string(), 1)]
    );

    Ok(())
}

#[tokio::test]
async fn test_resource_cleanup() -> Result<()> {
    let fixture = TestFixture::auto()?;

    // create and destroy players mid-playback
    for _ in 0..5 {
        let (id, _sink) = fixture.create_player()?;
        fixture.call(id, method::SETUP_SURFACE, Value::Null)?;
        fixture.call(id, method::SET_DATE_SOURCE, json!({ "url": "loopback://clip" }))?;
        fixture.call(id, method::PREPARE_ASYNC, Value::Null)?;
        fixture.call(id, method::START, Value::Null)?;
        tokio::time::sleep(Duration::from_millis(10)).await;
        fixture.release_player(id)?;
    }

    assert!(fixture.registry.is_empty());
    assert!(fixture.textures.is_empty());
    assert_eq!(fixture.context.counters().playable(), 0);
    assert_eq!(fixture.context.counters().playing(), 0);

    Ok(())
}
