//! Engine integration tests
//!
//! Drives the engine with a scripted decoder, a recording speaker and a
//! manual clock, so no audio hardware or real time is involved.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc;

use ferris::skills::{ProcessHandler, RequestType};
use ferris::{
    Catalog, Command, Config, Engine, EngineEvent, ManualClock, Reply, SkillHandler, SkillManifest,
};

mod common;

use common::{
    EventLog, RecordingSpeaker, ScriptedDecoder, fixture_catalog, kinds, loud_chunk, silent_chunk,
};

const CHUNK: Duration = Duration::from_millis(100);

struct Harness {
    engine: Engine,
    log: EventLog,
    clock: ManualClock,
    decoder: ScriptedDecoder,
    speaker: RecordingSpeaker,
}

impl Harness {
    fn new(wake_phrase: Option<&str>) -> Self {
        let mut config = Config::default();
        config.wake.phrase = wake_phrase.map(str::to_string);
        Self::with_config(config)
    }

    fn with_config(config: Config) -> Self {
        let log = EventLog::default();
        let clock = ManualClock::new();
        let decoder = ScriptedDecoder::new();
        let speaker = RecordingSpeaker::new();

        let mut engine = Engine::new(config, fixture_catalog(&log))
            .with_clock(Box::new(clock.clone()))
            .with_decoder(Box::new(decoder.clone()))
            .with_speaker(Box::new(speaker.clone()));
        engine.start();

        Self {
            engine,
            log,
            clock,
            decoder,
            speaker,
        }
    }

    /// Advance one chunk's worth of time and feed a loud chunk
    fn chunk(&mut self) -> Option<Reply> {
        self.clock.advance(CHUNK);
        self.engine.handle_event(EngineEvent::Audio(loud_chunk()))
    }
}

#[test]
fn switching_skills_ends_previous_session_before_launch() {
    let mut h = Harness::new(None);

    assert_eq!(h.engine.handle_line("launch restaurant"), Reply::Done);
    assert_eq!(h.engine.handle_line("weather in boston"), Reply::Done);

    assert_eq!(
        kinds(&h.log),
        vec![
            ("Restaurant".to_string(), RequestType::LaunchRequest),
            ("Restaurant".to_string(), RequestType::SessionEndedRequest),
            ("Weather".to_string(), RequestType::LaunchRequest),
        ]
    );
    assert_eq!(h.engine.session().active(), Some("Weather"));

    let log = h.log.lock().unwrap();
    let (_, restaurant) = &log[0];
    let (_, weather) = &log[2];
    assert!(weather.session.new);
    assert_ne!(weather.session.session_id, restaurant.session.session_id);

    let intent = weather.request.intent.as_ref().unwrap();
    assert_eq!(intent.name, "Forecast");
    assert_eq!(intent.slots["city"].value, json!("boston"));
}

#[test]
fn intent_within_active_session_is_not_new() {
    let mut h = Harness::new(None);

    h.engine.handle_line("launch restaurant");
    h.engine.handle_line("book a table for four people");

    let log = h.log.lock().unwrap();
    let (skill, event) = log.last().unwrap();
    assert_eq!(skill, "Restaurant");
    assert_eq!(event.request.kind, RequestType::IntentRequest);
    assert!(!event.session.new);
    assert_eq!(event.session.session_id, log[0].1.session.session_id);
    assert_eq!(
        event.request.intent.as_ref().unwrap().slots["count"].value,
        json!(4)
    );
    assert!(event.request.request_id > log[0].1.request.request_id);
}

#[test]
fn dispatch_prefers_builtins_then_active_then_persistent() {
    let mut h = Harness::new(None);

    // Not reachable until the restaurant is active
    assert_eq!(h.engine.dispatch("what is on the menu"), None);
    assert!(matches!(
        h.engine.dispatch("weather in new york city"),
        Some(Command::RunIntent { ref skill, .. }) if skill == "Weather"
    ));

    h.engine.handle_line("launch restaurant");
    assert!(matches!(
        h.engine.dispatch("what is on the menu"),
        Some(Command::RunIntent { ref intent, .. }) if intent == "Menu"
    ));
    assert_eq!(h.engine.dispatch("list everything"), Some(Command::ListSkills));
    assert_eq!(h.engine.dispatch("launch nowhere"), None);
}

#[test]
fn session_ending_response_puts_engine_to_sleep() {
    let mut h = Harness::new(Some("ferris"));
    h.engine.handle_event(EngineEvent::WakeTriggered);
    assert!(h.engine.is_awake());

    h.engine.handle_line("launch restaurant");
    h.engine.handle_line("goodbye");

    assert_eq!(h.engine.session().active(), None);
    assert!(!h.engine.is_awake());
    assert_eq!(
        kinds(&h.log).last(),
        Some(&("Restaurant".to_string(), RequestType::SessionEndedRequest))
    );
}

#[test]
fn wake_timeout_ends_active_skill() {
    let mut h = Harness::new(Some("ferris"));
    assert!(!h.engine.is_awake());

    h.engine.handle_event(EngineEvent::WakeTriggered);
    assert!(h.engine.is_awake());
    assert_eq!(h.speaker.said().first().map(String::as_str), Some("yes?"));

    h.engine.handle_line("launch restaurant");
    assert_eq!(h.engine.session().active(), Some("Restaurant"));

    h.clock.advance(Duration::from_secs(9));
    h.engine.handle_event(EngineEvent::Tick);
    assert!(h.engine.is_awake());

    h.clock.advance(Duration::from_secs(1));
    h.engine.handle_event(EngineEvent::Tick);
    assert!(!h.engine.is_awake());
    assert_eq!(h.engine.session().active(), None);
    assert_eq!(h.engine.wake_timer(), None);
    assert_eq!(
        kinds(&h.log).last(),
        Some(&("Restaurant".to_string(), RequestType::SessionEndedRequest))
    );
    assert!(h.decoder.last_grammar().contains("public <ferris.wake>"));
}

#[test]
fn stale_timer_is_ignored() {
    let mut h = Harness::new(Some("ferris"));

    h.engine.handle_event(EngineEvent::WakeTriggered);
    let (_, first) = h.engine.wake_timer().unwrap();

    // Re-arming makes the first timer stale
    h.engine.handle_event(EngineEvent::WakeTriggered);
    let (_, second) = h.engine.wake_timer().unwrap();
    assert_ne!(first, second);

    h.engine.handle_event(EngineEvent::TimerFired { generation: first });
    assert!(h.engine.is_awake());

    h.engine.handle_event(EngineEvent::TimerFired { generation: second });
    assert!(!h.engine.is_awake());
}

#[test]
fn stable_hypothesis_runs_after_stable_period() {
    let mut h = Harness::new(None);
    h.decoder.hear("launch restaurant", -100);

    // First sighting, then 700ms of the same hypothesis
    for _ in 0..8 {
        assert_eq!(h.chunk(), None);
    }
    assert!(h.log.lock().unwrap().is_empty());

    // Unchanged for 800ms
    assert_eq!(h.chunk(), Some(Reply::Done));
    assert_eq!(
        kinds(&h.log),
        vec![("Restaurant".to_string(), RequestType::LaunchRequest)]
    );
    assert_eq!(h.speaker.said(), vec!["Restaurant LaunchRequest".to_string()]);
}

#[test]
fn changing_hypothesis_never_runs() {
    let mut h = Harness::new(None);
    let texts = ["launch restaurant", "launch weather"];

    for i in 0..30 {
        if i % 5 == 0 {
            h.decoder.hear(texts[(i / 5) % 2], -100);
        }
        assert_eq!(h.chunk(), None);
    }
    assert!(h.log.lock().unwrap().is_empty());
}

#[test]
fn low_confidence_hypothesis_is_ignored() {
    let mut h = Harness::new(None);
    h.decoder.hear("launch restaurant", -9000);

    for _ in 0..12 {
        assert_eq!(h.chunk(), None);
    }
    assert!(h.log.lock().unwrap().is_empty());
}

#[test]
fn quiet_audio_does_not_parse() {
    let mut h = Harness::new(None);
    h.decoder.hear("launch restaurant", -100);

    for _ in 0..12 {
        h.clock.advance(CHUNK);
        assert_eq!(h.engine.process_audio(&silent_chunk()), None);
    }
    assert!(h.log.lock().unwrap().is_empty());
}

#[test]
fn idle_recognition_restarts_without_new_grammar() {
    let mut h = Harness::new(None);
    let grammars = h.decoder.grammars().len();
    let utterances = h.decoder.utterances();

    for _ in 0..16 {
        h.chunk();
    }

    assert!(h.decoder.utterances() > utterances);
    assert_eq!(h.decoder.grammars().len(), grammars);
}

#[test]
fn unparsed_hypothesis_restarts_with_new_grammar() {
    let mut h = Harness::new(None);
    h.decoder.hear("mumble mumble", -100);
    let grammars = h.decoder.grammars().len();

    // Tracked from the first chunk, held for 1500ms
    for _ in 0..16 {
        assert_eq!(h.chunk(), None);
    }
    assert_eq!(h.decoder.grammars().len(), grammars);

    h.chunk();
    assert_eq!(h.decoder.grammars().len(), grammars + 1);
    assert!(h.log.lock().unwrap().is_empty());
}

#[test]
fn listening_while_speaking_keeps_decoding_and_extends_wake() {
    let mut config = Config::default();
    config.recognition.listen_while_speaking = true;
    let mut h = Harness::with_config(config);

    h.engine.handle_event(EngineEvent::WakeTriggered);
    let (deadline, generation) = h.engine.wake_timer().unwrap();
    h.speaker.set_speaking(true);

    for _ in 0..3 {
        h.chunk();
    }
    assert_eq!(h.decoder.fed(), 3);

    let (rearmed, later) = h.engine.wake_timer().unwrap();
    assert!(later > generation);
    assert_eq!(rearmed, deadline + 3 * CHUNK);
}

#[test]
fn spoken_wake_phrase_wakes_engine() {
    let mut h = Harness::new(Some("ferris"));
    assert_eq!(
        h.decoder.last_grammar(),
        "#JSGF V1.0;\ngrammar ferris;\n\npublic <ferris.wake> = ( ferris ) ;\n"
    );

    h.decoder.hear("ferris", -100);
    h.chunk();

    assert!(h.engine.is_awake());
    assert!(h.engine.wake_timer().is_some());
    assert!(h.decoder.last_grammar().contains("public <ferris.input>"));
    assert_eq!(h.speaker.said(), vec!["yes?".to_string()]);
}

#[test]
fn other_speech_while_asleep_is_ignored() {
    let mut h = Harness::new(Some("ferris"));
    h.decoder.hear("launch restaurant", -100);

    for _ in 0..12 {
        h.chunk();
    }
    assert!(!h.engine.is_awake());
    assert!(h.log.lock().unwrap().is_empty());
}

#[test]
fn grammar_follows_active_skill() {
    let mut h = Harness::new(None);
    assert!(!h.decoder.last_grammar().contains("<Restaurant.BookTable> ="));
    assert!(h.decoder.last_grammar().contains("<ferris.launcher> ="));

    h.engine.handle_line("launch restaurant");
    let grammar = h.decoder.last_grammar();
    assert!(grammar.contains("<Restaurant.BookTable> ="));
    assert!(grammar.contains("<Weather.Forecast> ="));
    assert!(!grammar.contains("<ferris.launcher> ="));
}

#[test]
fn missing_words_are_reported_once() {
    let mut config = Config::default();
    config.wake.phrase = None;
    let log = EventLog::default();
    let decoder = ScriptedDecoder::new().without_words(&["menu"]);
    let mut engine =
        Engine::new(config, fixture_catalog(&log)).with_decoder(Box::new(decoder.clone()));

    engine.start();
    engine.handle_line("launch restaurant");
    engine.handle_line("launch restaurant");

    assert!(engine.warned_words().contains("menu"));
    assert_eq!(engine.warned_words().len(), 1);
    assert!(!decoder.last_grammar().contains("<Restaurant.Menu> ="));
}

#[test]
fn audio_is_ignored_while_speaking() {
    let mut h = Harness::new(None);
    h.decoder.hear("launch restaurant", -100);
    h.speaker.set_speaking(true);

    for _ in 0..12 {
        assert_eq!(h.chunk(), None);
    }
    assert_eq!(h.decoder.fed(), 0);
}

#[test]
fn shutdown_ends_active_session() {
    let mut h = Harness::new(None);
    h.engine.handle_line("launch weather");
    h.engine.shutdown();

    assert_eq!(
        kinds(&h.log).last(),
        Some(&("Weather".to_string(), RequestType::SessionEndedRequest))
    );
    assert_eq!(h.engine.session().active(), None);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn hung_handler_does_not_stall_the_event_loop() {
    let dir = tempfile::TempDir::new().unwrap();
    let script = dir.path().join("handler");
    std::fs::write(&script, "cat > /dev/null\nexec sleep 30\n").unwrap();

    let manifest =
        SkillManifest::parse("Stuck", r#"{"intents":[{"intent":"Poke"}]}"#, "Poke poke").unwrap();
    let handler = ProcessHandler::with_args(
        PathBuf::from("/bin/sh"),
        vec![script.display().to_string()],
    )
    .with_timeout(Duration::from_millis(200));
    let catalog = Catalog::load(vec![manifest], |_| {
        Ok(Arc::new(handler.clone()) as Arc<dyn SkillHandler>)
    });

    let mut config = Config::default();
    config.wake.phrase = None;
    let engine = Engine::new(config, catalog);

    let (tx, rx) = mpsc::channel(8);
    for line in ["launch stuck", "list", "exit"] {
        tx.send(EngineEvent::Line(line.to_string())).await.unwrap();
    }

    let started = Instant::now();
    let mut replies = Vec::new();
    let engine = ferris::run(engine, rx, |reply| replies.push(reply.clone())).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0], Reply::Done);
    assert!(matches!(&replies[1], Reply::Text(listing) if listing.contains("Skill 'Stuck'")));
    assert_eq!(replies[2], Reply::Exit);
    assert_eq!(engine.session().active(), None);
}
