//! Shared test utilities
#![allow(dead_code)]

use std::f32::consts::PI;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ferris::skills::RequestType;
use ferris::{
    Catalog, Decoder, HandlerOutcome, Hypothesis, SkillEvent, SkillHandler, SkillManifest,
    SkillOutput, Speaker,
};

/// Events seen by fixture skills, as (skill, event)
pub type EventLog = Arc<Mutex<Vec<(String, SkillEvent)>>>;

const RESTAURANT_SCHEMA: &str = r#"{
  "intents": [
    { "intent": "BookTable", "slots": [{ "name": "count", "type": "AMAZON.NUMBER" }] },
    { "intent": "Menu" },
    { "intent": "Goodbye" }
  ]
}"#;

const RESTAURANT_UTTERANCES: &str = "\
BookTable book a table for {count} people
Menu what is on the menu
Goodbye goodbye
";

const WEATHER_SCHEMA: &str = r#"{
  "intents": [
    { "intent": "Forecast", "slots": [{ "name": "city", "type": "City" }], "persist": true }
  ]
}"#;

const WEATHER_UTTERANCES: &str = "Forecast weather in {city}\n";

/// Catalog with a `Restaurant` and a `Weather` skill that record their events
///
/// Every event is answered with speech naming the skill and request type;
/// the `Goodbye` intent also ends the session.
pub fn fixture_catalog(log: &EventLog) -> Catalog {
    let manifests = vec![
        SkillManifest::parse("Restaurant", RESTAURANT_SCHEMA, RESTAURANT_UTTERANCES)
            .expect("restaurant manifest"),
        SkillManifest::parse("Weather", WEATHER_SCHEMA, WEATHER_UTTERANCES)
            .expect("weather manifest")
            .with_custom_slot("City", "boston\nnew york\nnew york city\n"),
    ];

    Catalog::load(manifests, |manifest| {
        Ok(Arc::new(RecordingHandler {
            skill: manifest.name.clone(),
            log: Arc::clone(log),
        }) as Arc<dyn SkillHandler>)
    })
}

/// Handler that logs every event it receives
pub struct RecordingHandler {
    skill: String,
    log: EventLog,
}

impl SkillHandler for RecordingHandler {
    fn handle(&self, event: &SkillEvent) -> HandlerOutcome {
        self.log
            .lock()
            .expect("event log poisoned")
            .push((self.skill.clone(), event.clone()));

        let output = SkillOutput::speak(format!("{} {:?}", self.skill, event.request.kind));
        let ending = event
            .request
            .intent
            .as_ref()
            .is_some_and(|intent| intent.name == "Goodbye");
        HandlerOutcome::Succeeded(Some(if ending { output.ending() } else { output }))
    }
}

/// (skill, request type) pairs from the log
pub fn kinds(log: &EventLog) -> Vec<(String, RequestType)> {
    log.lock()
        .expect("event log poisoned")
        .iter()
        .map(|(skill, event)| (skill.clone(), event.request.kind))
        .collect()
}

#[derive(Debug, Default)]
struct DecoderState {
    heard: Option<Hypothesis>,
    current: Option<Hypothesis>,
    grammars: Vec<String>,
    utterances: usize,
    fed: usize,
    unknown: Vec<String>,
}

/// Decoder whose hypothesis is set by the test
///
/// A hypothesis set with [`ScriptedDecoder::hear`] appears after the next
/// fed chunk and is cleared when a new utterance starts. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecoder {
    state: Arc<Mutex<DecoderState>>,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `words` as missing from the dictionary
    pub fn without_words(self, words: &[&str]) -> Self {
        self.lock().unknown = words.iter().map(ToString::to_string).collect();
        self
    }

    /// Make the decoder recognise `text` with `score`
    pub fn hear(&self, text: &str, score: i32) {
        self.lock().heard = Some(Hypothesis::new(text, score));
    }

    /// Every grammar loaded so far
    pub fn grammars(&self) -> Vec<String> {
        self.lock().grammars.clone()
    }

    pub fn last_grammar(&self) -> String {
        self.lock().grammars.last().cloned().unwrap_or_default()
    }

    /// Number of utterances started
    pub fn utterances(&self) -> usize {
        self.lock().utterances
    }

    /// Number of chunks fed
    pub fn fed(&self) -> usize {
        self.lock().fed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DecoderState> {
        self.state.lock().expect("decoder state poisoned")
    }
}

impl Decoder for ScriptedDecoder {
    fn set_grammar(&mut self, grammar: &str) -> ferris::Result<()> {
        self.lock().grammars.push(grammar.to_string());
        Ok(())
    }

    fn start_utterance(&mut self) -> ferris::Result<()> {
        let mut state = self.lock();
        state.utterances += 1;
        state.heard = None;
        state.current = None;
        Ok(())
    }

    fn end_utterance(&mut self) -> ferris::Result<()> {
        Ok(())
    }

    fn feed(&mut self, _samples: &[i16]) -> ferris::Result<()> {
        let mut state = self.lock();
        state.fed += 1;
        if let Some(heard) = state.heard.clone() {
            state.current = Some(heard);
        }
        Ok(())
    }

    fn hypothesis(&self) -> Option<Hypothesis> {
        self.lock().current.clone()
    }

    fn contains_word(&self, word: &str) -> bool {
        !self.lock().unknown.iter().any(|w| w == word)
    }
}

/// Speaker that records what it was asked to say
#[derive(Debug, Clone, Default)]
pub struct RecordingSpeaker {
    said: Arc<Mutex<Vec<String>>>,
    speaking: Arc<Mutex<bool>>,
}

impl RecordingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn said(&self) -> Vec<String> {
        self.said.lock().expect("speaker poisoned").clone()
    }

    /// Pretend speech is (or is not) playing
    pub fn set_speaking(&self, speaking: bool) {
        *self.speaking.lock().expect("speaker poisoned") = speaking;
    }
}

impl Speaker for RecordingSpeaker {
    fn say(&mut self, text: &str) -> ferris::Result<()> {
        self.said.lock().expect("speaker poisoned").push(text.to_string());
        Ok(())
    }

    fn quiet(&mut self) {
        self.set_speaking(false);
    }

    fn is_speaking(&mut self) -> bool {
        *self.speaking.lock().expect("speaker poisoned")
    }
}

/// Generate a 16-bit sine wave
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
pub fn sine(frequency: f32, samples: usize, amplitude: f32) -> Vec<i16> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / ferris::voice::SAMPLE_RATE as f32;
            (amplitude * (2.0 * PI * frequency * t).sin()) as i16
        })
        .collect()
}

/// One chunk of audio well above the default noise threshold
pub fn loud_chunk() -> Vec<i16> {
    sine(440.0, ferris::voice::CHUNK_SAMPLES, 3000.0)
}

/// One chunk of silence
pub fn silent_chunk() -> Vec<i16> {
    vec![0; ferris::voice::CHUNK_SAMPLES]
}

/// Write a skill directory under `root`
///
/// `handler` is the handler script body, or `None` to leave it out.
pub fn write_skill(root: &Path, name: &str, schema: &str, utterances: &str, handler: Option<&str>) {
    let dir = root.join(name);
    std::fs::create_dir_all(dir.join("src")).expect("create src");
    std::fs::create_dir_all(dir.join("speechAssets")).expect("create speechAssets");
    std::fs::write(dir.join("speechAssets/IntentSchema.json"), schema).expect("write schema");
    std::fs::write(dir.join("speechAssets/SampleUtterances.txt"), utterances)
        .expect("write utterances");
    if let Some(body) = handler {
        std::fs::write(dir.join("src/handler"), body).expect("write handler");
    }
}
