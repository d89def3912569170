//! The command engine
//!
//! [`Engine`] owns the catalog, the skill session, the wake state and the
//! recognition context. Every input (audio chunk, typed line, timer) is
//! handled by one `&mut self` call that runs to completion, so no two
//! commands ever observe each other half-done.

mod listen;

use std::time::{Duration, Instant};

pub use listen::NoiseLevel;
use listen::RecognitionContext;

use crate::clock::{Clock, MonotonicClock};
use crate::config::Config;
use crate::dispatcher::{self, Command};
use crate::grammar::{self, AnyWord, CompileContext, WarnedWords};
use crate::resolver::{BuiltinResolver, EntityResolver};
use crate::session::Session;
use crate::skills::{
    Catalog, EventIntent, HandlerOutcome, OutputSpeech, RequestType, SkillEvent, SkillOutput,
};
use crate::voice::{Decoder, SilentSpeaker, Speaker};

/// Outcome of executing a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Executed with nothing to show
    Done,
    /// Executed; text for the user
    Text(String),
    /// Nothing matched the input
    Unrecognised,
    /// The user asked to exit
    Exit,
}

/// Wake/sleep state and the wake timer
#[derive(Debug, Clone, Copy)]
struct WakeState {
    awake: bool,
    deadline: Option<Instant>,
    /// Bumped whenever the timer is armed or cancelled
    generation: u64,
}

/// The voice-command engine
pub struct Engine {
    config: Config,
    catalog: Catalog,
    session: Session,
    resolver: Box<dyn EntityResolver>,
    speaker: Box<dyn Speaker>,
    decoder: Option<Box<dyn Decoder>>,
    clock: Box<dyn Clock>,
    warned: WarnedWords,
    wake: WakeState,
    recognition: RecognitionContext,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("catalog", &self.catalog)
            .field("session", &self.session)
            .field("wake", &self.wake)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine over `catalog`
    ///
    /// Starts with the built-in resolver, no decoder, muted speech and the
    /// real clock. Without a wake phrase the engine is always awake.
    #[must_use]
    pub fn new(config: Config, catalog: Catalog) -> Self {
        let clock: Box<dyn Clock> = Box::new(MonotonicClock);
        let recognition = RecognitionContext::new(clock.now());
        let awake = config.wake.phrase.is_none();

        Self {
            config,
            catalog,
            session: Session::new(),
            resolver: Box::new(BuiltinResolver::new()),
            speaker: Box::new(SilentSpeaker),
            decoder: None,
            clock,
            warned: WarnedWords::new(),
            wake: WakeState {
                awake,
                deadline: None,
                generation: 0,
            },
            recognition,
        }
    }

    /// Use `decoder` for speech recognition
    #[must_use]
    pub fn with_decoder(mut self, decoder: Box<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Use `speaker` for speech output
    #[must_use]
    pub fn with_speaker(mut self, speaker: Box<dyn Speaker>) -> Self {
        self.speaker = speaker;
        self
    }

    /// Use `clock` for all deadlines
    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.recognition = RecognitionContext::new(clock.now());
        self.clock = clock;
        self
    }

    /// Use `resolver` for built-in slot types
    #[must_use]
    pub fn with_resolver(mut self, resolver: Box<dyn EntityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// The loaded skills
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The skill session
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Engine configuration
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the engine is accepting commands
    #[must_use]
    pub const fn is_awake(&self) -> bool {
        self.wake.awake
    }

    /// Deadline and generation of the armed wake timer
    #[must_use]
    pub const fn wake_timer(&self) -> Option<(Instant, u64)> {
        match self.wake.deadline {
            Some(deadline) => Some((deadline, self.wake.generation)),
            None => None,
        }
    }

    /// Words reported as missing from the decoder's dictionary
    #[must_use]
    pub const fn warned_words(&self) -> &WarnedWords {
        &self.warned
    }

    /// Load the initial grammar and start recognition
    pub fn start(&mut self) {
        tracing::info!(
            skills = self.catalog.len(),
            wake_phrase = ?self.config.wake.phrase,
            awake = self.wake.awake,
            "engine started"
        );
        self.restart_recognition(true);
    }

    /// Classify `text` against the current session
    #[must_use]
    pub fn dispatch(&self, text: &str) -> Option<Command> {
        dispatcher::dispatch(
            &self.catalog,
            self.session.active(),
            self.resolver.as_ref(),
            text,
        )
    }

    /// Handle a typed line
    ///
    /// Runs the command and restarts recognition with a fresh grammar.
    pub fn handle_line(&mut self, text: &str) -> Reply {
        let Some(command) = self.dispatch(text) else {
            tracing::debug!(text, "command unrecognised");
            return Reply::Unrecognised;
        };
        let reply = self.execute(command);
        self.restart_recognition(true);
        reply
    }

    /// Run a dispatched command
    pub fn execute(&mut self, command: Command) -> Reply {
        tracing::debug!(?command, "executing command");
        match command {
            Command::Exit => Reply::Exit,
            Command::ListSkills => Reply::Text(self.catalog.listing()),
            Command::ShowGrammar => Reply::Text(self.grammar()),
            Command::Stop => match self.session.active().map(str::to_string) {
                Some(active) => {
                    self.end_session(&active, true);
                    Reply::Done
                }
                None => Reply::Text("No active skill".to_string()),
            },
            Command::Launch { skill } => {
                if !self.session.is_active(&skill) {
                    self.launch(&skill, None);
                    self.session.activate(&skill);
                }
                Reply::Done
            }
            Command::RunIntent {
                skill,
                intent,
                slots,
            } => {
                self.launch(&skill, Some(EventIntent { name: intent, slots }));
                self.session.activate(&skill);
                Reply::Done
            }
        }
    }

    /// Compile the awake grammar for the current session
    pub fn grammar(&mut self) -> String {
        let ctx = CompileContext {
            active_skill: self.session.active(),
            enable_builtins: self.config.enable_builtins,
        };
        match self.decoder.as_deref() {
            Some(decoder) => {
                let vocab = |word: &str| decoder.contains_word(word);
                grammar::compile(&self.catalog, ctx, &vocab, &mut self.warned)
            }
            None => grammar::compile(&self.catalog, ctx, &AnyWord, &mut self.warned),
        }
    }

    /// Grammar for the current wake state
    fn current_grammar(&mut self) -> String {
        match self.config.wake.phrase.clone() {
            Some(phrase) if !self.wake.awake => match self.decoder.as_deref() {
                Some(decoder) => {
                    let vocab = |word: &str| decoder.contains_word(word);
                    grammar::compile_asleep(&phrase, &vocab, &mut self.warned)
                }
                None => grammar::compile_asleep(&phrase, &AnyWord, &mut self.warned),
            },
            _ => self.grammar(),
        }
    }

    /// Deliver a launch or intent request to `skill`
    ///
    /// A skill other than the active one gets a fresh session; the previous
    /// active skill's session is ended first.
    fn launch(&mut self, skill: &str, intent: Option<EventIntent>) {
        let new_skill = !self.session.is_active(skill);
        if new_skill {
            if let Some(active) = self.session.active().map(str::to_string) {
                self.end_session(&active, false);
            }
            self.session.begin(skill);
        }

        let kind = if new_skill {
            RequestType::LaunchRequest
        } else {
            RequestType::IntentRequest
        };
        let event = self.session.event(kind, new_skill, intent);

        let Some(output) = self.invoke(skill, &event) else {
            return;
        };
        if self.session.is_live(skill) {
            self.session.replace_attributes(output.session_attributes);
        }
        if let Some(speech) = &output.response.output_speech {
            self.speak(speech);
        }
        if output.response.should_end_session {
            self.end_session(skill, true);
        }
    }

    /// Send `SessionEndedRequest` to `skill` and close its session
    ///
    /// If the skill was active and `may_sleep` is set, the engine goes back
    /// to sleep.
    fn end_session(&mut self, skill: &str, may_sleep: bool) {
        let event = self.session.event(RequestType::SessionEndedRequest, false, None);
        if let Some(speech) = self
            .invoke(skill, &event)
            .and_then(|output| output.response.output_speech)
        {
            self.speak(&speech);
        }

        if self.session.end(skill) && may_sleep {
            self.sleep();
        }
    }

    /// Call a skill's handler and log the outcome
    fn invoke(&self, skill: &str, event: &SkillEvent) -> Option<SkillOutput> {
        let Some(handler) = self.catalog.get(skill).map(|s| s.handler.clone()) else {
            tracing::warn!(skill, "no such skill");
            return None;
        };

        match handler.handle(event) {
            HandlerOutcome::Succeeded(output) => {
                tracing::debug!(skill, kind = ?event.request.kind, "event succeeded");
                output
            }
            HandlerOutcome::Failed(error) => {
                tracing::error!(skill, kind = ?event.request.kind, error = %error, "event failed");
                None
            }
        }
    }

    fn speak(&mut self, speech: &OutputSpeech) {
        let text = match speech {
            OutputSpeech::PlainText { text } => text,
            OutputSpeech::Ssml { ssml } => ssml,
            OutputSpeech::Unsupported => {
                tracing::warn!("unrecognised speech type");
                return;
            }
        };
        if let Err(e) = self.speaker.say(text) {
            tracing::warn!(error = %e, "failed to speak");
        }
    }

    /// Wake up, or extend the wake window if already awake
    pub fn wake_up(&mut self) {
        if self.config.wake.phrase.is_some() {
            self.wake.deadline = Some(self.clock.now() + self.config.wake.timeout);
            self.wake.generation += 1;
        }

        if !self.wake.awake {
            tracing::info!("waking up");
            self.wake.awake = true;
            if let Some(reply) = self.config.wake.reply.clone() {
                self.speak(&OutputSpeech::plain(reply));
            }
            self.restart_recognition(true);
        }
    }

    /// Go to sleep, ending any active skill
    ///
    /// Does nothing without a wake phrase; such an engine never sleeps.
    pub fn sleep(&mut self) {
        if !self.wake.awake || self.config.wake.phrase.is_none() {
            return;
        }

        tracing::info!("going to sleep");
        self.wake.deadline = None;
        self.wake.generation += 1;
        self.wake.awake = false;

        if let Some(active) = self.session.active().map(str::to_string) {
            self.end_session(&active, false);
        }
        self.restart_recognition(true);
    }

    /// Sleep if the wake window has passed
    pub fn poll_timers(&mut self) {
        if let Some(deadline) = self.wake.deadline {
            if self.wake.awake && self.clock.now() >= deadline {
                tracing::info!("timed out");
                self.sleep();
            }
        }
    }

    /// A scheduled wake timer fired
    ///
    /// Ignored unless `generation` matches the currently armed timer.
    pub fn timer_fired(&mut self, generation: u64) {
        if self.wake.deadline.is_none() || generation != self.wake.generation {
            tracing::trace!(generation, current = self.wake.generation, "stale timer ignored");
            return;
        }
        tracing::info!("timed out");
        self.sleep();
    }

    /// Silence speech and end the active skill's session
    pub fn shutdown(&mut self) {
        self.speaker.quiet();
        if let Some(active) = self.session.active().map(str::to_string) {
            self.end_session(&active, false);
        }
        if let Some(decoder) = self.decoder.as_mut() {
            if let Err(e) = decoder.end_utterance() {
                tracing::debug!(error = %e, "failed to end utterance on shutdown");
            }
        }
        tracing::info!("engine stopped");
    }

    /// Time since recognition restarted or began tracking its hypothesis
    fn since_restart(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.recognition.since())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::skills::{SkillHandler, SkillManifest};

    type Log = Arc<Mutex<Vec<(String, RequestType)>>>;

    fn engine(log: &Log, end_on_launch: bool) -> Engine {
        let schema = r#"{"intents":[{"intent":"Hello"}]}"#;
        let manifests = vec![
            SkillManifest::parse("Alpha", schema, "Hello hello alpha").unwrap(),
            SkillManifest::parse("Beta", schema, "Hello hello beta").unwrap(),
        ];
        let catalog = Catalog::load(manifests, |m| {
            let log = Arc::clone(log);
            let name = m.name.clone();
            let handler = move |event: &SkillEvent| {
                log.lock().unwrap().push((name.clone(), event.request.kind));
                let output = if end_on_launch && event.request.kind == RequestType::LaunchRequest {
                    SkillOutput::speak("bye").ending()
                } else {
                    SkillOutput::default()
                };
                HandlerOutcome::Succeeded(Some(output))
            };
            Ok(Arc::new(handler) as Arc<dyn SkillHandler>)
        });
        let mut config = Config::default();
        config.wake.phrase = None;
        Engine::new(config, catalog)
    }

    #[test]
    fn switching_skills_ends_previous_session_first() {
        let log = Log::default();
        let mut engine = engine(&log, false);

        assert_eq!(engine.handle_line("launch alpha"), Reply::Done);
        assert_eq!(engine.session().active(), Some("Alpha"));
        assert_eq!(engine.handle_line("launch beta"), Reply::Done);
        assert_eq!(engine.session().active(), Some("Beta"));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                ("Alpha".to_string(), RequestType::LaunchRequest),
                ("Alpha".to_string(), RequestType::SessionEndedRequest),
                ("Beta".to_string(), RequestType::LaunchRequest),
            ]
        );
    }

    #[test]
    fn relaunching_active_skill_is_a_no_op() {
        let log = Log::default();
        let mut engine = engine(&log, false);
        engine.handle_line("launch alpha");
        engine.handle_line("launch alpha");
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn skill_ending_on_launch_never_activates() {
        let log = Log::default();
        let mut engine = engine(&log, true);
        engine.handle_line("launch alpha");
        assert_eq!(engine.session().active(), None);
        assert_eq!(
            log.lock().unwrap().last().map(|(_, kind)| *kind),
            Some(RequestType::SessionEndedRequest)
        );
    }

    #[test]
    fn stop_without_active_skill_reports_it() {
        let log = Log::default();
        let mut engine = engine(&log, false);
        assert_eq!(
            engine.handle_line("stop"),
            Reply::Text("No active skill".to_string())
        );
        assert_eq!(engine.handle_line("what"), Reply::Unrecognised);
        assert_eq!(engine.handle_line("quit"), Reply::Exit);
    }
}
