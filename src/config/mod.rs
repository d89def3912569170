//! Configuration management for the Ferris engine

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

pub use file::{FerrisConfigFile, config_file_path, load_config_file};

use crate::skills::DEFAULT_HANDLER_TIMEOUT;

/// Default wake phrase
pub const DEFAULT_WAKE_PHRASE: &str = "ferris";

/// Ferris engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing one sub-directory per skill
    pub skills_dir: PathBuf,

    /// Wake/sleep behaviour
    pub wake: WakeConfig,

    /// Hypothesis acceptance thresholds and timings
    pub recognition: RecognitionConfig,

    /// Speech synthesis command
    pub speech: SpeechConfig,

    /// Enable exit/quit/list/grammar as spoken commands
    pub enable_builtins: bool,

    /// Time a skill executable may take to answer one event
    pub handler_timeout: Duration,
}

/// Wake-word configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Wake phrase; `None` means the engine is always awake
    pub phrase: Option<String>,

    /// Time without an accepted command before going back to sleep
    pub timeout: Duration,

    /// Phrase spoken when waking up
    pub reply: Option<String>,
}

/// Recognition gating configuration
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// Mean absolute sample magnitude above which audio counts as speech
    pub noise_threshold: f64,

    /// Hypotheses with an absolute score at or above this are ignored
    pub match_threshold: i32,

    /// How long a hypothesis must stay unchanged before it runs
    pub stable_after: Duration,

    /// Idle/unparseable period after which recognition restarts
    pub restart_after: Duration,

    /// Keep decoding audio while speech output is playing
    pub listen_while_speaking: bool,
}

/// Speech synthesis command configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Program to run (text is appended as the last argument)
    pub program: String,

    /// Extra arguments placed before the text
    pub args: Vec<String>,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            phrase: Some(DEFAULT_WAKE_PHRASE.to_string()),
            timeout: Duration::from_secs(10),
            reply: Some("yes?".to_string()),
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 100.0,
            match_threshold: 8000,
            stable_after: Duration::from_millis(750),
            restart_after: Duration::from_millis(1500),
            listen_while_speaking: false,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            program: "espeak".to_string(),
            args: vec!["-m".to_string()],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skills_dir: PathBuf::from("skills"),
            wake: WakeConfig::default(),
            recognition: RecognitionConfig::default(),
            speech: SpeechConfig::default(),
            enable_builtins: true,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file, then environment
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_file(&load_config_file());
        config.apply_env(|key| std::env::var(key).ok());

        tracing::debug!(
            skills_dir = %config.skills_dir.display(),
            wake_phrase = ?config.wake.phrase,
            "configuration loaded"
        );

        config
    }

    /// Overlay values present in a parsed config file
    pub fn apply_file(&mut self, file: &FerrisConfigFile) {
        if let Some(dir) = &file.skills_dir {
            self.skills_dir = PathBuf::from(dir);
        }
        if let Some(builtins) = file.enable_builtins {
            self.enable_builtins = builtins;
        }
        if let Some(ms) = file.handler_timeout_ms {
            self.handler_timeout = Duration::from_millis(ms);
        }

        let wake = &file.wake;
        if let Some(phrase) = &wake.phrase {
            self.wake.phrase = non_empty(phrase);
        }
        if let Some(ms) = wake.timeout_ms {
            self.wake.timeout = Duration::from_millis(ms);
        }
        if let Some(reply) = &wake.reply {
            self.wake.reply = non_empty(reply);
        }

        let recognition = &file.recognition;
        if let Some(threshold) = recognition.noise_threshold {
            self.recognition.noise_threshold = threshold;
        }
        if let Some(threshold) = recognition.match_threshold {
            self.recognition.match_threshold = threshold;
        }
        if let Some(ms) = recognition.stable_after_ms {
            self.recognition.stable_after = Duration::from_millis(ms);
        }
        if let Some(ms) = recognition.restart_after_ms {
            self.recognition.restart_after = Duration::from_millis(ms);
        }
        if let Some(listen) = recognition.listen_while_speaking {
            self.recognition.listen_while_speaking = listen;
        }

        if let Some(command) = &file.speech.command {
            self.set_speech_command(command);
        }
    }

    /// Overlay values from environment variables
    ///
    /// Takes a lookup function so callers (and tests) control the source.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(phrase) = var("FERRIS_WAKE_PHRASE") {
            self.wake.phrase = non_empty(&phrase);
        }
        if let Some(dir) = var("FERRIS_SKILLS_DIR") {
            self.skills_dir = PathBuf::from(dir);
        }
        if let Some(command) = var("FERRIS_SPEECH_COMMAND") {
            self.set_speech_command(&command);
        }
    }

    /// Replace the speech command from a whitespace-separated command line
    pub fn set_speech_command(&mut self, command: &str) {
        let mut parts = command.split_whitespace().map(str::to_string);
        if let Some(program) = parts.next() {
            self.speech = SpeechConfig {
                program,
                args: parts.collect(),
            };
        } else {
            tracing::warn!("empty speech command ignored");
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
