//! Ferris - voice-command engine for pluggable skills
//!
//! This library turns a stream of audio (or typed text) into actions on a
//! catalog of skills:
//! - Skill catalog and manifest loading
//! - Intent matching with slot resolution
//! - JSGF grammar compilation for a speech decoder
//! - Wake/sleep and hypothesis acceptance state machine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Front ends                        │
//! │   Console  │  Microphone  │  Wake word  │  Timers    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ EngineEvent queue
//! ┌────────────────────▼────────────────────────────────┐
//! │                      Engine                          │
//! │  Session  │  Dispatcher  │  Matcher  │  Grammar     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                      Skills                          │
//! │   Handlers (in-process or executables)  │  Speech   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod grammar;
pub mod matcher;
pub mod resolver;
pub mod session;
pub mod skills;
pub mod text;
pub mod voice;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::Config;
pub use dispatcher::{Command, dispatch};
pub use engine::{Engine, NoiseLevel, Reply};
pub use error::{Error, Result};
pub use events::{EngineEvent, run};
pub use grammar::{AnyWord, CompileContext, Vocabulary, WarnedWords, compile, compile_asleep};
pub use matcher::{match_intent, match_slot};
pub use resolver::{BuiltinResolver, BuiltinSlot, EntityResolver};
pub use session::Session;
pub use skills::{
    Catalog, HandlerOutcome, Skill, SkillEvent, SkillHandler, SkillManifest, SkillOutput,
};
pub use voice::{Decoder, Hypothesis, Speaker};
