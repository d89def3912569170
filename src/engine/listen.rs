//! Hypothesis acceptance
//!
//! Audio chunks are fed to the decoder and its best hypothesis is tracked.
//! A hypothesis is parsed into a command once, when it first appears over
//! the noise threshold, and executed after it has stayed unchanged for the
//! stable period. Recognition restarts when nothing useful turns up.

use std::time::Instant;

use super::{Engine, Reply};
use crate::dispatcher::Command;
use crate::text::normalize;
use crate::voice::Hypothesis;

/// Running mean of absolute sample magnitude
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NoiseLevel {
    average: f64,
    samples: u64,
}

impl NoiseLevel {
    /// Fold a chunk of samples into the mean
    pub fn update(&mut self, chunk: &[i16]) {
        if chunk.is_empty() {
            return;
        }
        let sum: f64 = chunk.iter().map(|s| f64::from(s.unsigned_abs())).sum();
        let count = chunk.len() as u64;

        #[allow(clippy::cast_precision_loss)]
        let total = (self.samples + count) as f64;
        #[allow(clippy::cast_precision_loss)]
        let seen = self.samples as f64;

        self.average = self.average.mul_add(seen, sum) / total;
        self.samples += count;
    }

    /// Mean magnitude over every sample since the last reset
    #[must_use]
    pub const fn average(&self) -> f64 {
        self.average
    }

    /// Number of samples folded in
    #[must_use]
    pub const fn samples(&self) -> u64 {
        self.samples
    }
}

/// The hypothesis currently being tracked
#[derive(Debug, Clone)]
struct Tracked {
    hypothesis: Hypothesis,
    /// Set when the hypothesis parsed into a command
    command: Option<Command>,
}

/// Per-utterance recognition state, reset together on every restart
#[derive(Debug, Clone)]
pub(super) struct RecognitionContext {
    noise: NoiseLevel,
    current: Option<Tracked>,
    /// Last restart, or first sighting of the tracked hypothesis
    since: Instant,
}

impl RecognitionContext {
    pub(super) fn new(now: Instant) -> Self {
        Self {
            noise: NoiseLevel::default(),
            current: None,
            since: now,
        }
    }

    pub(super) const fn since(&self) -> Instant {
        self.since
    }
}

impl Engine {
    /// Process one chunk of captured audio
    ///
    /// Returns the reply of a command executed by this chunk, if any.
    pub fn process_audio(&mut self, chunk: &[i16]) -> Option<Reply> {
        if self.speaker.is_speaking() {
            // Activity during speech keeps the session alive
            if self.wake.awake {
                self.wake_up();
            }
            if !self.config.recognition.listen_while_speaking {
                return None;
            }
        }

        self.poll_timers();

        self.recognition.noise.update(chunk);
        let hypothesis = {
            let decoder = self.decoder.as_mut()?;
            if let Err(e) = decoder.feed(chunk) {
                tracing::warn!(error = %e, "decoder rejected audio");
                return None;
            }
            decoder.hypothesis()
        };

        let new_match = hypothesis.is_some_and(|hypothesis| self.track(hypothesis));
        let elapsed = self.since_restart();
        let stable_after = self.config.recognition.stable_after;
        let restart_after = self.config.recognition.restart_after;
        let noisy = self.recognition.noise.average() > self.config.recognition.noise_threshold;

        // None: nothing tracked; Some(parsed): a hypothesis is tracked
        let tracked = self
            .recognition
            .current
            .as_ref()
            .map(|tracked| tracked.command.is_some());

        match tracked {
            None if elapsed > restart_after => {
                tracing::trace!("nothing recognised, restarting");
                self.restart_recognition(false);
                None
            }
            Some(_) if new_match && noisy => {
                self.parse_current();
                None
            }
            Some(true) if elapsed > stable_after => self.run_current(),
            Some(_) if elapsed > restart_after => {
                tracing::debug!("hypothesis did not parse, restarting");
                self.restart_recognition(true);
                None
            }
            _ => None,
        }
    }

    /// Track `hypothesis` if it is confident and new
    ///
    /// Returns whether tracking changed.
    fn track(&mut self, hypothesis: Hypothesis) -> bool {
        let threshold = self.config.recognition.match_threshold.unsigned_abs();
        if hypothesis.score.unsigned_abs() >= threshold {
            return false;
        }
        if self
            .recognition
            .current
            .as_ref()
            .is_some_and(|tracked| tracked.hypothesis.text == hypothesis.text)
        {
            return false;
        }

        self.recognition.since = self.clock.now();
        self.recognition.current = Some(Tracked {
            hypothesis,
            command: None,
        });
        true
    }

    /// Try to turn the tracked hypothesis into a command
    fn parse_current(&mut self) {
        let Some(text) = self
            .recognition
            .current
            .as_ref()
            .map(|tracked| tracked.hypothesis.text.clone())
        else {
            return;
        };

        tracing::info!(
            text = %text,
            score = self.recognition.current.as_ref().map_or(0, |t| t.hypothesis.score),
            noise = self.recognition.noise.average(),
            "detected"
        );

        if !self.wake.awake {
            let wake_phrase = self.config.wake.phrase.as_deref().map(normalize);
            if wake_phrase.is_some_and(|phrase| phrase == normalize(&text)) {
                self.wake_up();
            }
            return;
        }

        let command = self.dispatch(&text);
        if command.is_some() {
            if let Some(tracked) = self.recognition.current.as_mut() {
                tracked.command = command;
            }
            self.wake_up();
        }
    }

    /// Execute the stable tracked command
    fn run_current(&mut self) -> Option<Reply> {
        let command = self
            .recognition
            .current
            .as_mut()
            .and_then(|tracked| tracked.command.take())?;

        let reply = self.execute(command);
        if self.session.active().is_some() {
            self.wake_up();
        }
        self.restart_recognition(true);
        Some(reply)
    }

    /// Restart the decoder's utterance and reset the recognition context
    ///
    /// With `rebuild`, the grammar for the current wake state is compiled
    /// and loaded first.
    pub(super) fn restart_recognition(&mut self, rebuild: bool) {
        let grammar = if rebuild && self.decoder.is_some() {
            Some(self.current_grammar())
        } else {
            None
        };

        if let Some(decoder) = self.decoder.as_mut() {
            if let Err(e) = decoder.end_utterance() {
                tracing::debug!(error = %e, "failed to end utterance");
            }
            if let Some(grammar) = grammar {
                if let Err(e) = decoder.set_grammar(&grammar) {
                    tracing::error!(error = %e, "decoder rejected grammar");
                }
            }
            if let Err(e) = decoder.start_utterance() {
                tracing::error!(error = %e, "failed to start utterance");
            }
        }

        self.recognition = RecognitionContext::new(self.clock.now());
    }
}
