//! Speech synthesis
//!
//! Speech runs as an external process given the text as its final argument.
//! Only one utterance plays at a time: starting new speech kills the old.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::config::SpeechConfig;
use crate::{Error, Result};

/// Something that can speak text
pub trait Speaker: Send {
    /// Start speaking `text`, interrupting any current speech
    ///
    /// # Errors
    ///
    /// Returns error if speech cannot be started
    fn say(&mut self, text: &str) -> Result<()>;

    /// Stop any current speech
    fn quiet(&mut self);

    /// Whether speech is currently playing
    fn is_speaking(&mut self) -> bool;
}

/// Speaks by running a synthesis command such as `espeak -m`
#[derive(Debug)]
pub struct ProcessSpeaker {
    program: PathBuf,
    args: Vec<String>,
    child: Option<Child>,
}

impl ProcessSpeaker {
    /// Resolve the configured speech program on `PATH`
    ///
    /// # Errors
    ///
    /// Returns error if the program cannot be found
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let program = which::which(&config.program)
            .map_err(|e| Error::Speech(format!("{}: {e}", config.program)))?;

        tracing::debug!(program = %program.display(), "speech synthesis ready");

        Ok(Self {
            program,
            args: config.args.clone(),
            child: None,
        })
    }
}

impl Speaker for ProcessSpeaker {
    fn say(&mut self, text: &str) -> Result<()> {
        self.quiet();

        tracing::debug!(text, "speaking");
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Speech(format!("{}: {e}", self.program.display())))?;

        self.child = Some(child);
        Ok(())
    }

    fn quiet(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!("speech stopped");
        }
    }

    fn is_speaking(&mut self) -> bool {
        let finished = match self.child.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(None)),
            None => return false,
        };
        if finished {
            self.child = None;
        }
        !finished
    }
}

impl Drop for ProcessSpeaker {
    fn drop(&mut self) {
        self.quiet();
    }
}

/// Speaker that logs instead of speaking
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSpeaker;

impl Speaker for SilentSpeaker {
    fn say(&mut self, text: &str) -> Result<()> {
        tracing::info!(text, "speech muted");
        Ok(())
    }

    fn quiet(&mut self) {}

    fn is_speaking(&mut self) -> bool {
        false
    }
}
