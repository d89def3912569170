//! Skill handler contract
//!
//! A skill receives an event (launch, intent or session end) and reports a
//! tagged outcome. Handlers run in-process through [`SkillHandler`], or as an
//! external executable through [`ProcessHandler`], which exchanges JSON over
//! stdin/stdout.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::timeout;

use crate::{Error, Result};

/// Event protocol version
pub const EVENT_VERSION: &str = "1.0";

/// Default time a skill executable may take to answer one event
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);

/// Event delivered to a skill handler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillEvent {
    pub version: String,
    pub session: EventSession,
    pub request: EventRequest,
}

/// Session part of a skill event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventSession {
    pub session_id: String,
    /// True when this request starts the skill's session
    pub new: bool,
    #[serde(default)]
    pub application: Map<String, Value>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Request part of a skill event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub request_id: u64,
    #[serde(rename = "type")]
    pub kind: RequestType,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<EventIntent>,
}

/// Kind of request delivered to a skill
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestType {
    LaunchRequest,
    IntentRequest,
    SessionEndedRequest,
}

/// Intent and its resolved slots
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventIntent {
    pub name: String,
    #[serde(default)]
    pub slots: Slots,
}

/// A resolved slot value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotValue {
    pub value: Value,
}

/// Slot name → resolved value, in template order
pub type Slots = IndexMap<String, SlotValue>;

/// Successful handler output
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkillOutput {
    #[serde(default)]
    pub response: SkillResponse,
    /// Replaces the session attributes when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_attributes: Option<Map<String, Value>>,
}

/// Response body of a handler output
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkillResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_speech: Option<OutputSpeech>,
    #[serde(default)]
    pub should_end_session: bool,
}

/// Speech the engine should synthesize
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum OutputSpeech {
    PlainText {
        text: String,
    },
    #[serde(rename = "SSML")]
    Ssml {
        ssml: String,
    },
    #[serde(other)]
    Unsupported,
}

impl OutputSpeech {
    /// Plain-text speech
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }
}

impl SkillOutput {
    /// Output that speaks `text`
    #[must_use]
    pub fn speak(text: impl Into<String>) -> Self {
        Self {
            response: SkillResponse {
                output_speech: Some(OutputSpeech::plain(text)),
                should_end_session: false,
            },
            session_attributes: None,
        }
    }

    /// Mark the session as finished after this response
    #[must_use]
    pub const fn ending(mut self) -> Self {
        self.response.should_end_session = true;
        self
    }
}

/// Result of handling an event
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// The handler succeeded, optionally producing output
    Succeeded(Option<SkillOutput>),
    /// The handler reported an error
    Failed(String),
}

/// A skill's event handler
pub trait SkillHandler: Send + Sync {
    /// Handle one event
    fn handle(&self, event: &SkillEvent) -> HandlerOutcome;
}

impl<F> SkillHandler for F
where
    F: Fn(&SkillEvent) -> HandlerOutcome + Send + Sync,
{
    fn handle(&self, event: &SkillEvent) -> HandlerOutcome {
        self(event)
    }
}

/// Reply written by an external handler process
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum ProcessReply {
    Succeed {
        #[serde(default)]
        output: Option<SkillOutput>,
    },
    Fail {
        error: String,
    },
}

/// Runs a skill executable per event
///
/// The event is written to stdin as JSON. The process answers on stdout
/// with `{"status":"succeed","output":{...}}` or
/// `{"status":"fail","error":"..."}`. A bare output object without a status
/// counts as success, and so does empty output (without a response).
///
/// A process still running after the timeout is killed and the event fails.
#[derive(Debug, Clone)]
pub struct ProcessHandler {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessHandler {
    /// Create a handler for the executable at `program`
    #[must_use]
    pub const fn new(program: PathBuf) -> Self {
        Self::with_args(program, Vec::new())
    }

    /// Create a handler that runs `program` with fixed arguments
    #[must_use]
    pub const fn with_args(program: PathBuf, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Limit how long one event may take
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, event: &SkillEvent) -> Result<HandlerOutcome> {
        let payload = serde_json::to_vec(event)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let exchange = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
            }
            child.wait_with_output().await
        };

        // Dropping the timed-out child kills it
        let output = timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                Error::Handler(format!(
                    "{} timed out after {:?}",
                    self.program.display(),
                    self.timeout
                ))
            })??;

        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(
                handler = %self.program.display(),
                stderr = %stderr.trim(),
                "handler stderr"
            );
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Handler(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Ok(HandlerOutcome::Succeeded(None));
        }

        let reply: Value = serde_json::from_str(stdout)?;
        if reply.get("status").is_none() {
            return Ok(HandlerOutcome::Succeeded(Some(serde_json::from_value(reply)?)));
        }

        Ok(match serde_json::from_value::<ProcessReply>(reply)? {
            ProcessReply::Succeed { output } => HandlerOutcome::Succeeded(output),
            ProcessReply::Fail { error } => HandlerOutcome::Failed(error),
        })
    }
}

/// Drive `future` to completion from synchronous code
///
/// Uses the ambient runtime when there is one (the event loop runs engine
/// steps on its blocking pool), or a private current-thread runtime.
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    if let Ok(handle) = Handle::try_current() {
        if handle.runtime_flavor() == RuntimeFlavor::MultiThread {
            return Ok(tokio::task::block_in_place(|| handle.block_on(future)));
        }
        return Ok(handle.block_on(future));
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

impl SkillHandler for ProcessHandler {
    fn handle(&self, event: &SkillEvent) -> HandlerOutcome {
        match block_on(self.run(event)) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) | Err(e) => HandlerOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn launch_event() -> SkillEvent {
        SkillEvent {
            version: EVENT_VERSION.to_string(),
            session: EventSession {
                session_id: "SessionId.test".to_string(),
                new: true,
                application: Map::new(),
                attributes: Map::new(),
            },
            request: EventRequest {
                request_id: 3,
                kind: RequestType::IntentRequest,
                timestamp: 1_700_000_000_000,
                intent: Some(EventIntent {
                    name: "BookTable".to_string(),
                    slots: IndexMap::from([(
                        "count".to_string(),
                        SlotValue { value: json!(4) },
                    )]),
                }),
            },
        }
    }

    #[test]
    fn event_serializes_in_skill_wire_format() {
        let value = serde_json::to_value(launch_event()).unwrap();
        assert_eq!(value["version"], "1.0");
        assert_eq!(value["session"]["sessionId"], "SessionId.test");
        assert_eq!(value["session"]["new"], true);
        assert_eq!(value["request"]["requestId"], 3);
        assert_eq!(value["request"]["type"], "IntentRequest");
        assert_eq!(value["request"]["intent"]["slots"]["count"]["value"], 4);
    }

    #[test]
    fn output_parses_speech_variants() {
        let output: SkillOutput = serde_json::from_value(json!({
            "response": {
                "outputSpeech": { "type": "SSML", "ssml": "<speak>hi</speak>" },
                "shouldEndSession": true
            },
            "sessionAttributes": { "step": 2 }
        }))
        .unwrap();
        assert_eq!(
            output.response.output_speech,
            Some(OutputSpeech::Ssml {
                ssml: "<speak>hi</speak>".to_string()
            })
        );
        assert!(output.response.should_end_session);
        assert_eq!(output.session_attributes.unwrap()["step"], 2);

        let odd: SkillOutput = serde_json::from_value(json!({
            "response": { "outputSpeech": { "type": "Audio" } }
        }))
        .unwrap();
        assert_eq!(odd.response.output_speech, Some(OutputSpeech::Unsupported));
    }

    #[test]
    fn closures_are_handlers() {
        let handler = |_: &SkillEvent| HandlerOutcome::Succeeded(Some(SkillOutput::speak("ok")));
        assert_eq!(
            handler.handle(&launch_event()),
            HandlerOutcome::Succeeded(Some(SkillOutput::speak("ok")))
        );
    }

    #[cfg(unix)]
    #[test]
    fn process_handler_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("handler");
        std::fs::write(
            &script,
            concat!(
                "#!/bin/sh\ncat > /dev/null\n",
                "echo '{\"status\":\"succeed\",\"output\":{\"response\":",
                "{\"outputSpeech\":{\"type\":\"PlainText\",\"text\":\"hello\"}}}}'\n",
            ),
        )
        .unwrap();

        let handler = ProcessHandler::with_args(
            PathBuf::from("/bin/sh"),
            vec![script.display().to_string()],
        );
        assert_eq!(
            handler.handle(&launch_event()),
            HandlerOutcome::Succeeded(Some(SkillOutput::speak("hello")))
        );
    }

    #[test]
    fn missing_executable_fails_without_panicking() {
        let handler = ProcessHandler::new(PathBuf::from("/nonexistent/ferris/handler"));
        assert!(matches!(
            handler.handle(&launch_event()),
            HandlerOutcome::Failed(_)
        ));
    }
}
