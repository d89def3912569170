//! Skill session state
//!
//! At most one skill is active. A skill is "live" between the start of its
//! session and its end; it only becomes active if it is still live once its
//! launch request has been handled.

use serde_json::{Map, Value};

use crate::skills::{
    EVENT_VERSION, EventIntent, EventRequest, EventSession, RequestType, SkillEvent,
};

/// Session id used before any skill has been launched
pub const DEFAULT_SESSION_ID: &str = "DefaultSession";

/// Session bookkeeping owned by the engine
#[derive(Debug, Clone)]
pub struct Session {
    active: Option<String>,
    live: Option<String>,
    id: String,
    attributes: Map<String, Value>,
    next_request_id: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create an empty session
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: None,
            live: None,
            id: DEFAULT_SESSION_ID.to_string(),
            attributes: Map::new(),
            next_request_id: 0,
        }
    }

    /// Name of the active skill
    #[must_use]
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Whether `skill` is the active skill
    #[must_use]
    pub fn is_active(&self, skill: &str) -> bool {
        self.active.as_deref() == Some(skill)
    }

    /// Whether `skill` has an open session
    #[must_use]
    pub fn is_live(&self, skill: &str) -> bool {
        self.live.as_deref() == Some(skill)
    }

    /// Current session id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current session attributes
    #[must_use]
    pub const fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Open a fresh session for `skill`
    ///
    /// A new id is generated and the attributes are cleared.
    pub fn begin(&mut self, skill: &str) {
        self.id = format!("SessionId.{}", uuid::Uuid::new_v4());
        self.attributes.clear();
        self.live = Some(skill.to_string());
        tracing::debug!(skill, session_id = %self.id, "session started");
    }

    /// Make `skill` active if its session is still open
    ///
    /// Returns whether the skill is now active.
    pub fn activate(&mut self, skill: &str) -> bool {
        if self.is_live(skill) {
            self.active = Some(skill.to_string());
            true
        } else {
            false
        }
    }

    /// Close `skill`'s session
    ///
    /// Returns whether `skill` was the active skill, in which case the
    /// session is cleared.
    pub fn end(&mut self, skill: &str) -> bool {
        if self.is_live(skill) {
            self.live = None;
        }
        if self.is_active(skill) {
            self.active = None;
            self.attributes.clear();
            tracing::debug!(skill, "session ended");
            true
        } else {
            false
        }
    }

    /// Replace the attributes with a handler's session attributes
    pub fn replace_attributes(&mut self, attributes: Option<Map<String, Value>>) {
        if let Some(attributes) = attributes {
            self.attributes = attributes;
        }
    }

    /// Build the next event for the current session
    pub fn event(
        &mut self,
        kind: RequestType,
        new: bool,
        intent: Option<EventIntent>,
    ) -> SkillEvent {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        SkillEvent {
            version: EVENT_VERSION.to_string(),
            session: EventSession {
                session_id: self.id.clone(),
                new,
                application: Map::new(),
                attributes: self.attributes.clone(),
            },
            request: EventRequest {
                request_id,
                kind,
                timestamp: chrono::Utc::now().timestamp_millis(),
                intent,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_ids_increase_across_sessions() {
        let mut session = Session::new();
        let first = session.event(RequestType::LaunchRequest, true, None);
        session.begin("Weather");
        let second = session.event(RequestType::IntentRequest, false, None);
        assert_eq!(first.request.request_id, 0);
        assert_eq!(second.request.request_id, 1);
        assert!(second.session.session_id.starts_with("SessionId."));
    }

    #[test]
    fn skill_that_ended_during_launch_never_activates() {
        let mut session = Session::new();
        session.begin("Weather");
        assert!(!session.end("Weather"));
        assert!(!session.activate("Weather"));
        assert_eq!(session.active(), None);
    }

    #[test]
    fn ending_active_skill_clears_attributes() {
        let mut session = Session::new();
        session.begin("Weather");
        assert!(session.activate("Weather"));
        let mut attributes = Map::new();
        attributes.insert("city".to_string(), json!("Paris"));
        session.replace_attributes(Some(attributes));
        session.replace_attributes(None);
        assert_eq!(session.attributes()["city"], "Paris");

        assert!(session.end("Weather"));
        assert_eq!(session.active(), None);
        assert!(session.attributes().is_empty());
    }

    #[test]
    fn begin_resets_attributes_and_id() {
        let mut session = Session::new();
        session.begin("Weather");
        let id = session.id().to_string();
        session.replace_attributes(Some(Map::from_iter([("a".to_string(), json!(1))])));
        session.begin("Music");
        assert_ne!(session.id(), id);
        assert!(session.attributes().is_empty());
        assert!(session.is_live("Music"));
        assert!(!session.is_live("Weather"));
    }
}
