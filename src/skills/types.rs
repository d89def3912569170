//! Skill catalog data types

use std::sync::Arc;

use indexmap::IndexMap;

use super::handler::SkillHandler;
use super::template::Template;
use crate::resolver::BuiltinSlot;
use crate::text::normalize;

/// The type of a slot: a skill-scoped custom vocabulary or a built-in type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotType {
    /// Name of a custom slot type declared by the owning skill
    Custom(String),
    /// Built-in type resolved by the entity resolver
    Builtin(BuiltinSlot),
}

impl SlotType {
    /// Parse a slot type tag from an intent schema
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        BuiltinSlot::from_tag(tag).map_or_else(|| Self::Custom(tag.to_string()), Self::Builtin)
    }

    /// The tag as written in the schema
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Custom(name) => name,
            Self::Builtin(builtin) => builtin.tag(),
        }
    }
}

/// A named user goal with its utterance templates
#[derive(Debug, Clone)]
pub struct Intent {
    pub name: String,
    /// Slot name → type; `None` when the schema declares no slots
    pub slots: Option<IndexMap<String, SlotType>>,
    pub utterances: Vec<Template>,
    /// Reachable while other skills (or none) are active
    pub persist: bool,
}

impl Intent {
    /// Type of a declared slot
    #[must_use]
    pub fn slot_type(&self, name: &str) -> Option<&SlotType> {
        self.slots.as_ref().and_then(|slots| slots.get(name))
    }

    /// Templates referencing a placeholder with no slot declaration
    ///
    /// Such templates can never match; they are reported at load time.
    pub fn unmatchable_templates(&self) -> impl Iterator<Item = &Template> {
        self.utterances
            .iter()
            .filter(|t| t.slot_names().any(|name| self.slot_type(name).is_none()))
    }
}

/// A loaded skill
#[derive(Clone)]
pub struct Skill {
    pub name: String,
    pub intents: IndexMap<String, Intent>,
    /// Custom slot type name → vocabulary, in declared order
    pub custom_slots: IndexMap<String, Vec<String>>,
    pub handler: Arc<dyn SkillHandler>,
}

impl std::fmt::Debug for Skill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Skill")
            .field("name", &self.name)
            .field("intents", &self.intents)
            .field("custom_slots", &self.custom_slots)
            .finish_non_exhaustive()
    }
}

impl Skill {
    /// Create a skill with no intents
    #[must_use]
    pub fn new(name: impl Into<String>, handler: Arc<dyn SkillHandler>) -> Self {
        Self {
            name: name.into(),
            intents: IndexMap::new(),
            custom_slots: IndexMap::new(),
            handler,
        }
    }

    /// Look up `text` in a custom slot vocabulary
    ///
    /// Comparison is on normalized text; the first matching entry is
    /// returned as written in the vocabulary.
    #[must_use]
    pub fn lookup_custom_slot_value(&self, slot_type: &str, text: &str) -> Option<&str> {
        let wanted = normalize(text);
        self.custom_slots
            .get(slot_type)?
            .iter()
            .find(|value| normalize(value) == wanted)
            .map(String::as_str)
    }

    /// Intents flagged as globally reachable
    pub fn persistent_intents(&self) -> impl Iterator<Item = &Intent> {
        self.intents.values().filter(|i| i.persist)
    }
}
