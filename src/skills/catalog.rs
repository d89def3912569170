//! In-memory skill catalog

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use super::handler::{ProcessHandler, SkillHandler};
use super::manifest::{self, SkillManifest};
use super::template::Template;
use super::types::{Intent, Skill, SlotType};
use crate::{Error, Result};

/// All loaded skills, in load order
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    skills: Vec<Skill>,
}

impl Catalog {
    /// Create an empty catalog
    #[must_use]
    pub const fn new() -> Self {
        Self { skills: Vec::new() }
    }

    /// Build a catalog from parsed manifests
    ///
    /// `bind` supplies each skill's handler. A manifest that cannot be turned
    /// into a skill (duplicate intents, no handler, duplicate skill name) is
    /// logged and skipped; the others still load.
    pub fn load<F>(manifests: Vec<SkillManifest>, mut bind: F) -> Self
    where
        F: FnMut(&SkillManifest) -> Result<Arc<dyn SkillHandler>>,
    {
        let mut catalog = Self::new();
        for manifest in manifests {
            let built = bind(&manifest).and_then(|handler| build_skill(&manifest, handler));
            match built.and_then(|skill| catalog.push(skill)) {
                Ok(()) => tracing::info!(skill = %manifest.name, "loaded skill"),
                Err(e) => tracing::warn!(skill = %manifest.name, error = %e, "skipping skill"),
            }
        }
        catalog
    }

    /// Load every skill under `root`, running each skill's `src/handler`
    ///
    /// Each handler process gets `handler_timeout` per event.
    ///
    /// # Errors
    ///
    /// Returns error if `root` cannot be read
    pub fn load_dir(root: &Path, handler_timeout: Duration) -> Result<Self> {
        let manifests = manifest::discover(root)?;
        Ok(Self::load(manifests, |m| {
            let path = m
                .handler_path
                .as_ref()
                .filter(|p| p.is_file())
                .ok_or_else(|| Error::Skill(format!("{}: missing src/handler", m.name)))?;
            let handler = ProcessHandler::new(path.clone()).with_timeout(handler_timeout);
            Ok(Arc::new(handler) as Arc<dyn SkillHandler>)
        }))
    }

    /// Add a skill
    ///
    /// # Errors
    ///
    /// Returns error if a skill with the same name is already loaded
    pub fn push(&mut self, skill: Skill) -> Result<()> {
        if self.get(&skill.name).is_some() {
            return Err(Error::Skill(format!("duplicate skill name: {}", skill.name)));
        }
        self.skills.push(skill);
        Ok(())
    }

    /// All skills in load order
    #[must_use]
    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    /// Look up a skill by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.name == name)
    }

    /// Number of loaded skills
    #[must_use]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Whether no skills are loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Human-readable listing of every skill, intent, utterance and slot
    #[must_use]
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for skill in &self.skills {
            let _ = writeln!(out, "Skill '{}'", skill.name);
            for intent in skill.intents.values() {
                let _ = writeln!(out, "\tIntent '{}'", intent.name);
                for utterance in &intent.utterances {
                    let _ = writeln!(out, "\t\tUtterance '{}'", utterance.source());
                }
                for (slot, slot_type) in intent.slots.iter().flatten() {
                    let _ = writeln!(out, "\t\tSlot '{slot}': {}", slot_type.tag());
                }
            }
            for (slot_type, values) in &skill.custom_slots {
                let _ = writeln!(out, "\tCustom slot '{slot_type}'");
                for value in values {
                    let _ = writeln!(out, "\t\tSlot value '{value}'");
                }
            }
        }
        out
    }
}

/// Turn a manifest into a skill bound to `handler`
fn build_skill(manifest: &SkillManifest, handler: Arc<dyn SkillHandler>) -> Result<Skill> {
    let mut skill = Skill::new(manifest.name.clone(), handler);
    skill.custom_slots.clone_from(&manifest.custom_slots);

    for def in &manifest.schema.intents {
        if skill.intents.contains_key(&def.intent) {
            return Err(Error::Skill(format!(
                "{}: duplicate intent {}",
                manifest.name, def.intent
            )));
        }

        let slots = def.slots.as_ref().map(|slots| {
            slots
                .iter()
                .map(|s| (s.name.clone(), SlotType::parse(&s.slot_type)))
                .collect::<IndexMap<_, _>>()
        });

        let utterances = manifest
            .utterances
            .get(&def.intent)
            .map(|lines| lines.iter().map(|l| Template::parse(l)).collect())
            .unwrap_or_default();

        let intent = Intent {
            name: def.intent.clone(),
            slots,
            utterances,
            persist: def.persist,
        };

        for template in intent.unmatchable_templates() {
            tracing::warn!(
                skill = %manifest.name,
                intent = %intent.name,
                template = template.source(),
                "template references an undeclared slot and can never match"
            );
        }

        skill.intents.insert(def.intent.clone(), intent);
    }

    Ok(skill)
}
