//! Command dispatcher
//!
//! Classifies a typed or recognized utterance into a [`Command`] without
//! executing it, so callers can check whether an utterance is actionable
//! before committing to it.

use crate::matcher::match_intent;
use crate::resolver::EntityResolver;
use crate::skills::{Catalog, Slots};
use crate::text::{humanize, normalize};

/// An actionable utterance
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `exit` / `quit`
    Exit,
    /// `help` / `list`
    ListSkills,
    /// `launch <skill>`
    Launch { skill: String },
    /// `grammar`
    ShowGrammar,
    /// `stop`
    Stop,
    /// A matched intent
    RunIntent {
        skill: String,
        intent: String,
        slots: Slots,
    },
}

/// Classify `text`
///
/// The first word selects a built-in command; anything else is matched
/// against the active skill's intents, then every persistent intent in
/// catalog order. Returns `None` when nothing applies.
#[must_use]
pub fn dispatch(
    catalog: &Catalog,
    active: Option<&str>,
    resolver: &dyn EntityResolver,
    text: &str,
) -> Option<Command> {
    let text = normalize(text);
    if text.is_empty() {
        return None;
    }
    let (first, rest) = text.split_once(' ').unwrap_or((text.as_str(), ""));

    match first {
        "exit" | "quit" => Some(Command::Exit),
        "help" | "list" => Some(Command::ListSkills),
        "launch" => catalog
            .skills()
            .iter()
            .find(|skill| rest == normalize(&skill.name) || rest == humanize(&skill.name))
            .map(|skill| Command::Launch {
                skill: skill.name.clone(),
            }),
        "grammar" => Some(Command::ShowGrammar),
        "stop" => Some(Command::Stop),
        _ => resolve_intent(catalog, active, resolver, &text),
    }
}

fn resolve_intent(
    catalog: &Catalog,
    active: Option<&str>,
    resolver: &dyn EntityResolver,
    text: &str,
) -> Option<Command> {
    let active_skill = active.and_then(|name| catalog.get(name));

    let active_intents = active_skill
        .into_iter()
        .flat_map(|skill| skill.intents.values().map(move |intent| (skill, intent)));
    let persistent_intents = catalog
        .skills()
        .iter()
        .flat_map(|skill| skill.persistent_intents().map(move |intent| (skill, intent)));

    active_intents
        .chain(persistent_intents)
        .find_map(|(skill, intent)| {
            match_intent(skill, intent, text, resolver).map(|slots| Command::RunIntent {
                skill: skill.name.clone(),
                intent: intent.name.clone(),
                slots,
            })
        })
}
