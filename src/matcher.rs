//! Intent matcher
//!
//! Maps free text onto an intent's utterance templates and extracts slot
//! values. Templates are tried in declared order; the first that fully
//! matches wins.
//!
//! Literal segments are located left to right in the input. Text between two
//! literal anchors (or after the last one) is captured for the pending slot,
//! then resolved word-prefix by word-prefix from the longest candidate down,
//! so multi-word values such as `new york city` beat their shorter prefixes.
//! Placeholders with only whitespace between them share one capture, split
//! at word boundaries.

use serde_json::Value;

use crate::resolver::EntityResolver;
use crate::skills::{Intent, Skill, SlotType, SlotValue, Slots, Template, Token};
use crate::text::normalize;

/// Match `input` against every template of `intent`
///
/// Returns the resolved slots of the first matching template, or `None`.
#[must_use]
pub fn match_intent(
    skill: &Skill,
    intent: &Intent,
    input: &str,
    resolver: &dyn EntityResolver,
) -> Option<Slots> {
    let input = normalize(input);
    intent
        .utterances
        .iter()
        .find_map(|template| match_template(skill, intent, template, &input, resolver))
}

fn match_template(
    skill: &Skill,
    intent: &Intent,
    template: &Template,
    input: &str,
    resolver: &dyn EntityResolver,
) -> Option<Slots> {
    if !template.has_slots() || intent.slots.is_none() {
        return (template.normalized() == input).then(Slots::new);
    }

    // Pad so literals with edge spaces anchor at the input boundaries too
    let padded = format!(" {input} ");
    let mut cursor = 0;
    let mut pending: Vec<&str> = Vec::new();
    let mut captured: Vec<(Vec<&str>, &str)> = Vec::new();

    for token in template.tokens() {
        match token {
            Token::Slot(name) => pending.push(name),
            Token::Literal(literal) => {
                let found = cursor + padded[cursor..].find(literal.as_str())?;
                if !pending.is_empty() {
                    captured.push((std::mem::take(&mut pending), &padded[cursor..found]));
                }
                cursor = found + literal.len();
            }
        }
    }
    if !pending.is_empty() {
        captured.push((pending, &padded[cursor..]));
    }

    let mut slots = Slots::new();
    for (names, span) in captured {
        let words: Vec<&str> = span.split_whitespace().collect();
        for (name, value) in split_capture(skill, intent, &names, &words, resolver)? {
            slots.insert(name.to_string(), SlotValue { value });
        }
    }
    Some(slots)
}

/// Share one capture between adjacent placeholders
///
/// Each placeholder but the last takes the longest word prefix that resolves
/// as a whole while leaving a word for every later one. The last resolves
/// like a lone capture.
fn split_capture<'a>(
    skill: &Skill,
    intent: &Intent,
    names: &[&'a str],
    words: &[&str],
    resolver: &dyn EntityResolver,
) -> Option<Vec<(&'a str, Value)>> {
    let (&name, rest) = names.split_first()?;
    let slot_type = intent.slot_type(name)?;

    if rest.is_empty() {
        let value = match_slot(skill, slot_type, &words.join(" "), resolver)?;
        return Some(vec![(name, value)]);
    }

    let longest = words.len().checked_sub(rest.len())?;
    (1..=longest).rev().find_map(|len| {
        let value = resolve(skill, slot_type, &normalize(&words[..len].join(" ")), resolver)?;
        let mut values = split_capture(skill, intent, rest, &words[len..], resolver)?;
        values.insert(0, (name, value));
        Some(values)
    })
}

/// Resolve the text captured for one slot
///
/// Word prefixes are tried from the whole span down to its first word. Each
/// candidate is looked up in the skill's vocabulary for the slot type, then
/// handed to the entity resolver for built-in types. Words past the winning
/// prefix are dropped. An empty span never resolves.
#[must_use]
pub fn match_slot(
    skill: &Skill,
    slot_type: &SlotType,
    span: &str,
    resolver: &dyn EntityResolver,
) -> Option<Value> {
    let words: Vec<&str> = span.split_whitespace().collect();

    (1..=words.len()).rev().find_map(|len| {
        resolve(skill, slot_type, &normalize(&words[..len].join(" ")), resolver)
    })
}

/// Look `candidate` up in the skill's vocabulary, then the entity resolver
fn resolve(
    skill: &Skill,
    slot_type: &SlotType,
    candidate: &str,
    resolver: &dyn EntityResolver,
) -> Option<Value> {
    if let Some(value) = skill.lookup_custom_slot_value(slot_type.tag(), candidate) {
        return Some(Value::String(value.to_string()));
    }
    match slot_type {
        SlotType::Builtin(builtin) => resolver.resolve(builtin, candidate),
        SlotType::Custom(_) => None,
    }
}
