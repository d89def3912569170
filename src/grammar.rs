//! Grammar compiler
//!
//! Builds a JSGF grammar describing every phrase the engine can act on in
//! the current context. Rules are assembled as [`Expansion`] trees first and
//! filtered against the decoder's vocabulary before rendering: unknown words
//! drop the alternative that holds them, a rule left with no alternatives is
//! omitted, and references to omitted rules drop in turn.

use std::collections::HashSet;
use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::resolver::BuiltinSlot;
use crate::skills::{Catalog, Intent, Skill, SlotType, Token};
use crate::text::{humanize, normalize};

/// Grammar name, also the prefix of engine-owned rules
pub const GRAMMAR_NAME: &str = "ferris";

const RESERVED: &[char] = &[
    ';', '=', '|', '*', '+', '<', '>', '(', ')', '[', ']', '{', '}', '/', '"', '\\',
];

const DAY_SINGLE: &[&str] = &[
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth",
];

const DAY_OTHER: &[&str] = &[
    "tenth",
    "eleventh",
    "twelfth",
    "thirteenth",
    "fourteenth",
    "fifteenth",
    "sixteenth",
    "seventeenth",
    "eighteenth",
    "nineteenth",
    "twentieth",
];

const MONTHS: &[&str] = &[
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const DIGITS: &[&str] = &[
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

const TEENS: &[&str] = &[
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];

const TENS: &[&str] = &[
    "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

/// Word membership test against the decoder's dictionary
pub trait Vocabulary {
    /// Whether the decoder can recognize `word`
    fn contains(&self, word: &str) -> bool;
}

impl<F> Vocabulary for F
where
    F: Fn(&str) -> bool,
{
    fn contains(&self, word: &str) -> bool {
        self(word)
    }
}

/// Vocabulary that accepts every word
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyWord;

impl Vocabulary for AnyWord {
    fn contains(&self, _word: &str) -> bool {
        true
    }
}

/// Out-of-vocabulary words already reported
///
/// Lives as long as the engine so repeated compilations warn once per word.
#[derive(Debug, Default, Clone)]
pub struct WarnedWords {
    seen: HashSet<String>,
}

impl WarnedWords {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an unknown word, warning the first time it is seen
    pub fn report(&mut self, word: &str) {
        if self.seen.insert(word.to_string()) {
            tracing::warn!(word, "word not in decoder dictionary, dropping from grammar");
        }
    }

    /// Whether `word` has been reported
    #[must_use]
    pub fn contains(&self, word: &str) -> bool {
        self.seen.contains(word)
    }

    /// Number of distinct words reported
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been reported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Session state the grammar depends on
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    /// Name of the active skill, if any
    pub active_skill: Option<&'a str>,
    /// Whether exit/quit/list/grammar are offered
    pub enable_builtins: bool,
}

/// Right-hand side of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    Word(String),
    Ref(String),
    Seq(Vec<Expansion>),
    Opt(Box<Expansion>),
    Alt(Vec<Expansion>),
}

impl Expansion {
    /// Words of `text`, normalized, as a sequence
    #[must_use]
    pub fn phrase(text: &str) -> Self {
        let mut words: Vec<Self> = normalize(text)
            .split(' ')
            .filter(|w| !w.is_empty())
            .map(|w| Self::Word(w.to_string()))
            .collect();
        if words.len() == 1 {
            words.remove(0)
        } else {
            Self::Seq(words)
        }
    }

    fn words(words: &[&str]) -> Vec<Self> {
        words.iter().map(|w| Self::Word((*w).to_string())).collect()
    }

    fn reference(name: &str) -> Self {
        Self::Ref(name.to_string())
    }

    fn optional(inner: Self) -> Self {
        Self::Opt(Box::new(inner))
    }
}

/// Compile the awake grammar for `catalog` in `ctx`
///
/// Output depends only on the catalog, the context and the vocabulary.
pub fn compile(
    catalog: &Catalog,
    ctx: CompileContext<'_>,
    vocab: &dyn Vocabulary,
    warned: &mut WarnedWords,
) -> String {
    let mut builder = Builder::new(vocab, warned);

    let command = rule_name(&[GRAMMAR_NAME, "command"]);
    let commands: &[&str] = if ctx.enable_builtins {
        &["exit", "quit", "help", "list", "grammar", "stop"]
    } else {
        &["help", "stop"]
    };
    builder.define(&command, Expansion::Alt(Expansion::words(commands)));

    builder.define_builtin_slots();

    let mut public = vec![Expansion::Ref(command)];
    if ctx.active_skill.is_none() {
        let launcher = rule_name(&[GRAMMAR_NAME, "launcher"]);
        builder.define(
            &launcher,
            Expansion::Alt(
                catalog
                    .skills()
                    .iter()
                    .map(|skill| {
                        Expansion::Seq(vec![
                            Expansion::Word("launch".to_string()),
                            Expansion::phrase(&humanize(&skill.name)),
                        ])
                    })
                    .collect(),
            ),
        );
        public.push(Expansion::Ref(launcher));
    }

    for skill in catalog.skills() {
        for (type_name, values) in &skill.custom_slots {
            builder.define(
                &rule_name(&[&skill.name, type_name]),
                Expansion::Alt(values.iter().map(|v| Expansion::phrase(v)).collect()),
            );
        }

        let active = ctx.active_skill == Some(skill.name.as_str());
        for intent in skill.intents.values() {
            if !active && !intent.persist {
                continue;
            }
            let name = rule_name(&[&skill.name, &intent.name]);
            builder.define(&name, intent_expansion(skill, intent));
            public.push(Expansion::Ref(name));
        }
    }

    let public_name = rule_name(&[GRAMMAR_NAME, "input"]);
    builder.define_public(&public_name, Expansion::Alt(public));
    builder.render()
}

/// Compile the grammar used while asleep: just the wake phrase
pub fn compile_asleep(
    wake_phrase: &str,
    vocab: &dyn Vocabulary,
    warned: &mut WarnedWords,
) -> String {
    let mut builder = Builder::new(vocab, warned);
    builder.define_public(
        &rule_name(&[GRAMMAR_NAME, "wake"]),
        Expansion::phrase(wake_phrase),
    );
    builder.render()
}

/// One alternative per utterance template, slots replaced by rule references
fn intent_expansion(skill: &Skill, intent: &Intent) -> Expansion {
    let alternatives = intent
        .utterances
        .iter()
        .filter_map(|template| {
            let mut items = Vec::new();
            for token in template.tokens() {
                match token {
                    Token::Literal(text) => match Expansion::phrase(text) {
                        Expansion::Seq(words) => items.extend(words),
                        word => items.push(word),
                    },
                    Token::Slot(name) => items.push(slot_reference(skill, intent.slot_type(name)?)),
                }
            }
            Some(Expansion::Seq(items))
        })
        .collect();
    Expansion::Alt(alternatives)
}

fn slot_reference(skill: &Skill, slot_type: &SlotType) -> Expansion {
    match slot_type {
        SlotType::Builtin(builtin) if !skill.custom_slots.contains_key(builtin.tag()) => {
            Expansion::Ref(builtin.tag().to_string())
        }
        other => Expansion::Ref(rule_name(&[&skill.name, other.tag()])),
    }
}

fn rule_name(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| {
            part.chars()
                .map(|c| if c.is_whitespace() || RESERVED.contains(&c) { '_' } else { c })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(".")
}

struct Builder<'a> {
    vocab: &'a dyn Vocabulary,
    warned: &'a mut WarnedWords,
    rules: IndexMap<String, Expansion>,
    public: Option<(String, Expansion)>,
}

impl<'a> Builder<'a> {
    fn new(vocab: &'a dyn Vocabulary, warned: &'a mut WarnedWords) -> Self {
        Self {
            vocab,
            warned,
            rules: IndexMap::new(),
            public: None,
        }
    }

    fn define(&mut self, name: &str, body: Expansion) {
        match self.filter(body) {
            Some(body) => {
                self.rules.insert(name.to_string(), body);
            }
            None => tracing::debug!(rule = name, "grammar rule empty, omitted"),
        }
    }

    fn define_public(&mut self, name: &str, body: Expansion) {
        match self.filter(body) {
            Some(body) => self.public = Some((name.to_string(), body)),
            None => tracing::warn!(rule = name, "public grammar rule empty"),
        }
    }

    fn define_builtin_slots(&mut self) {
        let day_single = rule_name(&[GRAMMAR_NAME, "dateDaySingle"]);
        let day = rule_name(&[GRAMMAR_NAME, "dateDay"]);
        let month = rule_name(&[GRAMMAR_NAME, "dateMonth"]);

        self.define(&day_single, Expansion::Alt(Expansion::words(DAY_SINGLE)));

        let mut days = vec![Expansion::reference(&day_single)];
        days.extend(Expansion::words(DAY_OTHER));
        days.push(Expansion::Seq(vec![
            Expansion::Word("twenty".to_string()),
            Expansion::reference(&day_single),
        ]));
        days.push(Expansion::Word("thirtieth".to_string()));
        days.push(Expansion::phrase("thirty first"));
        self.define(&day, Expansion::Alt(days));

        self.define(&month, Expansion::Alt(Expansion::words(MONTHS)));

        self.define(
            BuiltinSlot::Date.tag(),
            Expansion::Alt(vec![
                Expansion::Word("today".to_string()),
                Expansion::Seq(vec![
                    Expansion::optional(Expansion::Word("the".to_string())),
                    Expansion::reference(&day),
                    Expansion::optional(Expansion::Word("of".to_string())),
                    Expansion::reference(&month),
                ]),
                Expansion::Seq(vec![
                    Expansion::reference(&month),
                    Expansion::optional(Expansion::Word("the".to_string())),
                    Expansion::reference(&day),
                ]),
            ]),
        );

        let digit = rule_name(&[GRAMMAR_NAME, "numberDigit"]);
        let small = rule_name(&[GRAMMAR_NAME, "numberSmall"]);

        self.define(&digit, Expansion::Alt(Expansion::words(DIGITS)));

        let mut smalls = vec![Expansion::Word("zero".to_string()), Expansion::reference(&digit)];
        smalls.extend(Expansion::words(TEENS));
        smalls.push(Expansion::Seq(vec![
            Expansion::Alt(Expansion::words(TENS)),
            Expansion::optional(Expansion::reference(&digit)),
        ]));
        self.define(&small, Expansion::Alt(smalls));

        self.define(
            BuiltinSlot::Number.tag(),
            Expansion::Seq(vec![
                Expansion::optional(Expansion::Word("minus".to_string())),
                Expansion::reference(&small),
                Expansion::optional(Expansion::Seq(vec![
                    Expansion::Word("hundred".to_string()),
                    Expansion::optional(Expansion::Seq(vec![
                        Expansion::optional(Expansion::Word("and".to_string())),
                        Expansion::reference(&small),
                    ])),
                ])),
            ]),
        );
    }

    fn filter(&mut self, expansion: Expansion) -> Option<Expansion> {
        match expansion {
            Expansion::Word(word) => {
                if !word.contains(RESERVED) && self.vocab.contains(&word) {
                    Some(Expansion::Word(word))
                } else {
                    self.warned.report(&word);
                    None
                }
            }
            Expansion::Ref(name) => self.rules.contains_key(&name).then_some(Expansion::Ref(name)),
            Expansion::Opt(inner) => self.filter(*inner).map(Expansion::optional),
            Expansion::Seq(items) => {
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        // A dropped optional part leaves the sequence intact
                        Expansion::Opt(inner) => {
                            if let Some(inner) = self.filter(*inner) {
                                kept.push(Expansion::optional(inner));
                            }
                        }
                        required => kept.push(self.filter(required)?),
                    }
                }
                if kept.iter().all(|e| matches!(e, Expansion::Opt(_))) {
                    return None;
                }
                Some(if kept.len() == 1 {
                    kept.remove(0)
                } else {
                    Expansion::Seq(kept)
                })
            }
            Expansion::Alt(alternatives) => {
                let mut kept: Vec<_> = alternatives
                    .into_iter()
                    .filter_map(|alt| self.filter(alt))
                    .collect();
                match kept.len() {
                    0 => None,
                    1 => Some(kept.remove(0)),
                    _ => Some(Expansion::Alt(kept)),
                }
            }
        }
    }

    fn render(self) -> String {
        let mut out = format!("#JSGF V1.0;\ngrammar {GRAMMAR_NAME};\n\n");
        for (name, body) in &self.rules {
            let _ = writeln!(out, "<{name}> = {} ;", render_body(body));
        }
        if let Some((name, body)) = &self.public {
            if !self.rules.is_empty() {
                out.push('\n');
            }
            let _ = writeln!(out, "public <{name}> = ( {} ) ;", render_body(body));
        }
        out
    }
}

fn render_body(body: &Expansion) -> String {
    match body {
        Expansion::Alt(alternatives) => alternatives
            .iter()
            .map(|alt| match alt {
                Expansion::Seq(_) => format!("( {} )", render(alt)),
                other => render(other),
            })
            .collect::<Vec<_>>()
            .join(" | "),
        other => render(other),
    }
}

fn render(expansion: &Expansion) -> String {
    match expansion {
        Expansion::Word(word) => word.clone(),
        Expansion::Ref(name) => format!("<{name}>"),
        Expansion::Seq(items) => items.iter().map(render).collect::<Vec<_>>().join(" "),
        Expansion::Opt(inner) => format!("[ {} ]", render(inner)),
        Expansion::Alt(alternatives) => format!(
            "( {} )",
            alternatives.iter().map(render).collect::<Vec<_>>().join(" | ")
        ),
    }
}
