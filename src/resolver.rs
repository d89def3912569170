//! Entity resolution for built-in slot types
//!
//! The matcher only depends on the [`EntityResolver`] trait. The
//! [`BuiltinResolver`] shipped here covers dates, numbers, US places and
//! first names with small built-in vocabularies.
//!
//! Known gaps: `AMAZON.TIME` only understands "now"/"today", and
//! `AMAZON.DURATION` is never resolved. Both return `None`, which makes the
//! template that uses them fail instead of producing a wrong value.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Prefix marking a built-in slot type tag
pub const BUILTIN_PREFIX: &str = "AMAZON.";

/// Built-in slot types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BuiltinSlot {
    Date,
    Time,
    Duration,
    Number,
    FourDigitNumber,
    UsCity,
    UsState,
    UsFirstName,
    Literal,
    /// A prefixed tag this resolver knows nothing about
    Unsupported(String),
}

impl BuiltinSlot {
    /// Parse a slot type tag, returning `None` for non-built-in tags
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        let name = tag.strip_prefix(BUILTIN_PREFIX)?;
        Some(match name {
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "DURATION" => Self::Duration,
            "NUMBER" => Self::Number,
            "FOUR_DIGIT_NUMBER" => Self::FourDigitNumber,
            "US_CITY" => Self::UsCity,
            "US_STATE" => Self::UsState,
            "US_FIRST_NAME" => Self::UsFirstName,
            "LITERAL" => Self::Literal,
            _ => Self::Unsupported(tag.to_string()),
        })
    }

    /// The full tag, e.g. `AMAZON.DATE`
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Date => "AMAZON.DATE",
            Self::Time => "AMAZON.TIME",
            Self::Duration => "AMAZON.DURATION",
            Self::Number => "AMAZON.NUMBER",
            Self::FourDigitNumber => "AMAZON.FOUR_DIGIT_NUMBER",
            Self::UsCity => "AMAZON.US_CITY",
            Self::UsState => "AMAZON.US_STATE",
            Self::UsFirstName => "AMAZON.US_FIRST_NAME",
            Self::Literal => "AMAZON.LITERAL",
            Self::Unsupported(tag) => tag,
        }
    }
}

/// Resolves text captured for a built-in slot into a value
pub trait EntityResolver: Send + Sync {
    /// Resolve `text` (already normalized) or return `None` if unresolved
    fn resolve(&self, slot: &BuiltinSlot, text: &str) -> Option<Value>;
}

/// Default resolver backed by small built-in vocabularies
#[derive(Debug, Clone, Default)]
pub struct BuiltinResolver {
    fixed_now: Option<NaiveDateTime>,
}

impl BuiltinResolver {
    /// Create a resolver that reads the local clock
    #[must_use]
    pub const fn new() -> Self {
        Self { fixed_now: None }
    }

    /// Create a resolver with a fixed notion of "now"
    #[must_use]
    pub const fn with_now(now: NaiveDateTime) -> Self {
        Self {
            fixed_now: Some(now),
        }
    }

    fn now(&self) -> NaiveDateTime {
        self.fixed_now.unwrap_or_else(|| Local::now().naive_local())
    }
}

impl EntityResolver for BuiltinResolver {
    fn resolve(&self, slot: &BuiltinSlot, text: &str) -> Option<Value> {
        let value = match slot {
            BuiltinSlot::Date => resolve_date(text, self.now().date()).map(Value::String),
            BuiltinSlot::Time => resolve_time(text, self.now()).map(Value::String),
            BuiltinSlot::Number => parse_number(text).and_then(number_value),
            BuiltinSlot::FourDigitNumber => (text.len() == 4
                && text.bytes().all(|b| b.is_ascii_digit()))
            .then(|| Value::String(text.to_string())),
            BuiltinSlot::UsCity => find_phrase(text, US_CITIES).map(Value::String),
            BuiltinSlot::UsState => find_phrase(text, US_STATES).map(Value::String),
            BuiltinSlot::UsFirstName => first_name(text).map(Value::String),
            BuiltinSlot::Literal => Some(Value::String(text.to_string())),
            BuiltinSlot::Duration | BuiltinSlot::Unsupported(_) => {
                tracing::trace!(slot = slot.tag(), "no resolution path for built-in slot type");
                None
            }
        };

        tracing::trace!(
            slot = slot.tag(),
            text,
            resolved = value.is_some(),
            "resolve built-in slot"
        );
        value
    }
}

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

const ORDINALS: &[&str] = &[
    "first",
    "second",
    "third",
    "fourth",
    "fifth",
    "sixth",
    "seventh",
    "eighth",
    "ninth",
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

/// Month number (1-based) for a full or three-letter month name
fn month_number(word: &str) -> Option<u32> {
    MONTHS
        .iter()
        .position(|m| *m == word || (word.len() == 3 && m.starts_with(word)))
        .and_then(|i| u32::try_from(i + 1).ok())
}

/// Day of month from an ordinal word or a `5`/`5th` style number
fn day_number(word: &str) -> Option<u32> {
    if let Some(i) = ORDINALS.iter().position(|o| *o == word) {
        return u32::try_from(i + 1).ok();
    }
    match word {
        "thirtieth" => return Some(30),
        "twenty" | "thirty" => return None,
        _ => {}
    }
    let digits = word.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let suffix = &word[digits.len()..];
    if !matches!(suffix, "" | "st" | "nd" | "rd" | "th") || digits.len() > 2 {
        return None;
    }
    digits.parse().ok().filter(|d| (1..=31).contains(d))
}

/// Resolve a date phrase into `YYYY`, `YYYY-MM` or `YYYY-MM-DD`
fn resolve_date(text: &str, today: NaiveDate) -> Option<String> {
    if matches!(text, "today" | "now") {
        return Some(today.format("%Y-%m-%d").to_string());
    }

    let words: Vec<&str> = text
        .split_whitespace()
        .map(|w| w.trim_matches(','))
        .filter(|w| !w.is_empty())
        .collect();

    let mut year = None;
    let mut month = None;
    let mut day = None;
    let mut i = 0;
    while i < words.len() {
        let word = words[i];
        i += 1;

        if matches!(word, "the" | "of" | "on") {
            continue;
        }
        if month.is_none() {
            if let Some(m) = month_number(word) {
                month = Some(m);
                continue;
            }
        }
        if day.is_none() {
            // "twenty first", "thirty first"
            let tens = match word {
                "twenty" => Some(20),
                "thirty" => Some(30),
                _ => None,
            };
            if let Some(tens) = tens {
                let unit = words.get(i).and_then(|w| day_number(w)).filter(|d| *d < 10);
                if let Some(unit) = unit {
                    i += 1;
                    day = Some(tens + unit);
                    continue;
                }
                if tens == 20 {
                    day = Some(20);
                    continue;
                }
                return None;
            }
            if let Some(d) = day_number(word) {
                day = Some(d);
                continue;
            }
        }
        if year.is_none() && word.len() == 4 {
            if let Ok(y) = word.parse::<i32>() {
                year = Some(y);
                continue;
            }
        }
        return None;
    }

    if year.is_none() && month.is_none() && day.is_none() {
        return None;
    }

    let year = year.unwrap_or_else(|| today.year());
    match (month, day) {
        (Some(m), Some(d)) => {
            NaiveDate::from_ymd_opt(year, m, d).map(|date| date.format("%Y-%m-%d").to_string())
        }
        (Some(m), None) => Some(format!("{year:04}-{m:02}")),
        (None, _) => Some(format!("{year:04}")),
    }
}

/// Resolve a time phrase; only "now"/"today" are understood
fn resolve_time(text: &str, now: NaiveDateTime) -> Option<String> {
    if matches!(text, "today" | "now") {
        return Some(now.format("%H:%M").to_string());
    }
    tracing::trace!(text, "time expressions other than now are unsupported");
    None
}

/// Parse digits or spelled-out English numbers
#[allow(clippy::cast_precision_loss)]
fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(n) = text.replace(',', "").parse::<f64>() {
        return n.is_finite().then_some(n);
    }

    let mut words = text
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|w| !w.is_empty())
        .peekable();

    let negative = matches!(words.peek(), Some(&("minus" | "negative")));
    if negative {
        words.next();
    }

    let mut total: u64 = 0;
    let mut current: u64 = 0;
    let mut seen = false;
    // No unit, teen or tens word yet in this hundreds group
    let mut fresh = true;
    let mut after_tens = false;
    while let Some(word) = words.next() {
        if let Some(n) = small_number(word) {
            // Units only start a group or follow a tens word
            if !(fresh || (after_tens && n < 10)) {
                return None;
            }
            current = current.checked_add(n)?;
            after_tens = n >= 20;
            fresh = false;
            seen = true;
            continue;
        }
        match word {
            "a" if matches!(words.peek(), Some(&("hundred" | "thousand" | "million"))) => {
                current = current.max(1);
                seen = true;
            }
            "and" if seen => {}
            "hundred" if current < 100 => {
                current = current.max(1).checked_mul(100)?;
                fresh = true;
                after_tens = false;
                seen = true;
            }
            "thousand" | "million" | "billion" => {
                let scale = match word {
                    "thousand" => 1_000,
                    "million" => 1_000_000,
                    _ => 1_000_000_000,
                };
                total = total.checked_add(current.max(1).checked_mul(scale)?)?;
                current = 0;
                fresh = true;
                after_tens = false;
                seen = true;
            }
            _ => return None,
        }
    }

    if !seen {
        return None;
    }
    let value = total.checked_add(current)? as f64;
    Some(if negative { -value } else { value })
}

fn small_number(word: &str) -> Option<u64> {
    const UNITS: &[&str] = &[
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
        "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
        "nineteen",
    ];
    const TENS: &[&str] = &[
        "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
    ];
    if let Some(i) = UNITS.iter().position(|u| *u == word) {
        return u64::try_from(i).ok();
    }
    TENS.iter()
        .position(|t| *t == word)
        .and_then(|i| u64::try_from((i + 2) * 10).ok())
}

/// Whole numbers become JSON integers, everything else a float
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number_value(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Some(Value::from(n as i64))
    } else {
        serde_json::Number::from_f64(n).map(Value::Number)
    }
}

/// Find the longest known phrase contained in `text` on word boundaries
fn find_phrase(text: &str, phrases: &[&str]) -> Option<String> {
    let padded = format!(" {text} ");
    phrases
        .iter()
        .filter(|p| padded.contains(&format!(" {p} ")))
        .max_by_key(|p| p.len())
        .map(|p| title_case(p))
}

/// First word of a name, capitalized
fn first_name(text: &str) -> Option<String> {
    let word = text.split_whitespace().next()?;
    word.chars()
        .all(|c| c.is_alphabetic() || c == '\'' || c == '-')
        .then(|| title_case(word))
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

const US_STATES: &[&str] = &[
    "alabama", "alaska", "arizona", "arkansas", "california", "colorado", "connecticut",
    "delaware", "florida", "georgia", "hawaii", "idaho", "illinois", "indiana", "iowa", "kansas",
    "kentucky", "louisiana", "maine", "maryland", "massachusetts", "michigan", "minnesota",
    "mississippi", "missouri", "montana", "nebraska", "nevada", "new hampshire", "new jersey",
    "new mexico", "new york", "north carolina", "north dakota", "ohio", "oklahoma", "oregon",
    "pennsylvania", "rhode island", "south carolina", "south dakota", "tennessee", "texas", "utah",
    "vermont", "virginia", "washington", "west virginia", "wisconsin", "wyoming",
    "district of columbia",
];

const US_CITIES: &[&str] = &[
    "new york", "new york city", "los angeles", "chicago", "houston", "phoenix", "philadelphia",
    "san antonio", "san diego", "dallas", "san jose", "austin", "jacksonville", "fort worth",
    "columbus", "charlotte", "san francisco", "indianapolis", "seattle", "denver", "washington",
    "boston", "el paso", "nashville", "detroit", "oklahoma city", "portland", "las vegas",
    "memphis", "louisville", "baltimore", "milwaukee", "albuquerque", "tucson", "fresno",
    "sacramento", "kansas city", "atlanta", "miami", "minneapolis", "new orleans", "cleveland",
    "tampa", "pittsburgh", "st louis", "salt lake city", "honolulu", "anchorage",
];
