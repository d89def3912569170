//! Text normalization shared by the matcher, grammar compiler and dispatcher

/// Collapse whitespace runs, lowercase and trim
#[must_use]
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a `CamelCase` identifier as natural speech
///
/// A space is inserted before every internal capital, then the result is
/// normalized: `HelloWorld` → `hello world`.
#[must_use]
pub fn humanize(identifier: &str) -> String {
    let mut spaced = String::with_capacity(identifier.len() + 4);
    for (i, c) in identifier.chars().enumerate() {
        if i > 0 && c.is_uppercase() {
            spaced.push(' ');
        }
        spaced.push(c);
    }
    normalize(&spaced)
}

/// Lowercase and collapse whitespace runs, keeping a single boundary space
///
/// Template literals keep their edge spaces so they anchor on word
/// boundaries when searched for inside an utterance.
#[must_use]
pub fn normalize_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.extend(c.to_lowercase());
            in_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_lowercases() {
        assert_eq!(normalize("  Book   a TABLE\tfor two "), "book a table for two");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn humanize_splits_every_capital() {
        assert_eq!(humanize("HelloWorld"), "hello world");
        assert_eq!(humanize("MyTrainTimes"), "my train times");
        assert_eq!(humanize("Weather"), "weather");
        assert_eq!(humanize("weather"), "weather");
    }

    #[test]
    fn literal_keeps_edge_spaces() {
        assert_eq!(normalize_literal("Book a  table for "), "book a table for ");
        assert_eq!(normalize_literal(" People"), " people");
    }
}
