//! Text normalization applied to every transcription before it is stored or
//! forwarded to the LLM. Idempotent by construction: running it
//! twice must produce the same string as running it once.

use once_cell::sync::Lazy;
use regex::Regex;

// Capitalize the first letter after any run of whitespace following `.`,
// `!`, or `?`. Only matches a following lowercase ASCII letter, which is
// what makes a second pass a no-op.
static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?])(\s+)([a-z])").unwrap());
static IT_IS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bit is\b").unwrap());
static OKAY_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^okay\.\s*").unwrap());

pub fn apply(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let collapsed = collapse_duplicate_words(trimmed);
    let stripped = strip_leading_okay(&collapsed);
    let contracted = normalize_it_is(&stripped);
    capitalize_sentences(&contracted)
}

/// Collapses consecutive duplicate whole words (case-insensitive) into one,
/// keeping the casing of the first occurrence. The `regex` crate has no
/// backreferences, so this walks whitespace-split tokens by hand rather
/// than matching `(\w+)(\s+\1)+`.
fn collapse_duplicate_words(s: &str) -> String {
    let mut words: Vec<&str> = Vec::new();
    for word in s.split_whitespace() {
        let is_repeat = words.last().is_some_and(|prev| prev.eq_ignore_ascii_case(word));
        if !is_repeat {
            words.push(word);
        }
    }
    words.join(" ")
}

fn strip_leading_okay(s: &str) -> String {
    OKAY_PREFIX.replace(s, "").into_owned()
}

fn normalize_it_is(s: &str) -> String {
    IT_IS.replace_all(s, "It's").into_owned()
}

fn capitalize_sentences(s: &str) -> String {
    let mut out = SENTENCE_BOUNDARY
        .replace_all(s, |caps: &regex::Captures| {
            format!("{}{}{}", &caps[1], &caps[2], caps[3].to_uppercase())
        })
        .into_owned();
    capitalize_first(&mut out);
    out
}

fn capitalize_first(s: &mut String) {
    if let Some(c) = s.chars().next() {
        if !c.is_uppercase() {
            let upper: String = c.to_uppercase().collect();
            s.replace_range(0..c.len_utf8(), &upper);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_capitalizes() {
        assert_eq!(apply("  hello there  "), "Hello there");
    }

    #[test]
    fn collapses_duplicate_words() {
        assert_eq!(apply("foo foo bar"), "Foo bar");
    }

    #[test]
    fn normalizes_it_is_to_a_contraction() {
        assert_eq!(apply("It is cold"), "It's cold");
    }

    #[test]
    fn strips_leading_okay_and_recapitalizes() {
        assert_eq!(apply("Okay. hello"), "Hello");
    }

    #[test]
    fn capitalizes_after_sentence_boundaries() {
        assert_eq!(apply("hi there. how are you? fine."), "Hi there. How are you? Fine.");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(apply("   "), "");
    }

    #[test]
    fn is_idempotent_on_every_example() {
        for s in [
            "foo foo bar",
            "It is cold",
            "Okay. hello",
            "hi there. how are you? fine.",
            "",
            "already Capitalized. And Fine.",
        ] {
            let once = apply(s);
            let twice = apply(&once);
            assert_eq!(once, twice, "not idempotent for {s:?}");
        }
    }
}
