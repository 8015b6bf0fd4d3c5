//! Archetype classifier
//!
//! Maps a loop's intent text to one of the fixed archetypes with an ordered
//! rule table. The first archetype with a matching trigger wins, so overlapping
//! vocabulary ("add a test") resolves deterministically by priority.
//!
//! Triggers match case-insensitively at word starts. A trigger shorter than four
//! characters only tolerates a plain inflection (`fix` matches "fixes" and
//! "fixing" but not "fixture"); longer triggers act as stems (`investigat`
//! matches "investigate" and "investigating").

use crate::domain::{Archetype, LoopIntent};

/// Ordered `(archetype, triggers)` table; earlier rows take precedence
pub const RULES: &[(Archetype, &[&str])] = &[
    (
        Archetype::DebugRemediate,
        &[
            "debug", "fix", "bug", "crash", "error", "failur", "failing", "remediat", "regression", "broken",
            "hotfix", "repair",
        ],
    ),
    (
        Archetype::ValidateVerify,
        &["validat", "verif", "test", "check", "audit", "assert", "confirm", "review"],
    ),
    (
        Archetype::Refactor,
        &[
            "refactor", "restructur", "clean up", "cleanup", "reorganiz", "reorganis", "rename", "simplif",
            "decoupl",
        ],
    ),
    (
        Archetype::Optimize,
        &[
            "optimi", "speed up", "performance", "faster", "latency", "throughput", "tune", "tuning", "profil",
        ],
    ),
    (
        Archetype::Explore,
        &[
            "explor", "investigat", "research", "survey", "prototyp", "spike", "analy", "discover",
        ],
    ),
    (
        Archetype::Implement,
        &["implement", "build", "add", "creat", "feature", "develop", "write", "introduc"],
    ),
];

const SHORT_TRIGGER_SUFFIXES: &[&str] = &["", "s", "es", "ed", "ing"];

/// Classify a loop intent. Total: falls back to `Unknown`.
pub fn classify(intent: &LoopIntent) -> Archetype {
    classify_text(intent.description())
}

/// Classify free text against the rule table
pub fn classify_text(text: &str) -> Archetype {
    let words = tokenize(text);
    RULES
        .iter()
        .find(|(_, triggers)| triggers.iter().any(|t| phrase_matches(&words, t)))
        .map(|(archetype, _)| *archetype)
        .unwrap_or(Archetype::Unknown)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn word_matches(word: &str, trigger: &str) -> bool {
    match word.strip_prefix(trigger) {
        Some(rest) => trigger.len() >= 4 || SHORT_TRIGGER_SUFFIXES.contains(&rest),
        None => false,
    }
}

fn phrase_matches(words: &[String], trigger: &str) -> bool {
    let parts: Vec<&str> = trigger.split_whitespace().collect();
    if parts.is_empty() || parts.len() > words.len() {
        return false;
    }
    words
        .windows(parts.len())
        .any(|window| window.iter().zip(&parts).all(|(w, t)| word_matches(w, t)))
}
