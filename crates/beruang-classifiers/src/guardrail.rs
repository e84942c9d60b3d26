//! Keyword guardrail pre-filter (intent routing only)
//!
//! Cheap lexical check run before vectorization. Messages that open with a
//! complex question form and mention a finance or life-decision topic, or that
//! mention such a topic in a longer sentence, are escalated without ever
//! reaching the classifier.
//!
//! Matching is ASCII case-insensitive. Red-flag words must start a word and
//! may carry a plural suffix, so "car" fires on "cars" but not on "card" or
//! "scar", and "tax" fires on "taxes".

use crate::config::GuardrailConfig;
use aho_corasick::{AhoCorasick, Match};
use beruang_core::{Result, RoutingDecision};

/// Reason attached to every pre-filter escalation
pub const PREFILTER_REASON: &str = "Pre-filter: Complex query detected";

/// What the guardrail found in a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailMatch {
    /// Complex-starter phrase the message opens with
    pub starter: Option<String>,
    /// First red-flag word found
    pub red_flag: Option<String>,
    /// Whitespace-separated token count
    pub token_count: usize,
}

/// Keyword pre-filter over complex starters and red-flag topic words
pub struct KeywordGuardrail {
    starters: AhoCorasick,
    starter_patterns: Vec<String>,
    red_flags: AhoCorasick,
    red_flag_patterns: Vec<String>,
    min_tokens_with_red_flag: usize,
    escalation_label: String,
}

impl KeywordGuardrail {
    /// Build matchers from the configured phrase lists
    pub fn new(config: &GuardrailConfig, escalation_label: impl Into<String>) -> Result<Self> {
        let starter_patterns = normalize_patterns(&config.complex_starters);
        let red_flag_patterns = normalize_patterns(&config.red_flags);

        Ok(Self {
            starters: Self::build_matcher(&starter_patterns)?,
            starter_patterns,
            red_flags: Self::build_matcher(&red_flag_patterns)?,
            red_flag_patterns,
            min_tokens_with_red_flag: config.min_tokens_with_red_flag,
            escalation_label: escalation_label.into(),
        })
    }

    /// Build an Aho-Corasick matcher from patterns
    fn build_matcher(patterns: &[String]) -> Result<AhoCorasick> {
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(patterns)
            .map_err(|e| {
                beruang_core::Error::classifier(format!(
                    "Failed to build guardrail pattern matcher: {}",
                    e
                ))
            })
    }

    /// Collect starter and red-flag matches for `text`
    pub fn inspect(&self, text: &str) -> GuardrailMatch {
        let text = text.trim();

        // Overlapping search so "should i" still counts when "what should i"
        // is also configured, and so a boundary miss cannot hide a longer hit
        let starter = self
            .starters
            .find_overlapping_iter(text)
            .find(|m| m.start() == 0 && ends_on_boundary(text, m))
            .map(|m| self.starter_patterns[m.pattern().as_usize()].clone());

        let red_flag = self
            .red_flags
            .find_overlapping_iter(text)
            .find(|m| {
                let pattern = &self.red_flag_patterns[m.pattern().as_usize()];
                starts_on_boundary(text, m) && ends_on_word_or_plural(text, m, pattern)
            })
            .map(|m| self.red_flag_patterns[m.pattern().as_usize()].clone());

        GuardrailMatch {
            starter,
            red_flag,
            token_count: text.split_whitespace().count(),
        }
    }

    /// Escalate immediately when the message trips the guardrail
    pub fn prefilter(&self, text: &str) -> Option<RoutingDecision> {
        let found = self.inspect(text);
        let red_flag = found.red_flag.as_deref()?;

        let triggered =
            found.starter.is_some() || found.token_count > self.min_tokens_with_red_flag;
        if !triggered {
            return None;
        }

        tracing::debug!(
            starter = ?found.starter,
            red_flag,
            tokens = found.token_count,
            "Guardrail pre-filter escalation"
        );

        Some(RoutingDecision::escalated(
            &self.escalation_label,
            &self.escalation_label,
            1.0,
            vec![PREFILTER_REASON.to_string()],
        ))
    }
}

impl std::fmt::Debug for KeywordGuardrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordGuardrail")
            .field("starters", &self.starter_patterns.len())
            .field("red_flags", &self.red_flag_patterns.len())
            .field("min_tokens_with_red_flag", &self.min_tokens_with_red_flag)
            .finish()
    }
}

fn normalize_patterns(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

fn starts_on_boundary(text: &str, m: &Match) -> bool {
    text[..m.start()]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric())
}

fn ends_on_boundary(text: &str, m: &Match) -> bool {
    text[m.end()..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_alphanumeric())
}

/// The match ends the word, or the rest of the word is an English plural suffix
fn ends_on_word_or_plural(text: &str, m: &Match, pattern: &str) -> bool {
    let rest: String = text[m.end()..]
        .chars()
        .take_while(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();

    match rest.as_str() {
        "" | "s" => true,
        "es" => ["s", "x", "z", "ch", "sh"]
            .iter()
            .any(|ending| pattern.ends_with(ending)),
        _ => false,
    }
}
