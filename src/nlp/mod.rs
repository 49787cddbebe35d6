//! NLP Service (spec §4.5, component C5). Language detection, parser
//! dispatch, and structured extraction with confidence. Every parser
//! declares a minimum-fields policy; missing minimums produce
//! `success: false` with partial data and a localized error (spec §4.5
//! "Required-field policy").

mod bill;
mod calendar;
mod datetime;
pub mod keywords;
mod note;
mod task;

use crate::models::RuleConfig;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Instant;

static HASHTAG_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"#(\w+)").unwrap());

static MENTION_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"@(\w+)").unwrap());

/// Hashtags found in free text, lowercased, de-duplicated, in first-seen
/// order (spec §4.5 task parser "tags (hashtags in text)").
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut tags = Vec::new();
    for cap in HASHTAG_RE.captures_iter(text) {
        let tag = cap[1].to_ascii_lowercase();
        if seen.insert(tag.clone()) {
            tags.push(tag);
        }
    }
    tags
}

/// `@mention` tokens found in free text, de-duplicated, in first-seen order
/// (spec §4.5 task parser "assignee (mention tokens)", calendar parser
/// "attendees").
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut mentions = Vec::new();
    for cap in MENTION_RE.captures_iter(text) {
        let m = cap[1].to_string();
        if seen.insert(m.clone()) {
            mentions.push(m);
        }
    }
    mentions
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Es,
    Pt,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Pt => "pt",
        }
    }
}

/// `"auto"` or a pinned language (spec §4.5 `parse(... language|"auto" ...)`).
pub enum LanguageSelector {
    Auto,
    Fixed(Language),
}

impl LanguageSelector {
    pub fn parse(s: &str) -> Self {
        match s {
            "en" => LanguageSelector::Fixed(Language::En),
            "es" => LanguageSelector::Fixed(Language::Es),
            "pt" => LanguageSelector::Fixed(Language::Pt),
            _ => LanguageSelector::Auto,
        }
    }
}

/// Maps free-form detector output onto the closed set {en, es, pt},
/// defaulting to `en` (spec §4.5 Language detection). No third-party
/// detector is in this crate's dependency stack, so this is a deterministic
/// keyword-weighted heuristic over a small stopword/function-word list per
/// language — adequate for the short, informal chat text this service
/// parses, and fully unit-testable without network or model weights.
pub fn detect_language(text: &str) -> Language {
    let lower = text.to_ascii_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    if words.is_empty() {
        return Language::En;
    }

    let mut scores = [0i32; 3]; // en, es, pt
    for w in &words {
        let w = w.trim_matches(|c: char| !c.is_alphanumeric());
        if keywords::EN_MARKERS.contains(&w) {
            scores[0] += 1;
        }
        if keywords::ES_MARKERS.contains(&w) {
            scores[1] += 1;
        }
        if keywords::PT_MARKERS.contains(&w) {
            scores[2] += 1;
        }
    }

    if lower.contains('ñ') || lower.contains("¿") || lower.contains('¡') {
        scores[1] += 2;
    }
    if lower.contains('ã') || lower.contains('õ') || lower.contains('ç') {
        scores[2] += 2;
    }

    let max = scores.iter().max().copied().unwrap_or(0);
    if max == 0 {
        return Language::En;
    }
    if scores[1] == max && scores[1] > scores[0] {
        Language::Es
    } else if scores[2] == max && scores[2] > scores[0] {
        Language::Pt
    } else {
        Language::En
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseResult {
    pub success: bool,
    #[serde(rename = "type")]
    pub parse_type: String,
    pub data: serde_json::Value,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `parse(message_text, parser_type, language|"auto", rule_config)` (spec
/// §4.5). Every call emits a structured `tracing` log row (parser_type,
/// language, success, confidence, processing_ms) for analytics, whatever
/// the outcome.
pub fn parse(
    message_text: &str,
    parser_type: &str,
    language: LanguageSelector,
    rule_config: &RuleConfig,
) -> ParseResult {
    let started = Instant::now();
    let lang = match language {
        LanguageSelector::Fixed(l) => l,
        LanguageSelector::Auto => detect_language(message_text),
    };

    let result = match parser_type {
        "task" => task::parse_task(message_text, lang, rule_config),
        "calendar" => calendar::parse_calendar(message_text, lang, rule_config),
        "bill" => bill::parse_bill(message_text, lang, rule_config),
        "note" => note::parse_note(message_text, lang, rule_config),
        other => ParseResult {
            success: false,
            parse_type: other.to_string(),
            data: serde_json::Value::Null,
            confidence: 0.0,
            partial_data: None,
            error: Some(format!("unknown parser: {other}")),
        },
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        parser_type = parser_type,
        language = lang.as_str(),
        success = result.success,
        confidence = result.confidence,
        processing_ms = elapsed_ms,
        "nlp parse"
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_spanish_by_function_words() {
        assert_eq!(detect_language("Pagar luz CFE $890 vence 15 enero"), Language::Es);
    }

    #[test]
    fn detects_portuguese_by_function_words() {
        assert_eq!(detect_language("Pagar a conta de luz que vence amanhã"), Language::Pt);
    }

    #[test]
    fn defaults_to_english() {
        assert_eq!(detect_language("Buy milk tomorrow"), Language::En);
    }

    #[test]
    fn unknown_parser_fails_closed() {
        let result = parse("hello", "unknown", LanguageSelector::Fixed(Language::En), &RuleConfig::default());
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[test]
    fn extracts_and_dedupes_hashtags() {
        let tags = extract_hashtags("Buy milk #Shopping and bread #shopping #urgent");
        assert_eq!(tags, vec!["shopping".to_string(), "urgent".to_string()]);
    }

    #[test]
    fn no_hashtags_yields_empty_vec() {
        assert!(extract_hashtags("just a plain message").is_empty());
    }
}
