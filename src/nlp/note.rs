//! Note parser (spec §4.5): the simplest parser — extracts `title` and
//! `content` with no required structure beyond non-empty text. Required
//! field: `content`.

use super::{Language, ParseResult};
use crate::models::RuleConfig;
use serde_json::json;

pub fn parse_note(text: &str, _lang: Language, config: &RuleConfig) -> ParseResult {
    let content = text.trim().to_string();

    if content.is_empty() {
        return ParseResult {
            success: false,
            parse_type: "note".to_string(),
            data: serde_json::Value::Null,
            confidence: 0.0,
            partial_data: None,
            error: Some("empty message has no note content".to_string()),
        };
    }

    let derived_title = first_line_title(&content);
    let title = if derived_title.is_empty() {
        config.default_title.clone().unwrap_or(derived_title)
    } else {
        derived_title
    };
    let tags = config.default_tags.clone();

    ParseResult {
        success: true,
        parse_type: "note".to_string(),
        data: json!({
            "title": title,
            "content": content,
            "tags": tags,
        }),
        confidence: 0.95,
        partial_data: None,
        error: None,
    }
}

fn first_line_title(content: &str) -> String {
    let line = content.lines().next().unwrap_or(content);
    if line.len() > 60 {
        format!("{}…", &line[..60])
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_first_line_as_title_by_default() {
        let result = parse_note("Remember to water the plants\nand feed the cat", Language::En, &RuleConfig::default());
        assert!(result.success);
        assert_eq!(result.data["title"], "Remember to water the plants");
    }

    #[test]
    fn empty_message_fails() {
        let result = parse_note("   ", Language::En, &RuleConfig::default());
        assert!(!result.success);
    }

    #[test]
    fn derived_title_takes_priority_over_rule_default() {
        let mut config = RuleConfig::default();
        config.default_title = Some("Fallback title".to_string());
        let result = parse_note("Buy groceries for the week", Language::En, &config);
        assert_eq!(result.data["title"], "Buy groceries for the week");
    }
}
