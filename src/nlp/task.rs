//! Task parser (spec §4.5): extracts `title`, `description`, `priority`,
//! `due_date`, `tags`, `assignee` from a free-text message. Required field:
//! `title` — anything else missing still yields a usable task with
//! rule-config defaults filling the gaps.

use super::{datetime, keywords, Language, ParseResult};
use crate::models::RuleConfig;
use chrono::Utc;
use serde_json::json;

pub fn parse_task(text: &str, lang: Language, config: &RuleConfig) -> ParseResult {
    let mut remaining = text.trim().to_string();
    for indicator in keywords::task_indicators(lang) {
        if remaining.to_ascii_lowercase().starts_with(indicator) {
            remaining = remaining[indicator.len()..].trim().to_string();
            break;
        }
    }

    let priority = keywords::priority_keywords(lang)
        .iter()
        .find(|(kw, _)| remaining.to_ascii_lowercase().contains(kw))
        .map(|(_, p)| p.to_string())
        .or_else(|| config.default_priority.clone())
        .unwrap_or_else(|| "medium".to_string());

    let due_date = if config.force_today {
        Some(Utc::now().date_naive().to_string())
    } else {
        datetime::extract_date(&remaining, lang, Utc::now()).map(|d| d.to_string())
    };

    let tags: Vec<String> = {
        let extracted = super::extract_hashtags(text);
        if extracted.is_empty() {
            config.default_tags.clone()
        } else {
            extracted
        }
    };

    let assignee = super::extract_mentions(text).into_iter().next();

    let mut lines = remaining.lines();
    let first_line = lines.next().unwrap_or("").trim().to_string();
    let description = lines.collect::<Vec<_>>().join("\n").trim().to_string();

    if first_line.is_empty() {
        return ParseResult {
            success: false,
            parse_type: "task".to_string(),
            data: serde_json::Value::Null,
            confidence: 0.0,
            partial_data: Some(json!({ "priority": priority, "due_date": due_date })),
            error: Some("no task title found in message".to_string()),
        };
    }
    let title = capitalize(&first_line);

    let confidence = if due_date.is_some() { 0.85 } else { 0.6 };

    ParseResult {
        success: true,
        parse_type: "task".to_string(),
        data: json!({
            "title": title,
            "description": description,
            "priority": priority,
            "due_date": due_date,
            "tags": tags,
            "assignee": assignee,
        }),
        confidence,
        partial_data: None,
        error: None,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_priority() {
        let result = parse_task("task: call the plumber urgent", Language::En, &RuleConfig::default());
        assert!(result.success);
        assert_eq!(result.data["priority"], "high");
        assert!(result.data["title"].as_str().unwrap().contains("plumber"));
    }

    #[test]
    fn empty_title_fails_with_partial_data() {
        let result = parse_task("todo:", Language::En, &RuleConfig::default());
        assert!(!result.success);
        assert!(result.partial_data.is_some());
    }

    #[test]
    fn hashtags_in_text_take_priority_over_rule_defaults() {
        let mut config = RuleConfig::default();
        config.default_tags = vec!["fallback".to_string()];
        let result = parse_task("task: call the plumber #home #urgent", Language::En, &config);
        assert_eq!(result.data["tags"], json!(["home", "urgent"]));
    }

    #[test]
    fn falls_back_to_rule_default_tags_when_no_hashtags() {
        let mut config = RuleConfig::default();
        config.default_tags = vec!["fallback".to_string()];
        let result = parse_task("task: call the plumber", Language::En, &config);
        assert_eq!(result.data["tags"], json!(["fallback"]));
    }

    #[test]
    fn force_today_overrides_extracted_date() {
        let mut config = RuleConfig::default();
        config.force_today = true;
        let result = parse_task("buy milk next monday", Language::En, &config);
        assert_eq!(result.data["due_date"], Utc::now().date_naive().to_string());
    }

    #[test]
    fn title_is_first_line_capitalized_and_rest_is_description() {
        let result = parse_task("task: call the plumber\nask about the leak in the kitchen", Language::En, &RuleConfig::default());
        assert!(result.success);
        assert_eq!(result.data["title"], "Call the plumber");
        assert_eq!(result.data["description"], "ask about the leak in the kitchen");
    }

    #[test]
    fn mention_token_becomes_assignee() {
        let result = parse_task("task: call the plumber @fer", Language::En, &RuleConfig::default());
        assert_eq!(result.data["assignee"], "fer");
    }
}
