//! Calendar parser (spec §4.5): extracts `title`, `date_time`,
//! `duration_minutes`, `location`, `attendees`, `recurrence`. Required
//! fields: `title` and `date_time` — without a resolvable date the event
//! has nothing to anchor to, so this fails closed.

use super::{datetime, keywords, Language, ParseResult};
use crate::models::RuleConfig;
use chrono::Utc;
use serde_json::json;

pub fn parse_calendar(text: &str, lang: Language, config: &RuleConfig) -> ParseResult {
    let lower = text.to_ascii_lowercase();
    let now = Utc::now();

    let date = if config.force_today {
        Some(now.date_naive())
    } else {
        datetime::extract_date(text, lang, now)
    };
    let time = datetime::extract_time(text);

    let is_videocall = keywords::videocall_keywords(lang).iter().any(|kw| lower.contains(kw));

    let duration_minutes = config.default_duration_minutes.unwrap_or(30);

    let title = derive_title(text, is_videocall);

    let attendees = super::extract_mentions(text);

    let recurrence = keywords::recurrence_keywords(lang)
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map(|(_, r)| r.to_string())
        .or_else(|| config.recurrence_type.clone());

    let Some(date) = date else {
        return ParseResult {
            success: false,
            parse_type: "calendar".to_string(),
            data: serde_json::Value::Null,
            confidence: 0.0,
            partial_data: Some(json!({ "title": title })),
            error: Some("no date found for calendar event".to_string()),
        };
    };

    let date_time = datetime::combine(date, time);
    let confidence = if time.is_some() { 0.9 } else { 0.65 };

    ParseResult {
        success: true,
        parse_type: "calendar".to_string(),
        data: json!({
            "title": title,
            "date_time": date_time,
            "duration_minutes": duration_minutes,
            "location": if is_videocall { Some(keywords::VIDEOCALL_SENTINEL.to_string()) } else { None::<String> },
            "attendees": attendees,
            "recurrence": recurrence,
        }),
        confidence,
        partial_data: None,
        error: None,
    }
}

fn derive_title(text: &str, is_videocall: bool) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() && is_videocall {
        return "Video call".to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn videocall_keyword_sets_sentinel_location() {
        let result = parse_calendar("zoom with the team tomorrow at 3pm", Language::En, &RuleConfig::default());
        assert!(result.success);
        assert_eq!(result.data["location"], keywords::VIDEOCALL_SENTINEL);
    }

    #[test]
    fn missing_date_fails_closed() {
        let result = parse_calendar("team standup", Language::En, &RuleConfig::default());
        assert!(!result.success);
    }

    #[test]
    fn extracts_mentions_as_attendees() {
        let result = parse_calendar("standup with @fer and @ana tomorrow at 9am", Language::En, &RuleConfig::default());
        assert!(result.success);
        assert_eq!(result.data["attendees"], json!(["fer", "ana"]));
    }

    #[test]
    fn recurrence_keyword_overrides_rule_default() {
        let mut config = RuleConfig::default();
        config.recurrence_type = Some("yearly".to_string());
        let result = parse_calendar("standup every week tomorrow at 9am", Language::En, &config);
        assert_eq!(result.data["recurrence"], "weekly");
    }

    #[test]
    fn falls_back_to_rule_default_recurrence_when_no_keyword() {
        let mut config = RuleConfig::default();
        config.recurrence_type = Some("yearly".to_string());
        let result = parse_calendar("standup tomorrow at 9am", Language::En, &config);
        assert_eq!(result.data["recurrence"], "yearly");
    }
}
