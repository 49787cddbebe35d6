//! Bill parser (spec §4.5): extracts `vendor`, `amount`, `currency`,
//! `due_date`, `category`. Required fields: `vendor` and `amount`. A message
//! naming more than one vendor+amount pair produces a `multiple_bills`
//! result instead (spec §8 scenario: three vendor+amount pairs in one
//! message → one result of type `multiple_bills` with all three and the
//! correct total).

use super::{datetime, keywords, Language, ParseResult};
use crate::models::RuleConfig;
use chrono::Utc;
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\$|€|£|R\$)\s?(\d+(?:[.,]\d{1,2})?)|(\d+(?:[.,]\d{1,2})?)\s?(USD|EUR|GBP|BRL)").unwrap());

struct Extracted {
    vendor: String,
    amount: f64,
    currency: String,
}

fn split_segments(text: &str) -> Vec<&str> {
    text.split(|c: char| c == ',' || c == ';')
        .flat_map(|s| s.split(" y ").flat_map(|s| s.split(" and ").flat_map(|s| s.split(" e "))))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

fn extract_one(segment: &str, default_currency: Option<&str>) -> Option<Extracted> {
    let caps = AMOUNT_RE.captures(segment)?;
    // `currency` is the symbol/code actually found in the text; it only
    // falls back to the rule's configured default when the matched symbol
    // is not in the known table (spec §4.5 "rule-supplied defaults never
    // override parser-extracted values").
    let (amount_str, currency) = if let Some(sym) = caps.get(1) {
        let code = keywords::CURRENCY_SYMBOLS
            .iter()
            .find(|(s, _)| *s == sym.as_str())
            .map(|(_, c)| c.to_string())
            .unwrap_or_else(|| default_currency.unwrap_or("USD").to_string());
        (caps.get(2)?.as_str(), code)
    } else {
        (caps.get(3)?.as_str(), caps.get(4)?.as_str().to_string())
    };
    let amount: f64 = amount_str.replace(',', ".").parse().ok()?;
    let whole_match = caps.get(0)?;
    let vendor = clean_vendor(&segment[..whole_match.start()], &segment[whole_match.end()..]);
    if vendor.is_empty() {
        return None;
    }
    Some(Extracted { vendor, amount, currency })
}

fn clean_vendor(before: &str, after: &str) -> String {
    const STOPWORDS: &[&str] = &[
        "pagar", "pay", "the", "bill", "cuenta", "conta", "de", "of", "for", "para", "factura",
    ];
    let source = if !before.trim().is_empty() { before } else { after };
    source
        .split_whitespace()
        .filter(|w| !STOPWORDS.contains(&w.to_ascii_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

fn category_for(vendor: &str, lang: Language) -> Option<String> {
    let lower = vendor.to_ascii_lowercase();
    keywords::bill_category_keywords(lang)
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map(|(_, cat)| cat.to_string())
}

pub fn parse_bill(text: &str, lang: Language, config: &RuleConfig) -> ParseResult {
    let default_currency = config.default_currency.as_deref();
    let due_date = if config.force_today {
        Some(Utc::now().date_naive().to_string())
    } else {
        datetime::extract_date(text, lang, Utc::now()).map(|d| d.to_string())
    };

    let entries: Vec<Extracted> = split_segments(text)
        .into_iter()
        .filter_map(|seg| extract_one(seg, default_currency))
        .collect();

    if entries.is_empty() {
        return ParseResult {
            success: false,
            parse_type: "bill".to_string(),
            data: serde_json::Value::Null,
            confidence: 0.0,
            partial_data: Some(json!({ "due_date": due_date })),
            error: Some("no vendor/amount pair found".to_string()),
        };
    }

    if entries.len() > 1 {
        let total: f64 = entries.iter().map(|e| e.amount).sum();
        let bills: Vec<_> = entries
            .iter()
            .map(|e| {
                json!({
                    "vendor": e.vendor,
                    "amount": format!("{:.2}", e.amount),
                    "currency": e.currency,
                    "category": category_for(&e.vendor, lang),
                })
            })
            .collect();
        return ParseResult {
            success: true,
            parse_type: "multiple_bills".to_string(),
            data: json!({
                "bills": bills,
                "total": format!("{:.2}", total),
                "due_date": due_date,
            }),
            confidence: 0.8,
            partial_data: None,
            error: None,
        };
    }

    let entry = &entries[0];
    ParseResult {
        success: true,
        parse_type: "bill".to_string(),
        data: json!({
            "vendor": entry.vendor,
            "amount": format!("{:.2}", entry.amount),
            "currency": entry.currency,
            "due_date": due_date,
            "category": category_for(&entry.vendor, lang),
        }),
        confidence: if due_date.is_some() { 0.9 } else { 0.7 },
        partial_data: None,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bill_with_spanish_due_date() {
        let result = parse_bill("Pagar luz CFE $890 vence 15 enero", Language::Es, &RuleConfig::default());
        assert!(result.success);
        assert_eq!(result.parse_type, "bill");
        assert_eq!(result.data["amount"], "890.00");
        assert_eq!(result.data["category"], "utilities");
    }

    #[test]
    fn three_vendor_amount_pairs_produce_multiple_bills_with_correct_total() {
        let text = "Netflix $15, Spotify $10, internet $50";
        let result = parse_bill(text, Language::En, &RuleConfig::default());
        assert_eq!(result.parse_type, "multiple_bills");
        assert_eq!(result.data["bills"].as_array().unwrap().len(), 3);
        assert_eq!(result.data["total"], "75.00");
    }

    #[test]
    fn no_amount_fails_closed() {
        let result = parse_bill("pay the rent soon", Language::En, &RuleConfig::default());
        assert!(!result.success);
    }

    #[test]
    fn detected_currency_symbol_wins_over_rule_default() {
        let mut config = RuleConfig::default();
        config.default_currency = Some("MXN".to_string());
        let result = parse_bill("Netflix $15", Language::En, &config);
        assert_eq!(result.data["currency"], "USD");
    }
}
