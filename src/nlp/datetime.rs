//! Natural-language date/time extraction shared by the task, calendar, and
//! bill parsers (spec §4.5: "due_date (natural-language date/time
//! parsing)"). No date-parsing crate is present anywhere in this project's
//! retrieval pack, so this is a small deterministic extractor over a fixed
//! set of relative/absolute patterns per language — sufficient for the
//! short imperative phrases ("vence 15 enero", "tomorrow at 3pm") this
//! service actually sees, and exercised directly by unit tests rather than
//! a fuzz-scale date grammar.

use super::Language;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use regex::Regex;
use std::sync::LazyLock;

static MONTH_NAMES: LazyLock<Vec<(&'static str, u32)>> = LazyLock::new(|| {
    vec![
        ("january", 1), ("enero", 1), ("janeiro", 1),
        ("february", 2), ("febrero", 2), ("fevereiro", 2),
        ("march", 3), ("marzo", 3), ("março", 3),
        ("april", 4), ("abril", 4),
        ("may", 5), ("mayo", 5), ("maio", 5),
        ("june", 6), ("junio", 6), ("junho", 6),
        ("july", 7), ("julio", 7), ("julho", 7),
        ("august", 8), ("agosto", 8),
        ("september", 9), ("septiembre", 9), ("setembro", 9),
        ("october", 10), ("octubre", 10), ("outubro", 10),
        ("november", 11), ("noviembre", 11), ("novembro", 11),
        ("december", 12), ("diciembre", 12), ("dezembro", 12),
    ]
});

static DAY_MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})\s+(?:de\s+)?([a-zá-úã-õç]+)\b").unwrap());
static MONTH_DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([a-z]+)\s+(\d{1,2})(?:st|nd|rd|th)?\b").unwrap());
static NUMERIC_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b").unwrap());
static IN_N_DAYS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:in|en|em)\s+(\d+)\s+(?:days?|días?|dias?)\b").unwrap());
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b").unwrap());

fn relative_keywords(lang: Language) -> (&'static [&'static str], &'static [&'static str]) {
    match lang {
        Language::En => (&["today"], &["tomorrow"]),
        Language::Es => (&["hoy"], &["mañana", "manana"]),
        Language::Pt => (&["hoje"], &["amanhã", "amanha"]),
    }
}

fn weekday_names(lang: Language) -> [(&'static str, chrono::Weekday); 7] {
    use chrono::Weekday::*;
    match lang {
        Language::En => [
            ("monday", Mon), ("tuesday", Tue), ("wednesday", Wed), ("thursday", Thu),
            ("friday", Fri), ("saturday", Sat), ("sunday", Sun),
        ],
        Language::Es => [
            ("lunes", Mon), ("martes", Tue), ("miércoles", Wed), ("jueves", Thu),
            ("viernes", Fri), ("sábado", Sat), ("domingo", Sun),
        ],
        Language::Pt => [
            ("segunda", Mon), ("terça", Tue), ("quarta", Wed), ("quinta", Thu),
            ("sexta", Fri), ("sábado", Sat), ("domingo", Sun),
        ],
    }
}

/// Extracts a calendar date from free text, anchored to `now`. Returns
/// `None` when nothing recognizable is present.
pub fn extract_date(text: &str, lang: Language, now: DateTime<Utc>) -> Option<NaiveDate> {
    let lower = text.to_ascii_lowercase();
    let (today_kw, tomorrow_kw) = relative_keywords(lang);

    if tomorrow_kw.iter().any(|k| lower.contains(k)) {
        return Some((now + Duration::days(1)).date_naive());
    }
    if today_kw.iter().any(|k| lower.contains(k)) {
        return Some(now.date_naive());
    }
    if let Some(caps) = IN_N_DAYS_RE.captures(&lower) {
        let n: i64 = caps[1].parse().ok()?;
        return Some((now + Duration::days(n)).date_naive());
    }
    for (name, weekday) in weekday_names(lang) {
        if lower.contains(name) {
            return Some(next_weekday(now.date_naive(), weekday));
        }
    }
    if let Some(date) = extract_day_month(&lower, now) {
        return Some(date);
    }
    if let Some(caps) = NUMERIC_DATE_RE.captures(&lower) {
        let a: u32 = caps[1].parse().ok()?;
        let b: u32 = caps[2].parse().ok()?;
        let year = caps
            .get(3)
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .map(|y| if y < 100 { 2000 + y } else { y })
            .unwrap_or_else(|| now.year());
        // day/month order (CFE-style locales) for es/pt, month/day for en.
        let (day, month) = if lang == Language::En { (b, a) } else { (a, b) };
        return NaiveDate::from_ymd_opt(year, month, day)
            .map(|d| forward_date_if_past(d, now));
    }
    None
}

fn extract_day_month(lower: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    if let Some(caps) = DAY_MONTH_RE.captures(lower) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_from_name(&caps[2])?;
        let date = NaiveDate::from_ymd_opt(now.year(), month, day)?;
        return Some(forward_date_if_past(date, now));
    }
    if let Some(caps) = MONTH_DAY_RE.captures(lower) {
        let month = month_from_name(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(now.year(), month, day)?;
        return Some(forward_date_if_past(date, now));
    }
    None
}

fn month_from_name(name: &str) -> Option<u32> {
    MONTH_NAMES.iter().find(|(n, _)| *n == name).map(|(_, m)| *m)
}

/// "Forward-date policy" (spec §8 S4): a bare day+month with no year rolls
/// to next year if the resulting date has already passed this year.
fn forward_date_if_past(date: NaiveDate, now: DateTime<Utc>) -> NaiveDate {
    if date < now.date_naive() {
        NaiveDate::from_ymd_opt(date.year() + 1, date.month(), date.day()).unwrap_or(date)
    } else {
        date
    }
}

fn next_weekday(from: NaiveDate, target: chrono::Weekday) -> NaiveDate {
    let mut d = from;
    for _ in 0..7 {
        d = d.succ_opt().unwrap_or(d);
        if d.weekday() == target {
            return d;
        }
    }
    from
}

/// Extracts an hour:minute pair, defaulting to None when no clock time is
/// present (date-only texts are common, e.g. bill due dates).
pub fn extract_time(text: &str) -> Option<(u32, u32)> {
    for caps in TIME_RE.captures_iter(text) {
        let meridiem = caps.get(3).map(|m| m.as_str().to_ascii_lowercase());
        if meridiem.is_none() {
            continue; // bare numbers without am/pm are too ambiguous (could be a date).
        }
        let mut hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        if meridiem.as_deref() == Some("pm") && hour < 12 {
            hour += 12;
        }
        if meridiem.as_deref() == Some("am") && hour == 12 {
            hour = 0;
        }
        if hour < 24 && minute < 60 {
            return Some((hour, minute));
        }
    }
    None
}

/// Combines a date with an optional time into an RFC3339 timestamp.
/// Defaults to 09:00 when no time was extracted (a deterministic default
/// beats silently refusing to produce a `date_time`, which the calendar
/// parser requires — spec §4.5).
pub fn combine(date: NaiveDate, time: Option<(u32, u32)>) -> String {
    let (hour, minute) = time.unwrap_or((9, 0));
    let naive = date.and_hms_opt(hour, minute, 0).unwrap_or_else(|| date.and_hms_opt(9, 0, 0).unwrap());
    Utc.from_utc_datetime(&naive).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap()
    }

    #[test]
    fn extracts_tomorrow() {
        let d = extract_date("pay tomorrow", Language::En, now()).unwrap();
        assert_eq!(d, now().date_naive() + Duration::days(1));
    }

    #[test]
    fn extracts_spanish_day_month_forward_dated() {
        let d = extract_date("vence 15 enero", Language::Es, now()).unwrap();
        assert_eq!(d.month(), 1);
        assert_eq!(d.day(), 15);
        assert!(d.year() >= 2027); // Jan 15 has passed for a July anchor, rolls to next year.
    }

    #[test]
    fn extracts_time_with_meridiem() {
        assert_eq!(extract_time("call at 3pm"), Some((15, 0)));
        assert_eq!(extract_time("9:30am standup"), Some((9, 30)));
        assert_eq!(extract_time("no clock content"), None);
    }
}
