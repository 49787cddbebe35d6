//! ID, timestamp, and reaction-field normalization (spec §4.2). Kept
//! separate from `mod.rs`'s event dispatch so these pure functions can be
//! unit-tested without a `Db`.

use serde_json::Value;

/// Canonical group-JID suffix. A chat JID ending in this is a group chat
/// (spec §3 Chat invariant: "type derived from suffix").
pub const GROUP_SUFFIX: &str = "@g.us";
pub const INDIVIDUAL_SUFFIX: &str = "@s.whatsapp.net";

/// A canonical JID carries an `@domain` suffix. Anything else — an internal
/// DB id, a bare phone number — is unresolvable and must not be
/// heuristically guessed at (spec §4.2 ID normalization).
pub fn is_canonical_jid(id: &str) -> bool {
    id.contains('@')
}

/// Timestamp policy (spec §4.2): numeric and > 10^12 is milliseconds,
/// > 10^9 is seconds, otherwise fall back to `now()`. Never emits an
/// invalid date.
pub fn normalize_timestamp(raw: Option<&Value>) -> String {
    let as_i64 = raw.and_then(|v| {
        if let Some(n) = v.as_i64() {
            Some(n)
        } else if let Some(s) = v.as_str() {
            s.parse::<i64>().ok()
        } else {
            v.as_f64().map(|f| f as i64)
        }
    });

    match as_i64 {
        Some(n) if n > 1_000_000_000_000 => chrono::DateTime::from_timestamp_millis(n)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        Some(n) if n > 1_000_000_000 => chrono::DateTime::from_timestamp(n, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        _ => chrono::Utc::now().to_rfc3339(),
    }
}

/// A message is from the instance owner iff `key.fromMe` is true OR
/// `sender_jid == instance.owner_jid` (spec §4.2 From-me detection).
pub fn is_from_me(key_from_me: bool, sender_jid: &str, owner_jid: Option<&str>) -> bool {
    key_from_me || owner_jid.is_some_and(|o| o == sender_jid)
}

/// Extract `reactor_jid` in priority order: `key.participant` -> an
/// explicit sender field -> `key.remoteJid` (spec §4.2 Reactions).
pub fn extract_reactor_jid<'a>(
    key_participant: Option<&'a str>,
    explicit_sender: Option<&'a str>,
    key_remote_jid: Option<&'a str>,
) -> Option<&'a str> {
    key_participant.or(explicit_sender).or(key_remote_jid)
}

/// Best-effort push-name synthesis for a sender contact the provider has not
/// yet sent a `contacts.upsert` for (spec §4.2 step 1: "synthesize from
/// push_name if API did not send a contacts event first").
pub fn push_name_or_synthetic(push_name: Option<&str>, jid: &str) -> String {
    match push_name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => jid.split('@').next().unwrap_or(jid).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_jid_requires_at_sign() {
        assert!(is_canonical_jid("5215555@s.whatsapp.net"));
        assert!(!is_canonical_jid("internal-db-id-123"));
    }

    #[test]
    fn timestamp_policy_ms_vs_seconds_vs_missing() {
        let ms = normalize_timestamp(Some(&Value::from(1_700_000_000_000i64)));
        assert!(ms.starts_with("2023-"));
        let secs = normalize_timestamp(Some(&Value::from(1_700_000_000i64)));
        assert!(secs.starts_with("2023-"));
        let missing = normalize_timestamp(None);
        assert!(!missing.is_empty());
    }

    #[test]
    fn from_me_by_flag_or_owner_match() {
        assert!(is_from_me(true, "a@s.whatsapp.net", None));
        assert!(is_from_me(false, "a@s.whatsapp.net", Some("a@s.whatsapp.net")));
        assert!(!is_from_me(false, "a@s.whatsapp.net", Some("b@s.whatsapp.net")));
    }

    #[test]
    fn reactor_jid_priority_order() {
        assert_eq!(
            extract_reactor_jid(Some("p@s.whatsapp.net"), Some("s@x"), Some("r@x")),
            Some("p@s.whatsapp.net")
        );
        assert_eq!(extract_reactor_jid(None, Some("s@x"), Some("r@x")), Some("s@x"));
        assert_eq!(extract_reactor_jid(None, None, Some("r@x")), Some("r@x"));
    }
}
