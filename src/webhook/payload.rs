//! Defensive decoder over the semi-structured provider payload (spec §9
//! "Dynamic payloads"): extracts only the fields the adapter needs; the full
//! original JSON is always kept as-is in `Message::raw_payload` for
//! forensic use. Never panics on a missing or mis-shaped field.

use crate::models::MessageType;
use serde_json::Value;

pub struct ParsedMessageItem {
    pub message_id: Option<String>,
    pub remote_jid: Option<String>,
    pub from_me: bool,
    pub participant: Option<String>,
    pub push_name: Option<String>,
    pub message_type: MessageType,
    pub content: String,
    pub quoted_message_id: Option<String>,
    pub is_forwarded: bool,
    pub forwarding_score: i64,
    pub timestamp_raw: Option<Value>,
    pub reaction: Option<ParsedReaction>,
}

pub struct ParsedReaction {
    pub target_message_id: Option<String>,
    pub text: String,
}

fn get<'a>(v: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = v;
    for seg in path {
        cur = cur.get(seg)?;
    }
    Some(cur)
}

fn str_at(v: &Value, path: &[&str]) -> Option<String> {
    get(v, path).and_then(|x| x.as_str()).map(|s| s.to_string())
}

fn bool_at(v: &Value, path: &[&str]) -> bool {
    get(v, path).and_then(|x| x.as_bool()).unwrap_or(false)
}

/// Parses one entry of `messages.upsert`/`messages.update`'s `data`
/// (which may be a single object or, per provider quirks, wrapped in an
/// array — callers normalize that before calling this).
pub fn parse_message_item(item: &Value) -> ParsedMessageItem {
    let message_id = str_at(item, &["key", "id"]);
    let remote_jid = str_at(item, &["key", "remoteJid"]);
    let from_me = bool_at(item, &["key", "fromMe"]);
    let participant = str_at(item, &["key", "participant"]);
    let push_name = str_at(item, &["pushName"]);
    let timestamp_raw = get(item, &["messageTimestamp"]).cloned();

    let message = item.get("message");
    let reaction = message
        .and_then(|m| m.get("reactionMessage"))
        .map(|r| ParsedReaction {
            target_message_id: str_at(r, &["key", "id"]),
            text: r.get("text").and_then(|t| t.as_str()).unwrap_or("").to_string(),
        });

    let (message_type, content) = message.map(classify_message).unwrap_or((MessageType::Unsupported, String::new()));

    let quoted_message_id = message.and_then(|m| {
        str_at(m, &["extendedTextMessage", "contextInfo", "stanzaId"])
            .or_else(|| str_at(m, &["contextInfo", "stanzaId"]))
    });
    let is_forwarded = message
        .map(|m| {
            get(m, &["extendedTextMessage", "contextInfo", "isForwarded"])
                .and_then(|x| x.as_bool())
                .unwrap_or(false)
        })
        .unwrap_or(false);
    let forwarding_score = message
        .and_then(|m| get(m, &["extendedTextMessage", "contextInfo", "forwardingScore"]))
        .and_then(|x| x.as_i64())
        .unwrap_or(0);

    ParsedMessageItem {
        message_id,
        remote_jid,
        from_me,
        participant,
        push_name,
        message_type,
        content,
        quoted_message_id,
        is_forwarded,
        forwarding_score,
        timestamp_raw,
        reaction,
    }
}

/// Classifies the `message` container and extracts its text/caption. Checked
/// in a fixed order matching the provider's container precedence; an
/// unrecognized shape falls back to `Unsupported` with empty content.
fn classify_message(message: &Value) -> (MessageType, String) {
    if let Some(v) = message.get("conversation").and_then(|x| x.as_str()) {
        return (MessageType::Text, v.to_string());
    }
    if let Some(v) = str_at(message, &["extendedTextMessage", "text"]) {
        return (MessageType::Text, v);
    }
    if let Some(v) = str_at(message, &["imageMessage", "caption"]) {
        return (MessageType::Image, v);
    }
    if message.get("imageMessage").is_some() {
        return (MessageType::Image, String::new());
    }
    if let Some(v) = str_at(message, &["videoMessage", "caption"]) {
        return (MessageType::Video, v);
    }
    if message.get("videoMessage").is_some() {
        return (MessageType::Video, String::new());
    }
    if message.get("audioMessage").is_some() {
        return (MessageType::Audio, String::new());
    }
    if let Some(v) = str_at(message, &["documentMessage", "caption"]) {
        return (MessageType::Document, v);
    }
    if message.get("documentMessage").is_some() {
        return (MessageType::Document, String::new());
    }
    if message.get("stickerMessage").is_some() {
        return (MessageType::Sticker, String::new());
    }
    if message.get("locationMessage").is_some() {
        return (MessageType::Location, String::new());
    }
    if message.get("contactMessage").is_some() {
        return (MessageType::ContactCard, String::new());
    }
    if message.get("contactsArrayMessage").is_some() {
        return (MessageType::ContactCardMulti, String::new());
    }
    if message.get("orderMessage").is_some() {
        return (MessageType::Order, String::new());
    }
    if message.get("editedMessage").is_some() {
        return (MessageType::EditedMessage, String::new());
    }
    (MessageType::Unsupported, String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_text_message() {
        let item = json!({
            "key": {"id": "M1", "remoteJid": "52155@s.whatsapp.net", "fromMe": false},
            "pushName": "Fer",
            "message": {"conversation": "Buy milk"},
            "messageTimestamp": 1_700_000_000i64,
        });
        let parsed = parse_message_item(&item);
        assert_eq!(parsed.message_id.as_deref(), Some("M1"));
        assert_eq!(parsed.content, "Buy milk");
        assert!(matches!(parsed.message_type, MessageType::Text));
        assert!(parsed.reaction.is_none());
    }

    #[test]
    fn parses_reaction_container() {
        let item = json!({
            "key": {"id": "M2", "remoteJid": "g@g.us", "fromMe": false, "participant": "52155@s.whatsapp.net"},
            "message": {"reactionMessage": {"key": {"id": "M1"}, "text": "✅"}},
        });
        let parsed = parse_message_item(&item);
        let reaction = parsed.reaction.expect("reaction present");
        assert_eq!(reaction.target_message_id.as_deref(), Some("M1"));
        assert_eq!(reaction.text, "✅");
    }

    #[test]
    fn reaction_removal_has_empty_text() {
        let item = json!({
            "key": {"id": "M2", "remoteJid": "g@g.us"},
            "message": {"reactionMessage": {"key": {"id": "M1"}, "text": ""}},
        });
        let parsed = parse_message_item(&item);
        assert_eq!(parsed.reaction.unwrap().text, "");
    }
}
