//! Outbound provider API (spec §6): `sendText` for confirmation/help
//! messages, `getBase64` for media fetch. Both are named only as interfaces
//! in spec.md's core scope — this crate supplies a thin `reqwest`-backed
//! implementation (mirroring the teacher's webhook dispatcher client: one
//! `reqwest::Client` with a fixed timeout, reused across calls) so the
//! executor's confirmation path and the conferencing substitution actually
//! run end to end.

use crate::config::AppConfig;
use crate::models::Instance;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned status {0}")]
    Status(u16),
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// One `reqwest::Client` reused across calls (the teacher's webhook
/// dispatcher does the same). Each instance carries its own `api_base_url`/
/// `api_key` (spec §3 Instance), so those are passed per call rather than
/// fixed at construction; only the outbound timeout is process-wide config.
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
}

impl ProviderClient {
    pub fn new(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.outbound_timeout)
            .build()
            .expect("reqwest client builds with static config");
        Self { http }
    }

    /// `POST {base}/message/sendText/{instance_name}` (spec §6). Used by the
    /// executor's confirmation/help messages — failures here are logged and
    /// never roll back the already-committed entity (spec §4.6, §5).
    pub async fn send_text(
        &self,
        instance: &Instance,
        number: &str,
        text: &str,
        quoted_message_id: Option<&str>,
    ) -> Result<(), ProviderError> {
        let mut body = json!({ "number": number, "textMessage": { "text": text } });
        if let Some(id) = quoted_message_id {
            body["options"] = json!({ "quoted": { "key": { "id": id } } });
        }
        let resp = self
            .http
            .post(format!("{}/message/sendText/{}", instance.api_base_url, instance.instance_id))
            .header("apikey", &instance.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }
        Ok(())
    }

    /// `POST {base}/group/fetchAllGroups/{instance_name}` — backs the
    /// `/admin/sync-groups/{instance}` reconciliation hook (spec §6 "minimal
    /// surface"). Named analogously to `sendText`/`getBase64` since spec.md
    /// only fixes those two outbound shapes explicitly; this one follows the
    /// same `{resource}/{action}/{instance_name}` convention.
    pub async fn fetch_groups(&self, instance: &Instance) -> Result<Vec<serde_json::Value>, ProviderError> {
        let resp = self
            .http
            .post(format!("{}/group/fetchAllGroups/{}", instance.api_base_url, instance.instance_id))
            .header("apikey", &instance.api_key)
            .query(&[("getParticipants", "false")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }
        let value: serde_json::Value = resp.json().await?;
        Ok(value.as_array().cloned().unwrap_or_default())
    }

    /// `POST {base}/chat/getBase64/{instance_name}` (spec §6) — media base64
    /// is not present in the inbound webhook, this fetches it separately.
    pub async fn get_base64(&self, instance: &Instance, message_id: &str) -> Result<String, ProviderError> {
        let body = json!({ "message": { "key": { "id": message_id } } });
        let resp = self
            .http
            .post(format!("{}/chat/getBase64/{}", instance.api_base_url, instance.instance_id))
            .header("apikey", &instance.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }
        let value: serde_json::Value = resp.json().await?;
        value
            .get("base64")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::Malformed("response missing base64 field".to_string()))
    }
}

/// The calendar executor's "external calendar collaborator" (spec §4.6):
/// calendar-provider integration is out of scope (spec §1), so this names
/// the seam as a trait and supplies a deterministic stub — the substitution
/// logic around the videocall sentinel is fully exercised without a real
/// conferencing integration.
pub trait ConferencingProvider: Send + Sync {
    fn generate_meeting_url(&self, room_scope: &str) -> String;
}

pub struct StubConferencingProvider;

impl ConferencingProvider for StubConferencingProvider {
    fn generate_meeting_url(&self, room_scope: &str) -> String {
        format!("https://meet.invalid/r/{room_scope}")
    }
}

/// Media download mechanics are out of scope (spec §1) beyond this
/// interface — no caller in this crate drives a download loop against it.
pub trait MediaFetcher: Send + Sync {
    fn media_endpoint(&self, instance: &Instance, message_id: &str) -> String;
}

impl MediaFetcher for ProviderClient {
    fn media_endpoint(&self, instance: &Instance, message_id: &str) -> String {
        format!("{}/chat/getBase64/{}?message={message_id}", instance.api_base_url, instance.instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_conferencing_url_is_deterministic() {
        let stub = StubConferencingProvider;
        assert_eq!(stub.generate_meeting_url("rule-1"), stub.generate_meeting_url("rule-1"));
        assert_ne!(stub.generate_meeting_url("rule-1"), stub.generate_meeting_url("rule-2"));
    }
}
