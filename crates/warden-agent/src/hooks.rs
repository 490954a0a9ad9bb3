//! Host hook vocabulary.
//!
//! These are the payloads the extension forwards over the bridge and the
//! decisions the agent answers with. Names abstract over the concrete
//! browser API: the pre-start hook fires before the host finalizes a
//! download's destination, the created hook once a download object exists.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Host-assigned download identifier, transient across restarts.
pub type DownloadId = i64;

/// Host-assigned tab identifier.
pub type TabId = i64;

/// Payload of the pre-start hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreStartEvent {
    pub id: DownloadId,
    /// URL the download was requested from.
    pub source_url: String,
    /// Post-redirect URL, when the host already knows it.
    #[serde(default)]
    pub resolved_url: Option<String>,
    /// Host-proposed destination filename.
    pub file_name: String,
    #[serde(default)]
    pub mime: Option<String>,
}

impl PreStartEvent {
    /// The URL scans and reinitiations target: resolved if known.
    pub fn effective_url(&self) -> &str {
        self.resolved_url.as_deref().unwrap_or(&self.source_url)
    }
}

/// Payload of the post-creation hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub id: DownloadId,
    pub url: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Host-reported download state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadChange {
    InProgress,
    Complete,
    Interrupted,
}

/// Payload of the changed hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedEvent {
    pub id: DownloadId,
    pub change: DownloadChange,
}

/// Payload of a committed top-level navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEvent {
    pub tab_id: TabId,
    pub url: String,
}

/// The decision delivered through a withheld pre-start reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum HookDecision {
    /// Let the download proceed, optionally supplying the filename.
    #[serde(rename_all = "camelCase")]
    Allow {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
    /// Prevent the download outright.
    Deny,
}

/// Answer to the pre-start hook.
#[derive(Debug)]
pub enum PreStartReply {
    /// Decided without scanning.
    Immediate(HookDecision),
    /// Decision withheld; resolves when a verdict or user response arrives.
    /// The sender side is the record's approval token — if it is dropped or
    /// outlives the host deadline, the receiver errs and the host proceeds
    /// on its own (the created hook compensates).
    Withheld(oneshot::Receiver<HookDecision>),
}

/// Answer to the post-creation hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatedAction {
    /// Let the download run.
    Allow,
    /// Cancel it (the extension pauses as a degraded fallback on failure).
    Cancel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_start_event_parses_bridge_payload() {
        let ev: PreStartEvent = serde_json::from_str(
            r#"{
                "id": 7,
                "sourceUrl": "https://example.com/dl",
                "resolvedUrl": "https://cdn.example.com/f.exe",
                "fileName": "f.exe",
                "mime": "application/octet-stream"
            }"#,
        )
        .unwrap();
        assert_eq!(ev.id, 7);
        assert_eq!(ev.effective_url(), "https://cdn.example.com/f.exe");
    }

    #[test]
    fn effective_url_falls_back_to_source() {
        let ev = PreStartEvent {
            id: 1,
            source_url: "https://example.com/dl".to_string(),
            resolved_url: None,
            file_name: "f.exe".to_string(),
            mime: None,
        };
        assert_eq!(ev.effective_url(), "https://example.com/dl");
    }

    #[test]
    fn hook_decision_wire_shape() {
        let allow = serde_json::to_string(&HookDecision::Allow {
            file_name: Some("f.exe".to_string()),
        })
        .unwrap();
        assert!(allow.contains("\"decision\":\"allow\""));
        assert!(allow.contains("\"fileName\":\"f.exe\""));

        let deny = serde_json::to_string(&HookDecision::Deny).unwrap();
        assert_eq!(deny, r#"{"decision":"deny"}"#);
    }

    #[test]
    fn created_action_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CreatedAction::Cancel).unwrap(),
            "\"cancel\""
        );
    }

    #[test]
    fn download_change_parses_snake_case() {
        let ev: ChangedEvent =
            serde_json::from_str(r#"{"id":3,"change":"in_progress"}"#).unwrap();
        assert_eq!(ev.change, DownloadChange::InProgress);
    }
}
