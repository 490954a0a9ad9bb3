//! API request and response models.

use serde::{Deserialize, Serialize};

use warden_agent::{AgentStatus, CreatedAction, HookDecision, HostCommand, PromptAction};
use warden_core::events::SequencedEvent;
use warden_core::protection::{PauseDuration, ProtectionState};
use warden_storage::ScanEventRecord;

/// Response body for `POST /hook/download/pre-start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreStartReplyBody {
    /// "allow", "deny" or "none" (the agent withheld past the bridge
    /// deadline; the host applies its own default).
    pub decision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl PreStartReplyBody {
    /// A reply carrying a concrete decision.
    pub fn decided(decision: HookDecision) -> Self {
        match decision {
            HookDecision::Allow { file_name } => Self {
                decision: "allow".to_string(),
                file_name,
            },
            HookDecision::Deny => Self {
                decision: "deny".to_string(),
                file_name: None,
            },
        }
    }

    /// The no-decision reply.
    pub fn none() -> Self {
        Self {
            decision: "none".to_string(),
            file_name: None,
        }
    }
}

/// Response body for `POST /hook/download/created`.
#[derive(Debug, Serialize)]
pub struct CreatedReplyBody {
    pub action: CreatedAction,
}

/// Generic acknowledgement.
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Body for hooks that reference a download by id.
#[derive(Debug, Deserialize)]
pub struct DownloadRef {
    pub id: i64,
}

/// Body for `POST /hook/download/reinit-failed`.
#[derive(Debug, Deserialize)]
pub struct ReinitFailedRequest {
    pub url: String,
}

/// Body for `POST /hook/tab/removed`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRemovedRequest {
    pub tab_id: i64,
}

/// Body for `POST /api/prompts/{id}/respond`.
#[derive(Debug, Deserialize)]
pub struct PromptResponseRequest {
    pub action: PromptAction,
}

/// Response body for a prompt response.
#[derive(Debug, Serialize)]
pub struct PromptResponseReply {
    /// False when the prompt was unknown or already consumed.
    pub consumed: bool,
}

/// Response body for `GET /api/commands`.
#[derive(Debug, Serialize)]
pub struct CommandsResponse {
    pub commands: Vec<HostCommand>,
}

/// Response body for `GET /api/protection`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionResponse {
    pub state: ProtectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_remaining_secs: Option<u64>,
}

/// Body for `PUT /api/protection`.
#[derive(Debug, Deserialize)]
pub struct SetProtectionRequest {
    pub state: ProtectionState,
    #[serde(default)]
    pub pause: Option<PauseDuration>,
}

/// Body for `POST /api/auth/token`.
#[derive(Debug, Deserialize)]
pub struct AuthTokenRequest {
    pub token: String,
    pub user: String,
}

/// Query parameters for `GET /api/events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Replay events with a sequence number greater than this.
    #[serde(default)]
    pub since: u64,
}

/// Response body for `GET /api/events`.
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub latest: u64,
    pub events: Vec<SequencedEvent>,
}

/// Query parameters for `GET /api/logs`.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_log_limit")]
    pub limit: i64,
}

fn default_log_limit() -> i64 {
    50
}

/// Response body for `GET /api/logs`.
#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub entries: Vec<ScanEventRecord>,
}

/// Response body for `GET /api/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub version: String,
    #[serde(flatten)]
    pub status: AgentStatus,
}
