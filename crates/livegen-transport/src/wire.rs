//! Wire format
//!
//! Every frame is one JSON object on its own line. The handshake and the
//! server events are tagged unions on a `type` field; the job request is
//! a plain `{action, data}` object.

use serde::{Deserialize, Serialize};

/// Frames exchanged before the job request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Handshake {
    /// Client greeting carrying the credential
    Hello { token: String },
    Ready,
    Rejected { reason: String },
}

/// One generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub action: String,
    pub data: JobData,
}

/// Target and parameters of a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Free-form job parameters, flattened into `data`
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub caller_identity: String,
}

impl JobRequest {
    /// Generate or regenerate one screen
    #[must_use]
    pub fn for_screen(action: impl Into<String>, screen_id: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            data: JobData {
                screen_id: Some(screen_id.into()),
                ..JobData::default()
            },
        }
    }

    /// Generate every screen of a project
    #[must_use]
    pub fn for_project(action: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            data: JobData {
                project_id: Some(project_id.into()),
                ..JobData::default()
            },
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_caller(mut self, identity: impl Into<String>) -> Self {
        self.data.caller_identity = identity.into();
        self
    }
}

/// Server-to-client events of a running job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    Progress {
        stage: String,
        #[serde(default)]
        message: String,
    },
    /// A fragment of a screen's streaming source
    #[serde(rename_all = "camelCase")]
    Checkpoint {
        screen_id: String,
        text: String,
        seq: u64,
    },
    /// The final source of a screen
    #[serde(rename_all = "camelCase")]
    UnitReady {
        screen_id: String,
        text: String,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        extra: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    UnitError { screen_id: String, error: String },
    Complete {
        #[serde(default)]
        result: serde_json::Value,
    },
    Error { reason: String },
}

impl ServerEvent {
    /// `complete` and `error` end the job
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    #[must_use]
    pub fn screen_id(&self) -> Option<&str> {
        match self {
            Self::Checkpoint { screen_id, .. }
            | Self::UnitReady { screen_id, .. }
            | Self::UnitError { screen_id, .. } => Some(screen_id),
            _ => None,
        }
    }

    /// Wire tag, for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Checkpoint { .. } => "checkpoint",
            Self::UnitReady { .. } => "unitReady",
            Self::UnitError { .. } => "unitError",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}
