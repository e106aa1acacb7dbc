//! Wire types shared by the helper services

use serde::{Deserialize, Serialize};

/// Completion status reported by a helper service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    Success,
    Failure,
}

/// Response body of a helper service request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status: CompletionStatus,

    #[serde(default)]
    pub description: String,
}

impl HandlerResponse {
    pub fn success(description: impl Into<String>) -> Self {
        Self {
            status: CompletionStatus::Success,
            description: description.into(),
        }
    }

    pub fn failure(description: impl Into<String>) -> Self {
        Self {
            status: CompletionStatus::Failure,
            description: description.into(),
        }
    }
}

/// Boolean rendered the way the helper services parse it
pub fn flag(value: bool) -> String {
    let text = if value { "True" } else { "False" };
    text.to_string()
}
