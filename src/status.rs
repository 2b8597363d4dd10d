use std::fmt;

use serde::Deserialize;

/// Server-side state of a submitted retrieval task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
    /// States this client does not know about are carried through so callers
    /// can still log them.
    Other(String),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Other(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.to_ascii_lowercase().as_str() {
            "queued" => TaskState::Queued,
            "running" => TaskState::Running,
            "completed" => TaskState::Completed,
            "failed" => TaskState::Failed,
            _ => TaskState::Other(s),
        })
    }
}

/// Error payload attached to a failed task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: String,
    pub url: Option<String>,
    /// Free-form diagnostic payload (e.g. traceback); shape varies by
    /// failure, so it stays untyped.
    pub context: Option<serde_json::Value>,
    pub permanent: Option<bool>,
}

/// Reply body from `resources/{dataset}` and `tasks/{request_id}`.
///
/// `location`, `content_length` and `content_type` are only present once the
/// task has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    pub state: TaskState,
    pub request_id: Option<String>,
    pub location: Option<String>,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub error: Option<TaskError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_queued_reply() {
        let r: Reply = serde_json::from_str(
            r#"{"state": "queued", "request_id": "a1b2c3"}"#,
        )
        .unwrap();
        assert_eq!(r.state, TaskState::Queued);
        assert_eq!(r.request_id.as_deref(), Some("a1b2c3"));
        assert!(r.location.is_none());
        assert!(!r.state.is_terminal());
    }

    #[test]
    fn decodes_completed_reply() {
        let r: Reply = serde_json::from_str(
            r#"{
                "state": "completed",
                "request_id": "a1b2c3",
                "location": "https://download.cds.climate.copernicus.eu/cache/x.tar.gz",
                "content_length": 1048576,
                "content_type": "application/gzip"
            }"#,
        )
        .unwrap();
        assert_eq!(r.state, TaskState::Completed);
        assert_eq!(r.content_length, Some(1048576));
        assert!(r.state.is_terminal());
    }

    #[test]
    fn decodes_failed_reply_with_error() {
        let r: Reply = serde_json::from_str(
            r#"{
                "state": "failed",
                "request_id": "a1b2c3",
                "error": {
                    "message": "invalid request",
                    "reason": "None of the data you have requested is available yet",
                    "context": {"traceback": "..."},
                    "permanent": true
                }
            }"#,
        )
        .unwrap();
        assert_eq!(r.state, TaskState::Failed);
        let err = r.error.unwrap();
        assert_eq!(err.message, "invalid request");
        assert_eq!(err.permanent, Some(true));
        assert_eq!(
            err.context.and_then(|c| c.get("traceback").cloned()),
            Some(serde_json::json!("..."))
        );
    }

    #[test]
    fn unknown_state_is_preserved() {
        let r: Reply = serde_json::from_str(r#"{"state": "Resuming"}"#).unwrap();
        assert_eq!(r.state, TaskState::Other("Resuming".to_string()));
        assert_eq!(r.state.to_string(), "Resuming");
    }
}
