use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle state of one procedure invocation. Advances monotonically;
/// `Completed`, `Failed`, and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of one procedure invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub procedure_id: Uuid,
    pub status: ExecutionStatus,
    pub input_params: Value,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub rows_returned: Option<u64>,
    pub duration_ms: Option<u64>,
    pub user_id: Option<Uuid>,
    pub user_role: String,
    pub user_email: Option<String>,
    pub is_async: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    pub fn pending(
        procedure_id: Uuid,
        input_params: Value,
        user_id: Option<Uuid>,
        user_role: impl Into<String>,
        user_email: Option<String>,
        is_async: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            procedure_id,
            status: ExecutionStatus::Pending,
            input_params,
            result: None,
            error_message: None,
            rows_returned: None,
            duration_ms: None,
            user_id,
            user_role: user_role.into(),
            user_email,
            is_async,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        debug_assert_eq!(self.status, ExecutionStatus::Pending);
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: Value, rows_returned: u64, duration_ms: u64) {
        self.status = ExecutionStatus::Completed;
        self.result = Some(result);
        self.rows_returned = Some(rows_returned);
        self.duration_ms = Some(duration_ms);
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>, duration_ms: u64) {
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(error_message.into());
        self.duration_ms = Some(duration_ms);
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = ExecutionStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_lifecycle() {
        let mut exec = Execution::pending(
            Uuid::new_v4(),
            serde_json::json!({"name": "a"}),
            None,
            "anon",
            None,
            false,
        );
        assert_eq!(exec.status, ExecutionStatus::Pending);
        exec.mark_running();
        assert!(exec.started_at.is_some());
        exec.mark_completed(serde_json::json!([]), 0, 12);
        assert!(exec.status.is_terminal());
        assert!(exec.started_at <= exec.completed_at);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ExecutionStatus::Failed.as_str(), "failed");
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }
}
