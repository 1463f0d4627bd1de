use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of the server's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn format(&self) -> String {
        format!(
            "{}\t\t{}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.event
        )
    }
}
