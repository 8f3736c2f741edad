/// Audit logging for ruleset changes
///
/// This module provides structured logging of every attempt to validate or
/// install a ruleset, successful or not.
use crate::core::error::Error;
use crate::core::firewall::Snapshot;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Types of auditable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LoadRuleset,
    ValidateRuleset,
    InstallRuleset,
    RejectRuleset,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Type of event
    pub event_type: EventType,

    /// Whether the operation succeeded
    pub success: bool,

    /// Additional structured data about the event
    pub details: serde_json::Value,

    /// Error message if operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success,
            details,
            error,
        }
    }
}

/// Audit log writer
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Opens the audit log in the state directory.
    ///
    /// # Errors
    ///
    /// Returns `Err` if state directory cannot be determined
    pub fn new() -> std::io::Result<Self> {
        let log_path = crate::utils::audit_log_path().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;

        Ok(Self { log_path })
    }

    /// Opens an audit log at an explicit path.
    pub fn with_path(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Appends an event to the audit log
    ///
    /// Events are written as JSON-lines format (one JSON object per line)
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub async fn log(&self, event: AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(&event)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Reads the most recent events from the log, newest first
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .take(count)
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();

        Ok(events)
    }

    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }
}

async fn record(event: AuditEvent) {
    if let Ok(audit) = AuditLog::new() {
        if let Some(dir) = audit.path().parent()
            && let Err(e) = tokio::fs::create_dir_all(dir).await
        {
            tracing::warn!("Failed to create audit log directory: {}", e);
            return;
        }
        if let Err(e) = audit.log(event).await {
            tracing::warn!("Failed to write audit log: {}", e);
        }
    }
}

fn load_event(path: &str, rule_count: usize, error: Option<&Error>) -> AuditEvent {
    AuditEvent::new(
        EventType::LoadRuleset,
        error.is_none(),
        serde_json::json!({
            "path": path,
            "rule_count": rule_count,
            "config_violation": error.is_some_and(Error::is_config_violation),
        }),
        error.map(ToString::to_string),
    )
}

/// Logs a ruleset file load. `error` is `None` when the load succeeded.
pub async fn log_load(path: &str, rule_count: usize, error: Option<&Error>) {
    record(load_event(path, rule_count, error)).await;
}

/// Logs a validation run
pub async fn log_validate(
    path: &str,
    table_count: usize,
    rule_count: usize,
    success: bool,
    error: Option<String>,
) {
    record(AuditEvent::new(
        EventType::ValidateRuleset,
        success,
        serde_json::json!({
            "path": path,
            "table_count": table_count,
            "rule_count": rule_count,
        }),
        error,
    ))
    .await;
}

fn install_event(snapshot: &Snapshot) -> AuditEvent {
    AuditEvent::new(
        EventType::InstallRuleset,
        true,
        serde_json::json!({
            "snapshot_id": snapshot.id,
            "generation": snapshot.generation,
            "installed_at": snapshot.installed_at,
            "rule_count": snapshot.tables().rule_count(),
        }),
        None,
    )
}

/// Logs a snapshot becoming live
pub async fn log_install(snapshot: &Snapshot) {
    record(install_event(snapshot)).await;
}

/// Logs a ruleset refused at install time
pub async fn log_reject(rule_count: usize, error: String) {
    record(AuditEvent::new(
        EventType::RejectRuleset,
        false,
        serde_json::json!({
            "rule_count": rule_count,
        }),
        Some(error),
    ))
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_creation() {
        let event = AuditEvent::new(
            EventType::InstallRuleset,
            true,
            serde_json::json!({"generation": 2}),
            None,
        );

        assert!(event.success);
        assert!(event.error.is_none());
        assert_eq!(event.details["generation"], 2);
    }

    #[test]
    fn test_event_serialization() {
        let event = AuditEvent::new(
            EventType::RejectRuleset,
            false,
            serde_json::json!({"rule_count": 4}),
            Some("underflow rule 3 is not unconditional".to_string()),
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("reject_ruleset"));
        assert!(json.contains("not unconditional"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"timestamp":"2024-01-01T00:00:00Z","event_type":"validate_ruleset","success":true,"details":{},"error":null}"#;
        let event: AuditEvent = serde_json::from_str(json).unwrap();

        assert!(event.success);
        assert_eq!(event.event_type, EventType::ValidateRuleset);
    }

    #[test]
    fn test_load_event_flags_broken_rulesets() {
        let ok = load_event("ruleset.json", 3, None);
        assert!(ok.success);
        assert_eq!(ok.details["config_violation"], false);

        let broken = Error::TooManyRules {
            table: "filter".to_string(),
            count: 1001,
            max: 1000,
        };
        let event = load_event("ruleset.json", 0, Some(&broken));
        assert!(!event.success);
        assert_eq!(event.details["config_violation"], true);
        assert!(event.error.unwrap().contains("1001"));

        let io = Error::from(std::io::Error::other("disk gone"));
        let event = load_event("ruleset.json", 0, Some(&io));
        assert!(!event.success);
        assert_eq!(event.details["config_violation"], false);
    }

    #[test]
    fn test_install_event_records_snapshot() {
        let firewall = crate::Firewall::with_defaults().unwrap();
        let snapshot = firewall.snapshot();
        let event = install_event(&snapshot);

        assert_eq!(event.event_type, EventType::InstallRuleset);
        assert_eq!(event.details["generation"], 1);
        assert_eq!(event.details["snapshot_id"], snapshot.id.to_string());
        assert_eq!(event.details["rule_count"], snapshot.tables().rule_count());

        let installed_at: chrono::DateTime<chrono::Utc> =
            serde_json::from_value(event.details["installed_at"].clone()).unwrap();
        assert_eq!(installed_at, snapshot.installed_at);
    }

    #[tokio::test]
    async fn test_log_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::with_path(dir.path().join("audit.log"));

        for generation in 1..=3_u64 {
            let event = AuditEvent::new(
                EventType::InstallRuleset,
                true,
                serde_json::json!({"generation": generation}),
                None,
            );
            audit.log(event).await.unwrap();
        }

        let content = tokio::fs::read_to_string(audit.path()).await.unwrap();
        assert_eq!(content.lines().count(), 3);

        let recent = audit.read_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].details["generation"], 3);
        assert_eq!(recent[1].details["generation"], 2);
    }
}
