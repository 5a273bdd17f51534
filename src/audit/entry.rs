//! Audit entry types.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::error::Failure;
use crate::socket::PeerInfo;

/// One brokered command as recorded in the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// RFC 3339 time the command finished.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub module: String,
    pub command: String,
    /// Arguments after sanitization.
    pub params: serde_json::Value,
    pub peer_uid: u32,
    pub peer_gid: u32,
    pub peer_pid: i32,
    pub result: AuditResult,
    pub duration_ms: u64,
}

impl AuditEntry {
    /// Start an entry stamped with the current time; the result is filled in
    /// by [`succeeded`](Self::succeeded) or [`failed`](Self::failed).
    pub fn new(
        module: &str,
        transaction_id: Option<&str>,
        command: &str,
        params: serde_json::Value,
        peer: &PeerInfo,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            transaction_id: transaction_id.map(String::from),
            module: module.to_string(),
            command: command.to_string(),
            params,
            peer_uid: peer.uid,
            peer_gid: peer.gid,
            peer_pid: peer.pid,
            result: AuditResult::Ok,
            duration_ms: 0,
        }
    }

    pub fn succeeded(mut self, duration_ms: u64) -> Self {
        self.result = AuditResult::Ok;
        self.duration_ms = duration_ms;
        self
    }

    pub fn failed(mut self, failure: &Failure, duration_ms: u64) -> Self {
        self.result = AuditResult::Failed {
            code: failure.code.as_u32(),
            message: failure.message.clone(),
        };
        self.duration_ms = duration_ms;
        self
    }
}

/// Outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AuditResult {
    Ok,
    Failed { code: u32, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn peer() -> PeerInfo {
        PeerInfo {
            uid: 1000,
            gid: 1000,
            pid: 4321,
        }
    }

    #[test]
    fn test_success_serialization() {
        let entry = AuditEntry::new(
            "webmail",
            Some("0f5e"),
            "deletefile",
            serde_json::json!({"path": "/etc/webmail/a.conf"}),
            &peer(),
        )
        .succeeded(12);

        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["module"], "webmail");
        assert_eq!(json["transaction_id"], "0f5e");
        assert_eq!(json["command"], "deletefile");
        assert_eq!(json["peer_pid"], 4321);
        assert_eq!(json["result"]["status"], "ok");
        assert_eq!(json["duration_ms"], 12);
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_failure_serialization() {
        let failure = Failure::new(ErrorCode::Policy, "Service not defined in module.xml");
        let entry = AuditEntry::new("webmail", None, "startservice", serde_json::json!({}), &peer())
            .failed(&failure, 3);

        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["result"]["status"], "failed");
        assert_eq!(json["result"]["code"], 4004);
        assert_eq!(json["result"]["message"], "Service not defined in module.xml");
        assert!(json.get("transaction_id").is_none());
    }
}
