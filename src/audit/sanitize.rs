//! Turning request arguments into audit parameters.

use serde_json::{Map, Value};

/// Argument names whose values are never written.
const SENSITIVE_KEYS: &[&str] = &["password", "secret", "token"];

/// Longest value kept verbatim.
const MAX_VALUE_LENGTH: usize = 1024;

/// Build the audit parameter object from a request's named arguments.
///
/// Sensitive values are replaced by a marker and long values by their length.
pub fn sanitize_fields(fields: &[(&str, String)]) -> Value {
    let mut params = Map::new();
    for (key, value) in fields {
        let key_lower = key.to_lowercase();
        let sanitized = if SENSITIVE_KEYS.iter().any(|s| key_lower.contains(s)) {
            "[REDACTED]".to_string()
        } else if value.len() > MAX_VALUE_LENGTH {
            format!("[TRUNCATED - {} bytes]", value.len())
        } else {
            value.clone()
        };
        params.insert(key.to_string(), Value::String(sanitized));
    }
    Value::Object(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Request;

    #[test]
    fn test_password_redacted() {
        let request = Request::parse("createuser jdoe hunter2").unwrap();
        let params = sanitize_fields(&request.audit_fields());
        assert_eq!(params["user"], "jdoe");
        assert_eq!(params["password"], "[REDACTED]");
        assert!(!params.to_string().contains("hunter2"));
    }

    #[test]
    fn test_long_values_truncated() {
        let fields = vec![("args", "x".repeat(2000)), ("script", "reindex".to_string())];
        let params = sanitize_fields(&fields);
        assert_eq!(params["args"], "[TRUNCATED - 2000 bytes]");
        assert_eq!(params["script"], "reindex");
    }

    #[test]
    fn test_no_fields() {
        assert_eq!(sanitize_fields(&[]), Value::Object(Map::new()));
    }
}
