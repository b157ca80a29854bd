//! Request and response models for HTTP notification API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Longest event name accepted over HTTP
pub const MAX_EVENT_NAME_LEN: usize = 128;

/// Request to notify every connection of one identity
#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    /// Target identity
    pub identity: String,
    /// Event name, `update` when omitted
    pub event: Option<String>,
}

/// Request to notify every connection
#[derive(Debug, Default, Deserialize)]
pub struct BroadcastRequest {
    /// Event name, `update` when omitted
    pub event: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub identity: String,
    pub event: String,
    pub delivered_to: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub event: String,
    pub success_count: usize,
    pub failure_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl NotifyRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.identity.trim().is_empty() {
            return Err(AppError::Validation("identity must not be empty".to_string()));
        }
        validate_event_name(self.event.as_deref())
    }
}

impl BroadcastRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_event_name(self.event.as_deref())
    }
}

/// Event names travel as a single `data:` line, so line breaks are refused
pub fn validate_event_name(event: Option<&str>) -> Result<(), AppError> {
    let Some(event) = event else {
        return Ok(());
    };

    if event.is_empty() {
        return Err(AppError::Validation("event must not be empty".to_string()));
    }
    if event.len() > MAX_EVENT_NAME_LEN {
        return Err(AppError::Validation(format!(
            "event must be at most {} bytes",
            MAX_EVENT_NAME_LEN
        )));
    }
    if event.contains(['\n', '\r']) {
        return Err(AppError::Validation("event must be a single line".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_request_defaults() {
        let request: NotifyRequest = serde_json::from_str(r#"{"identity":"u1"}"#).unwrap();
        assert_eq!(request.identity, "u1");
        assert!(request.event.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_blank_identity_rejected() {
        let request = NotifyRequest {
            identity: "  ".to_string(),
            event: None,
        };
        assert!(matches!(request.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_event_name_rules() {
        assert!(validate_event_name(Some("notification.created")).is_ok());
        assert!(validate_event_name(Some("")).is_err());
        assert!(validate_event_name(Some("a\nb")).is_err());
        assert!(validate_event_name(Some(&"x".repeat(MAX_EVENT_NAME_LEN + 1))).is_err());
    }
}
