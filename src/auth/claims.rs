use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (registry user identity)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Dashboard roles (registrar, verifier, admin, ...)
    #[serde(default)]
    pub roles: Vec<String>,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Identity used to target notifications at this user's connections
    pub fn identity(&self) -> &str {
        &self.sub
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.exp < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_helpers() {
        let claims = Claims {
            sub: "registrar-7".to_string(),
            exp: chrono::Utc::now().timestamp() - 10,
            iat: chrono::Utc::now().timestamp() - 100,
            roles: vec!["registrar".to_string()],
            extra: HashMap::new(),
        };

        assert_eq!(claims.identity(), "registrar-7");
        assert!(claims.has_role("registrar"));
        assert!(!claims.has_role("admin"));
        assert!(claims.is_expired());
    }
}
