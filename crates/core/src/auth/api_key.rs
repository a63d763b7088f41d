//! API Key authentication.

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};
use crate::config::ApiKeyConfig;

/// Authenticator that validates requests against the configured API keys.
///
/// Accepts the key in either:
/// - `Authorization: Bearer <key>` header
/// - `X-API-Key: <key>` header
///
/// Each key maps to a user id and a role.
pub struct ApiKeyAuthenticator {
    keys: Vec<ApiKeyConfig>,
}

impl ApiKeyAuthenticator {
    pub fn new(keys: Vec<ApiKeyConfig>) -> Self {
        Self { keys }
    }

    /// Extract API key from request headers.
    fn extract_key(&self, request: &AuthRequest) -> Option<String> {
        if let Some(auth_header) = request.headers.get("authorization") {
            if let Some(key) = auth_header.strip_prefix("Bearer ") {
                return Some(key.to_string());
            }
            if let Some(key) = auth_header.strip_prefix("bearer ") {
                return Some(key.to_string());
            }
        }

        if let Some(key) = request.headers.get("x-api-key") {
            return Some(key.clone());
        }

        None
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided_key = self
            .extract_key(request)
            .ok_or(AuthError::NotAuthenticated)?;

        // Compare against every key so timing doesn't reveal which entry matched
        let mut matched: Option<&ApiKeyConfig> = None;
        for entry in &self.keys {
            if constant_time_eq(provided_key.as_bytes(), entry.key.as_bytes()) {
                matched = Some(entry);
            }
        }

        match matched {
            Some(entry) => Ok(Identity {
                user_id: entry.user.clone(),
                role: entry.role,
                method: "api_key".to_string(),
                claims: std::collections::HashMap::new(),
            }),
            None => Err(AuthError::InvalidCredentials("Invalid API key".to_string())),
        }
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use std::net::IpAddr;

    fn make_request(headers: Vec<(&str, &str)>) -> AuthRequest {
        AuthRequest {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_string()))
                .collect(),
            source_ip: "127.0.0.1".parse::<IpAddr>().unwrap(),
        }
    }

    fn authenticator() -> ApiKeyAuthenticator {
        ApiKeyAuthenticator::new(vec![
            ApiKeyConfig {
                key: "admin-key-123".to_string(),
                user: "admin".to_string(),
                role: Role::Admin,
            },
            ApiKeyConfig {
                key: "driver-key-456".to_string(),
                user: "bob".to_string(),
                role: Role::Driver,
            },
        ])
    }

    #[tokio::test]
    async fn test_bearer_token_valid() {
        let auth = authenticator();
        let request = make_request(vec![("Authorization", "Bearer admin-key-123")]);

        let identity = auth.authenticate(&request).await.unwrap();

        assert_eq!(identity.user_id, "admin");
        assert_eq!(identity.role, Role::Admin);
        assert_eq!(identity.method, "api_key");
    }

    #[tokio::test]
    async fn test_x_api_key_header_maps_to_driver() {
        let auth = authenticator();
        let request = make_request(vec![("X-API-Key", "driver-key-456")]);

        let identity = auth.authenticate(&request).await.unwrap();

        assert_eq!(identity.user_id, "bob");
        assert_eq!(identity.role, Role::Driver);
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let auth = authenticator();
        let request = make_request(vec![("Authorization", "Bearer wrong-key")]);

        let result = auth.authenticate(&request).await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn test_missing_header() {
        let auth = authenticator();
        let request = make_request(vec![]);

        let result = auth.authenticate(&request).await;

        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_bearer_lowercase() {
        let auth = authenticator();
        let request = make_request(vec![("Authorization", "bearer driver-key-456")]);

        let identity = auth.authenticate(&request).await.unwrap();
        assert_eq!(identity.user_id, "bob");
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(!constant_time_eq(b"", b"x"));
        assert!(constant_time_eq(b"", b""));
    }
}
