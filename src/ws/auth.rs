//! JWT bearer-token provider for outbound WebSocket authentication.
//!
//! Supplemented from `aicc_pipeline/websocket/auth.py`'s `WebSocketAuth`
//! (spec.md's distillation only mentions "optional token provider" in
//! §4.11). `jsonwebtoken` is the idiomatic HS256 signer for this shape —
//! none of the example repos touch JWT, so this is a new addition, noted in
//! DESIGN.md.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, EncodingKey, Header};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Claims {
    client_id: String,
    permissions: Vec<String>,
    iat: u64,
    exp: u64,
    nbf: u64,
}

struct CachedToken {
    token: String,
    expires_at_secs: u64,
}

/// Generates and caches HS256 JWTs for outbound WebSocket `Authorization`
/// headers, refreshing a few minutes before expiry.
pub struct WsAuth {
    secret: String,
    client_id: String,
    ttl_secs: u64,
    refresh_margin_secs: u64,
    cached: Mutex<Option<CachedToken>>,
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
}

impl WsAuth {
    pub fn new(secret: impl Into<String>, client_id: impl Into<String>, ttl_secs: u64) -> Self {
        Self { secret: secret.into(), client_id: client_id.into(), ttl_secs, refresh_margin_secs: 300, cached: Mutex::new(None) }
    }

    /// Builds a `WsAuth` from configured secret/client-id/TTL, or `None` if
    /// authentication was not configured (spec.md §6: "Optional WebSocket
    /// auth secret").
    pub fn from_config(secret: Option<&str>, client_id: Option<&str>, ttl_secs: u64) -> Option<Self> {
        let secret = secret?;
        let client_id = client_id?;
        Some(Self::new(secret, client_id, ttl_secs))
    }

    fn generate(&self) -> String {
        let now = now_secs();
        let exp = now + self.ttl_secs;
        let claims = Claims { client_id: self.client_id.clone(), permissions: vec!["send_transcripts".to_string()], iat: now, exp, nbf: now };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .expect("HS256 signing with a fixed-format claim set cannot fail");

        *self.cached.lock() = Some(CachedToken { token: token.clone(), expires_at_secs: exp });
        token
    }

    /// Returns a valid token, refreshing it when within the margin of
    /// expiry (default 5 minutes, spec.md §4.11).
    pub fn token(&self) -> String {
        let now = now_secs();
        if let Some(cached) = self.cached.lock().as_ref() {
            if now + self.refresh_margin_secs < cached.expires_at_secs {
                return cached.token.clone();
            }
        }
        self.generate()
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_secret_yields_no_auth() {
        assert!(WsAuth::from_config(None, Some("client-1"), 3600).is_none());
    }

    #[test]
    fn token_is_reused_before_expiry() {
        let auth = WsAuth::new("shared-secret", "client-1", 3600);
        let first = auth.token();
        let second = auth.token();
        assert_eq!(first, second);
    }

    #[test]
    fn bearer_header_wraps_token() {
        let auth = WsAuth::new("shared-secret", "client-1", 3600);
        assert!(auth.bearer_header().starts_with("Bearer "));
    }
}
