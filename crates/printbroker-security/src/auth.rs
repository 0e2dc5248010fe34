// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bearer tokens: signed `header.payload.signature` envelopes (HS256), plus
// PBKDF2 password hashing. If no signing secret is configured at boot a
// process-lifetime random one is generated — tokens issued before a
// restart stop validating, by design (§4.5).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use printbroker_core::PrintBrokerError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tracing::{instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 32;
const HASH_LEN: usize = 32;

/// Claims carried by a bearer token. `roles` is a singleton list in
/// practice (one account, one role) but kept plural to match the wire
/// shape the original issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub client_id: String,
    pub username: String,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

/// Issues and verifies bearer tokens and hashes/verifies passwords.
///
/// `secret` is either the configured `security.jwt_secret_key` or, absent
/// that, a random value generated once at construction (a warning is
/// logged either way the random branch is taken, since those tokens will
/// not validate across a restart).
pub struct AuthManager {
    secret: Vec<u8>,
    expiration_hours: i64,
    cache: Mutex<HashMap<String, (Claims, Instant)>>,
}

impl AuthManager {
    pub fn new(secret: Option<String>, expiration_hours: i64) -> Self {
        let secret = match secret {
            Some(s) if !s.is_empty() => s.into_bytes(),
            _ => {
                warn!("no security.jwt_secret_key configured; generating an ephemeral signing secret — tokens will not survive a restart");
                let mut buf = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut buf);
                buf.to_vec()
            }
        };
        Self {
            secret,
            expiration_hours,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn sign(&self, data: &str) -> Result<String, PrintBrokerError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| PrintBrokerError::Internal(format!("bad HMAC key: {e}")))?;
        mac.update(data.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Issues a token for the given principal, username, and roles with
    /// the configured expiration.
    #[instrument(skip(self))]
    pub fn generate(
        &self,
        client_id: &str,
        username: &str,
        roles: Vec<String>,
    ) -> Result<String, PrintBrokerError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            client_id: client_id.to_string(),
            username: username.to_string(),
            roles,
            iat: now,
            exp: now + self.expiration_hours * 3600,
            jti: Uuid::new_v4().to_string(),
        };
        self.encode(&claims)
    }

    fn encode(&self, claims: &Claims) -> Result<String, PrintBrokerError> {
        let header = Header {
            alg: "HS256",
            typ: "JWT",
        };
        let header_b64 = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&header)
                .map_err(|e| PrintBrokerError::Internal(format!("header encode: {e}")))?,
        );
        let payload_b64 = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(claims)
                .map_err(|e| PrintBrokerError::Internal(format!("payload encode: {e}")))?,
        );
        let signing_input = format!("{header_b64}.{payload_b64}");
        let signature = self.sign(&signing_input)?;
        Ok(format!("{signing_input}.{signature}"))
    }

    /// Validates a token's signature and expiry, returning its claims.
    ///
    /// A cache hit for an unexpired entry skips signature re-verification;
    /// expiry is always re-checked against the current time regardless.
    #[instrument(skip(self, token))]
    pub fn validate(&self, token: &str) -> Result<Claims, PrintBrokerError> {
        if let Some(claims) = self.cache_lookup(token) {
            return self.check_expiry(claims);
        }

        let parts: Vec<&str> = token.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = parts.as_slice() else {
            return Err(PrintBrokerError::TokenInvalid(
                "malformed token: expected three segments".into(),
            ));
        };

        let signing_input = format!("{header_b64}.{payload_b64}");
        let expected_sig = self.sign(&signing_input)?;
        let actual = signature_b64.as_bytes();
        let expected = expected_sig.as_bytes();
        if actual.len() != expected.len() || actual.ct_eq(expected).unwrap_u8() != 1 {
            return Err(PrintBrokerError::TokenInvalid("signature mismatch".into()));
        }

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| PrintBrokerError::TokenInvalid(format!("bad payload encoding: {e}")))?;
        let claims: Claims = serde_json::from_slice(&payload_bytes)
            .map_err(|e| PrintBrokerError::TokenInvalid(format!("bad payload shape: {e}")))?;

        self.cache_store(token, claims.clone());
        self.check_expiry(claims)
    }

    fn check_expiry(&self, claims: Claims) -> Result<Claims, PrintBrokerError> {
        if claims.exp < chrono::Utc::now().timestamp() {
            return Err(PrintBrokerError::TokenExpired);
        }
        Ok(claims)
    }

    fn cache_lookup(&self, token: &str) -> Option<Claims> {
        let cache = self.cache.lock().expect("auth cache mutex poisoned");
        cache.get(token).map(|(claims, _)| claims.clone())
    }

    fn cache_store(&self, token: &str, claims: Claims) {
        let mut cache = self.cache.lock().expect("auth cache mutex poisoned");
        cache.insert(token.to_string(), (claims, Instant::now()));
    }

    /// Evicts cache entries older than `max_age` — intended for a periodic
    /// sweep alongside the rate limiter's, though the cache is also empty
    /// on every fresh process by construction.
    pub fn sweep_cache(&self, max_age: Duration) -> usize {
        let mut cache = self.cache.lock().expect("auth cache mutex poisoned");
        let before = cache.len();
        cache.retain(|_, (_, seen)| seen.elapsed() <= max_age);
        before - cache.len()
    }

    /// Validates `token`, then re-issues a fresh token with the same
    /// `client_id`/`username`/`roles`/`jti` but new `iat`/`exp`.
    #[instrument(skip(self, token))]
    pub fn refresh(&self, token: &str) -> Result<String, PrintBrokerError> {
        let claims = self.validate(token)?;
        let now = chrono::Utc::now().timestamp();
        let refreshed = Claims {
            exp: now + self.expiration_hours * 3600,
            iat: now,
            ..claims
        };
        self.encode(&refreshed)
    }
}

/// Derives a PBKDF2-HMAC-SHA-256 hash (100,000 iterations, 32-byte salt).
/// Returns `(hash_hex, salt_hex)`.
pub fn hash_password(password: &str) -> (String, String) {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = derive(password, &salt);
    (hex::encode(hash), hex::encode(salt))
}

/// Verifies `password` against a previously stored `hash_hex`/`salt_hex`
/// pair using a constant-time comparison.
pub fn verify_password(password: &str, hash_hex: &str, salt_hex: &str) -> bool {
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(hash_hex) else {
        return false;
    };
    let actual = derive(password, &salt);
    actual.len() == expected.len() && actual.ct_eq(&expected).unwrap_u8() == 1
}

fn derive(password: &str, salt: &[u8]) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AuthManager {
        AuthManager::new(Some("test-secret-do-not-use-in-prod".to_string()), 24)
    }

    #[test]
    fn generated_token_validates_with_matching_claims() {
        let mgr = manager();
        let token = mgr
            .generate("client-1", "alice", vec!["user".to_string()])
            .unwrap();
        let claims = mgr.validate(&token).unwrap();
        assert_eq!(claims.client_id, "client-1");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.roles, vec!["user".to_string()]);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tampered_signature_is_invalid() {
        let mgr = manager();
        let token = mgr.generate("c", "u", vec![]).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        let err = mgr.validate(&tampered).unwrap_err();
        assert!(matches!(err, PrintBrokerError::TokenInvalid(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let mgr = AuthManager::new(Some("secret".to_string()), -1);
        let token = mgr.generate("c", "u", vec![]).unwrap();
        let err = mgr.validate(&token).unwrap_err();
        assert!(matches!(err, PrintBrokerError::TokenExpired));
    }

    #[test]
    fn malformed_token_is_invalid_not_a_panic() {
        let mgr = manager();
        assert!(mgr.validate("not-a-token").is_err());
        assert!(mgr.validate("a.b").is_err());
        assert!(mgr.validate("").is_err());
    }

    #[test]
    fn refresh_preserves_identity_claims_with_new_timestamps() {
        let mgr = manager();
        let token = mgr
            .generate("client-1", "alice", vec!["admin".to_string()])
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let refreshed = mgr.refresh(&token).unwrap();
        let claims = mgr.validate(&refreshed).unwrap();
        assert_eq!(claims.client_id, "client-1");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.roles, vec!["admin".to_string()]);
    }

    #[test]
    fn distinct_secrets_reject_each_others_tokens() {
        let mgr_a = AuthManager::new(Some("secret-a".to_string()), 24);
        let mgr_b = AuthManager::new(Some("secret-b".to_string()), 24);
        let token = mgr_a.generate("c", "u", vec![]).unwrap();
        assert!(mgr_b.validate(&token).is_err());
    }

    #[test]
    fn password_hash_round_trips_and_rejects_wrong_password() {
        let (hash, salt) = hash_password("correct horse battery staple");
        assert!(verify_password("correct horse battery staple", &hash, &salt));
        assert!(!verify_password("wrong password", &hash, &salt));
    }

    #[test]
    fn distinct_salts_for_same_password() {
        let (hash_a, salt_a) = hash_password("same-password");
        let (hash_b, salt_b) = hash_password("same-password");
        assert_ne!(salt_a, salt_b);
        assert_ne!(hash_a, hash_b);
    }
}
