//! Session credentials.
//!
//! Compact signed-claims tokens (`header.claims.signature`, all base64url)
//! issued after successful authentication. The signing primitive is a
//! pluggable hook so deployments can move to a KMS without touching the
//! service; the default is HMAC-SHA256 over the first two segments.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::sync::Arc;

use passkey_core::clock::SharedClock;
use passkey_core::crypto::constant_time_eq;
use passkey_core::encoders::{base64_url_decode, base64_url_encode};
use passkey_core::errors::{ErrorCode, WalletError, WalletResult};

pub const DEFAULT_SESSION_TTL_MS: u64 = 60 * 60 * 1000;
pub const DEFAULT_REFRESH_WINDOW_MS: u64 = 15 * 60 * 1000;

/// Pluggable signing hook.
pub trait TokenSigner: Send + Sync {
    fn algorithm(&self) -> &'static str;
    fn sign(&self, data: &[u8]) -> WalletResult<Vec<u8>>;
    fn verify(&self, data: &[u8], signature: &[u8]) -> bool;
}

pub struct HmacSha256Signer {
    key: Vec<u8>,
}

impl HmacSha256Signer {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        HmacSha256Signer { key: key.into() }
    }

    fn mac(&self, data: &[u8]) -> WalletResult<Vec<u8>> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|_| WalletError::internal("invalid HMAC key"))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl TokenSigner for HmacSha256Signer {
    fn algorithm(&self) -> &'static str {
        "HS256"
    }

    fn sign(&self, data: &[u8]) -> WalletResult<Vec<u8>> {
        self.mac(data)
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        match self.mac(data) {
            Ok(expected) => constant_time_eq(&expected, signature),
            Err(_) => false,
        }
    }
}

/// Claims payload for session-signed flows: a bounded grant tied to one
/// account, relying party, and relay key generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionPolicy {
    pub version: u32,
    pub account: String,
    pub rp_id: String,
    pub relayer_key_id: String,
    pub session_id: String,
    pub ttl_ms: u64,
    pub remaining_uses: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

pub struct SessionService {
    signer: Arc<dyn TokenSigner>,
    clock: SharedClock,
    ttl_ms: u64,
    refresh_window_ms: u64,
}

impl SessionService {
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        clock: SharedClock,
        ttl_ms: u64,
        refresh_window_ms: u64,
    ) -> Self {
        SessionService {
            signer,
            clock,
            ttl_ms,
            refresh_window_ms,
        }
    }

    pub fn sign(&self, sub: &str, extra: Option<Map<String, Value>>) -> WalletResult<String> {
        let now = self.clock.now_ms() / 1000;
        let claims = SessionClaims {
            sub: sub.to_string(),
            iat: now,
            exp: now + self.ttl_ms / 1000,
            extra: extra.unwrap_or_default(),
        };
        self.sign_claims(&claims)
    }

    fn sign_claims(&self, claims: &SessionClaims) -> WalletResult<String> {
        let header = TokenHeader {
            alg: self.signer.algorithm().to_string(),
            typ: "JWT".to_string(),
        };
        let header_b64 = base64_url_encode(
            serde_json::to_vec(&header)
                .map_err(|e| WalletError::internal(e.to_string()))?
                .as_slice(),
        );
        let claims_b64 = base64_url_encode(
            serde_json::to_vec(claims)
                .map_err(|e| WalletError::internal(e.to_string()))?
                .as_slice(),
        );
        let signing_input = format!("{}.{}", header_b64, claims_b64);
        let signature = self.signer.sign(signing_input.as_bytes())?;
        Ok(format!("{}.{}", signing_input, base64_url_encode(&signature)))
    }

    /// Verify the signature and expiry; returns the claims.
    pub fn verify(&self, token: &str) -> WalletResult<SessionClaims> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid_token("token must have three segments"));
        };

        let signing_input = format!("{}.{}", header_b64, claims_b64);
        let signature = base64_url_decode(signature_b64)
            .map_err(|_| invalid_token("signature segment is not base64url"))?;
        if !self.signer.verify(signing_input.as_bytes(), &signature) {
            return Err(invalid_token("signature does not verify"));
        }

        let claims: SessionClaims = serde_json::from_slice(
            &base64_url_decode(claims_b64)
                .map_err(|_| invalid_token("claims segment is not base64url"))?,
        )
        .map_err(|_| invalid_token("claims are not valid JSON"))?;

        if claims.exp <= self.clock.now_ms() / 1000 {
            return Err(WalletError::new(
                ErrorCode::SessionExpired,
                "session credential expired",
            ));
        }
        Ok(claims)
    }

    /// Issue a token whose extra claims carry a [`SessionPolicy`].
    pub fn sign_policy(&self, policy: &SessionPolicy) -> WalletResult<String> {
        let value = serde_json::to_value(policy)
            .map_err(|e| WalletError::internal(e.to_string()))?;
        let mut extra = Map::new();
        extra.insert("policy".to_string(), value);
        self.sign(&policy.account, Some(extra))
    }

    /// Extract the policy embedded by [`SessionService::sign_policy`].
    pub fn verify_policy(&self, token: &str) -> WalletResult<SessionPolicy> {
        let claims = self.verify(token)?;
        let policy = claims
            .extra
            .get("policy")
            .cloned()
            .ok_or_else(|| invalid_token("no policy claim"))?;
        serde_json::from_value(policy).map_err(|_| invalid_token("malformed policy claim"))
    }

    /// Re-issue a token. Succeeds only while the current token is valid and
    /// inside the sliding window before its expiry.
    pub fn refresh(&self, token: &str) -> WalletResult<String> {
        let claims = self.verify(token)?;
        let now = self.clock.now_ms() / 1000;
        let remaining = claims.exp.saturating_sub(now);
        if remaining * 1000 > self.refresh_window_ms {
            return Err(WalletError::new(
                ErrorCode::InputInvalid,
                "token is not yet inside the refresh window",
            ));
        }
        let refreshed = SessionClaims {
            sub: claims.sub,
            iat: now,
            exp: now + self.ttl_ms / 1000,
            extra: claims.extra,
        };
        self.sign_claims(&refreshed)
    }
}

fn invalid_token(reason: &str) -> WalletError {
    WalletError::new(ErrorCode::InputInvalid, format!("invalid session token: {}", reason))
}

// === COOKIES ===

/// Cookie concerns stay out of the session service; a builder renders the
/// Set-Cookie value for whatever framework sits on top.
#[derive(Clone, Debug)]
pub struct SessionCookieBuilder {
    pub name: String,
    pub max_age_seconds: u64,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: &'static str,
}

impl Default for SessionCookieBuilder {
    fn default() -> Self {
        SessionCookieBuilder {
            name: "passkey_session".to_string(),
            max_age_seconds: DEFAULT_SESSION_TTL_MS / 1000,
            secure: true,
            http_only: true,
            same_site: "Strict",
        }
    }
}

impl SessionCookieBuilder {
    pub fn build(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; Max-Age={}; SameSite={}; Path=/",
            self.name, token, self.max_age_seconds, self.same_site
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie
    }
}
