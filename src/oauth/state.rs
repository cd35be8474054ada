//! Signed state tokens
//!
//! A token is `base64url(json) "." base64url(hmac_sha256(json))`. Decoding
//! fails closed: any structural, encoding, signature or shape problem yields
//! `None`, never an error the caller could branch on.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{KeyInit, Mac};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{Error, Result};

type HmacSha256 = hmac::Hmac<Sha256>;

/// Maximum age of an [`AuthorizeState`] before the callback rejects it
pub const STATE_TTL_MS: i64 = 10 * 60 * 1000;

/// State carried from `/oauth/authorize` through Strava to `/oauth/callback`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizeState {
    /// Where the agent wants the browser sent back
    pub redirect_uri: Option<String>,
    /// The agent's own opaque `state`
    pub client_state: Option<String>,
    /// Creation time, epoch milliseconds
    pub timestamp: i64,
    /// S256 PKCE challenge supplied by the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
}

impl AuthorizeState {
    /// Whether the state is older than [`STATE_TTL_MS`] at `now_ms`
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) > STATE_TTL_MS
    }
}

/// Strava authorization code wrapped for the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WrappedCode {
    /// Code issued by Strava
    pub strava_code: String,
    /// S256 PKCE challenge carried over from the authorize step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
}

/// HMAC-SHA256 signer/verifier for state tokens
#[derive(Clone)]
pub struct StateCodec {
    secret: Vec<u8>,
}

impl StateCodec {
    /// Create a codec keyed with `secret`
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Serialize and sign a payload
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn encode<T: Serialize>(&self, payload: &T) -> Result<String> {
        let json = serde_json::to_vec(payload)?;
        let tag = self
            .sign(&json)
            .ok_or_else(|| Error::Internal("Failed to initialize HMAC".to_string()))?;

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&json),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Verify and deserialize a token
    #[must_use]
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Option<T> {
        let (payload_part, tag_part) = token.split_once('.')?;
        if tag_part.contains('.') {
            return None;
        }

        let payload = URL_SAFE_NO_PAD.decode(payload_part).ok()?;
        let provided = URL_SAFE_NO_PAD.decode(tag_part).ok()?;
        let expected = self.sign(&payload)?;

        if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            return None;
        }

        serde_json::from_slice(&payload).ok()
    }

    fn sign(&self, data: &[u8]) -> Option<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(data);
        Some(mac.finalize().into_bytes().to_vec())
    }
}

/// Sign an untyped JSON payload
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode_state(payload: &Value, secret: &[u8]) -> Result<String> {
    StateCodec::new(secret).encode(payload)
}

/// Verify an untyped JSON payload
#[must_use]
pub fn decode_state(token: &str, secret: &[u8]) -> Option<Value> {
    StateCodec::new(secret).decode(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const SECRET: &[u8] = b"test-state-secret";

    fn sample_state() -> AuthorizeState {
        AuthorizeState {
            redirect_uri: Some("https://client.example/cb".to_string()),
            client_state: Some("xyz".to_string()),
            timestamp: 1_700_000_000_000,
            code_challenge: None,
        }
    }

    #[test]
    fn typed_round_trip() {
        let codec = StateCodec::new(SECRET);
        let state = sample_state();
        let token = codec.encode(&state).unwrap();
        assert_eq!(codec.decode::<AuthorizeState>(&token), Some(state));
    }

    #[test]
    fn untyped_round_trip_preserves_nested_values() {
        let payload = json!({
            "a": [1, 2, {"b": null}],
            "unicode": "Tromsø 🏃",
            "n": -12.5,
        });
        let token = encode_state(&payload, SECRET).unwrap();
        assert_eq!(decode_state(&token, SECRET), Some(payload));
    }

    #[test]
    fn token_is_url_safe() {
        let token = encode_state(&json!({"redirect_uri": "https://x/?a=b&c=d+e"}), SECRET).unwrap();
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        );
        assert_eq!(token.matches('.').count(), 1);
    }

    #[test]
    fn encoding_is_deterministic() {
        let codec = StateCodec::new(SECRET);
        assert_eq!(
            codec.encode(&sample_state()).unwrap(),
            codec.encode(&sample_state()).unwrap()
        );
    }

    #[test]
    fn every_single_character_mutation_is_rejected() {
        let codec = StateCodec::new(SECRET);
        let token = codec.encode(&sample_state()).unwrap();

        for (i, original) in token.char_indices() {
            for replacement in ['A', 'B', '-', '_', '.', '='] {
                if replacement == original {
                    continue;
                }
                let mut mutated = token.clone();
                mutated.replace_range(i..=i, &replacement.to_string());
                assert_eq!(
                    codec.decode::<Value>(&mutated),
                    None,
                    "mutation at {i} ({original} -> {replacement}) was accepted"
                );
            }
        }
    }

    #[test]
    fn truncated_and_extended_tokens_are_rejected() {
        let codec = StateCodec::new(SECRET);
        let token = codec.encode(&sample_state()).unwrap();

        assert_eq!(codec.decode::<Value>(&token[..token.len() - 1]), None);
        assert_eq!(codec.decode::<Value>(&format!("{token}A")), None);
        assert_eq!(codec.decode::<Value>(&format!("{token}.")), None);
    }

    #[test]
    fn wrong_key_is_rejected() {
        let token = encode_state(&json!({"strava_code": "abc"}), b"key-one").unwrap();
        assert_eq!(decode_state(&token, b"key-two"), None);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in ["", ".", "no-separator", "a.b.c", "!!!.???", "e30.", ".e30"] {
            assert_eq!(decode_state(token, SECRET), None, "accepted {token:?}");
        }
    }

    #[test]
    fn signed_non_json_is_rejected() {
        let codec = StateCodec::new(SECRET);
        let garbage = b"not json";
        let tag = codec.sign(garbage).unwrap();
        let token = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(garbage),
            URL_SAFE_NO_PAD.encode(tag)
        );
        assert_eq!(codec.decode::<Value>(&token), None);
    }

    #[test]
    fn shapes_are_not_interchangeable() {
        let codec = StateCodec::new(SECRET);

        let state_token = codec.encode(&sample_state()).unwrap();
        assert_eq!(codec.decode::<WrappedCode>(&state_token), None);

        let code_token = codec
            .encode(&WrappedCode {
                strava_code: "ABC123".to_string(),
                code_challenge: None,
            })
            .unwrap();
        assert_eq!(codec.decode::<AuthorizeState>(&code_token), None);
    }

    #[test]
    fn optional_challenge_is_omitted_when_absent() {
        let codec = StateCodec::new(SECRET);
        let token = codec
            .encode(&WrappedCode {
                strava_code: "ABC123".to_string(),
                code_challenge: None,
            })
            .unwrap();
        assert_eq!(
            decode_state(&token, SECRET),
            Some(json!({"strava_code": "ABC123"}))
        );
    }

    #[test]
    fn expiry_boundary() {
        let now = 1_700_000_600_000;
        let mut state = sample_state();

        state.timestamp = now - STATE_TTL_MS - 1;
        assert!(state.is_expired(now));

        state.timestamp = now - STATE_TTL_MS;
        assert!(!state.is_expired(now));

        state.timestamp = now - 9 * 60 * 1000;
        assert!(!state.is_expired(now));
    }
}
