//! OAuth PKCE (Proof Key for Code Exchange), RFC 7636
//!
//! 1. Generate a code_verifier (43-128 characters of [A-Za-z0-9._~-])
//! 2. Send code_challenge = BASE64URL(SHA256(code_verifier)) with the authorization request
//! 3. Send the code_verifier with the token request

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Challenge method sent with the authorization request
pub const CHALLENGE_METHOD: &str = "S256";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PkceError {
    #[error("Code verifier must be 43-128 unreserved characters, got {0} characters")]
    InvalidVerifier(usize),
}

/// Verifier, derived challenge and anti-CSRF state for one authorization
#[derive(Clone)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
    state: String,
}

impl std::fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("challenge", &self.challenge)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PkceChallenge {
    /// Generates a fresh verifier from 32 random bytes (43 characters once encoded)
    pub fn generate() -> Self {
        let verifier_bytes: [u8; 32] = rand::random();
        let state_bytes: [u8; 16] = rand::random();

        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
            state: URL_SAFE_NO_PAD.encode(state_bytes),
        }
    }

    /// Builds a challenge from a known verifier and state
    pub fn from_verifier(verifier: &str, state: &str) -> Result<Self, PkceError> {
        if !is_valid_code_verifier(verifier) {
            return Err(PkceError::InvalidVerifier(verifier.len()));
        }
        Ok(Self {
            verifier: verifier.to_string(),
            challenge: challenge_for(verifier),
            state: state.to_string(),
        })
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn state(&self) -> &str {
        &self.state
    }
}

/// RFC 7636 verifier rules: 43-128 characters from [A-Za-z0-9._~-]
pub fn is_valid_code_verifier(verifier: &str) -> bool {
    (43..=128).contains(&verifier.len())
        && verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

fn challenge_for(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}
