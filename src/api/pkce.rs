use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

pub const VERIFIER_LEN: usize = 40;

/// Proof-of-possession pair for one login attempt. Never stored on the session.
pub struct AuthorizationMaterial {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl AuthorizationMaterial {
    pub fn generate() -> Self {
        Self::from_verifier(generate_verifier(VERIFIER_LEN))
    }

    pub fn from_verifier(code_verifier: String) -> Self {
        let code_challenge = challenge(&code_verifier);
        AuthorizationMaterial {
            code_verifier,
            code_challenge,
        }
    }
}

pub fn generate_verifier(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// base64url(SHA-256(verifier)) without padding
pub fn challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}
