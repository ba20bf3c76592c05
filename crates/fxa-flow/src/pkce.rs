//! PKCE verifier/challenge, flow nonces, and the ephemeral key exchange
//! used to request scoped keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

/// PKCE code verifier and its S256 challenge.
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("code_challenge", &self.code_challenge)
            .finish_non_exhaustive()
    }
}

pub fn generate_pkce_pair() -> PkcePair {
    let mut random = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut random);

    let code_verifier = URL_SAFE_NO_PAD.encode(random);
    let code_challenge = code_challenge_s256(&code_verifier);

    PkcePair {
        code_verifier,
        code_challenge,
    }
}

pub fn code_challenge_s256(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Unpredictable `state` value binding a redirect to one flow invocation.
pub fn generate_state() -> String {
    let mut random = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random);
    URL_SAFE_NO_PAD.encode(random)
}

/// Ephemeral X25519 key pair whose public half is sent as `keys_jwk`.
#[derive(Clone)]
pub struct KeyExchange {
    secret: StaticSecret,
}

#[derive(Serialize)]
struct OkpJwk<'a> {
    kty: &'a str,
    crv: &'a str,
    x: String,
}

impl KeyExchange {
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Public key as a base64url-encoded JSON Web Key.
    pub fn keys_jwk(&self) -> String {
        let public = PublicKey::from(&self.secret);
        let jwk = OkpJwk {
            kty: "OKP",
            crv: "X25519",
            x: URL_SAFE_NO_PAD.encode(public.as_bytes()),
        };
        // Serializing three string fields cannot fail
        let json = serde_json::to_vec(&jwk).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Private half, base64url-encoded, kept next to the JWE it can open.
    pub fn secret_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.secret.to_bytes())
    }
}

impl std::fmt::Debug for KeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyExchange([redacted])")
    }
}

impl PartialEq for KeyExchange {
    fn eq(&self, other: &Self) -> bool {
        self.secret.to_bytes() == other.secret.to_bytes()
    }
}

impl Eq for KeyExchange {}
