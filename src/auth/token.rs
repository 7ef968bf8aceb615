//! Credential tokens.
//!
//! A token's plaintext is handed to the client once at issuance. Only its
//! SHA-256 hash is persisted, so a leaked store does not leak usable tokens.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a token plaintext in characters.
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

/// RFC 4648 base32 alphabet, the only characters a plaintext may contain.
const TOKEN_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Authentication,
    Activation,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Authentication => "authentication",
            Scope::Activation => "activation",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 digest of a token plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    pub fn of(plaintext: &str) -> Self {
        Self(Sha256::digest(plaintext.as_bytes()).into())
    }

}

impl std::fmt::Display for TokenHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// An issued token.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: TokenHash,
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl Token {
    /// Generate a fresh token for `user_id` valid for `ttl` from `now`.
    pub fn generate(user_id: i64, ttl: Duration, scope: Scope, now: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let plaintext: String = (0..TOKEN_PLAINTEXT_LEN)
            .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
            .collect();

        Self {
            hash: TokenHash::of(&plaintext),
            plaintext,
            user_id,
            expiry: now + ttl,
            scope,
        }
    }
}

/// A token is dead from its expiry instant onwards.
pub fn is_expired(expiry: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expiry <= now
}

/// Cheap structural check done before any store lookup.
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_PLAINTEXT_LEN
        && plaintext.bytes().all(|b| TOKEN_ALPHABET.contains(&b))
}
