//! Opaque bearer tokens.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;

/// Length of a token in bytes. The text form is twice this many hex digits.
pub const TOKEN_LEN: usize = 16;

/// The text passed to [`Token::from_str`] was not exactly 32 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid token")]
pub struct InvalidTokenError;

/// A cryptographically random 128-bit bearer secret.
///
/// Tokens gate both the admin surface (the configured admin token) and
/// per-node console/power access. Equality is constant-time; the hex codec
/// is strict (exactly 32 hex digits, rejected before parsing otherwise).
///
/// `Debug` is redacted so a token can never leak through logging.
#[derive(Clone, Copy)]
pub struct Token([u8; TOKEN_LEN]);

impl Token {
    /// Generate a fresh token from the thread-local CSPRNG.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; TOKEN_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Encode as 32 lowercase hex digits.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Constant-time equality against another token.
    pub fn ct_eq(&self, other: &Token) -> bool {
        self.0.ct_eq(&other.0).into()
    }

    /// Raw bytes, for persistence and tests.
    pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }
}

impl From<[u8; TOKEN_LEN]> for Token {
    fn from(bytes: [u8; TOKEN_LEN]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Token {
    type Err = InvalidTokenError;

    /// Strict decode: length and alphabet are checked before parsing, so the
    /// only accepted inputs are exactly 32 hex digits. The length check is
    /// not constant-time; the canonical length is public.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 2 * TOKEN_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidTokenError);
        }
        let mut bytes = [0u8; TOKEN_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| InvalidTokenError)?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(..)")
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
