//! Compact signed bearer tokens.
//!
//! A token is three dot-joined base64url (unpadded) segments:
//! `header.payload.signature`, where the signature is HMAC-SHA256 over
//! `header.payload` keyed with the process-wide secret. Tokens are stateless
//! and cannot be revoked; they simply stop verifying after `exp`.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64URL};
use chrono::{DateTime, Duration, Utc};
use hal_core::user::UserId;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// How long an issued token stays valid.
pub const TOKEN_TTL_DAYS: i64 = 30;

const ALGORITHM: &str = "HS256";

/// The single outcome of every failed verification: bad structure, bad
/// signature, unsupported algorithm and expiry are indistinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid token")]
pub struct InvalidToken;

#[derive(Debug, Error)]
#[error("token secret must not be empty")]
pub struct InvalidSecret;

#[derive(Serialize, Deserialize)]
struct Header {
  alg: String,
  #[serde(default)]
  typ: Option<String>,
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
  pub sub: UserId,
  pub iat: i64,
  pub exp: i64,
}

/// Issues and verifies tokens with one symmetric key fixed at construction.
#[derive(Clone)]
pub struct TokenCodec {
  mac: HmacSha256,
}

impl TokenCodec {
  pub fn new(secret: &[u8]) -> Result<Self, InvalidSecret> {
    if secret.is_empty() {
      return Err(InvalidSecret);
    }
    let mac = HmacSha256::new_from_slice(secret).map_err(|_| InvalidSecret)?;
    Ok(Self { mac })
  }

  /// Mint a token for `subject`, valid for [`TOKEN_TTL_DAYS`] from `now`.
  pub fn issue(&self, subject: UserId, now: DateTime<Utc>) -> String {
    let header = Header { alg: ALGORITHM.to_owned(), typ: Some("JWT".to_owned()) };
    let claims = Claims {
      sub: subject,
      iat: now.timestamp(),
      exp: (now + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
    };

    // Serialising these plain structs cannot fail.
    let header = B64URL.encode(serde_json::to_vec(&header).unwrap_or_default());
    let payload = B64URL.encode(serde_json::to_vec(&claims).unwrap_or_default());
    let signing_input = format!("{header}.{payload}");
    let signature = B64URL.encode(self.sign(signing_input.as_bytes()));

    format!("{signing_input}.{signature}")
  }

  /// Return the subject of a well-formed, authentic, unexpired token.
  pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<UserId, InvalidToken> {
    self.decode(token, now).map(|claims| claims.sub)
  }

  /// Like [`verify`](Self::verify) but returns every claim.
  pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, InvalidToken> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
      (parts.next(), parts.next(), parts.next(), parts.next())
    else {
      return Err(InvalidToken);
    };

    let header_json = B64URL.decode(header).map_err(|_| InvalidToken)?;
    let parsed: Header = serde_json::from_slice(&header_json).map_err(|_| InvalidToken)?;
    if parsed.alg != ALGORITHM {
      return Err(InvalidToken);
    }

    let signature = B64URL.decode(signature).map_err(|_| InvalidToken)?;
    let mut mac = self.mac.clone();
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature).map_err(|_| InvalidToken)?;

    let payload_json = B64URL.decode(payload).map_err(|_| InvalidToken)?;
    let claims: Claims = serde_json::from_slice(&payload_json).map_err(|_| InvalidToken)?;
    if claims.exp < now.timestamp() {
      return Err(InvalidToken);
    }

    Ok(claims)
  }

  fn sign(&self, input: &[u8]) -> Vec<u8> {
    let mut mac = self.mac.clone();
    mac.update(input);
    mac.finalize().into_bytes().to_vec()
  }
}
