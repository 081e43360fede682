use super::{Subject, SubjectError};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the hex-encoded secret part of a refresh value (32 bytes).
pub const SECRET_HEX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessToken(pub String);

/// Raw refresh value: `<base64url(subject)>.<hex secret>`.
///
/// The whole string is the store lookup key, so the subject prefix cannot be
/// altered without turning the value into an unknown one.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RefreshToken(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshTokenError {
    #[error("refresh token is not valid base64")]
    Encoding,
    #[error("refresh token is malformed")]
    Malformed,
    #[error("refresh token subject is invalid: {0}")]
    Subject(#[from] SubjectError),
}

impl RefreshToken {
    pub fn compose(subject: &Subject, secret_hex: &str) -> Self {
        RefreshToken(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(subject.as_str()),
            secret_hex
        ))
    }

    /// Parse a raw refresh value and recover the subject it was issued to.
    pub fn parse(raw: &str) -> Result<(Self, Subject), RefreshTokenError> {
        let (prefix, secret) = raw.split_once('.').ok_or(RefreshTokenError::Malformed)?;
        let secret_ok = secret.len() == SECRET_HEX_LEN
            && secret
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !secret_ok {
            return Err(RefreshTokenError::Malformed);
        }
        let subject_bytes = URL_SAFE_NO_PAD
            .decode(prefix)
            .map_err(|_| RefreshTokenError::Malformed)?;
        let subject_str =
            String::from_utf8(subject_bytes).map_err(|_| RefreshTokenError::Malformed)?;
        let subject = Subject::parse(&subject_str)?;
        Ok((RefreshToken(raw.to_string()), subject))
    }

    /// Unwrap the transport form (standard base64 of the raw value).
    pub fn decode_transport(encoded: &str) -> Result<String, RefreshTokenError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|_| RefreshTokenError::Encoding)?;
        String::from_utf8(raw).map_err(|_| RefreshTokenError::Encoding)
    }

    pub fn from_transport(encoded: &str) -> Result<(Self, Subject), RefreshTokenError> {
        Self::parse(&Self::decode_transport(encoded)?)
    }

    pub fn to_transport(&self) -> String {
        STANDARD.encode(self.0.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshToken(<redacted>)")
    }
}

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct CredentialPair {
    pub access: AccessToken,
    pub refresh: RefreshToken,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Wire shape of a pair; the refresh value is base64-wrapped.
#[derive(Debug, Clone, Serialize)]
pub struct TransportPair {
    pub access: String,
    pub refresh: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl From<&CredentialPair> for TransportPair {
    fn from(pair: &CredentialPair) -> Self {
        TransportPair {
            access: pair.access.0.clone(),
            refresh: pair.refresh.to_transport(),
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: pair.refresh_expires_at,
        }
    }
}
