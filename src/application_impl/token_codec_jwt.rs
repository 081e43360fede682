use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
pub struct JwtConfig {
    pub access_ttl: Duration,
    pub signing_key: Vec<u8>,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_ttl", &self.access_ttl)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

/// HS512 signer for access tokens. The key is injected once and never changes.
pub struct JwtHs512Codec {
    cfg: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtHs512Codec {
    pub fn try_new(cfg: JwtConfig) -> Result<Self, GenerationError> {
        if cfg.signing_key.is_empty() {
            return Err(GenerationError::Signing("signing key is empty".to_string()));
        }
        Ok(JwtHs512Codec {
            encoding_key: EncodingKey::from_secret(&cfg.signing_key),
            decoding_key: DecodingKey::from_secret(&cfg.signing_key),
            cfg,
        })
    }

    fn validation() -> Validation {
        let mut v = Validation::new(Algorithm::HS512);
        v.validate_exp = true;
        v.set_required_spec_claims(&["exp", "sub"]);
        v
    }
}

#[async_trait::async_trait]
impl TokenSigner for JwtHs512Codec {
    async fn sign_access(
        &self,
        subject: &Subject,
        issued_at: DateTime<Utc>,
    ) -> Result<(AccessToken, DateTime<Utc>), GenerationError> {
        let exp_dt = issued_at + self.cfg.access_ttl;
        let claims = AccessClaims {
            sub: subject.to_string(),
            iat: issued_at.timestamp(),
            exp: exp_dt.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS512), &claims, &self.encoding_key)
            .map_err(|e| GenerationError::Signing(e.to_string()))?;
        Ok((AccessToken(token), exp_dt))
    }

    async fn verify_access(&self, token: &AccessToken) -> Result<AccessClaims, VerifyError> {
        let data = decode::<AccessClaims>(&token.0, &self.decoding_key, &Self::validation())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => VerifyError::TokenExpired,
                _ => VerifyError::TokenInvalid,
            })?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(key: &[u8]) -> JwtHs512Codec {
        JwtHs512Codec::try_new(JwtConfig {
            access_ttl: DEFAULT_ACCESS_TTL,
            signing_key: key.to_vec(),
        })
        .unwrap()
    }

    #[test]
    fn empty_key_is_rejected_at_construction() {
        let result = JwtHs512Codec::try_new(JwtConfig {
            access_ttl: DEFAULT_ACCESS_TTL,
            signing_key: Vec::new(),
        });
        assert!(matches!(result, Err(GenerationError::Signing(_))));
    }

    #[tokio::test]
    async fn signed_token_verifies_with_same_key() {
        let codec = codec(b"test-access-key");
        let subject = Subject::parse("guid-42").unwrap();
        let now = Utc::now();
        let (token, exp) = codec.sign_access(&subject, now).await.unwrap();

        let claims = codec.verify_access(&token).await.unwrap();
        assert_eq!(claims.sub, "guid-42");
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.exp, exp.timestamp());
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[tokio::test]
    async fn token_from_other_key_is_invalid() {
        let subject = Subject::parse("guid-42").unwrap();
        let (token, _) = codec(b"key-a")
            .sign_access(&subject, Utc::now())
            .await
            .unwrap();
        let result = codec(b"key-b").verify_access(&token).await;
        assert!(matches!(result, Err(VerifyError::TokenInvalid)));
    }

    #[tokio::test]
    async fn stale_token_is_expired() {
        let codec = codec(b"test-access-key");
        let subject = Subject::parse("guid-42").unwrap();
        let long_ago = Utc::now() - chrono::Duration::hours(2);
        let (token, _) = codec.sign_access(&subject, long_ago).await.unwrap();
        let result = codec.verify_access(&token).await;
        assert!(matches!(result, Err(VerifyError::TokenExpired)));
    }
}
