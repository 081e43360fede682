use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use std::sync::Arc;
use std::time::Duration;

pub const NONCE_LEN: usize = 32;
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(72 * 60 * 60);

#[derive(Debug, Default)]
pub struct OsNonceSource;

impl NonceSource for OsNonceSource {
    fn fill(&self, buf: &mut [u8]) -> Result<(), NonceError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| NonceError(e.to_string()))
    }
}

pub struct CredentialGenerator {
    signer: Arc<dyn TokenSigner>,
    deriver: Arc<dyn SecretDeriver>,
    nonces: Arc<dyn NonceSource>,
    clock: Arc<dyn Clock>,
    refresh_ttl: Duration,
}

impl CredentialGenerator {
    pub fn new(
        signer: Arc<dyn TokenSigner>,
        deriver: Arc<dyn SecretDeriver>,
        nonces: Arc<dyn NonceSource>,
        clock: Arc<dyn Clock>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            signer,
            deriver,
            nonces,
            clock,
            refresh_ttl,
        }
    }
}

#[async_trait::async_trait]
impl CredentialIssuer for CredentialGenerator {
    async fn issue(&self, subject: &Subject) -> Result<CredentialPair, GenerationError> {
        let now = self.clock.now();
        let (access, access_expires_at) = self.signer.sign_access(subject, now).await?;

        let mut nonce = [0u8; NONCE_LEN];
        self.nonces.fill(&mut nonce)?;
        let secret = self.deriver.derive(subject, &nonce).await?;

        Ok(CredentialPair {
            access,
            refresh: RefreshToken::compose(subject, &secret),
            access_expires_at,
            refresh_expires_at: now + self.refresh_ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::*;
    use chrono::Utc;

    struct BrokenNonceSource;

    impl NonceSource for BrokenNonceSource {
        fn fill(&self, _buf: &mut [u8]) -> Result<(), NonceError> {
            Err(NonceError("no entropy".to_string()))
        }
    }

    fn generator(nonces: Arc<dyn NonceSource>) -> CredentialGenerator {
        let signer = JwtHs512Codec::try_new(JwtConfig {
            access_ttl: DEFAULT_ACCESS_TTL,
            signing_key: b"test-access-key".to_vec(),
        })
        .unwrap();
        let deriver = HmacSecretDeriver::try_new(b"test-refresh-key".to_vec()).unwrap();
        CredentialGenerator::new(
            Arc::new(signer),
            Arc::new(deriver),
            nonces,
            Arc::new(ManualClock::new(Utc::now())),
            DEFAULT_REFRESH_TTL,
        )
    }

    #[tokio::test]
    async fn same_subject_gets_distinct_refresh_values() {
        let generator = generator(Arc::new(OsNonceSource));
        let subject = Subject::parse("guid-42").unwrap();

        let first = generator.issue(&subject).await.unwrap();
        let second = generator.issue(&subject).await.unwrap();

        assert_ne!(first.refresh, second.refresh);
        let (_, parsed_subject) = RefreshToken::parse(first.refresh.as_str()).unwrap();
        assert_eq!(parsed_subject, subject);
        assert_eq!(
            first.refresh_expires_at - first.access_expires_at,
            chrono::Duration::hours(72) - chrono::Duration::minutes(15)
        );
    }

    #[tokio::test]
    async fn entropy_failure_is_a_generation_error() {
        let generator = generator(Arc::new(BrokenNonceSource));
        let subject = Subject::parse("guid-42").unwrap();
        let result = generator.issue(&subject).await;
        assert!(matches!(result, Err(GenerationError::Entropy(_))));
    }
}
