use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Fresh candidates tried when a generated refresh value collides with a live one.
pub const MAX_ISSUE_ATTEMPTS: usize = 3;

pub struct RealSessionService {
    issuer: Arc<dyn CredentialIssuer>,
    signer: Arc<dyn TokenSigner>,
    store: Arc<dyn RefreshStore>,
    refresh_ttl: Duration,
    store_timeout: Duration,
}

impl RealSessionService {
    pub fn new(
        issuer: Arc<dyn CredentialIssuer>,
        signer: Arc<dyn TokenSigner>,
        store: Arc<dyn RefreshStore>,
        refresh_ttl: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            issuer,
            signer,
            store,
            refresh_ttl,
            store_timeout,
        }
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, RefreshStoreError>
    where
        F: Future<Output = Result<T, RefreshStoreError>>,
    {
        tokio::time::timeout(self.store_timeout, op)
            .await
            .map_err(|_| RefreshStoreError::Timeout)?
    }

    async fn issue(&self, subject: &Subject) -> Result<CredentialPair, SessionError> {
        self.issuer.issue(subject).await.map_err(|e| {
            warn!("credential generation failed: {}", e);
            SessionError::from(e)
        })
    }

    fn collisions_exhausted() -> SessionError {
        SessionError::GenerationFailed(GenerationError::Entropy(format!(
            "refresh value collided {MAX_ISSUE_ATTEMPTS} times"
        )))
    }
}

#[async_trait::async_trait]
impl SessionService for RealSessionService {
    async fn new_session(&self, subject: &str) -> Result<CredentialPair, SessionError> {
        let subject = Subject::parse(subject)?;

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let pair = self.issue(&subject).await?;
            let outcome = self
                .bounded(self.store.insert_new(&subject, &pair.refresh, self.refresh_ttl))
                .await
                .map_err(|e| {
                    warn!("storing new refresh token failed: {}", e);
                    SessionError::from(e)
                })?;

            match outcome {
                InsertOutcome::Inserted(slot) => {
                    info!(%slot, "session issued");
                    return Ok(pair);
                }
                InsertOutcome::Duplicate => {
                    warn!(attempt, "refresh value collided with a live record, regenerating");
                }
            }
        }

        Err(Self::collisions_exhausted())
    }

    async fn refresh_session(&self, presented: &str) -> Result<CredentialPair, SessionError> {
        let (old, subject) = RefreshToken::parse(presented)?;

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            // Every attempt rotates to a freshly generated candidate.
            let candidate = self.issue(&subject).await?;
            let outcome = self
                .bounded(
                    self.store
                        .check_and_rotate(&old, &candidate.refresh, self.refresh_ttl),
                )
                .await
                .map_err(|e| {
                    warn!("rotation outcome unknown, storage failed: {}", e);
                    SessionError::from(e)
                })?;

            match outcome {
                RotationOutcome::Rotated { slot, generation } => {
                    info!(%slot, generation, "session rotated");
                    return Ok(candidate);
                }
                RotationOutcome::NotFound => {
                    debug!("rotation rejected: refresh token not found");
                    return Err(SessionError::NotFound);
                }
                RotationOutcome::Expired => {
                    debug!("rotation rejected: refresh token expired");
                    return Err(SessionError::NotFound);
                }
                RotationOutcome::Duplicate => {
                    warn!(attempt, "rotation candidate collided with a live record, regenerating");
                }
            }
        }

        Err(Self::collisions_exhausted())
    }

    async fn revoke_session(&self, presented: &str) -> Result<(), SessionError> {
        let (token, _) = RefreshToken::parse(presented)?;
        let removed = self.bounded(self.store.revoke(&token)).await.map_err(|e| {
            warn!("revoking refresh token failed: {}", e);
            SessionError::from(e)
        })?;
        if removed {
            info!("session revoked");
            Ok(())
        } else {
            Err(SessionError::NotFound)
        }
    }

    async fn verify_access(&self, token: &AccessToken) -> Result<AccessClaims, SessionError> {
        Ok(self.signer.verify_access(token).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::*;
    use crate::infra_memory::MemoryRefreshStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Fail,
        Hang,
        DuplicateOnce,
    }

    /// Wraps the memory store and misbehaves on demand.
    struct FlakyStore {
        inner: MemoryRefreshStore,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl FlakyStore {
        fn new(behaviour: Behaviour) -> Self {
            FlakyStore {
                inner: MemoryRefreshStore::new(Arc::new(SystemClock)),
                behaviour,
                calls: AtomicUsize::new(0),
            }
        }

        async fn misbehave(&self) -> Option<RefreshStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Fail => Some(RefreshStoreError::Store("connection reset".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    None
                }
                Behaviour::DuplicateOnce => None,
            }
        }
    }

    #[async_trait::async_trait]
    impl RefreshStore for FlakyStore {
        async fn insert_new(
            &self,
            subject: &Subject,
            token: &RefreshToken,
            ttl: Duration,
        ) -> Result<InsertOutcome, RefreshStoreError> {
            if let Some(e) = self.misbehave().await {
                return Err(e);
            }
            if matches!(self.behaviour, Behaviour::DuplicateOnce)
                && self.calls.load(Ordering::SeqCst) == 1
            {
                return Ok(InsertOutcome::Duplicate);
            }
            self.inner.insert_new(subject, token, ttl).await
        }

        async fn check_and_rotate(
            &self,
            old: &RefreshToken,
            new: &RefreshToken,
            ttl: Duration,
        ) -> Result<RotationOutcome, RefreshStoreError> {
            if let Some(e) = self.misbehave().await {
                return Err(e);
            }
            self.inner.check_and_rotate(old, new, ttl).await
        }

        async fn revoke(&self, token: &RefreshToken) -> Result<bool, RefreshStoreError> {
            self.inner.revoke(token).await
        }

        async fn purge_expired(&self) -> Result<u64, RefreshStoreError> {
            self.inner.purge_expired().await
        }

        async fn find_live(
            &self,
            token: &RefreshToken,
        ) -> Result<Option<RefreshRecord>, RefreshStoreError> {
            self.inner.find_live(token).await
        }
    }

    struct FailingIssuer;

    #[async_trait::async_trait]
    impl CredentialIssuer for FailingIssuer {
        async fn issue(&self, _subject: &Subject) -> Result<CredentialPair, GenerationError> {
            Err(GenerationError::Signing("bad key".into()))
        }
    }

    fn signer() -> Arc<JwtHs512Codec> {
        Arc::new(
            JwtHs512Codec::try_new(JwtConfig {
                access_ttl: DEFAULT_ACCESS_TTL,
                signing_key: b"test-access-key".to_vec(),
            })
            .unwrap(),
        )
    }

    fn service_with(store: Arc<dyn RefreshStore>) -> RealSessionService {
        let signer = signer();
        let issuer = CredentialGenerator::new(
            signer.clone(),
            Arc::new(HmacSecretDeriver::try_new(b"test-refresh-key".to_vec()).unwrap()),
            Arc::new(OsNonceSource),
            Arc::new(SystemClock),
            DEFAULT_REFRESH_TTL,
        );
        RealSessionService::new(
            Arc::new(issuer),
            signer,
            store,
            DEFAULT_REFRESH_TTL,
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn empty_subject_is_bad_request() {
        let service = service_with(Arc::new(MemoryRefreshStore::new(Arc::new(SystemClock))));
        let result = service.new_session("").await;
        assert!(matches!(result, Err(SessionError::BadRequest(_))));
    }

    #[tokio::test]
    async fn malformed_refresh_is_bad_request() {
        let service = service_with(Arc::new(MemoryRefreshStore::new(Arc::new(SystemClock))));
        let result = service.refresh_session("definitely not a token").await;
        assert!(matches!(result, Err(SessionError::BadRequest(_))));
    }

    #[tokio::test]
    async fn store_failure_on_insert_is_storage_failed() {
        let service = service_with(Arc::new(FlakyStore::new(Behaviour::Fail)));
        let result = service.new_session("guid-42").await;
        assert!(matches!(
            result,
            Err(SessionError::StorageFailed(RefreshStoreError::Store(_)))
        ));
    }

    #[tokio::test]
    async fn hanging_store_times_out() {
        let service = service_with(Arc::new(FlakyStore::new(Behaviour::Hang)));
        let result = service.new_session("guid-42").await;
        assert!(matches!(
            result,
            Err(SessionError::StorageFailed(RefreshStoreError::Timeout))
        ));
    }

    #[tokio::test]
    async fn rotation_failure_is_not_retried() {
        let store = Arc::new(FlakyStore::new(Behaviour::Fail));
        let service = service_with(store.clone());
        let subject = Subject::parse("guid-42").unwrap();
        let token = RefreshToken::compose(&subject, &"0".repeat(SECRET_HEX_LEN));

        let result = service.refresh_session(token.as_str()).await;
        assert!(matches!(result, Err(SessionError::StorageFailed(_))));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn insert_collision_regenerates() {
        let store = Arc::new(FlakyStore::new(Behaviour::DuplicateOnce));
        let service = service_with(store.clone());

        let pair = service.new_session("guid-42").await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        assert!(store.find_live(&pair.refresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn generation_failure_is_reported() {
        let service = RealSessionService::new(
            Arc::new(FailingIssuer),
            signer(),
            Arc::new(MemoryRefreshStore::new(Arc::new(SystemClock))),
            DEFAULT_REFRESH_TTL,
            Duration::from_secs(1),
        );
        let result = service.new_session("guid-42").await;
        assert!(matches!(result, Err(SessionError::GenerationFailed(_))));
    }

    #[tokio::test]
    async fn revoked_session_cannot_rotate() {
        let service = service_with(Arc::new(MemoryRefreshStore::new(Arc::new(SystemClock))));
        let pair = service.new_session("guid-42").await.unwrap();

        service.revoke_session(pair.refresh.as_str()).await.unwrap();

        let again = service.revoke_session(pair.refresh.as_str()).await;
        assert!(matches!(again, Err(SessionError::NotFound)));
        let result = service.refresh_session(pair.refresh.as_str()).await;
        assert!(matches!(result, Err(SessionError::NotFound)));
    }

    #[tokio::test]
    async fn access_token_verifies_through_service() {
        let service = service_with(Arc::new(MemoryRefreshStore::new(Arc::new(SystemClock))));
        let pair = service.new_session("guid-42").await.unwrap();
        let claims = service.verify_access(&pair.access).await.unwrap();
        assert_eq!(claims.sub, "guid-42");

        let forged = AccessToken(format!("{}x", pair.access.0));
        assert!(matches!(
            service.verify_access(&forged).await,
            Err(SessionError::Unauthorized(_))
        ));
    }
}
