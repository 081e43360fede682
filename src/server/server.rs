use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use anyhow::anyhow;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Server {
    pub session_service: Arc<dyn SessionService>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<MySqlPool>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let access_ttl = Duration::from_secs(settings.token.access_ttl_secs);
        let refresh_ttl = Duration::from_secs(settings.token.refresh_ttl_secs);
        let connect_timeout = Duration::from_millis(settings.store.connect_timeout_ms);
        let op_timeout = Duration::from_millis(settings.store.op_timeout_ms);

        let signer = Arc::new(JwtHs512Codec::try_new(JwtConfig {
            access_ttl,
            signing_key: read_key(&settings.token.access_key_env)?,
        })?);

        let deriver: Arc<dyn SecretDeriver> = match settings.token.secret_backend.as_str() {
            "hmac" => Arc::new(HmacSecretDeriver::try_new(read_key(
                &settings.token.refresh_key_env,
            )?)?),
            "argon2" => Arc::new(Argon2SecretDeriver),
            other => return Err(anyhow!("Unknown secret backend: {}", other)),
        };

        let mut pool = None;
        let store: Arc<dyn RefreshStore> = match settings.store.backend.as_str() {
            "memory" => Arc::new(MemoryRefreshStore::new(clock.clone())),
            "redis" => {
                let dsn = settings
                    .store
                    .redis_dsn
                    .as_deref()
                    .ok_or_else(|| anyhow!("store.redis_dsn is required for the redis backend"))?;
                let redis_client = redis::Client::open(dsn)?;
                let redis_manager =
                    tokio::time::timeout(connect_timeout, redis_client.get_connection_manager())
                        .await
                        .map_err(|_| anyhow!("timed out connecting to redis"))??;
                Arc::new(RedisRefreshStore::new(
                    redis_manager,
                    settings.store.prefix.clone(),
                    clock.clone(),
                ))
            }
            "mysql" => {
                let dsn = settings
                    .store
                    .mysql_dsn
                    .as_deref()
                    .ok_or_else(|| anyhow!("store.mysql_dsn is required for the mysql backend"))?;
                let mysql_pool = tokio::time::timeout(
                    connect_timeout,
                    MySqlPoolOptions::new()
                        .acquire_timeout(op_timeout)
                        .connect(dsn),
                )
                .await
                .map_err(|_| anyhow!("timed out connecting to mysql"))??;
                let mysql_store = MySqlRefreshStore::new(mysql_pool.clone(), clock.clone());
                mysql_store.ensure_schema().await?;
                pool = Some(mysql_pool);
                Arc::new(mysql_store)
            }
            other => return Err(anyhow!("Unknown store backend: {}", other)),
        };

        let issuer: Arc<dyn CredentialIssuer> = Arc::new(CredentialGenerator::new(
            signer.clone(),
            deriver,
            Arc::new(OsNonceSource),
            clock,
            refresh_ttl,
        ));
        let session_service: Arc<dyn SessionService> = Arc::new(RealSessionService::new(
            issuer,
            signer,
            store.clone(),
            refresh_ttl,
            op_timeout,
        ));

        let cancel = CancellationToken::new();
        let sweep_every = Duration::from_secs(settings.store.sweep_interval_secs.max(1));
        let sweeper_handle = tokio::spawn(run_sweeper(store, sweep_every, cancel.clone()));

        info!(backend = %settings.store.backend, "server started");

        Ok(Self {
            session_service,
            sweeper_handle: Mutex::new(Some(sweeper_handle)),
            cancel,
            pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = self
            .sweeper_handle
            .lock()
            .ok()
            .and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("sweeper handle dropped: {:?}", r);
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

fn read_key(var: &str) -> anyhow::Result<Vec<u8>> {
    let key = std::env::var(var).map_err(|_| anyhow!("signing key variable {} is not set", var))?;
    if key.len() < 32 {
        warn!("key in {} is shorter than 32 bytes", var);
    }
    Ok(key.into_bytes())
}

pub async fn run_sweeper(store: Arc<dyn RefreshStore>, every: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "expired refresh tokens purged"),
                Err(e) => warn!("purging expired refresh tokens failed: {}", e),
            },
        }
    }
}
