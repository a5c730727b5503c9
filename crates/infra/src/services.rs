//! Service wiring (composition root).

use std::sync::Arc;

use anyhow::Context;
use tokio::runtime::Handle;
use tracing::{info, warn};

use docvault_auth::{
    Argon2PasswordHasher, AuthSessionManager, Hs256TokenSigner, InMemoryBlacklist,
    InMemoryRefreshTokenStore, InMemoryUserStore,
};
use docvault_ingestion::{
    InMemoryIngestionJobStore, IngestionOrchestrator, OutcomeSource, RandomOutcomeSource,
    TokioTaskScheduler,
};

use crate::config::AppConfig;

/// Everything the request layer calls into.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<AuthSessionManager>,
    pub ingestion: IngestionOrchestrator,
}

impl Services {
    /// In-memory stores and the simulated connector.
    pub fn in_memory(config: &AppConfig, runtime: Handle) -> Self {
        let outcomes = Arc::new(RandomOutcomeSource::new(config.success_rate));
        Self::with_outcome_source(config, outcomes, runtime)
    }

    /// In-memory stores with a caller-supplied outcome source.
    pub fn with_outcome_source(
        config: &AppConfig,
        outcomes: Arc<dyn OutcomeSource>,
        runtime: Handle,
    ) -> Self {
        let auth = AuthSessionManager::new(
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemoryRefreshTokenStore::new()),
            Arc::new(Hs256TokenSigner::new(config.jwt_secret.as_bytes())),
            Arc::new(Argon2PasswordHasher::new()),
            Arc::new(InMemoryBlacklist::new()),
        )
        .with_config(config.session);

        let ingestion = IngestionOrchestrator::new(
            Arc::new(InMemoryIngestionJobStore::new()),
            outcomes,
            Arc::new(TokioTaskScheduler::new(runtime)),
            config.ingestion.clone(),
        );

        Self {
            auth: Arc::new(auth),
            ingestion,
        }
    }
}

/// Load configuration, install logging and wire services on the current
/// tokio runtime.
pub fn bootstrap() -> anyhow::Result<Services> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    docvault_observability::tracing::init(config.log_format);

    if config.insecure_jwt_secret {
        warn!("JWT_SECRET not set; using insecure dev default");
    }

    let runtime = Handle::try_current().context("services must be started inside a tokio runtime")?;
    let services = Services::in_memory(&config, runtime);

    info!(
        max_retries = config.ingestion.retry_policy.max_retries,
        backoff = ?config.ingestion.retry_policy.strategy,
        success_rate = config.success_rate,
        cancel_pending_retries = config.ingestion.cancel_pending_retries,
        "services initialized"
    );
    Ok(services)
}
