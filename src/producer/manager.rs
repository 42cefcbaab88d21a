//! Producer lifecycle manager
//!
//! One `ProducerManager` owns all live producers for the process. A publish
//! request is reduced to its effective `ClientSettings`, and the producer
//! cache hands back the existing handle for those settings or builds one
//! through the configured factory. Displaced and idle producers are closed
//! by the cache's eviction hook; close failures are logged, never surfaced.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::settings::{ClientSettings, PublishRequest};
use super::{Producer, ProducerError, ProducerFactory};
use crate::cache::{EvictionReason, HandleCache};
use crate::config::{Config, PublishConfig};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Producer creation failed: {0}")]
    CreationFailed(Arc<ProducerError>),
}

/// Facade over the settings builder and the producer cache.
///
/// Stateless beyond the publish defaults captured at construction and the
/// owned cache; safe to share across tasks behind an `Arc`.
pub struct ProducerManager {
    defaults: PublishConfig,
    factory: Arc<dyn ProducerFactory>,
    cache: HandleCache<ClientSettings, Arc<dyn Producer>, ProducerError>,
}

impl ProducerManager {
    pub fn new(config: &Config, factory: Arc<dyn ProducerFactory>) -> Self {
        let cache = HandleCache::new(
            config.cache.max_producers,
            config.cache.idle_timeout(),
            |settings: &ClientSettings, producer: &Arc<dyn Producer>, reason: EvictionReason| {
                match producer.close() {
                    Ok(()) => info!(%settings, ?reason, "Closed producer"),
                    Err(error) => warn!(%settings, ?reason, %error, "Failed to close producer"),
                }
            },
        );
        info!(
            max_producers = config.cache.max_producers,
            idle_timeout_ms = config.cache.idle_timeout_ms,
            "Producer manager initialized"
        );
        Self {
            defaults: config.publish.clone(),
            factory,
            cache,
        }
    }

    /// Return a ready-to-use producer for this request.
    ///
    /// Requests resolving to equal effective settings share one producer;
    /// concurrent first requests share one creation attempt. A creation
    /// failure reaches every waiting caller and is not cached, so the next
    /// request for the same settings retries.
    pub async fn producer(
        &self,
        request: &PublishRequest,
    ) -> Result<Arc<dyn Producer>, ManagerError> {
        let settings = ClientSettings::for_request(request, &self.defaults);
        let factory = Arc::clone(&self.factory);
        let creation_settings = settings.clone();
        self.cache
            .get_or_create(settings, move || async move {
                info!(settings = %creation_settings, "Creating producer");
                factory.create(creation_settings).await
            })
            .await
            .map_err(ManagerError::CreationFailed)
    }

    /// Number of live producers currently cached
    pub async fn cached_producers(&self) -> usize {
        self.cache.ready_handles().await
    }
}
