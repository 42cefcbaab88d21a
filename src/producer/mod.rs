//! Producer abstraction over the broker client
//!
//! The traits here isolate the rest of the crate from any concrete client
//! library: the manager only ever sees `ProducerFactory` and `Producer`.
//! `MockProducer` / `MockProducerFactory` are the in-process stand-ins used
//! by tests and local development.

pub mod manager;
pub mod settings;

pub use manager::{ManagerError, ProducerManager};
pub use settings::{
    BOOTSTRAP_SERVERS, ClientSettings, KEY_SERIALIZER, MAX_BLOCK_MS, PublishRequest,
    REQUEST_TIMEOUT_MS, SASL_JAAS_CONFIG, SASL_MECHANISM, SECURITY_PROTOCOL, STRING_SERIALIZER,
    VALUE_SERIALIZER,
};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("Producer construction failed: {0}")]
    Construction(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Close failed: {0}")]
    CloseFailed(String),
}

pub type Result<T> = std::result::Result<T, ProducerError>;

/// Live producer handle
#[async_trait]
pub trait Producer: Send + Sync {
    /// Publish one record to a topic
    async fn publish(&self, topic: &str, key: Option<String>, payload: Vec<u8>) -> Result<()>;

    /// Release the underlying client resources.
    ///
    /// Synchronous so cache eviction can tear handles down inline;
    /// implementations must bound any internal flush.
    fn close(&self) -> Result<()>;
}

/// Builds a live producer from effective client settings
#[async_trait]
pub trait ProducerFactory: Send + Sync {
    async fn create(&self, settings: ClientSettings) -> Result<Arc<dyn Producer>>;
}

/// Mock producer for tests and development
#[derive(Debug, Default)]
pub struct MockProducer {
    settings: ClientSettings,
    published: AtomicUsize,
    closed: AtomicUsize,
}

impl MockProducer {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            published: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }

    /// Settings this producer was built from
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Producer for MockProducer {
    async fn publish(&self, topic: &str, _key: Option<String>, payload: Vec<u8>) -> Result<()> {
        self.published.fetch_add(1, Ordering::SeqCst);
        tracing::info!(topic, size = payload.len(), "Mock publish");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock factory: counts creations and records every producer it builds
#[derive(Default)]
pub struct MockProducerFactory {
    created: AtomicUsize,
    fail_first: AtomicUsize,
    fail_message: String,
    delay: Option<Duration>,
    producers: Mutex<Vec<Arc<MockProducer>>>,
}

impl MockProducerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay each creation, letting tests overlap concurrent requests
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `failures` creations with `message`
    pub fn failing_first(mut self, failures: usize, message: impl Into<String>) -> Self {
        self.fail_first = AtomicUsize::new(failures);
        self.fail_message = message.into();
        self
    }

    /// Number of creation attempts so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Producers built so far, in creation order
    pub async fn producers(&self) -> Vec<Arc<MockProducer>> {
        self.producers.lock().await.clone()
    }
}

#[async_trait]
impl ProducerFactory for MockProducerFactory {
    async fn create(&self, settings: ClientSettings) -> Result<Arc<dyn Producer>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if failing {
            return Err(ProducerError::Construction(self.fail_message.clone()));
        }

        let producer = Arc::new(MockProducer::new(settings));
        self.producers.lock().await.push(Arc::clone(&producer));
        Ok(producer)
    }
}
