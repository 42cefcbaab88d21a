pub mod cache;
pub mod config;
pub mod producer;  // Expose for tests (MockProducer)
