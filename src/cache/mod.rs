//! Bounded, idle-expiring cache for expensive connection-like handles
//!
//! The cache owns at most `capacity` live handles, keyed by their effective
//! configuration. Handles that sit unused past the idle timeout, or that get
//! pushed out by newer ones, are handed to an eviction hook for teardown.
//! Creation is single-flight: concurrent requests for the same key share one
//! creation attempt instead of racing to build duplicate handles.

pub mod store;

pub use store::{EvictionHook, HandleCache};

/// Why a handle was removed from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Not accessed within the idle timeout
    Idle,
    /// Pushed out by a newer handle once the cache was full
    Capacity,
    /// The cache itself was dropped
    Shutdown,
}
