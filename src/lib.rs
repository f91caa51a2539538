//! Cascata — a layered cache loader chain.
//!
//! A lookup resolves through up to four layers:
//!
//! - **Static acceleration**: bounded in-process memoization, top of a
//!   chain only
//! - **Store**: a pluggable backend behind the [`CacheStore`] SPI
//! - **Chained loader**: the next cache tier, consulted on miss
//! - **Data source**: the ultimate fallback that computes the value
//!
//! Around the chain: TTL simulation for stores without native expiry,
//! defensive copying for stores that cannot guarantee dereferencing
//! safety, event-timestamp invalidation reconciled at handle
//! construction, and advisory locking for the application tier.
//!
//! ## Configuration
//!
//! Definitions are registered programmatically or declared in TOML:
//!
//! ```toml
//! [[definitions]]
//! component = "core"
//! area = "coursemodinfo"
//! mode = "application"
//! ttl = 600
//! static_acceleration = true
//! static_acceleration_size = 30
//! invalidation_events = ["changesincourse"]
//! ```
//!
//! Handles come from a [`CacheFactory`]; every operation takes the
//! request's [`RequestContext`], which freezes the clock and carries
//! the current user for session namespacing.

mod acceleration;
mod application;
mod config;
mod context;
mod definition;
mod error;
mod factory;
mod invalidation;
mod keys;
mod loader;
mod lock;
mod request;
mod session;
mod store;
mod sync;
pub mod telemetry;
mod ttl;
mod value;

pub use application::ApplicationCache;
pub use config::{CacheSettings, DefinitionSettings};
pub use context::RequestContext;
pub use definition::{CacheDefinition, CacheMode, DefinitionBuilder, LockingMode};
pub use error::CacheError;
pub use factory::{
    CacheFactory, CacheHandle, DEFAULT_APPLICATION_STORE, DEFAULT_REQUEST_STORE,
    DEFAULT_SESSION_STORE,
};
pub use invalidation::{LAST_INVALIDATION_KEY, PURGED_KEY};
pub use keys::{CacheKey, StoreKey, hash_definition, hash_key};
pub use loader::{Cache, CacheLoader, DataSource, NextTier, Strictness};
pub use lock::{CacheLock, LocalCacheLock};
pub use request::RequestCache;
pub use session::SessionCache;
pub use store::{
    CacheStore, MemoryStore, MemoryStoreConfig, Payload, StoreCapabilities, StoredValue,
};
pub use ttl::TtlWrapper;
pub use value::{CacheValue, Cacheable, MAX_COPY_SCAN_DEPTH, ObjectEnvelope};
