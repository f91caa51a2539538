//! Cache definitions.
//!
//! A definition identifies one logical cache: who owns it, how it is
//! namespaced, how long entries live, whether it accelerates in-process,
//! and what locking and invalidation it needs. Definitions are built
//! once per handle and shared across every tier of that handle's chain;
//! only the identifier set may change afterwards, which regenerates the
//! definition hash for the whole chain at once.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::keys::hash_definition;

/// Which loader variant serves a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Shared across processes; supports advisory locking.
    Application,
    /// Per user and session; keys are namespaced, never accelerated.
    Session,
    /// One execution context only.
    Request,
}

/// Locking a definition demands of the application tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockingMode {
    #[default]
    None,
    Read,
    Write,
    ReadWrite,
}

impl LockingMode {
    pub fn requires_read(self) -> bool {
        matches!(self, LockingMode::Read | LockingMode::ReadWrite)
    }

    pub fn requires_write(self) -> bool {
        matches!(self, LockingMode::Write | LockingMode::ReadWrite)
    }

    pub fn any(self) -> bool {
        !matches!(self, LockingMode::None)
    }
}

/// Immutable-after-construction configuration of one logical cache.
///
/// The identifier set is the one exception: `set_identifiers` swaps it
/// and regenerates the hash.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheDefinition {
    component: String,
    area: String,
    mode: CacheMode,
    identifiers: BTreeMap<String, String>,
    ttl: i64,
    static_acceleration: bool,
    static_acceleration_size: Option<usize>,
    simple_data: bool,
    locking: LockingMode,
    invalidation_events: Vec<String>,
    stores: Vec<String>,
    hash: String,
}

impl CacheDefinition {
    pub fn builder(component: impl Into<String>, area: impl Into<String>) -> DefinitionBuilder {
        DefinitionBuilder {
            component: component.into(),
            area: area.into(),
            mode: CacheMode::Application,
            identifiers: BTreeMap::new(),
            ttl: 0,
            static_acceleration: false,
            static_acceleration_size: None,
            simple_data: false,
            locking: LockingMode::None,
            invalidation_events: Vec::new(),
            stores: Vec::new(),
        }
    }

    /// Registry id, `component/area`.
    pub fn id(&self) -> String {
        format!("{}/{}", self.component, self.area)
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn ttl(&self) -> i64 {
        self.ttl
    }

    pub fn has_ttl(&self) -> bool {
        self.ttl > 0
    }

    pub fn use_static_acceleration(&self) -> bool {
        self.static_acceleration
    }

    pub fn static_acceleration_size(&self) -> Option<usize> {
        self.static_acceleration_size
    }

    pub fn uses_simple_data(&self) -> bool {
        self.simple_data
    }

    pub fn locking(&self) -> LockingMode {
        self.locking
    }

    pub fn invalidation_events(&self) -> &[String] {
        &self.invalidation_events
    }

    pub fn has_invalidation_events(&self) -> bool {
        !self.invalidation_events.is_empty()
    }

    /// Store backend names this definition is mapped to, outermost
    /// first. Empty means the factory's default for the mode.
    pub fn stores(&self) -> &[String] {
        &self.stores
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Identifier parts in sorted order, for multi-identifier stores.
    pub fn identifier_parts(&self) -> Vec<(String, String)> {
        self.identifiers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Replace the identifier set. Returns true when it actually
    /// changed, in which case the hash has been regenerated.
    pub fn set_identifiers(&mut self, identifiers: BTreeMap<String, String>) -> bool {
        if identifiers == self.identifiers {
            return false;
        }
        self.identifiers = identifiers;
        self.regenerate_hash();
        true
    }

    fn regenerate_hash(&mut self) {
        self.hash = hash_definition(
            &self.component,
            &self.area,
            self.identifiers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
    }
}

/// Builder for [`CacheDefinition`].
#[derive(Debug, Clone)]
pub struct DefinitionBuilder {
    component: String,
    area: String,
    mode: CacheMode,
    identifiers: BTreeMap<String, String>,
    ttl: i64,
    static_acceleration: bool,
    static_acceleration_size: Option<usize>,
    simple_data: bool,
    locking: LockingMode,
    invalidation_events: Vec<String>,
    stores: Vec<String>,
}

impl DefinitionBuilder {
    pub fn mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn identifiers(mut self, identifiers: BTreeMap<String, String>) -> Self {
        self.identifiers = identifiers;
        self
    }

    pub fn identifier(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.insert(name.into(), value.into());
        self
    }

    /// TTL in seconds; 0 disables expiry.
    pub fn ttl(mut self, ttl: i64) -> Self {
        self.ttl = ttl.max(0);
        self
    }

    pub fn static_acceleration(mut self, max_size: Option<usize>) -> Self {
        self.static_acceleration = true;
        self.static_acceleration_size = max_size;
        self
    }

    /// Caller promises values hold no internal structure worth
    /// defensive copying.
    pub fn simple_data(mut self) -> Self {
        self.simple_data = true;
        self
    }

    pub fn locking(mut self, locking: LockingMode) -> Self {
        self.locking = locking;
        self
    }

    pub fn invalidation_events(mut self, events: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.invalidation_events = events.into_iter().map(Into::into).collect();
        self
    }

    pub fn stores(mut self, stores: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.stores = stores.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> CacheDefinition {
        let mut definition = CacheDefinition {
            component: self.component,
            area: self.area,
            mode: self.mode,
            identifiers: self.identifiers,
            ttl: self.ttl,
            static_acceleration: self.static_acceleration,
            static_acceleration_size: self.static_acceleration_size,
            simple_data: self.simple_data,
            locking: self.locking,
            invalidation_events: self.invalidation_events,
            stores: self.stores,
            hash: String::new(),
        };
        definition.regenerate_hash();
        definition
    }
}
