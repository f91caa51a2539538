//! Declarative cache configuration.
//!
//! Definitions can be registered programmatically through
//! [`CacheDefinition::builder`](crate::definition::CacheDefinition::builder)
//! or declared in TOML:
//!
//! ```toml
//! [[definitions]]
//! component = "core"
//! area = "strings"
//! mode = "application"
//! static_acceleration = true
//! static_acceleration_size = 30
//! invalidation_events = ["changesincoursecat"]
//! ```

use serde::Deserialize;

use crate::definition::{CacheDefinition, CacheMode, LockingMode};
use crate::error::CacheError;

/// Declarative settings for a set of cache definitions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub definitions: Vec<DefinitionSettings>,
}

impl CacheSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self, CacheError> {
        toml::from_str(raw).map_err(|err| CacheError::Config(err.to_string()))
    }

    /// Materialize every declared definition, failing on the first
    /// invalid one.
    pub fn build_definitions(&self) -> Result<Vec<CacheDefinition>, CacheError> {
        self.definitions.iter().map(DefinitionSettings::build).collect()
    }
}

/// One declared definition. All fields except `component` and `area`
/// are optional and default to the most conservative behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefinitionSettings {
    pub component: String,
    pub area: String,
    pub mode: CacheMode,
    /// TTL in seconds; 0 disables expiry.
    pub ttl: i64,
    pub static_acceleration: bool,
    /// Maximum accelerated entries; 0 means unbounded.
    pub static_acceleration_size: usize,
    pub simple_data: bool,
    pub locking: LockingMode,
    pub invalidation_events: Vec<String>,
    /// Store backend names, outermost tier first. Empty uses the
    /// factory default for the mode.
    pub stores: Vec<String>,
}

impl Default for DefinitionSettings {
    fn default() -> Self {
        Self {
            component: String::new(),
            area: String::new(),
            mode: CacheMode::Application,
            ttl: 0,
            static_acceleration: false,
            static_acceleration_size: 0,
            simple_data: false,
            locking: LockingMode::None,
            invalidation_events: Vec::new(),
            stores: Vec::new(),
        }
    }
}

impl DefinitionSettings {
    pub fn build(&self) -> Result<CacheDefinition, CacheError> {
        if self.component.is_empty() || self.area.is_empty() {
            return Err(CacheError::Config(
                "definition requires a component and an area".to_string(),
            ));
        }
        let mut builder = CacheDefinition::builder(&self.component, &self.area)
            .mode(self.mode)
            .ttl(self.ttl)
            .locking(self.locking)
            .invalidation_events(self.invalidation_events.iter().cloned())
            .stores(self.stores.iter().cloned());
        if self.static_acceleration {
            let size = (self.static_acceleration_size > 0).then_some(self.static_acceleration_size);
            builder = builder.static_acceleration(size);
        }
        if self.simple_data {
            builder = builder.simple_data();
        }
        Ok(builder.build())
    }
}
