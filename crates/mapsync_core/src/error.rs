//! Error types for mapsync
//!
//! Two layers of errors exist:
//!
//! - [`EngineError`] is what a map engine, compositor, or graphics backend reports
//!   when a call is rejected. Bindings either prevent these up front (existence
//!   probes) or swallow them locally (removal of something already gone).
//! - [`MapSyncError`] is what the crate itself surfaces to integrators. The only
//!   variant a correct program can hit at runtime is [`MapSyncError::ContextMissing`],
//!   which marks a wiring mistake and is returned at construction time.

use thiserror::Error;

/// Errors reported by the external map engine and its collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A source with this id already exists
    #[error("source `{0}` already exists")]
    DuplicateSource(String),

    /// A layer with this id already exists
    #[error("layer `{0}` already exists")]
    DuplicateLayer(String),

    /// No source with this id exists
    #[error("source `{0}` does not exist")]
    MissingSource(String),

    /// No layer with this id exists
    #[error("layer `{0}` does not exist")]
    MissingLayer(String),

    /// The GPU overlay compositor could not be created or attached
    #[error("compositor failure: {0}")]
    Compositor(String),

    /// The graphics context rejected a request
    #[error("graphics failure: {0}")]
    Graphics(String),

    /// Any other engine-side failure
    #[error("engine error: {0}")]
    Other(String),
}

impl EngineError {
    /// Whether this error only says the resource is already gone
    ///
    /// Such errors are harmless during update and teardown.
    pub fn is_missing_resource(&self) -> bool {
        matches!(self, EngineError::MissingSource(_) | EngineError::MissingLayer(_))
    }
}

/// Errors surfaced by mapsync to the integrator
#[derive(Error, Debug)]
pub enum MapSyncError {
    /// A context lookup was made outside of the scope that provides it
    #[error("{consumer} must be used within a {provider} scope")]
    ContextMissing {
        /// The lookup that failed (e.g. `use_map`)
        consumer: &'static str,
        /// The provider that should have been an ancestor (e.g. `Map`)
        provider: &'static str,
    },

    /// An engine call failed in a way that could not be recovered locally
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Configuration could not be parsed
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<toml::de::Error> for MapSyncError {
    fn from(err: toml::de::Error) -> Self {
        MapSyncError::Config(err.to_string())
    }
}

/// Result type for mapsync operations
pub type Result<T> = std::result::Result<T, MapSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_resource_classification() {
        assert!(EngineError::MissingLayer("a".into()).is_missing_resource());
        assert!(EngineError::MissingSource("a".into()).is_missing_resource());
        assert!(!EngineError::DuplicateSource("a".into()).is_missing_resource());
        assert!(!EngineError::Compositor("lost context".into()).is_missing_resource());
    }

    #[test]
    fn test_context_missing_message() {
        let err = MapSyncError::ContextMissing {
            consumer: "use_map",
            provider: "Map",
        };
        assert_eq!(err.to_string(), "use_map must be used within a Map scope");
    }
}
