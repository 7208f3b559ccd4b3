//! Binding contexts
//!
//! Bindings never reach for globals. Everything they need from the enclosing map
//! (the readiness gate, the host scheduler, configuration and the per-map token
//! generator) is carried by a [`MapContext`] value that is passed to each binding
//! constructor, or looked up in a [`ContextRegistry`] by scope.
//!
//! The registry models a tree of scopes. A lookup walks from the given scope
//! towards the root and returns the nearest provider; a lookup with no provider
//! on the path is a wiring mistake and fails with [`MapSyncError::ContextMissing`].
//!
//! ```
//! use mapsync_core::context::{ContextRegistry, MapContext};
//! use mapsync_core::MapSyncError;
//! # use mapsync_core::host::*;
//! # use std::{rc::Rc, time::Duration};
//! # struct NoopScheduler;
//! # impl HostScheduler for NoopScheduler {
//! #     fn request_frame(&self, _: FrameCallback) -> FrameToken { FrameToken(0) }
//! #     fn cancel_frame(&self, _: FrameToken) {}
//! #     fn set_timeout(&self, _: Duration, _: TimerCallback) -> TimerToken { TimerToken(0) }
//! #     fn clear_timeout(&self, _: TimerToken) {}
//! #     fn spawn_local(&self, _: futures::future::LocalBoxFuture<'static, ()>) {}
//! # }
//!
//! let mut registry = ContextRegistry::new();
//! let root = registry.create_scope(None);
//! let map_scope = registry.create_scope(Some(root));
//! let layer_scope = registry.create_scope(Some(map_scope));
//!
//! registry.provide_map(map_scope, MapContext::new(Rc::new(NoopScheduler)));
//!
//! assert!(registry.use_map(layer_scope).is_ok());
//! assert!(matches!(
//!     registry.use_map(root),
//!     Err(MapSyncError::ContextMissing { .. })
//! ));
//! ```

use crate::config::SyncConfig;
use crate::error::{MapSyncError, Result};
use crate::geo::LngLat;
use crate::host::HostScheduler;
use crate::namespace::{InstanceToken, ResourceNamespace, TokenGenerator};
use crate::reactive::Observable;
use crate::readiness::{once_when, ReadinessGate, ReadyWaiter};
use slotmap::{new_key_type, SlotMap};
use std::fmt;
use std::rc::Rc;

// =============================================================================
// MAP CONTEXT
// =============================================================================

/// Everything a binding needs from the map it is attached to (cheap to clone)
#[derive(Clone)]
pub struct MapContext {
    pub gate: ReadinessGate,
    pub scheduler: Rc<dyn HostScheduler>,
    pub config: Rc<SyncConfig>,
    pub tokens: Rc<TokenGenerator>,
}

impl MapContext {
    /// Create a context with default configuration
    pub fn new(scheduler: Rc<dyn HostScheduler>) -> Self {
        Self::with_config(scheduler, SyncConfig::default())
    }

    pub fn with_config(scheduler: Rc<dyn HostScheduler>, config: SyncConfig) -> Self {
        Self {
            gate: ReadinessGate::new(),
            scheduler,
            config: Rc::new(config),
            tokens: Rc::new(TokenGenerator::default()),
        }
    }

    /// Namespace for a new binding instance
    ///
    /// An explicit token overrides the generated one; the caller is then
    /// responsible for its uniqueness.
    pub fn namespace(&self, explicit: Option<&str>) -> ResourceNamespace {
        let token = match explicit {
            Some(token) => InstanceToken::from(token),
            None => self.tokens.next(),
        };
        ResourceNamespace::new(token)
    }
}

impl fmt::Debug for MapContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapContext")
            .field("gate", &self.gate)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// MARKER CONTEXT
// =============================================================================

/// A marker placed on the map, as seen by its child components
pub trait MarkerHandle {
    fn lng_lat(&self) -> LngLat;
    fn set_lng_lat(&self, position: LngLat);
}

/// Shared marker handle compared by identity
#[derive(Clone)]
pub struct MarkerRef(pub Rc<dyn MarkerHandle>);

impl PartialEq for MarkerRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for MarkerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MarkerRef").field(&self.0.lng_lat()).finish()
    }
}

/// Context provided by a marker to its popups, tooltips and labels
#[derive(Clone)]
pub struct MarkerContext {
    pub marker: Observable<Option<MarkerRef>>,
    pub map: ReadinessGate,
    pub is_ready: Observable<bool>,
}

impl MarkerContext {
    pub fn new(map: ReadinessGate) -> Self {
        Self {
            marker: Observable::new(None),
            map,
            is_ready: Observable::new(false),
        }
    }

    /// Publish the marker and mark the context ready
    pub fn set_marker(&self, marker: Option<Rc<dyn MarkerHandle>>) {
        let present = marker.is_some();
        self.marker.set(marker.map(MarkerRef));
        self.is_ready.set(present);
    }

    /// Run `continuation` once the marker exists
    ///
    /// Same contract as [`ReadinessGate::when_ready`]: synchronous if ready,
    /// otherwise deferred and run at most once.
    pub fn when_ready<F>(&self, continuation: F) -> ReadyWaiter
    where
        F: FnOnce(Rc<dyn MarkerHandle>) + 'static,
    {
        if self.is_ready.get() {
            if let Some(MarkerRef(marker)) = self.marker.get() {
                continuation(marker);
                return ReadyWaiter::default();
            }
        }

        let marker = self.marker.clone();
        let probe = self.marker.clone();
        once_when(
            &self.is_ready,
            move |ready| *ready && probe.with(Option::is_some),
            move || {
                if let Some(MarkerRef(marker)) = marker.get() {
                    continuation(marker);
                }
            },
        )
    }
}

impl fmt::Debug for MarkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerContext")
            .field("marker", &self.marker.get())
            .field("is_ready", &self.is_ready.get())
            .finish()
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

new_key_type! {
    /// Identifier of a scope in a [`ContextRegistry`]
    pub struct ScopeId;
}

#[derive(Default)]
struct Scope {
    parent: Option<ScopeId>,
    map: Option<MapContext>,
    marker: Option<MarkerContext>,
}

/// Scope tree holding map and marker contexts
#[derive(Default)]
pub struct ContextRegistry {
    scopes: SlotMap<ScopeId, Scope>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope under `parent` (or a new root)
    pub fn create_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.insert(Scope {
            parent,
            ..Default::default()
        })
    }

    /// Remove a scope; descendants that still reference it lose their path upward
    pub fn remove_scope(&mut self, scope: ScopeId) {
        self.scopes.remove(scope);
    }

    pub fn provide_map(&mut self, scope: ScopeId, context: MapContext) {
        if let Some(entry) = self.scopes.get_mut(scope) {
            entry.map = Some(context);
        } else {
            tracing::warn!(?scope, "registry: provide_map on unknown scope");
        }
    }

    pub fn provide_marker(&mut self, scope: ScopeId, context: MarkerContext) {
        if let Some(entry) = self.scopes.get_mut(scope) {
            entry.marker = Some(context);
        } else {
            tracing::warn!(?scope, "registry: provide_marker on unknown scope");
        }
    }

    /// Nearest map context at or above `scope`
    pub fn use_map(&self, scope: ScopeId) -> Result<MapContext> {
        self.find(scope, |entry| entry.map.clone())
            .ok_or(MapSyncError::ContextMissing {
                consumer: "use_map",
                provider: "Map",
            })
    }

    /// Nearest marker context at or above `scope`
    pub fn use_marker(&self, scope: ScopeId) -> Result<MarkerContext> {
        self.find(scope, |entry| entry.marker.clone())
            .ok_or(MapSyncError::ContextMissing {
                consumer: "Marker components",
                provider: "MapMarker",
            })
    }

    fn find<T>(&self, scope: ScopeId, pick: impl Fn(&Scope) -> Option<T>) -> Option<T> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let entry = self.scopes.get(id)?;
            if let Some(found) = pick(entry) {
                return Some(found);
            }
            current = entry.parent;
        }
        None
    }
}

impl fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("scopes", &self.scopes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::*;
    use std::cell::Cell;
    use std::time::Duration;

    struct NoopScheduler;

    impl HostScheduler for NoopScheduler {
        fn request_frame(&self, _: FrameCallback) -> FrameToken {
            FrameToken(0)
        }
        fn cancel_frame(&self, _: FrameToken) {}
        fn set_timeout(&self, _: Duration, _: TimerCallback) -> TimerToken {
            TimerToken(0)
        }
        fn clear_timeout(&self, _: TimerToken) {}
        fn spawn_local(&self, _: futures::future::LocalBoxFuture<'static, ()>) {}
    }

    struct PinMarker(Cell<LngLat>);

    impl MarkerHandle for PinMarker {
        fn lng_lat(&self) -> LngLat {
            self.0.get()
        }
        fn set_lng_lat(&self, position: LngLat) {
            self.0.set(position);
        }
    }

    #[test]
    fn test_nearest_provider_wins() {
        let mut registry = ContextRegistry::new();
        let root = registry.create_scope(None);
        let inner = registry.create_scope(Some(root));
        let leaf = registry.create_scope(Some(inner));

        let outer_ctx = MapContext::new(Rc::new(NoopScheduler));
        let inner_ctx = MapContext::new(Rc::new(NoopScheduler));
        registry.provide_map(root, outer_ctx.clone());
        registry.provide_map(inner, inner_ctx.clone());

        let found = registry.use_map(leaf).unwrap();
        assert!(Rc::ptr_eq(&found.tokens, &inner_ctx.tokens));
        let found = registry.use_map(root).unwrap();
        assert!(Rc::ptr_eq(&found.tokens, &outer_ctx.tokens));
    }

    #[test]
    fn test_missing_marker_context() {
        let mut registry = ContextRegistry::new();
        let root = registry.create_scope(None);
        registry.provide_map(root, MapContext::new(Rc::new(NoopScheduler)));
        let err = registry.use_marker(root).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Marker components must be used within a MapMarker scope"
        );
    }

    #[test]
    fn test_removed_scope_is_missing() {
        let mut registry = ContextRegistry::new();
        let root = registry.create_scope(None);
        registry.provide_map(root, MapContext::new(Rc::new(NoopScheduler)));
        registry.remove_scope(root);
        assert!(registry.use_map(root).is_err());
    }

    #[test]
    fn test_explicit_namespace_token() {
        let ctx = MapContext::new(Rc::new(NoopScheduler));
        assert_eq!(ctx.namespace(Some("home")).id("route-source"), "route-source-home");
        let generated = ctx.namespace(None);
        assert_ne!(generated, ctx.namespace(None));
    }

    #[test]
    fn test_marker_when_ready_defers() {
        let ctx = MarkerContext::new(ReadinessGate::new());
        let seen = Rc::new(Cell::new(None));
        let seen_clone = seen.clone();
        let waiter = ctx.when_ready(move |marker| seen_clone.set(Some(marker.lng_lat())));
        assert!(waiter.is_pending());

        ctx.set_marker(Some(Rc::new(PinMarker(Cell::new(LngLat::new(2.0, 3.0))))));
        assert_eq!(seen.get(), Some(LngLat::new(2.0, 3.0)));
        assert!(!waiter.is_pending());

        // Already ready: runs synchronously
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let _done = ctx.when_ready(move |_| runs_clone.set(runs_clone.get() + 1));
        assert_eq!(runs.get(), 1);
    }
}
