//! mapsync core
//!
//! Contracts and lifecycle machinery for keeping declarative layer descriptions
//! in sync with an imperative map engine.
//!
//! # Architecture
//!
//! - [`engine`]: the [`MapEngine`] trait and its value types
//! - [`host`]: frames, timers and local tasks supplied by the host
//! - [`readiness`]: the gate that holds setup until the engine and style are loaded
//! - [`namespace`]: collision-free engine ids per binding instance
//! - [`binding`]: the generic `Unmounted → Pending → Active → TornDown` machine
//! - [`context`]: map/marker contexts and the scope registry
//!
//! Everything runs on one thread; shared state is `Rc`/`RefCell`.
//!
//! # Example
//!
//! ```ignore
//! use mapsync_core::prelude::*;
//!
//! let context = MapContext::new(scheduler);
//! context.gate.set_engine(Some(engine));
//!
//! let binding = Binding::new(&context, bundle, config);
//! binding.attach();
//!
//! context.gate.mark_engine_ready();
//! context.gate.mark_style_ready(); // setup runs here
//! ```

pub mod binding;
pub mod config;
pub mod context;
pub mod custom;
pub mod engine;
pub mod error;
pub mod geo;
pub mod host;
pub mod namespace;
pub mod reactive;
pub mod readiness;
pub mod resources;

pub use binding::{Binding, BindingState, BundleContext, ResourceBundle};
pub use config::{RetryPolicy, SyncConfig};
pub use context::{ContextRegistry, MapContext, MarkerContext, MarkerHandle, ScopeId};
pub use engine::MapEngine;
pub use error::{EngineError, MapSyncError, Result};
pub use geo::{LngLat, LngLatBounds, ScreenPoint};
pub use host::HostScheduler;
pub use namespace::{InstanceToken, ResourceNamespace};
pub use reactive::{Observable, Subscription};
pub use readiness::{ReadinessGate, ReadinessState, ReadyWaiter};

/// Common imports for binding implementations
pub mod prelude {
    pub use crate::binding::{Binding, BindingState, BundleContext, ResourceBundle};
    pub use crate::config::{RetryPolicy, SyncConfig};
    pub use crate::context::{ContextRegistry, MapContext};
    pub use crate::engine::{
        CameraTarget, Cursor, Feature, GeoJsonData, LayerEvent, LayerEventKind, LayerKind,
        LayerSpec, MapEngine, SourceSpec,
    };
    pub use crate::error::EngineError;
    pub use crate::geo::{LngLat, LngLatBounds};
    pub use crate::host::HostScheduler;
    pub use crate::namespace::ResourceNamespace;
    pub use crate::resources::{
        remove_layer_quietly, remove_source_quietly, set_data_if_present, set_paint_if_present,
        Listeners,
    };
}
