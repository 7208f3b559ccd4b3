//! mapsync test suite
//!
//! In-memory stand-ins for everything a binding talks to, so lifecycle behavior
//! can be checked without a browser or a GPU:
//!
//! - [`RecordingEngine`]: a [`MapEngine`](mapsync_core::MapEngine) that keeps real
//!   source/layer/listener bookkeeping and logs every mutating call in order
//! - [`ManualScheduler`]: frames, timers and local tasks that only advance when a
//!   test says so
//! - [`FakeCompositorFactory`]: compositors with scripted construction failures
//! - [`FakeGraphics`]: a graphics context for custom layers
//! - [`TestMap`]: one map context wired to all of the above
//!
//! Integration tests live in `tests/`, grouped by category:
//! - readiness gating and the binding lifecycle
//! - route layer (paint diffs, reveal animation, clicks)
//! - cluster layer (listener and removal ordering, expansion zoom)
//! - image and GPU overlays (two-phase setup, retry)
//! - contexts, theme and starfield

pub mod harness;

pub use harness::{
    EngineCall, FakeCompositor, FakeCompositorFactory, FakeGraphics, ManualScheduler,
    RecordingEngine, RendererLog, TestMap,
};
