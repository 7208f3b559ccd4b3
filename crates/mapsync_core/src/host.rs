//! Host scheduling contract
//!
//! Everything in mapsync runs on one control thread. The host (browser event
//! loop, native run loop, test harness) supplies the three kinds of deferred
//! work the bindings need: animation frames, one-shot timers and local tasks.
//! None of these block; every callback runs later on the same thread.

pub use futures::future::LocalBoxFuture;
use std::time::Duration;

/// Callback run on the next animation frame with the frame timestamp
///
/// Timestamps are monotonic offsets from an arbitrary host epoch.
pub type FrameCallback = Box<dyn FnOnce(Duration)>;

/// Callback run when a timer fires
pub type TimerCallback = Box<dyn FnOnce()>;

/// Identifier of a pending animation frame request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameToken(pub u64);

/// Identifier of a pending timer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerToken(pub u64);

/// Deferred work provided by the host
pub trait HostScheduler {
    /// Run `callback` on the next animation frame
    fn request_frame(&self, callback: FrameCallback) -> FrameToken;

    /// Cancel a pending frame request
    ///
    /// Must always succeed; cancelling a token that already ran is a no-op.
    fn cancel_frame(&self, token: FrameToken);

    /// Run `callback` once after `delay`
    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerToken;

    /// Cancel a pending timer; no-op if it already fired
    fn clear_timeout(&self, token: TimerToken);

    /// Spawn a task on the control thread without waiting for it
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
}
