//! Route reveal animation
//!
//! Grows a polyline over `duration`: on each frame the elapsed time since the
//! first frame is eased and mapped to a vertex count, and the prefix of that
//! length is pushed to a sink (normally a GeoJSON data replace).
//!
//! At most one animation runs per [`RouteReveal`]. Starting a new one cancels the
//! previous one first; cancelling is synchronous and always succeeds.

use crate::easing::Easing;
use mapsync_core::geo::LngLat;
use mapsync_core::host::{FrameToken, HostScheduler};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Receives the visible prefix on every frame
pub type RevealSink = Rc<dyn Fn(&[LngLat])>;

/// Number of vertices visible at `eased` progress of a `total`-vertex line
///
/// Never less than two (a drawable segment) unless the line itself is shorter,
/// never more than `total`.
pub fn revealed_point_count(eased: f64, total: usize) -> usize {
    let count = (eased.clamp(0.0, 1.0) * total as f64).floor() as usize;
    count.max(2).min(total)
}

#[derive(Default)]
struct RevealState {
    frame: Option<FrameToken>,
    /// Bumped on every start and cancel; frames from older runs are ignored
    generation: u64,
}

struct Run {
    coordinates: Vec<LngLat>,
    duration: Duration,
    easing: Easing,
    sink: RevealSink,
    start: Cell<Option<Duration>>,
    generation: u64,
    state: Weak<RefCell<RevealState>>,
    scheduler: Rc<dyn HostScheduler>,
}

impl Run {
    fn schedule(self: Rc<Self>) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let scheduler = Rc::clone(&self.scheduler);
        let run = Rc::clone(&self);
        let token = scheduler.request_frame(Box::new(move |timestamp| run.frame(timestamp)));
        state.borrow_mut().frame = Some(token);
    }

    fn frame(self: Rc<Self>, timestamp: Duration) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        {
            let mut state = state.borrow_mut();
            if state.generation != self.generation {
                return;
            }
            state.frame = None;
        }

        let start = match self.start.get() {
            Some(start) => start,
            None => {
                self.start.set(Some(timestamp));
                timestamp
            }
        };
        let progress = if self.duration.is_zero() {
            1.0
        } else {
            (timestamp.saturating_sub(start).as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
        };
        let count = revealed_point_count(self.easing.apply(progress), self.coordinates.len());
        (self.sink)(&self.coordinates[..count]);

        // The sink may have cancelled or restarted us
        let current = state.borrow().generation;
        if progress < 1.0 && current == self.generation {
            self.schedule();
        } else if progress >= 1.0 {
            tracing::trace!(points = count, "route reveal finished");
        }
    }
}

/// Cancellable frame-driven reveal of a polyline
pub struct RouteReveal {
    scheduler: Rc<dyn HostScheduler>,
    state: Rc<RefCell<RevealState>>,
}

impl RouteReveal {
    pub fn new(scheduler: Rc<dyn HostScheduler>) -> Self {
        Self {
            scheduler,
            state: Rc::new(RefCell::new(RevealState::default())),
        }
    }

    /// Start revealing `coordinates` over `duration`, cancelling any running reveal
    pub fn start(&self, coordinates: Vec<LngLat>, duration: Duration, sink: RevealSink) {
        self.start_with_easing(coordinates, duration, Easing::EaseOutCubic, sink);
    }

    pub fn start_with_easing(
        &self,
        coordinates: Vec<LngLat>,
        duration: Duration,
        easing: Easing,
        sink: RevealSink,
    ) {
        self.cancel();
        let generation = self.state.borrow().generation;
        tracing::trace!(points = coordinates.len(), ?duration, "route reveal started");
        let run = Rc::new(Run {
            coordinates,
            duration,
            easing,
            sink,
            start: Cell::new(None),
            generation,
            state: Rc::downgrade(&self.state),
            scheduler: Rc::clone(&self.scheduler),
        });
        run.schedule();
    }

    /// Cancel the running reveal, if any
    pub fn cancel(&self) {
        let frame = {
            let mut state = self.state.borrow_mut();
            state.generation += 1;
            state.frame.take()
        };
        if let Some(frame) = frame {
            self.scheduler.cancel_frame(frame);
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().frame.is_some()
    }
}

impl Drop for RouteReveal {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for RouteReveal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteReveal")
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapsync_core::host::{FrameCallback, LocalBoxFuture, TimerCallback, TimerToken};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Frames {
        next: Cell<u64>,
        queue: RefCell<VecDeque<(FrameToken, FrameCallback)>>,
    }

    impl Frames {
        fn run(&self, timestamp: Duration) -> usize {
            let batch: Vec<_> = self.queue.borrow_mut().drain(..).collect();
            let count = batch.len();
            for (_, callback) in batch {
                callback(timestamp);
            }
            count
        }
    }

    impl HostScheduler for Frames {
        fn request_frame(&self, callback: FrameCallback) -> FrameToken {
            let token = FrameToken(self.next.get());
            self.next.set(token.0 + 1);
            self.queue.borrow_mut().push_back((token, callback));
            token
        }
        fn cancel_frame(&self, token: FrameToken) {
            self.queue.borrow_mut().retain(|(t, _)| *t != token);
        }
        fn set_timeout(&self, _: Duration, _: TimerCallback) -> TimerToken {
            TimerToken(0)
        }
        fn clear_timeout(&self, _: TimerToken) {}
        fn spawn_local(&self, _: LocalBoxFuture<'static, ()>) {}
    }

    fn line(n: usize) -> Vec<LngLat> {
        (0..n).map(|i| LngLat::new(i as f64, 0.0)).collect()
    }

    fn recording_sink() -> (RevealSink, Rc<RefCell<Vec<usize>>>) {
        let counts = Rc::new(RefCell::new(Vec::new()));
        let counts_clone = counts.clone();
        let sink: RevealSink = Rc::new(move |prefix: &[LngLat]| {
            counts_clone.borrow_mut().push(prefix.len());
        });
        (sink, counts)
    }

    #[test]
    fn test_point_count() {
        assert_eq!(revealed_point_count(0.0, 10), 2);
        assert_eq!(revealed_point_count(0.5, 10), 5);
        assert_eq!(revealed_point_count(1.0, 10), 10);
        assert_eq!(revealed_point_count(1.0, 1), 1);
    }

    #[test]
    fn test_reveal_progression() {
        let frames = Rc::new(Frames::default());
        let reveal = RouteReveal::new(frames.clone());
        let (sink, counts) = recording_sink();

        reveal.start(line(10), Duration::from_millis(1000), sink);
        assert!(reveal.is_running());

        frames.run(Duration::from_millis(5000)); // first frame sets the start time
        frames.run(Duration::from_millis(5500));
        frames.run(Duration::from_millis(6000));
        assert_eq!(frames.run(Duration::from_millis(6100)), 0);

        // 0 -> 2, 0.5 -> floor(0.875 * 10), 1 -> all
        assert_eq!(*counts.borrow(), vec![2, 8, 10]);
        assert!(!reveal.is_running());
    }

    #[test]
    fn test_restart_cancels_previous() {
        let frames = Rc::new(Frames::default());
        let reveal = RouteReveal::new(frames.clone());
        let (first_sink, first) = recording_sink();
        let (second_sink, second) = recording_sink();

        reveal.start(line(4), Duration::from_millis(100), first_sink);
        frames.run(Duration::ZERO);
        reveal.start(line(6), Duration::from_millis(100), second_sink);
        assert_eq!(frames.queue.borrow().len(), 1);

        frames.run(Duration::from_millis(50));
        frames.run(Duration::from_millis(150));
        frames.run(Duration::from_millis(250));
        assert_eq!(*first.borrow(), vec![2]);
        assert_eq!(second.borrow().last(), Some(&6));
    }

    #[test]
    fn test_cancel_is_unconditional() {
        let frames = Rc::new(Frames::default());
        let reveal = RouteReveal::new(frames.clone());
        let (sink, counts) = recording_sink();

        reveal.cancel();
        reveal.start(line(5), Duration::from_millis(100), sink);
        reveal.cancel();
        reveal.cancel();
        assert_eq!(frames.run(Duration::ZERO), 0);
        assert!(counts.borrow().is_empty());
    }

    #[test]
    fn test_zero_duration_completes_on_first_frame() {
        let frames = Rc::new(Frames::default());
        let reveal = RouteReveal::new(frames.clone());
        let (sink, counts) = recording_sink();
        reveal.start(line(7), Duration::ZERO, sink);
        frames.run(Duration::from_millis(16));
        assert_eq!(*counts.borrow(), vec![7]);
        assert!(!reveal.is_running());
    }
}
