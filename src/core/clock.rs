//! Frame clock driving the per-frame update cycle.

use std::time::Instant;

/// Smallest delta ever reported, in seconds. Guards downstream math
/// (velocity damping, animation phase) against a zero or backwards step
/// when two frames land on the same timer read.
pub const MIN_DELTA: f32 = 1e-4;

/// Timing snapshot handed to every tick subscriber.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    /// Seconds since the clock was created.
    pub elapsed: f32,
    /// Seconds since the previous tick, floored at [`MIN_DELTA`].
    pub delta: f32,
}

/// Monotonic frame clock. [`advance`](Self::advance) produces one
/// [`FrameTick`] per call; after [`dispose`](Self::dispose) it produces
/// nothing, so a stray redraw cannot tick a torn-down engine.
pub struct FrameClock {
    start: Instant,
    last: Instant,
    disposed: bool,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            disposed: false,
        }
    }

    /// Samples the timer and returns the tick for this frame, or `None`
    /// once the clock has been disposed.
    pub fn advance(&mut self) -> Option<FrameTick> {
        if self.disposed {
            return None;
        }
        let now = Instant::now();
        let delta = now.duration_since(self.last).as_secs_f32().max(MIN_DELTA);
        self.last = now;
        Some(FrameTick {
            elapsed: now.duration_since(self.start).as_secs_f32(),
            delta,
        })
    }

    /// Stops the clock. Idempotent.
    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_never_below_floor() {
        let mut clock = FrameClock::new();
        // Back-to-back reads can observe an identical instant.
        let a = clock.advance().unwrap();
        let b = clock.advance().unwrap();
        assert!(a.delta >= MIN_DELTA);
        assert!(b.delta >= MIN_DELTA);
        assert!(b.elapsed >= a.elapsed);
    }

    #[test]
    fn disposed_clock_stops_ticking() {
        let mut clock = FrameClock::new();
        assert!(clock.advance().is_some());
        clock.dispose();
        clock.dispose(); // idempotent
        assert!(clock.is_disposed());
        assert!(clock.advance().is_none());
    }
}
