//! Performance measurement tools.

use std::{
    fmt::{self, Arguments},
    mem,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use itertools::Itertools;

/// Weight of the newest sample in the running average.
const EMA_ALPHA: f32 = 0.3;

/// A timer that can measure and average the time an operation takes.
///
/// Timings are smoothed with an exponential moving average. The average is reset when the timer is
/// displayed using `{}` ([`std::fmt::Display`]).
pub struct Timer {
    name: &'static str,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// The current average time in seconds, or [`None`] if nothing was measured yet.
    avg: Option<f32>,
    /// The number of time measurements that contributed to the current `avg`.
    count: usize,
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is measured and recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn record(&self, duration: Duration) {
        let secs = duration.as_secs_f32();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.avg = Some(match state.avg {
            Some(avg) => avg + EMA_ALPHA * (secs - avg),
            None => secs,
        });
        state.count += 1;
    }

    /// Returns the number of measurements recorded since the timer was last displayed.
    pub fn count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .count
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let State { avg, count } = mem::take(&mut *state);
        let avg_ms = avg.unwrap_or(0.0) * 1000.0;

        write!(f, "{}: {count}x{avg_ms:.01}ms", self.name)
    }
}

/// Cloning a timer resets its collected timings.
impl Clone for Timer {
    fn clone(&self) -> Self {
        Self::new(self.name)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed());
    }
}

/// Logs frames per second with optional extra data.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Advances the frame counter by 1 and logs FPS and `extra` data if one second has passed.
    ///
    /// `extra` is only evaluated when something is logged. This is typically used to log a list of
    /// [`Timer`]s, which resets them.
    pub fn tick_with<D, I>(&mut self, extra: impl FnOnce() -> I)
    where
        D: fmt::Display,
        I: IntoIterator<Item = D>,
    {
        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            let extra = extra().into_iter().join(", ");
            if extra.is_empty() {
                self.log(format_args!(""));
            } else {
                self.log(format_args!(" ({extra})"));
            }
        }
    }

    fn log(&mut self, args: Arguments<'_>) {
        log::debug!("{}: {} FPS{}", self.name, self.frames, args);

        self.frames = 0;
        self.start = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_resets() {
        let timer = Timer::new("work");
        assert_eq!(timer.to_string(), "work: 0x0.0ms");

        timer.time(|| ());
        timer.time(|| ());
        assert_eq!(timer.count(), 2);
        assert!(timer.to_string().starts_with("work: 2x"));
        assert_eq!(timer.count(), 0);
    }

    #[test]
    fn moving_average() {
        let timer = Timer::new("avg");
        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(20));
        // 10 + 0.3 * (20 - 10)
        assert_eq!(timer.to_string(), "avg: 2x13.0ms");
    }

    #[test]
    fn clone_resets() {
        let timer = Timer::new("t");
        timer.time(|| ());
        let clone = timer.clone();
        assert_eq!(clone.count(), 0);
        assert_eq!(clone.name(), "t");
    }
}
