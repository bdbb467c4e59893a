//! Sleep abstraction used by the pacing paths.

use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Records requested sleeps instead of blocking. Used for simulation and to
/// make the pacing deterministic under test.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }

    pub fn total(&self) -> Duration {
        self.slept.lock().iter().sum()
    }

    /// Returns the recorded sleeps and starts a fresh record.
    pub fn take(&self) -> Vec<Duration> {
        std::mem::take(&mut *self.slept.lock())
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}

/// Nominal playing time of `bytes` at `rate`, in whole microseconds.
pub fn nominal_duration(bytes: usize, frame_size: usize, rate: u32) -> Duration {
    if frame_size == 0 || rate == 0 {
        return Duration::ZERO;
    }
    let micros = bytes as u64 * 1_000_000 / frame_size as u64 / u64::from(rate);
    Duration::from_micros(micros)
}

/// Time it takes the hardware to consume `frames` at `rate`.
pub fn frames_to_micros(frames: i64, rate: u32) -> u64 {
    if frames <= 0 || rate == 0 {
        return 0;
    }
    (frames as u64).saturating_mul(1_000_000) / u64::from(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_duration_of_one_period() {
        // 880 stereo 16-bit frames at 44.1kHz.
        let duration = nominal_duration(880 * 4, 4, 44_100);
        assert_eq!(duration, Duration::from_micros(19_954));
    }

    #[test]
    fn frames_to_micros_ignores_negative_excess() {
        assert_eq!(frames_to_micros(-10, 44_100), 0);
        assert_eq!(frames_to_micros(441, 44_100), 10_000);
    }

    #[test]
    fn recording_sleeper_accumulates() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_micros(10));
        sleeper.sleep(Duration::from_micros(15));
        assert_eq!(sleeper.total(), Duration::from_micros(25));
        assert_eq!(sleeper.take().len(), 2);
        assert!(sleeper.sleeps().is_empty());
    }
}
