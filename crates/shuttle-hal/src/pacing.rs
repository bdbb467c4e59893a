//! Adaptive write pacing of the playback path.
//!
//! The kernel buffer is always allocated for the long period count. How much
//! of it the HAL lets the framework fill is governed by a write threshold:
//! a deep threshold while the screen is off saves wake-ups, a shallow one
//! keeps latency low otherwise. Moving between the two is done gradually so a
//! single write never stalls for long.

use std::time::Duration;

use tracing::warn;

use crate::config::{
    MAX_WRITE_SLEEP_US, MIN_WRITE_SLEEP_US, OUT_LONG_PERIOD_COUNT, OUT_SHORT_PERIOD_COUNT,
};
use crate::pcm::{queued_frames, Pcm};
use crate::timing::{frames_to_micros, Sleeper};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferMode {
    /// Freshly started stream, thresholds not chosen yet.
    #[default]
    Unknown,
    Short,
    Long,
}

impl BufferMode {
    /// Deep buffering only pays off when nobody is looking at the screen and
    /// no capture needs low round-trip latency.
    pub fn select(screen_off: bool, capture_active: bool) -> Self {
        if screen_off && !capture_active {
            BufferMode::Long
        } else {
            BufferMode::Short
        }
    }

    pub fn period_count(self) -> u32 {
        match self {
            BufferMode::Long => OUT_LONG_PERIOD_COUNT,
            BufferMode::Short | BufferMode::Unknown => OUT_SHORT_PERIOD_COUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WritePacer {
    mode: BufferMode,
    target: i64,
    current: i64,
}

impl WritePacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// Threshold the pacer converges to.
    pub fn target_threshold(&self) -> i64 {
        self.target
    }

    /// Threshold enforced on the current write.
    pub fn current_threshold(&self) -> i64 {
        self.current
    }

    /// Forgets the mode so the next [`WritePacer::set_mode`] snaps both
    /// thresholds. Called whenever the stream leaves standby.
    pub fn reset(&mut self) {
        self.mode = BufferMode::Unknown;
    }

    /// Switches the buffering mode. Returns whether anything changed.
    pub fn set_mode(&mut self, mode: BufferMode, period_size: u32) -> bool {
        if mode == self.mode {
            return false;
        }
        self.target = i64::from(period_size) * i64::from(mode.period_count());
        if self.mode == BufferMode::Unknown {
            self.current = self.target;
        }
        self.mode = mode;
        true
    }

    /// Sleeps while the hardware queue holds more than the current threshold.
    ///
    /// Each sleep covers the excess at `rate`. Excess worth less than
    /// [`MIN_WRITE_SLEEP_US`] is tolerated, and the sleeps of one call never
    /// add up to more than [`MAX_WRITE_SLEEP_US`]. Returns the last observed
    /// queue depth (0 if the position could never be read).
    pub fn wait_for_room(&self, pcm: &mut dyn Pcm, rate: u32, sleeper: &dyn Sleeper) -> i64 {
        let mut kernel_frames = 0;
        let mut total_us = 0u64;
        loop {
            match queued_frames(pcm) {
                Some(frames) => kernel_frames = frames,
                None => break,
            }
            if kernel_frames > self.current {
                let mut sleep_us = frames_to_micros(kernel_frames - self.current, rate);
                if sleep_us < MIN_WRITE_SLEEP_US {
                    break;
                }
                total_us += sleep_us;
                if total_us > MAX_WRITE_SLEEP_US {
                    warn!(
                        requested_us = total_us,
                        limit_us = MAX_WRITE_SLEEP_US,
                        "limiting write sleep time"
                    );
                    sleep_us -= total_us - MAX_WRITE_SLEEP_US;
                }
                sleeper.sleep(Duration::from_micros(sleep_us));
            }
            if kernel_frames <= self.current || total_us > MAX_WRITE_SLEEP_US {
                break;
            }
        }
        kernel_frames
    }

    /// Moves the current threshold one quarter period toward the target.
    ///
    /// Once converged, a queue that drained far below the target (more than
    /// two short periods) pulls the current threshold down to just above the
    /// observed depth, so the refill is not throttled against an empty buffer.
    pub fn step(&mut self, kernel_frames: i64, period_size: u32) {
        let period = i64::from(period_size);
        let stride = period / 4;
        if self.current > self.target {
            self.current = (self.current - stride).max(self.target);
        } else if self.current < self.target {
            self.current = (self.current + stride).min(self.target);
        } else if kernel_frames < self.target
            && self.target - kernel_frames > period * i64::from(OUT_SHORT_PERIOD_COUNT)
            && period > 0
        {
            self.current = (kernel_frames / period + 1) * period + stride;
        }
    }
}
