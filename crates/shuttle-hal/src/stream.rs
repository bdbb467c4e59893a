//! Stream interfaces handed to the audio framework.

use std::sync::Arc;

use crate::capture::CaptureStream;
use crate::config::SampleFormat;
use crate::error::Result;
use crate::pcm::Direction;
use crate::playback::PlaybackStream;

/// Operations shared by both stream directions.
pub trait AudioStream: Send + Sync {
    fn sample_rate(&self) -> u32;
    /// Only the current rate is accepted.
    fn set_sample_rate(&self, rate: u32) -> Result<()>;
    /// Preferred transfer size in bytes.
    fn buffer_size(&self) -> usize;
    fn channels(&self) -> u16;
    fn format(&self) -> SampleFormat;
    fn set_format(&self, format: SampleFormat) -> Result<()>;
    /// Closes the hardware handle. The next transfer reopens it.
    fn standby(&self);
    fn set_parameters(&self, kvpairs: &str);
    fn get_parameters(&self, keys: &str) -> String;

    /// Effects are accepted and ignored; the codec has no effect engine.
    fn add_audio_effect(&self, _effect: EffectHandle) -> Result<()> {
        Ok(())
    }

    fn remove_audio_effect(&self, _effect: EffectHandle) -> Result<()> {
        Ok(())
    }
}

/// Opaque effect reference from the framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectHandle(pub u64);

pub trait StreamOut: AudioStream {
    fn latency_ms(&self) -> u32;
    fn set_volume(&self, left: f32, right: f32);
    /// Queues `buffer` for playback. Returns the number of bytes consumed,
    /// which is the whole buffer unless an underrun is reported.
    fn write(&self, buffer: &[u8]) -> Result<usize>;
    fn render_position(&self) -> Result<u32>;
    fn next_write_timestamp(&self) -> Result<i64>;
}

pub trait StreamIn: AudioStream {
    fn set_gain(&self, gain: f32);
    /// Fills `buffer` with captured frames. Always reports the full length.
    fn read(&self, buffer: &mut [u8]) -> Result<usize>;
    fn input_frames_lost(&self) -> u32;
}

/// A stream handed out by the device.
#[derive(Clone)]
pub enum StreamHandle {
    Playback(Arc<PlaybackStream>),
    Capture(Arc<CaptureStream>),
}

impl StreamHandle {
    pub fn direction(&self) -> Direction {
        match self {
            StreamHandle::Playback(_) => Direction::Playback,
            StreamHandle::Capture(_) => Direction::Capture,
        }
    }

    pub fn common(&self) -> &dyn AudioStream {
        match self {
            StreamHandle::Playback(stream) => stream.as_ref(),
            StreamHandle::Capture(stream) => stream.as_ref(),
        }
    }

    pub fn as_playback(&self) -> Option<&Arc<PlaybackStream>> {
        match self {
            StreamHandle::Playback(stream) => Some(stream),
            StreamHandle::Capture(_) => None,
        }
    }

    pub fn as_capture(&self) -> Option<&Arc<CaptureStream>> {
        match self {
            StreamHandle::Capture(stream) => Some(stream),
            StreamHandle::Playback(_) => None,
        }
    }
}

impl From<Arc<PlaybackStream>> for StreamHandle {
    fn from(stream: Arc<PlaybackStream>) -> Self {
        StreamHandle::Playback(stream)
    }
}

impl From<Arc<CaptureStream>> for StreamHandle {
    fn from(stream: Arc<CaptureStream>) -> Self {
        StreamHandle::Capture(stream)
    }
}
