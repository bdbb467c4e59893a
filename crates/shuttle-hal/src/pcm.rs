//! PCM backends provide access to the kernel audio endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PcmConfig;
use crate::error::PcmError;

pub type PcmResult<T> = std::result::Result<T, PcmError>;

/// Logical PCM endpoints exposed by the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// Codec port.
    Main,
    /// Bluetooth / modem port.
    Sco,
    /// SPDIF (HDMI) port.
    Digital,
}

impl Endpoint {
    /// PCM device number on the card.
    pub fn device(self) -> u32 {
        match self {
            Endpoint::Main => 0,
            Endpoint::Sco => 1,
            Endpoint::Digital => 2,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Endpoint::Main => "main",
            Endpoint::Sco => "sco",
            Endpoint::Digital => "digital",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Playback,
    Capture,
}

/// An open hardware stream. Dropping the handle closes it.
pub trait Pcm: Send {
    /// Blocks until the whole buffer has been queued.
    fn write(&mut self, data: &[u8]) -> PcmResult<()>;
    /// Blocks until the whole buffer has been filled.
    fn read(&mut self, data: &mut [u8]) -> PcmResult<()>;
    /// Frames that can be written without blocking, as reported with the
    /// hardware timestamp.
    fn available_frames(&mut self) -> PcmResult<u32>;
    /// Size of the hardware ring in frames.
    fn buffer_size(&self) -> u32;
}

pub trait PcmBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn open(
        &self,
        card: u32,
        endpoint: Endpoint,
        direction: Direction,
        config: &PcmConfig,
    ) -> PcmResult<Box<dyn Pcm>>;
}

/// Frames resident in the hardware queue, or `None` when the position query
/// fails.
pub fn queued_frames(pcm: &mut dyn Pcm) -> Option<i64> {
    let available = pcm.available_frames().ok()?;
    Some(i64::from(pcm.buffer_size()) - i64::from(available))
}
