//! Shuttle Audio HAL
//! =================
//! Primary audio hardware abstraction for the Shuttle codec board. The
//! [`AudioDevice`] hands out one playback and one capture stream, routes them
//! between the codec, Bluetooth SCO and the digital output, and paces playback
//! writes so the kernel buffer depth follows the power state of the device.

pub mod capture;
pub mod config;
pub mod decimate;
pub mod device;
pub mod error;
pub mod lock;
pub mod mixer;
pub mod pacing;
pub mod params;
pub mod pcm;
pub mod playback;
pub mod router;
pub mod stream;
pub mod timing;
pub mod virtual_hw;

pub use capture::CaptureStream;
pub use config::{AudioConfig, HalConfig, PcmConfig, SampleFormat};
pub use device::AudioDevice;
pub use error::{HalError, MixerError, PcmError, Result};
pub use mixer::{ControlSet, ControlValue, MixerDevice, MixerGateway};
pub use pacing::BufferMode;
pub use pcm::{Direction, Endpoint, Pcm, PcmBackend};
pub use playback::PlaybackStream;
pub use router::DeviceMask;
pub use stream::{AudioStream, StreamHandle, StreamIn, StreamOut};
pub use timing::{RecordingSleeper, Sleeper, ThreadSleeper};
pub use virtual_hw::{VirtualMixer, VirtualPcmBackend};
