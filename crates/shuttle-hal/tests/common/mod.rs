#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use shuttle_hal::{AudioDevice, HalConfig, RecordingSleeper, VirtualMixer, VirtualPcmBackend};

/// A device wired to virtual hardware, with handles to inspect it.
pub struct Rig {
    pub mixer: VirtualMixer,
    pub backend: VirtualPcmBackend,
    pub sleeper: Arc<RecordingSleeper>,
    pub device: AudioDevice,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_config(HalConfig::default())
    }

    pub fn with_config(config: HalConfig) -> Self {
        let mixer = VirtualMixer::shuttle_codec();
        let backend = VirtualPcmBackend::new();
        let sleeper = Arc::new(RecordingSleeper::new());
        let device = AudioDevice::open_with_sleeper(
            Box::new(mixer.clone()),
            Arc::new(backend.clone()),
            config,
            sleeper.clone(),
        )
        .expect("open virtual device");
        Self {
            mixer,
            backend,
            sleeper,
            device,
        }
    }

    /// Capture without the startup mute window.
    pub fn unmuted() -> Self {
        Self::with_config(HalConfig {
            capture_mute_frames: 0,
            ..HalConfig::default()
        })
    }
}

pub fn period_bytes(frames: usize) -> Vec<u8> {
    vec![0x11; frames * 4]
}

pub fn samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

pub fn micros(us: u64) -> Duration {
    Duration::from_micros(us)
}
