//! Playback stream engine.
//!
//! The stream is created in standby and opens its PCM handle on the first
//! write. Writes on the codec or digital endpoints are paced by a
//! [`WritePacer`]; SCO writes go straight to the hardware.

use std::sync::{Arc, Weak};

use tracing::{debug, error, info, warn};

use crate::config::{
    PcmConfig, SampleFormat, FRAME_SIZE, OUT_LONG_PERIOD_COUNT, OUT_SHORT_PERIOD_COUNT,
};
use crate::device::{DeviceGuard, DeviceShared};
use crate::error::{HalError, PcmError, Result};
use crate::lock::StreamLock;
use crate::pacing::{BufferMode, WritePacer};
use crate::params::Parameters;
use crate::pcm::{Direction, Endpoint, Pcm};
use crate::router::{self, DeviceMask};
use crate::stream::{AudioStream, StreamOut};
use crate::timing::nominal_duration;

struct PlaybackState {
    /// `None` while in standby.
    pcm: Option<Box<dyn Pcm>>,
    endpoint: Endpoint,
    config: PcmConfig,
    pacer: WritePacer,
}

pub struct PlaybackStream {
    device: Arc<DeviceShared>,
    this: Weak<PlaybackStream>,
    state: StreamLock<PlaybackState>,
}

impl PlaybackStream {
    pub(crate) fn new(device: Arc<DeviceShared>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            device,
            this: this.clone(),
            state: StreamLock::new(PlaybackState {
                pcm: None,
                endpoint: Endpoint::Main,
                config: PcmConfig::main_out(),
                pacer: WritePacer::new(),
            }),
        })
    }

    pub fn is_standby(&self) -> bool {
        self.state.lock_detached().pcm.is_none()
    }

    /// Endpoint of the last (or current) hardware handle.
    pub fn endpoint(&self) -> Endpoint {
        self.state.lock_detached().endpoint
    }

    pub fn pcm_config(&self) -> PcmConfig {
        self.state.lock_detached().config
    }

    pub fn buffer_mode(&self) -> BufferMode {
        self.state.lock_detached().pacer.mode()
    }

    /// `(target, current)` write thresholds in frames.
    pub fn write_thresholds(&self) -> (i64, i64) {
        let state = self.state.lock_detached();
        (
            state.pacer.target_threshold(),
            state.pacer.current_threshold(),
        )
    }

    fn is_self(&self, other: &Weak<PlaybackStream>) -> bool {
        Weak::ptr_eq(other, &self.this)
    }

    /// Puts the stream into standby. The caller holds the device lock.
    pub(crate) fn standby_locked(&self, device: &mut DeviceGuard<'_>) {
        let mut state = self.state.lock(device);
        if state.pcm.take().is_some() {
            debug!(endpoint = %state.endpoint, "output standby");
            if device.active_out.as_ref().is_some_and(|active| self.is_self(active)) {
                device.active_out = None;
            }
        }
    }

    pub(crate) fn close(&self) {
        self.standby();
    }

    /// Opens the hardware handle for the endpoint the device is routed to.
    fn start(&self, state: &mut PlaybackState, device: &mut DeviceGuard<'_>) -> Result<Box<dyn Pcm>> {
        if let Some(other) = device.active_output() {
            if !self.is_self(&other.this) {
                other.standby_locked(device);
            }
        }

        let endpoint = router::endpoint_for(device.devices, Direction::Playback);
        state.endpoint = endpoint;
        state.config = match endpoint {
            Endpoint::Sco => PcmConfig::sco(),
            Endpoint::Main | Endpoint::Digital => PcmConfig::main_out(),
        };
        state.pacer.reset();

        info!(
            device = endpoint.device(),
            rate = state.config.rate,
            channels = state.config.channels,
            "start output stream"
        );
        let card = self.device.config.card;
        match self
            .device
            .backend
            .open(card, endpoint, Direction::Playback, &state.config)
        {
            Ok(pcm) => {
                device.active_out = Some(self.this.clone());
                Ok(pcm)
            }
            Err(err) => {
                error!(%err, %endpoint, "pcm open for output failed");
                Err(HalError::OutOfMemory {
                    endpoint,
                    reason: err.to_string(),
                })
            }
        }
    }
}

impl AudioStream for PlaybackStream {
    fn sample_rate(&self) -> u32 {
        self.state.lock_detached().config.rate
    }

    fn set_sample_rate(&self, rate: u32) -> Result<()> {
        debug!(rate, "set output sample rate");
        if rate == self.sample_rate() {
            Ok(())
        } else {
            Err(HalError::NotSupported("output sample rate change"))
        }
    }

    fn buffer_size(&self) -> usize {
        self.state.lock_detached().config.period_size as usize * FRAME_SIZE
    }

    fn channels(&self) -> u16 {
        2
    }

    fn format(&self) -> SampleFormat {
        SampleFormat::Pcm16
    }

    fn set_format(&self, format: SampleFormat) -> Result<()> {
        debug!(format = format.name(), "set output format");
        if format == SampleFormat::Pcm16 {
            Ok(())
        } else {
            Err(HalError::NotSupported("output format change"))
        }
    }

    fn standby(&self) {
        let mut device = self.device.state.lock();
        self.standby_locked(&mut device);
    }

    /// Accepts `routing` for output devices. Moving to or from SCO or the
    /// digital output puts the stream into standby first.
    fn set_parameters(&self, kvpairs: &str) {
        debug!(kvpairs, "set output parameters");
        let Some(requested) = Parameters::parse(kvpairs).routing() else {
            return;
        };
        let mut device = self.device.state.lock();
        self.device
            .route(&mut device, Direction::Playback, requested, |device| {
                self.standby_locked(device)
            });
    }

    fn get_parameters(&self, _keys: &str) -> String {
        String::new()
    }
}

impl StreamOut for PlaybackStream {
    fn latency_ms(&self) -> u32 {
        let device = self.device.state.lock();
        let period_count = if device.screen_off
            && !device.capture_active()
            && !device.devices.intersects(DeviceMask::OUT_ALL_SCO)
        {
            OUT_LONG_PERIOD_COUNT
        } else {
            OUT_SHORT_PERIOD_COUNT
        };
        drop(device);
        let config = self.state.lock_detached().config;
        config.period_size * period_count * 1000 / config.rate
    }

    fn set_volume(&self, left: f32, right: f32) {
        debug!(left, right, "set output volume");
        self.device.mixer().set_output_volume(left, right);
    }

    fn write(&self, buffer: &[u8]) -> Result<usize> {
        let bytes = buffer.len();
        let mut device = self.device.state.lock();
        let mut state = self.state.lock(&device);

        let mut pcm = match state.pcm.take() {
            Some(pcm) => pcm,
            None => match self.start(&mut state, &mut device) {
                Ok(pcm) => pcm,
                Err(err) => {
                    drop(device);
                    let rate = state.config.rate;
                    drop(state);
                    self.device
                        .sleeper
                        .sleep(nominal_duration(bytes, FRAME_SIZE, rate));
                    return Err(err);
                }
            },
        };

        let mode = BufferMode::select(device.screen_off, device.capture_active());
        let sco_on = device.devices.intersects(DeviceMask::OUT_ALL_SCO);
        drop(device);

        if !sco_on {
            let period_size = state.config.period_size;
            if state.pacer.set_mode(mode, period_size) {
                debug!(
                    ?mode,
                    threshold = state.pacer.target_threshold(),
                    "output buffer mode changed"
                );
            }
            let kernel_frames = state.pacer.wait_for_room(
                pcm.as_mut(),
                state.config.rate,
                self.device.sleeper.as_ref(),
            );
            state.pacer.step(kernel_frames, period_size);
        }

        let result = pcm.write(buffer);
        state.pcm = Some(pcm);
        let rate = state.config.rate;
        drop(state);

        match result {
            Ok(()) => Ok(bytes),
            Err(PcmError::Underrun) => {
                warn!("output underrun");
                Err(HalError::Underrun)
            }
            Err(err) => {
                warn!(%err, "pcm write failed");
                self.device
                    .sleeper
                    .sleep(nominal_duration(bytes, FRAME_SIZE, rate));
                Ok(bytes)
            }
        }
    }

    fn render_position(&self) -> Result<u32> {
        Err(HalError::NotSupported("render position"))
    }

    fn next_write_timestamp(&self) -> Result<i64> {
        Err(HalError::NotSupported("next write timestamp"))
    }
}
