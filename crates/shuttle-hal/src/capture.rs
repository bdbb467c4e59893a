//! Capture stream engine.

use std::sync::{Arc, Weak};

use tracing::{debug, error, info, warn};

use crate::config::{PcmConfig, SampleFormat, FRAME_SIZE};
use crate::decimate::decimate;
use crate::device::{DeviceGuard, DeviceShared};
use crate::error::{HalError, PcmError, Result};
use crate::lock::StreamLock;
use crate::params::Parameters;
use crate::pcm::{Direction, Endpoint, Pcm, PcmResult};
use crate::router;
use crate::stream::{AudioStream, StreamIn};
use crate::timing::nominal_duration;

struct CaptureState {
    /// `None` while in standby.
    pcm: Option<Box<dyn Pcm>>,
    endpoint: Endpoint,
    config: PcmConfig,
    /// Hardware frames awaiting decimation. Empty unless decimating and
    /// active.
    scratch: Vec<u8>,
    frames_to_mute: u32,
}

pub struct CaptureStream {
    device: Arc<DeviceShared>,
    this: Weak<CaptureStream>,
    /// The reported rate is the hardware rate shifted right by this amount.
    shift: u32,
    state: StreamLock<CaptureState>,
}

impl CaptureStream {
    pub(crate) fn new(device: Arc<DeviceShared>, shift: u32) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            device,
            this: this.clone(),
            shift,
            state: StreamLock::new(CaptureState {
                pcm: None,
                endpoint: Endpoint::Main,
                config: PcmConfig::main_in(),
                scratch: Vec::new(),
                frames_to_mute: 0,
            }),
        })
    }

    pub fn is_standby(&self) -> bool {
        self.state.lock_detached().pcm.is_none()
    }

    pub fn endpoint(&self) -> Endpoint {
        self.state.lock_detached().endpoint
    }

    pub fn pcm_config(&self) -> PcmConfig {
        self.state.lock_detached().config
    }

    pub fn decimation_shift(&self) -> u32 {
        self.shift
    }

    /// Frames still forced to silence.
    pub fn frames_to_mute(&self) -> u32 {
        self.state.lock_detached().frames_to_mute
    }

    /// Size of the decimation scratch buffer in bytes.
    pub fn scratch_len(&self) -> usize {
        self.state.lock_detached().scratch.len()
    }

    fn is_self(&self, other: &Weak<CaptureStream>) -> bool {
        Weak::ptr_eq(other, &self.this)
    }

    pub(crate) fn standby_locked(&self, device: &mut DeviceGuard<'_>) {
        let mut state = self.state.lock(device);
        if state.pcm.take().is_some() {
            debug!(endpoint = %state.endpoint, "input standby");
            state.scratch = Vec::new();
            if device.active_in.as_ref().is_some_and(|active| self.is_self(active)) {
                device.active_in = None;
            }
        }
    }

    pub(crate) fn close(&self) {
        self.standby();
    }

    /// Restarts the startup mute window.
    pub(crate) fn rearm_mute(&self, device: &DeviceGuard<'_>) {
        self.state.lock(device).frames_to_mute = self.device.config.capture_mute_frames;
    }

    fn start(&self, state: &mut CaptureState, device: &mut DeviceGuard<'_>) -> Result<Box<dyn Pcm>> {
        if let Some(other) = device.active_input() {
            if !self.is_self(&other.this) {
                other.standby_locked(device);
            }
        }

        let endpoint = router::endpoint_for(device.devices, Direction::Capture);
        state.endpoint = endpoint;
        state.config = match endpoint {
            Endpoint::Sco => PcmConfig::sco(),
            Endpoint::Main | Endpoint::Digital => PcmConfig::main_in(),
        };

        info!(
            device = endpoint.device(),
            rate = state.config.rate,
            channels = state.config.channels,
            "start input stream"
        );
        let card = self.device.config.card;
        let pcm = match self
            .device
            .backend
            .open(card, endpoint, Direction::Capture, &state.config)
        {
            Ok(pcm) => pcm,
            Err(err) => {
                error!(%err, %endpoint, "pcm open for input failed");
                return Err(HalError::OutOfMemory {
                    endpoint,
                    reason: err.to_string(),
                });
            }
        };

        if self.shift > 0 {
            state.scratch = vec![0; state.config.period_size as usize * FRAME_SIZE];
        }
        state.frames_to_mute = self.device.config.capture_mute_frames;
        device.active_in = Some(self.this.clone());
        Ok(pcm)
    }

    /// Reads hardware frames chunk by chunk through `scratch` and decimates
    /// them into `output`. A failed read zeroes everything not produced yet.
    fn read_decimated(
        &self,
        pcm: &mut dyn Pcm,
        scratch: &mut [u8],
        output: &mut [u8],
    ) -> PcmResult<()> {
        let frames = output.len() / FRAME_SIZE;
        let per_chunk = (scratch.len() / FRAME_SIZE) >> self.shift;
        if per_chunk == 0 {
            output.fill(0);
            return Err(PcmError::Io("no decimation buffer".into()));
        }

        let mut done = 0;
        while done < frames {
            let chunk = (frames - done).min(per_chunk);
            let input = &mut scratch[..(chunk << self.shift) * FRAME_SIZE];
            if let Err(err) = pcm.read(input) {
                output[done * FRAME_SIZE..].fill(0);
                return Err(err);
            }
            decimate(
                input,
                &mut output[done * FRAME_SIZE..(done + chunk) * FRAME_SIZE],
                self.shift,
            );
            done += chunk;
        }
        output[frames * FRAME_SIZE..].fill(0);
        Ok(())
    }
}

impl AudioStream for CaptureStream {
    fn sample_rate(&self) -> u32 {
        self.state.lock_detached().config.rate >> self.shift
    }

    fn set_sample_rate(&self, rate: u32) -> Result<()> {
        debug!(rate, "set input sample rate");
        if rate == self.sample_rate() {
            Ok(())
        } else {
            Err(HalError::NotSupported("input sample rate change"))
        }
    }

    fn buffer_size(&self) -> usize {
        let period = self.state.lock_detached().config.period_size as usize;
        period.div_ceil(16) * 16 * FRAME_SIZE
    }

    fn channels(&self) -> u16 {
        2
    }

    fn format(&self) -> SampleFormat {
        SampleFormat::Pcm16
    }

    fn set_format(&self, format: SampleFormat) -> Result<()> {
        debug!(format = format.name(), "set input format");
        if format == SampleFormat::Pcm16 {
            Ok(())
        } else {
            Err(HalError::NotSupported("input format change"))
        }
    }

    fn standby(&self) {
        let mut device = self.device.state.lock();
        self.standby_locked(&mut device);
    }

    fn set_parameters(&self, kvpairs: &str) {
        debug!(kvpairs, "set input parameters");
        let Some(requested) = Parameters::parse(kvpairs).routing() else {
            return;
        };
        let mut device = self.device.state.lock();
        self.device
            .route(&mut device, Direction::Capture, requested, |device| {
                self.standby_locked(device)
            });
    }

    fn get_parameters(&self, _keys: &str) -> String {
        String::new()
    }
}

impl StreamIn for CaptureStream {
    fn set_gain(&self, gain: f32) {
        debug!(gain, "set input gain");
        self.device.mixer().set_mic_gain(gain);
    }

    /// Fills `buffer`, zeroing frames inside the mute window or while the
    /// microphone is muted. Hardware errors are masked: frames that could not
    /// be read are zeroed, the call sleeps for the buffer's duration and
    /// reports it as read.
    fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        let bytes = buffer.len();
        let frames = bytes / FRAME_SIZE;
        let mut device = self.device.state.lock();
        let mut state = self.state.lock(&device);

        let mut pcm = match state.pcm.take() {
            Some(pcm) => pcm,
            None => match self.start(&mut state, &mut device) {
                Ok(pcm) => pcm,
                Err(err) => {
                    drop(device);
                    let rate = state.config.rate >> self.shift;
                    drop(state);
                    error!("failed to start input stream");
                    buffer.fill(0);
                    self.device
                        .sleeper
                        .sleep(nominal_duration(bytes, FRAME_SIZE, rate));
                    return Err(err);
                }
            },
        };
        let mic_mute = device.mic_mute;
        drop(device);

        let result = if self.shift == 0 {
            let result = pcm.read(buffer);
            if result.is_err() {
                buffer.fill(0);
            }
            result
        } else {
            let CaptureState { scratch, .. } = &mut *state;
            self.read_decimated(pcm.as_mut(), scratch, buffer)
        };
        state.pcm = Some(pcm);

        match &result {
            Ok(()) => {
                let muted = if mic_mute {
                    frames
                } else {
                    frames.min(state.frames_to_mute as usize)
                };
                buffer[..muted * FRAME_SIZE].fill(0);
            }
            Err(err) => warn!(%err, "pcm read failed"),
        }
        let produced = u32::try_from(frames).unwrap_or(u32::MAX);
        state.frames_to_mute = state.frames_to_mute.saturating_sub(produced);
        let rate = state.config.rate >> self.shift;
        drop(state);

        if result.is_err() {
            self.device
                .sleeper
                .sleep(nominal_duration(bytes, FRAME_SIZE, rate));
        }
        Ok(bytes)
    }

    fn input_frames_lost(&self) -> u32 {
        0
    }
}
