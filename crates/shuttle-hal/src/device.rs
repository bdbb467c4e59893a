//! The audio device: owns the mixer, the routing state and the streams'
//! shared context.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::capture::CaptureStream;
use crate::config::{
    AudioConfig, HalConfig, PcmConfig, SampleFormat, FRAME_SIZE, IN_SAMPLING_RATE,
};
use crate::error::{HalError, Result};
use crate::lock::{self, DeviceLock};
use crate::mixer::{MixerDevice, MixerGateway};
use crate::params::Parameters;
use crate::pcm::{Direction, PcmBackend};
use crate::playback::PlaybackStream;
use crate::router::{self, DeviceMask};
use crate::stream::StreamHandle;
use crate::timing::{Sleeper, ThreadSleeper};

/// State guarded by the device lock.
#[derive(Debug)]
pub(crate) struct DeviceState {
    pub(crate) devices: DeviceMask,
    pub(crate) mic_mute: bool,
    pub(crate) screen_off: bool,
    pub(crate) active_out: Option<Weak<PlaybackStream>>,
    pub(crate) active_in: Option<Weak<CaptureStream>>,
}

impl DeviceState {
    pub(crate) fn active_output(&self) -> Option<Arc<PlaybackStream>> {
        self.active_out.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn active_input(&self) -> Option<Arc<CaptureStream>> {
        self.active_in.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn capture_active(&self) -> bool {
        self.active_in
            .as_ref()
            .is_some_and(|stream| stream.strong_count() > 0)
    }
}

pub(crate) type DeviceGuard<'a> = lock::DeviceGuard<'a, DeviceState>;

/// Context shared by the device and every stream it opened.
pub(crate) struct DeviceShared {
    pub(crate) state: DeviceLock<DeviceState>,
    mixer: Mutex<MixerGateway>,
    pub(crate) backend: Arc<dyn PcmBackend>,
    pub(crate) sleeper: Arc<dyn Sleeper>,
    pub(crate) config: HalConfig,
}

impl DeviceShared {
    /// The mixer is a leaf lock: nothing else may be locked while it is held.
    pub(crate) fn mixer(&self) -> MutexGuard<'_, MixerGateway> {
        self.mixer.lock()
    }

    /// Replaces the `direction` bits of the device mask with those of
    /// `requested` and re-applies the output routes.
    ///
    /// An empty or unchanged request is ignored. When the SCO or digital bit
    /// of that direction toggles, `standby` runs first so the stream reopens on
    /// the new endpoint.
    pub(crate) fn route<F>(
        &self,
        device: &mut DeviceGuard<'_>,
        direction: Direction,
        requested: DeviceMask,
        standby: F,
    ) where
        F: FnOnce(&mut DeviceGuard<'_>),
    {
        let requested = requested.direction_bits(direction);
        let current = device.devices.direction_bits(direction);
        if requested.is_empty() || requested == current {
            return;
        }
        if router::needs_reopen(current, requested, direction) {
            standby(device);
        }
        device.devices = device.devices.with_direction_bits(direction, requested);
        info!(?direction, devices = %device.devices, "routing changed");
        if let Err(err) =
            router::select_devices(&mut self.mixer(), &self.config.routes, device.devices)
        {
            warn!(%err, "failed to apply output route");
        }
    }
}

/// The primary audio device of the board.
pub struct AudioDevice {
    shared: Arc<DeviceShared>,
}

impl AudioDevice {
    /// Opens the device with real-time sleeps. See
    /// [`AudioDevice::open_with_sleeper`].
    pub fn open(
        mixer: Box<dyn MixerDevice>,
        backend: Arc<dyn PcmBackend>,
        config: HalConfig,
    ) -> Result<Self> {
        Self::open_with_sleeper(mixer, backend, config, Arc::new(ThreadSleeper))
    }

    /// Resolves the mixer controls, applies the default routes and routes
    /// output to the speaker and input to the built-in microphone.
    ///
    /// Fails if a control of the fixed catalog or of the default table is
    /// missing.
    pub fn open_with_sleeper(
        mixer: Box<dyn MixerDevice>,
        backend: Arc<dyn PcmBackend>,
        config: HalConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        let mut gateway = MixerGateway::open(mixer)?;
        gateway.apply_control_set(&config.routes.defaults, true)?;
        let devices = DeviceMask::OUT_SPEAKER | DeviceMask::IN_BUILTIN_MIC;
        info!(
            backend = backend.name(),
            card = config.card,
            %devices,
            "audio device opened"
        );
        let shared = DeviceShared {
            state: DeviceLock::new(DeviceState {
                devices,
                mic_mute: false,
                screen_off: false,
                active_out: None,
                active_in: None,
            }),
            mixer: Mutex::new(gateway),
            backend,
            sleeper,
            config,
        };
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    pub fn supported_devices(&self) -> DeviceMask {
        DeviceMask::OUT_SPEAKER
            | DeviceMask::OUT_WIRED_HEADPHONE
            | DeviceMask::OUT_AUX_DIGITAL
            | DeviceMask::OUT_ALL_SCO
            | DeviceMask::OUT_DEFAULT
            | DeviceMask::IN_BUILTIN_MIC
            | DeviceMask::IN_ALL_SCO
            | DeviceMask::IN_DEFAULT
    }

    pub fn init_check(&self) -> Result<()> {
        Ok(())
    }

    pub fn set_voice_volume(&self, volume: f32) -> Result<()> {
        debug!(volume, "voice volume requested");
        Err(HalError::NotSupported("voice volume"))
    }

    pub fn set_master_volume(&self, volume: f32) -> Result<()> {
        debug!(volume, "set master volume");
        self.shared.mixer().set_master_volume(volume);
        Ok(())
    }

    pub fn set_mode(&self, mode: i32) -> Result<()> {
        debug!(mode, "set mode");
        Ok(())
    }

    /// Stores the mute flag and switches the microphone PGAs. Unmuting while
    /// capturing re-arms the capture stream's startup mute window.
    pub fn set_mic_mute(&self, muted: bool) -> Result<()> {
        debug!(muted, "set mic mute");
        let mut device = self.shared.state.lock();
        if let Some(active) = device.active_input() {
            if !muted && device.mic_mute {
                active.rearm_mute(&device);
            }
        }
        device.mic_mute = muted;
        drop(device);

        self.shared.mixer().set_mic_switches(!muted);
        Ok(())
    }

    pub fn mic_mute(&self) -> bool {
        self.shared.state.lock().mic_mute
    }

    /// Recognizes `screen_state` and `routing`. Routing applies to both
    /// directions with the same rules as the stream level parameter.
    pub fn set_parameters(&self, kvpairs: &str) -> Result<()> {
        debug!(kvpairs, "set device parameters");
        let params = Parameters::parse(kvpairs);
        let mut device = self.shared.state.lock();
        if let Some(screen_off) = params.screen_off() {
            device.screen_off = screen_off;
        }
        if let Some(requested) = params.routing() {
            self.shared
                .route(&mut device, Direction::Playback, requested, |device| {
                    if let Some(stream) = device.active_output() {
                        stream.standby_locked(device);
                    }
                });
            self.shared
                .route(&mut device, Direction::Capture, requested, |device| {
                    if let Some(stream) = device.active_input() {
                        stream.standby_locked(device);
                    }
                });
        }
        Ok(())
    }

    pub fn get_parameters(&self, _keys: &str) -> String {
        String::new()
    }

    /// Capture transfer size in bytes. The requested format is ignored: the
    /// HAL always captures in its own format.
    pub fn input_buffer_size(&self, config: &AudioConfig) -> usize {
        debug!(%config, "input buffer size requested");
        let period = PcmConfig::main_in().period_size as usize;
        period.div_ceil(16) * 16 * FRAME_SIZE
    }

    /// Opens a playback stream in standby. `config` is rewritten to the only
    /// format the hardware plays. Any previously active output is put into
    /// standby.
    pub fn open_output_stream(&self, config: &mut AudioConfig) -> Result<Arc<PlaybackStream>> {
        debug!(requested = %config, "open output stream");
        *config = AudioConfig::playback_default();
        let mut device = self.shared.state.lock();
        if let Some(previous) = device.active_output() {
            previous.standby_locked(&mut device);
        }
        drop(device);
        Ok(PlaybackStream::new(Arc::clone(&self.shared)))
    }

    pub fn close_output_stream(&self, stream: Arc<PlaybackStream>) {
        debug!("close output stream");
        stream.close();
    }

    /// Opens a capture stream in standby.
    ///
    /// Only 16-bit stereo at the native rate or half or a quarter of it can be
    /// captured. Any other request rewrites `config` to the nearest supported
    /// format and fails with [`HalError::UnsupportedConfig`].
    pub fn open_input_stream(&self, config: &mut AudioConfig) -> Result<Arc<CaptureStream>> {
        debug!(requested = %config, "open input stream");
        let shift = match decimation_shift(config) {
            Some(shift) => shift,
            None => {
                *config = nearest_capture_config(config.sample_rate);
                debug!(suggested = %config, "unsupported capture format");
                return Err(HalError::UnsupportedConfig {
                    suggested: *config,
                });
            }
        };
        debug!(shift, "capture format accepted");
        Ok(CaptureStream::new(Arc::clone(&self.shared), shift))
    }

    pub fn close_input_stream(&self, stream: Arc<CaptureStream>) {
        debug!("close input stream");
        stream.close();
    }

    /// Opens a stream of either direction. See
    /// [`AudioDevice::open_output_stream`] and
    /// [`AudioDevice::open_input_stream`].
    pub fn open_stream(
        &self,
        direction: Direction,
        config: &mut AudioConfig,
    ) -> Result<StreamHandle> {
        match direction {
            Direction::Playback => self.open_output_stream(config).map(StreamHandle::from),
            Direction::Capture => self.open_input_stream(config).map(StreamHandle::from),
        }
    }

    pub fn close_stream(&self, stream: StreamHandle) {
        match stream {
            StreamHandle::Playback(stream) => self.close_output_stream(stream),
            StreamHandle::Capture(stream) => self.close_input_stream(stream),
        }
    }

    pub fn devices(&self) -> DeviceMask {
        self.shared.state.lock().devices
    }

    pub fn screen_off(&self) -> bool {
        self.shared.state.lock().screen_off
    }

    pub fn config(&self) -> &HalConfig {
        &self.shared.config
    }

    /// Runs `f` against the mixer gateway.
    pub fn with_mixer<R>(&self, f: impl FnOnce(&mut MixerGateway) -> R) -> R {
        f(&mut self.shared.mixer())
    }
}

fn decimation_shift(config: &AudioConfig) -> Option<u32> {
    if config.format != SampleFormat::Pcm16 || config.channels != 2 {
        return None;
    }
    (0..=crate::decimate::MAX_SHIFT).find(|shift| config.sample_rate == IN_SAMPLING_RATE >> shift)
}

fn nearest_capture_config(requested_rate: u32) -> AudioConfig {
    let sample_rate = if requested_rate >= IN_SAMPLING_RATE >> 1 {
        IN_SAMPLING_RATE
    } else if requested_rate >= IN_SAMPLING_RATE >> 2 {
        IN_SAMPLING_RATE >> 1
    } else {
        IN_SAMPLING_RATE >> 2
    };
    AudioConfig::new(sample_rate, 2, SampleFormat::Pcm16)
}
