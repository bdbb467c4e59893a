//! Virtual codec used for testing and development.
//!
//! [`VirtualMixer`] and [`VirtualPcmBackend`] are cheap to clone; clones share
//! state, so a test can hand one clone to the device and inspect the other.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::PcmConfig;
use crate::error::{MixerError, PcmError};
use crate::mixer::routes::*;
use crate::mixer::{ControlId, ControlInfo, ControlKind, MixerDevice, ENUM_OFF};
use crate::pcm::{Direction, Endpoint, Pcm, PcmBackend, PcmResult};

/// Number of recent opens and writes the backend remembers.
pub const LOG_CAPACITY: usize = 256;
/// Current value of a virtual control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlState {
    Values(Vec<i32>),
    Item(String),
}

#[derive(Debug, Clone)]
struct VirtualControl {
    name: String,
    kind: ControlKind,
    state: ControlState,
}

#[derive(Debug, Default)]
struct MixerState {
    controls: Vec<VirtualControl>,
    writes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct VirtualMixer {
    inner: Arc<Mutex<MixerState>>,
}

impl VirtualMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The control catalog of the board codec, every control at its reset
    /// value.
    pub fn shuttle_codec() -> Self {
        let mux = || ControlKind::Enum {
            options: vec![
                ENUM_OFF.to_string(),
                "Left".to_string(),
                "Right".to_string(),
                "Differential".to_string(),
            ],
        };
        let int = |max| ControlKind::Integer { min: 0, max };
        Self::new()
            .with_control(PCM_PLAYBACK_VOLUME, int(PCM_VOLUME_MAX), 2)
            .with_control(PCM_CAPTURE_VOLUME, int(CAPTURE_VOLUME_MAX), 2)
            .with_control(SPEAKER_PLAYBACK_VOLUME, int(SPEAKER_VOLUME_MAX), 2)
            .with_control(SPEAKER_PLAYBACK_SWITCH, ControlKind::Boolean, 1)
            .with_control(HEADSET_PLAYBACK_VOLUME, int(HEADSET_VOLUME_MAX), 2)
            .with_control(HEADSET_PLAYBACK_SWITCH, ControlKind::Boolean, 2)
            .with_control(MICL_CAPTURE_VOLUME, int(MIC_VOLUME_MAX), 1)
            .with_control(MICR_CAPTURE_VOLUME, int(MIC_VOLUME_MAX), 1)
            .with_control(MICL_CAPTURE_SWITCH, ControlKind::Boolean, 1)
            .with_control(MICR_CAPTURE_SWITCH, ControlKind::Boolean, 1)
            .with_control(MICL_CAPTURE_MUX, mux(), 1)
            .with_control(MICR_CAPTURE_MUX, mux(), 1)
    }

    pub fn with_control(self, name: &str, kind: ControlKind, num_values: usize) -> Self {
        let state = match &kind {
            ControlKind::Enum { options } => {
                ControlState::Item(options.first().cloned().unwrap_or_default())
            }
            _ => ControlState::Values(vec![0; num_values.max(1)]),
        };
        self.inner.lock().controls.push(VirtualControl {
            name: name.to_string(),
            kind,
            state,
        });
        self
    }

    /// Drops a control from the catalog, emulating a codec driver that does
    /// not expose it.
    pub fn without(self, name: &str) -> Self {
        self.inner.lock().controls.retain(|control| control.name != name);
        self
    }

    pub fn state(&self, name: &str) -> Option<ControlState> {
        self.inner
            .lock()
            .controls
            .iter()
            .find(|control| control.name == name)
            .map(|control| control.state.clone())
    }

    /// Every control with its current value, in catalog order.
    pub fn snapshot(&self) -> Vec<(String, ControlState)> {
        self.inner
            .lock()
            .controls
            .iter()
            .map(|control| (control.name.clone(), control.state.clone()))
            .collect()
    }

    /// Number of successful value writes since creation.
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }
}

impl MixerDevice for VirtualMixer {
    fn find_control(&self, name: &str) -> Option<ControlId> {
        self.inner
            .lock()
            .controls
            .iter()
            .position(|control| control.name == name)
            .map(ControlId)
    }

    fn num_values(&self, id: ControlId) -> usize {
        match self.inner.lock().controls.get(id.0).map(|c| &c.state) {
            Some(ControlState::Values(values)) => values.len(),
            Some(ControlState::Item(_)) => 1,
            None => 0,
        }
    }

    fn set_value(&mut self, id: ControlId, index: usize, value: i32) -> Result<(), MixerError> {
        let mut inner = self.inner.lock();
        let control = inner
            .controls
            .get_mut(id.0)
            .ok_or_else(|| MixerError::Io(format!("no control #{}", id.0)))?;
        let (min, max) = match control.kind {
            ControlKind::Boolean => (0, 1),
            ControlKind::Integer { min, max } => (min, max),
            ControlKind::Enum { .. } => return Err(MixerError::WrongKind(control.name.clone())),
        };
        if !(min..=max).contains(&value) {
            return Err(MixerError::Io(format!(
                "value {value} outside {min}..={max} for {}",
                control.name
            )));
        }
        let name = control.name.clone();
        match &mut control.state {
            ControlState::Values(values) => {
                let slot = values
                    .get_mut(index)
                    .ok_or(MixerError::IndexOutOfRange {
                        control: name,
                        index,
                    })?;
                *slot = value;
            }
            ControlState::Item(_) => return Err(MixerError::WrongKind(name)),
        }
        inner.writes += 1;
        Ok(())
    }

    fn set_enum(&mut self, id: ControlId, token: &str) -> Result<(), MixerError> {
        let mut inner = self.inner.lock();
        let control = inner
            .controls
            .get_mut(id.0)
            .ok_or_else(|| MixerError::Io(format!("no control #{}", id.0)))?;
        match &control.kind {
            ControlKind::Enum { options } if options.iter().any(|option| option == token) => {
                control.state = ControlState::Item(token.to_string());
            }
            ControlKind::Enum { .. } => {
                return Err(MixerError::InvalidToken {
                    control: control.name.clone(),
                    token: token.to_string(),
                })
            }
            _ => return Err(MixerError::WrongKind(control.name.clone())),
        }
        inner.writes += 1;
        Ok(())
    }

    fn controls(&self) -> Vec<ControlInfo> {
        self.inner
            .lock()
            .controls
            .iter()
            .enumerate()
            .map(|(index, control)| ControlInfo {
                id: ControlId(index),
                name: control.name.clone(),
                kind: control.kind.clone(),
                num_values: match &control.state {
                    ControlState::Values(values) => values.len(),
                    ControlState::Item(_) => 1,
                },
            })
            .collect()
    }
}

/// One successful `open` on the virtual backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRecord {
    pub card: u32,
    pub endpoint: Endpoint,
    pub direction: Direction,
    pub config: PcmConfig,
}

#[derive(Debug, Default)]
struct BackendState {
    opens: VecDeque<OpenRecord>,
    open_count: usize,
    open_failures: u32,
    live_handles: usize,
    queue_levels: VecDeque<Option<u32>>,
    write_errors: VecDeque<PcmError>,
    read_outcomes: VecDeque<Option<PcmError>>,
    written: VecDeque<(Endpoint, usize)>,
    write_count: usize,
    capture_pattern: Vec<i16>,
    capture_position: usize,
}

#[derive(Debug, Clone, Default)]
pub struct VirtualPcmBackend {
    inner: Arc<Mutex<BackendState>>,
}

impl VirtualPcmBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` opens fail as if the driver were out of memory.
    pub fn fail_next_opens(&self, count: u32) {
        self.inner.lock().open_failures = count;
    }

    /// Scripts the frames the hardware reports as queued on successive
    /// position queries. `None` makes that query fail. Once the script runs
    /// out the queue reads as empty.
    pub fn push_queue_levels(&self, levels: impl IntoIterator<Item = Option<u32>>) {
        self.inner.lock().queue_levels.extend(levels);
    }

    pub fn push_write_error(&self, error: PcmError) {
        self.inner.lock().write_errors.push_back(error);
    }

    /// Queues a failure for a future capture read. Reads queued earlier with
    /// [`VirtualPcmBackend::push_read_success`] go first.
    pub fn push_read_error(&self, error: PcmError) {
        self.inner.lock().read_outcomes.push_back(Some(error));
    }

    pub fn push_read_success(&self, count: usize) {
        let mut inner = self.inner.lock();
        inner.read_outcomes.extend((0..count).map(|_| None));
    }

    /// Interleaved samples served by capture handles, repeated cyclically.
    /// With no pattern the capture side produces a ramp of sample indices.
    pub fn set_capture_pattern(&self, samples: Vec<i16>) {
        let mut inner = self.inner.lock();
        inner.capture_pattern = samples;
        inner.capture_position = 0;
    }

    /// The most recent successful opens, oldest first.
    pub fn opens(&self) -> Vec<OpenRecord> {
        self.inner.lock().opens.iter().cloned().collect()
    }

    /// Successful opens over the lifetime of the backend.
    pub fn open_count(&self) -> usize {
        self.inner.lock().open_count
    }

    pub fn live_handles(&self) -> usize {
        self.inner.lock().live_handles
    }

    /// Byte count of the most recent successful writes (at most
    /// [`LOG_CAPACITY`]), with the endpoint each went to.
    pub fn writes(&self) -> Vec<(Endpoint, usize)> {
        self.inner.lock().written.iter().copied().collect()
    }

    /// Successful writes over the lifetime of the backend.
    pub fn write_count(&self) -> usize {
        self.inner.lock().write_count
    }
}

impl PcmBackend for VirtualPcmBackend {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn open(
        &self,
        card: u32,
        endpoint: Endpoint,
        direction: Direction,
        config: &PcmConfig,
    ) -> PcmResult<Box<dyn Pcm>> {
        let mut inner = self.inner.lock();
        if inner.open_failures > 0 {
            inner.open_failures -= 1;
            return Err(PcmError::NotReady(format!(
                "cannot allocate pcm {card}:{}",
                endpoint.device()
            )));
        }
        debug!(card, device = endpoint.device(), ?direction, "virtual pcm open");
        push_bounded(
            &mut inner.opens,
            OpenRecord {
                card,
                endpoint,
                direction,
                config: *config,
            },
        );
        inner.open_count += 1;
        inner.live_handles += 1;
        Ok(Box::new(VirtualPcm {
            endpoint,
            buffer_size: config.buffer_frames(),
            inner: Arc::clone(&self.inner),
        }))
    }
}

fn push_bounded<T>(log: &mut VecDeque<T>, entry: T) {
    if log.len() == LOG_CAPACITY {
        log.pop_front();
    }
    log.push_back(entry);
}

struct VirtualPcm {
    endpoint: Endpoint,
    buffer_size: u32,
    inner: Arc<Mutex<BackendState>>,
}

impl Pcm for VirtualPcm {
    fn write(&mut self, data: &[u8]) -> PcmResult<()> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.write_errors.pop_front() {
            return Err(err);
        }
        let entry = (self.endpoint, data.len());
        push_bounded(&mut inner.written, entry);
        inner.write_count += 1;
        Ok(())
    }

    fn read(&mut self, data: &mut [u8]) -> PcmResult<()> {
        let mut inner = self.inner.lock();
        if let Some(Some(err)) = inner.read_outcomes.pop_front() {
            return Err(err);
        }
        for bytes in data.chunks_exact_mut(2) {
            let position = inner.capture_position;
            let sample = match inner.capture_pattern.len() {
                0 => (position % 32_768) as i16,
                len => inner.capture_pattern[position % len],
            };
            bytes.copy_from_slice(&sample.to_le_bytes());
            inner.capture_position = position.wrapping_add(1);
        }
        Ok(())
    }

    fn available_frames(&mut self) -> PcmResult<u32> {
        let level = self.inner.lock().queue_levels.pop_front();
        match level {
            Some(Some(queued)) => Ok(self.buffer_size.saturating_sub(queued)),
            Some(None) => Err(PcmError::Io("htimestamp unavailable".into())),
            None => Ok(self.buffer_size),
        }
    }

    fn buffer_size(&self) -> u32 {
        self.buffer_size
    }
}

impl Drop for VirtualPcm {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        inner.live_handles = inner.live_handles.saturating_sub(1);
    }
}
