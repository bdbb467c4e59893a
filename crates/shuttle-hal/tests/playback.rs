mod common;

use std::sync::Arc;

use common::{micros, period_bytes, Rig};
use shuttle_hal::config::{MAX_WRITE_SLEEP_US, OUT_PERIOD_SIZE};
use shuttle_hal::mixer::routes::{HEADSET_PLAYBACK_SWITCH, SPEAKER_PLAYBACK_SWITCH};
use shuttle_hal::virtual_hw::ControlState;
use shuttle_hal::{
    AudioConfig, AudioStream, BufferMode, DeviceMask, Direction, Endpoint, HalError, PcmConfig,
    PcmError, StreamIn, StreamOut,
};

const PERIOD: usize = OUT_PERIOD_SIZE as usize;

fn routing(mask: DeviceMask) -> String {
    format!("routing={}", mask.bits())
}

#[test]
fn first_write_opens_main_codec_with_long_preset() {
    let rig = Rig::new();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .expect("open output");
    assert!(stream.is_standby());

    let buffer = period_bytes(PERIOD);
    assert_eq!(stream.write(&buffer).expect("write"), buffer.len());

    let opens = rig.backend.opens();
    assert_eq!(opens.len(), 1);
    assert_eq!(opens[0].endpoint, Endpoint::Main);
    assert_eq!(opens[0].direction, Direction::Playback);
    assert_eq!(opens[0].config, PcmConfig::main_out());
    assert_eq!(rig.backend.writes(), [(Endpoint::Main, buffer.len())]);
    assert!(!stream.is_standby());
    assert!(rig.sleeper.sleeps().is_empty());
}

#[test]
fn rerouting_to_sco_reopens_with_sco_preset_and_skips_pacing() {
    let rig = Rig::new();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    stream.write(&period_bytes(PERIOD)).unwrap();

    stream.set_parameters(&routing(DeviceMask::OUT_BLUETOOTH_SCO));
    assert!(stream.is_standby());
    assert_eq!(rig.backend.live_handles(), 0);

    // A full queue would make a paced write sleep.
    rig.backend.push_queue_levels([Some(1024); 4]);
    stream.write(&period_bytes(256)).unwrap();

    let opens = rig.backend.opens();
    assert_eq!(opens.len(), 2);
    assert_eq!(opens[1].endpoint, Endpoint::Sco);
    assert_eq!(opens[1].config, PcmConfig::sco());
    assert!(rig.sleeper.sleeps().is_empty());
    assert_eq!(stream.sample_rate(), 8_000);
}

#[test]
fn speaker_to_headphone_keeps_stream_open() {
    let rig = Rig::new();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    stream.write(&period_bytes(PERIOD)).unwrap();

    stream.set_parameters(&routing(DeviceMask::OUT_WIRED_HEADPHONE));
    assert!(!stream.is_standby());
    assert_eq!(rig.backend.opens().len(), 1);
    assert_eq!(
        rig.mixer.state(HEADSET_PLAYBACK_SWITCH),
        Some(ControlState::Values(vec![1, 1]))
    );
    assert_eq!(
        rig.mixer.state(SPEAKER_PLAYBACK_SWITCH),
        Some(ControlState::Values(vec![0]))
    );
    assert_eq!(
        rig.device.devices(),
        DeviceMask::OUT_WIRED_HEADPHONE | DeviceMask::IN_BUILTIN_MIC
    );
}

#[test]
fn zero_or_unchanged_routing_is_ignored() {
    let rig = Rig::new();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    stream.write(&period_bytes(PERIOD)).unwrap();
    let writes = rig.mixer.write_count();

    stream.set_parameters("routing=0");
    stream.set_parameters(&routing(DeviceMask::OUT_SPEAKER));
    assert_eq!(rig.mixer.write_count(), writes);
    assert!(!stream.is_standby());
}

#[test]
fn screen_off_selects_long_buffering() {
    let rig = Rig::new();
    rig.device.set_parameters("screen_state=off").unwrap();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    // Slightly under the deep threshold: no sleep and no recovery snap.
    rig.backend.push_queue_levels([Some(PERIOD as u32 * 8 - 60)]);
    stream.write(&period_bytes(PERIOD)).unwrap();

    assert_eq!(stream.buffer_mode(), BufferMode::Long);
    let long = (PERIOD * 8) as i64;
    assert_eq!(stream.write_thresholds(), (long, long));
}

#[test]
fn active_capture_forces_short_buffering() {
    let rig = Rig::new();
    rig.device.set_parameters("screen_state=off").unwrap();
    let input = rig
        .device
        .open_input_stream(&mut AudioConfig::capture_default())
        .unwrap();
    input.read(&mut [0u8; 4096]).unwrap();

    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    stream.write(&period_bytes(PERIOD)).unwrap();
    assert_eq!(stream.buffer_mode(), BufferMode::Short);
}

#[test]
fn waking_the_screen_steps_threshold_down() {
    let rig = Rig::new();
    rig.device.set_parameters("screen_state=off").unwrap();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    rig.backend.push_queue_levels([Some(PERIOD as u32 * 8 - 60)]);
    stream.write(&period_bytes(PERIOD)).unwrap();

    rig.device.set_parameters("screen_state=on").unwrap();
    let long = (PERIOD * 8) as i64;
    let short = (PERIOD * 2) as i64;
    let stride = (PERIOD / 4) as i64;
    for step in 1..=4 {
        // While converging a shallow queue only moves the threshold by one
        // stride.
        rig.backend.push_queue_levels([Some(PERIOD as u32 * 2)]);
        stream.write(&period_bytes(PERIOD)).unwrap();
        assert_eq!(stream.write_thresholds(), (short, long - stride * step));
    }
}

#[test]
fn pacing_sleep_is_capped_per_write() {
    let rig = Rig::new();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    rig.backend.push_queue_levels([Some(PERIOD as u32 * 8); 8]);
    stream.write(&period_bytes(PERIOD)).unwrap();
    assert_eq!(rig.sleeper.total(), micros(MAX_WRITE_SLEEP_US));
}

#[test]
fn underrun_is_reported_without_sleeping() {
    let rig = Rig::new();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    stream.write(&period_bytes(PERIOD)).unwrap();

    rig.backend.push_write_error(PcmError::Underrun);
    let err = stream.write(&period_bytes(PERIOD)).unwrap_err();
    assert!(matches!(err, HalError::Underrun));
    assert!(rig.sleeper.sleeps().is_empty());
    assert!(!stream.is_standby());
}

#[test]
fn write_error_is_masked_with_nominal_sleep() {
    let rig = Rig::new();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    rig.backend
        .push_write_error(PcmError::Io("i2s fifo stalled".into()));
    let buffer = period_bytes(PERIOD);
    assert_eq!(stream.write(&buffer).unwrap(), buffer.len());
    // 880 frames at 44.1kHz.
    assert_eq!(rig.sleeper.sleeps(), [micros(19_954)]);
}

#[test]
fn open_failure_keeps_standby_and_retries() {
    let rig = Rig::new();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    rig.backend.fail_next_opens(1);

    let err = stream.write(&period_bytes(PERIOD)).unwrap_err();
    assert!(matches!(
        err,
        HalError::OutOfMemory {
            endpoint: Endpoint::Main,
            ..
        }
    ));
    assert!(stream.is_standby());
    assert_eq!(rig.sleeper.sleeps(), [micros(19_954)]);

    stream.write(&period_bytes(PERIOD)).unwrap();
    assert!(!stream.is_standby());
}

#[test]
fn latency_follows_power_state() {
    let rig = Rig::new();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    assert_eq!(stream.latency_ms(), 39);
    rig.device.set_parameters("screen_state=off").unwrap();
    assert_eq!(stream.latency_ms(), 159);
}

#[test]
fn standby_closes_the_handle() {
    let rig = Rig::new();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    stream.write(&period_bytes(PERIOD)).unwrap();
    assert_eq!(rig.backend.live_handles(), 1);
    stream.standby();
    assert!(stream.is_standby());
    assert_eq!(rig.backend.live_handles(), 0);
}

#[test]
fn new_output_displaces_previous_one() {
    let rig = Rig::new();
    let first = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    first.write(&period_bytes(PERIOD)).unwrap();

    let second = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    assert!(first.is_standby());
    second.write(&period_bytes(PERIOD)).unwrap();
    assert_eq!(rig.backend.live_handles(), 1);

    // Writing to the old stream takes the hardware back.
    first.write(&period_bytes(PERIOD)).unwrap();
    assert!(second.is_standby());
    assert_eq!(rig.backend.live_handles(), 1);

    rig.device.close_output_stream(first);
    rig.device.close_output_stream(second);
    assert_eq!(rig.backend.live_handles(), 0);
}

#[test]
fn stream_properties() {
    let rig = Rig::new();
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .unwrap();
    assert_eq!(stream.sample_rate(), 44_100);
    assert!(stream.set_sample_rate(44_100).is_ok());
    assert!(stream.set_sample_rate(48_000).is_err());
    assert_eq!(stream.buffer_size(), PERIOD * 4);
    assert_eq!(stream.channels(), 2);
    assert!(stream.set_format(shuttle_hal::SampleFormat::Float).is_err());
    assert_eq!(stream.get_parameters("routing"), "");
    assert!(stream.render_position().is_err());
    assert!(stream.next_write_timestamp().is_err());
}

#[test]
fn stream_handle_drives_playback_lifecycle() {
    let rig = Rig::new();
    let handle = rig
        .device
        .open_stream(Direction::Playback, &mut AudioConfig::default())
        .unwrap();
    assert_eq!(handle.direction(), Direction::Playback);
    assert!(handle.as_capture().is_none());
    assert_eq!(handle.common().buffer_size(), PERIOD * 4);

    let stream = Arc::clone(handle.as_playback().expect("playback handle"));
    stream.write(&period_bytes(PERIOD)).unwrap();
    assert_eq!(rig.backend.live_handles(), 1);

    handle.common().standby();
    assert!(stream.is_standby());
    assert_eq!(rig.backend.live_handles(), 0);

    stream.write(&period_bytes(PERIOD)).unwrap();
    rig.device.close_stream(handle);
    assert!(stream.is_standby());
    assert_eq!(rig.backend.live_handles(), 0);
    assert_eq!(rig.backend.open_count(), 2);
}
