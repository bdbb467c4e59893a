mod common;

use std::time::Duration;

use common::{period_bytes, Rig};
use proptest::prelude::*;
use shuttle_hal::config::{MAX_WRITE_SLEEP_US, OUT_PERIOD_SIZE};
use shuttle_hal::{AudioConfig, PlaybackStream, StreamOut};

const PERIOD: u32 = OUT_PERIOD_SIZE;
const STRIDE: i64 = (OUT_PERIOD_SIZE / 4) as i64;

#[derive(Clone, Debug)]
enum Operation {
    Write { levels: Vec<Option<u32>> },
    Screen { off: bool },
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    let level = prop_oneof![
        8 => (0..=PERIOD * 8).prop_map(Some),
        1 => Just(None),
    ];
    prop_oneof![
        4 => prop::collection::vec(level, 0..6).prop_map(|levels| Operation::Write { levels }),
        1 => any::<bool>().prop_map(|off| Operation::Screen { off }),
    ]
}

fn open(rig: &Rig) -> std::sync::Arc<PlaybackStream> {
    let stream = rig
        .device
        .open_output_stream(&mut AudioConfig::default())
        .expect("open output");
    stream.write(&period_bytes(PERIOD as usize)).expect("first write");
    rig.sleeper.take();
    stream
}

proptest! {
    #[test]
    fn sleep_cap_holds_and_thresholds_never_overshoot(
        ops in prop::collection::vec(operation_strategy(), 1..48)
    ) {
        let rig = Rig::new();
        let stream = open(&rig);

        for op in ops {
            match op {
                Operation::Screen { off } => {
                    let value = if off { "off" } else { "on" };
                    rig.device
                        .set_parameters(&format!("screen_state={value}"))
                        .unwrap();
                }
                Operation::Write { levels } => {
                    rig.backend.push_queue_levels(levels);
                    let (_, before) = stream.write_thresholds();
                    stream.write(&period_bytes(PERIOD as usize)).unwrap();
                    let (target, after) = stream.write_thresholds();

                    let slept: Duration = rig.sleeper.take().iter().sum();
                    prop_assert!(slept <= Duration::from_micros(MAX_WRITE_SLEEP_US));

                    if before > target {
                        prop_assert!(after >= target && after <= before);
                        prop_assert!(before - after <= STRIDE);
                    } else if before < target {
                        prop_assert!(after <= target && after >= before);
                        prop_assert!(after - before <= STRIDE);
                    } else {
                        prop_assert!(after <= target);
                    }
                }
            }
        }
    }

    #[test]
    fn threshold_converges_to_target(screen_off in any::<bool>(), start_off in any::<bool>()) {
        let rig = Rig::new();
        let value = |off: bool| if off { "screen_state=off" } else { "screen_state=on" };
        rig.device.set_parameters(value(start_off)).unwrap();
        let stream = open(&rig);
        rig.device.set_parameters(value(screen_off)).unwrap();

        let target = i64::from(PERIOD) * if screen_off { 8 } else { 2 };
        for _ in 0..30 {
            // Hold the queue exactly at the threshold so nothing sleeps.
            let (_, current) = stream.write_thresholds();
            rig.backend.push_queue_levels([Some(current as u32)]);
            stream.write(&period_bytes(PERIOD as usize)).unwrap();
        }
        prop_assert_eq!(stream.write_thresholds(), (target, target));
        prop_assert!(rig.sleeper.sleeps().is_empty());
    }
}
