//! Device selection: maps the framework's device mask onto mixer route tables
//! and PCM endpoints.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::mixer::routes::RouteTables;
use crate::mixer::MixerGateway;
use crate::pcm::{Direction, Endpoint};

/// Set of audio devices, using the platform framework's bit assignment. Output
/// devices occupy the low 16 bits, input devices the high 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceMask(pub u32);

impl DeviceMask {
    pub const NONE: DeviceMask = DeviceMask(0);

    pub const OUT_EARPIECE: DeviceMask = DeviceMask(0x1);
    pub const OUT_SPEAKER: DeviceMask = DeviceMask(0x2);
    pub const OUT_WIRED_HEADSET: DeviceMask = DeviceMask(0x4);
    pub const OUT_WIRED_HEADPHONE: DeviceMask = DeviceMask(0x8);
    pub const OUT_BLUETOOTH_SCO: DeviceMask = DeviceMask(0x10);
    pub const OUT_BLUETOOTH_SCO_HEADSET: DeviceMask = DeviceMask(0x20);
    pub const OUT_BLUETOOTH_SCO_CARKIT: DeviceMask = DeviceMask(0x40);
    pub const OUT_AUX_DIGITAL: DeviceMask = DeviceMask(0x400);
    pub const OUT_DEFAULT: DeviceMask = DeviceMask(0x8000);
    pub const OUT_ALL: DeviceMask = DeviceMask(0x0000_ffff);
    pub const OUT_ALL_SCO: DeviceMask = DeviceMask(0x70);

    pub const IN_COMMUNICATION: DeviceMask = DeviceMask(0x1_0000);
    pub const IN_AMBIENT: DeviceMask = DeviceMask(0x2_0000);
    pub const IN_BUILTIN_MIC: DeviceMask = DeviceMask(0x4_0000);
    pub const IN_BLUETOOTH_SCO_HEADSET: DeviceMask = DeviceMask(0x8_0000);
    pub const IN_WIRED_HEADSET: DeviceMask = DeviceMask(0x10_0000);
    pub const IN_AUX_DIGITAL: DeviceMask = DeviceMask(0x20_0000);
    pub const IN_DEFAULT: DeviceMask = DeviceMask(0x8000_0000);
    pub const IN_ALL: DeviceMask = DeviceMask(0xffff_0000);
    pub const IN_ALL_SCO: DeviceMask = DeviceMask::IN_BLUETOOTH_SCO_HEADSET;

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if any bit of `other` is set.
    pub const fn intersects(self, other: DeviceMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Bits belonging to `direction`.
    pub fn direction_bits(self, direction: Direction) -> DeviceMask {
        self & Self::all(direction)
    }

    /// Replaces the bits of one direction, leaving the other untouched.
    pub fn with_direction_bits(self, direction: Direction, bits: DeviceMask) -> DeviceMask {
        let all = Self::all(direction);
        (self & !all) | (bits & all)
    }

    pub fn all(direction: Direction) -> DeviceMask {
        match direction {
            Direction::Playback => Self::OUT_ALL,
            Direction::Capture => Self::IN_ALL,
        }
    }

    pub fn sco(direction: Direction) -> DeviceMask {
        match direction {
            Direction::Playback => Self::OUT_ALL_SCO,
            Direction::Capture => Self::IN_ALL_SCO,
        }
    }

    pub fn digital(direction: Direction) -> DeviceMask {
        match direction {
            Direction::Playback => Self::OUT_AUX_DIGITAL,
            Direction::Capture => Self::IN_AUX_DIGITAL,
        }
    }
}

impl BitOr for DeviceMask {
    type Output = DeviceMask;

    fn bitor(self, rhs: DeviceMask) -> DeviceMask {
        DeviceMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for DeviceMask {
    fn bitor_assign(&mut self, rhs: DeviceMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for DeviceMask {
    type Output = DeviceMask;

    fn bitand(self, rhs: DeviceMask) -> DeviceMask {
        DeviceMask(self.0 & rhs.0)
    }
}

impl Not for DeviceMask {
    type Output = DeviceMask;

    fn not(self) -> DeviceMask {
        DeviceMask(!self.0)
    }
}

impl fmt::Display for DeviceMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// PCM endpoint serving `direction` for the given device set. SCO wins over
/// the digital output, which wins over the codec.
pub fn endpoint_for(devices: DeviceMask, direction: Direction) -> Endpoint {
    if devices.intersects(DeviceMask::sco(direction)) {
        Endpoint::Sco
    } else if devices.intersects(DeviceMask::digital(direction)) {
        Endpoint::Digital
    } else {
        Endpoint::Main
    }
}

/// Whether moving from `current` to `requested` changes the PCM endpoint of
/// `direction`, which requires the stream to be put into standby first.
pub fn needs_reopen(current: DeviceMask, requested: DeviceMask, direction: Direction) -> bool {
    let sco = DeviceMask::sco(direction);
    let digital = DeviceMask::digital(direction);
    (current & sco) != (requested & sco) || (current & digital) != (requested & digital)
}

fn flag(devices: DeviceMask, bit: DeviceMask) -> char {
    if devices.intersects(bit) {
        'Y'
    } else {
        'N'
    }
}

/// Switches the codec outputs between speaker and headphone according to
/// `devices`. Capture, SCO and digital state are left alone.
pub fn select_devices(
    mixer: &mut MixerGateway,
    routes: &RouteTables,
    devices: DeviceMask,
) -> Result<()> {
    let speaker = devices.intersects(DeviceMask::OUT_SPEAKER);
    let headphone = devices.intersects(DeviceMask::OUT_WIRED_HEADPHONE);
    let set = match (headphone, speaker) {
        (false, false) => &routes.none,
        (false, true) => &routes.speaker,
        (true, false) => &routes.headphone,
        (true, true) => &routes.speaker_headphone,
    };
    let result = mixer.apply_control_set(set, true);

    debug!(
        "Headphone out:{}, Speaker out:{}, HDMI out:{}, BT out:{}",
        flag(devices, DeviceMask::OUT_WIRED_HEADPHONE),
        flag(devices, DeviceMask::OUT_SPEAKER),
        flag(devices, DeviceMask::OUT_AUX_DIGITAL),
        flag(devices, DeviceMask::OUT_ALL_SCO),
    );
    result
}
