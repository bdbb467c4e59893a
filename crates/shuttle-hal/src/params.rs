//! `key=value;key=value` parameter strings exchanged with the framework.

use tracing::warn;

use crate::router::DeviceMask;

pub const KEY_ROUTING: &str = "routing";
pub const KEY_SCREEN_STATE: &str = "screen_state";
pub const VALUE_ON: &str = "on";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    pairs: Vec<(String, String)>,
}

impl Parameters {
    /// Splits on `;`, then on the first `=`. Empty segments are skipped and a
    /// key without `=` gets an empty value. Later duplicates win.
    pub fn parse(kvpairs: &str) -> Self {
        let pairs = kvpairs
            .split(';')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.split_once('=') {
                Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
                None => (segment.to_string(), String::new()),
            })
            .collect();
        Self { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// The `routing` value as a device mask. Unparsable values log a warning
    /// and are treated as an empty mask, which callers ignore.
    pub fn routing(&self) -> Option<DeviceMask> {
        let value = self.get(KEY_ROUTING)?;
        match value.parse::<u32>() {
            Ok(bits) => Some(DeviceMask(bits)),
            Err(err) => {
                warn!(value, %err, "ignoring malformed routing parameter");
                Some(DeviceMask::NONE)
            }
        }
    }

    /// `Some(true)` when the screen is reported off. Any value but `on` counts
    /// as off.
    pub fn screen_off(&self) -> Option<bool> {
        self.get(KEY_SCREEN_STATE).map(|value| value != VALUE_ON)
    }
}
