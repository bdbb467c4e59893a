//! Power-of-two decimation of 16-bit stereo frames.

use crate::config::FRAME_SIZE;

/// Channels of every frame exchanged with the framework.
const CHANNELS: usize = 2;
const SAMPLE_BYTES: usize = FRAME_SIZE / CHANNELS;

/// Capture decimation factors the HAL supports, as a right shift of the
/// native rate.
pub const MAX_SHIFT: u32 = 2;

fn sample(bytes: &[u8], index: usize) -> i32 {
    let offset = index * SAMPLE_BYTES;
    i32::from(i16::from_le_bytes([bytes[offset], bytes[offset + 1]]))
}

/// Box-filters `input` into `output`: every output frame is the sum of
/// `1 << shift` consecutive input frames, per channel, arithmetically shifted
/// right by `shift`.
///
/// Returns the number of output frames produced, bounded by both buffers.
pub fn decimate(input: &[u8], output: &mut [u8], shift: u32) -> usize {
    let ratio = 1usize << shift;
    let frames = (output.len() / FRAME_SIZE).min(input.len() / FRAME_SIZE / ratio);
    for frame in 0..frames {
        let first = frame * ratio * CHANNELS;
        let (mut left, mut right) = (0i32, 0i32);
        for step in 0..ratio {
            left += sample(input, first + step * CHANNELS);
            right += sample(input, first + step * CHANNELS + 1);
        }
        let out = &mut output[frame * FRAME_SIZE..(frame + 1) * FRAME_SIZE];
        out[..SAMPLE_BYTES].copy_from_slice(&((left >> shift) as i16).to_le_bytes());
        out[SAMPLE_BYTES..].copy_from_slice(&((right >> shift) as i16).to_le_bytes());
    }
    frames
}
