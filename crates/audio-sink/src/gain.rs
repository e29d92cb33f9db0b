//! Sample-domain gain stage for 16-bit PCM.
//!
//! Samples are normalized to `f32` in a caller-owned scratch buffer, scaled by
//! `10^(dB / 20)`, and converted back. Conversion back **saturates** at the `i16` range, so
//! extreme gain clips instead of wrapping around.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

const FULL_SCALE: f32 = 32_768.0;

/// Amplitude multiplier for a gain in decibels.
pub fn db_to_multiplier(gain_db: f32) -> f32 {
    10f32.powf(gain_db / 20.0)
}

/// Apply `gain_db` to `samples` in place.
///
/// `scratch` must hold at least `samples.len()` values; only that prefix is used.
pub fn apply_gain(samples: &mut [i16], gain_db: f32, scratch: &mut [f32]) {
    if gain_db == 0.0 || samples.is_empty() {
        return;
    }
    let scratch = &mut scratch[..samples.len()];
    for (dst, s) in scratch.iter_mut().zip(samples.iter()) {
        *dst = *s as f32 / FULL_SCALE;
    }
    scale(scratch, db_to_multiplier(gain_db));
    for (s, v) in samples.iter_mut().zip(scratch.iter()) {
        *s = to_i16(*v);
    }
}

/// Apply `gain_db` to little-endian 16-bit samples stored as bytes.
///
/// A trailing odd byte is left untouched. `scratch` must hold at least `bytes.len() / 2` values.
pub fn apply_gain_le_bytes(bytes: &mut [u8], gain_db: f32, scratch: &mut [f32]) {
    let count = bytes.len() / 2;
    if gain_db == 0.0 || count == 0 {
        return;
    }
    let scratch = &mut scratch[..count];
    for (dst, pair) in scratch.iter_mut().zip(bytes.chunks_exact(2)) {
        *dst = i16::from_le_bytes([pair[0], pair[1]]) as f32 / FULL_SCALE;
    }
    scale(scratch, db_to_multiplier(gain_db));
    for (pair, v) in bytes.chunks_exact_mut(2).zip(scratch.iter()) {
        pair.copy_from_slice(&to_i16(*v).to_le_bytes());
    }
}

fn scale(values: &mut [f32], mult: f32) {
    for v in values.iter_mut() {
        *v *= mult;
    }
}

// `as` truncates toward zero and saturates out-of-range values (NaN maps to 0).
fn to_i16(normalized: f32) -> i16 {
    (normalized * FULL_SCALE) as i16
}

/// Gain processor owning a scratch buffer sized once for the largest chunk.
pub struct GainStage {
    scratch: Vec<f32>,
}

impl GainStage {
    pub fn new(max_samples: usize) -> Self {
        Self {
            scratch: vec![0.0; max_samples],
        }
    }

    /// Apply gain to a chunk of little-endian sample bytes.
    ///
    /// Chunks larger than the scratch buffer are processed in scratch-sized pieces.
    pub fn process(&mut self, bytes: &mut [u8], gain_db: f32) {
        let step = self.scratch.len() * 2;
        if step == 0 {
            return;
        }
        for piece in bytes.chunks_mut(step) {
            apply_gain_le_bytes(piece, gain_db, &mut self.scratch);
        }
    }
}

/// Externally owned gain setting, in dB.
///
/// Cloning shares the same value. Writes are relaxed: the drain task may use a value that is
/// one chunk old.
#[derive(Clone, Debug)]
pub struct GainSetting {
    bits: Arc<AtomicU32>,
}

impl Default for GainSetting {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl GainSetting {
    pub fn new(gain_db: f32) -> Self {
        let db = if gain_db.is_finite() { gain_db } else { 0.0 };
        Self {
            bits: Arc::new(AtomicU32::new(db.to_bits())),
        }
    }

    pub fn db(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Update the gain. Non-finite values are ignored.
    pub fn set_db(&self, gain_db: f32) {
        if !gain_db.is_finite() {
            tracing::warn!(gain_db, "ignoring non-finite gain");
            return;
        }
        self.bits.store(gain_db.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_uses_amplitude_decibels() {
        assert_eq!(db_to_multiplier(0.0), 1.0);
        assert!((db_to_multiplier(6.0) - 1.9953).abs() < 1e-3);
        assert!((db_to_multiplier(-20.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn zero_db_is_identity() {
        let mut samples = [0i16, 1, -1, 1000, -32768, 32767];
        let orig = samples;
        let mut scratch = [0f32; 6];
        apply_gain(&mut samples, 0.0, &mut scratch);
        assert_eq!(samples, orig);
    }

    #[test]
    fn tiny_gain_round_trips_within_one_lsb() {
        let mut samples = [0i16, 1, -1, 1000, -12345, 32767];
        let orig = samples;
        let mut scratch = [0f32; 6];
        apply_gain(&mut samples, 1e-6, &mut scratch);
        for (a, b) in samples.iter().zip(orig.iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 1, "{a} vs {b}");
        }
    }

    #[test]
    fn plus_six_db_roughly_doubles() {
        let mut samples = [1000i16];
        let mut scratch = [0f32; 1];
        apply_gain(&mut samples, 6.0, &mut scratch);
        assert!((samples[0] as i32 - 1995).abs() <= 1, "got {}", samples[0]);
    }

    #[test]
    fn extreme_gain_saturates() {
        let mut samples = [20_000i16, -20_000];
        let mut scratch = [0f32; 2];
        apply_gain(&mut samples, 12.0, &mut scratch);
        assert_eq!(samples, [i16::MAX, i16::MIN]);
    }

    #[test]
    fn le_bytes_match_sample_path() {
        let values = [1000i16, -2000, 300];
        let mut bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        bytes.push(0xAB);
        let mut scratch = [0f32; 3];
        apply_gain_le_bytes(&mut bytes, -6.0, &mut scratch);

        let mut expected = values;
        let mut scratch2 = [0f32; 3];
        apply_gain(&mut expected, -6.0, &mut scratch2);
        for (i, v) in expected.iter().enumerate() {
            assert_eq!(i16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]), *v);
        }
        assert_eq!(bytes[6], 0xAB);
    }

    #[test]
    fn stage_handles_chunks_larger_than_scratch() {
        let mut stage = GainStage::new(2);
        let mut bytes: Vec<u8> = [100i16, 200, 300, 400, 500]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        stage.process(&mut bytes, 20.0);
        let out: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        for (o, i) in out.iter().zip([100i16, 200, 300, 400, 500]) {
            assert!((*o as i32 - i as i32 * 10).abs() <= 1, "{o} vs {i}");
        }
    }

    #[test]
    fn setting_is_shared_and_ignores_nan() {
        let gain = GainSetting::new(-3.0);
        let other = gain.clone();
        other.set_db(4.5);
        assert_eq!(gain.db(), 4.5);
        gain.set_db(f32::NAN);
        assert_eq!(other.db(), 4.5);
        assert_eq!(GainSetting::new(f32::INFINITY).db(), 0.0);
    }
}
