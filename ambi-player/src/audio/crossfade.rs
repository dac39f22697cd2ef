//! Sample-level crossfade between two PCM byte ranges
//!
//! Used to smooth the seam between consecutive playable units: the retained
//! tail of the previous unit is blended against the head of the next one.
//!
//! Both inputs are interleaved 16-bit signed little-endian samples. Channels
//! are not distinguished; every sample index gets the same gain pair.

use ambi_common::FadeCurve;

/// Equal-power blend of `tail` (fading out) into `head` (fading in)
///
/// For sample index `i` of `N`, `t = i / N` and the output sample is
/// `round(tail[i] × √(1 − t) + head[i] × √t)` clamped to the i16 range.
///
/// The output is exactly `min(tail.len(), head.len())` bytes. When that length
/// is odd, the dangling byte is copied from `head`.
pub fn blend(tail: &[u8], head: &[u8]) -> Vec<u8> {
    let len = tail.len().min(head.len());
    let sample_count = len / 2;
    let mut out = Vec::with_capacity(len);

    let curve = FadeCurve::EqualPower;
    for i in 0..sample_count {
        let t = i as f32 / sample_count as f32;
        let (out_gain, in_gain) = curve.gains(t);

        let a = i16::from_le_bytes([tail[2 * i], tail[2 * i + 1]]) as f32;
        let b = i16::from_le_bytes([head[2 * i], head[2 * i + 1]]) as f32;
        let mixed = (a * out_gain + b * in_gain).round();
        let sample = mixed.clamp(i16::MIN as f32, i16::MAX as f32) as i16;

        out.extend_from_slice(&sample.to_le_bytes());
    }

    if len % 2 == 1 {
        out.push(head[len - 1]);
    }

    out
}
