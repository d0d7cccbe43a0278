//! Linear resampling between telephony sample rates.

/// Linearly resample `src` from `src_rate` Hz to `dst_rate` Hz.
///
/// Output length is `floor(src.len() * dst_rate / src_rate)`. When the
/// rates match the input is returned unchanged (no allocation-preserving
/// shortcut is promised, only value equality). Boundary indices are
/// clamped to the last input sample rather than mirrored or zero-padded.
pub fn resample_linear(src: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src.is_empty() || src_rate == dst_rate {
        return src.to_vec();
    }

    let out_len = (src.len() as u64 * dst_rate as u64 / src_rate as u64) as usize;
    let mut out = Vec::with_capacity(out_len);
    let ratio = src_rate as f64 / dst_rate as f64;
    let last = src.len() - 1;

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx0 = pos.floor() as usize;
        let idx0 = idx0.min(last);
        let idx1 = (idx0 + 1).min(last);
        let frac = (pos - idx0 as f64) as f32;
        out.push(src[idx0] + (src[idx1] - src[idx0]) * frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_rates_returns_input_unchanged() {
        let src = vec![0.1, -0.2, 0.3];
        assert_eq!(resample_linear(&src, 8000, 8000), src);
    }

    #[test]
    fn upsample_doubles_length() {
        let src = vec![0.0; 160];
        let out = resample_linear(&src, 8000, 16000);
        assert_eq!(out.len(), 320);
    }

    #[test]
    fn round_trip_preserves_length_within_one_sample() {
        let src: Vec<f32> = (0..1600).map(|i| (i as f32 * 0.01).sin()).collect();
        let up = resample_linear(&src, 8000, 16000);
        let down = resample_linear(&up, 16000, 8000);
        assert!((down.len() as i64 - src.len() as i64).abs() <= 1);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(resample_linear(&[], 8000, 16000).is_empty());
    }
}
