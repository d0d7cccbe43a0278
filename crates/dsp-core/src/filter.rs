//! Telephony low-pass FIR applied before any downsample crossing the
//! 4 kHz Nyquist of an 8 kHz telephony stream.

/// 7-tap symmetric FIR, fixed coefficients per the telephony low-pass.
const TAPS: [f32; 7] = [0.02, 0.12, 0.22, 0.28, 0.22, 0.12, 0.02];

/// Apply the fixed 7-tap low-pass FIR. Edge samples use the same
/// convolution with the source index clamped into range -- no mirroring,
/// no zero-padding beyond the clamp.
pub fn lowpass_telephony(input: &[f32]) -> Vec<f32> {
    if input.is_empty() {
        return Vec::new();
    }
    let last = input.len() as isize - 1;
    let half = (TAPS.len() / 2) as isize;

    (0..input.len() as isize)
        .map(|i| {
            let mut acc = 0.0f32;
            for (k, &tap) in TAPS.iter().enumerate() {
                let offset = k as isize - half;
                let idx = (i + offset).clamp(0, last);
                acc += tap * input[idx as usize];
            }
            acc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_length() {
        let input = vec![0.0f32; 100];
        assert_eq!(lowpass_telephony(&input).len(), 100);
    }

    #[test]
    fn dc_signal_passes_through_unattenuated() {
        let input = vec![0.5f32; 50];
        let out = lowpass_telephony(&input);
        for &s in &out {
            assert!((s - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(lowpass_telephony(&[]).is_empty());
    }

    #[test]
    fn single_sample_does_not_panic() {
        let out = lowpass_telephony(&[0.3]);
        assert_eq!(out.len(), 1);
    }
}
