//! Layer stack composition (splat weights)

use super::{Matrix, MatrixError};

fn ensure_same_counts(matrices: &[Matrix]) -> Result<usize, MatrixError> {
    let Some(first) = matrices.first() else {
        return Ok(0);
    };
    for m in &matrices[1..] {
        first.ensure_same_count(m)?;
    }
    Ok(first.count())
}

/// Composite layers so their per-cell sum never exceeds 1
///
/// Layer 0 is the background, the last layer is on top. Walking from the
/// top, each layer keeps its value scaled by whatever budget the layers
/// above it left over. `opacity`, if given, scales each layer first.
pub fn blend_layers(matrices: &mut [Matrix], opacity: Option<&[f32]>) -> Result<(), MatrixError> {
    let count = ensure_same_counts(matrices)?;

    for pos in 0..count {
        let mut left = 1.0f32;
        for (i, m) in matrices.iter_mut().enumerate().rev() {
            let mut val = m.as_slice()[pos];
            if let Some(op) = opacity.and_then(|o| o.get(i)) {
                val *= op;
            }
            val *= left;
            m.as_mut_slice()[pos] = val;
            left -= val;
            if left < 0.0 {
                break;
            }
        }
    }
    Ok(())
}

/// Rescale layers so every cell sums to exactly 1
///
/// With `allow_below_one` cells whose sum is already at most 1 are left as
/// they are. Cells where every layer is zero stay zero.
pub fn normalize_layers(matrices: &mut [Matrix], allow_below_one: bool) -> Result<(), MatrixError> {
    let count = ensure_same_counts(matrices)?;

    for pos in 0..count {
        let sum: f32 = matrices.iter().map(|m| m.as_slice()[pos]).sum();
        if sum == 0.0 {
            continue;
        }
        if sum > 1.0 || !allow_below_one {
            for m in matrices.iter_mut() {
                m.as_mut_slice()[pos] /= sum;
            }
        }
    }
    Ok(())
}

/// Multiply each layer by its mask, then scale cells whose sum exceeds 1 back to 1
pub fn normalize_layers_masked(matrices: &mut [Matrix], masks: &[Matrix]) -> Result<(), MatrixError> {
    let count = ensure_same_counts(matrices)?;
    if masks.len() != matrices.len() {
        return Err(MatrixError::CountMismatch { left: matrices.len(), right: masks.len() });
    }
    for (m, mask) in matrices.iter().zip(masks) {
        m.ensure_same_count(mask)?;
    }

    for pos in 0..count {
        for (m, mask) in matrices.iter_mut().zip(masks) {
            m.as_mut_slice()[pos] *= mask.as_slice()[pos];
        }
        let sum: f32 = matrices.iter().map(|m| m.as_slice()[pos]).sum();
        if sum > 1.0 {
            for m in matrices.iter_mut() {
                m.as_mut_slice()[pos] /= sum;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::CoordRect;

    fn row(values: &[f32]) -> Matrix {
        Matrix::from_vec(CoordRect::from_xz(0, 0, values.len() as i32, 1), values.to_vec()).unwrap()
    }

    fn sums(matrices: &[Matrix]) -> Vec<f32> {
        (0..matrices[0].count())
            .map(|pos| matrices.iter().map(|m| m.as_slice()[pos]).sum())
            .collect()
    }

    #[test]
    fn test_normalize_sums_to_one() {
        let mut layers = vec![
            row(&[0.2, 3.0, 0.1, 0.0]),
            row(&[0.2, 1.0, 0.0, 0.0]),
            row(&[0.1, 0.0, 0.0, 0.5]),
        ];
        normalize_layers(&mut layers, false).unwrap();
        for s in sums(&layers) {
            assert!((s - 1.0).abs() < 1e-6);
        }
        assert!((layers[0].as_slice()[1] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_single_layer() {
        let mut layers = vec![row(&[0.3, 2.0])];
        normalize_layers(&mut layers, false).unwrap();
        assert_eq!(layers[0].as_slice(), &[1.0, 1.0]);
    }

    #[test]
    fn test_normalize_all_zero_stays_zero() {
        let mut layers = vec![row(&[0.0, 0.0]), row(&[0.0, 0.0])];
        normalize_layers(&mut layers, false).unwrap();
        for m in &layers {
            assert!(m.as_slice().iter().all(|v| *v == 0.0 && !v.is_nan()));
        }
    }

    #[test]
    fn test_normalize_allow_below_one() {
        let mut layers = vec![row(&[0.2, 0.8]), row(&[0.2, 0.8])];
        normalize_layers(&mut layers, true).unwrap();
        assert_eq!(layers[0].as_slice()[0], 0.2);
        assert!((layers[0].as_slice()[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_blend_layers_top_consumes_budget() {
        let mut layers = vec![row(&[1.0]), row(&[0.5]), row(&[0.5])];
        blend_layers(&mut layers, None).unwrap();
        // top keeps 0.5, middle gets half of the remaining 0.5, background the rest
        assert_eq!(layers[2].as_slice(), &[0.5]);
        assert_eq!(layers[1].as_slice(), &[0.25]);
        assert_eq!(layers[0].as_slice(), &[0.25]);
        assert!(sums(&layers)[0] <= 1.0);
    }

    #[test]
    fn test_blend_layers_opacity() {
        let mut layers = vec![row(&[1.0]), row(&[1.0])];
        blend_layers(&mut layers, Some(&[1.0, 0.25])).unwrap();
        assert_eq!(layers[1].as_slice(), &[0.25]);
        assert_eq!(layers[0].as_slice(), &[0.75]);
    }

    #[test]
    fn test_normalize_masked() {
        let mut layers = vec![row(&[1.0, 0.4]), row(&[1.0, 0.4])];
        let masks = vec![row(&[1.0, 1.0]), row(&[1.0, 0.5])];
        normalize_layers_masked(&mut layers, &masks).unwrap();
        assert_eq!(layers[0].as_slice()[0], 0.5);
        assert!((layers[1].as_slice()[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_layers_rejected() {
        let mut layers = vec![row(&[1.0, 0.0]), row(&[1.0])];
        assert!(normalize_layers(&mut layers, false).is_err());
    }
}
