//! Value histograms

use super::Matrix;

impl Matrix {
    /// Count cells per value bucket over `0..=max`
    ///
    /// Cells outside the range are skipped. With `normalize` the fullest
    /// bucket becomes 1; an all-empty histogram stays zero.
    pub fn histogram(&self, resolution: usize, max: f32, normalize: bool) -> Vec<f32> {
        let mut quants = vec![0.0f32; resolution];
        if resolution == 0 || max <= 0.0 {
            return quants;
        }

        for &val in self.as_slice() {
            if !(0.0..=max).contains(&val) {
                continue;
            }
            let num = ((val / max * resolution as f32) as usize).min(resolution - 1);
            quants[num] += 1.0;
        }

        if normalize {
            let top = quants.iter().copied().fold(0.0, f32::max);
            if top > 0.0 {
                quants.iter_mut().for_each(|q| *q /= top);
            }
        }
        quants
    }

    /// Histogram quantized to bytes
    pub fn histogram_bytes(&self, resolution: usize, max: f32, normalize: bool) -> Vec<u8> {
        self.histogram(resolution, max, normalize)
            .into_iter()
            .map(|q| (q.clamp(0.0, 1.0) * 255.0) as u8)
            .collect()
    }
}

/// Rasterize a normalized histogram into an R8 image of `quants.len()` x `height`
///
/// Each column is `filled` below its bar, `top` on the bar itself and
/// `empty` above it.
pub fn histogram_to_texture_bytes(quants: &[f32], height: usize, empty: u8, top: u8, filled: u8) -> Vec<u8> {
    let width = quants.len();
    let mut bytes = vec![empty; width * height];
    if height == 0 {
        return bytes;
    }

    for (x, q) in quants.iter().enumerate() {
        let bar = ((q.max(0.0) * height as f32) as usize).min(height - 1);
        for z in 0..=bar {
            bytes[z * width + x] = if z == bar { top } else { filled };
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::CoordRect;

    #[test]
    fn test_histogram_buckets() {
        let m = Matrix::from_vec(CoordRect::from_xz(0, 0, 5, 1), vec![0.0, 0.1, 0.6, 1.0, 2.0]).unwrap();
        let h = m.histogram(2, 1.0, false);
        assert_eq!(h, vec![2.0, 2.0]);
    }

    #[test]
    fn test_histogram_normalized() {
        let m = Matrix::from_vec(CoordRect::from_xz(0, 0, 3, 1), vec![0.1, 0.2, 0.9]).unwrap();
        assert_eq!(m.histogram(2, 1.0, true), vec![1.0, 0.5]);
        assert_eq!(m.histogram_bytes(2, 1.0, true), vec![255, 127]);
    }

    #[test]
    fn test_histogram_empty_normalizes_to_zero() {
        let m = Matrix::filled(CoordRect::from_xz(0, 0, 2, 2), -1.0);
        assert_eq!(m.histogram(4, 1.0, true), vec![0.0; 4]);
    }

    #[test]
    fn test_texture_bytes() {
        let bytes = histogram_to_texture_bytes(&[1.0, 0.5], 4, 0, 255, 128);
        // column 0 bar at top row, column 1 bar at row 2
        let col = |x: usize| (0..4).map(|z| bytes[z * 2 + x]).collect::<Vec<_>>();
        assert_eq!(col(0), vec![128, 128, 128, 255]);
        assert_eq!(col(1), vec![128, 128, 255, 0]);
    }
}
