//! Per-cell arithmetic and blend operations
//!
//! Binary operations pair cells by buffer index, so both grids must have the
//! same cell count (their offsets may differ). A mismatch is reported as
//! [`MatrixError::CountMismatch`] before any cell is touched.

use super::{Matrix, MatrixError};

/// Threshold window applied to a mask before mixing
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskRange {
    /// Mask value mapped to 0
    pub min: f32,
    /// Mask value mapped to 1
    pub max: f32,
    pub invert: bool,
    /// Ease the remapped mask with smoothstep
    pub smooth: bool,
}

impl Default for MaskRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0, invert: false, smooth: false }
    }
}

impl MaskRange {
    pub fn apply(&self, mask: f32, opacity: f32) -> f32 {
        let span = self.max - self.min;
        let mut percent = if span != 0.0 {
            ((mask - self.min) / span).clamp(0.0, 1.0)
        } else if mask >= self.min {
            1.0
        } else {
            0.0
        };
        if self.smooth {
            percent = smoothstep(percent);
        }
        percent *= opacity;
        if self.invert { 1.0 - percent } else { percent }
    }
}

#[inline]
pub(crate) fn smoothstep(t: f32) -> f32 {
    3.0 * t * t - 2.0 * t * t * t
}

impl Matrix {
    fn zip_with(&mut self, other: &Matrix, f: impl Fn(f32, f32) -> f32) -> Result<(), MatrixError> {
        self.ensure_same_count(other)?;
        for (a, b) in self.as_mut_slice().iter_mut().zip(other.as_slice()) {
            *a = f(*a, *b);
        }
        Ok(())
    }

    fn zip3_with(&mut self, m: &Matrix, mask: &Matrix, f: impl Fn(f32, f32, f32) -> f32) -> Result<(), MatrixError> {
        self.ensure_same_count(m)?;
        self.ensure_same_count(mask)?;
        for ((a, b), k) in self.as_mut_slice().iter_mut().zip(m.as_slice()).zip(mask.as_slice()) {
            *a = f(*a, *b, *k);
        }
        Ok(())
    }

    fn map_cells(&mut self, f: impl Fn(f32) -> f32) {
        for v in self.as_mut_slice() {
            *v = f(*v);
        }
    }

    pub fn fill(&mut self, value: f32) {
        self.as_mut_slice().fill(value);
    }

    /// Copy all cells from a grid with the same count
    pub fn fill_from(&mut self, m: &Matrix) -> Result<(), MatrixError> {
        self.zip_with(m, |_, b| b)
    }

    pub fn fill_opacity(&mut self, value: f32, opacity: f32) {
        self.map_cells(|a| a * (1.0 - opacity) + value * opacity);
    }

    pub fn mix(&mut self, m: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip_with(m, |a, b| b * opacity + a * (1.0 - opacity))
    }

    /// Lerp towards `m` by `mask * opacity`
    pub fn mix_masked(&mut self, m: &Matrix, mask: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip3_with(m, mask, |a, b, k| {
            let t = k * opacity;
            a * (1.0 - t) + b * t
        })
    }

    /// Lerp towards `m` by the mask remapped through `range`
    pub fn mix_range(&mut self, m: &Matrix, mask: &Matrix, range: MaskRange, opacity: f32) -> Result<(), MatrixError> {
        self.zip3_with(m, mask, |a, b, k| {
            let t = range.apply(k, opacity);
            a * (1.0 - t) + b * t
        })
    }

    /// Mask 1 keeps the original value, mask 0 takes `m`
    pub fn inv_mix(&mut self, m: &Matrix, inv_mask: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip3_with(m, inv_mask, |a, b, k| {
            a * (1.0 - opacity) * k + b * opacity * (1.0 - k)
        })
    }

    pub fn add(&mut self, m: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip_with(m, |a, b| a + b * opacity)
    }

    pub fn add_masked(&mut self, m: &Matrix, mask: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip3_with(m, mask, |a, b, k| a + b * k * opacity)
    }

    pub fn add_scalar(&mut self, value: f32) {
        self.map_cells(|a| a + value);
    }

    /// Weighted average of two masked sources; equal weights where both masks are zero
    pub fn blend_masked(&mut self, m: &Matrix, mask: &Matrix, add: &Matrix, add_mask: &Matrix) -> Result<(), MatrixError> {
        for other in [m, mask, add, add_mask] {
            self.ensure_same_count(other)?;
        }
        let count = self.count();
        let (m, mask, add, add_mask) = (m.as_slice(), mask.as_slice(), add.as_slice(), add_mask.as_slice());
        let dst = self.as_mut_slice();
        for i in 0..count {
            let sum = mask[i] + add_mask[i];
            dst[i] = if sum != 0.0 {
                (m[i] * mask[i] + add[i] * add_mask[i]) / sum
            } else {
                (m[i] + add[i]) / 2.0
            };
        }
        Ok(())
    }

    /// Pick whichever source has the stronger mask
    pub fn max_masked(&mut self, m: &Matrix, mask: &Matrix, add: &Matrix, add_mask: &Matrix) -> Result<(), MatrixError> {
        for other in [m, mask, add, add_mask] {
            self.ensure_same_count(other)?;
        }
        let count = self.count();
        let (m, mask, add, add_mask) = (m.as_slice(), mask.as_slice(), add.as_slice(), add_mask.as_slice());
        let dst = self.as_mut_slice();
        for i in 0..count {
            dst[i] = if mask[i] > add_mask[i] { m[i] } else { add[i] };
        }
        Ok(())
    }

    /// 1 above `mid`, 0 otherwise
    pub fn step(&mut self, mid: f32) {
        self.map_cells(|a| if a > mid { 1.0 } else { 0.0 });
    }

    /// Snap values down to multiples of `step`
    pub fn quantize(&mut self, step: f32) {
        if step <= 0.0 {
            return;
        }
        self.map_cells(|a| (a / step).floor() * step);
    }

    pub fn subtract(&mut self, m: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip_with(m, |a, b| a - b * opacity)
    }

    /// `m * opacity - self`
    pub fn inv_subtract(&mut self, m: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip_with(m, |a, b| b * opacity - a)
    }

    pub fn multiply(&mut self, m: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip_with(m, |a, b| a * (b * opacity + (1.0 - opacity)))
    }

    pub fn multiply_scalar(&mut self, value: f32) {
        self.map_cells(|a| a * value);
    }

    pub fn divide(&mut self, m: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip_with(m, |a, b| a * (opacity / b + (1.0 - opacity)))
    }

    pub fn difference(&mut self, m: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip_with(m, |a, b| (a - b * opacity).abs())
    }

    /// Scale the distance from 0.5, leaving 0.5 untouched
    pub fn contrast(&mut self, factor: f32) {
        self.map_cells(|a| (a - 0.5) * factor + 0.5);
    }

    pub fn overlay(&mut self, m: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip_with(m, |a, b| {
            let b = b * opacity + (0.5 - opacity / 2.0);
            if a > 0.5 { 1.0 - 2.0 * (1.0 - a) * (1.0 - b) } else { 2.0 * a * b }
        })
    }

    /// Overlay keyed on the blend layer instead of the base
    pub fn hard_light(&mut self, m: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip_with(m, |a, b| {
            let v = if b > 0.5 { 1.0 - 2.0 * (1.0 - a) * (1.0 - b) } else { 2.0 * a * b };
            v * opacity + a * (1.0 - opacity)
        })
    }

    pub fn soft_light(&mut self, m: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip_with(m, |a, b| {
            let v = (1.0 - 2.0 * b) * a * a + 2.0 * b * a;
            v * opacity + a * (1.0 - opacity)
        })
    }

    pub fn max(&mut self, m: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip_with(m, |a, b| a.max(b) * opacity + a * (1.0 - opacity))
    }

    pub fn min(&mut self, m: &Matrix, opacity: f32) -> Result<(), MatrixError> {
        self.zip_with(m, |a, b| a.min(b) * opacity + a * (1.0 - opacity))
    }

    /// Negate every cell
    pub fn invert(&mut self) {
        self.map_cells(|a| -a);
    }

    /// `1 - value`
    pub fn invert_one(&mut self) {
        self.map_cells(|a| 1.0 - a);
    }

    /// 1 inside `min_to..max_from`, 0 outside `min_from..=max_to`, linear ramps between
    pub fn select_range(&mut self, min_from: f32, min_to: f32, max_from: f32, max_to: f32) {
        self.map_cells(|src| {
            if src < min_from || src > max_to {
                0.0
            } else if src > min_to && src < max_from {
                1.0
            } else {
                let min_val = (src - min_from) / (min_to - min_from);
                let max_val = 1.0 - (src - max_from) / (max_to - max_from);
                min_val.min(max_val).clamp(0.0, 1.0)
            }
        });
    }

    /// Linear remap, e.g. from -1..1 to 0..1
    pub fn change_range(&mut self, from_min: f32, from_max: f32, to_min: f32, to_max: f32) {
        let from_range = from_max - from_min;
        let to_range = to_max - to_min;
        self.map_cells(|a| (a - from_min) / from_range * to_range + to_min);
    }

    pub fn clamp01(&mut self) {
        self.map_cells(|a| a.clamp(0.0, 1.0));
    }

    pub fn max_value(&self) -> f32 {
        self.as_slice().iter().copied().fold(f32::MIN, f32::max)
    }

    pub fn min_value(&self) -> f32 {
        self.as_slice().iter().copied().fold(f32::MAX, f32::min)
    }

    pub fn average(&self) -> f32 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.as_slice().iter().map(|v| *v as f64).sum::<f64>() as f32 / count as f32
    }

    /// True when no cell exceeds `delta`
    pub fn is_empty(&self, delta: f32) -> bool {
        self.as_slice().iter().all(|v| *v <= delta)
    }

    /// Alias of [`Matrix::step`] kept for mask tooling
    pub fn black_white(&mut self, mid: f32) {
        self.step(mid);
    }

    /// Contrast around 0.5, then a brightness shift in -1..1, clamped to 0..1
    pub fn brightness_contrast(&mut self, brightness: f32, contrast: f32) {
        let shift = brightness / 2.0 * if contrast < 1.0 { 1.0 } else { contrast };
        self.map_cells(|a| ((a - 0.5) * contrast + 0.5 + shift).clamp(0.0, 1.0));
    }

    /// Piecewise remap onto the sorted `terraces` levels
    ///
    /// Values between two levels are eased with smoothstep and sharpened by
    /// `steepness` (0 = linear, 1 = hard steps). Values above 0.9999 are left
    /// as is. Fewer than two levels is a no-op.
    pub fn terrace(&mut self, terraces: &[f32], steepness: f32) {
        if terraces.len() < 2 {
            return;
        }
        let intensity = steepness.max(0.0).sqrt();
        let last = terraces.len() - 2;

        self.map_cells(|val| {
            if val > 0.9999 {
                return val;
            }

            let mut num = 0;
            while num < last && terraces[num + 1] <= val {
                num += 1;
            }

            let (lo, hi) = (terraces[num], terraces[num + 1]);
            let delta = hi - lo;
            let relative = if delta != 0.0 { (val - lo) / delta } else { 0.0 };

            let mut percent = (smoothstep(relative) - 0.5) * 2.0;
            let minus = percent < 0.0;
            percent = percent.abs().powf(1.0 - steepness);
            if minus {
                percent = -percent;
            }
            percent = percent / 2.0 + 0.5;

            let dst = lo * (1.0 - percent) + hi * percent;
            dst * intensity + val * (1.0 - intensity)
        });
    }

    /// Photoshop-style levels with gamma
    pub fn levels(&mut self, in_min: f32, in_max: f32, gamma: f32, out_min: f32, out_max: f32) {
        let in_delta = in_max - in_min;
        let out_delta = out_max - out_min;
        let apply_gamma = !(0.9999..=1.00001).contains(&gamma);

        self.map_cells(|val| {
            if val < in_min {
                return out_min;
            }
            if val > in_max {
                return out_max;
            }

            let mut v = if in_delta != 0.0 { (val - in_min) / in_delta } else { in_min };
            if apply_gamma {
                v = if gamma < 1.0 { v.powf(gamma) } else { v.powf(1.0 / (2.0 - gamma)) };
            }
            if out_delta != 0.0 { out_min + v * out_delta } else { out_min }
        });
    }

    /// Apply a curve sampled at uniform steps over 0..1
    pub fn uniform_curve(&mut self, lut: &[f32]) {
        match lut.len() {
            0 => return,
            1 => return self.fill(lut[0]),
            _ => {}
        }
        let step = 1.0 / (lut.len() - 1) as f32;
        let last = lut.len() - 1;

        self.map_cells(|val| {
            let prev = ((val / step).floor().max(0.0) as usize).min(last);
            let next = (prev + 1).min(last);
            let percent = (val - prev as f32 * step) / step;
            lut[prev] * (1.0 - percent) + lut[next] * percent
        });
    }

    /// Circular stamp blend
    ///
    /// Cells closer than `radius` to the center take the stamp value, cells
    /// beyond `radius + transition` keep `src`, the ring between fades from
    /// stamp to src. Works on the intersection of all three rects.
    pub fn blend_stamped(&mut self, src: &Matrix, stamp: &Matrix, center_x: f32, center_z: f32, radius: f32, transition: f32, smooth: bool) {
        let intersection = self.rect().intersect(&stamp.rect()).intersect(&src.rect());

        for c in intersection.cells() {
            let dx = c.x as f32 - center_x;
            let dz = c.z as f32 - center_z;
            let dist = (dx * dx + dz * dz).sqrt();
            let stamp_val = stamp.get(c.x, c.z);

            let fallof = if dist < radius {
                1.0
            } else if transition == 0.0 {
                0.0
            } else {
                let f = (1.0 - (dist - radius) / transition).clamp(0.0, 1.0);
                if smooth { smoothstep(f) } else { f }
            };

            let v = src.get(c.x, c.z) * (1.0 - fallof) + stamp_val * fallof;
            self.set(c.x, c.z, v);
        }
    }
}
