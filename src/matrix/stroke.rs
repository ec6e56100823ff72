//! Line rasterization

use super::Matrix;
use crate::core::types::Vec2;

/// Options for [`Matrix::line`]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LineStyle {
    /// Blend the two neighbors across the line by the sub-pixel position
    pub antialiased: bool,
    /// Write the full value into both neighbors across the line
    pub padded_one_pixel: bool,
    /// Also write the end point
    pub end_inclusive: bool,
}

impl Matrix {
    /// Stroke from `start` to `end` (absolute cell space), interpolating the
    /// written value from `val_start` to `val_end`
    ///
    /// Steps one cell along the major axis at a time. Cells outside the grid
    /// are skipped.
    pub fn line(&mut self, start: Vec2, end: Vec2, val_start: f32, val_end: f32, style: LineStyle) {
        let num_steps = (end.x.floor() as i32 - start.x.floor() as i32).abs()
            .max((end.y.floor() as i32 - start.y.floor() as i32).abs());
        if num_steps == 0 && !style.end_inclusive {
            return;
        }
        let divisor = num_steps.max(1) as f32;
        let step = (end - start) / divisor;
        let vertical = step.y.abs() > step.x.abs();

        let rect = self.rect();
        let width = rect.size.x;
        let steps = num_steps + i32::from(style.end_inclusive);

        for s in 0..steps {
            let fx = start.x + step.x * s as f32 - rect.offset.x as f32;
            let fz = start.y + step.y * s as f32 - rect.offset.z as f32;
            if fx < 0.0 || fz < 0.0 {
                continue;
            }
            let ix = fx as i32;
            let iz = fz as i32;
            if ix > rect.size.x - 1 || iz > rect.size.z - 1 {
                continue;
            }

            let pos = (iz * width + ix) as usize;
            let t = s as f32 / divisor;
            let val = val_start * (1.0 - t) + val_end * t;
            let arr = self.as_mut_slice();
            arr[pos] = val;

            // neighbors across the line direction
            let (across, p, lo_ok, hi_ok) = if vertical {
                (1usize, fx - ix as f32, ix >= 1, ix <= rect.size.x - 2)
            } else {
                (width as usize, fz - iz as f32, iz >= 1, iz <= rect.size.z - 2)
            };
            if !(lo_ok && hi_ok) {
                continue;
            }

            if style.antialiased {
                arr[pos - across] = arr[pos - across] * p + val * (1.0 - p);
                arr[pos + across] = arr[pos + across] * (1.0 - p) + val * p;
            }
            if style.padded_one_pixel {
                arr[pos - across] = val;
                arr[pos + across] = val;
            }
        }
    }
}
