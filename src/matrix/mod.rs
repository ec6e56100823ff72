//! Dense 2D float grid with rectangular addressing
//!
//! A [`Matrix`] covers a [`CoordRect`] of cells stored row by row (z major).
//! All addressing is in absolute cell coordinates: `matrix[(x, z)]` reads the
//! cell at `(x - offset.x, z - offset.z)` of the backing buffer. Operations
//! that combine grids with different rects work on their intersection only.
//!
//! The value range is nominally 0..=1 (heights, masks, splat weights), but
//! nothing enforces it outside of encoders that quantize.

pub mod raw;
pub mod arithmetic;
pub mod layers;
pub mod histogram;
pub mod stroke;

use crate::core::types::Vec2;
use crate::math::{Coord, CoordRect, TileMode};
use rayon::prelude::*;
use std::ops::{Index, IndexMut};
use thiserror::Error;

pub use raw::{ByteOrder, RawFormat};
pub use arithmetic::MaskRange;
pub use layers::{blend_layers, normalize_layers, normalize_layers_masked};
pub use histogram::histogram_to_texture_bytes;
pub use stroke::LineStyle;

/// Geometry and encoding failures of grid operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    #[error("size mismatch: buffer holds {actual} bytes, dimensions require {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("array too small: {len} values for {required} cells")]
    ArrayTooSmall { len: usize, required: usize },

    #[error("cell count mismatch: {left} vs {right}")]
    CountMismatch { left: usize, right: usize },

    #[error("unsupported raw format: {0}")]
    UnsupportedFormat(String),

    #[error("channel {channel} out of range for {channels} channels")]
    InvalidChannel { channel: usize, channels: usize },
}

/// Rectangular grid of floats
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rect: CoordRect,
    arr: Vec<f32>,
}

impl Matrix {
    /// Create a zero-filled grid covering `rect`
    pub fn new(rect: CoordRect) -> Self {
        Self { rect, arr: vec![0.0; rect.count()] }
    }

    /// Create a grid filled with a constant
    pub fn filled(rect: CoordRect, value: f32) -> Self {
        Self { rect, arr: vec![value; rect.count()] }
    }

    /// Wrap an existing buffer
    ///
    /// Fails when the buffer holds fewer values than the rect has cells.
    /// Extra values are kept but never addressed.
    pub fn from_vec(rect: CoordRect, arr: Vec<f32>) -> Result<Self, MatrixError> {
        if arr.len() < rect.count() {
            return Err(MatrixError::ArrayTooSmall { len: arr.len(), required: rect.count() });
        }
        Ok(Self { rect, arr })
    }

    pub fn rect(&self) -> CoordRect {
        self.rect
    }

    pub fn count(&self) -> usize {
        self.rect.count()
    }

    /// Cells in row-major order
    pub fn as_slice(&self) -> &[f32] {
        &self.arr[..self.rect.count()]
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        let count = self.rect.count();
        &mut self.arr[..count]
    }

    pub fn into_vec(mut self) -> Vec<f32> {
        self.arr.truncate(self.rect.count());
        self.arr
    }

    /// Move the grid without touching its values
    pub fn set_offset(&mut self, offset: Coord) {
        self.rect.offset = offset;
    }

    /// Change the rect, reallocating only when the cell count grows.
    /// Values are not preserved.
    pub fn resize(&mut self, rect: CoordRect) {
        self.rect = rect;
        if self.arr.len() < rect.count() {
            self.arr.resize(rect.count(), 0.0);
        }
    }

    /// Buffer index of an absolute cell position
    #[inline]
    pub fn pos(&self, x: i32, z: i32) -> usize {
        ((z - self.rect.offset.z) * self.rect.size.x + x - self.rect.offset.x) as usize
    }

    #[inline]
    pub fn get(&self, x: i32, z: i32) -> f32 {
        self.arr[self.pos(x, z)]
    }

    #[inline]
    pub fn set(&mut self, x: i32, z: i32, value: f32) {
        let pos = self.pos(x, z);
        self.arr[pos] = value;
    }

    /// Read with a cell outside the rect returning `None`
    pub fn try_get(&self, x: i32, z: i32) -> Option<f32> {
        self.rect.contains(Coord::new(x, z)).then(|| self.get(x, z))
    }

    /// Bilinear sample at a continuous absolute position, clamped to the rect
    pub fn get_interpolated(&self, fx: f32, fz: f32) -> f32 {
        if self.rect.is_empty() {
            return 0.0;
        }
        let min = self.rect.min();
        let max = self.rect.max();

        let mut ix = fx.floor() as i32;
        let mut iz = fz.floor() as i32;
        if ix == max.x { ix -= 1; }
        if iz == max.z { iz -= 1; }

        let x_percent = fx - ix as f32;
        let z_percent = fz - iz as f32;

        let ix = ix.clamp(min.x, max.x - 1);
        let iz = iz.clamp(min.z, max.z - 1);
        let ix1 = (ix + 1).min(max.x - 1);
        let iz1 = (iz + 1).min(max.z - 1);

        let v1 = self.get(ix, iz);
        let v2 = self.get(ix1, iz);
        let v3 = v1 * (1.0 - x_percent) + v2 * x_percent;

        let v4 = self.get(ix, iz1);
        let v5 = self.get(ix1, iz1);
        let v6 = v4 * (1.0 - x_percent) + v5 * x_percent;

        v3 * (1.0 - z_percent) + v6 * z_percent
    }

    /// Bilinear sample at a 0..1 position relative to the grid rect
    pub fn get_relative(&self, rx: f32, rz: f32) -> f32 {
        self.get_relative_in(rx, rz, self.rect)
    }

    /// Bilinear sample at a 0..1 position relative to `rect` (e.g. the active zone)
    pub fn get_relative_in(&self, rx: f32, rz: f32, rect: CoordRect) -> f32 {
        let fx = rx * rect.size.x as f32 + rect.offset.x as f32;
        let fz = rz * rect.size.z as f32 + rect.offset.z as f32;
        self.get_interpolated(fx, fz)
    }

    /// Same as [`Matrix::get_relative_in`], with the sample point first rotated
    /// around `pivot` (both in 0..1 space)
    ///
    /// `direction` is the rotated X axis. Points that land outside the unit
    /// square after rotation read as zero.
    pub fn get_relative_rotated(&self, sx: f32, sz: f32, direction: Vec2, pivot: Vec2, rect: CoordRect) -> f32 {
        let c = Vec2::new(sx, sz) - pivot;
        let v = direction * c.x + direction.perp() * c.y + pivot;

        if v.x < 0.0 || v.x > 1.0 || v.y < 0.0 || v.y > 1.0 {
            return 0.0;
        }
        self.get_relative_in(v.x, v.y, rect)
    }

    /// Copy the overlapping cells of `src`
    pub fn read_from(&mut self, src: &Matrix) {
        let intersection = self.rect.intersect(&src.rect);
        let (min, max) = (intersection.min(), intersection.max());
        let width = intersection.size.x as usize;
        if width == 0 {
            return;
        }

        for z in min.z..max.z {
            let dst = self.pos(min.x, z);
            let from = src.pos(min.x, z);
            self.arr[dst..dst + width].copy_from_slice(&src.arr[from..from + width]);
        }
    }

    /// Fill every cell from the same position in `src`, wrapping positions
    /// that fall outside of `src` with `mode`
    pub fn read_matrix(&mut self, src: &Matrix, mode: TileMode) {
        if src.rect.is_empty() {
            return;
        }
        let rect = self.rect;
        for pos in rect.cells() {
            let wrapped = src.rect.wrap(pos, mode);
            let value = src.get(wrapped.x, wrapped.z);
            self.set(pos.x, pos.z, value);
        }
    }

    /// Resample the whole grid into `dst` (any size), bilinearly
    ///
    /// Corner cells map onto corner cells so shared tile borders stay aligned.
    pub fn resample_into(&self, dst: &mut Matrix) {
        let dst_size = dst.rect.size;
        if dst_size.x <= 0 || dst_size.z <= 0 || self.rect.is_empty() {
            return;
        }
        let src_rect = self.rect;
        let width = dst_size.x as usize;

        let span = |n: i32| if n > 1 { (n - 1) as f32 } else { 1.0 };
        let (sx, sz) = (span(src_rect.size.x), span(src_rect.size.z));
        let (dx, dz) = (span(dst_size.x), span(dst_size.z));

        let count = dst.rect.count();
        dst.arr[..count]
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(z, row)| {
                let fz = src_rect.offset.z as f32 + z as f32 / dz * sz;
                for (x, cell) in row.iter_mut().enumerate() {
                    let fx = src_rect.offset.x as f32 + x as f32 / dx * sx;
                    *cell = self.get_interpolated(fx, fz);
                }
            });
    }

    /// Resampled copy with a new size, keeping the offset
    pub fn resampled(&self, size: Coord) -> Matrix {
        let mut dst = Matrix::new(CoordRect::new(self.rect.offset, size));
        self.resample_into(&mut dst);
        dst
    }

    pub(crate) fn ensure_same_count(&self, other: &Matrix) -> Result<(), MatrixError> {
        if self.count() != other.count() {
            return Err(MatrixError::CountMismatch { left: self.count(), right: other.count() });
        }
        Ok(())
    }
}

impl Index<(i32, i32)> for Matrix {
    type Output = f32;

    fn index(&self, (x, z): (i32, i32)) -> &f32 {
        &self.arr[self.pos(x, z)]
    }
}

impl IndexMut<(i32, i32)> for Matrix {
    fn index_mut(&mut self, (x, z): (i32, i32)) -> &mut f32 {
        let pos = self.pos(x, z);
        &mut self.arr[pos]
    }
}

impl Index<Coord> for Matrix {
    type Output = f32;

    fn index(&self, c: Coord) -> &f32 {
        &self[(c.x, c.z)]
    }
}

impl IndexMut<Coord> for Matrix {
    fn index_mut(&mut self, c: Coord) -> &mut f32 {
        &mut self[(c.x, c.z)]
    }
}
