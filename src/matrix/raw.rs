//! Conversion between grids and packed raster buffers
//!
//! Every import/export works on the intersection of the grid rect and the
//! buffer rect (`offset` + `size`); cells outside of it are left untouched on
//! both sides. Buffers are row-major with `size.x` pixels per row.

use super::{Matrix, MatrixError};
use crate::math::{Coord, CoordRect};

/// Mipmap chains add roughly a third to the base level
const MIPMAP_MIN_RATIO: f32 = 1.3;
const MIPMAP_MAX_RATIO: f32 = 1.3666;

/// Byte order of 16-bit samples
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Packed raster encodings supported by [`Matrix::import_raw`] / [`Matrix::export_raw`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawFormat {
    /// One byte per pixel
    R8,
    /// Two bytes per pixel
    R16(ByteOrder),
    /// IEEE-754 little endian float per pixel
    RFloat,
    /// Three interleaved bytes per pixel
    Rgb24,
    /// Four interleaved bytes per pixel, red first
    Rgba32,
    /// Four interleaved bytes per pixel, alpha first
    Argb32,
}

impl RawFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            RawFormat::R8 => 1,
            RawFormat::R16(_) => 2,
            RawFormat::RFloat => 4,
            RawFormat::Rgb24 => 3,
            RawFormat::Rgba32 | RawFormat::Argb32 => 4,
        }
    }

    /// Byte index of an RGBA channel inside one pixel
    fn channel_byte(self, channel: usize) -> Result<usize, MatrixError> {
        let channels = match self {
            RawFormat::Rgb24 => 3,
            RawFormat::Rgba32 | RawFormat::Argb32 => 4,
            _ => 1,
        };
        if channel >= channels {
            return Err(MatrixError::InvalidChannel { channel, channels });
        }
        Ok(match self {
            RawFormat::Argb32 => (channel + 1) % 4,
            _ => channel,
        })
    }
}

/// Pairs of (matrix index, buffer pixel index) over the overlap of two rects
fn overlap(rect: CoordRect, buf: CoordRect) -> impl Iterator<Item = (usize, usize)> {
    let intersection = rect.intersect(&buf);
    let (min, max) = (intersection.min(), intersection.max());
    (min.z..max.z).flat_map(move |z| {
        (min.x..max.x).map(move |x| {
            let matrix_pos = (z - rect.offset.z) * rect.size.x + x - rect.offset.x;
            let buf_pos = (z - buf.offset.z) * buf.size.x + x - buf.offset.x;
            (matrix_pos as usize, buf_pos as usize)
        })
    })
}

fn pixel_count(size: Coord) -> usize {
    CoordRect::new(Coord::ZERO, size).count()
}

/// Exact length, or a base level followed by a mipmap chain
fn check_bytes_with_mips(len: usize, expected: usize) -> Result<(), MatrixError> {
    let lenf = len as f32;
    let expf = expected as f32;
    if len != expected && (lenf < expf * MIPMAP_MIN_RATIO || lenf > expf * MIPMAP_MAX_RATIO) {
        return Err(MatrixError::SizeMismatch { expected, actual: len });
    }
    Ok(())
}

fn check_at_least(len: usize, expected: usize) -> Result<(), MatrixError> {
    if len < expected {
        return Err(MatrixError::SizeMismatch { expected, actual: len });
    }
    Ok(())
}

fn check_exact(len: usize, expected: usize) -> Result<(), MatrixError> {
    if len != expected {
        return Err(MatrixError::SizeMismatch { expected, actual: len });
    }
    Ok(())
}

/// `start` must address a byte inside each `step`-byte pixel
fn check_stride(start: usize, step: usize) -> Result<(), MatrixError> {
    if step == 0 || start >= step {
        return Err(MatrixError::InvalidChannel { channel: start, channels: step });
    }
    Ok(())
}

#[inline]
fn encode_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
fn encode_u16(value: f32) -> u16 {
    (value.clamp(0.0, 1.0) * 65535.0).round() as u16
}

impl Matrix {
    /// Import one byte per pixel starting at `start`, advancing `step` bytes per pixel
    pub fn import_raw_bytes(&mut self, bytes: &[u8], offset: Coord, size: Coord, start: usize, step: usize) -> Result<(), MatrixError> {
        check_stride(start, step)?;
        check_bytes_with_mips(bytes.len(), pixel_count(size) * step)?;
        for (m, b) in overlap(self.rect(), CoordRect::new(offset, size)) {
            self.arr[m] = bytes[b * step + start] as f32 / 255.0;
        }
        Ok(())
    }

    pub fn export_raw_bytes(&self, bytes: &mut [u8], offset: Coord, size: Coord, start: usize, step: usize) -> Result<(), MatrixError> {
        check_stride(start, step)?;
        check_bytes_with_mips(bytes.len(), pixel_count(size) * step)?;
        for (m, b) in overlap(self.rect(), CoordRect::new(offset, size)) {
            bytes[b * step + start] = encode_byte(self.arr[m]);
        }
        Ok(())
    }

    /// Import 16-bit samples; trailing bytes (mipmaps) are ignored
    pub fn import_raw16(&mut self, bytes: &[u8], offset: Coord, size: Coord, order: ByteOrder) -> Result<(), MatrixError> {
        check_at_least(bytes.len(), pixel_count(size) * 2)?;
        for (m, b) in overlap(self.rect(), CoordRect::new(offset, size)) {
            let pair = [bytes[b * 2], bytes[b * 2 + 1]];
            let raw = match order {
                ByteOrder::Little => u16::from_le_bytes(pair),
                ByteOrder::Big => u16::from_be_bytes(pair),
            };
            self.arr[m] = raw as f32 / 65535.0;
        }
        Ok(())
    }

    pub fn export_raw16(&self, bytes: &mut [u8], offset: Coord, size: Coord, order: ByteOrder) -> Result<(), MatrixError> {
        check_exact(bytes.len(), pixel_count(size) * 2)?;
        for (m, b) in overlap(self.rect(), CoordRect::new(offset, size)) {
            let raw = encode_u16(self.arr[m]);
            let pair = match order {
                ByteOrder::Little => raw.to_le_bytes(),
                ByteOrder::Big => raw.to_be_bytes(),
            };
            bytes[b * 2..b * 2 + 2].copy_from_slice(&pair);
        }
        Ok(())
    }

    /// Import little endian floats, scaled by `mult`
    pub fn import_raw_float(&mut self, bytes: &[u8], offset: Coord, size: Coord, mult: f32) -> Result<(), MatrixError> {
        check_at_least(bytes.len(), pixel_count(size) * 4)?;
        for (m, b) in overlap(self.rect(), CoordRect::new(offset, size)) {
            let mut quad = [0u8; 4];
            quad.copy_from_slice(&bytes[b * 4..b * 4 + 4]);
            self.arr[m] = f32::from_le_bytes(quad) * mult;
        }
        Ok(())
    }

    pub fn export_raw_float(&self, bytes: &mut [u8], offset: Coord, size: Coord, mult: f32) -> Result<(), MatrixError> {
        check_exact(bytes.len(), pixel_count(size) * 4)?;
        for (m, b) in overlap(self.rect(), CoordRect::new(offset, size)) {
            bytes[b * 4..b * 4 + 4].copy_from_slice(&(self.arr[m] * mult).to_le_bytes());
        }
        Ok(())
    }

    /// Import any [`RawFormat`]; `channel` selects the RGBA channel of multi-channel formats
    pub fn import_raw(&mut self, format: RawFormat, bytes: &[u8], offset: Coord, size: Coord, channel: usize) -> Result<(), MatrixError> {
        match format {
            RawFormat::R8 => self.import_raw_bytes(bytes, offset, size, 0, 1),
            RawFormat::R16(order) => self.import_raw16(bytes, offset, size, order),
            RawFormat::RFloat => self.import_raw_float(bytes, offset, size, 1.0),
            RawFormat::Rgb24 | RawFormat::Rgba32 | RawFormat::Argb32 => {
                let start = format.channel_byte(channel)?;
                self.import_raw_bytes(bytes, offset, size, start, format.bytes_per_pixel())
            }
        }
    }

    /// Export any [`RawFormat`]
    ///
    /// For multi-channel formats `channel: None` writes the value into every
    /// color channel (alpha untouched), `Some(c)` writes a single channel.
    pub fn export_raw(&self, format: RawFormat, bytes: &mut [u8], offset: Coord, size: Coord, channel: Option<usize>) -> Result<(), MatrixError> {
        match format {
            RawFormat::R8 => self.export_raw_bytes(bytes, offset, size, 0, 1),
            RawFormat::R16(order) => self.export_raw16(bytes, offset, size, order),
            RawFormat::RFloat => self.export_raw_float(bytes, offset, size, 1.0),
            RawFormat::Rgb24 | RawFormat::Rgba32 | RawFormat::Argb32 => {
                let step = format.bytes_per_pixel();
                match channel {
                    Some(c) => self.export_raw_bytes(bytes, offset, size, format.channel_byte(c)?, step),
                    None => {
                        for c in 0..3 {
                            self.export_raw_bytes(bytes, offset, size, format.channel_byte(c)?, step)?;
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    /// Import RGBA float colors; `channel: None` averages red, green and blue
    pub fn import_colors(&mut self, colors: &[[f32; 4]], offset: Coord, size: Coord, channel: Option<usize>) -> Result<(), MatrixError> {
        check_exact(colors.len(), pixel_count(size))?;
        if let Some(c) = channel.filter(|c| *c >= 4) {
            return Err(MatrixError::InvalidChannel { channel: c, channels: 4 });
        }
        for (m, b) in overlap(self.rect(), CoordRect::new(offset, size)) {
            let color = colors[b];
            self.arr[m] = match channel {
                Some(c) => color[c],
                None => (color[0] + color[1] + color[2]) / 3.0,
            };
        }
        Ok(())
    }

    /// Export into RGBA float colors
    ///
    /// Values above 1 are marked green and values below 0 red, so
    /// out-of-range cells stand out in previews.
    pub fn export_colors(&self, colors: &mut [[f32; 4]], offset: Coord, size: Coord, channel: Option<usize>) -> Result<(), MatrixError> {
        check_exact(colors.len(), pixel_count(size))?;
        if let Some(c) = channel.filter(|c| *c >= 4) {
            return Err(MatrixError::InvalidChannel { channel: c, channels: 4 });
        }
        for (m, b) in overlap(self.rect(), CoordRect::new(offset, size)) {
            let value = self.arr[m];
            let color = &mut colors[b];
            if value > 1.0 {
                *color = [0.0, 1.0, 0.0, 0.0];
            } else if value < 0.0 {
                *color = [1.0, 0.0, 0.0, 0.0];
            } else {
                match channel {
                    Some(c) => color[c] = value,
                    None => *color = [value; 4],
                }
            }
        }
        Ok(())
    }

    /// Import a row-major height array (`size.z` rows of `size.x` values)
    pub fn import_heights(&mut self, heights: &[f32], offset: Coord, size: Coord) -> Result<(), MatrixError> {
        check_at_least(heights.len(), pixel_count(size))?;
        for (m, b) in overlap(self.rect(), CoordRect::new(offset, size)) {
            self.arr[m] = heights[b];
        }
        Ok(())
    }

    pub fn export_heights(&self, heights: &mut [f32], offset: Coord, size: Coord) -> Result<(), MatrixError> {
        check_at_least(heights.len(), pixel_count(size))?;
        for (m, b) in overlap(self.rect(), CoordRect::new(offset, size)) {
            heights[b] = self.arr[m];
        }
        Ok(())
    }

    /// Import one channel of an interleaved splat array (row, column, channel)
    pub fn import_splats(&mut self, splats: &[f32], offset: Coord, size: Coord, channels: usize, channel: usize) -> Result<(), MatrixError> {
        if channel >= channels {
            return Err(MatrixError::InvalidChannel { channel, channels });
        }
        check_at_least(splats.len(), pixel_count(size) * channels)?;
        for (m, b) in overlap(self.rect(), CoordRect::new(offset, size)) {
            self.arr[m] = splats[b * channels + channel];
        }
        Ok(())
    }

    pub fn export_splats(&self, splats: &mut [f32], offset: Coord, size: Coord, channels: usize, channel: usize) -> Result<(), MatrixError> {
        if channel >= channels {
            return Err(MatrixError::InvalidChannel { channel, channels });
        }
        check_at_least(splats.len(), pixel_count(size) * channels)?;
        for (m, b) in overlap(self.rect(), CoordRect::new(offset, size)) {
            splats[b * channels + channel] = self.arr[m];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(rect: CoordRect) -> Matrix {
        let mut m = Matrix::new(rect);
        let n = rect.count() as f32;
        for (i, v) in m.as_mut_slice().iter_mut().enumerate() {
            *v = i as f32 / n;
        }
        m
    }

    #[test]
    fn test_bytes_round_trip_within_quantization() {
        let src = gradient(CoordRect::from_xz(0, 0, 16, 16));
        let size = Coord::new(16, 16);
        let mut bytes = vec![0u8; 256];
        src.export_raw_bytes(&mut bytes, Coord::ZERO, size, 0, 1).unwrap();

        let mut dst = Matrix::new(src.rect());
        dst.import_raw_bytes(&bytes, Coord::ZERO, size, 0, 1).unwrap();
        for (a, b) in src.as_slice().iter().zip(dst.as_slice()) {
            assert!((a - b).abs() <= 1.0 / 255.0);
        }
    }

    #[test]
    fn test_bytes_reject_start_outside_pixel() {
        let size = Coord::new(2, 2);
        let mut m = Matrix::new(CoordRect::from_xz(0, 0, 2, 2));
        let mut bytes = vec![0u8; 16];

        assert!(matches!(
            m.import_raw_bytes(&bytes, Coord::ZERO, size, 4, 4),
            Err(MatrixError::InvalidChannel { channel: 4, channels: 4 })
        ));
        assert!(matches!(
            m.export_raw_bytes(&mut bytes, Coord::ZERO, size, 4, 4),
            Err(MatrixError::InvalidChannel { .. })
        ));
        assert!(m.import_raw_bytes(&bytes, Coord::ZERO, size, 0, 0).is_err());
        assert!(m.import_raw_bytes(&bytes, Coord::ZERO, size, 3, 4).is_ok());
    }

    #[test]
    fn test_float_round_trip_exact() {
        let src = gradient(CoordRect::from_xz(3, -2, 7, 5));
        let size = Coord::new(7, 5);
        let offset = Coord::new(3, -2);
        let mut bytes = vec![0u8; 7 * 5 * 4];
        src.export_raw_float(&mut bytes, offset, size, 1.0).unwrap();

        let mut dst = Matrix::new(src.rect());
        dst.import_raw_float(&bytes, offset, size, 1.0).unwrap();
        assert_eq!(src.as_slice(), dst.as_slice());
    }

    #[test]
    fn test_raw16_round_trip_both_orders() {
        let src = gradient(CoordRect::from_xz(0, 0, 8, 8));
        let size = Coord::new(8, 8);
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut bytes = vec![0u8; 128];
            src.export_raw16(&mut bytes, Coord::ZERO, size, order).unwrap();
            let mut dst = Matrix::new(src.rect());
            dst.import_raw16(&bytes, Coord::ZERO, size, order).unwrap();
            for (a, b) in src.as_slice().iter().zip(dst.as_slice()) {
                assert!((a - b).abs() <= 1.0 / 65535.0);
            }
        }
    }

    #[test]
    fn test_raw16_byte_order() {
        let m = Matrix::filled(CoordRect::from_xz(0, 0, 1, 1), 1.0);
        let mut le = vec![0u8; 2];
        m.export_raw16(&mut le, Coord::ZERO, Coord::new(1, 1), ByteOrder::Little).unwrap();
        assert_eq!(le, vec![0xFF, 0xFF]);

        let half = Matrix::filled(CoordRect::from_xz(0, 0, 1, 1), 256.0 / 65535.0);
        let mut be = vec![0u8; 2];
        half.export_raw16(&mut be, Coord::ZERO, Coord::new(1, 1), ByteOrder::Big).unwrap();
        assert_eq!(be, vec![0x01, 0x00]);
    }

    #[test]
    fn test_size_mismatch_reported() {
        let mut m = Matrix::new(CoordRect::from_xz(0, 0, 4, 4));
        let err = m.import_raw_bytes(&[0u8; 10], Coord::ZERO, Coord::new(4, 4), 0, 1).unwrap_err();
        assert_eq!(err, MatrixError::SizeMismatch { expected: 16, actual: 10 });
        assert!(err.to_string().starts_with("size mismatch"));

        let mut out = vec![0u8; 31];
        assert!(m.export_raw16(&mut out, Coord::ZERO, Coord::new(4, 4), ByteOrder::Little).is_err());
    }

    #[test]
    fn test_mipmap_tail_accepted() {
        let mut m = Matrix::new(CoordRect::from_xz(0, 0, 4, 4));
        // 16 + 4 + 1 bytes: base level plus mip chain
        let bytes = vec![255u8; 21];
        m.import_raw_bytes(&bytes, Coord::ZERO, Coord::new(4, 4), 0, 1).unwrap();
        assert!(m.as_slice().iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_intersection_only_touches_overlap() {
        // Buffer covers (5,5)..(15,15), matrix covers (0,0)..(10,10)
        let mut m = Matrix::filled(CoordRect::from_xz(0, 0, 10, 10), 0.5);
        let bytes = vec![255u8; 100];
        m.import_raw_bytes(&bytes, Coord::new(5, 5), Coord::new(10, 10), 0, 1).unwrap();

        for c in m.rect().cells() {
            let expected = if c.x >= 5 && c.z >= 5 { 1.0 } else { 0.5 };
            assert_eq!(m[c], expected, "cell {c}");
        }

        let mut out = vec![7u8; 100];
        m.export_raw_bytes(&mut out, Coord::new(5, 5), Coord::new(10, 10), 0, 1).unwrap();
        let changed = out.iter().filter(|b| **b != 7).count();
        assert_eq!(changed, 25);
    }

    #[test]
    fn test_argb_channel_mapping() {
        let mut m = Matrix::new(CoordRect::from_xz(0, 0, 1, 1));
        // alpha, red, green, blue
        let bytes = [10u8, 255, 0, 0];
        m.import_raw(RawFormat::Argb32, &bytes, Coord::ZERO, Coord::new(1, 1), 0).unwrap();
        assert_eq!(m.get(0, 0), 1.0);
        m.import_raw(RawFormat::Argb32, &bytes, Coord::ZERO, Coord::new(1, 1), 3).unwrap();
        assert!((m.get(0, 0) - 10.0 / 255.0).abs() < 1e-6);
        assert!(m.import_raw(RawFormat::Rgb24, &bytes[..3], Coord::ZERO, Coord::new(1, 1), 3).is_err());
    }

    #[test]
    fn test_colors_average_and_markers() {
        let mut m = Matrix::new(CoordRect::from_xz(0, 0, 2, 1));
        m.import_colors(&[[0.3, 0.6, 0.9, 1.0], [1.0, 1.0, 1.0, 0.0]], Coord::ZERO, Coord::new(2, 1), None).unwrap();
        assert!((m.get(0, 0) - 0.6).abs() < 1e-6);

        m.set(1, 0, 2.0);
        let mut out = vec![[0.0; 4]; 2];
        m.export_colors(&mut out, Coord::ZERO, Coord::new(2, 1), None).unwrap();
        assert_eq!(out[1], [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_splats_channel() {
        let mut m = Matrix::new(CoordRect::from_xz(0, 0, 2, 2));
        let splats: Vec<f32> = (0..8).map(|i| i as f32).collect();
        m.import_splats(&splats, Coord::ZERO, Coord::new(2, 2), 2, 1).unwrap();
        assert_eq!(m.as_slice(), &[1.0, 3.0, 5.0, 7.0]);
        assert!(m.import_splats(&splats, Coord::ZERO, Coord::new(2, 2), 2, 2).is_err());
    }
}
