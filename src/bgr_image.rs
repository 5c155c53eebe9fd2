use std::path::Path;

use crate::error::{BenchError, BenchResult};

pub const CHANNELS: usize = 3;

/// Interleaved 8-bit image in B,G,R byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgrImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl BgrImage {
    /// Decode an image file and reorder its channels to BGR.
    pub fn open(path: impl AsRef<Path>) -> BenchResult<Self> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|source| BenchError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(BenchError::EmptyImage {
                path: path.to_path_buf(),
            });
        }
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut data = rgb.into_raw();
        for px in data.chunks_exact_mut(CHANNELS) {
            px.swap(0, 2);
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> BenchResult<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if expected == 0 || data.len() != expected {
            return Err(BenchError::InvalidBuffer {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// `(height, width, channels)`, row-major.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, CHANNELS)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pack pixels as `0x00RRGGBB` for a framebuffer window.
    pub fn to_argb(&self) -> Vec<u32> {
        self.data
            .chunks_exact(CHANNELS)
            .map(|px| ((px[2] as u32) << 16) | ((px[1] as u32) << 8) | px[0] as u32)
            .collect()
    }

    /// Largest per-channel difference against an image of the same size.
    #[cfg(test)]
    pub fn max_abs_diff(&self, other: &BgrImage) -> Option<u8> {
        if self.dimensions() != other.dimensions() {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| a.abs_diff(b))
                .max()
                .unwrap_or(0),
        )
    }
}

#[cfg(test)]
pub(crate) fn gradient(width: u32, height: u32) -> BgrImage {
    let mut data = Vec::with_capacity(width as usize * height as usize * CHANNELS);
    for y in 0..height {
        for x in 0..width {
            data.push((x * 255 / (width - 1).max(1)) as u8);
            data.push((y * 255 / (height - 1).max(1)) as u8);
            data.push(((x + y) * 255 / (width + height)) as u8);
        }
    }
    BgrImage::from_raw(width, height, data).unwrap()
}
