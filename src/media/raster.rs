//! RGBA8 raster buffer

use serde::{Deserialize, Serialize};

use crate::view::Rect;

/// An RGBA8 image, row-major, 4 bytes per pixel
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl Raster {
    /// Fully transparent raster
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Raster filled with a single colour
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut raster = Self::new(width, height);
        for px in raster.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        raster
    }

    /// Build from raw RGBA bytes; `None` if the length does not match
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let o = self.offset(x, y);
        [
            self.pixels[o],
            self.pixels[o + 1],
            self.pixels[o + 2],
            self.pixels[o + 3],
        ]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let o = self.offset(x, y);
        self.pixels[o..o + 4].copy_from_slice(&rgba);
    }

    /// Draw `src` scaled into `dest` (logical pixels of `self`), nearest
    /// neighbour, writing only columns in `[clip_x0, clip_x1)`.
    pub fn draw_scaled(&mut self, src: &Raster, dest: Rect, clip_x0: f64, clip_x1: f64) {
        if src.is_empty() || dest.width <= 0.0 || dest.height <= 0.0 {
            return;
        }

        let x_start = dest.x.max(clip_x0).max(0.0).floor() as i64;
        let x_end = (dest.x + dest.width)
            .min(clip_x1)
            .min(self.width as f64)
            .ceil() as i64;
        let y_start = dest.y.max(0.0).floor() as i64;
        let y_end = (dest.y + dest.height).min(self.height as f64).ceil() as i64;

        for y in y_start..y_end {
            let sy = ((y as f64 + 0.5 - dest.y) / dest.height * src.height as f64).floor();
            if sy < 0.0 || sy >= src.height as f64 {
                continue;
            }
            for x in x_start..x_end {
                let sx = ((x as f64 + 0.5 - dest.x) / dest.width * src.width as f64).floor();
                if sx < 0.0 || sx >= src.width as f64 {
                    continue;
                }
                let rgba = src.pixel(sx as u32, sy as u32);
                self.set_pixel(x as u32, y as u32, rgba);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_checks_length() {
        assert!(Raster::from_rgba(2, 2, vec![0; 16]).is_some());
        assert!(Raster::from_rgba(2, 2, vec![0; 15]).is_none());
    }

    #[test]
    fn test_draw_scaled_upsamples() {
        let src = Raster::filled(1, 1, [255, 0, 0, 255]);
        let mut dst = Raster::new(4, 2);
        dst.draw_scaled(&src, Rect::new(1.0, 0.0, 2.0, 2.0), 0.0, 4.0);

        assert_eq!(dst.pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(dst.pixel(1, 0), [255, 0, 0, 255]);
        assert_eq!(dst.pixel(2, 1), [255, 0, 0, 255]);
        assert_eq!(dst.pixel(3, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn test_draw_scaled_respects_clip() {
        let src = Raster::filled(2, 2, [0, 255, 0, 255]);
        let mut dst = Raster::new(4, 4);
        dst.draw_scaled(&src, Rect::new(0.0, 0.0, 4.0, 4.0), 2.0, 4.0);

        assert_eq!(dst.pixel(1, 1), [0, 0, 0, 0]);
        assert_eq!(dst.pixel(2, 1), [0, 255, 0, 255]);
    }
}
