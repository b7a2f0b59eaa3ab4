//! Contain-fit geometry
//!
//! All raster placement in the comparison view goes through `contain_fit`.

use serde::{Deserialize, Serialize};

/// Width/height pair in either visual (CSS) or logical (canvas) pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn aspect(&self) -> f64 {
        self.width / self.height
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Clamp a horizontal coordinate to `[x, x + width]`
    pub fn clamp_x(&self, x: f64) -> f64 {
        x.clamp(self.x, self.right())
    }
}

/// Fit `native` inside `display`, preserving aspect ratio, centered.
///
/// Width-constrained when the asset is wider than the box, otherwise
/// height-constrained. Empty inputs yield an empty rectangle at the origin.
pub fn contain_fit(display: Size, native: Size) -> Rect {
    if display.is_empty() || native.is_empty() {
        return Rect::new(0.0, 0.0, 0.0, 0.0);
    }

    let (width, height) = if native.aspect() > display.aspect() {
        (display.width, display.width * native.height / native.width)
    } else {
        (display.height * native.width / native.height, display.height)
    };

    Rect::new(
        (display.width - width) / 2.0,
        (display.height - height) / 2.0,
        width,
        height,
    )
}
