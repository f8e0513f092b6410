//! # Canvas
//!
//! Palette pixel buffer the composer paints into.
//!
//! Every write is clipped: coordinates are signed and anything outside the
//! buffer is silently dropped, so elements positioned partly or fully off
//! the label never fail.

use image::{ImageEncoder, Rgb, RgbImage};

use crate::device::ColorModel;
use crate::error::EtiquetaError;
use crate::payload::{Color, Rotation};

/// A `width × height` grid of [`Color`] cells, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    width: usize,
    height: usize,
    pixels: Vec<Color>,
}

impl Canvas {
    /// Create a canvas filled with `fill`.
    pub fn new(width: usize, height: usize, fill: Color) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; width * height],
        }
    }

    /// Wrap existing pixels. Returns `None` if the length does not match.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<Color>) -> Option<Self> {
        (pixels.len() == width * height).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major pixel slice.
    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    /// Read a pixel, `None` outside the canvas.
    pub fn get(&self, x: usize, y: usize) -> Option<Color> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    /// Write a pixel with signed coordinates. Out-of-bounds writes are dropped.
    #[inline]
    pub fn set(&mut self, x: i32, y: i32, color: Color) {
        if x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = color;
        }
    }

    /// Fill a rectangle, clipped to the canvas.
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Color) {
        let x0 = x.max(0) as i64;
        let y0 = y.max(0) as i64;
        let x1 = (x as i64 + width as i64).min(self.width as i64);
        let y1 = (y as i64 + height as i64).min(self.height as i64);
        for py in y0..y1 {
            let row = py as usize * self.width;
            for px in x0..x1 {
                self.pixels[row + px as usize] = color;
            }
        }
    }

    /// Paint the set cells of a mask in `color`, with the mask's top-left at (x, y).
    pub fn draw_mask(&mut self, mask: &Mask, x: i32, y: i32, color: Color) {
        for my in 0..mask.height {
            for mx in 0..mask.width {
                if mask.get(mx, my) {
                    self.set(x.saturating_add(mx as i32), y.saturating_add(my as i32), color);
                }
            }
        }
    }

    /// Paint a sprite. Transparent cells leave the canvas unchanged.
    pub fn draw_sprite(&mut self, sprite: &Sprite, x: i32, y: i32) {
        for sy in 0..sprite.height {
            for sx in 0..sprite.width {
                if let Some(color) = sprite.cells[sy * sprite.width + sx] {
                    self.set(x.saturating_add(sx as i32), y.saturating_add(sy as i32), color);
                }
            }
        }
    }

    /// Rotate clockwise. 90 and 270 swap width and height.
    pub fn rotate(self, rotation: Rotation) -> Canvas {
        let (w, h) = (self.width, self.height);
        match rotation {
            Rotation::R0 => self,
            Rotation::R180 => {
                let mut pixels = self.pixels;
                pixels.reverse();
                Canvas {
                    width: w,
                    height: h,
                    pixels,
                }
            }
            Rotation::R90 => {
                // new (nx, ny) <- old (ny, h - 1 - nx)
                let mut out = Vec::with_capacity(w * h);
                for ny in 0..w {
                    for nx in 0..h {
                        out.push(self.pixels[(h - 1 - nx) * w + ny]);
                    }
                }
                Canvas {
                    width: h,
                    height: w,
                    pixels: out,
                }
            }
            Rotation::R270 => {
                // new (nx, ny) <- old (w - 1 - ny, nx)
                let mut out = Vec::with_capacity(w * h);
                for ny in 0..w {
                    for nx in 0..h {
                        out.push(self.pixels[nx * w + (w - 1 - ny)]);
                    }
                }
                Canvas {
                    width: h,
                    height: w,
                    pixels: out,
                }
            }
        }
    }

    /// Restrict the palette to what a color model can show.
    ///
    /// Red becomes black on monochrome labels.
    pub fn quantize(&mut self, model: ColorModel) {
        if model.has_red() {
            return;
        }
        for px in &mut self.pixels {
            if *px == Color::Red {
                *px = Color::Black;
            }
        }
    }

    /// Count pixels of a given color.
    pub fn count(&self, color: Color) -> usize {
        self.pixels.iter().filter(|&&c| c == color).count()
    }

    /// Convert to an RGB image for previews.
    pub fn to_rgb_image(&self) -> RgbImage {
        let mut img = RgbImage::new(self.width as u32, self.height as u32);
        for (i, color) in self.pixels.iter().enumerate() {
            let x = (i % self.width) as u32;
            let y = (i / self.width) as u32;
            let rgb = match color {
                Color::White => [255, 255, 255],
                Color::Black => [0, 0, 0],
                Color::Red => [255, 0, 0],
            };
            img.put_pixel(x, y, Rgb(rgb));
        }
        img
    }

    /// Encode as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, EtiquetaError> {
        let img = self.to_rgb_image();
        let mut png_bytes = Vec::new();
        image::codecs::png::PngEncoder::new(&mut png_bytes).write_image(
            img.as_raw(),
            self.width as u32,
            self.height as u32,
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(png_bytes)
    }
}

/// One-bit coverage mask (glyphs, bars, QR modules).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    bits: Vec<bool>,
}

impl Mask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width * height],
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.bits[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        if x < self.width && y < self.height {
            self.bits[y * self.width + x] = on;
        }
    }

    /// Nearest-neighbor scale to a new size.
    pub fn scaled(&self, width: usize, height: usize) -> Mask {
        let mut out = Mask::new(width, height);
        if self.width == 0 || self.height == 0 {
            return out;
        }
        for dy in 0..height {
            for dx in 0..width {
                let sx = dx * self.width / width;
                let sy = dy * self.height / height;
                out.bits[dy * width + dx] = self.bits[sy * self.width + sx];
            }
        }
        out
    }

    /// Box outline, used where a glyph cannot be resolved.
    pub fn placeholder(width: usize, height: usize) -> Mask {
        let mut m = Mask::new(width, height);
        if width == 0 || height == 0 {
            return m;
        }
        for x in 0..width {
            m.set(x, 0, true);
            m.set(x, height - 1, true);
        }
        for y in 0..height {
            m.set(0, y, true);
            m.set(width - 1, y, true);
        }
        m
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|&b| b)
    }
}

/// Image-like buffer with transparency. `None` cells are not painted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sprite {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<Option<Color>>,
}

impl Sprite {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![None; width * height],
        }
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, color: Option<Color>) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = color;
        }
    }
}
