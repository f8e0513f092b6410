//! Text rasterization.
//!
//! Two font sources:
//!
//! - the built-in Spleen 12×24 bitmap font, nearest-neighbor scaled so a
//!   glyph is `size` pixels tall and `size / 2` pixels wide;
//! - TrueType/OpenType fonts loaded from a directory into a [`FontBook`],
//!   rasterized with ab_glyph. A pixel is set when coverage reaches 0.5.
//!
//! Characters a font cannot resolve render as a box outline.

use std::collections::HashMap;
use std::path::Path;

use ab_glyph::{Font, FontArc, ScaleFont};
use spleen_font::{FONT_12X24, PSF2Font};

use super::canvas::Mask;
use crate::error::EtiquetaError;

const SPLEEN_WIDTH: usize = 12;
const SPLEEN_HEIGHT: usize = 24;
const COVERAGE_THRESHOLD: f32 = 0.5;

/// Named TrueType fonts, keyed by lowercase file stem.
#[derive(Clone, Default)]
pub struct FontBook {
    fonts: HashMap<String, FontArc>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("fonts", &self.names())
            .finish()
    }
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `.ttf`/`.otf` file in a directory.
    ///
    /// Files that fail to parse are logged and skipped.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, EtiquetaError> {
        let dir = dir.as_ref();
        let mut book = Self::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            if !matches!(ext.as_deref(), Some("ttf") | Some("otf")) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let bytes = std::fs::read(&path)?;
            match FontArc::try_from_vec(bytes) {
                Ok(font) => {
                    tracing::debug!(font = stem, "loaded font");
                    book.insert(stem, font);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable font");
                }
            }
        }

        tracing::info!(dir = %dir.display(), count = book.fonts.len(), "font directory loaded");
        Ok(book)
    }

    pub fn insert(&mut self, name: &str, font: FontArc) {
        self.fonts.insert(name.to_ascii_lowercase(), font);
    }

    /// Look up a font by reference. Extensions are ignored (`ppb.ttf` == `ppb`).
    pub fn get(&self, name: &str) -> Option<&FontArc> {
        let key = name.to_ascii_lowercase();
        let key = key
            .strip_suffix(".ttf")
            .or_else(|| key.strip_suffix(".otf"))
            .unwrap_or(&key);
        self.fonts.get(key)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fonts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

/// Rasterize one line of text `size` pixels tall.
///
/// `font = None` selects the built-in bitmap font.
pub fn rasterize_line(line: &str, size: u32, spacing: i32, font: Option<&FontArc>) -> Mask {
    match font {
        Some(font) => rasterize_ttf(line, size, spacing, font),
        None => rasterize_builtin(line, size, spacing),
    }
}

/// Cell width of the built-in font at a given height.
pub fn builtin_cell_width(size: u32) -> usize {
    (size as usize * SPLEEN_WIDTH / SPLEEN_HEIGHT).max(1)
}

fn advance_positions(count: usize, cell: usize, spacing: i32) -> (Vec<usize>, usize) {
    let advance = (cell as i64 + spacing as i64).max(1) as usize;
    let positions: Vec<usize> = (0..count).map(|i| i * advance).collect();
    let width = positions.last().map(|&p| p + cell).unwrap_or(0);
    (positions, width)
}

fn rasterize_builtin(line: &str, size: u32, spacing: i32) -> Mask {
    let height = (size as usize).max(1);
    let cell_w = builtin_cell_width(size);
    let chars: Vec<char> = line.chars().collect();
    let (positions, width) = advance_positions(chars.len(), cell_w, spacing);
    let mut mask = Mask::new(width, height);

    let mut spleen = PSF2Font::new(FONT_12X24).ok();

    for (ch, &x0) in chars.iter().zip(&positions) {
        let mut glyph = Mask::new(SPLEEN_WIDTH, SPLEEN_HEIGHT);
        let utf8 = ch.to_string();
        let found = match spleen.as_mut().and_then(|f| f.glyph_for_utf8(utf8.as_bytes())) {
            Some(rows) => {
                for (row_y, row) in rows.enumerate() {
                    for (col_x, on) in row.enumerate() {
                        glyph.set(col_x, row_y, on);
                    }
                }
                true
            }
            None => false,
        };
        if !found {
            glyph = Mask::placeholder(SPLEEN_WIDTH, SPLEEN_HEIGHT);
        }

        let scaled = glyph.scaled(cell_w, height);
        for gy in 0..height {
            for gx in 0..cell_w {
                if scaled.get(gx, gy) {
                    mask.set(x0 + gx, gy, true);
                }
            }
        }
    }

    mask
}

fn rasterize_ttf(line: &str, size: u32, spacing: i32, font: &FontArc) -> Mask {
    let pixel_height = (size as f32).max(1.0);
    let scaled = font.as_scaled(pixel_height);

    let mut glyphs = Vec::new();
    let mut placeholders = Vec::new();
    let mut caret_x = 0.0f32;

    for ch in line.chars() {
        let glyph_id = font.glyph_id(ch);
        let advance = scaled.h_advance(glyph_id);
        if glyph_id.0 == 0 && !ch.is_whitespace() {
            placeholders.push((caret_x, advance.max(pixel_height / 2.0)));
        } else {
            glyphs.push((glyph_id, caret_x));
        }
        caret_x += advance + spacing as f32;
    }

    let width = caret_x.ceil().max(1.0) as usize;
    let ascent = scaled.ascent();
    let height = (ascent - scaled.descent()).ceil().max(1.0) as usize;
    let mut mask = Mask::new(width, height);

    for &(glyph_id, glyph_x) in &glyphs {
        let glyph =
            glyph_id.with_scale_and_position(pixel_height, ab_glyph::point(glyph_x, ascent));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, coverage| {
                if coverage < COVERAGE_THRESHOLD {
                    return;
                }
                let x = px as i32 + bounds.min.x as i32;
                let y = py as i32 + bounds.min.y as i32;
                if x >= 0 && y >= 0 {
                    mask.set(x as usize, y as usize, true);
                }
            });
        }
    }

    for (x, w) in placeholders {
        let boxed = Mask::placeholder(w.ceil() as usize, height);
        for by in 0..boxed.height {
            for bx in 0..boxed.width {
                if boxed.get(bx, by) {
                    mask.set(x as usize + bx, by, true);
                }
            }
        }
    }

    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_dimensions() {
        let mask = rasterize_line("Hello", 40, 0, None);
        assert_eq!(mask.height, 40);
        assert_eq!(mask.width, 5 * 20);
        assert!(!mask.is_empty());
    }

    #[test]
    fn test_builtin_spacing() {
        let tight = rasterize_line("AB", 24, 0, None);
        let loose = rasterize_line("AB", 24, 4, None);
        assert_eq!(loose.width, tight.width + 4);
    }

    #[test]
    fn test_space_is_blank() {
        let mask = rasterize_line(" ", 24, 0, None);
        assert!(mask.is_empty());
    }

    #[test]
    fn test_empty_line() {
        let mask = rasterize_line("", 24, 0, None);
        assert_eq!(mask.width, 0);
    }

    #[test]
    fn test_missing_font_dir() {
        assert!(FontBook::load_dir("/nonexistent/fonts").is_err());
    }

    #[test]
    fn test_font_book_lookup_ignores_extension() {
        let book = FontBook::new();
        assert!(book.get("ppb.ttf").is_none());
        assert!(book.is_empty());
    }
}
