//! Icon glyphs from an icon font.
//!
//! Icons are referenced by name (`mdi:home`, `home`). A metadata file maps
//! names to codepoints in the icon font, using the Material Design Icons
//! `_meta.json` layout:
//!
//! ```json
//! [{ "name": "home", "codepoint": "F02DC" }, ...]
//! ```

use std::collections::HashMap;
use std::path::Path;

use ab_glyph::{Font, FontArc, ScaleFont};
use serde::Deserialize;

use super::canvas::Mask;
use crate::error::EtiquetaError;

#[derive(Deserialize)]
struct MetaEntry {
    name: String,
    codepoint: String,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Icon name → codepoint table.
#[derive(Debug, Clone, Default)]
pub struct IconMap {
    glyphs: HashMap<String, char>,
}

impl IconMap {
    /// Parse a `_meta.json` document. Entries with invalid codepoints are skipped.
    pub fn from_meta_json(json: &str) -> Result<Self, EtiquetaError> {
        let entries: Vec<MetaEntry> = serde_json::from_str(json)
            .map_err(|e| EtiquetaError::Asset(format!("invalid icon metadata: {}", e)))?;

        let mut glyphs = HashMap::with_capacity(entries.len());
        for entry in entries {
            let Some(ch) = u32::from_str_radix(&entry.codepoint, 16)
                .ok()
                .and_then(char::from_u32)
            else {
                tracing::debug!(icon = %entry.name, codepoint = %entry.codepoint, "bad codepoint");
                continue;
            };
            for alias in entry.aliases {
                glyphs.insert(alias, ch);
            }
            glyphs.insert(entry.name, ch);
        }
        Ok(Self { glyphs })
    }

    pub fn insert(&mut self, name: impl Into<String>, ch: char) {
        self.glyphs.insert(name.into(), ch);
    }

    /// Resolve a name, with or without a `prefix:` namespace.
    pub fn resolve(&self, name: &str) -> Option<char> {
        let bare = name.split_once(':').map(|(_, n)| n).unwrap_or(name);
        self.glyphs.get(bare).copied()
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

/// An icon font plus its name table.
#[derive(Clone)]
pub struct IconFont {
    font: FontArc,
    map: IconMap,
}

impl std::fmt::Debug for IconFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IconFont")
            .field("icons", &self.map.len())
            .finish()
    }
}

impl IconFont {
    pub fn new(font: FontArc, map: IconMap) -> Self {
        Self { font, map }
    }

    /// Load the font file and its metadata file.
    pub fn load(font_path: impl AsRef<Path>, meta_path: impl AsRef<Path>) -> Result<Self, EtiquetaError> {
        let font_path = font_path.as_ref();
        let bytes = std::fs::read(font_path)?;
        let font = FontArc::try_from_vec(bytes).map_err(|e| {
            EtiquetaError::Asset(format!("invalid icon font {}: {}", font_path.display(), e))
        })?;
        let meta = std::fs::read_to_string(meta_path)?;
        let map = IconMap::from_meta_json(&meta)?;
        tracing::info!(font = %font_path.display(), icons = map.len(), "icon font loaded");
        Ok(Self { font, map })
    }

    /// Rasterize an icon into a `size × size` mask. `None` if the name or
    /// glyph is unknown.
    pub fn rasterize(&self, name: &str, size: u32) -> Option<Mask> {
        let ch = self.map.resolve(name)?;
        let glyph_id = self.font.glyph_id(ch);
        if glyph_id.0 == 0 {
            return None;
        }

        let px = (size as f32).max(1.0);
        let scaled = self.font.as_scaled(px);
        let glyph = glyph_id.with_scale_and_position(px, ab_glyph::point(0.0, scaled.ascent()));
        let outlined = self.font.outline_glyph(glyph)?;

        let side = size as usize;
        let bounds = outlined.px_bounds();
        // center horizontally within the square cell
        let offset_x = ((px - bounds.width()) / 2.0 - bounds.min.x).round() as i32;
        let mut mask = Mask::new(side, side);
        outlined.draw(|gx, gy, coverage| {
            if coverage < 0.5 {
                return;
            }
            let x = gx as i32 + bounds.min.x as i32 + offset_x;
            let y = gy as i32 + bounds.min.y as i32;
            if x >= 0 && y >= 0 {
                mask.set(x as usize, y as usize, true);
            }
        });
        Some(mask)
    }
}
