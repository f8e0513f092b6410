//! # Device Capability Table
//!
//! Hardware specifications of the supported Gicisky labels.
//!
//! ## Supported Labels
//!
//! | Model id | Name | Resolution | Colors |
//! |----------|------|------------|--------|
//! | 0xA0 | TFT 2.1" BW | 250×132 | black/white |
//! | 0x0B | EPD 2.1" BWR | 250×128 | black/white/red |
//! | 0x28 | EPD 2.9" BW | 296×128 | black/white |
//! | 0x32 | EPD 2.9" BWR | 296×128 | black/white/red |
//! | 0x48 | EPD 4.2" BW | 400×300 | black/white |
//! | 0x4B | EPD 4.2" BWR | 400×300 | black/white/red |
//!
//! ## Usage
//!
//! ```
//! use etiqueta::device::Catalog;
//!
//! let catalog = Catalog::builtin();
//! let profile = catalog.lookup(0x0B).unwrap();
//! println!("{}: {}x{}", profile.name, profile.width, profile.height);
//! ```

use serde::Serialize;

use crate::error::EtiquetaError;

/// Payload bytes per image chunk accepted by the firmware.
pub const DEFAULT_CHUNK_SIZE: usize = 240;

/// Wire protocol revision spoken by every label in the table.
pub const PROTOCOL_V1: u8 = 1;

/// Pixel palette supported by a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorModel {
    /// Black and white.
    Monochrome,
    /// Black, white and red.
    ThreeColor,
}

impl ColorModel {
    /// Number of bit-planes in an encoded frame.
    pub fn planes(self) -> usize {
        match self {
            ColorModel::Monochrome => 1,
            ColorModel::ThreeColor => 2,
        }
    }

    /// Whether red can be displayed.
    pub fn has_red(self) -> bool {
        matches!(self, ColorModel::ThreeColor)
    }
}

/// # Device Profile
///
/// Defines the hardware characteristics of a label. Looked up once per
/// transfer and never mutated.
///
/// ## Frame Size
///
/// ```text
/// plane_bytes = ceil(width * height / 8)
/// frame_bytes = plane_bytes * planes
///
/// For EPD 2.9" BWR (0x32):
///   plane_bytes = 296 * 128 / 8 = 4736
///   frame_bytes = 4736 * 2 = 9472 → 40 chunks of 240 bytes
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    /// Model identifier from the advertisement
    pub model_id: u8,

    /// Human-readable model name
    pub name: &'static str,

    /// Panel width in pixels
    pub width: usize,

    /// Panel height in pixels
    pub height: usize,

    /// Supported palette
    pub color_model: ColorModel,

    /// Image payload bytes per chunk
    pub chunk_size: usize,

    /// Wire protocol revision
    pub protocol_version: u8,
}

impl DeviceProfile {
    const fn new(
        model_id: u8,
        name: &'static str,
        width: usize,
        height: usize,
        color_model: ColorModel,
    ) -> Self {
        Self {
            model_id,
            name,
            width,
            height,
            color_model,
            chunk_size: DEFAULT_CHUNK_SIZE,
            protocol_version: PROTOCOL_V1,
        }
    }

    /// # Gicisky TFT 2.1" (black/white)
    pub const TFT_21_BW: Self = Self::new(0xA0, "TFT 21 BW", 250, 132, ColorModel::Monochrome);

    /// # Gicisky EPD 2.1" (black/white/red)
    pub const EPD_21_BWR: Self = Self::new(0x0B, "EPD 21 BWR", 250, 128, ColorModel::ThreeColor);

    /// # Gicisky EPD 2.9" (black/white)
    pub const EPD_29_BW: Self = Self::new(0x28, "EPD 29 BW", 296, 128, ColorModel::Monochrome);

    /// # Gicisky EPD 2.9" (black/white/red)
    pub const EPD_29_BWR: Self = Self::new(0x32, "EPD 29 BWR", 296, 128, ColorModel::ThreeColor);

    /// # Gicisky EPD 4.2" (black/white)
    pub const EPD_42_BW: Self = Self::new(0x48, "EPD 42 BW", 400, 300, ColorModel::Monochrome);

    /// # Gicisky EPD 4.2" (black/white/red)
    pub const EPD_42_BWR: Self = Self::new(0x4B, "EPD 42 BWR", 400, 300, ColorModel::ThreeColor);

    /// Bytes in one bit-plane.
    #[inline]
    pub fn plane_bytes(&self) -> usize {
        (self.width * self.height).div_ceil(8)
    }

    /// Total encoded frame length in bytes.
    #[inline]
    pub fn frame_bytes(&self) -> usize {
        self.plane_bytes() * self.color_model.planes()
    }

    /// Number of chunks a full frame is split into.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.frame_bytes().div_ceil(self.chunk_size.max(1))
    }
}

/// Read-only table of supported labels, keyed by model id.
///
/// Built once at startup and passed by reference into the components that
/// need it.
#[derive(Debug, Clone)]
pub struct Catalog {
    profiles: Vec<DeviceProfile>,
}

impl Catalog {
    /// The built-in Gicisky catalog.
    pub fn builtin() -> Self {
        Self {
            profiles: vec![
                DeviceProfile::TFT_21_BW,
                DeviceProfile::EPD_21_BWR,
                DeviceProfile::EPD_29_BW,
                DeviceProfile::EPD_29_BWR,
                DeviceProfile::EPD_42_BW,
                DeviceProfile::EPD_42_BWR,
            ],
        }
    }

    /// Build a catalog from explicit profiles (tests, custom hardware).
    pub fn from_profiles(profiles: Vec<DeviceProfile>) -> Self {
        Self { profiles }
    }

    /// Find the profile for a model id.
    pub fn lookup(&self, model_id: u8) -> Result<&DeviceProfile, EtiquetaError> {
        self.profiles
            .iter()
            .find(|p| p.model_id == model_id)
            .ok_or(EtiquetaError::UnknownModel(model_id))
    }

    /// All profiles, in table order.
    pub fn profiles(&self) -> &[DeviceProfile] {
        &self.profiles
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Parse a model id written as decimal (`11`) or hex (`0x0B`).
pub fn parse_model_id(s: &str) -> Result<u8, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16)
    } else {
        s.parse::<u8>()
    };
    parsed.map_err(|_| format!("Invalid model id '{}'. Use decimal or 0xNN", s))
}

// ============================================================================
// TESTS
// ============================================================================
