//! # Payload Model
//!
//! Declarative description of what to draw on a label.
//!
//! All types derive `Deserialize`, so the same types serve the Rust API and
//! the JSON service call:
//!
//! ```json
//! {
//!   "rotate": 0,
//!   "background": "white",
//!   "payload": [
//!     { "type": "text", "value": "Hello", "x": 10, "y": 10, "size": 40 },
//!     { "type": "qrcode", "data": "https://example.com", "x": 180, "y": 10, "boxsize": 3 }
//!   ]
//! }
//! ```
//!
//! Adding an element type means adding a [`PayloadElement`] variant; the
//! compiler then points at every exhaustive match that needs a handler.

use std::fmt;
use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::device::DeviceProfile;

// ============================================================================
// COLOR
// ============================================================================

/// A label pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Color {
    #[default]
    White,
    Black,
    Red,
}

impl Color {
    /// Parse a color name (`white`, `black`, `red` or their first letter).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "white" | "w" => Some(Color::White),
            "black" | "b" => Some(Color::Black),
            "red" | "r" => Some(Color::Red),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
            Color::Red => "red",
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Color::parse(&s).ok_or_else(|| format!("unknown color '{}'", s))
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.name().to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn black() -> Color {
    Color::Black
}

fn white() -> Color {
    Color::White
}

// ============================================================================
// ROTATION
// ============================================================================

/// Clockwise rotation in quarter turns. Arbitrary angles are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Whether width and height swap under this rotation.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(deg: u16) -> Result<Self, Self::Error> {
        match deg {
            0 => Ok(Rotation::R0),
            90 => Ok(Rotation::R90),
            180 => Ok(Rotation::R180),
            270 => Ok(Rotation::R270),
            other => Err(format!(
                "unsupported rotation {} (use 0, 90, 180 or 270)",
                other
            )),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(r: Rotation) -> Self {
        r.degrees()
    }
}

// ============================================================================
// ELEMENTS
// ============================================================================

fn default_text_size() -> u32 {
    20
}

fn default_barcode_height() -> u32 {
    40
}

fn default_module_width() -> u32 {
    2
}

fn default_icon_size() -> u32 {
    24
}

fn default_box_size() -> u32 {
    2
}

fn default_border() -> u32 {
    1
}

/// One drawable item. Coordinates are absolute canvas positions of the
/// element's top-left corner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayloadElement {
    Text(Text),
    Barcode(Barcode),
    Icon(Icon),
    #[serde(rename = "dlimg", alias = "image")]
    Image(Image),
    #[serde(rename = "qrcode")]
    QrCode(QrCode),
}

impl PayloadElement {
    /// Short tag used in logs and warnings.
    pub fn kind(&self) -> &'static str {
        match self {
            PayloadElement::Text(_) => "text",
            PayloadElement::Barcode(_) => "barcode",
            PayloadElement::Icon(_) => "icon",
            PayloadElement::Image(_) => "dlimg",
            PayloadElement::QrCode(_) => "qrcode",
        }
    }
}

/// Text line(s). `\n` starts a new line `size` pixels lower.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Text {
    pub value: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    /// Line height in pixels.
    #[serde(default = "default_text_size")]
    pub size: u32,
    /// Font reference (file stem in the fonts directory). `None` = built-in.
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default = "black")]
    pub color: Color,
    /// Extra pixels between characters.
    #[serde(default)]
    pub spacing: i32,
}

impl Text {
    pub fn new(value: impl Into<String>, x: i32, y: i32, size: u32) -> Self {
        Self {
            value: value.into(),
            x,
            y,
            size,
            font: None,
            color: Color::Black,
            spacing: 0,
        }
    }
}

/// 1D barcode symbologies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symbology {
    #[default]
    Code128,
    Code39,
    Code93,
    Ean13,
    Ean8,
    Codabar,
    Itf,
}

/// One-dimensional barcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Barcode {
    pub data: String,
    #[serde(default, alias = "code")]
    pub symbology: Symbology,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    /// Bar height in pixels.
    #[serde(default = "default_barcode_height")]
    pub height: u32,
    /// Pixels per module.
    #[serde(default = "default_module_width")]
    pub module_width: u32,
    #[serde(default = "black")]
    pub color: Color,
}

/// Named icon glyph (e.g. `mdi:home`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Icon {
    #[serde(alias = "value")]
    pub glyph: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default = "default_icon_size")]
    pub size: u32,
    #[serde(default = "black")]
    pub color: Color,
}

/// Image downloaded from a URL or read from a local path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    #[serde(alias = "url")]
    pub source: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default, alias = "xsize")]
    pub width: Option<u32>,
    #[serde(default, alias = "ysize")]
    pub height: Option<u32>,
    #[serde(default)]
    pub rotate: Rotation,
    /// Decoded image, filled by [`ImageLoader`](crate::render::ImageLoader).
    #[serde(skip)]
    pub resolved: Option<Arc<DynamicImage>>,
}

impl Image {
    pub fn new(source: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            source: source.into(),
            x,
            y,
            width: None,
            height: None,
            rotate: Rotation::R0,
            resolved: None,
        }
    }
}

/// QR code with configurable module size and quiet zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrCode {
    pub data: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    /// Pixels per module.
    #[serde(default = "default_box_size", alias = "boxsize")]
    pub box_size: u32,
    /// Quiet zone width in modules.
    #[serde(default = "default_border")]
    pub border: u32,
    #[serde(default = "black")]
    pub color: Color,
    #[serde(default = "white")]
    pub bgcolor: Color,
}

impl QrCode {
    pub fn new(data: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            data: data.into(),
            x,
            y,
            box_size: default_box_size(),
            border: default_border(),
            color: Color::Black,
            bgcolor: Color::White,
        }
    }
}

// ============================================================================
// REQUESTS
// ============================================================================

/// Everything needed to compose one frame for one label.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub profile: DeviceProfile,
    pub elements: Vec<PayloadElement>,
    pub rotate: Rotation,
    pub background: Color,
}

impl RenderRequest {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile,
            elements: Vec::new(),
            rotate: Rotation::R0,
            background: Color::White,
        }
    }

    /// Append an element (builder style).
    pub fn element(mut self, element: PayloadElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn rotate(mut self, rotate: Rotation) -> Self {
        self.rotate = rotate;
        self
    }

    pub fn background(mut self, background: Color) -> Self {
        self.background = background;
        self
    }
}

/// Inbound write request as received from the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    #[serde(default)]
    pub rotate: Rotation,
    #[serde(default = "white")]
    pub background: Color,
    pub payload: Vec<PayloadElement>,
}

impl ServiceCall {
    /// Bind this call to a device profile.
    pub fn into_request(self, profile: DeviceProfile) -> RenderRequest {
        RenderRequest {
            profile,
            elements: self.payload,
            rotate: self.rotate,
            background: self.background,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_call() {
        let json = r#"{
            "rotate": 90,
            "background": "red",
            "payload": [
                {"type": "text", "value": "Hi", "x": 1, "y": 2, "size": 30, "font": "ppb"},
                {"type": "barcode", "data": "12345", "code": "code39", "x": 0, "y": 40},
                {"type": "icon", "value": "mdi:home", "x": 5, "y": 5, "size": 32, "color": "r"},
                {"type": "dlimg", "url": "https://example.com/a.png", "x": 0, "y": 0, "xsize": 64, "ysize": 32, "rotate": 180},
                {"type": "qrcode", "data": "hello", "x": 100, "y": 0, "boxsize": 3, "border": 2, "color": "red", "bgcolor": "white"}
            ]
        }"#;
        let call: ServiceCall = serde_json::from_str(json).unwrap();
        assert_eq!(call.rotate, Rotation::R90);
        assert_eq!(call.background, Color::Red);
        assert_eq!(call.payload.len(), 5);

        match &call.payload[0] {
            PayloadElement::Text(t) => {
                assert_eq!(t.size, 30);
                assert_eq!(t.font.as_deref(), Some("ppb"));
                assert_eq!(t.color, Color::Black);
            }
            other => panic!("expected text, got {}", other.kind()),
        }
        match &call.payload[1] {
            PayloadElement::Barcode(b) => assert_eq!(b.symbology, Symbology::Code39),
            other => panic!("expected barcode, got {}", other.kind()),
        }
        match &call.payload[2] {
            PayloadElement::Icon(i) => {
                assert_eq!(i.glyph, "mdi:home");
                assert_eq!(i.color, Color::Red);
            }
            other => panic!("expected icon, got {}", other.kind()),
        }
        match &call.payload[3] {
            PayloadElement::Image(i) => {
                assert_eq!(i.width, Some(64));
                assert_eq!(i.height, Some(32));
                assert_eq!(i.rotate, Rotation::R180);
                assert!(i.resolved.is_none());
            }
            other => panic!("expected image, got {}", other.kind()),
        }
        match &call.payload[4] {
            PayloadElement::QrCode(q) => {
                assert_eq!(q.box_size, 3);
                assert_eq!(q.border, 2);
                assert_eq!(q.color, Color::Red);
            }
            other => panic!("expected qrcode, got {}", other.kind()),
        }
    }

    #[test]
    fn test_defaults() {
        let call: ServiceCall =
            serde_json::from_str(r#"{"payload": [{"type": "qrcode", "data": "x"}]}"#).unwrap();
        assert_eq!(call.rotate, Rotation::R0);
        assert_eq!(call.background, Color::White);
        match &call.payload[0] {
            PayloadElement::QrCode(q) => {
                assert_eq!(q.box_size, 2);
                assert_eq!(q.border, 1);
                assert_eq!(q.bgcolor, Color::White);
            }
            other => panic!("expected qrcode, got {}", other.kind()),
        }
    }

    #[test]
    fn test_rejects_arbitrary_rotation() {
        let err = serde_json::from_str::<ServiceCall>(r#"{"rotate": 45, "payload": []}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_unknown_element_type() {
        let err = serde_json::from_str::<ServiceCall>(
            r#"{"payload": [{"type": "hologram", "x": 0, "y": 0}]}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_unknown_color() {
        let err = serde_json::from_str::<ServiceCall>(r#"{"background": "blue", "payload": []}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_color_parse() {
        assert_eq!(Color::parse("WHITE"), Some(Color::White));
        assert_eq!(Color::parse("b"), Some(Color::Black));
        assert_eq!(Color::parse("r"), Some(Color::Red));
        assert_eq!(Color::parse("green"), None);
    }
}
