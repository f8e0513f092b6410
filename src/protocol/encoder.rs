//! # Pixel Encoder
//!
//! Packs a palette canvas into the label's native bit-planes.
//!
//! ## Layout
//!
//! Each plane is `ceil(width × height / 8)` bytes: pixels row-major, MSB
//! first, packed continuously across rows. Only the last byte of a plane is
//! padded (with zeros). Planes are concatenated in table order.
//!
//! ```text
//! Plane 0 (luminance):   bit 1 = light          White=1  Black=0  Red=0
//! Plane 1 (red channel): bit 1 = red channel on White=1  Black=0  Red=1
//! ```
//!
//! Ink always clears bits. A red pixel clears plane 0 only, so the red
//! channel plane of a red-on-white image stays all ones.

use crate::device::{ColorModel, DeviceProfile};
use crate::error::EncodingError;
use crate::payload::Color;
use crate::render::Canvas;

/// One bit-plane: which colors set its bit.
#[derive(Debug, Clone, Copy)]
pub struct PlaneLayout {
    pub name: &'static str,
    lit: fn(Color) -> bool,
}

impl PlaneLayout {
    #[inline]
    pub fn is_lit(&self, color: Color) -> bool {
        (self.lit)(color)
    }
}

fn light(c: Color) -> bool {
    c == Color::White
}

fn red_channel(c: Color) -> bool {
    matches!(c, Color::White | Color::Red)
}

const LUMINANCE: PlaneLayout = PlaneLayout {
    name: "luminance",
    lit: light,
};

const RED_CHANNEL: PlaneLayout = PlaneLayout {
    name: "red",
    lit: red_channel,
};

const MONOCHROME_PLANES: &[PlaneLayout] = &[LUMINANCE];
const THREE_COLOR_PLANES: &[PlaneLayout] = &[LUMINANCE, RED_CHANNEL];

/// Plane table for a color model.
pub fn plane_layout(model: ColorModel) -> &'static [PlaneLayout] {
    match model {
        ColorModel::Monochrome => MONOCHROME_PLANES,
        ColorModel::ThreeColor => THREE_COLOR_PLANES,
    }
}

/// Device-native frame bytes. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    bytes: Vec<u8>,
    planes: usize,
    plane_length: usize,
}

impl EncodedFrame {
    /// Wrap raw frame bytes (e.g. received by a simulated label).
    pub fn from_bytes(bytes: Vec<u8>, planes: usize) -> Self {
        let plane_length = if planes == 0 { 0 } else { bytes.len() / planes };
        Self {
            bytes,
            planes,
            plane_length,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn planes(&self) -> usize {
        self.planes
    }

    pub fn plane_length(&self) -> usize {
        self.plane_length
    }

    /// Bytes of one plane, `None` past the last plane.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        (index < self.planes)
            .then(|| &self.bytes[index * self.plane_length..(index + 1) * self.plane_length])
    }
}

/// Encode a canvas for a profile.
///
/// Fails only when the canvas does not have the profile's dimensions.
pub fn encode(canvas: &Canvas, profile: &DeviceProfile) -> Result<EncodedFrame, EncodingError> {
    if canvas.width() != profile.width || canvas.height() != profile.height {
        return Err(EncodingError::DimensionMismatch {
            canvas_width: canvas.width(),
            canvas_height: canvas.height(),
            width: profile.width,
            height: profile.height,
        });
    }

    let layout = plane_layout(profile.color_model);
    let plane_length = profile.plane_bytes();
    let mut bytes = Vec::with_capacity(plane_length * layout.len());

    for plane in layout {
        let mut byte = 0u8;
        let mut bit = 7i8;
        for &px in canvas.pixels() {
            if plane.is_lit(px) {
                byte |= 1 << bit;
            }
            bit -= 1;
            if bit < 0 {
                bytes.push(byte);
                byte = 0;
                bit = 7;
            }
        }
        if bit != 7 {
            bytes.push(byte);
        }
        tracing::trace!(plane = plane.name, bytes = plane_length, "plane packed");
    }

    Ok(EncodedFrame {
        bytes,
        planes: layout.len(),
        plane_length,
    })
}

/// Decode a frame back into a canvas: what the label would display.
pub fn decode(frame: &EncodedFrame, profile: &DeviceProfile) -> Result<Canvas, EncodingError> {
    let expected = profile.frame_bytes();
    if frame.len() != expected {
        return Err(EncodingError::FrameLength {
            expected,
            actual: frame.len(),
        });
    }

    let plane_length = profile.plane_bytes();
    let bit_at = |plane: usize, i: usize| -> bool {
        let byte = frame.bytes[plane * plane_length + i / 8];
        byte & (0x80 >> (i % 8)) != 0
    };

    let count = profile.width * profile.height;
    let pixels = (0..count)
        .map(|i| {
            if bit_at(0, i) {
                Color::White
            } else if profile.color_model.has_red() && bit_at(1, i) {
                Color::Red
            } else {
                Color::Black
            }
        })
        .collect();

    Canvas::from_pixels(profile.width, profile.height, pixels).ok_or(
        EncodingError::FrameLength {
            expected,
            actual: frame.len(),
        },
    )
}
