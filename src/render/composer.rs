//! # Canvas Composer
//!
//! Paints a [`RenderRequest`] into a [`Canvas`] of the device's dimensions.
//!
//! ## Pipeline
//!
//! ```text
//! RenderRequest
//!     ↓ logical canvas (height×width when rotate is 90/270), filled with background
//!     ↓ elements painted in list order, later ones overwrite earlier ones
//!     ↓ palette restricted to the color model
//!     ↓ global rotation, clockwise
//! Canvas (profile.width × profile.height)
//! ```
//!
//! Composition never fails. Anything that cannot be drawn (an image that did
//! not download, an unknown font, a barcode with invalid data) is recorded
//! as a [`RenderWarning`] and the render continues.

use std::fmt;

use serde::Serialize;

use super::barcode::{barcode_mask, qr_sprite};
use super::canvas::{Canvas, Mask};
use super::icon::IconFont;
use super::image::image_sprite;
use super::text::{FontBook, rasterize_line};
use crate::device::ColorModel;
use crate::payload::{Barcode, Icon, Image, PayloadElement, QrCode, RenderRequest, Text};

/// A non-fatal problem found while composing. `element` is the payload index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderWarning {
    /// An image could not be fetched or decoded; the element was skipped.
    AssetUnavailable { element: usize, source: String },
    /// The font reference is unknown; the built-in font was used.
    UnknownFont { element: usize, font: String },
    /// The icon could not be resolved; a placeholder box was drawn.
    UnknownIcon { element: usize, glyph: String },
    /// The data cannot be encoded; the element was skipped.
    InvalidBarcode { element: usize, reason: String },
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderWarning::AssetUnavailable { element, source } => {
                write!(f, "element {}: image '{}' unavailable", element, source)
            }
            RenderWarning::UnknownFont { element, font } => {
                write!(f, "element {}: unknown font '{}'", element, font)
            }
            RenderWarning::UnknownIcon { element, glyph } => {
                write!(f, "element {}: unknown icon '{}'", element, glyph)
            }
            RenderWarning::InvalidBarcode { element, reason } => {
                write!(f, "element {}: {}", element, reason)
            }
        }
    }
}

/// Result of a render: the canvas plus whatever was skipped along the way.
#[derive(Debug, Clone)]
pub struct Composition {
    pub canvas: Canvas,
    pub warnings: Vec<RenderWarning>,
}

/// Stateless renderer holding the font assets.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    fonts: FontBook,
    icons: Option<IconFont>,
}

impl Composer {
    /// Composer with only the built-in bitmap font and no icon font.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fonts(mut self, fonts: FontBook) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn with_icons(mut self, icons: IconFont) -> Self {
        self.icons = Some(icons);
        self
    }

    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    /// Compose a request. Identical requests produce identical canvases.
    pub fn compose(&self, request: &RenderRequest) -> Composition {
        let profile = &request.profile;
        let (width, height) = if request.rotate.swaps_axes() {
            (profile.height, profile.width)
        } else {
            (profile.width, profile.height)
        };

        let mut canvas = Canvas::new(width, height, request.background);
        let mut warnings = Vec::new();

        for (index, element) in request.elements.iter().enumerate() {
            match element {
                PayloadElement::Text(text) => {
                    self.paint_text(&mut canvas, index, text, &mut warnings)
                }
                PayloadElement::Barcode(barcode) => {
                    paint_barcode(&mut canvas, index, barcode, &mut warnings)
                }
                PayloadElement::Icon(icon) => {
                    self.paint_icon(&mut canvas, index, icon, &mut warnings)
                }
                PayloadElement::Image(img) => paint_image(
                    &mut canvas,
                    index,
                    img,
                    profile.color_model,
                    &mut warnings,
                ),
                PayloadElement::QrCode(qr) => paint_qr(&mut canvas, index, qr, &mut warnings),
            }
        }

        canvas.quantize(profile.color_model);
        let canvas = canvas.rotate(request.rotate);

        for warning in &warnings {
            tracing::warn!(model = profile.name, "{}", warning);
        }

        Composition { canvas, warnings }
    }

    fn paint_text(
        &self,
        canvas: &mut Canvas,
        index: usize,
        text: &Text,
        warnings: &mut Vec<RenderWarning>,
    ) {
        let font = match text.font.as_deref() {
            None => None,
            Some(name) => match self.fonts.get(name) {
                Some(font) => Some(font),
                None => {
                    warnings.push(RenderWarning::UnknownFont {
                        element: index,
                        font: name.to_string(),
                    });
                    None
                }
            },
        };

        let line_height = text.size.max(1) as i32;
        for (i, line) in text.value.split('\n').enumerate() {
            let mask = rasterize_line(line, text.size, text.spacing, font);
            let y = text.y.saturating_add(line_height.saturating_mul(i as i32));
            canvas.draw_mask(&mask, text.x, y, text.color);
        }
    }

    fn paint_icon(
        &self,
        canvas: &mut Canvas,
        index: usize,
        icon: &Icon,
        warnings: &mut Vec<RenderWarning>,
    ) {
        let mask = self
            .icons
            .as_ref()
            .and_then(|font| font.rasterize(&icon.glyph, icon.size));
        let mask = match mask {
            Some(mask) => mask,
            None => {
                warnings.push(RenderWarning::UnknownIcon {
                    element: index,
                    glyph: icon.glyph.clone(),
                });
                let side = icon.size as usize;
                Mask::placeholder(side, side)
            }
        };
        canvas.draw_mask(&mask, icon.x, icon.y, icon.color);
    }
}

fn paint_barcode(
    canvas: &mut Canvas,
    index: usize,
    barcode: &Barcode,
    warnings: &mut Vec<RenderWarning>,
) {
    match barcode_mask(
        &barcode.data,
        barcode.symbology,
        barcode.module_width,
        barcode.height,
    ) {
        Ok(mask) => canvas.draw_mask(&mask, barcode.x, barcode.y, barcode.color),
        Err(reason) => warnings.push(RenderWarning::InvalidBarcode {
            element: index,
            reason,
        }),
    }
}

fn paint_qr(canvas: &mut Canvas, index: usize, qr: &QrCode, warnings: &mut Vec<RenderWarning>) {
    match qr_sprite(&qr.data, qr.box_size, qr.border, qr.color, qr.bgcolor) {
        Ok(sprite) => canvas.draw_sprite(&sprite, qr.x, qr.y),
        Err(reason) => warnings.push(RenderWarning::InvalidBarcode {
            element: index,
            reason,
        }),
    }
}

fn paint_image(
    canvas: &mut Canvas,
    index: usize,
    img: &Image,
    model: ColorModel,
    warnings: &mut Vec<RenderWarning>,
) {
    let Some(decoded) = img.resolved.as_deref() else {
        warnings.push(RenderWarning::AssetUnavailable {
            element: index,
            source: img.source.clone(),
        });
        return;
    };
    let sprite = image_sprite(decoded, img.width, img.height, img.rotate, model);
    canvas.draw_sprite(&sprite, img.x, img.y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceProfile;
    use crate::payload::{Color, Rotation};
    use std::sync::Arc;

    fn request(profile: DeviceProfile) -> RenderRequest {
        RenderRequest::new(profile)
    }

    #[test]
    fn test_blank_canvas_has_device_dimensions() {
        let c = Composer::new().compose(&request(DeviceProfile::EPD_29_BWR));
        assert_eq!((c.canvas.width(), c.canvas.height()), (296, 128));
        assert_eq!(c.canvas.count(Color::White), 296 * 128);
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn test_rotated_canvas_has_device_dimensions() {
        let req = request(DeviceProfile::EPD_29_BWR)
            .rotate(Rotation::R90)
            .element(PayloadElement::Text(Text::new("Hi", 0, 0, 24)));
        let c = Composer::new().compose(&req);
        assert_eq!((c.canvas.width(), c.canvas.height()), (296, 128));
        assert!(c.canvas.count(Color::Black) > 0);
    }

    #[test]
    fn test_out_of_bounds_is_noop() {
        let base = request(DeviceProfile::EPD_21_BWR);
        let outside = base
            .clone()
            .element(PayloadElement::Text(Text::new("far away", 1000, 1000, 24)))
            .element(PayloadElement::QrCode(QrCode::new("x", -500, -500)));
        let composer = Composer::new();
        let a = composer.compose(&base);
        let b = composer.compose(&outside);
        assert_eq!(a.canvas, b.canvas);
        assert!(b.warnings.is_empty());
    }

    #[test]
    fn test_elements_at_coordinate_limit_clip() {
        let base = request(DeviceProfile::EPD_29_BW);
        let edge = base
            .clone()
            .element(PayloadElement::Text(Text::new("Hi\nthere", i32::MAX - 5, 0, 24)))
            .element(PayloadElement::Text(Text::new("Hi", 0, i32::MAX - 5, 24)))
            .element(PayloadElement::QrCode(QrCode::new("x", i32::MAX - 5, i32::MAX - 5)));
        let composer = Composer::new();
        let c = composer.compose(&edge);
        assert_eq!(c.canvas, composer.compose(&base).canvas);
    }

    #[test]
    fn test_later_element_wins() {
        let mut red_box = QrCode::new("overlap", 0, 0);
        red_box.color = Color::Red;
        red_box.bgcolor = Color::Red;
        let mut black_box = red_box.clone();
        black_box.color = Color::Black;
        black_box.bgcolor = Color::Black;

        let req = request(DeviceProfile::EPD_21_BWR)
            .element(PayloadElement::QrCode(red_box.clone()))
            .element(PayloadElement::QrCode(black_box.clone()));
        let c = Composer::new().compose(&req);
        assert_eq!(c.canvas.get(0, 0), Some(Color::Black));

        let req = request(DeviceProfile::EPD_21_BWR)
            .element(PayloadElement::QrCode(black_box))
            .element(PayloadElement::QrCode(red_box));
        let c = Composer::new().compose(&req);
        assert_eq!(c.canvas.get(0, 0), Some(Color::Red));
    }

    #[test]
    fn test_red_becomes_black_on_monochrome() {
        let mut text = Text::new("R", 0, 0, 24);
        text.color = Color::Red;
        let req = request(DeviceProfile::EPD_29_BW)
            .background(Color::Red)
            .element(PayloadElement::Text(text));
        let c = Composer::new().compose(&req);
        assert_eq!(c.canvas.count(Color::Red), 0);
    }

    #[test]
    fn test_unresolved_image_warns() {
        let req = request(DeviceProfile::EPD_29_BW).element(PayloadElement::Image(Image::new(
            "https://example.invalid/a.png",
            0,
            0,
        )));
        let c = Composer::new().compose(&req);
        assert_eq!(c.canvas.count(Color::Black), 0);
        assert!(matches!(
            c.warnings[0],
            RenderWarning::AssetUnavailable { element: 0, .. }
        ));
    }

    #[test]
    fn test_resolved_image_paints() {
        let mut img = Image::new("mem", 5, 5);
        img.resolved = Some(Arc::new(::image::DynamicImage::ImageLuma8(
            ::image::GrayImage::from_pixel(4, 4, ::image::Luma([0])),
        )));
        let req = request(DeviceProfile::EPD_29_BW).element(PayloadElement::Image(img));
        let c = Composer::new().compose(&req);
        assert_eq!(c.canvas.count(Color::Black), 16);
        assert_eq!(c.canvas.get(5, 5), Some(Color::Black));
        assert_eq!(c.canvas.get(9, 9), Some(Color::White));
    }

    #[test]
    fn test_unknown_font_falls_back() {
        let mut text = Text::new("A", 0, 0, 24);
        text.font = Some("nope".into());
        let req = request(DeviceProfile::EPD_29_BW).element(PayloadElement::Text(text));
        let c = Composer::new().compose(&req);
        assert!(c.canvas.count(Color::Black) > 0);
        assert!(matches!(c.warnings[0], RenderWarning::UnknownFont { .. }));
    }

    #[test]
    fn test_unknown_icon_draws_placeholder() {
        let icon = Icon {
            glyph: "mdi:home".into(),
            x: 0,
            y: 0,
            size: 10,
            color: Color::Black,
        };
        let req = request(DeviceProfile::EPD_29_BW).element(PayloadElement::Icon(icon));
        let c = Composer::new().compose(&req);
        // box outline: 4 sides of 10 minus shared corners
        assert_eq!(c.canvas.count(Color::Black), 36);
        assert_eq!(c.warnings.len(), 1);
    }

    #[test]
    fn test_invalid_barcode_skipped() {
        let barcode = Barcode {
            data: "not digits".into(),
            symbology: crate::payload::Symbology::Ean13,
            x: 0,
            y: 0,
            height: 40,
            module_width: 2,
            color: Color::Black,
        };
        let req = request(DeviceProfile::EPD_29_BW).element(PayloadElement::Barcode(barcode));
        let c = Composer::new().compose(&req);
        assert_eq!(c.canvas.count(Color::Black), 0);
        assert!(matches!(c.warnings[0], RenderWarning::InvalidBarcode { .. }));
    }

    #[test]
    fn test_multiline_text() {
        let one = Composer::new().compose(
            &request(DeviceProfile::EPD_29_BW)
                .element(PayloadElement::Text(Text::new("A", 0, 0, 24))),
        );
        let two = Composer::new().compose(
            &request(DeviceProfile::EPD_29_BW)
                .element(PayloadElement::Text(Text::new("A\nA", 0, 0, 24))),
        );
        assert_eq!(
            two.canvas.count(Color::Black),
            2 * one.canvas.count(Color::Black)
        );
    }
}
