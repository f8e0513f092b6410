//! Barcode and QR code rasterization.
//!
//! 1D symbologies are encoded with barcoders and come back as a [`Mask`] of
//! bars. QR codes come back as a [`Sprite`] because their quiet zone is
//! painted in its own background color.

use barcoders::sym::codabar::Codabar;
use barcoders::sym::code39::Code39;
use barcoders::sym::code93::Code93;
use barcoders::sym::code128::Code128;
use barcoders::sym::ean8::EAN8;
use barcoders::sym::ean13::EAN13;
use barcoders::sym::tf::TF;
use qrcode::{EcLevel, QrCode};

use super::canvas::{Mask, Sprite};
use crate::payload::{Color, Symbology};

/// Encode data into barcode modules (1 = bar, 0 = space).
pub fn encode_modules(data: &str, symbology: Symbology) -> Result<Vec<u8>, String> {
    let encoded = match symbology {
        // Character set B covers the printable ASCII range.
        Symbology::Code128 => Code128::new(format!("\u{0181}{}", data)).map(|b| b.encode()),
        Symbology::Code39 => Code39::new(data).map(|b| b.encode()),
        Symbology::Code93 => Code93::new(data).map(|b| b.encode()),
        Symbology::Ean13 => EAN13::new(data).map(|b| b.encode()),
        Symbology::Ean8 => EAN8::new(data).map(|b| b.encode()),
        Symbology::Codabar => Codabar::new(data).map(|b| b.encode()),
        Symbology::Itf => TF::interleaved(data).map(|b| b.encode()),
    };
    encoded.map_err(|e| format!("{:?} cannot encode '{}': {:?}", symbology, data, e))
}

/// Rasterize a 1D barcode: `module_width` pixels per module, `height` rows.
pub fn barcode_mask(
    data: &str,
    symbology: Symbology,
    module_width: u32,
    height: u32,
) -> Result<Mask, String> {
    let modules = encode_modules(data, symbology)?;
    let scale = module_width.max(1) as usize;
    let height = height as usize;

    let mut mask = Mask::new(modules.len() * scale, height);
    for (i, &module) in modules.iter().enumerate() {
        if module != 1 {
            continue;
        }
        for dx in 0..scale {
            for y in 0..height {
                mask.set(i * scale + dx, y, true);
            }
        }
    }
    Ok(mask)
}

/// Rasterize a QR code at error-correction level M.
///
/// The sprite is fully opaque: `(modules + 2 × border) × box_size` pixels
/// square, dark modules in `color`, everything else in `bgcolor`.
pub fn qr_sprite(
    data: &str,
    box_size: u32,
    border: u32,
    color: Color,
    bgcolor: Color,
) -> Result<Sprite, String> {
    let code = QrCode::with_error_correction_level(data, EcLevel::M)
        .map_err(|e| format!("QR code generation failed: {}", e))?;

    let cell = box_size.max(1) as usize;
    let border = border as usize;
    let modules = code.width();
    let side = (modules + 2 * border) * cell;

    let mut sprite = Sprite::new(side, side);
    sprite.cells.fill(Some(bgcolor));

    for qy in 0..modules {
        for qx in 0..modules {
            if code[(qx, qy)] != qrcode::Color::Dark {
                continue;
            }
            let x0 = (qx + border) * cell;
            let y0 = (qy + border) * cell;
            for cy in 0..cell {
                for cx in 0..cell {
                    sprite.set(x0 + cx, y0 + cy, Some(color));
                }
            }
        }
    }

    Ok(sprite)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code128_mask() {
        let mask = barcode_mask("Hello", Symbology::Code128, 2, 40).unwrap();
        assert_eq!(mask.height, 40);
        assert_eq!(mask.width % 2, 0);
        assert!(!mask.is_empty());
        // bars run the full height
        let bar_x = (0..mask.width).find(|&x| mask.get(x, 0)).unwrap();
        assert!(mask.get(bar_x, 39));
    }

    #[test]
    fn test_code39_mask() {
        let mask = barcode_mask("ABC123", Symbology::Code39, 1, 10).unwrap();
        assert!(!mask.is_empty());
    }

    #[test]
    fn test_ean13_rejects_letters() {
        assert!(barcode_mask("ABCDEFGHIJKL", Symbology::Ean13, 1, 10).is_err());
    }

    #[test]
    fn test_qr_sprite_size() {
        let sprite = qr_sprite("hello", 3, 2, Color::Red, Color::White).unwrap();
        // "hello" fits a version 1 code: 21 modules
        assert_eq!(sprite.width, (21 + 4) * 3);
        assert_eq!(sprite.width, sprite.height);
        assert!(sprite.cells.iter().all(|c| c.is_some()));
        // quiet zone
        assert_eq!(sprite.cells[0], Some(Color::White));
        // top-left finder pattern corner
        let finder = (2 * 3) * sprite.width + 2 * 3;
        assert_eq!(sprite.cells[finder], Some(Color::Red));
    }
}
