//! Image elements: fetching and color reduction.
//!
//! Fetching is the only asynchronous step of a render. [`ImageLoader`] runs
//! as a pre-pass over the payload and stores decoded images on the elements;
//! the composer itself stays synchronous.

use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, imageops::FilterType};

use super::canvas::Sprite;
use crate::device::ColorModel;
use crate::error::EtiquetaError;
use crate::payload::{Color, PayloadElement, Rotation};

/// Luminance midpoint: at or above is white, below is ink.
pub const LUMINANCE_THRESHOLD: u8 = 128;

/// Alpha below this is transparent.
pub const ALPHA_THRESHOLD: u8 = 128;

/// How much the red channel must exceed green and blue for dark ink to be red.
const RED_DOMINANCE: i16 = 64;

/// Fetches images referenced by `dlimg` elements.
///
/// If the HTTP client cannot be built, local paths still load and every URL
/// fails with the build error.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    client: Result<reqwest::Client, String>,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new(Duration::from_secs(10)).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "image downloads disabled");
            Self {
                client: Err(e.to_string()),
            }
        })
    }
}

impl ImageLoader {
    /// Loader whose downloads give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, EtiquetaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EtiquetaError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client: Ok(client) })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client: Ok(client) }
    }

    /// Fetch and decode one image from a URL or a local path.
    pub async fn fetch(&self, source: &str) -> Result<DynamicImage, EtiquetaError> {
        let bytes = if source.starts_with("http://") || source.starts_with("https://") {
            let client = self.client.as_ref().map_err(|e| {
                EtiquetaError::Asset(format!("Failed to download {}: {}", source, e))
            })?;
            let response = client
                .get(source)
                .send()
                .await
                .map_err(|e| EtiquetaError::Asset(format!("Failed to download {}: {}", source, e)))?;
            if !response.status().is_success() {
                return Err(EtiquetaError::Asset(format!(
                    "Failed to download {}: HTTP {}",
                    source,
                    response.status()
                )));
            }
            response
                .bytes()
                .await
                .map_err(|e| EtiquetaError::Asset(format!("Failed to read {}: {}", source, e)))?
                .to_vec()
        } else {
            let path = source.strip_prefix("file://").unwrap_or(source);
            tokio::fs::read(path)
                .await
                .map_err(|e| EtiquetaError::Asset(format!("Failed to read {}: {}", path, e)))?
        };

        image::load_from_memory(&bytes)
            .map_err(|e| EtiquetaError::Asset(format!("Failed to decode {}: {}", source, e)))
    }

    /// Resolve every unresolved image element in place.
    ///
    /// Failures are logged and leave the element unresolved; the composer
    /// then skips it with a warning. Returns the number of failures.
    pub async fn resolve(&self, elements: &mut [PayloadElement]) -> usize {
        let mut failures = 0;
        for element in elements.iter_mut() {
            let PayloadElement::Image(img) = element else {
                continue;
            };
            if img.resolved.is_some() {
                continue;
            }
            match self.fetch(&img.source).await {
                Ok(decoded) => {
                    tracing::debug!(
                        source = %img.source,
                        width = decoded.width(),
                        height = decoded.height(),
                        "image resolved"
                    );
                    img.resolved = Some(Arc::new(decoded));
                }
                Err(e) => {
                    tracing::warn!(source = %img.source, error = %e, "image unavailable");
                    failures += 1;
                }
            }
        }
        failures
    }
}

/// Resize to the requested box. With one side given, the other follows the
/// aspect ratio.
pub fn resize(img: &DynamicImage, width: Option<u32>, height: Option<u32>) -> DynamicImage {
    let (w, h) = (img.width().max(1), img.height().max(1));
    let target = match (width, height) {
        (None, None) => return img.clone(),
        (Some(tw), Some(th)) => (tw, th),
        (Some(tw), None) => (tw, ((tw as u64 * h as u64) / w as u64) as u32),
        (None, Some(th)) => (((th as u64 * w as u64) / h as u64) as u32, th),
    };
    let target = (target.0.max(1), target.1.max(1));
    if target == (img.width(), img.height()) {
        return img.clone();
    }
    img.resize_exact(target.0, target.1, FilterType::Lanczos3)
}

/// Rotate clockwise.
pub fn rotate(img: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::R0 => img,
        Rotation::R90 => img.rotate90(),
        Rotation::R180 => img.rotate180(),
        Rotation::R270 => img.rotate270(),
    }
}

/// Reduce one RGBA pixel to the label palette. `None` is transparent.
pub fn reduce_pixel(rgba: [u8; 4], model: ColorModel) -> Option<Color> {
    let [r, g, b, a] = rgba;
    if a < ALPHA_THRESHOLD {
        return None;
    }
    let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
    if luma >= LUMINANCE_THRESHOLD as u32 {
        return Some(Color::White);
    }
    let red_lead = r as i16 - g.max(b) as i16;
    if model.has_red() && red_lead >= RED_DOMINANCE {
        Some(Color::Red)
    } else {
        Some(Color::Black)
    }
}

/// Convert a decoded image into a palette sprite: resize, rotate, reduce.
pub fn image_sprite(
    img: &DynamicImage,
    width: Option<u32>,
    height: Option<u32>,
    rotation: Rotation,
    model: ColorModel,
) -> Sprite {
    let prepared = rotate(resize(img, width, height), rotation).to_rgba8();
    let (w, h) = (prepared.width() as usize, prepared.height() as usize);
    let mut sprite = Sprite::new(w, h);
    for (x, y, px) in prepared.enumerate_pixels() {
        sprite.set(x as usize, y as usize, reduce_pixel(px.0, model));
    }
    sprite
}
