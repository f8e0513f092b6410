//! # Rendering Module
//!
//! Turns a payload into a palette [`Canvas`] sized for one label.
//!
//! ## Modules
//!
//! - [`canvas`]: Pixel buffer, masks, sprites, rotation, PNG preview
//! - [`composer`]: Paints elements in order and collects warnings
//! - [`text`]: Built-in bitmap font and TrueType fonts
//! - [`icon`]: Icon font lookup by name
//! - [`barcode`]: 1D barcodes and QR codes
//! - [`image`]: Image fetching and color reduction
//!
//! ## Usage Example
//!
//! ```
//! use etiqueta::device::DeviceProfile;
//! use etiqueta::payload::{PayloadElement, RenderRequest, Text};
//! use etiqueta::render::Composer;
//!
//! let request = RenderRequest::new(DeviceProfile::EPD_29_BWR)
//!     .element(PayloadElement::Text(Text::new("Hello", 10, 10, 40)));
//!
//! let composition = Composer::new().compose(&request);
//! assert_eq!(composition.canvas.width(), 296);
//! ```

pub mod barcode;
pub mod canvas;
pub mod composer;
pub mod icon;
pub mod image;
pub mod text;

pub use canvas::{Canvas, Mask, Sprite};
pub use composer::{Composer, Composition, RenderWarning};
pub use icon::{IconFont, IconMap};
pub use image::ImageLoader;
pub use text::FontBook;
