//! # Etiqueta - Gicisky E-Paper Label Library
//!
//! Etiqueta renders declarative payloads onto Gicisky electronic shelf
//! labels and pushes them over Bluetooth LE. It provides:
//!
//! - **Rendering**: text, barcodes, icons, images and QR codes composed onto
//!   a canvas sized for the label
//! - **Encoding**: packed bit-planes in the label's native format
//! - **Transfer**: chunked, acknowledged delivery with bounded retries
//! - **Link abstraction**: the BLE stack is injected behind a trait, with a
//!   firmware-faithful simulator for tests
//!
//! ## Quick Start
//!
//! ```
//! use etiqueta::{
//!     device::Catalog,
//!     payload::{PayloadElement, RenderRequest, Text},
//!     protocol,
//!     render::Composer,
//! };
//!
//! let catalog = Catalog::builtin();
//! let profile = catalog.lookup(0x28)?.clone();
//!
//! let request = RenderRequest::new(profile.clone())
//!     .element(PayloadElement::Text(Text::new("Hello", 10, 10, 24)));
//! let composition = Composer::new().compose(&request);
//!
//! let frame = protocol::encode(&composition.canvas, &profile)?;
//! let chunks = protocol::segment(&frame, profile.chunk_size)?;
//! assert_eq!(chunks.len(), profile.chunk_count());
//!
//! # Ok::<(), etiqueta::error::EtiquetaError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`device`] | Capability table and advertisement parsing |
//! | [`payload`] | Render requests and payload elements |
//! | [`render`] | Canvas composition |
//! | [`protocol`] | Pixel encoding, segmentation, wire packets |
//! | [`transfer`] | Transfer state machine, driver and link traits |
//! | [`writer`] | End-to-end pipeline |
//! | [`server`] | HTTP API |
//! | [`config`] | TOML configuration |
//! | [`error`] | Error types |

pub mod config;
pub mod device;
pub mod error;
pub mod payload;
pub mod protocol;
pub mod render;
pub mod server;
pub mod transfer;
pub mod writer;

// Re-exports for convenience
pub use device::{Catalog, DeviceProfile};
pub use error::EtiquetaError;
pub use writer::{LabelWriter, WriteTarget};
