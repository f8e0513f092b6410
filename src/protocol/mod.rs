//! # Gicisky Label Protocol
//!
//! Everything between a composed canvas and the bytes on the link.
//!
//! ## Module Structure
//!
//! - [`encoder`]: Canvas → packed bit-planes (and back)
//! - [`segment`]: Frame → ordered CRC-checked chunks
//! - [`packet`]: Command packets and device reply parsing
//!
//! ## Usage Example
//!
//! ```
//! use etiqueta::device::DeviceProfile;
//! use etiqueta::payload::Color;
//! use etiqueta::protocol::{encoder, segment};
//! use etiqueta::render::Canvas;
//!
//! let profile = DeviceProfile::EPD_29_BWR;
//! let canvas = Canvas::new(profile.width, profile.height, Color::White);
//!
//! let frame = encoder::encode(&canvas, &profile).unwrap();
//! let chunks = segment::segment(&frame, profile.chunk_size).unwrap();
//! assert_eq!(chunks.len(), profile.chunk_count());
//! ```

pub mod encoder;
pub mod packet;
pub mod segment;

pub use encoder::{EncodedFrame, decode, encode};
pub use segment::{Chunk, reassemble, segment};
