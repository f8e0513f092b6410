//! # Device Module
//!
//! Label hardware descriptions and advertisement decoding.
//!
//! ## Modules
//!
//! - [`catalog`]: Capability table (model id → profile)
//! - [`discovery`]: Manufacturer-data parsing

pub mod catalog;
pub mod discovery;

pub use catalog::{Catalog, ColorModel, DeviceProfile};
pub use discovery::{Advertisement, parse_advertisement};
