//! # Transfer
//!
//! Delivers a segmented frame to one label over an injected link.
//!
//! ## Module Structure
//!
//! - [`session`]: Transfer state machine (pure)
//! - [`driver`]: Runs a session over a [`LinkConnection`], with timeouts and cancellation
//! - [`link`]: The adapter traits a BLE stack implements
//! - [`registry`]: One live session per device
//! - [`simulator`]: Firmware-faithful in-process label

pub mod driver;
pub mod link;
pub mod registry;
pub mod session;
pub mod simulator;

pub use driver::{TransferConfig, TransferDriver, TransferReport};
pub use link::{Channel, LinkAdapter, LinkConnection, LinkError};
pub use registry::{BusyPolicy, SessionLease, SessionRegistry};
pub use session::{TransferSession, TransferState};
pub use simulator::{FaultPlan, SimulatedLabel, SimulatedNetwork};
