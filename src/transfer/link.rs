//! # Link Adapter
//!
//! The boundary between the transfer logic and the radio. The core never
//! performs transport I/O itself: a BLE stack (or the in-process
//! [`SimulatedLabel`](super::simulator::SimulatedLabel)) implements these
//! traits and is injected into the driver.
//!
//! A connection exposes the two GATT characteristics of the label service:
//! commands go to [`Channel::Command`], image packets to [`Channel::Image`],
//! and device replies arrive as notifications on the command channel.
//! Adapters are free to split a write into MTU-sized GATT writes.

use async_trait::async_trait;
use thiserror::Error;

/// Characteristic a write is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Command,
    Image,
}

/// Transport-level failures reported by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The device could not be reached or refused the connection.
    #[error("device unreachable: {0}")]
    Unreachable(String),

    /// The device services do not match the label service layout.
    #[error("services missing: {0}")]
    ServicesMissing(String),

    /// The link dropped.
    #[error("disconnected")]
    Disconnected,

    /// A write was not accepted by the stack.
    #[error("write failed: {0}")]
    Write(String),
}

/// Opens connections to labels by address.
#[async_trait]
pub trait LinkAdapter: Send + Sync {
    /// Connect and subscribe to notifications.
    async fn connect(&self, address: &str) -> Result<Box<dyn LinkConnection>, LinkError>;
}

/// A live connection to one label.
#[async_trait]
pub trait LinkConnection: Send {
    /// Write bytes to a characteristic.
    async fn write(&mut self, channel: Channel, data: &[u8]) -> Result<(), LinkError>;

    /// Wait for the next notification.
    ///
    /// Returns [`LinkError::Disconnected`] once the link drops. The caller
    /// bounds the wait with its own timeout.
    async fn notification(&mut self) -> Result<Vec<u8>, LinkError>;

    /// Unsubscribe and close. Must be safe to call on a dropped link.
    async fn disconnect(&mut self);
}
