//! # Session Registry
//!
//! At most one live transfer per device. Labels cannot multiplex writes, so
//! a second request for a busy device is either rejected with
//! [`TransferFailure::Busy`] or queued behind the live one, per
//! [`BusyPolicy`]. Different devices never wait on each other.
//!
//! Each device slot is a one-permit semaphore. Tokio semaphores are fair,
//! so queued requests run in arrival order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};

use super::session::TransferState;
use crate::error::TransferFailure;

/// What to do when a device already has a live transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Fail immediately with `Busy`.
    #[default]
    Reject,
    /// Wait until the live transfer ends.
    Queue,
}

#[derive(Debug)]
struct Slot {
    gate: Arc<Semaphore>,
    state: watch::Sender<TransferState>,
}

impl Slot {
    fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(1)),
            state: watch::channel(TransferState::Idle).0,
        }
    }
}

/// Exclusive right to transfer to one device. Released on drop.
#[derive(Debug)]
pub struct SessionLease {
    device_id: String,
    slot: Arc<Slot>,
    _permit: OwnedSemaphorePermit,
}

impl SessionLease {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Sender the driver publishes state changes to.
    pub fn observer(&self) -> &watch::Sender<TransferState> {
        &self.slot.state
    }

    pub fn state(&self) -> TransferState {
        self.slot.state.borrow().clone()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        tracing::debug!(device = %self.device_id, state = %*self.slot.state.borrow(), "session released");
    }
}

/// Device id → slot.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    policy: BusyPolicy,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl SessionRegistry {
    pub fn new(policy: BusyPolicy) -> Self {
        Self {
            policy,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> BusyPolicy {
        self.policy
    }

    fn slot(&self, device_id: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            slots
                .entry(device_id.to_string())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    fn existing(&self, device_id: &str) -> Option<Arc<Slot>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(device_id).cloned()
    }

    /// Claim the device using the registry's policy.
    pub async fn acquire(&self, device_id: &str) -> Result<SessionLease, TransferFailure> {
        self.acquire_with(device_id, self.policy).await
    }

    /// Claim the device with an explicit policy.
    pub async fn acquire_with(
        &self,
        device_id: &str,
        policy: BusyPolicy,
    ) -> Result<SessionLease, TransferFailure> {
        let slot = self.slot(device_id);
        let gate = Arc::clone(&slot.gate);

        let permit = match policy {
            BusyPolicy::Reject => gate.try_acquire_owned().map_err(|_| {
                tracing::info!(device = device_id, "transfer rejected, device busy");
                TransferFailure::Busy(device_id.to_string())
            })?,
            BusyPolicy::Queue => {
                if gate.available_permits() == 0 {
                    tracing::info!(device = device_id, "transfer queued behind live session");
                }
                gate.acquire_owned()
                    .await
                    .map_err(|_| TransferFailure::Busy(device_id.to_string()))?
            }
        };

        slot.state.send_replace(TransferState::Idle);
        Ok(SessionLease {
            device_id: device_id.to_string(),
            slot,
            _permit: permit,
        })
    }

    /// Whether a lease is currently held for the device.
    pub fn is_busy(&self, device_id: &str) -> bool {
        self.existing(device_id)
            .is_some_and(|slot| slot.gate.available_permits() == 0)
    }

    /// State of the device's current (or most recent) session.
    pub fn state(&self, device_id: &str) -> Option<TransferState> {
        self.existing(device_id)
            .map(|slot| slot.state.borrow().clone())
    }

    /// Watch the device's session state. `None` until the device is first claimed.
    pub fn subscribe(&self, device_id: &str) -> Option<watch::Receiver<TransferState>> {
        self.existing(device_id).map(|slot| slot.state.subscribe())
    }

    /// Drop the slot of an idle device (e.g. one removed from the network).
    ///
    /// Returns `Err(Busy)` while a session is live or queued, `Ok(false)` when
    /// the device was unknown.
    pub fn forget(&self, device_id: &str) -> Result<bool, TransferFailure> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = slots.get(device_id) else {
            return Ok(false);
        };
        // held by a lease or a waiter in acquire_with
        if Arc::strong_count(slot) > 1 || slot.gate.available_permits() == 0 {
            return Err(TransferFailure::Busy(device_id.to_string()));
        }
        slots.remove(device_id);
        tracing::debug!(device = device_id, "session slot forgotten");
        Ok(true)
    }

    /// Number of devices with a slot.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
