//! # Simulated Label
//!
//! An in-process [`LinkAdapter`] that behaves like Gicisky firmware: it
//! answers the handshake, requests image parts in order and applies the
//! frame only once every byte has arrived.
//!
//! Faults can be injected per label (refused connections, nacks, silent
//! replies, a dropped link at a given part) and every write is recorded, so
//! tests can check exactly what went over the air.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::link::{Channel, LinkAdapter, LinkConnection, LinkError};
use crate::device::DeviceProfile;
use crate::device::discovery::MANUFACTURER_ID;
use crate::error::EncodingError;
use crate::protocol::packet::{self, CMD_BEGIN_IMAGE, CMD_SIZE, CMD_START, PART_HEADER_LEN};
use crate::protocol::{EncodedFrame, decode};
use crate::render::Canvas;

/// Largest packet the firmware accepts (`01 F4 00`).
pub const FIRMWARE_MAX_PACKET: u16 = 244;

/// Misbehavior to inject.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Refuse every connection attempt.
    pub refuse_connect: bool,
    /// Reply to the start command with these bytes instead of `01 F4 00`.
    pub start_reply: Option<Vec<u8>>,
    /// Re-request part `k` this many times before accepting it.
    pub nack_parts: HashMap<u32, u32>,
    /// Re-request every part forever.
    pub always_nack: bool,
    /// Swallow the reply to part `k` this many times.
    pub silent_parts: HashMap<u32, u32>,
    /// Drop the link right after part `k` is written.
    pub disconnect_at_part: Option<u32>,
    /// Delay every reply.
    pub reply_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct LabelState {
    faults: FaultPlan,
    writes: Vec<(Channel, Vec<u8>)>,
    image_parts: Vec<u32>,
    out_of_order: usize,
    connects: usize,
    disconnects: usize,
    active: usize,
    max_active: usize,
    displayed: Option<Vec<u8>>,
}

/// A single simulated label. Cloning shares the underlying device.
#[derive(Debug, Clone)]
pub struct SimulatedLabel {
    profile: DeviceProfile,
    state: Arc<Mutex<LabelState>>,
}

impl SimulatedLabel {
    pub fn new(profile: DeviceProfile) -> Self {
        Self::with_faults(profile, FaultPlan::default())
    }

    pub fn with_faults(profile: DeviceProfile, faults: FaultPlan) -> Self {
        Self {
            profile,
            state: Arc::new(Mutex::new(LabelState {
                faults,
                ..LabelState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LabelState> {
        // a poisoned lock only means a test panicked mid-write
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Replace the fault plan.
    pub fn set_faults(&self, faults: FaultPlan) {
        self.lock().faults = faults;
    }

    /// Manufacturer id and data this label advertises.
    pub fn advertisement(&self, battery_decivolts: u8, firmware: u16) -> (u16, Vec<u8>) {
        let [hi, lo] = firmware.to_be_bytes();
        (
            MANUFACTURER_ID,
            vec![self.profile.model_id, battery_decivolts, hi, lo, 0x00],
        )
    }

    /// Every write, in order.
    pub fn writes(&self) -> Vec<(Channel, Vec<u8>)> {
        self.lock().writes.clone()
    }

    /// Part indices of image writes, in order.
    pub fn image_parts(&self) -> Vec<u32> {
        self.lock().image_parts.clone()
    }

    /// Image writes that skipped ahead of the part the device asked for.
    pub fn out_of_order_writes(&self) -> usize {
        self.lock().out_of_order
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    /// Highest number of simultaneously open connections seen.
    pub fn max_concurrent_connections(&self) -> usize {
        self.lock().max_active
    }

    /// Frame bytes currently shown, if a transfer ever completed.
    pub fn displayed_frame(&self) -> Option<Vec<u8>> {
        self.lock().displayed.clone()
    }

    /// Decode the displayed frame into what the panel shows.
    pub fn displayed_canvas(&self) -> Option<Result<Canvas, EncodingError>> {
        let bytes = self.displayed_frame()?;
        let frame = EncodedFrame::from_bytes(bytes, self.profile.color_model.planes());
        Some(decode(&frame, &self.profile))
    }
}

#[async_trait]
impl LinkAdapter for SimulatedLabel {
    async fn connect(&self, address: &str) -> Result<Box<dyn LinkConnection>, LinkError> {
        let mut state = self.lock();
        if state.faults.refuse_connect {
            return Err(LinkError::Unreachable(format!("{} did not respond", address)));
        }
        state.connects += 1;
        state.active += 1;
        state.max_active = state.max_active.max(state.active);
        tracing::debug!(address, "simulated label connected");

        Ok(Box::new(SimulatedConnection {
            label: Arc::clone(&self.state),
            replies: VecDeque::new(),
            buffer: Vec::new(),
            expected_len: 0,
            next_part: 0,
            dropped: false,
            closed: false,
        }))
    }
}

/// Routes connections to simulated labels by address.
#[derive(Debug, Clone, Default)]
pub struct SimulatedNetwork {
    labels: HashMap<String, SimulatedLabel>,
}

impl SimulatedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, address: impl Into<String>, label: SimulatedLabel) {
        self.labels.insert(address.into(), label);
    }

    pub fn get(&self, address: &str) -> Option<&SimulatedLabel> {
        self.labels.get(address)
    }

    pub fn labels(&self) -> impl Iterator<Item = (&String, &SimulatedLabel)> {
        self.labels.iter()
    }
}

#[async_trait]
impl LinkAdapter for SimulatedNetwork {
    async fn connect(&self, address: &str) -> Result<Box<dyn LinkConnection>, LinkError> {
        match self.labels.get(address) {
            Some(label) => label.connect(address).await,
            None => Err(LinkError::Unreachable(format!("no label at {}", address))),
        }
    }
}

struct SimulatedConnection {
    label: Arc<Mutex<LabelState>>,
    replies: VecDeque<Vec<u8>>,
    buffer: Vec<u8>,
    expected_len: usize,
    next_part: u32,
    dropped: bool,
    closed: bool,
}

impl SimulatedConnection {
    fn lock(&self) -> MutexGuard<'_, LabelState> {
        self.label.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn command(&mut self, data: &[u8]) {
        match data.first().copied() {
            Some(CMD_START) => {
                let reply = self
                    .lock()
                    .faults
                    .start_reply
                    .clone()
                    .unwrap_or_else(|| packet::start_reply(FIRMWARE_MAX_PACKET));
                self.replies.push_back(reply);
            }
            Some(CMD_SIZE) if data.len() >= 5 => {
                self.expected_len = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
                self.buffer.clear();
                self.replies.push_back(vec![CMD_SIZE]);
            }
            Some(CMD_BEGIN_IMAGE) => {
                self.next_part = 0;
                self.replies.push_back(packet::part_reply(0));
            }
            _ => {
                tracing::debug!(rx = %packet::hex(data), "simulated label ignored command");
            }
        }
    }

    fn image(&mut self, data: &[u8]) {
        if data.len() < PART_HEADER_LEN {
            return;
        }
        let part = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let payload = &data[PART_HEADER_LEN..];

        let mut state = self.label.lock().unwrap_or_else(|e| e.into_inner());
        state.image_parts.push(part);
        if part > self.next_part {
            state.out_of_order += 1;
        }

        if state.faults.disconnect_at_part == Some(part) {
            drop(state);
            self.dropped = true;
            return;
        }

        if let Some(remaining) = state.faults.silent_parts.get_mut(&part) {
            if *remaining > 0 {
                *remaining -= 1;
                return;
            }
        }

        let nack = state.faults.always_nack
            || match state.faults.nack_parts.get_mut(&part) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
        if nack || part != self.next_part {
            let wanted = self.next_part;
            drop(state);
            self.replies.push_back(packet::part_reply(wanted));
            return;
        }

        self.buffer.extend_from_slice(payload);
        self.next_part += 1;
        if self.buffer.len() >= self.expected_len {
            state.displayed = Some(std::mem::take(&mut self.buffer));
            drop(state);
            self.replies.push_back(packet::complete_reply());
        } else {
            drop(state);
            self.replies.push_back(packet::part_reply(self.next_part));
        }
    }
}

#[async_trait]
impl LinkConnection for SimulatedConnection {
    async fn write(&mut self, channel: Channel, data: &[u8]) -> Result<(), LinkError> {
        if self.dropped || self.closed {
            return Err(LinkError::Disconnected);
        }
        self.lock().writes.push((channel, data.to_vec()));
        match channel {
            Channel::Command => self.command(data),
            Channel::Image => self.image(data),
        }
        Ok(())
    }

    async fn notification(&mut self) -> Result<Vec<u8>, LinkError> {
        let delay = self.lock().faults.reply_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reply) = self.replies.pop_front() {
            return Ok(reply);
        }
        if self.dropped || self.closed {
            return Err(LinkError::Disconnected);
        }
        // nothing queued: the device stays silent until the caller gives up
        std::future::pending::<()>().await;
        Err(LinkError::Disconnected)
    }

    async fn disconnect(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.lock();
        state.disconnects += 1;
        state.active = state.active.saturating_sub(1);
    }
}

impl Drop for SimulatedConnection {
    fn drop(&mut self) {
        if !self.closed {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_firmware_handshake() {
        let label = SimulatedLabel::new(DeviceProfile::EPD_29_BW);
        let mut conn = label.connect("AA:BB:CC:DD:EE:FF").await.unwrap();

        conn.write(Channel::Command, &packet::start()).await.unwrap();
        assert_eq!(conn.notification().await.unwrap(), vec![0x01, 0xF4, 0x00]);
        conn.write(Channel::Command, &packet::size(4)).await.unwrap();
        assert_eq!(conn.notification().await.unwrap(), vec![0x02]);
        conn.write(Channel::Command, &packet::begin_image()).await.unwrap();
        assert_eq!(conn.notification().await.unwrap(), packet::part_reply(0));

        conn.write(Channel::Image, &packet::image_packet(0, &[1, 2]))
            .await
            .unwrap();
        assert_eq!(conn.notification().await.unwrap(), packet::part_reply(1));
        conn.write(Channel::Image, &packet::image_packet(1, &[3, 4]))
            .await
            .unwrap();
        assert_eq!(conn.notification().await.unwrap(), packet::complete_reply());
        assert_eq!(label.displayed_frame(), Some(vec![1, 2, 3, 4]));

        conn.disconnect().await;
        assert_eq!(label.disconnects(), 1);
        assert!(conn.write(Channel::Command, &[0x01]).await.is_err());
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let label = SimulatedLabel::with_faults(
            DeviceProfile::EPD_29_BW,
            FaultPlan {
                refuse_connect: true,
                ..FaultPlan::default()
            },
        );
        assert!(matches!(
            label.connect("x").await,
            Err(LinkError::Unreachable(_))
        ));
        assert_eq!(label.connects(), 0);
    }

    #[tokio::test]
    async fn test_network_routes_by_address() {
        let mut net = SimulatedNetwork::new();
        net.add("A", SimulatedLabel::new(DeviceProfile::EPD_29_BW));
        assert!(net.connect("A").await.is_ok());
        assert!(net.connect("B").await.is_err());
        assert_eq!(net.get("A").unwrap().connects(), 1);
    }

    #[test]
    fn test_advertisement_parses() {
        let label = SimulatedLabel::new(DeviceProfile::EPD_42_BWR);
        let (id, data) = label.advertisement(29, 0x0107);
        let adv = crate::device::parse_advertisement(id, &data).unwrap();
        assert_eq!(adv.model_id, 0x4B);
        assert_eq!(adv.firmware, 0x0107);
    }
}
