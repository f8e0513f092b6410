//! # Transfer State Machine
//!
//! Pure state for one transfer to one label. No I/O happens here: the
//! [`driver`](super::driver) feeds events in and acts on the resulting state.
//!
//! ```text
//!  Idle ──► Connecting ──► Handshaking ──► Sending(0)
//!               │               │              │ written
//!               ▼               ▼              ▼
//!        Failed(Connect) Failed(Protocol)  AwaitingAck(i) ──ack──► Sending(i+1) … Completed
//!                                              │
//!                                              ├─ nack/timeout, retries < max ──► Sending(i)
//!                                              └─ nack/timeout, retries = max ──► Failed(Exhausted)
//!
//!  any live state ──disconnected──► Failed(LinkLost)
//! ```
//!
//! Transitions validate the current state and return `Result` instead of
//! panicking. `Completed` and `Failed` are absorbing.

use std::fmt;

use thiserror::Error;

use crate::error::TransferFailure;
use crate::protocol::Chunk;

/// Resends allowed per chunk before the transfer is aborted.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Where a transfer is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    Connecting,
    Handshaking,
    /// Chunk `i` is about to be written.
    Sending(u32),
    /// Chunk `i` was written; waiting for the device.
    AwaitingAck(u32),
    Completed,
    Failed(TransferFailure),
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Sending(i) => write!(f, "Sending({})", i),
            Self::AwaitingAck(i) => write!(f, "AwaitingAck({})", i),
            Self::Completed => write!(f, "Completed"),
            Self::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

impl TransferState {
    /// `Completed` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }

    /// Holding (or acquiring) a link.
    pub fn is_live(&self) -> bool {
        !self.is_terminal() && *self != Self::Idle
    }
}

/// An event arrived that the current state does not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply '{event}' in state {state}")]
pub struct InvalidTransition {
    pub event: &'static str,
    pub state: TransferState,
}

impl From<InvalidTransition> for TransferFailure {
    fn from(e: InvalidTransition) -> Self {
        TransferFailure::ProtocolMismatch(e.to_string())
    }
}

/// One transfer: the chunks to deliver and the progress so far.
#[derive(Debug, Clone)]
pub struct TransferSession {
    state: TransferState,
    chunks: Vec<Chunk>,
    retries: u32,
    max_retries: u32,
    writes: u32,
}

impl TransferSession {
    pub fn new(chunks: Vec<Chunk>, max_retries: u32) -> Self {
        Self {
            state: TransferState::Idle,
            chunks,
            retries: 0,
            max_retries,
            writes: 0,
        }
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Resends of the current chunk so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Chunk writes issued, resends included.
    pub fn writes(&self) -> u32 {
        self.writes
    }

    /// The chunk to write in `Sending(i)`.
    pub fn current_chunk(&self) -> Option<&Chunk> {
        match self.state {
            TransferState::Sending(i) => self.chunks.get(i as usize),
            _ => None,
        }
    }

    fn invalid(&self, event: &'static str) -> InvalidTransition {
        InvalidTransition {
            event,
            state: self.state.clone(),
        }
    }

    fn set(&mut self, next: TransferState) -> &TransferState {
        tracing::debug!(from = %self.state, to = %next, "transfer transition");
        self.state = next;
        &self.state
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Idle → Connecting.
    pub fn start(&mut self) -> Result<&TransferState, InvalidTransition> {
        match self.state {
            TransferState::Idle => Ok(self.set(TransferState::Connecting)),
            _ => Err(self.invalid("start")),
        }
    }

    /// Connecting → Handshaking.
    pub fn connected(&mut self) -> Result<&TransferState, InvalidTransition> {
        match self.state {
            TransferState::Connecting => Ok(self.set(TransferState::Handshaking)),
            _ => Err(self.invalid("connected")),
        }
    }

    /// Connecting → Failed(ConnectError).
    pub fn connect_failed(&mut self, reason: String) -> Result<&TransferState, InvalidTransition> {
        match self.state {
            TransferState::Connecting => Ok(self.set(TransferState::Failed(
                TransferFailure::ConnectError(reason),
            ))),
            _ => Err(self.invalid("connect_failed")),
        }
    }

    /// Handshaking → Failed(ProtocolMismatch). Also valid while sending, for
    /// replies the protocol does not allow.
    pub fn protocol_mismatch(
        &mut self,
        reason: String,
    ) -> Result<&TransferState, InvalidTransition> {
        match self.state {
            TransferState::Handshaking | TransferState::AwaitingAck(_) => Ok(self.set(
                TransferState::Failed(TransferFailure::ProtocolMismatch(reason)),
            )),
            _ => Err(self.invalid("protocol_mismatch")),
        }
    }

    /// Handshaking → Sending(0), or Completed for an empty frame.
    pub fn ready(&mut self) -> Result<&TransferState, InvalidTransition> {
        match self.state {
            TransferState::Handshaking if self.chunks.is_empty() => {
                Ok(self.set(TransferState::Completed))
            }
            TransferState::Handshaking => Ok(self.set(TransferState::Sending(0))),
            _ => Err(self.invalid("ready")),
        }
    }

    /// Sending(i) → AwaitingAck(i).
    pub fn written(&mut self) -> Result<&TransferState, InvalidTransition> {
        match self.state {
            TransferState::Sending(i) => {
                self.writes += 1;
                Ok(self.set(TransferState::AwaitingAck(i)))
            }
            _ => Err(self.invalid("written")),
        }
    }

    /// AwaitingAck(i) → Sending(i+1), or Completed after the last chunk.
    pub fn ack(&mut self) -> Result<&TransferState, InvalidTransition> {
        match self.state {
            TransferState::AwaitingAck(i) => {
                self.retries = 0;
                let next = i + 1;
                if next as usize >= self.chunks.len() {
                    Ok(self.set(TransferState::Completed))
                } else {
                    Ok(self.set(TransferState::Sending(next)))
                }
            }
            _ => Err(self.invalid("ack")),
        }
    }

    /// The device rejected chunk `i`.
    pub fn nack(&mut self) -> Result<&TransferState, InvalidTransition> {
        self.retry_or_fail("nack")
    }

    /// No reply for chunk `i` within the per-chunk timeout.
    pub fn chunk_timeout(&mut self) -> Result<&TransferState, InvalidTransition> {
        self.retry_or_fail("chunk_timeout")
    }

    fn retry_or_fail(&mut self, event: &'static str) -> Result<&TransferState, InvalidTransition> {
        match self.state {
            TransferState::AwaitingAck(i) if self.retries < self.max_retries => {
                self.retries += 1;
                Ok(self.set(TransferState::Sending(i)))
            }
            TransferState::AwaitingAck(i) => {
                let attempts = self.retries + 1;
                Ok(self.set(TransferState::Failed(
                    TransferFailure::ChunkDeliveryExhausted {
                        sequence: i,
                        attempts,
                    },
                )))
            }
            _ => Err(self.invalid(event)),
        }
    }

    /// Any non-terminal state → Failed(LinkLost).
    pub fn disconnected(&mut self) -> Result<&TransferState, InvalidTransition> {
        self.fail(TransferFailure::LinkLost)
    }

    /// Any non-terminal state → Failed(reason). Used for timeouts and
    /// cancellation.
    pub fn fail(&mut self, reason: TransferFailure) -> Result<&TransferState, InvalidTransition> {
        if self.state.is_terminal() {
            return Err(self.invalid("fail"));
        }
        Ok(self.set(TransferState::Failed(reason)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::segment::segment_bytes;
    use pretty_assertions::assert_eq;

    fn session(chunks: usize, max_retries: u32) -> TransferSession {
        let data = vec![0x55; chunks * 4];
        TransferSession::new(segment_bytes(&data, 4).unwrap(), max_retries)
    }

    fn sending(chunks: usize, max_retries: u32) -> TransferSession {
        let mut s = session(chunks, max_retries);
        s.start().unwrap();
        s.connected().unwrap();
        s.ready().unwrap();
        s
    }

    #[test]
    fn test_happy_path() {
        let mut s = sending(3, 3);
        for i in 0..3u32 {
            assert_eq!(s.state(), &TransferState::Sending(i));
            assert_eq!(s.current_chunk().unwrap().sequence_number, i);
            s.written().unwrap();
            assert_eq!(s.state(), &TransferState::AwaitingAck(i));
            s.ack().unwrap();
        }
        assert_eq!(s.state(), &TransferState::Completed);
        assert_eq!(s.writes(), 3);
    }

    #[test]
    fn test_connect_failure() {
        let mut s = session(1, 3);
        s.start().unwrap();
        s.connect_failed("no route".into()).unwrap();
        assert_eq!(
            s.state(),
            &TransferState::Failed(TransferFailure::ConnectError("no route".into()))
        );
    }

    #[test]
    fn test_protocol_mismatch() {
        let mut s = session(1, 3);
        s.start().unwrap();
        s.connected().unwrap();
        s.protocol_mismatch("bad start reply".into()).unwrap();
        assert!(matches!(
            s.state(),
            TransferState::Failed(TransferFailure::ProtocolMismatch(_))
        ));
    }

    #[test]
    fn test_nack_resends_same_chunk() {
        let mut s = sending(2, 3);
        s.written().unwrap();
        s.nack().unwrap();
        assert_eq!(s.state(), &TransferState::Sending(0));
        assert_eq!(s.retries(), 1);
        s.written().unwrap();
        s.chunk_timeout().unwrap();
        assert_eq!(s.state(), &TransferState::Sending(0));
        assert_eq!(s.retries(), 2);
        s.written().unwrap();
        s.ack().unwrap();
        assert_eq!(s.state(), &TransferState::Sending(1));
        assert_eq!(s.retries(), 0);
    }

    #[test]
    fn test_retry_bound() {
        let max = 3;
        let mut s = sending(2, max);
        let mut resends = 0;
        loop {
            s.written().unwrap();
            match s.nack().unwrap() {
                TransferState::Sending(0) => resends += 1,
                TransferState::Failed(_) => break,
                other => panic!("unexpected state {}", other),
            }
        }
        assert_eq!(resends, max);
        assert_eq!(s.writes(), max + 1);
        assert_eq!(
            s.state(),
            &TransferState::Failed(TransferFailure::ChunkDeliveryExhausted {
                sequence: 0,
                attempts: max + 1
            })
        );
    }

    #[test]
    fn test_zero_retries_fails_first_nack() {
        let mut s = sending(1, 0);
        s.written().unwrap();
        s.nack().unwrap();
        assert!(s.state().is_terminal());
    }

    #[test]
    fn test_disconnect_while_awaiting_ack() {
        let mut s = sending(5, 3);
        for _ in 0..2 {
            s.written().unwrap();
            s.ack().unwrap();
        }
        s.written().unwrap();
        assert_eq!(s.state(), &TransferState::AwaitingAck(2));
        s.disconnected().unwrap();
        assert_eq!(s.state(), &TransferState::Failed(TransferFailure::LinkLost));
    }

    #[test]
    fn test_terminal_states_absorb() {
        let mut s = sending(1, 3);
        s.written().unwrap();
        s.ack().unwrap();
        assert!(s.disconnected().is_err());
        assert!(s.start().is_err());
        assert_eq!(s.state(), &TransferState::Completed);
    }

    #[test]
    fn test_rejects_out_of_order_events() {
        let mut s = session(1, 3);
        let err = s.ack().unwrap_err();
        assert_eq!(err.event, "ack");
        assert!(s.written().is_err());
        assert!(s.ready().is_err());
        assert_eq!(s.state(), &TransferState::Idle);
    }

    #[test]
    fn test_empty_frame_completes() {
        let mut s = TransferSession::new(Vec::new(), 3);
        s.start().unwrap();
        s.connected().unwrap();
        s.ready().unwrap();
        assert_eq!(s.state(), &TransferState::Completed);
    }

    #[test]
    fn test_live_states() {
        assert!(!TransferState::Idle.is_live());
        assert!(TransferState::AwaitingAck(1).is_live());
        assert!(!TransferState::Completed.is_live());
    }
}
