//! # Transfer Driver
//!
//! Runs one [`TransferSession`] over a [`LinkConnection`].
//!
//! ## Timing
//!
//! - `connect_timeout` bounds link establishment.
//! - `chunk_timeout` bounds every device reply. During the image phase an
//!   expiry counts as a nack and consumes a retry.
//! - `transfer_timeout` bounds the whole transfer, connect included. Expiry
//!   fails the transfer with [`TransferFailure::Timeout`].
//!
//! A [`CancellationToken`] is honored at every suspension point. Whatever the
//! outcome, the connection is disconnected before `run` returns.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::link::{Channel, LinkAdapter, LinkConnection, LinkError};
use super::session::{DEFAULT_MAX_RETRIES, TransferSession, TransferState};
use crate::device::DeviceProfile;
use crate::error::TransferFailure;
use crate::protocol::Chunk;
use crate::protocol::packet::{self, PART_HEADER_LEN, Reply, SUPPORTED_PROTOCOLS};

/// Limits applied to every transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Resends allowed per chunk.
    pub max_retries: u32,
    pub connect_timeout: Duration,
    pub chunk_timeout: Duration,
    pub transfer_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            connect_timeout: Duration::from_secs(20),
            chunk_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(120),
        }
    }
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub address: String,
    pub model: String,
    pub chunks: usize,
    /// Chunk writes, resends included.
    pub writes: u32,
    pub bytes: usize,
    pub elapsed_ms: u64,
}

/// Drives sessions with a fixed [`TransferConfig`].
#[derive(Debug, Clone, Default)]
pub struct TransferDriver {
    config: TransferConfig,
}

fn publish(observer: Option<&watch::Sender<TransferState>>, session: &TransferSession) {
    if let Some(tx) = observer {
        tx.send_replace(session.state().clone());
    }
}

fn link_failure(e: LinkError) -> TransferFailure {
    match e {
        LinkError::Disconnected => TransferFailure::LinkLost,
        LinkError::ServicesMissing(msg) => TransferFailure::ProtocolMismatch(msg),
        LinkError::Unreachable(msg) | LinkError::Write(msg) => TransferFailure::ConnectError(msg),
    }
}

/// Move the session to the failed state matching `reason`.
fn abort(session: &mut TransferSession, reason: TransferFailure) -> TransferFailure {
    let applied = match &reason {
        TransferFailure::LinkLost => session.disconnected().is_ok(),
        TransferFailure::ProtocolMismatch(msg) => session.protocol_mismatch(msg.clone()).is_ok(),
        _ => false,
    };
    if !applied && !session.state().is_terminal() {
        let _ = session.fail(reason.clone());
    }
    reason
}

impl TransferDriver {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Deliver `chunks` to the label at `address`.
    ///
    /// State changes are published to `observer` when one is given.
    pub async fn run(
        &self,
        link: &dyn LinkAdapter,
        address: &str,
        profile: &DeviceProfile,
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
        observer: Option<&watch::Sender<TransferState>>,
    ) -> Result<TransferReport, TransferFailure> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.transfer_timeout;
        let bytes: usize = chunks.iter().map(|c| c.payload.len()).sum();
        let chunk_count = chunks.len();
        let mut session = TransferSession::new(chunks, self.config.max_retries);

        tracing::info!(
            address,
            model = profile.name,
            chunks = chunk_count,
            bytes,
            "transfer starting"
        );

        session.start()?;
        publish(observer, &session);

        let connect = tokio::time::timeout(self.config.connect_timeout, link.connect(address));
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferFailure::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Err(TransferFailure::Timeout),
            result = connect => match result {
                Ok(Ok(conn)) => Ok(conn),
                Ok(Err(e)) => Err(TransferFailure::ConnectError(e.to_string())),
                Err(_) => Err(TransferFailure::ConnectError(format!(
                    "no connection after {:?}",
                    self.config.connect_timeout
                ))),
            },
        };

        let mut conn = match connected {
            Ok(conn) => conn,
            Err(reason) => {
                match &reason {
                    TransferFailure::ConnectError(msg) => {
                        session.connect_failed(msg.clone())?;
                    }
                    other => {
                        session.fail(other.clone())?;
                    }
                }
                publish(observer, &session);
                tracing::warn!(address, error = %reason, "transfer failed");
                return Err(reason);
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferFailure::Cancelled),
            result = tokio::time::timeout_at(
                deadline,
                self.exchange(conn.as_mut(), &mut session, profile, bytes, observer),
            ) => result.unwrap_or(Err(TransferFailure::Timeout)),
        };

        conn.disconnect().await;
        tracing::debug!(address, "link closed");

        match outcome {
            Ok(()) => {
                let report = TransferReport {
                    address: address.to_string(),
                    model: profile.name.to_string(),
                    chunks: chunk_count,
                    writes: session.writes(),
                    bytes,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                tracing::info!(
                    address,
                    writes = report.writes,
                    elapsed_ms = report.elapsed_ms,
                    "transfer completed"
                );
                Ok(report)
            }
            Err(reason) => {
                let reason = abort(&mut session, reason);
                publish(observer, &session);
                tracing::warn!(address, state = %session.state(), error = %reason, "transfer failed");
                Err(reason)
            }
        }
    }

    /// Handshake and chunk loop. Returns when the session is terminal.
    async fn exchange(
        &self,
        conn: &mut dyn LinkConnection,
        session: &mut TransferSession,
        profile: &DeviceProfile,
        frame_len: usize,
        observer: Option<&watch::Sender<TransferState>>,
    ) -> Result<(), TransferFailure> {
        session.connected()?;
        publish(observer, session);

        if let Err(reason) = self.handshake(conn, profile, frame_len).await {
            return Err(abort(session, reason));
        }

        session.ready()?;
        publish(observer, session);

        let last = session.chunks().len().saturating_sub(1) as u32;

        loop {
            match session.state().clone() {
                TransferState::Sending(i) => {
                    let Some(chunk) = session.current_chunk() else {
                        return Err(abort(
                            session,
                            TransferFailure::ProtocolMismatch(format!("no chunk {}", i)),
                        ));
                    };
                    if !chunk.verify() {
                        return Err(abort(session, TransferFailure::ChunkCorrupted(i)));
                    }
                    let data = packet::image_packet(i, &chunk.payload);
                    let write = conn.write(Channel::Image, &data).await;
                    session.written()?;
                    match write {
                        Ok(()) => {}
                        Err(LinkError::Disconnected) => {
                            return Err(abort(session, TransferFailure::LinkLost));
                        }
                        Err(e) => {
                            tracing::debug!(chunk = i, error = %e, "chunk write rejected");
                            session.nack()?;
                        }
                    }
                }
                TransferState::AwaitingAck(i) => {
                    match tokio::time::timeout(self.config.chunk_timeout, conn.notification())
                        .await
                    {
                        Err(_) => {
                            tracing::debug!(chunk = i, "no reply within chunk timeout");
                            session.chunk_timeout()?;
                        }
                        Ok(Err(e)) => return Err(abort(session, link_failure(e))),
                        Ok(Ok(data)) => {
                            tracing::trace!(chunk = i, rx = %packet::hex(&data), "chunk reply");
                            match packet::parse_reply(&data) {
                                Reply::Part(n) if n == i + 1 => {
                                    session.ack()?;
                                }
                                Reply::Complete if i == last => {
                                    session.ack()?;
                                }
                                Reply::Part(n) if n == i => {
                                    session.nack()?;
                                }
                                Reply::Status(status) => {
                                    tracing::debug!(chunk = i, status, "chunk rejected");
                                    session.nack()?;
                                }
                                other => {
                                    return Err(abort(
                                        session,
                                        TransferFailure::ProtocolMismatch(format!(
                                            "unexpected reply {:?} to chunk {}",
                                            other, i
                                        )),
                                    ));
                                }
                            }
                        }
                    }
                }
                TransferState::Completed => {
                    publish(observer, session);
                    return Ok(());
                }
                TransferState::Failed(reason) => return Err(reason),
                other => {
                    return Err(abort(
                        session,
                        TransferFailure::ProtocolMismatch(format!("unexpected state {}", other)),
                    ));
                }
            }
            publish(observer, session);
        }
    }

    async fn handshake(
        &self,
        conn: &mut dyn LinkConnection,
        profile: &DeviceProfile,
        frame_len: usize,
    ) -> Result<(), TransferFailure> {
        if !SUPPORTED_PROTOCOLS.contains(&profile.protocol_version) {
            return Err(TransferFailure::ProtocolMismatch(format!(
                "protocol version {} not supported",
                profile.protocol_version
            )));
        }

        match self.request(conn, packet::start(), "start").await? {
            Reply::Start { max_packet } if profile.chunk_size + PART_HEADER_LEN <= max_packet as usize => {}
            Reply::Start { max_packet } => {
                return Err(TransferFailure::ProtocolMismatch(format!(
                    "chunk size {} exceeds device packet limit {}",
                    profile.chunk_size, max_packet
                )));
            }
            other => {
                return Err(TransferFailure::ProtocolMismatch(format!(
                    "unexpected start reply {:?}",
                    other
                )));
            }
        }

        match self.request(conn, packet::size(frame_len as u32), "size").await? {
            Reply::SizeAccepted => {}
            other => {
                return Err(TransferFailure::ProtocolMismatch(format!(
                    "unexpected size reply {:?}",
                    other
                )));
            }
        }

        match self.request(conn, packet::begin_image(), "begin image").await? {
            Reply::Part(0) => Ok(()),
            other => Err(TransferFailure::ProtocolMismatch(format!(
                "unexpected begin reply {:?}",
                other
            ))),
        }
    }

    /// Write a command and wait for its reply.
    async fn request(
        &self,
        conn: &mut dyn LinkConnection,
        data: Vec<u8>,
        step: &'static str,
    ) -> Result<Reply, TransferFailure> {
        tracing::trace!(step, tx = %packet::hex(&data), "command");
        conn.write(Channel::Command, &data)
            .await
            .map_err(link_failure)?;
        match tokio::time::timeout(self.config.chunk_timeout, conn.notification()).await {
            Ok(Ok(reply)) => {
                tracing::trace!(step, rx = %packet::hex(&reply), "reply");
                Ok(packet::parse_reply(&reply))
            }
            Ok(Err(e)) => Err(link_failure(e)),
            Err(_) => Err(TransferFailure::ProtocolMismatch(format!(
                "no reply to {} command",
                step
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::segment::segment_bytes;
    use crate::transfer::simulator::{FaultPlan, SimulatedLabel};
    use pretty_assertions::assert_eq;

    const ADDR: &str = "AA:BB:CC:DD:EE:FF";

    fn frame() -> Vec<u8> {
        (0..100u8).collect()
    }

    fn chunks() -> Vec<Chunk> {
        segment_bytes(&frame(), 20).unwrap()
    }

    fn label(faults: FaultPlan) -> SimulatedLabel {
        SimulatedLabel::with_faults(DeviceProfile::EPD_29_BW, faults)
    }

    fn driver(chunk_timeout_ms: u64) -> TransferDriver {
        TransferDriver::new(TransferConfig {
            chunk_timeout: Duration::from_millis(chunk_timeout_ms),
            ..TransferConfig::default()
        })
    }

    async fn send(
        driver: &TransferDriver,
        label: &SimulatedLabel,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, TransferFailure> {
        driver
            .run(label, ADDR, &DeviceProfile::EPD_29_BW, chunks(), cancel, None)
            .await
    }

    #[tokio::test]
    async fn test_delivers_frame_in_order() {
        let label = label(FaultPlan::default());
        let (tx, rx) = watch::channel(TransferState::Idle);

        let report = driver(1000)
            .run(
                &label,
                ADDR,
                &DeviceProfile::EPD_29_BW,
                chunks(),
                &CancellationToken::new(),
                Some(&tx),
            )
            .await
            .unwrap();

        assert_eq!(report.chunks, 5);
        assert_eq!(report.writes, 5);
        assert_eq!(report.bytes, 100);
        assert_eq!(label.image_parts(), vec![0, 1, 2, 3, 4]);
        assert_eq!(label.out_of_order_writes(), 0);
        assert_eq!(label.displayed_frame(), Some(frame()));
        assert_eq!(label.disconnects(), 1);
        assert_eq!(*rx.borrow(), TransferState::Completed);
    }

    #[tokio::test]
    async fn test_handshake_precedes_image() {
        let label = label(FaultPlan::default());
        send(&driver(1000), &label, &CancellationToken::new())
            .await
            .unwrap();

        let writes = label.writes();
        assert_eq!(writes[0], (Channel::Command, packet::start()));
        assert_eq!(writes[1], (Channel::Command, packet::size(100)));
        assert_eq!(writes[2], (Channel::Command, packet::begin_image()));
        assert!(writes[3..].iter().all(|(ch, _)| *ch == Channel::Image));
    }

    #[tokio::test]
    async fn test_nack_resends_same_chunk() {
        let mut faults = FaultPlan::default();
        faults.nack_parts.insert(2, 2);
        let label = label(faults);

        let report = send(&driver(1000), &label, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.writes, 7);
        assert_eq!(label.image_parts(), vec![0, 1, 2, 2, 2, 3, 4]);
        assert_eq!(label.out_of_order_writes(), 0);
        assert_eq!(label.displayed_frame(), Some(frame()));
    }

    #[tokio::test]
    async fn test_retry_bound() {
        let label = label(FaultPlan {
            always_nack: true,
            ..FaultPlan::default()
        });

        let err = send(&driver(1000), &label, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TransferFailure::ChunkDeliveryExhausted {
                sequence: 0,
                attempts: DEFAULT_MAX_RETRIES + 1,
            }
        );
        // first write plus exactly max_retries resends
        assert_eq!(label.image_parts().len() as u32, DEFAULT_MAX_RETRIES + 1);
        assert_eq!(label.displayed_frame(), None);
        assert_eq!(label.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_silent_chunk_counts_as_nack() {
        let mut faults = FaultPlan::default();
        faults.silent_parts.insert(1, 1);
        let label = label(faults);

        let report = send(&driver(50), &label, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.writes, 6);
        assert_eq!(label.image_parts(), vec![0, 1, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_link_lost_mid_transfer() {
        let label = label(FaultPlan {
            disconnect_at_part: Some(2),
            ..FaultPlan::default()
        });
        let (tx, rx) = watch::channel(TransferState::Idle);

        let err = driver(1000)
            .run(
                &label,
                ADDR,
                &DeviceProfile::EPD_29_BW,
                chunks(),
                &CancellationToken::new(),
                Some(&tx),
            )
            .await
            .unwrap_err();

        assert_eq!(err, TransferFailure::LinkLost);
        assert_eq!(*rx.borrow(), TransferState::Failed(TransferFailure::LinkLost));
        assert_eq!(label.image_parts(), vec![0, 1, 2]);
        assert_eq!(label.displayed_frame(), None);
        assert_eq!(label.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let label = label(FaultPlan {
            refuse_connect: true,
            ..FaultPlan::default()
        });
        let err = send(&driver(1000), &label, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferFailure::ConnectError(_)));
        assert!(label.writes().is_empty());
    }

    #[tokio::test]
    async fn test_packet_limit_mismatch() {
        let label = label(FaultPlan {
            start_reply: Some(packet::start_reply(16)),
            ..FaultPlan::default()
        });
        let err = send(&driver(1000), &label, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferFailure::ProtocolMismatch(_)));
        assert!(label.image_parts().is_empty());
        assert_eq!(label.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_protocol_version() {
        let profile = DeviceProfile {
            protocol_version: 9,
            ..DeviceProfile::EPD_29_BW
        };
        let label = SimulatedLabel::new(profile.clone());
        let err = driver(1000)
            .run(&label, ADDR, &profile, chunks(), &CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferFailure::ProtocolMismatch(_)));
        assert!(label.writes().is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_chunk_never_sent() {
        let label = label(FaultPlan::default());
        let mut chunks = chunks();
        chunks[1].payload[0] ^= 0xFF;

        let err = driver(1000)
            .run(
                &label,
                ADDR,
                &DeviceProfile::EPD_29_BW,
                chunks,
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(err, TransferFailure::ChunkCorrupted(1));
        assert_eq!(label.image_parts(), vec![0]);
        assert_eq!(label.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_disconnects() {
        let label = label(FaultPlan {
            reply_delay: Some(Duration::from_millis(200)),
            ..FaultPlan::default()
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let err = send(&driver(1000), &label, &cancel).await.unwrap_err();

        assert_eq!(err, TransferFailure::Cancelled);
        assert_eq!(label.disconnects(), 1);
        assert_eq!(label.displayed_frame(), None);
    }

    #[tokio::test]
    async fn test_overall_timeout() {
        let label = label(FaultPlan {
            reply_delay: Some(Duration::from_millis(500)),
            ..FaultPlan::default()
        });
        let driver = TransferDriver::new(TransferConfig {
            transfer_timeout: Duration::from_millis(50),
            ..TransferConfig::default()
        });

        let err = send(&driver, &label, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, TransferFailure::Timeout);
        assert_eq!(label.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_empty_frame_completes_after_handshake() {
        let label = label(FaultPlan::default());
        let report = driver(1000)
            .run(
                &label,
                ADDR,
                &DeviceProfile::EPD_29_BW,
                Vec::new(),
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(report.writes, 0);
        assert!(label.image_parts().is_empty());
    }
}
