//! # Gicisky Wire Packets
//!
//! Command builders and reply parsing for protocol version 1.
//!
//! ## Exchange
//!
//! ```text
//! host → cmd    01                          device → 01 F4 00        (max packet 244, u16 LE)
//! host → cmd    02 <u32 LE frame len> 00 00 00  device → 02
//! host → cmd    03                          device → 05 00 <u32 LE part=0>
//! host → image  <u32 LE part> <payload>     device → 05 00 <u32 LE next part>
//!                                           device → 05 08 ...       (frame complete)
//! ```
//!
//! Multi-byte integers are **little-endian**. Replies arrive as notifications
//! on the command characteristic.

/// Open a transfer.
pub const CMD_START: u8 = 0x01;

/// Announce the frame length.
pub const CMD_SIZE: u8 = 0x02;

/// Switch the device into image reception.
pub const CMD_BEGIN_IMAGE: u8 = 0x03;

/// Reply prefix for image part requests and completion.
pub const REPLY_IMAGE: u8 = 0x05;

/// Status byte following [`REPLY_IMAGE`] for a part request.
pub const STATUS_PART: u8 = 0x00;

/// Status byte following [`REPLY_IMAGE`] when the frame was applied.
pub const STATUS_COMPLETE: u8 = 0x08;

/// Bytes of the part index prefixed to every image packet.
pub const PART_HEADER_LEN: usize = 4;

/// Protocol revisions this host speaks.
pub const SUPPORTED_PROTOCOLS: &[u8] = &[1];

/// `01`
pub fn start() -> Vec<u8> {
    vec![CMD_START]
}

/// `02 <u32 LE frame_len> 00 00 00`
pub fn size(frame_len: u32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(8);
    packet.push(CMD_SIZE);
    packet.extend_from_slice(&frame_len.to_le_bytes());
    packet.extend_from_slice(&[0x00, 0x00, 0x00]);
    packet
}

/// `03`
pub fn begin_image() -> Vec<u8> {
    vec![CMD_BEGIN_IMAGE]
}

/// `<u32 LE part> <payload>`
pub fn image_packet(part: u32, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(PART_HEADER_LEN + payload.len());
    packet.extend_from_slice(&part.to_le_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// A device notification, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `01 <u16 LE>`: transfer opened, largest packet the device accepts.
    Start { max_packet: u16 },
    /// `02`: frame length accepted.
    SizeAccepted,
    /// `05 00 <u32 LE>`: the device wants this part next.
    Part(u32),
    /// `05 08`: frame received and applied.
    Complete,
    /// `05 <other>`: image reply with an unexpected status.
    Status(u8),
    /// Anything else.
    Unknown(Vec<u8>),
}

/// Parse a notification payload.
pub fn parse_reply(data: &[u8]) -> Reply {
    match data {
        [CMD_START, lo, hi, ..] => Reply::Start {
            max_packet: u16::from_le_bytes([*lo, *hi]),
        },
        [CMD_SIZE, ..] => Reply::SizeAccepted,
        [REPLY_IMAGE, STATUS_PART, a, b, c, d, ..] => Reply::Part(u32::from_le_bytes([*a, *b, *c, *d])),
        [REPLY_IMAGE, STATUS_COMPLETE, ..] => Reply::Complete,
        [REPLY_IMAGE, status, ..] => Reply::Status(*status),
        other => Reply::Unknown(other.to_vec()),
    }
}

/// `05 00 <u32 LE part>`
pub fn part_reply(part: u32) -> Vec<u8> {
    let mut reply = vec![REPLY_IMAGE, STATUS_PART];
    reply.extend_from_slice(&part.to_le_bytes());
    reply
}

/// `01 <u16 LE max_packet>`
pub fn start_reply(max_packet: u16) -> Vec<u8> {
    let mut reply = vec![CMD_START];
    reply.extend_from_slice(&max_packet.to_le_bytes());
    reply
}

/// `05 08`
pub fn complete_reply() -> Vec<u8> {
    vec![REPLY_IMAGE, STATUS_COMPLETE]
}

/// Format bytes as a hex string for logs.
pub fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}
