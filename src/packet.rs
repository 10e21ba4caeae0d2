//! Framing of bootloader packets.
//!
//! Every exchange with the host tool is a single frame:
//!
//! | Offset       | Field    | Notes                                                  |
//! |--------------|----------|--------------------------------------------------------|
//! | 0            | command  | opcode                                                 |
//! | 1            | length   | command + length + payload bytes, checksum excluded    |
//! | 2..length    | payload  | at least one byte is always present                    |
//! | length       | checksum | XOR of command, length and every payload byte          |
//!
//! Outbound frames are built with [`encode`] (or [`encode_str`] for NUL-terminated
//! strings). Inbound frames are reconstructed from the receive queue by [`decode`], which
//! only consumes bytes once the whole frame has been buffered.
//!
//! ## Example
//!
//! ```rust
//! use gwboot::packet::{decode, encode, PacketStatus};
//! use gwboot::ring::RingBuffer;
//!
//! let frame = encode(0x05, &[]).unwrap();
//! assert_eq!(&frame[..], &[0x05, 0x03, 0x00, 0x06]);
//!
//! let mut rx: RingBuffer<16> = RingBuffer::new();
//! for &b in frame.iter() {
//!     rx.push(b, 0);
//! }
//! let packet = decode(&mut rx);
//! assert_eq!(packet.status, PacketStatus::Ok);
//! assert_eq!(packet.command, 0x05);
//! ```

use heapless::Vec;

use crate::checksum::{xor_checksum, xor_update};
use crate::consts::{CHECKSUM_SIZE, CONTROL_PACKET_SIZE, MAX_FRAME_LEN, MAX_PAYLOAD_LEN};
use crate::ring::RingBuffer;

/// A complete on-wire frame, checksum included.
pub type Frame = Vec<u8, MAX_FRAME_LEN>;

/// Payload storage of a [`Packet`].
pub type Payload = Vec<u8, MAX_PAYLOAD_LEN>;

/// Decoding progress of an inbound [`Packet`].
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PacketStatus {
    /// Not enough bytes are buffered to decode a frame yet. Nothing was consumed.
    #[default]
    Incomplete,
    /// The frame was consumed and its checksum matched.
    Ok,
    /// The frame was consumed but its checksum (or declared length) was wrong.
    Bad,
}

/// One protocol exchange: an opcode and its payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    /// Opcode identifying the operation.
    pub command: u8,
    /// Declared frame length (command + length + payload).
    pub length: u8,
    /// Payload bytes.
    pub data: Payload,
    /// Outcome of decoding this packet.
    pub status: PacketStatus,
}

impl Packet {
    /// Number of payload bytes.
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Whether the packet was fully received and its checksum matched.
    pub fn is_ok(&self) -> bool {
        self.status == PacketStatus::Ok
    }
}

/// Builds the on-wire frame for `command` carrying `data`.
///
/// An empty `data` is sent as a single zero byte, as the protocol requires at least one
/// payload byte per frame.
///
/// # Returns
/// `None` if `data` is longer than [`MAX_PAYLOAD_LEN`].
pub fn encode(command: u8, data: &[u8]) -> Option<Frame> {
    if data.len() > MAX_PAYLOAD_LEN {
        return None;
    }
    let payload: &[u8] = if data.is_empty() { &[0x00] } else { data };
    let length = payload.len() as u8 + CONTROL_PACKET_SIZE;

    let mut frame = Frame::new();
    frame.push(command).ok()?;
    frame.push(length).ok()?;
    frame.extend_from_slice(payload).ok()?;
    frame.push(xor_checksum(command, length, payload)).ok()?;
    Some(frame)
}

/// Builds the frame for `command` carrying `string` followed by a NUL terminator.
///
/// # Returns
/// `None` if the terminated string is longer than [`MAX_PAYLOAD_LEN`].
pub fn encode_str(command: u8, string: &str) -> Option<Frame> {
    let mut data = Payload::new();
    data.extend_from_slice(string.as_bytes()).ok()?;
    data.push(0x00).ok()?;
    encode(command, &data)
}

/// Attempts to reconstruct one frame from the receive queue.
///
/// The queue is left untouched (status [`PacketStatus::Incomplete`]) until it holds exactly
/// one whole frame: the declared `length` plus the trailing checksum byte. Once it does,
/// the frame is consumed and validated.
pub fn decode<const N: usize>(rx: &mut RingBuffer<N>) -> Packet {
    let mut packet = Packet::default();
    if rx.len() < CONTROL_PACKET_SIZE as usize {
        return packet;
    }
    let declared = rx.peek_at(1);
    if rx.len() != declared as usize + CHECKSUM_SIZE {
        return packet;
    }

    packet.command = rx.pop_next();
    packet.length = rx.pop_next();
    if packet.length <= CONTROL_PACKET_SIZE {
        // No room for the mandatory payload byte; drop what is left of the frame
        while !rx.is_empty() {
            let _ = rx.pop_next();
        }
        debug!("dropping frame with length {}", packet.length);
        packet.status = PacketStatus::Bad;
        return packet;
    }

    let data_size = packet.length - CONTROL_PACKET_SIZE;
    for _ in 0..data_size {
        let byte = if rx.is_empty() { 0x00 } else { rx.pop_next() };
        // Capacity is MAX_PAYLOAD_LEN and data_size never exceeds it
        let _ = packet.data.push(byte);
    }
    let validation = rx.pop_next();
    packet.status = validate(&packet, validation);
    packet
}

fn validate(packet: &Packet, validation: u8) -> PacketStatus {
    let chk = xor_checksum(
        packet.command,
        packet.data_size() as u8 + CONTROL_PACKET_SIZE,
        packet.data.iter(),
    );
    if xor_update(chk, &validation) == 0 {
        PacketStatus::Ok
    } else {
        trace!("checksum mismatch on command {:#x}", packet.command);
        PacketStatus::Bad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{CMD_WRITE_DATA, CMD_WRITE_DATA_RESPONSE_OK, RX_QUEUE_SIZE};

    fn queue_with(bytes: &[u8]) -> RingBuffer<RX_QUEUE_SIZE> {
        let mut rx = RingBuffer::new();
        for &b in bytes {
            assert!(rx.push(b, 0));
        }
        rx
    }

    #[test]
    fn test_encode_empty_payload_uses_zero_byte() {
        let frame = encode(CMD_WRITE_DATA_RESPONSE_OK, &[]).unwrap();
        assert_eq!(&frame[..], &[0x05, 0x03, 0x00, 0x06]);
    }

    #[test]
    fn test_encode_layout() {
        let frame = encode(0x42, &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(frame.len(), 6);
        assert_eq!(frame[0], 0x42);
        assert_eq!(frame[1], 5);
        assert_eq!(&frame[2..5], &[0x01, 0x02, 0x03]);
        assert_eq!(frame[5], 0x42 ^ 5 ^ 0x01 ^ 0x02 ^ 0x03);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let data = [0u8; MAX_PAYLOAD_LEN + 1];
        assert!(encode(0x01, &data).is_none());
        let data = [0u8; MAX_PAYLOAD_LEN];
        assert_eq!(encode(0x01, &data).unwrap().len(), MAX_FRAME_LEN);
    }

    #[test]
    fn test_encode_str_appends_terminator() {
        let frame = encode_str(0x03, "1.0").unwrap();
        assert_eq!(&frame[..6], &[0x03, 0x06, b'1', b'.', b'0', 0x00]);
        assert_eq!(frame.len(), 7);
    }

    #[test]
    fn test_round_trip_framing() {
        for len in [1usize, 2, 6, 9, 64, 250] {
            let data: std::vec::Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
            let frame = encode(CMD_WRITE_DATA, &data).unwrap();
            let mut rx = queue_with(&frame);
            let packet = decode(&mut rx);
            assert_eq!(packet.status, PacketStatus::Ok, "len {}", len);
            assert_eq!(packet.command, CMD_WRITE_DATA);
            assert_eq!(&packet.data[..], &data[..]);
            assert!(rx.is_empty());
        }
    }

    #[test]
    fn test_single_bit_flip_is_bad() {
        let frame = encode(CMD_WRITE_DATA, &[0x00, 0x10, 0x00, 0xAA, 0xBB, 0xCC]).unwrap();
        // The length byte is excluded: flipping it changes the framing instead
        for idx in (0..frame.len()).filter(|&i| i != 1) {
            for bit in 0..8 {
                let mut corrupt = frame.clone();
                corrupt[idx] ^= 1 << bit;
                let mut rx = queue_with(&corrupt);
                let packet = decode(&mut rx);
                assert_eq!(packet.status, PacketStatus::Bad, "byte {} bit {}", idx, bit);
            }
        }
    }

    #[test]
    fn test_partial_frame_is_left_untouched() {
        let frame = encode(CMD_WRITE_DATA, &[0x00, 0x00, 0x00, 1, 2, 3, 4, 5, 6]).unwrap();
        for cut in 0..frame.len() {
            let mut rx = queue_with(&frame[..cut]);
            let packet = decode(&mut rx);
            assert_eq!(packet.status, PacketStatus::Incomplete);
            assert_eq!(rx.len(), cut);
            assert_eq!(rx.read_cursor(), 0);
        }
    }

    #[test]
    fn test_frame_completes_after_more_bytes_arrive() {
        let frame = encode(CMD_WRITE_DATA, &[9, 8, 7]).unwrap();
        let mut rx = queue_with(&frame[..3]);
        assert_eq!(decode(&mut rx).status, PacketStatus::Incomplete);
        for &b in &frame[3..] {
            let _ = rx.push(b, 1);
        }
        let packet = decode(&mut rx);
        assert!(packet.is_ok());
        assert_eq!(&packet.data[..], &[9, 8, 7]);
    }

    #[test]
    fn test_trailing_garbage_keeps_incomplete() {
        let mut bytes = std::vec::Vec::from(&encode(0x02, &[]).unwrap()[..]);
        bytes.push(0x99);
        let mut rx = queue_with(&bytes);
        assert_eq!(decode(&mut rx).status, PacketStatus::Incomplete);
        assert_eq!(rx.len(), bytes.len());
    }

    #[test]
    fn test_too_short_declared_length_is_bad() {
        // Length 2 leaves no room for a payload byte
        let mut rx = queue_with(&[0x02, 0x02, 0x00]);
        let packet = decode(&mut rx);
        assert_eq!(packet.status, PacketStatus::Bad);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_decode_across_wraparound() {
        let mut rx: RingBuffer<8> = RingBuffer::new();
        for _ in 0..6 {
            let _ = rx.push(0xEE, 0);
            let _ = rx.pop_next();
        }
        for &b in encode(0x0B, &[0x12, 0x34]).unwrap().iter() {
            let _ = rx.push(b, 0);
        }
        let packet = decode(&mut rx);
        assert!(packet.is_ok());
        assert_eq!(packet.command, 0x0B);
        assert_eq!(&packet.data[..], &[0x12, 0x34]);
    }
}
