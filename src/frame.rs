// Copyright 2026 LOKE Flasher Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Frame Codec
//!
//! 500-byte control packet framing, see spec.md §4.3. Every command is a
//! big-endian command word and payload size, a little-endian sequence id,
//! and zero padding to exactly [`CONTROL_PACKET_LEN`] bytes.

use crate::constants::{wire, CONTROL_PACKET_LEN};

/// One of the four-letter ASCII command words the device recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Greet: start a session.
    Odin,
    /// Enter PIT-write mode.
    Pitm,
    /// Read PIT back.
    Pitr,
    /// Begin streaming an image.
    Data,
    /// End session (device reboots).
    Ends,
    /// Reboot to normal mode.
    Rebt,
}

impl Command {
    pub fn word(self) -> [u8; 4] {
        match self {
            Command::Odin => wire::ODIN,
            Command::Pitm => wire::PITM,
            Command::Pitr => wire::PITR,
            Command::Data => wire::DATA,
            Command::Ends => wire::ENDS,
            Command::Rebt => wire::REBT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Odin => "ODIN",
            Command::Pitm => "PITM",
            Command::Pitr => "PITR",
            Command::Data => "DATA",
            Command::Ends => "ENDS",
            Command::Rebt => "REBT",
        }
    }
}

/// Build a 500-byte control packet.
///
/// Layout: `[0..4)` command word big-endian, `[4..8)` payload size
/// big-endian, `[8..12)` sequence id little-endian, `[12..500)` zero pad.
/// The declared `payload_size` is a 32-bit field: per spec.md §9's open
/// question on DATA sizing, callers MUST truncate a 64-bit image size
/// themselves (see [`crate::bulk`]) rather than this codec inventing a
/// wider field.
pub fn encode(cmd: Command, payload_size: u32, seq: u32) -> [u8; CONTROL_PACKET_LEN] {
    let mut pkt = [0u8; CONTROL_PACKET_LEN];
    pkt[0..4].copy_from_slice(&cmd.word());
    pkt[4..8].copy_from_slice(&payload_size.to_be_bytes());
    pkt[8..12].copy_from_slice(&seq.to_le_bytes());
    pkt
}

/// Decode the header fields of a 500-byte control packet back into their
/// logical values. Used only by tests and by the PIT-write segment codec.
pub fn decode_header(pkt: &[u8; CONTROL_PACKET_LEN]) -> ([u8; 4], u32, u32) {
    let mut word = [0u8; 4];
    word.copy_from_slice(&pkt[0..4]);
    let size = u32::from_be_bytes(pkt[4..8].try_into().unwrap());
    let seq = u32::from_le_bytes(pkt[8..12].try_into().unwrap());
    (word, size, seq)
}

/// Pad a PIT payload segment (or the image itself, in PIT-write mode) to
/// exactly [`CONTROL_PACKET_LEN`] bytes, zero-filling the tail.
pub fn pad_segment(data: &[u8]) -> [u8; CONTROL_PACKET_LEN] {
    assert!(data.len() <= CONTROL_PACKET_LEN, "PIT segment too large");
    let mut segment = [0u8; CONTROL_PACKET_LEN];
    segment[..data.len()].copy_from_slice(data);
    segment
}

/// Result of waiting for a device acknowledgement, see spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// A byte arrived before the deadline; caller checks `== 0x06`.
    Received(u8),
    /// Nothing arrived before the deadline. Not automatically an error for
    /// bulk chunks (spec.md §4.3, §4.5 rule 5 / §9 "ACK semantics").
    Empty,
}

impl AckOutcome {
    pub fn is_ack(self) -> bool {
        matches!(self, AckOutcome::Received(b) if b == crate::constants::ACK_BYTE)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_has_fixed_length_and_zero_pad() {
        let pkt = encode(Command::Data, 0x1234_5678, 7);
        assert_eq!(pkt.len(), CONTROL_PACKET_LEN);
        assert_eq!(&pkt[0..4], b"DATA");
        assert_eq!(&pkt[4..8], &0x1234_5678u32.to_be_bytes());
        assert_eq!(&pkt[8..12], &7u32.to_le_bytes());
        assert!(pkt[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn encode_decode_roundtrip() {
        for (cmd, size, seq) in [
            (Command::Odin, 0u32, 0u32),
            (Command::Pitm, 0, 1),
            (Command::Pitr, 0, 2),
            (Command::Data, 600, 0),
            (Command::Ends, 0, 99),
            (Command::Rebt, 0, 100),
        ] {
            let pkt = encode(cmd, size, seq);
            let (word, decoded_size, decoded_seq) = decode_header(&pkt);
            assert_eq!(word, cmd.word());
            assert_eq!(decoded_size, size);
            assert_eq!(decoded_seq, seq);
        }
    }

    #[test]
    fn pad_segment_zero_fills_tail() {
        let data = [0xAAu8; 10];
        let segment = pad_segment(&data);
        assert_eq!(segment.len(), CONTROL_PACKET_LEN);
        assert_eq!(&segment[..10], &data[..]);
        assert!(segment[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn ack_outcome_checks_byte_value() {
        assert!(AckOutcome::Received(0x06).is_ack());
        assert!(!AckOutcome::Received(0x07).is_ack());
        assert!(!AckOutcome::Empty.is_ack());
    }
}
