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

use std::time::Duration;

/// Samsung USB vendor id, shared by every Download Mode product id.
pub const SAMSUNG_VID: u16 = 0x04E8;
/// Download Mode product ids observed on Samsung devices.
pub const SAMSUNG_PIDS: [u16; 2] = [0x685D, 0x6860];

/// Fixed size of every control packet (commands and PIT segments).
pub const CONTROL_PACKET_LEN: usize = 500;
/// Bulk chunk size used once an image is larger than [`SMALL_IMAGE_THRESHOLD`].
pub const BULK_CHUNK_LEN: usize = 128 * 1024;
/// Images at or below this size are sent using [`CONTROL_PACKET_LEN`]-sized chunks.
pub const SMALL_IMAGE_THRESHOLD: u64 = 1024 * 1024;
/// Images larger than this get the large-file epilogue (purge + settle).
pub const LARGE_IMAGE_THRESHOLD: u64 = 100 * 1024 * 1024;
/// Images at or above this size may skip a stalled chunk rather than fault
/// the whole transfer on a second consecutive stall (spec.md §4.5 rule 8).
pub const GIB_SKIP_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Positive-acknowledgement byte.
pub const ACK_BYTE: u8 = 0x06;
/// Keep-alive byte sent when the device might think the host has hung.
pub const KEEPALIVE_BYTE: u8 = 0x64;

/// Serial line settings mandated for every LOKE session.
pub const BAUD_RATE: u32 = 115_200;
pub const OS_BUFFER_LEN: usize = 4096;

pub const SETTLE_DELAY: Duration = Duration::from_millis(500);
pub const STABILITY_WINDOW: Duration = Duration::from_millis(1000);
pub const PIT_READ_IDLE: Duration = Duration::from_millis(200);
pub const KEEPALIVE_GAP: Duration = Duration::from_millis(400);
pub const RECOVERY_SETTLE: Duration = Duration::from_millis(500);

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(5000);
pub const LARGE_FILE_READ_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(1000);
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(1500);
pub const PIT_SEGMENT_ACK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Emit progress to the observer at most this often.
pub const PROGRESS_EMIT_EVERY: u64 = 1024 * 1024;
/// Poll for a stray ACK every this many bulk chunks.
pub const ACK_POLL_EVERY_CHUNKS: u32 = 10;

/// Port Monitor poll cadence while no session is live.
pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Port Monitor backoff cadence while a session is `Greeted` or beyond.
pub const MONITOR_BACKOFF_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum length of a PIT blob to be considered plausible.
pub const PIT_MIN_LEN: usize = 20;
/// How many leading bytes of a PIT blob are checked for non-zero content.
pub const PIT_PREFIX_CHECK_LEN: usize = 100;

/// The ASCII reply that means "the LOKE session is live" to a greet.
pub const LOKE_GREETING: [u8; 4] = *b"LOKE";

/// Four-letter wire commands, see [`crate::frame::Command`].
pub mod wire {
    pub const ODIN: [u8; 4] = *b"ODIN";
    pub const PITM: [u8; 4] = *b"PITM";
    pub const PITR: [u8; 4] = *b"PITR";
    pub const DATA: [u8; 4] = *b"DATA";
    pub const ENDS: [u8; 4] = *b"ENDS";
    pub const REBT: [u8; 4] = *b"REBT";
}
