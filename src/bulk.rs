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

//! # Bulk Transfer Engine
//!
//! Streams an [`ImageStream`] of known length to an already-greeted
//! session in the chunk size spec.md §4.5 mandates, without ever buffering
//! the whole image. Local reads (file, tar slice) stay synchronous; only
//! link I/O and delays are suspension points, matching the ambient
//! scheduling model (spec.md §5).

use std::io::Read;
use std::time::Instant;

use crate::constants::{
    BULK_CHUNK_LEN, CONTROL_PACKET_LEN, GIB_SKIP_THRESHOLD, KEEPALIVE_BYTE, KEEPALIVE_GAP,
    LARGE_IMAGE_THRESHOLD, PROGRESS_EMIT_EVERY, ACK_POLL_EVERY_CHUNKS, SETTLE_DELAY,
    SMALL_IMAGE_THRESHOLD,
};
use crate::error::{ExternalError, IoKind, LokeError, Result, TransportError};
use crate::observer::LogLevel;
use crate::recovery::{self, RecoveryOutcome};
use crate::session::Session;
use crate::transport::{classify_io_error, LinkBackend, PurgeMask};

/// A single named image to stream: declared length plus a byte source.
/// The source is a plain synchronous `Read` — a file, a
/// [`crate::tar_stream`] bounded entry reader, or caller-supplied
/// decompression adaptor; the engine treats all three alike.
pub struct ImageStream<'a> {
    pub name: String,
    pub size: u64,
    pub reader: &'a mut dyn Read,
}

/// How a transfer ended. `PartialFailure` is only returned for images at
/// or above [`GIB_SKIP_THRESHOLD`] that stalled twice on the same chunk
/// (spec.md §4.5 rule 8); the caller may continue to the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    PartialFailure,
}

/// What happened writing one chunk, after recovery was already attempted.
enum ChunkFault {
    /// Recovery itself could not re-greet; the session is `Faulted`.
    RecoveryFailed,
    /// Recovery succeeded but the retried write stalled again.
    StalledAfterRetry,
}

fn chunk_len(size: u64) -> usize {
    if size > SMALL_IMAGE_THRESHOLD {
        BULK_CHUNK_LEN
    } else {
        CONTROL_PACKET_LEN
    }
}

/// Fill `buf` completely from `reader`, issuing further `read` calls to
/// ride out short reads, and only return less than `buf.len()` at true
/// EOF. Without this, a short-reading source (a real file, a tar entry)
/// could turn one logical chunk into several wire writes, breaking the
/// exact chunk-count invariant spec.md §4.5/§8 rely on.
fn read_full_chunk(reader: &mut dyn Read, buf: &mut [u8], name: &str) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).map_err(|e| {
            LokeError::External(ExternalError::FileMissing(format!("reading image `{name}`: {e}")))
        })?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Drive `image` over `session` end to end: `DATA` header, chunk loop,
/// large-file epilogue. Returns once the stream is exhausted or a fault
/// can't be recovered from.
pub async fn transfer<B: LinkBackend>(
    session: &mut Session<B>,
    image: &mut ImageStream<'_>,
) -> Result<TransferOutcome> {
    session.begin_data(image.size).await?;

    let chunk_len = chunk_len(image.size);
    let mut buf = vec![0u8; chunk_len];

    let mut sent: u64 = 0;
    let mut chunks_written: u32 = 0;
    let mut last_progress_emit: u64 = 0;
    let mut last_write = Instant::now();

    loop {
        let n = read_full_chunk(image.reader, &mut buf, &image.name)?;
        if n == 0 {
            break;
        }

        maybe_send_keepalive(session, &mut last_write).await;

        match write_chunk_with_recovery(session, &buf[..n]).await {
            Ok(()) => {}
            Err(ChunkFault::RecoveryFailed) => {
                return Err(LokeError::Transport(TransportError::Io {
                    kind: IoKind::Fatal,
                    source: std::io::Error::new(std::io::ErrorKind::Other, "recovery failed"),
                }));
            }
            Err(ChunkFault::StalledAfterRetry) => {
                if image.size >= GIB_SKIP_THRESHOLD {
                    session.observer().on_log(
                        LogLevel::Warning,
                        format!("skipping remainder of `{}` after repeated stall", image.name),
                    );
                    return Ok(TransferOutcome::PartialFailure);
                }
                return Err(LokeError::Transport(TransportError::Io {
                    kind: IoKind::Fatal,
                    source: std::io::Error::new(std::io::ErrorKind::Other, "chunk stalled twice"),
                }));
            }
        }

        sent += n as u64;
        last_write = Instant::now();
        chunks_written += 1;

        poll_stray_ack(session, chunks_written);

        if sent.saturating_sub(last_progress_emit) >= PROGRESS_EMIT_EVERY || n < chunk_len {
            session.observer().on_progress(sent, image.size);
            last_progress_emit = sent;
        }
    }

    session.observer().on_progress(sent, image.size);
    session.end_data();
    session.observer().on_log(LogLevel::Success, format!("`{}` transferred", image.name));

    if image.size > LARGE_IMAGE_THRESHOLD {
        let _ = session
            .link_mut()
            .purge(PurgeMask { tx: true, rx: true, abort: false })
            .await;
        tokio::time::sleep(SETTLE_DELAY).await;
    }

    Ok(TransferOutcome::Completed)
}

/// Rule 4: send a lone `0x64` if it's been a while since the last write
/// and nothing is waiting to be read.
async fn maybe_send_keepalive<B: LinkBackend>(session: &mut Session<B>, last_write: &mut Instant) {
    if last_write.elapsed() <= KEEPALIVE_GAP {
        return;
    }
    let mut probe = [0u8; 1];
    let link = session.link_mut();
    if link.read_available(&mut probe).unwrap_or(0) != 0 {
        return;
    }
    let _ = link.write(&[KEEPALIVE_BYTE]).await;
    *last_write = Instant::now();
}

/// Rule 5: every [`ACK_POLL_EVERY_CHUNKS`] chunks, consume one buffered
/// byte if present and warn (but continue) if it isn't an ACK.
fn poll_stray_ack<B: LinkBackend>(session: &mut Session<B>, chunks_written: u32) {
    if chunks_written % ACK_POLL_EVERY_CHUNKS != 0 {
        return;
    }
    let mut b = [0u8; 1];
    let link = session.link_mut();
    if link.read_available(&mut b).unwrap_or(0) != 0 && b[0] != crate::constants::ACK_BYTE {
        log::warn!("unexpected byte {:#04x} during bulk transfer ack poll", b[0]);
    }
}

/// Rule 8: write `chunk`; on a locally-recoverable stall, hand off to the
/// Recovery Coordinator and retry the *same* chunk exactly once. A write
/// error that [`LokeError::is_locally_recoverable`] rejects (anything but
/// a stall or timeout) skips recovery entirely — purging and re-greeting
/// a link that just reported a fatal/cancelled error wouldn't help.
async fn write_chunk_with_recovery<B: LinkBackend>(
    session: &mut Session<B>,
    chunk: &[u8],
) -> std::result::Result<(), ChunkFault> {
    let io_err = match session.link_mut().write(chunk).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    let kind = classify_io_error(&io_err);
    let classified: LokeError = TransportError::Io { kind, source: io_err }.into();
    if !classified.is_locally_recoverable() {
        log::warn!("chunk write failed with non-recoverable error ({kind}), not attempting recovery");
        return Err(ChunkFault::RecoveryFailed);
    }

    if recovery::recover(session).await == RecoveryOutcome::Faulted {
        return Err(ChunkFault::RecoveryFailed);
    }

    if session.link_mut().write(chunk).await.is_ok() {
        Ok(())
    } else {
        Err(ChunkFault::StalledAfterRetry)
    }
}
