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

//! # Serial Link
//!
//! Scoped acquisition of a serial endpoint, see spec.md §4.2. The concrete
//! transport is a tagged variant via the [`LinkBackend`] trait (spec.md §9:
//! "the source mixes two engines behind runtime switches... this collapses
//! to a single engine with a tagged variant for the transport backend").
//! `SerialBackend` drives real hardware through `tokio-serial`;
//! `mock::MockBackend` (test-only) drives the scenarios in spec.md §8.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::SerialPort as _;
use tokio_serial::SerialStream;

use crate::constants::{BAUD_RATE, OS_BUFFER_LEN};
use crate::error::{IoKind, TransportError};

/// What a [`purge`](LinkBackend::purge) call should clear.
#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeMask {
    pub tx: bool,
    pub rx: bool,
    pub abort: bool,
}

/// Backend abstraction the LOKE engine drives: `open, close, write,
/// read_available, read_exact, purge, clear_errors, set_timeouts`
/// (spec.md §9).
pub trait LinkBackend: Send {
    /// Blocking write of the full buffer; surfaces the OS error kind.
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read until `buf` is full or `deadline` elapses, returning the
    /// number of bytes actually filled.
    async fn read_exact(&mut self, buf: &mut [u8], deadline: Duration) -> io::Result<usize>;

    /// Non-blocking copy of whatever is currently buffered. Returns 0 if
    /// nothing is available right now.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Native buffer purge: cancel in-flight I/O and discard the
    /// requested direction buffers (the `PurgeComm` composite, spec.md
    /// §4.2/§9).
    async fn purge(&mut self, mask: PurgeMask) -> io::Result<()>;

    /// Native clear-error equivalent: retrieve and discard a hardware
    /// error bitmask. Best-effort cross-platform fallback for when
    /// `purge` alone doesn't unstick the port.
    fn clear_errors(&mut self) -> io::Result<()>;

    /// Adjust read/write timeouts for large-file phases (spec.md §4.2).
    fn set_timeouts(&mut self, read: Duration, write: Option<Duration>);
}

/// Real hardware backend over `tokio-serial`.
pub struct SerialBackend {
    port: SerialStream,
    read_timeout: Duration,
    write_timeout: Option<Duration>,
}

impl SerialBackend {
    /// Open `path` with the fixed LOKE line settings and wait out the
    /// mandatory 500 ms settling window (spec.md §4.2) before returning.
    pub async fn open(path: &str) -> Result<Self, TransportError> {
        let builder = tokio_serial::new(path, BAUD_RATE)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None);

        let mut port = builder
            .open_native_async()
            .map_err(|e| TransportError::OpenFailed { cause: e.to_string() })?;

        port.write_data_terminal_ready(true)
            .map_err(|e| TransportError::OpenFailed { cause: e.to_string() })?;
        port.write_request_to_send(true)
            .map_err(|e| TransportError::OpenFailed { cause: e.to_string() })?;

        let _ = port.set_buffer_size(OS_BUFFER_LEN as u32);

        tokio::time::sleep(crate::constants::SETTLE_DELAY).await;

        Ok(SerialBackend {
            port,
            read_timeout: crate::constants::DEFAULT_READ_TIMEOUT,
            write_timeout: Some(crate::constants::DEFAULT_WRITE_TIMEOUT),
        })
    }
}

impl LinkBackend for SerialBackend {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        log::trace!("write {} bytes", bytes.len());
        let fut = self.port.write_all(bytes);
        match self.write_timeout {
            Some(d) => timeout(d, fut)
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))??,
            None => fut.await?,
        };
        self.port.flush().await
    }

    async fn read_exact(&mut self, buf: &mut [u8], deadline: Duration) -> io::Result<usize> {
        log::trace!("read_exact wants {} bytes, deadline {:?}", buf.len(), deadline);
        let mut read = 0;
        let result = timeout(deadline, async {
            while read < buf.len() {
                let n = self.port.read(&mut buf[read..]).await?;
                if n == 0 {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "port closed"));
                }
                read += n;
            }
            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => {
                log::trace!("read_exact got all {read} bytes");
                Ok(read)
            }
            Ok(Err(e)) => Err(e),
            // Deadline elapsed: not necessarily an error, caller decides
            // (spec.md §4.3 "silent is not failure").
            Err(_) => {
                log::trace!("read_exact timed out after {read} of {} bytes", buf.len());
                Ok(read)
            }
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.try_read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    async fn purge(&mut self, mask: PurgeMask) -> io::Result<()> {
        use tokio_serial::ClearBuffer;
        let which = match (mask.tx, mask.rx) {
            (true, true) => ClearBuffer::All,
            (true, false) => ClearBuffer::Output,
            (false, true) => ClearBuffer::Input,
            (false, false) => return Ok(()),
        };
        self.port.clear(which)?;
        if mask.abort {
            // tokio-serial has no separate "abort pending overlapped I/O"
            // primitive; clearing the buffers and letting any in-flight
            // read/write time out naturally is the cross-platform
            // equivalent (spec.md §9).
        }
        Ok(())
    }

    fn clear_errors(&mut self) -> io::Result<()> {
        self.port.clear(tokio_serial::ClearBuffer::All)
    }

    fn set_timeouts(&mut self, read: Duration, write: Option<Duration>) {
        self.read_timeout = read;
        self.write_timeout = write;
    }
}

/// Map a raw I/O error into the recovery-relevant [`IoKind`] taxonomy.
pub fn classify_io_error(err: &io::Error) -> IoKind {
    match err.kind() {
        io::ErrorKind::TimedOut => IoKind::Timeout,
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => IoKind::Stalled,
        io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe => IoKind::Cancelled,
        _ => IoKind::Fatal,
    }
}

#[cfg(test)]
pub mod mock {
    //! Deterministic in-memory [`LinkBackend`] used by session/bulk tests
    //! (spec.md §8 scenarios S1-S7).

    use super::*;
    use std::collections::VecDeque;

    /// A scripted response: either bytes to return (e.g. "LOKE" or a
    /// single 0x06), or a transient error to inject on the next write.
    pub enum Scripted {
        Bytes(Vec<u8>),
        IoError(io::ErrorKind),
        /// Stay silent for this read (simulates the "ACK absent" case).
        Silent,
    }

    pub struct MockBackend {
        pub written: Vec<u8>,
        /// Length of each successful `write` call, in order. Lets tests
        /// assert on wire-level chunk boundaries, not just total bytes.
        pub write_lens: Vec<usize>,
        pub inbound: VecDeque<Scripted>,
        pub purge_count: u32,
        pub clear_errors_count: u32,
        read_timeout: Duration,
    }

    impl MockBackend {
        pub fn new() -> Self {
            MockBackend {
                written: Vec::new(),
                write_lens: Vec::new(),
                inbound: VecDeque::new(),
                purge_count: 0,
                clear_errors_count: 0,
                read_timeout: crate::constants::DEFAULT_READ_TIMEOUT,
            }
        }

        pub fn push_bytes(&mut self, bytes: impl Into<Vec<u8>>) {
            self.inbound.push_back(Scripted::Bytes(bytes.into()));
        }

        pub fn push_error(&mut self, kind: io::ErrorKind) {
            self.inbound.push_back(Scripted::IoError(kind));
        }

        pub fn push_silent(&mut self) {
            self.inbound.push_back(Scripted::Silent);
        }
    }

    impl Default for MockBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl LinkBackend for MockBackend {
        async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            if let Some(Scripted::IoError(kind)) = self.inbound.front() {
                let kind = *kind;
                self.inbound.pop_front();
                return Err(io::Error::new(kind, "mock injected error"));
            }
            self.written.extend_from_slice(bytes);
            self.write_lens.push(bytes.len());
            Ok(())
        }

        async fn read_exact(&mut self, buf: &mut [u8], _deadline: Duration) -> io::Result<usize> {
            match self.inbound.pop_front() {
                Some(Scripted::Bytes(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(Scripted::IoError(kind)) => Err(io::Error::new(kind, "mock injected error")),
                Some(Scripted::Silent) | None => Ok(0),
            }
        }

        fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.inbound.front() {
                Some(Scripted::Bytes(_)) => {
                    if let Some(Scripted::Bytes(bytes)) = self.inbound.pop_front() {
                        let n = bytes.len().min(buf.len());
                        buf[..n].copy_from_slice(&bytes[..n]);
                        Ok(n)
                    } else {
                        unreachable!()
                    }
                }
                _ => Ok(0),
            }
        }

        async fn purge(&mut self, _mask: PurgeMask) -> io::Result<()> {
            self.purge_count += 1;
            Ok(())
        }

        fn clear_errors(&mut self) -> io::Result<()> {
            self.clear_errors_count += 1;
            Ok(())
        }

        fn set_timeouts(&mut self, read: Duration, _write: Option<Duration>) {
            self.read_timeout = read;
        }
    }
}
