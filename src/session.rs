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

//! # LOKE Session
//!
//! The state machine in spec.md §4.4: `Open -> Greeted -> PitMode/Transferring
//! -> Ended`, with any state but `Ended` able to fault. A `Session` owns its
//! link exclusively for its lifetime (spec.md §3 lifecycle).

use std::sync::Arc;
use std::time::Duration;

use crate::constants::{
    CONTROL_PACKET_LEN, HANDSHAKE_TIMEOUT, LOKE_GREETING, PIT_READ_IDLE, PIT_SEGMENT_ACK_TIMEOUT,
    STABILITY_WINDOW,
};
use crate::error::{AckStage, FlowError, LokeError, ProtocolError, Result, TransportError};
use crate::frame::{self, Command};
use crate::observer::{LogLevel, Observer};
use crate::transport::{classify_io_error, LinkBackend, PurgeMask};

/// Where the session currently is in the protocol lifecycle. Every state
/// but `Ended` can transition to `Faulted` (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Greeted,
    PitMode,
    Transferring,
    Ended,
    Faulted,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Open => "Open",
            SessionState::Greeted => "Greeted",
            SessionState::PitMode => "PitMode",
            SessionState::Transferring => "Transferring",
            SessionState::Ended => "Ended",
            SessionState::Faulted => "Faulted",
        }
    }
}

/// A live LOKE session driving a single serial link. `B` is the transport
/// backend (spec.md §9's "tagged variant" — real hardware or a test
/// double), generic rather than boxed since a session never swaps backends
/// mid-life.
pub struct Session<B: LinkBackend> {
    backend: B,
    observer: Arc<dyn Observer>,
    state: SessionState,
    seq: u32,
}

impl<B: LinkBackend> Session<B> {
    /// Wrap an already-open link. The link's settling delay (spec.md §4.2)
    /// is the backend's responsibility at construction time, not the
    /// session's.
    pub fn new(backend: B, observer: Arc<dyn Observer>) -> Self {
        Session { backend, observer, state: SessionState::Open, seq: 0 }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn observer(&self) -> &Arc<dyn Observer> {
        &self.observer
    }

    pub(crate) fn link_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    fn next_seq(&mut self) -> u32 {
        let s = self.seq;
        self.seq = self.seq.wrapping_add(1);
        s
    }

    fn require_state(&self, allowed: &[SessionState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(FlowError::UnexpectedState { operation, state: self.state.name() }.into())
        }
    }

    fn notify(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        match level {
            LogLevel::Error => log::error!("{message}"),
            LogLevel::Warning => log::warn!("{message}"),
            LogLevel::Success | LogLevel::Info => log::info!("{message}"),
            LogLevel::Debug => log::debug!("{message}"),
        }
        self.observer.on_log(level, message);
    }

    fn io_err(&mut self, e: std::io::Error) -> LokeError {
        let kind = classify_io_error(&e);
        self.state = SessionState::Faulted;
        LokeError::Transport(TransportError::Io { kind, source: e })
    }

    async fn await_ack(&mut self, deadline: Duration) -> Result<bool> {
        log::trace!("waiting for ack, deadline {deadline:?}");
        let mut byte = [0u8; 1];
        let n = self
            .backend
            .read_exact(&mut byte, deadline)
            .await
            .map_err(|e| self.io_err(e))?;
        if n == 1 {
            log::trace!("ack byte = {:#04x}", byte[0]);
        } else {
            log::trace!("ack not found, timed out");
        }
        Ok(n == 1 && byte[0] == crate::constants::ACK_BYTE)
    }

    /// `Open -> Greeted`: send `ODIN`, tolerate either a `LOKE` reply or a
    /// bare ACK byte (spec.md §4.4 greeting contract, invariant #4). One
    /// retry with a full purge on failure, per the §7 propagation policy
    /// for handshake timeouts.
    pub async fn greet(&mut self) -> Result<()> {
        self.require_state(&[SessionState::Open], "greet")?;

        if self.try_greet_once().await? {
            self.state = SessionState::Greeted;
            self.notify(LogLevel::Success, "ODIN");
            return Ok(());
        }

        self.backend
            .purge(PurgeMask { tx: true, rx: true, abort: true })
            .await
            .map_err(|e| self.io_err(e))?;

        if self.try_greet_once().await? {
            self.state = SessionState::Greeted;
            self.notify(LogLevel::Success, "ODIN");
            return Ok(());
        }

        self.state = SessionState::Faulted;
        self.notify(LogLevel::Error, "Greeting failed");
        Err(ProtocolError::GreetFailed.into())
    }

    async fn try_greet_once(&mut self) -> Result<bool> {
        log::trace!("sending ODIN");
        let pkt = frame::encode(Command::Odin, 0, self.next_seq());
        self.backend.write(&pkt).await.map_err(|e| self.io_err(e))?;

        let mut reply = [0u8; 4];
        let n = self
            .backend
            .read_exact(&mut reply, HANDSHAKE_TIMEOUT)
            .await
            .map_err(|e| self.io_err(e))?;

        Ok((n == 4 && reply == LOKE_GREETING) || (n >= 1 && reply[0] == crate::constants::ACK_BYTE))
    }

    /// Single-attempt re-greet used by [`crate::recovery`] after a purge;
    /// unlike [`Session::greet`] this does not require `Open` and does not
    /// retry on its own (the caller already purged once).
    pub(crate) async fn recover_greet(&mut self) -> Result<()> {
        if self.try_greet_once().await? {
            self.state = SessionState::Greeted;
            Ok(())
        } else {
            self.state = SessionState::Faulted;
            Err(ProtocolError::GreetFailed.into())
        }
    }

    /// `Greeted -> PitMode`: send `PITM`, require ACK.
    pub async fn set_pit(&mut self) -> Result<()> {
        self.require_state(&[SessionState::Greeted], "set_pit")?;

        log::trace!("sending PITM");
        let pkt = frame::encode(Command::Pitm, 0, self.next_seq());
        self.backend.write(&pkt).await.map_err(|e| self.io_err(e))?;

        if !self.await_ack(HANDSHAKE_TIMEOUT).await? {
            self.state = SessionState::Faulted;
            return Err(ProtocolError::BadAck { at_stage: AckStage::PitModeEntry }.into());
        }

        self.state = SessionState::PitMode;
        Ok(())
    }

    /// `PitMode -> Greeted`: stream `data` as 500-byte padded segments,
    /// each awaiting its own ACK, then wait out the stability window
    /// (spec.md §4.4). A missing segment ACK is fatal.
    pub async fn write_pit(&mut self, data: &[u8]) -> Result<()> {
        self.require_state(&[SessionState::PitMode], "write_pit")?;

        let mut offset = 0usize;
        let mut segment = 0u64;
        while offset < data.len() {
            let end = (offset + CONTROL_PACKET_LEN).min(data.len());
            let padded = frame::pad_segment(&data[offset..end]);
            log::trace!("writing PIT segment {segment}, {} bytes", end - offset);
            self.backend.write(&padded).await.map_err(|e| self.io_err(e))?;

            if !self.await_ack(PIT_SEGMENT_ACK_TIMEOUT).await? {
                self.state = SessionState::Faulted;
                self.notify(LogLevel::Error, format!("PIT write at segment {segment}"));
                return Err(ProtocolError::BadAck { at_stage: AckStage::PitWrite { segment } }.into());
            }

            offset = end;
            segment += 1;
        }

        tokio::time::sleep(STABILITY_WINDOW).await;
        self.state = SessionState::Greeted;
        self.notify(LogLevel::Success, "PIT write complete");
        Ok(())
    }

    /// `Greeted -> Greeted`: send `PITR`, drain control-sized chunks until
    /// [`PIT_READ_IDLE`] passes with nothing new. Empty result is an error
    /// (spec.md §4.4, §7 `Protocol::PitEmpty`).
    pub async fn read_pit(&mut self) -> Result<Vec<u8>> {
        self.require_state(&[SessionState::Greeted], "read_pit")?;

        log::trace!("sending PITR");
        let pkt = frame::encode(Command::Pitr, 0, self.next_seq());
        self.backend.write(&pkt).await.map_err(|e| self.io_err(e))?;

        let mut buf = Vec::new();
        loop {
            let mut chunk = [0u8; CONTROL_PACKET_LEN];
            let n = self
                .backend
                .read_exact(&mut chunk, PIT_READ_IDLE)
                .await
                .map_err(|e| self.io_err(e))?;
            log::trace!("read {n} PIT bytes");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        if buf.is_empty() {
            self.state = SessionState::Faulted;
            return Err(ProtocolError::PitEmpty.into());
        }

        Ok(buf)
    }

    /// `Greeted -> Transferring`: send `DATA` with the declared image
    /// size, require ACK. `size` is truncated to 32 bits on the wire per
    /// spec.md §9's open question; [`crate::bulk`] streams the true
    /// length regardless of what was declared.
    pub async fn begin_data(&mut self, size: u64) -> Result<()> {
        self.require_state(&[SessionState::Greeted], "begin_data")?;

        let declared = size as u32;
        log::trace!("sending DATA, declared size {declared} (true size {size})");
        let pkt = frame::encode(Command::Data, declared, self.next_seq());
        self.backend.write(&pkt).await.map_err(|e| self.io_err(e))?;

        if !self.await_ack(HANDSHAKE_TIMEOUT).await? {
            self.state = SessionState::Faulted;
            return Err(ProtocolError::BadAck { at_stage: AckStage::DataStart }.into());
        }

        self.state = SessionState::Transferring;
        Ok(())
    }

    /// `Transferring -> Greeted`: called by the bulk engine once the
    /// image stream is exhausted.
    pub(crate) fn end_data(&mut self) {
        self.state = SessionState::Greeted;
    }

    /// `Greeted -> Ended`: send `ENDS`. Calling this twice returns
    /// `Flow::UnexpectedState` the second time without touching the link
    /// (spec.md §8 invariant #9).
    pub async fn end(&mut self) -> Result<()> {
        self.require_state(&[SessionState::Greeted], "end")?;

        log::trace!("sending ENDS");
        let pkt = frame::encode(Command::Ends, 0, self.next_seq());
        self.backend.write(&pkt).await.map_err(|e| self.io_err(e))?;

        self.state = SessionState::Ended;
        self.notify(LogLevel::Success, "session ended");
        Ok(())
    }

    /// `Greeted -> Ended`: send `REBT`.
    pub async fn reboot(&mut self) -> Result<()> {
        self.require_state(&[SessionState::Greeted], "reboot")?;

        log::trace!("sending REBT");
        let pkt = frame::encode(Command::Rebt, 0, self.next_seq());
        self.backend.write(&pkt).await.map_err(|e| self.io_err(e))?;

        self.state = SessionState::Ended;
        self.notify(LogLevel::Success, "reboot requested");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::observer::test_support::RecordingObserver;
    use crate::transport::mock::MockBackend;

    fn session(backend: MockBackend) -> Session<MockBackend> {
        Session::new(backend, Arc::new(RecordingObserver::default()))
    }

    #[tokio::test]
    async fn s1_greet_only() {
        let mut backend = MockBackend::new();
        backend.push_bytes(*b"LOKE");
        let mut s = session(backend);

        s.greet().await.unwrap();
        assert_eq!(s.state(), SessionState::Greeted);
    }

    #[tokio::test]
    async fn greet_tolerates_bare_ack() {
        let mut backend = MockBackend::new();
        backend.push_bytes(vec![0x06]);
        let mut s = session(backend);

        s.greet().await.unwrap();
        assert_eq!(s.state(), SessionState::Greeted);
    }

    #[tokio::test]
    async fn s2_pit_round_trip() {
        let mut backend = MockBackend::new();
        backend.push_bytes(*b"LOKE"); // ODIN
        backend.push_bytes(vec![0x06]); // PITM ack
        backend.push_bytes(vec![0x06]); // PIT segment ack
        backend.push_bytes(vec![0x01, 0x02, 0x03]); // PITR bytes, short read
        backend.push_silent(); // idle terminator
        let mut s = session(backend);

        s.greet().await.unwrap();
        s.set_pit().await.unwrap();
        s.write_pit(&[0xAA; 10]).await.unwrap();
        assert_eq!(s.state(), SessionState::Greeted);

        let pit = s.read_pit().await.unwrap();
        assert_eq!(&pit, &[0x01, 0x02, 0x03]);
    }

    #[tokio::test]
    async fn ends_twice_is_unexpected_state_without_touching_link() {
        let mut backend = MockBackend::new();
        backend.push_bytes(*b"LOKE");
        let mut s = session(backend);
        s.greet().await.unwrap();
        s.end().await.unwrap();
        assert_eq!(s.state(), SessionState::Ended);

        let before = s.link_mut().written.len();
        let err = s.end().await.unwrap_err();
        assert!(matches!(err, LokeError::Flow(FlowError::UnexpectedState { .. })));
        assert_eq!(s.link_mut().written.len(), before);
    }

    #[tokio::test]
    async fn greet_failure_faults_session() {
        let mut backend = MockBackend::new();
        backend.push_silent();
        backend.push_silent(); // retry also silent
        let mut s = session(backend);

        let err = s.greet().await.unwrap_err();
        assert!(matches!(err, LokeError::Protocol(ProtocolError::GreetFailed)));
        assert_eq!(s.state(), SessionState::Faulted);
    }

    #[tokio::test]
    async fn read_pit_empty_is_error() {
        let mut backend = MockBackend::new();
        backend.push_bytes(*b"LOKE");
        backend.push_silent();
        let mut s = session(backend);
        s.greet().await.unwrap();

        let err = s.read_pit().await.unwrap_err();
        assert!(matches!(err, LokeError::Protocol(ProtocolError::PitEmpty)));
    }
}
