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

//! Error taxonomy for the LOKE session engine, see spec.md §7.

use std::fmt;

use thiserror::Error;

/// The stage a missing/bad ACK was observed at, for [`ProtocolError::BadAck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStage {
    PitWrite { segment: u64 },
    PitModeEntry,
    DataStart,
}

impl fmt::Display for AckStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckStage::PitWrite { segment } => write!(f, "PIT write at segment {segment}"),
            AckStage::PitModeEntry => write!(f, "PIT mode entry"),
            AckStage::DataStart => write!(f, "DATA start"),
        }
    }
}

/// Transport-level I/O failure kinds, see spec.md §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Stalled,
    Cancelled,
    Timeout,
    Fatal,
}

impl fmt::Display for IoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IoKind::Stalled => "stalled",
            IoKind::Cancelled => "cancelled",
            IoKind::Timeout => "timed out",
            IoKind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no eligible Samsung Download Mode device present")]
    NotFound,
    #[error("could not open serial endpoint: {cause}")]
    OpenFailed { cause: String },
    #[error("I/O {kind}: {source}")]
    Io {
        kind: IoKind,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("greeting failed: no LOKE/ACK reply after settling and one retry")]
    GreetFailed,
    #[error("missing acknowledgement at {at_stage}")]
    BadAck { at_stage: AckStage },
    #[error("PITR returned zero bytes")]
    PitEmpty,
    #[error("PIT blob rejected by validator: {reason}")]
    PitInvalid { reason: &'static str },
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("operation not permitted in the current session state: {operation} while {state}")]
    UnexpectedState { operation: &'static str, state: &'static str },
}

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("tar archive is corrupt: {0}")]
    TarCorrupt(String),
    #[error("file missing: {0}")]
    FileMissing(String),
}

/// Top-level error type returned by every public operation in this crate.
#[derive(Debug, Error)]
pub enum LokeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    External(#[from] ExternalError),
}

impl LokeError {
    /// Whether this error is, per spec.md §7, recoverable locally by the
    /// [`crate::recovery`] coordinator rather than requiring surfacing.
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(
            self,
            LokeError::Transport(TransportError::Io {
                kind: IoKind::Stalled | IoKind::Timeout,
                ..
            })
        )
    }
}

pub type Result<T> = std::result::Result<T, LokeError>;
