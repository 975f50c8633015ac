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

//! # LOKE session engine
//!
//! A host-side client for Samsung mobile devices in Download Mode: it
//! speaks the LOKE/Odin protocol over a USB-CDC serial link to negotiate
//! a session, read and write the partition table (PIT), stream firmware
//! images, and reboot the device.
//!
//! The crate has no opinion on UI. A host program wires
//! [`locator::locate`] (or its own port choice) to [`connect`], drives the
//! resulting [`Session`] through its operations, and implements
//! [`Observer`] to receive logs, progress, and port events.
//!
//! # See also
//!
//! - Samsung Odin/LOKE Download Mode, USB VID `0x04E8`, PID `0x685D`/`0x6860`.

pub mod bulk;
pub mod constants;
pub mod error;
pub mod frame;
pub mod locator;
pub mod monitor;
pub mod observer;
pub mod pit;
pub mod ports;
pub mod recovery;
pub mod session;
pub mod tar_stream;
pub mod transport;

pub use crate::bulk::{transfer, ImageStream, TransferOutcome};
pub use crate::error::{LokeError, Result};
pub use crate::locator::{locate, PortDescriptor};
pub use crate::observer::{LogLevel, NullObserver, Observer, PortEvent};
pub use crate::session::{Session, SessionState};
pub use crate::transport::{LinkBackend, SerialBackend};

use std::sync::Arc;

/// Open `port_name` with the mandatory LOKE line settings and settling
/// delay, and wrap it in a fresh [`Session`] in the `Open` state. The
/// caller still has to call [`Session::greet`] before anything else.
pub async fn connect(port_name: &str, observer: Arc<dyn Observer>) -> Result<Session<SerialBackend>> {
    let backend = SerialBackend::open(port_name).await?;
    Ok(Session::new(backend, observer))
}
