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

//! # Observation Surface
//!
//! What the engine exports upward to a host program, see spec.md §6. This
//! is deliberately separate from the ambient `log` crate: `log` macros are
//! for developer-facing diagnostics read from a terminal/file, `Observer`
//! is the structured channel a GUI or other host-side collaborator drives
//! progress bars and port lists from. No return is expected from any of
//! these calls.

/// Severity attached to an [`Observer::on_log`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
    Warning,
    Error,
    Success,
}

/// A port-presence change detected by [`crate::monitor::PortMonitor`].
#[derive(Debug, Clone)]
pub enum PortEvent {
    Added(String),
    Removed,
    Changed(String, String),
}

/// Host-facing observer. All methods have a default no-op body so callers
/// only implement the notifications they care about.
pub trait Observer: Send + Sync {
    fn on_log(&self, _level: LogLevel, _message: &str) {}
    fn on_progress(&self, _bytes_sent: u64, _total: u64) {}
    fn on_port(&self, _event: PortEvent) {}
}

/// An observer that does nothing; used where the caller supplies none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingObserver {
        pub logs: Mutex<Vec<(LogLevel, String)>>,
        pub progress: Mutex<Vec<(u64, u64)>>,
        pub ports: Mutex<Vec<String>>,
    }

    impl Observer for RecordingObserver {
        fn on_log(&self, level: LogLevel, message: &str) {
            self.logs.lock().unwrap().push((level, message.to_owned()));
        }

        fn on_progress(&self, bytes_sent: u64, total: u64) {
            self.progress.lock().unwrap().push((bytes_sent, total));
        }

        fn on_port(&self, event: PortEvent) {
            self.ports.lock().unwrap().push(format!("{event:?}"));
        }
    }
}
