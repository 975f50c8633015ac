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

//! # Recovery Coordinator
//!
//! Reacts to a transient I/O stall on an open link (spec.md §4.6): purge,
//! settle, re-greet. Reopening a closed OS handle is the session owner's
//! job (Owner owns Session, Session owns Link, spec.md §9) — if purge and
//! re-greet can't bring the existing handle back, the session is left
//! `Faulted` and the owner re-acquires a fresh link through
//! [`crate::locator`] and [`crate::transport::SerialBackend::open`].

use crate::constants::RECOVERY_SETTLE;
use crate::observer::LogLevel;
use crate::session::Session;
use crate::transport::{LinkBackend, PurgeMask};

/// Result of one recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Recovered,
    Faulted,
}

/// Run the procedure in spec.md §4.6 once. The caller (bulk engine) is
/// responsible for deciding what to do with a `Faulted` outcome — retry
/// the caller's own budget, skip the image, or surface the error.
pub async fn recover<B: LinkBackend>(session: &mut Session<B>) -> RecoveryOutcome {
    session.observer().on_log(LogLevel::Warning, "link stalled, attempting recovery");
    log::warn!("link stalled, attempting recovery");

    let link = session.link_mut();
    if link.purge(PurgeMask { tx: true, rx: true, abort: true }).await.is_err() {
        let _ = link.clear_errors();
    }

    tokio::time::sleep(RECOVERY_SETTLE).await;

    match session.recover_greet().await {
        Ok(()) => {
            session.observer().on_log(LogLevel::Success, "link recovered");
            RecoveryOutcome::Recovered
        }
        Err(_) => {
            session.observer().on_log(LogLevel::Error, "recovery failed to re-greet");
            RecoveryOutcome::Faulted
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::observer::test_support::RecordingObserver;
    use crate::transport::mock::MockBackend;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn recover_succeeds_when_regreet_works() {
        let mut backend = MockBackend::new();
        backend.push_bytes(vec![0x06]);
        let mut session = Session::new(backend, Arc::new(RecordingObserver::default()));

        let outcome = recover(&mut session).await;
        assert_eq!(outcome, RecoveryOutcome::Recovered);
        assert_eq!(session.link_mut().purge_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recover_faults_when_regreet_fails() {
        let mut backend = MockBackend::new();
        backend.push_silent();
        let mut session = Session::new(backend, Arc::new(RecordingObserver::default()));

        let outcome = recover(&mut session).await;
        assert_eq!(outcome, RecoveryOutcome::Faulted);
    }
}
