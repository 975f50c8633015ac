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

//! # Port Monitor
//!
//! A cooperative background poller (spec.md §4.9) that reports device
//! presence changes to its owner and never drives protocol traffic
//! itself. It is gated on a shared "session active" flag so it never
//! races an open session's I/O (spec.md §5, §8 invariant #6, §9 "ambient
//! port monitor vs. in-flight session").

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::sleep;

use crate::constants::{MONITOR_BACKOFF_INTERVAL, MONITOR_POLL_INTERVAL};
use crate::locator;
use crate::observer::{Observer, PortEvent};

/// Background poller. Spawn [`PortMonitor::run`] as its own task; it runs
/// until the task is dropped or aborted by the owner.
pub struct PortMonitor {
    observer: Arc<dyn Observer>,
    session_active: Arc<AtomicBool>,
}

impl PortMonitor {
    pub fn new(observer: Arc<dyn Observer>, session_active: Arc<AtomicBool>) -> Self {
        PortMonitor { observer, session_active }
    }

    /// Run forever against the real [`crate::locator`].
    pub async fn run(self) {
        self.run_with_probe(|| async { locator::locate().await.map(|d| d.port_name) })
            .await
    }

    /// Core loop, parameterised over the probe so it's testable without
    /// touching the OS. Never calls `probe` while `session_active` is set
    /// (spec.md §8 invariant #6).
    async fn run_with_probe<F, Fut>(self, mut probe: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        let mut last: Option<String> = None;
        loop {
            if self.session_active.load(Ordering::Acquire) {
                sleep(MONITOR_BACKOFF_INTERVAL).await;
                continue;
            }

            let found = probe().await;
            if let Some(event) = classify_transition(last.as_deref(), found.as_deref()) {
                self.observer.on_port(event);
            }
            last = found;

            sleep(MONITOR_POLL_INTERVAL).await;
        }
    }
}

/// Pure transition logic between two ticks' findings, factored out for
/// testing (spec.md §4.9 events: `Added`, `Removed`, `Changed`).
fn classify_transition(last: Option<&str>, found: Option<&str>) -> Option<PortEvent> {
    match (last, found) {
        (None, Some(name)) => Some(PortEvent::Added(name.to_owned())),
        (Some(_), None) => Some(PortEvent::Removed),
        (Some(old), Some(new)) if old != new => {
            Some(PortEvent::Changed(old.to_owned(), new.to_owned()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::observer::test_support::RecordingObserver;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn classify_transition_matrix() {
        assert!(matches!(classify_transition(None, None), None));
        assert!(matches!(classify_transition(None, Some("COM3")), Some(PortEvent::Added(_))));
        assert!(matches!(classify_transition(Some("COM3"), None), Some(PortEvent::Removed)));
        assert!(matches!(
            classify_transition(Some("COM3"), Some("COM4")),
            Some(PortEvent::Changed(_, _))
        ));
        assert!(matches!(classify_transition(Some("COM3"), Some("COM3")), None));
    }

    #[tokio::test(start_paused = true)]
    async fn s6_unplug_during_idle_emits_removed() {
        let observer = Arc::new(RecordingObserver::default());
        let session_active = Arc::new(AtomicBool::new(false));
        let monitor = PortMonitor::new(observer.clone(), session_active);

        let call = Arc::new(AtomicUsize::new(0));
        let call_clone = call.clone();

        let run = tokio::spawn(async move {
            monitor
                .run_with_probe(move || {
                    let call = call_clone.clone();
                    async move {
                        let n = call.fetch_add(1, Ordering::SeqCst);
                        if n == 0 {
                            Some("ttyACM0".to_owned())
                        } else {
                            None
                        }
                    }
                })
                .await;
        });

        tokio::time::advance(MONITOR_POLL_INTERVAL * 3).await;
        run.abort();

        let ports = observer.ports.lock().unwrap();
        assert!(ports.iter().any(|e| e.contains("Added")));
        assert!(ports.iter().any(|e| e.contains("Removed")));
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_skips_probe_while_session_active() {
        let observer = Arc::new(RecordingObserver::default());
        let session_active = Arc::new(AtomicBool::new(true));
        let monitor = PortMonitor::new(observer.clone(), session_active);

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let run = tokio::spawn(async move {
            monitor
                .run_with_probe(move || {
                    let calls = calls_clone.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        None
                    }
                })
                .await;
        });

        tokio::time::advance(MONITOR_POLL_INTERVAL * 3).await;
        run.abort();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
