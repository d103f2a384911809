//! Background polling of the transcription service's availability.
//!
//! The poller checks once on activation and then on a fixed interval until it is
//! deactivated. Every resolution is pushed to the registered observer, repeated
//! values included. The poller task is the only writer of the current status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::StatusProbe;

/// Interval between availability checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Availability of the transcription service as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Checking,
    Available,
    Unavailable,
}

impl ServiceStatus {
    /// Whether a pipeline run may be started
    pub fn allows_start(self) -> bool {
        self == ServiceStatus::Available
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceStatus::Checking => "checking",
            ServiceStatus::Available => "available",
            ServiceStatus::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// Run a single availability check; every failure maps to `Unavailable`
pub async fn check_once(probe: &dyn StatusProbe) -> ServiceStatus {
    match probe.check_service().await {
        Ok(report) if report.available => {
            tracing::debug!("Transcription service available: {}", report.message);
            ServiceStatus::Available
        }
        Ok(report) => {
            tracing::warn!("Transcription service unavailable: {}", report.message);
            ServiceStatus::Unavailable
        }
        Err(e) => {
            tracing::warn!("Transcription service check failed: {}", e);
            ServiceStatus::Unavailable
        }
    }
}

type Observer = Box<dyn Fn(ServiceStatus) + Send + Sync>;
type ObserverSlot = Arc<Mutex<Option<Observer>>>;

fn deliver(slot: &ObserverSlot, status: ServiceStatus) {
    let observer = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(observer) = observer.as_ref() {
        observer(status);
    }
}

/// Start polling `probe` every `interval`, notifying `observer` on each resolution
///
/// The observer runs on the poller task and must not deactivate the poller itself.
pub fn activate<F>(probe: Arc<dyn StatusProbe>, interval: Duration, observer: F) -> PollerHandle
where
    F: Fn(ServiceStatus) + Send + Sync + 'static,
{
    let (status_tx, status_rx) = watch::channel(ServiceStatus::Checking);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let observer: Observer = Box::new(observer);
    let slot: ObserverSlot = Arc::new(Mutex::new(Some(observer)));

    let task = tokio::spawn({
        let slot = slot.clone();
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                }

                let status = tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    status = check_once(probe.as_ref()) => status,
                };

                status_tx.send_replace(status);
                deliver(&slot, status);
            }

            tracing::debug!("Status poller stopped");
        }
    });

    PollerHandle {
        status: status_rx,
        observer: slot,
        shutdown: Some(shutdown_tx),
        task: Some(task),
    }
}

/// Handle to a running poller; dropping it deactivates the poller
pub struct PollerHandle {
    status: watch::Receiver<ServiceStatus>,
    observer: ObserverSlot,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Latest resolved status, `Checking` until the first check completes
    pub fn status(&self) -> ServiceStatus {
        *self.status.borrow()
    }

    /// Wait for the first check to resolve
    pub async fn resolved(&mut self) -> ServiceStatus {
        match self
            .status
            .wait_for(|status| *status != ServiceStatus::Checking)
            .await
        {
            Ok(status) => *status,
            // Poller is gone without ever resolving
            Err(_) => ServiceStatus::Unavailable,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Stop polling; no observer notification happens after this returns
    pub fn deactivate(&mut self) {
        self.observer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockStatusProbe, StatusReport};
    use crate::TransportError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn recorder() -> (Arc<Mutex<Vec<ServiceStatus>>>, impl Fn(ServiceStatus) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |status| sink.lock().unwrap().push(status))
    }

    fn alternating_probe() -> MockStatusProbe {
        let calls = AtomicUsize::new(0);
        let mut probe = MockStatusProbe::new();
        probe.expect_check_service().returning(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok(StatusReport {
                available: n % 2 == 0,
                message: format!("check {}", n),
            })
        });
        probe
    }

    /// Blocks every check until released
    struct GatedProbe {
        entered: AtomicBool,
        release: Notify,
    }

    #[async_trait]
    impl StatusProbe for GatedProbe {
        async fn check_service(&self) -> Result<StatusReport, TransportError> {
            self.entered.store(true, Ordering::SeqCst);
            self.release.notified().await;
            Ok(StatusReport {
                available: true,
                message: String::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_checks_immediately_then_on_interval() {
        let (seen, observer) = recorder();
        let mut handle = activate(Arc::new(alternating_probe()), DEFAULT_POLL_INTERVAL, observer);

        assert_eq!(handle.resolved().await, ServiceStatus::Available);

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ServiceStatus::Available,
                ServiceStatus::Unavailable,
                ServiceStatus::Available,
            ]
        );
        assert_eq!(handle.status(), ServiceStatus::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_notifications_after_deactivation() {
        let (seen, observer) = recorder();
        let mut handle = activate(Arc::new(alternating_probe()), DEFAULT_POLL_INTERVAL, observer);

        tokio::time::sleep(Duration::from_secs(35)).await;
        let before = seen.lock().unwrap().len();
        assert_eq!(before, 2);

        handle.deactivate();
        assert!(!handle.is_active());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(seen.lock().unwrap().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_states_are_not_deduplicated() {
        let mut probe = MockStatusProbe::new();
        probe.expect_check_service().returning(|| {
            Ok(StatusReport {
                available: true,
                message: "Transcription service is available".to_string(),
            })
        });

        let (seen, observer) = recorder();
        let _handle = activate(Arc::new(probe), Duration::from_secs(30), observer);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(*seen.lock().unwrap(), vec![ServiceStatus::Available; 4]);
    }

    #[tokio::test]
    async fn test_failures_map_to_unavailable() {
        let mut probe = MockStatusProbe::new();
        probe
            .expect_check_service()
            .times(1)
            .returning(|| Err(TransportError::Stream("connection refused".to_string())));
        assert_eq!(check_once(&probe).await, ServiceStatus::Unavailable);

        let mut probe = MockStatusProbe::new();
        probe.expect_check_service().times(1).returning(|| {
            Ok(StatusReport {
                available: false,
                message: "model missing".to_string(),
            })
        });
        assert_eq!(check_once(&probe).await, ServiceStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_in_flight_check_is_discarded_after_deactivation() {
        let probe = Arc::new(GatedProbe {
            entered: AtomicBool::new(false),
            release: Notify::new(),
        });
        let (seen, observer) = recorder();
        let mut handle = activate(probe.clone(), DEFAULT_POLL_INTERVAL, observer);

        while !probe.entered.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        assert_eq!(handle.status(), ServiceStatus::Checking);

        handle.deactivate();
        probe.release.notify_waiters();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(handle.status(), ServiceStatus::Checking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let counter = Arc::new(AtomicUsize::new(0));
        let observer = {
            let counter = counter.clone();
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        };

        let handle = activate(Arc::new(alternating_probe()), DEFAULT_POLL_INTERVAL, observer);
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(handle);

        let count = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count, 1);
        assert_eq!(counter.load(Ordering::SeqCst), count);
    }
}
