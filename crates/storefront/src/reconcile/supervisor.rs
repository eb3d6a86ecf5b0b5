//! Detached execution of login merges.
//!
//! The OAuth callback must not wait for the merge, but a merge that fails in
//! the background must still be seen. Every job reports into a channel that
//! a drain task logs and forwards to Sentry.

use std::future::Future;
use std::time::Duration;

use larder_core::{ErrorKind, ReconciliationResult};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Outcome of one background merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeReport {
    /// The job ran to completion.
    Completed {
        label: String,
        result: ReconciliationResult,
    },
    /// The job panicked or was cancelled.
    Panicked { label: String, message: String },
}

impl MergeReport {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Completed { label, .. } | Self::Panicked { label, .. } => label,
        }
    }
}

/// Spawns background merges and collects their reports.
#[derive(Clone)]
pub struct MergeSupervisor {
    reports: mpsc::UnboundedSender<MergeReport>,
    settle: Duration,
}

impl MergeSupervisor {
    /// Start a supervisor whose reports are logged and sent to Sentry.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(settle: Duration) -> Self {
        let (supervisor, mut rx) = Self::with_observer(settle);

        info!("Spawning background merge report drain");
        tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                record(&report);
            }
            debug!("Merge report channel closed");
        });

        supervisor
    }

    /// A supervisor whose reports go to the returned receiver instead.
    #[must_use]
    pub fn with_observer(settle: Duration) -> (Self, mpsc::UnboundedReceiver<MergeReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                reports: tx,
                settle,
            },
            rx,
        )
    }

    /// Run `job` in the background after the settle delay.
    ///
    /// Returns immediately. A panic inside the job is caught and reported.
    pub fn spawn<F, Fut>(&self, label: impl Into<String>, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ReconciliationResult> + Send + 'static,
    {
        let label = label.into();
        let reports = self.reports.clone();
        let settle = self.settle;

        tokio::spawn(async move {
            tokio::time::sleep(settle).await;

            let report = match tokio::spawn(async move { job().await }).await {
                Ok(result) => MergeReport::Completed {
                    label: label.clone(),
                    result,
                },
                Err(e) => MergeReport::Panicked {
                    label: label.clone(),
                    message: if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        e.to_string()
                    },
                },
            };

            if let Err(e) = reports.send(report) {
                // Drain is gone (shutdown); log what would have been reported.
                record(&e.0);
            }
        });
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Sentry level for a failed merge, or `None` when nothing went wrong.
///
/// Outages are expected to clear up on their own; anything else means the
/// cart could not be reconciled.
const fn failure_level(reason: ErrorKind) -> Option<sentry::Level> {
    if !reason.is_failure() {
        None
    } else if reason.is_retryable() {
        Some(sentry::Level::Warning)
    } else {
        Some(sentry::Level::Error)
    }
}

/// Log a report and forward failures to Sentry.
fn record(report: &MergeReport) {
    match report {
        MergeReport::Completed {
            label,
            result: ReconciliationResult::Success { cart },
        } => {
            info!(label, cart_id = %cart.id, "Background merge completed");
        }
        MergeReport::Completed {
            label,
            result: ReconciliationResult::Failure { reason, .. },
        } => match failure_level(*reason) {
            None => debug!(label, reason = %reason, "Background merge skipped"),
            Some(level) => {
                warn!(
                    label,
                    reason = %reason,
                    retryable = reason.is_retryable(),
                    "Background merge failed"
                );
                sentry::capture_message(&format!("Background cart merge failed: {reason}"), level);
            }
        },
        MergeReport::Panicked { label, message } => {
            error!(label, message, "Background merge panicked");
            sentry::capture_message(
                &format!("Background cart merge panicked: {message}"),
                sentry::Level::Error,
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::reconcile::testing::anonymous_cart;

    #[tokio::test]
    async fn test_spawn_returns_before_job_runs() {
        let (supervisor, mut rx) = MergeSupervisor::with_observer(Duration::from_millis(50));
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        supervisor.spawn("login", move || async move {
            flag.store(true, Ordering::SeqCst);
            ReconciliationResult::success(anonymous_cart("c1", &[]))
        });
        assert!(!ran.load(Ordering::SeqCst));

        let report = rx.recv().await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(report.label(), "login");
        assert!(matches!(
            report,
            MergeReport::Completed { ref result, .. } if result.is_success()
        ));
    }

    #[tokio::test]
    async fn test_failures_are_reported() {
        let (supervisor, mut rx) = MergeSupervisor::with_observer(Duration::ZERO);

        supervisor.spawn("login", || async {
            ReconciliationResult::failure(ErrorKind::MergeFailed, None)
        });

        let report = rx.recv().await.unwrap();
        assert_eq!(
            report,
            MergeReport::Completed {
                label: "login".to_string(),
                result: ReconciliationResult::failure(ErrorKind::MergeFailed, None),
            }
        );
    }

    #[tokio::test]
    async fn test_panics_are_caught() {
        let (supervisor, mut rx) = MergeSupervisor::with_observer(Duration::ZERO);

        supervisor.spawn("login", || async { panic!("session store exploded") });

        let report = rx.recv().await.unwrap();
        assert_eq!(
            report,
            MergeReport::Panicked {
                label: "login".to_string(),
                message: "session store exploded".to_string(),
            }
        );
    }

    #[test]
    fn test_record_handles_every_report() {
        record(&MergeReport::Completed {
            label: "a".to_string(),
            result: ReconciliationResult::failure(ErrorKind::NotAuthenticated, None),
        });
        record(&MergeReport::Panicked {
            label: "b".to_string(),
            message: "boom".to_string(),
        });
    }

    #[test]
    fn test_failure_level() {
        assert_eq!(failure_level(ErrorKind::NotAuthenticated), None);
        assert_eq!(
            failure_level(ErrorKind::TransientFetch),
            Some(sentry::Level::Warning)
        );
        assert_eq!(
            failure_level(ErrorKind::MergeFailed),
            Some(sentry::Level::Error)
        );
    }
}
