//! Timeout controller
//!
//! Supervises one hook or test body against its deadline. The deadline,
//! the slow threshold and the skip signal live in a [`RunnableControl`]
//! that only the supervised runnable can change, so an override never leaks
//! into another test.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use super::context::FailureInbox;
use super::panic::catch_failure;
use crate::models::Failure;

#[derive(Debug)]
struct ControlState {
    timeout: Duration,
    slow: Duration,
    skipped: bool,
}

/// Per-runnable deadline, slow threshold and skip signal
#[derive(Debug)]
pub struct RunnableControl {
    state: Mutex<ControlState>,
    changed: Notify,
}

impl RunnableControl {
    pub fn new(timeout: Duration, slow: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ControlState {
                timeout,
                slow,
                skipped: false,
            }),
            changed: Notify::new(),
        })
    }

    /// Replace the deadline; zero disables it
    pub fn set_timeout(&self, timeout: Duration) {
        self.state.lock().timeout = timeout;
        self.changed.notify_one();
    }

    pub fn set_slow(&self, slow: Duration) {
        self.state.lock().slow = slow;
    }

    pub fn mark_skipped(&self) {
        self.state.lock().skipped = true;
        self.changed.notify_one();
    }

    pub fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    pub fn slow(&self) -> Duration {
        self.state.lock().slow
    }

    pub fn is_skipped(&self) -> bool {
        self.state.lock().skipped
    }
}

/// How a supervised body ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Supervised {
    Completed,
    /// The body itself failed or timed out
    Failed(Failure),
    /// Tagged background work failed while the body was running
    Uncaught(Failure),
    Skipped,
}

impl Supervised {
    /// The failure carried by either failed outcome
    pub fn into_failure(self) -> Option<Failure> {
        match self {
            Supervised::Failed(failure) | Supervised::Uncaught(failure) => Some(failure),
            Supervised::Completed | Supervised::Skipped => None,
        }
    }
}

/// Arms deadlines and supervises runnables against them
#[derive(Clone, Debug)]
pub struct TimeoutController {
    default_timeout: Duration,
    default_slow: Duration,
}

impl TimeoutController {
    pub fn new(default_timeout: Duration, default_slow: Duration) -> Self {
        Self {
            default_timeout,
            default_slow,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Arm the control for one runnable; overrides win over the defaults
    pub fn arm(&self, timeout: Option<Duration>, slow: Option<Duration>) -> Arc<RunnableControl> {
        RunnableControl::new(
            timeout.unwrap_or(self.default_timeout),
            slow.unwrap_or(self.default_slow),
        )
    }

    /// Drive `body` until it completes, fails, is skipped or times out
    ///
    /// A failure delivered to `inbox` (tagged background work) ends the body
    /// early as [`Supervised::Uncaught`]. On timeout the body is dropped, so its eventual completion
    /// signal has nowhere to go.
    pub async fn supervise<F>(
        &self,
        control: &RunnableControl,
        body: F,
        mut inbox: Option<&mut FailureInbox>,
    ) -> Supervised
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let started = Instant::now();
        let body = catch_failure(body);
        tokio::pin!(body);

        loop {
            if control.is_skipped() {
                return Supervised::Skipped;
            }
            let limit = control.timeout();
            let deadline = (!limit.is_zero()).then(|| started + limit);

            let background = async {
                match inbox.as_deref_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            };
            let expired = async {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = control.changed.notified() => {
                    debug!("runnable control changed; re-arming deadline");
                    continue;
                }
                result = &mut body => {
                    return match result {
                        _ if control.is_skipped() => Supervised::Skipped,
                        Ok(()) => Supervised::Completed,
                        Err(failure) => Supervised::Failed(failure),
                    };
                }
                Some(failure) = background => {
                    return if control.is_skipped() {
                        Supervised::Skipped
                    } else {
                        Supervised::Uncaught(failure)
                    };
                }
                _ = expired => {
                    return Supervised::Failed(Failure::timeout(limit.as_millis() as u64));
                }
            }
        }
    }
}

impl Default for TimeoutController {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000), Duration::from_millis(75))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureKind;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_before_deadline() {
        let controller = TimeoutController::default();
        let control = controller.arm(None, None);
        let outcome = controller
            .supervise(
                &control,
                async {
                    sleep(ms(100)).await;
                    Ok(())
                },
                None,
            )
            .await;
        assert_eq!(outcome, Supervised::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout_fires() {
        let controller = TimeoutController::default();
        let control = controller.arm(None, None);
        let start = Instant::now();
        let outcome = controller
            .supervise(&control, std::future::pending(), None)
            .await;

        match outcome {
            Supervised::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::Timeout);
                assert!(failure.message.contains("timeout of 2000ms exceeded"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(start.elapsed() >= ms(2000));
        assert!(start.elapsed() < ms(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_from_inside_body() {
        let controller = TimeoutController::default();
        let control = controller.arm(None, None);
        let inner = Arc::clone(&control);
        let outcome = controller
            .supervise(
                &control,
                async move {
                    inner.set_timeout(ms(100));
                    sleep(ms(500)).await;
                    Ok(())
                },
                None,
            )
            .await;

        assert_eq!(outcome, Supervised::Failed(Failure::timeout(100)));
        // the override stays with this control only
        assert_eq!(controller.arm(None, None).timeout(), ms(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_disables_deadline() {
        let controller = TimeoutController::new(ms(50), ms(75));
        let control = controller.arm(Some(Duration::ZERO), None);
        let outcome = controller
            .supervise(
                &control,
                async {
                    sleep(ms(500)).await;
                    Ok(())
                },
                None,
            )
            .await;
        assert_eq!(outcome, Supervised::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_signal_ends_body() {
        let controller = TimeoutController::default();
        let control = controller.arm(None, None);
        let inner = Arc::clone(&control);
        let outcome = controller
            .supervise(
                &control,
                async move {
                    inner.mark_skipped();
                    sleep(ms(10_000)).await;
                    Ok(())
                },
                None,
            )
            .await;
        assert_eq!(outcome, Supervised::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbox_failure_ends_body() {
        let controller = TimeoutController::default();
        let control = controller.arm(None, None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            sleep(ms(50)).await;
            let _ = tx.send(Failure::new(FailureKind::Uncaught, "from background"));
        });

        let outcome = controller
            .supervise(&control, std::future::pending(), Some(&mut rx))
            .await;
        assert_eq!(
            outcome,
            Supervised::Uncaught(Failure::new(FailureKind::Uncaught, "from background"))
        );
    }
}
