//! Run-wide shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

use crate::config::FailurePolicy;

/// State shared by every execution path of one run.
///
/// The abort flag only ever moves from `false` to `true`. Raising it also
/// wakes everything parked in [`RunState::aborted`].
#[derive(Debug)]
pub struct RunState {
    aborted: AtomicBool,
    wakeup: watch::Sender<bool>,
    policy: FailurePolicy,
}

impl RunState {
    /// Fresh state with the abort flag cleared.
    pub fn new(policy: FailurePolicy) -> Self {
        let (wakeup, _) = watch::channel(false);
        Self {
            aborted: AtomicBool::new(false),
            wakeup,
            policy,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Raise the abort flag. Returns `true` if this call raised it.
    pub fn abort(&self) -> bool {
        let raised = !self.aborted.swap(true, Ordering::SeqCst);
        if raised {
            self.wakeup.send_replace(true);
        }
        raised
    }

    /// Resolve once the abort flag is raised; immediately if it already is.
    pub async fn aborted(&self) {
        let mut receiver = self.wakeup.subscribe();
        // The sender lives as long as `self`, so this cannot see a closed channel.
        let _ = receiver.wait_for(|aborted| *aborted).await;
    }

    /// Raise the abort flag if the policy says failures abort the run.
    pub fn record_failure(&self) -> bool {
        match self.policy {
            FailurePolicy::Abort => self.abort(),
            FailurePolicy::Continue => false,
        }
    }
}
