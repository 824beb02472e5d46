//! Activation state shared by the components of one watch session
//!
//! One [`ActivationState`] is created per session and handed to every
//! component by `Arc`. The commit/push cycle is guarded by an explicit
//! try-acquire permit rather than by convention: whoever holds a
//! [`CycleGuard`] is the only orchestrator running for the repository, and
//! dropping the guard always releases it.

use std::sync::atomic::{AtomicBool, Ordering};

/// Status flags of one watch session
#[derive(Debug)]
pub struct ActivationState {
    enabled: AtomicBool,
    cycle: AtomicBool,
    pushing: AtomicBool,
    pulling: AtomicBool,
    committing: AtomicBool,
    last_commit_successful: AtomicBool,
}

/// A point-in-time copy of the flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    pub enabled: bool,
    pub busy: bool,
    pub pushing: bool,
    pub pulling: bool,
    pub committing: bool,
    pub last_commit_successful: bool,
}

/// Which in-flight flag a [`FlagGuard`] holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Pushing,
    Pulling,
    Committing,
}

impl ActivationState {
    /// A fresh state; the last commit counts as successful
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            cycle: AtomicBool::new(false),
            pushing: AtomicBool::new(false),
            pulling: AtomicBool::new(false),
            committing: AtomicBool::new(false),
            last_commit_successful: AtomicBool::new(true),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_pushing(&self) -> bool {
        self.pushing.load(Ordering::SeqCst)
    }

    pub fn is_pulling(&self) -> bool {
        self.pulling.load(Ordering::SeqCst)
    }

    pub fn is_committing(&self) -> bool {
        self.committing.load(Ordering::SeqCst)
    }

    /// Whether a commit/push cycle currently holds the permit
    pub fn is_busy(&self) -> bool {
        self.cycle.load(Ordering::SeqCst)
    }

    pub fn last_commit_successful(&self) -> bool {
        self.last_commit_successful.load(Ordering::SeqCst)
    }

    /// Record the outcome of a commit, returning the previous value
    pub fn swap_last_commit_successful(&self, successful: bool) -> bool {
        self.last_commit_successful.swap(successful, Ordering::SeqCst)
    }

    /// Take the cycle permit, or `None` if a cycle is already running
    pub fn try_begin_cycle(&self) -> Option<CycleGuard<'_>> {
        self.cycle
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| CycleGuard { state: self })
    }

    /// Raise an in-flight flag until the returned guard is dropped
    pub fn begin(&self, activity: Activity) -> FlagGuard<'_> {
        self.flag(activity).store(true, Ordering::SeqCst);
        FlagGuard {
            state: self,
            activity,
        }
    }

    /// Clear every in-flight flag
    pub fn clear_activity(&self) {
        self.pushing.store(false, Ordering::SeqCst);
        self.pulling.store(false, Ordering::SeqCst);
        self.committing.store(false, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            enabled: self.is_enabled(),
            busy: self.is_busy(),
            pushing: self.is_pushing(),
            pulling: self.is_pulling(),
            committing: self.is_committing(),
            last_commit_successful: self.last_commit_successful(),
        }
    }

    fn flag(&self, activity: Activity) -> &AtomicBool {
        match activity {
            Activity::Pushing => &self.pushing,
            Activity::Pulling => &self.pulling,
            Activity::Committing => &self.committing,
        }
    }
}

impl Default for ActivationState {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Exclusive permit for one commit/push cycle
#[derive(Debug)]
pub struct CycleGuard<'a> {
    state: &'a ActivationState,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.state.cycle.store(false, Ordering::SeqCst);
    }
}

/// Holds one in-flight flag raised
#[derive(Debug)]
pub struct FlagGuard<'a> {
    state: &'a ActivationState,
    activity: Activity,
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.state.flag(self.activity).store(false, Ordering::SeqCst);
    }
}
