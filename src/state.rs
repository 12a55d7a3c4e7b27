use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const HEALTHY: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const UNAVAILABLE: u8 = 2;

/// Health phase reported by the process-wide state flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthPhase {
    Healthy,
    ShuttingDown,
    Unavailable,
}

/// Process-wide health flag consulted by the `/health` endpoint.
///
/// Transitions are one-way: once the process leaves `Healthy` it never
/// returns, and the first writer wins. Reads are plain atomic loads so the
/// health endpoint never blocks on a lock.
#[derive(Debug, Clone)]
pub struct ProcessState {
    inner: Arc<AtomicU8>,
}

impl ProcessState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(HEALTHY)),
        }
    }

    /// Mark the process as draining ahead of an operator-requested stop.
    /// Returns whether this call performed the transition.
    pub fn set_shutting_down(&self) -> bool {
        self.transition(SHUTTING_DOWN)
    }

    /// Mark the process as failed after an internal fault.
    /// Returns whether this call performed the transition.
    pub fn set_unavailable(&self) -> bool {
        self.transition(UNAVAILABLE)
    }

    pub fn is_healthy(&self) -> bool {
        self.inner.load(Ordering::Acquire) == HEALTHY
    }

    pub fn phase(&self) -> HealthPhase {
        match self.inner.load(Ordering::Acquire) {
            SHUTTING_DOWN => HealthPhase::ShuttingDown,
            UNAVAILABLE => HealthPhase::Unavailable,
            _ => HealthPhase::Healthy,
        }
    }

    fn transition(&self, target: u8) -> bool {
        // Only the Healthy -> X edge exists; a lost race means another
        // writer already committed and the call is an idempotent no-op.
        self.inner
            .compare_exchange(HEALTHY, target, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy() {
        let state = ProcessState::new();
        assert!(state.is_healthy());
        assert_eq!(state.phase(), HealthPhase::Healthy);
    }

    #[test]
    fn shutting_down_is_one_way() {
        let state = ProcessState::new();
        assert!(state.set_shutting_down());
        assert!(!state.is_healthy());
        assert_eq!(state.phase(), HealthPhase::ShuttingDown);

        // Idempotent repeat
        assert!(!state.set_shutting_down());
        assert_eq!(state.phase(), HealthPhase::ShuttingDown);
    }

    #[test]
    fn first_writer_wins() {
        let state = ProcessState::new();
        assert!(state.set_unavailable());
        assert!(!state.set_shutting_down());
        assert_eq!(state.phase(), HealthPhase::Unavailable);
    }

    #[test]
    fn clones_share_state() {
        let state = ProcessState::new();
        let observer = state.clone();
        state.set_shutting_down();
        assert!(!observer.is_healthy());
    }

    #[test]
    fn concurrent_writers_commit_exactly_one_transition() {
        let state = ProcessState::new();
        let mut handles = Vec::new();

        for i in 0..8 {
            let state = state.clone();
            handles.push(std::thread::spawn(move || {
                if i % 2 == 0 {
                    state.set_shutting_down()
                } else {
                    state.set_unavailable()
                }
            }));
        }

        let committed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|applied| *applied)
            .count();

        assert_eq!(committed, 1);
        assert!(!state.is_healthy());
    }
}
