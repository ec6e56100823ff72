//! Cross-thread cancellation handle for one generation pass

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Two independent flags shared between the scheduler and a background task
///
/// * `stop`: abandon the pass, nothing it produced may be applied.
/// * `restart`: the pass is stale, a fresh one must be enqueued once it unwinds.
///
/// When both are set `stop` wins: the pass is abandoned and not re-enqueued.
/// Workers poll [`StopToken::should_abort`] between pipeline steps only.
#[derive(Debug, Default)]
pub struct StopToken {
    stop: AtomicBool,
    restart: AtomicBool,
}

/// What the scheduler should do with a pass once it unwinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
    /// Neither flag set
    Live,
    /// `stop` set, regardless of `restart`
    Stopped,
    /// Only `restart` set
    Restart,
}

impl StopToken {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn request_restart(&self) {
        self.restart.store(true, Ordering::Release);
    }

    pub fn clear_restart(&self) {
        self.restart.store(false, Ordering::Release);
    }

    pub fn is_restart_requested(&self) -> bool {
        self.restart.load(Ordering::Acquire)
    }

    /// True once either flag is set; the current pass is no longer wanted
    pub fn should_abort(&self) -> bool {
        self.is_stopped() || self.is_restart_requested()
    }

    pub fn state(&self) -> TokenState {
        if self.is_stopped() {
            TokenState::Stopped
        } else if self.is_restart_requested() {
            TokenState::Restart
        } else {
            TokenState::Live
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_independent() {
        let token = StopToken::new();
        assert_eq!(token.state(), TokenState::Live);
        assert!(!token.should_abort());

        token.request_restart();
        assert_eq!(token.state(), TokenState::Restart);
        assert!(!token.is_stopped());
        assert!(token.should_abort());

        token.clear_restart();
        assert_eq!(token.state(), TokenState::Live);
    }

    #[test]
    fn test_stop_wins_over_restart() {
        let token = StopToken::new();
        token.request_restart();
        token.stop();
        assert_eq!(token.state(), TokenState::Stopped);
    }

    #[test]
    fn test_shared_across_threads() {
        let token = StopToken::new();
        let worker = Arc::clone(&token);
        let handle = std::thread::spawn(move || {
            while !worker.is_stopped() {
                std::thread::yield_now();
            }
            true
        });
        token.stop();
        assert!(handle.join().unwrap());
    }
}
