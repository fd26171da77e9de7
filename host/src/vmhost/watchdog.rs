//! The execution watchdog.
//!
//! Each top-level run arms a watchdog thread holding nothing but the
//! host's breakpoint register. If the call does not finish within the
//! timeout, the watchdog raises `ExecutionFailed` with the timeout flag;
//! the executor observes it at the next basic-block boundary and unwinds
//! in an orderly fashion. The host never frees the instance before that
//! unwind completes, because the run body only returns after the executor
//! does.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use skein_executor::RuntimeBreakpoints;

/// Minimum accepted execution timeout.
pub const MIN_EXECUTION_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) struct WatchdogGuard {
    disarm: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// Arms a watchdog for one run. Dropping the guard disarms it.
pub(crate) fn arm(breakpoints: Arc<RuntimeBreakpoints>, timeout: Duration) -> WatchdogGuard {
    let (disarm, armed) = mpsc::channel::<()>();
    let handle = std::thread::spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = armed.recv_timeout(timeout) {
            log::trace!("watchdog fired after {:?}", timeout);
            breakpoints.signal_timeout();
        }
    });
    WatchdogGuard {
        disarm: Some(disarm),
        handle: Some(handle),
    }
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        // Closing the channel wakes the watchdog immediately.
        self.disarm.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchdog_fires_on_timeout() {
        let breakpoints = RuntimeBreakpoints::new();
        let guard = arm(Arc::clone(&breakpoints), Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(120));
        assert!(breakpoints.timed_out());
        drop(guard);
    }

    #[test]
    fn test_watchdog_disarms_cleanly() {
        let breakpoints = RuntimeBreakpoints::new();
        let guard = arm(Arc::clone(&breakpoints), Duration::from_secs(5));
        drop(guard);
        assert!(!breakpoints.timed_out());
        assert!(!breakpoints.is_set());
    }
}
