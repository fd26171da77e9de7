//! The breakpoint register.
//!
//! Host functions cannot unwind across the WASM boundary, so failures are
//! reported through a single atomic cell that the executor polls between
//! basic blocks. The watchdog timer uses the same cell to stop a call that
//! exceeded its wall-clock budget: it is the only handle a foreign thread
//! holds into a running execution.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Reasons for stopping guest execution at the next basic-block boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum BreakpointValue {
    /// Keep running.
    None = 0,
    /// An unrecoverable host-side failure was recorded.
    ExecutionFailed = 1,
    /// The guest registered an async call and must yield.
    AsyncCall = 2,
    /// The guest signalled a deliberate user error.
    SignalError = 3,
    /// The gas budget ran out inside a host function.
    OutOfGas = 4,
    /// The guest exceeded its memory allowance.
    MemoryLimit = 5,
    /// The guest requested a clean early exit.
    SignalExit = 6,
}

impl BreakpointValue {
    /// Decodes the numeric register value; unknown values read as
    /// `ExecutionFailed` so a corrupted register can never unpause.
    pub fn from_u64(value: u64) -> BreakpointValue {
        match value {
            0 => BreakpointValue::None,
            2 => BreakpointValue::AsyncCall,
            3 => BreakpointValue::SignalError,
            4 => BreakpointValue::OutOfGas,
            5 => BreakpointValue::MemoryLimit,
            6 => BreakpointValue::SignalExit,
            _ => BreakpointValue::ExecutionFailed,
        }
    }
}

/// The shared breakpoint register of one host.
///
/// Cloned (via `Arc`) into every instance the executor creates and into the
/// watchdog thread. Single-writer in practice: only the thread running the
/// call and the watchdog ever store to it.
#[derive(Debug, Default)]
pub struct RuntimeBreakpoints {
    value: AtomicU64,
    timed_out: AtomicBool,
}

impl RuntimeBreakpoints {
    /// Creates a register in the running state.
    pub fn new() -> Arc<Self> {
        Arc::new(RuntimeBreakpoints::default())
    }

    /// Reads the current breakpoint.
    pub fn get(&self) -> BreakpointValue {
        BreakpointValue::from_u64(self.value.load(Ordering::SeqCst))
    }

    /// Stores a breakpoint.
    pub fn set(&self, value: BreakpointValue) {
        self.value.store(value as u64, Ordering::SeqCst);
    }

    /// Clears the register back to the running state.
    pub fn clear(&self) {
        self.set(BreakpointValue::None);
        self.timed_out.store(false, Ordering::SeqCst);
    }

    /// Clears the breakpoint value but keeps the timeout flag, so the
    /// dispatcher can still classify a stopped run after the register is
    /// released.
    pub fn clear_value(&self) {
        self.set(BreakpointValue::None);
    }

    /// True if any breakpoint is pending.
    pub fn is_set(&self) -> bool {
        self.get() != BreakpointValue::None
    }

    /// Called by the watchdog: request a stop and mark the cause.
    pub fn signal_timeout(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
        self.set(BreakpointValue::ExecutionFailed);
    }

    /// True if the pending `ExecutionFailed` was raised by the watchdog.
    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let bp = RuntimeBreakpoints::new();
        assert_eq!(bp.get(), BreakpointValue::None);
        assert!(!bp.is_set());

        bp.set(BreakpointValue::SignalError);
        assert_eq!(bp.get(), BreakpointValue::SignalError);
        assert!(bp.is_set());

        bp.clear();
        assert_eq!(bp.get(), BreakpointValue::None);
    }

    #[test]
    fn test_timeout_signal() {
        let bp = RuntimeBreakpoints::new();
        bp.signal_timeout();
        assert_eq!(bp.get(), BreakpointValue::ExecutionFailed);
        assert!(bp.timed_out());

        bp.clear();
        assert!(!bp.timed_out());
    }

    #[test]
    fn test_unknown_value_reads_as_failed() {
        assert_eq!(BreakpointValue::from_u64(99), BreakpointValue::ExecutionFailed);
    }
}
