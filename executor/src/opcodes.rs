//! Static per-opcode gas costs.
//!
//! The executor charges these against the instance's point counter while
//! interpreting or running compiled code; the host only configures them and
//! reads the accumulated points back through [`crate::Instance`].

/// Gas cost of each WASM opcode class.
///
/// The grouping is deliberately coarse: what matters to the host is that
/// the table can be swapped atomically when the gas schedule changes, not
/// the per-opcode resolution of a particular executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeCosts {
    /// Plain arithmetic and logic.
    pub arithmetic: u32,
    /// Floating-point arithmetic (deterministic subset).
    pub float_arithmetic: u32,
    /// Locals and globals access.
    pub locals: u32,
    /// Linear memory loads.
    pub memory_load: u32,
    /// Linear memory stores.
    pub memory_store: u32,
    /// memory.grow, per page.
    pub memory_grow: u32,
    /// Branches and br_table.
    pub control_flow: u32,
    /// Direct and indirect calls.
    pub call: u32,
    /// Maximum number of memory pages an instance may grow to.
    pub max_memory_grow: u64,
}

impl Default for OpcodeCosts {
    fn default() -> Self {
        OpcodeCosts {
            arithmetic: 1,
            float_arithmetic: 3,
            locals: 1,
            memory_load: 2,
            memory_store: 2,
            memory_grow: 8192,
            control_flow: 2,
            call: 5,
            max_memory_grow: 64,
        }
    }
}
