//! Push/pop lifecycle shared by all contexts.
//!
//! Nested synchronous calls never unwind through exceptions: before a child
//! call, every context pushes its state; on success the child frame is
//! merged into the parent (additive), on failure it is discarded and the
//! parent state reinstated.

/// The stacked-state lifecycle every context implements.
pub trait StateStack {
    /// Resets the active state for a fresh top-level call.
    fn init_state(&mut self);

    /// Saves the active state onto the internal stack.
    fn push_state(&mut self);

    /// Pops the saved state and makes it active, discarding the current
    /// frame. Used when a child call fails.
    fn pop_set_active_state(&mut self);

    /// Pops the saved state and drops it, keeping the current frame
    /// active. Used when the current frame must survive the pop.
    fn pop_discard(&mut self);

    /// Drops every saved state without touching the active one.
    fn clear_state_stack(&mut self);
}
