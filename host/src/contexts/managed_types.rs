//! Managed-type handles: bignums, buffers and vectors owned by the host.
//!
//! Contracts refer to host-side values through small integer handles
//! instead of marshalling them through linear memory on every operation.
//! Handles are scoped to the instance that allocated them: `init_state`
//! clears the heaps, and nested calls push the whole map so a child starts
//! with an empty handle space.

use num_bigint::BigInt;
use std::collections::HashMap;

use crate::error::{HostError, HostResult};
use crate::state_stack::StateStack;

/// Handle type used across the VM-API.
pub type Handle = i32;

#[derive(Debug, Default, Clone)]
struct ManagedState {
    big_ints: HashMap<Handle, BigInt>,
    buffers: HashMap<Handle, Vec<u8>>,
    vectors: HashMap<Handle, Vec<Vec<u8>>>,
    next_handle: Handle,
}

/// Per-call heap of managed values.
#[derive(Debug, Default)]
pub struct ManagedTypesContext {
    state: ManagedState,
    state_stack: Vec<ManagedState>,
}

impl ManagedTypesContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        ManagedTypesContext::default()
    }

    fn next_handle(&mut self) -> Handle {
        let handle = self.state.next_handle;
        self.state.next_handle = self.state.next_handle.wrapping_add(1);
        handle
    }

    /// Allocates a new bignum and returns its handle.
    pub fn new_big_int(&mut self, value: BigInt) -> Handle {
        let handle = self.next_handle();
        self.state.big_ints.insert(handle, value);
        handle
    }

    /// Reads a bignum.
    pub fn get_big_int(&self, handle: Handle) -> HostResult<&BigInt> {
        self.state
            .big_ints
            .get(&handle)
            .ok_or(HostError::NoManagedValueUnderHandle)
    }

    /// Overwrites a bignum, allocating the handle if unknown.
    pub fn set_big_int(&mut self, handle: Handle, value: BigInt) {
        self.state.big_ints.insert(handle, value);
    }

    /// Allocates a new byte buffer and returns its handle.
    pub fn new_buffer(&mut self, data: Vec<u8>) -> Handle {
        let handle = self.next_handle();
        self.state.buffers.insert(handle, data);
        handle
    }

    /// Reads a buffer.
    pub fn get_buffer(&self, handle: Handle) -> HostResult<&Vec<u8>> {
        self.state
            .buffers
            .get(&handle)
            .ok_or(HostError::NoManagedValueUnderHandle)
    }

    /// Overwrites a buffer, allocating the handle if unknown.
    pub fn set_buffer(&mut self, handle: Handle, data: Vec<u8>) {
        self.state.buffers.insert(handle, data);
    }

    /// Appends bytes to a buffer.
    pub fn append_to_buffer(&mut self, handle: Handle, data: &[u8]) -> HostResult<()> {
        let buffer = self
            .state
            .buffers
            .get_mut(&handle)
            .ok_or(HostError::NoManagedValueUnderHandle)?;
        buffer.extend_from_slice(data);
        Ok(())
    }

    /// Allocates a new managed vector and returns its handle.
    pub fn new_vector(&mut self) -> Handle {
        let handle = self.next_handle();
        self.state.vectors.insert(handle, Vec::new());
        handle
    }

    /// Reads a managed vector.
    pub fn get_vector(&self, handle: Handle) -> HostResult<&Vec<Vec<u8>>> {
        self.state
            .vectors
            .get(&handle)
            .ok_or(HostError::NoManagedValueUnderHandle)
    }

    /// Appends an element to a managed vector.
    pub fn push_to_vector(&mut self, handle: Handle, element: Vec<u8>) -> HostResult<()> {
        let vector = self
            .state
            .vectors
            .get_mut(&handle)
            .ok_or(HostError::NoManagedValueUnderHandle)?;
        vector.push(element);
        Ok(())
    }

    /// Number of live handles, all kinds combined.
    pub fn live_handles(&self) -> usize {
        self.state
            .big_ints
            .len()
            .saturating_add(self.state.buffers.len())
            .saturating_add(self.state.vectors.len())
    }
}

impl StateStack for ManagedTypesContext {
    fn init_state(&mut self) {
        self.state = ManagedState::default();
    }

    fn push_state(&mut self) {
        self.state_stack.push(std::mem::take(&mut self.state));
    }

    fn pop_set_active_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.state = state;
        }
    }

    fn pop_discard(&mut self) {
        self.state_stack.pop();
    }

    fn clear_state_stack(&mut self) {
        self.state_stack.clear();
    }
}
