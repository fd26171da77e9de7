//! The async context: registration, bookkeeping and persistence.
//!
//! This context holds the async state machine's data; the driving logic
//! (local resolution, cross-shard emission, callback dispatch) lives in the
//! VM host, which owns the recursion into `ExecuteOnDestContext`.
//!
//! A context is persisted to the owner's protected storage when, at the end
//! of its transaction, at least one cross-shard child remains unresolved.
//! The record is keyed by call ID and reloaded by the transaction carrying
//! the callback.

use serde::{Deserialize, Serialize};

use skein_vm_common::{Address, CallInput, CallType};

use crate::contexts::async_call::{AsyncCall, AsyncCallGroup, LEGACY_GROUP_ID};
use crate::error::{HostError, HostResult};
use crate::state_stack::StateStack;

/// Storage-key infix of persisted async records, appended to the
/// protected prefix.
pub const ASYNC_KEY_INFIX: &[u8] = b"async";

/// The persisted (and in-memory) state of one async context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AsyncContextState {
    /// The contract owning this context.
    pub address: Address,
    /// Identifier of the owning call.
    pub call_id: Vec<u8>,
    /// How the owning call entered the engine.
    pub call_type: CallType,
    /// The account that called the owner.
    pub caller_addr: Address,
    /// Call ID of the caller's frame.
    pub caller_call_id: Vec<u8>,
    /// On callback legs, the call ID of the registering context.
    pub callback_async_initiator_call_id: Vec<u8>,
    /// Context-level callback export; fires after all groups complete.
    pub callback: String,
    /// Data handed to the context callback.
    pub callback_data: Vec<u8>,
    /// Gas returned by resolved children, restored on terminal completion.
    pub gas_accumulated: u64,
    /// Return data of the last locally resolved child.
    pub return_data: Vec<u8>,
    /// The call groups, in creation order.
    pub call_groups: Vec<AsyncCallGroup>,
    /// Call IDs already emitted as cross-shard transfers; they stay
    /// `Pending` but must not be emitted twice.
    pub emitted_calls: Vec<Vec<u8>>,
    /// True once the single legacy call was registered; legacy contexts
    /// skip promise-era persistence.
    pub legacy_mode: bool,
    /// Unresolved cross-shard children.
    pub calls_counter: u64,
    /// All calls ever registered by this context.
    pub total_calls_counter: u64,
}

/// The async context.
#[derive(Debug, Default)]
pub struct AsyncContext {
    state: AsyncContextState,
    state_stack: Vec<AsyncContextState>,
}

impl AsyncContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        AsyncContext::default()
    }

    /// Initializes the context from a call input.
    ///
    /// Direct calls root their call ID in the current transaction hash;
    /// async legs carry explicit identifiers.
    pub fn init_from_input(&mut self, input: &CallInput) {
        let vm_input = &input.vm_input;
        let (call_id, caller_call_id, initiator, gas_accumulated) = match &vm_input.async_arguments
        {
            Some(args) => (
                args.new_call_id.clone(),
                args.caller_call_id.clone(),
                args.callback_async_initiator_call_id.clone(),
                args.gas_accumulated,
            ),
            None => (vm_input.current_tx_hash.clone(), Vec::new(), Vec::new(), 0),
        };

        self.state = AsyncContextState {
            address: input.recipient_addr,
            call_id,
            call_type: vm_input.call_type,
            caller_addr: vm_input.caller_addr,
            caller_call_id,
            callback_async_initiator_call_id: initiator,
            gas_accumulated,
            ..AsyncContextState::default()
        };
    }

    /// Read access to the whole state.
    pub fn state(&self) -> &AsyncContextState {
        &self.state
    }

    /// Call ID of the owning frame.
    pub fn call_id(&self) -> &[u8] {
        &self.state.call_id
    }

    /// Call ID of the caller's frame.
    pub fn caller_call_id(&self) -> &[u8] {
        &self.state.caller_call_id
    }

    /// Owner address of this context.
    pub fn address(&self) -> Address {
        self.state.address
    }

    /// Assigns a fresh call ID derived from the owner's.
    pub fn generate_new_call_id(&mut self) -> Vec<u8> {
        self.state.total_calls_counter = self.state.total_calls_counter.saturating_add(1);
        let mut id = self.state.call_id.clone();
        id.extend_from_slice(&self.state.total_calls_counter.to_be_bytes());
        id
    }

    /// Appends a call to the named group, creating the group on first
    /// use. Returns the assigned call ID.
    pub fn register_async_call(&mut self, group_id: &str, mut call: AsyncCall) -> Vec<u8> {
        let call_id = self.generate_new_call_id();
        call.call_id = call_id.clone();

        match self
            .state
            .call_groups
            .iter_mut()
            .find(|group| group.identifier == group_id)
        {
            Some(group) => group.calls.push(call),
            None => {
                let mut group = AsyncCallGroup::new(group_id);
                group.calls.push(call);
                self.state.call_groups.push(group);
            }
        }
        call_id
    }

    /// Registers the legacy single async call; at most one may exist.
    pub fn register_legacy_async_call(&mut self, call: AsyncCall) -> HostResult<Vec<u8>> {
        if self.state.legacy_mode {
            return Err(HostError::OnlyOneLegacyAsyncCallAllowed);
        }
        self.state.legacy_mode = true;
        Ok(self.register_async_call(LEGACY_GROUP_ID, call))
    }

    /// True if the context runs in legacy single-call mode.
    pub fn has_legacy_group(&self) -> bool {
        self.state.legacy_mode
    }

    /// Binds the context-level callback.
    pub fn set_context_callback(&mut self, name: &str, data: &[u8]) {
        self.state.callback = name.to_string();
        self.state.callback_data = data.to_vec();
    }

    /// The groups, mutable, for the execution driver.
    pub fn groups_mut(&mut self) -> &mut Vec<AsyncCallGroup> {
        &mut self.state.call_groups
    }

    /// The groups, immutable.
    pub fn groups(&self) -> &[AsyncCallGroup] {
        &self.state.call_groups
    }

    /// Finds the group and call holding `call_id`.
    pub fn find_call_mut(&mut self, call_id: &[u8]) -> Option<&mut AsyncCall> {
        self.state
            .call_groups
            .iter_mut()
            .find_map(|group| group.find_call_mut(call_id))
    }

    /// Drops a resolved call from its group and prunes empty groups.
    pub fn remove_call(&mut self, call_id: &[u8]) {
        for group in &mut self.state.call_groups {
            group.remove_call(call_id);
        }
        self.state.call_groups.retain(|group| !group.calls.is_empty());
    }

    /// Identifier, callback export and callback data of the group holding
    /// `call_id`.
    pub fn group_info(&self, call_id: &[u8]) -> Option<(String, String, Vec<u8>)> {
        self.state
            .call_groups
            .iter()
            .find(|group| group.calls.iter().any(|call| call.call_id == call_id))
            .map(|group| {
                (
                    group.identifier.clone(),
                    group.callback.clone(),
                    group.callback_data.clone(),
                )
            })
    }

    /// True once the named group has no pending calls left (or is gone).
    pub fn group_is_complete(&self, identifier: &str) -> bool {
        self.state
            .call_groups
            .iter()
            .find(|group| group.identifier == identifier)
            .map(AsyncCallGroup::is_complete)
            .unwrap_or(true)
    }

    /// Takes the context callback so it fires exactly once.
    pub fn take_context_callback(&mut self) -> Option<(String, Vec<u8>)> {
        if self.state.callback.is_empty() {
            return None;
        }
        let callback = std::mem::take(&mut self.state.callback);
        let data = std::mem::take(&mut self.state.callback_data);
        Some((callback, data))
    }

    /// Records that a call left as a cross-shard transfer.
    pub fn mark_emitted(&mut self, call_id: Vec<u8>) {
        self.state.emitted_calls.push(call_id);
    }

    /// Marks one more cross-shard child in flight.
    pub fn increment_calls_counter(&mut self) {
        self.state.calls_counter = self.state.calls_counter.saturating_add(1);
    }

    /// Marks one cross-shard child complete; returns the new counter.
    pub fn decrement_calls_counter(&mut self) -> u64 {
        self.state.calls_counter = self.state.calls_counter.saturating_sub(1);
        self.state.calls_counter
    }

    /// Adds gas returned by a resolved child.
    pub fn accumulate_gas(&mut self, gas: u64) {
        self.state.gas_accumulated = self.state.gas_accumulated.saturating_add(gas);
    }

    /// Takes the accumulated gas, leaving zero.
    pub fn take_accumulated_gas(&mut self) -> u64 {
        std::mem::take(&mut self.state.gas_accumulated)
    }

    /// Stores the return data of the last locally resolved child.
    pub fn set_return_data(&mut self, data: Vec<u8>) {
        self.state.return_data = data;
    }

    /// True if anything remains to resolve: a pending call in any group or
    /// an in-flight cross-shard child.
    pub fn has_pending_calls_or_callbacks(&self) -> bool {
        self.state.calls_counter > 0
            || self
                .state
                .call_groups
                .iter()
                .any(AsyncCallGroup::has_pending_calls)
    }

    /// True once the context has nothing left to wait for.
    pub fn is_complete(&self) -> bool {
        !self.has_pending_calls_or_callbacks()
    }

    /// The protected-storage key of the record for `call_id`.
    pub fn storage_key(call_id: &[u8]) -> Vec<u8> {
        let mut key = crate::contexts::storage::PROTECTED_KEY_PREFIX.to_vec();
        key.extend_from_slice(ASYNC_KEY_INFIX);
        key.extend_from_slice(call_id);
        key
    }

    /// Canonical binary encoding of the state.
    pub fn serialize_state(&self) -> HostResult<Vec<u8>> {
        bincode::serialize(&self.state)
            .map_err(|err| HostError::AsyncSerializationFailed(err.to_string()))
    }

    /// Decodes a persisted record.
    pub fn deserialize_state(bytes: &[u8]) -> HostResult<AsyncContextState> {
        bincode::deserialize(bytes)
            .map_err(|err| HostError::AsyncSerializationFailed(err.to_string()))
    }

    /// Replaces the active state with a loaded record.
    pub fn set_state(&mut self, state: AsyncContextState) {
        self.state = state;
    }
}

impl StateStack for AsyncContext {
    fn init_state(&mut self) {
        self.state = AsyncContextState::default();
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::async_call::AsyncCallStatus;
    use skein_vm_common::AsyncArguments;

    fn direct_input() -> CallInput {
        let mut input = CallInput::direct(Address([1u8; 32]), Address([2u8; 32]), "doWork");
        input.vm_input.current_tx_hash = b"txhash".to_vec();
        input
    }

    #[test]
    fn test_init_direct_call_roots_id_in_tx_hash() {
        let mut ctx = AsyncContext::new();
        ctx.init_from_input(&direct_input());
        assert_eq!(ctx.call_id(), b"txhash");
        assert!(ctx.caller_call_id().is_empty());
    }

    #[test]
    fn test_init_async_leg_uses_explicit_ids() {
        let mut ctx = AsyncContext::new();
        let mut input = direct_input();
        input.vm_input.call_type = CallType::AsynchronousCall;
        input.vm_input.async_arguments = Some(AsyncArguments {
            new_call_id: vec![9, 9],
            caller_call_id: vec![8],
            callback_async_initiator_call_id: vec![7],
            gas_accumulated: 123,
        });
        ctx.init_from_input(&input);
        assert_eq!(ctx.call_id(), &[9, 9]);
        assert_eq!(ctx.caller_call_id(), &[8]);
        assert_eq!(ctx.state().gas_accumulated, 123);
    }

    #[test]
    fn test_call_ids_are_unique_and_derived() {
        let mut ctx = AsyncContext::new();
        ctx.init_from_input(&direct_input());
        let a = ctx.register_async_call("g", AsyncCall::default());
        let b = ctx.register_async_call("g", AsyncCall::default());
        assert_ne!(a, b);
        assert!(a.starts_with(b"txhash"));
        assert_eq!(ctx.state().total_calls_counter, 2);
    }

    #[test]
    fn test_groups_created_on_first_use() {
        let mut ctx = AsyncContext::new();
        ctx.init_from_input(&direct_input());
        ctx.register_async_call("alpha", AsyncCall::default());
        ctx.register_async_call("alpha", AsyncCall::default());
        ctx.register_async_call("beta", AsyncCall::default());
        assert_eq!(ctx.groups().len(), 2);
        assert_eq!(ctx.groups()[0].calls.len(), 2);
    }

    #[test]
    fn test_legacy_group_is_single_use() {
        let mut ctx = AsyncContext::new();
        ctx.init_from_input(&direct_input());
        ctx.register_legacy_async_call(AsyncCall::default()).unwrap();
        assert!(ctx.has_legacy_group());
        assert_eq!(
            ctx.register_legacy_async_call(AsyncCall::default()).unwrap_err(),
            HostError::OnlyOneLegacyAsyncCallAllowed
        );
    }

    #[test]
    fn test_completion_accounting() {
        let mut ctx = AsyncContext::new();
        ctx.init_from_input(&direct_input());
        assert!(ctx.is_complete());

        let id = ctx.register_async_call("g", AsyncCall::default());
        assert!(!ctx.is_complete());

        ctx.find_call_mut(&id).unwrap().status = AsyncCallStatus::Resolved;
        assert!(ctx.is_complete());

        ctx.increment_calls_counter();
        assert!(!ctx.is_complete());
        assert_eq!(ctx.decrement_calls_counter(), 0);
        assert!(ctx.is_complete());
    }

    #[test]
    fn test_remove_call_prunes_empty_groups() {
        let mut ctx = AsyncContext::new();
        ctx.init_from_input(&direct_input());
        let id = ctx.register_async_call("g", AsyncCall::default());
        ctx.remove_call(&id);
        assert!(ctx.groups().is_empty());
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut ctx = AsyncContext::new();
        ctx.init_from_input(&direct_input());
        ctx.register_async_call(
            "g",
            AsyncCall {
                destination: Address([3u8; 32]),
                data: b"fn@aa".to_vec(),
                gas_limit: 5_000,
                gas_locked: 1_000,
                success_callback: "ok".to_string(),
                ..AsyncCall::default()
            },
        );
        ctx.set_context_callback("allDone", b"closure");
        ctx.increment_calls_counter();
        ctx.accumulate_gas(777);

        let bytes = ctx.serialize_state().unwrap();
        let loaded = AsyncContext::deserialize_state(&bytes).unwrap();
        assert_eq!(&loaded, ctx.state());
    }

    #[test]
    fn test_storage_key_layout() {
        let key = AsyncContext::storage_key(b"id");
        assert_eq!(key, b"ELRONDasyncid".to_vec());
    }

    #[test]
    fn test_group_info_and_completion() {
        let mut ctx = AsyncContext::new();
        ctx.init_from_input(&direct_input());
        let id = ctx.register_async_call("swap", AsyncCall::default());
        ctx.groups_mut()[0].callback = "onSwapDone".to_string();
        ctx.groups_mut()[0].callback_data = b"ctx".to_vec();

        let (identifier, callback, data) = ctx.group_info(&id).unwrap();
        assert_eq!(identifier, "swap");
        assert_eq!(callback, "onSwapDone");
        assert_eq!(data, b"ctx".to_vec());
        assert!(!ctx.group_is_complete("swap"));

        ctx.remove_call(&id);
        assert!(ctx.group_is_complete("swap"));
        assert!(ctx.group_info(&id).is_none());
    }

    #[test]
    fn test_context_callback_fires_once() {
        let mut ctx = AsyncContext::new();
        ctx.init_from_input(&direct_input());
        assert!(ctx.take_context_callback().is_none());

        ctx.set_context_callback("allDone", b"payload");
        assert_eq!(
            ctx.take_context_callback(),
            Some(("allDone".to_string(), b"payload".to_vec()))
        );
        assert!(ctx.take_context_callback().is_none());
    }
}
