//! The async state machine driver.
//!
//! The async context stores the data; this module drives it: local
//! resolution through the destination context, cross-shard emission with
//! the correlation prefix, persistence of contexts with in-flight
//! children, and the callback-side resumption in a later transaction.

use num_bigint::BigUint;

use skein_vm_common::{
    math, Address, AsyncArguments, CallArgsParser, CallInput, CallType, LengthPrefixedBuilder,
    ReturnCode, TxDataBuilder, VMInput,
};

use crate::contexts::async_ctx::AsyncContextState;
use crate::contexts::{AsyncCall, AsyncCallStatus, AsyncContext};
use crate::error::{HostError, HostResult};
use crate::vmhost::VMHost;

/// Placeholder function name on cross-shard callback data; kept only so
/// the wire format stays parseable.
const CALLBACK_NAME_PLACEHOLDER: &str = "<callback>";

impl VMHost {
    /// Attaches fresh async correlation identifiers to a synthetic child
    /// call.
    pub(crate) fn set_async_arguments_for_call(&self, input: &mut CallInput) {
        let mut async_ctx = self.async_ctx_mut();
        let new_call_id = async_ctx.generate_new_call_id();
        input.vm_input.async_arguments = Some(AsyncArguments {
            new_call_id,
            caller_call_id: async_ctx.call_id().to_vec(),
            callback_async_initiator_call_id: Vec::new(),
            gas_accumulated: 0,
        });
    }

    /// Registers an async call in the named group, withholding the
    /// callback gas reserve from the current frame.
    pub fn register_async_call(&self, group_id: &str, call: AsyncCall) -> HostResult<()> {
        if self.runtime().read_only() {
            return Err(HostError::InvalidCallOnReadOnlyMode);
        }

        let min_gas = self.metering().schedule().min_async_call_gas();
        if call.gas_limit < min_gas {
            self.runtime_mut()
                .set_runtime_breakpoint(skein_executor::BreakpointValue::OutOfGas);
            return Err(HostError::NotEnoughGas);
        }

        let total_needed = math::add_u64(call.gas_limit, call.gas_locked);
        if self.gas_left() < total_needed {
            self.runtime_mut()
                .set_runtime_breakpoint(skein_executor::BreakpointValue::OutOfGas);
            return Err(HostError::NotEnoughGas);
        }

        // Only the callback reserve is withheld now; the forwarded gas is
        // charged when the call is resolved or emitted.
        self.use_gas_bounded(call.gas_locked)?;

        self.async_ctx_mut().register_async_call(group_id, call);
        Ok(())
    }

    /// Registers the legacy single async call: all remaining gas minus
    /// one async step is forwarded, and the default `callBack` export
    /// handles both outcomes.
    pub fn register_legacy_async_call(
        &self,
        destination: Address,
        data: Vec<u8>,
        value: BigUint,
    ) -> HostResult<()> {
        if self.runtime().read_only() {
            return Err(HostError::InvalidCallOnReadOnlyMode);
        }

        let schedule = *self.metering().schedule();
        let step = schedule.async_cost.async_call_step;
        let gas_lock = schedule.async_cost.async_callback_gas_lock;

        let gas_left = self.gas_left();
        let gas_limit = math::sub_u64(gas_left, step);
        let gas_locked = if self.runtime().has_function(crate::contexts::runtime::CALLBACK_FUNCTION_NAME)
        {
            gas_lock
        } else {
            0
        };
        let gas_limit = math::sub_u64(gas_limit, gas_locked);

        if gas_limit < schedule.min_async_call_gas() {
            self.runtime_mut()
                .set_runtime_breakpoint(skein_executor::BreakpointValue::OutOfGas);
            return Err(HostError::NotEnoughGas);
        }

        self.use_gas_bounded(gas_locked)?;

        let call = AsyncCall {
            destination,
            data,
            value,
            gas_limit,
            gas_locked,
            success_callback: crate::contexts::runtime::CALLBACK_FUNCTION_NAME.to_string(),
            error_callback: crate::contexts::runtime::CALLBACK_FUNCTION_NAME.to_string(),
            ..AsyncCall::default()
        };
        self.async_ctx_mut().register_legacy_async_call(call)?;
        Ok(())
    }

    /// Binds the context-level callback of the current async context.
    pub fn set_async_context_callback(&self, name: &str, data: &[u8], gas: u64) -> HostResult<()> {
        self.use_gas_bounded(gas)?;
        self.async_ctx_mut().set_context_callback(name, data);
        Ok(())
    }

    /// Resolves every pending call: same-shard destinations execute
    /// inline (followed by their callback), remote destinations are
    /// emitted as pending transfers. When everything resolved locally,
    /// the context callback fires before control returns to the caller.
    pub(crate) fn execute_async_context(&self) -> HostResult<()> {
        loop {
            let next = self.next_pending_call();
            let Some(call) = next else {
                break;
            };

            let own_address = self.async_ctx().address();
            let local = self.in_same_shard(&own_address, &call.destination);
            if local {
                self.execute_async_call_local(&call)?;
            } else {
                self.execute_async_call_remote(&call)?;
            }
        }

        if self.async_ctx().is_complete() {
            let callback = self.async_ctx_mut().take_context_callback();
            if let Some((callback, callback_data)) = callback {
                let state = self.async_ctx().state().clone();
                self.execute_context_callback(&state, &callback, callback_data)?;
            }
        }
        Ok(())
    }

    /// The first pending call that has not been emitted cross-shard yet.
    fn next_pending_call(&self) -> Option<AsyncCall> {
        let own_address = self.async_ctx().address();
        let async_ctx = self.async_ctx();
        for group in async_ctx.groups() {
            for call in &group.calls {
                if !call.is_pending() {
                    continue;
                }
                // Remote calls stay pending after emission; only consider
                // ones still local or not yet emitted.
                if !self.in_same_shard(&own_address, &call.destination)
                    && !call.call_id.is_empty()
                    && self.emitted(&call.call_id)
                {
                    continue;
                }
                return Some(call.clone());
            }
        }
        None
    }

    fn emitted(&self, call_id: &[u8]) -> bool {
        self.async_ctx()
            .state()
            .emitted_calls
            .iter()
            .any(|id| id == call_id)
    }

    fn execute_async_call_local(&self, call: &AsyncCall) -> HostResult<()> {
        let (function, arguments) = CallArgsParser::new()
            .parse_data(&call.data)
            .map_err(|_| HostError::FailedTransfer)?;

        let own_address = self.async_ctx().address();
        let caller_call_id = self.async_ctx().call_id().to_vec();

        let mut input = CallInput {
            vm_input: VMInput {
                caller_addr: own_address,
                call_value: call.value.clone(),
                call_type: CallType::AsynchronousCall,
                arguments,
                gas_price: self.runtime().vm_input().vm_input.gas_price,
                gas_provided: call.gas_limit,
                gas_locked: 0,
                async_arguments: Some(AsyncArguments {
                    new_call_id: call.call_id.clone(),
                    caller_call_id,
                    callback_async_initiator_call_id: Vec::new(),
                    gas_accumulated: 0,
                }),
                ..VMInput::default()
            },
            recipient_addr: call.destination,
            function,
            allow_init_function: false,
        };
        self.copy_tx_hashes_into(&mut input);

        let (child_output, _child_complete, _child_error) =
            self.execute_on_dest_context(input);

        let success = child_output.return_code == ReturnCode::Ok;
        if let Some(active) = self.async_ctx_mut().find_call_mut(&call.call_id) {
            active.status = if success {
                AsyncCallStatus::Resolved
            } else {
                AsyncCallStatus::Rejected
            };
        }

        self.execute_async_callback(call, &child_output, success)?;

        let group_info = self.async_ctx().group_info(&call.call_id);
        self.async_ctx_mut().remove_call(&call.call_id);

        // A completed group fires its own callback once its last call
        // resolves.
        if let Some((identifier, group_callback, group_data)) = group_info {
            if !group_callback.is_empty() && self.async_ctx().group_is_complete(&identifier) {
                let state = self.async_ctx().state().clone();
                self.execute_context_callback(&state, &group_callback, group_data)?;
            }
        }
        Ok(())
    }

    fn execute_async_callback(
        &self,
        call: &AsyncCall,
        child_output: &skein_vm_common::VMOutput,
        success: bool,
    ) -> HostResult<()> {
        let Some(callback_name) = call.callback_name(success) else {
            // No callback: the reserve flows straight back to the frame.
            self.restore_gas(call.gas_locked);
            return Ok(());
        };

        // Unlock the withheld reserve; the callback frame charges it back
        // through the ordinary child-gas accounting.
        self.restore_gas(call.gas_locked);
        let callback_gas = self.bound_gas_limit(math::add_u64(
            call.gas_locked,
            child_output.gas_remaining,
        ));

        let mut arguments = vec![child_output.return_code.to_bytes()];
        if success {
            arguments.extend(child_output.return_data.iter().cloned());
        } else {
            arguments.push(child_output.return_message.clone().into_bytes());
        }
        if !call.callback_closure.is_empty() {
            arguments.push(call.callback_closure.clone());
        }

        let own_address = self.async_ctx().address();
        let caller_call_id = self.async_ctx().call_id().to_vec();
        let mut input = CallInput {
            vm_input: VMInput {
                caller_addr: call.destination,
                call_value: BigUint::default(),
                call_type: CallType::AsynchronousCallBack,
                arguments,
                gas_price: self.runtime().vm_input().vm_input.gas_price,
                gas_provided: callback_gas,
                gas_locked: 0,
                async_arguments: Some(AsyncArguments {
                    new_call_id: call.call_id.clone(),
                    caller_call_id,
                    callback_async_initiator_call_id: Vec::new(),
                    gas_accumulated: 0,
                }),
                ..VMInput::default()
            },
            recipient_addr: own_address,
            function: callback_name.to_string(),
            allow_init_function: false,
        };
        self.copy_tx_hashes_into(&mut input);

        let (_callback_output, _complete, callback_error) = self.execute_on_dest_context(input);
        if callback_error.is_some() {
            // A failing callback forfeits the remaining gas of the frame.
            let gas_left = self.gas_left();
            self.use_gas(gas_left);
        }
        Ok(())
    }

    fn execute_async_call_remote(&self, call: &AsyncCall) -> HostResult<()> {
        let (function, arguments) = CallArgsParser::new()
            .parse_data(&call.data)
            .map_err(|_| HostError::FailedTransfer)?;

        {
            let mut async_ctx = self.async_ctx_mut();
            async_ctx.increment_calls_counter();
            async_ctx.mark_emitted(call.call_id.clone());
        }

        let own_address = self.async_ctx().address();
        let current_call_id = self.async_ctx().call_id().to_vec();

        let async_data = LengthPrefixedBuilder::new()
            .push(&call.call_id)
            .push(&current_call_id)
            .to_bytes();

        let mut call_data = TxDataBuilder::new().func(&function);
        for argument in &arguments {
            call_data = call_data.arg(argument);
        }

        // The forwarded gas leaves the frame and travels on the transfer.
        self.use_gas_bounded(call.gas_limit)?;

        let sender_balance = self.blockchain().get_balance(&own_address);
        self.output_mut().transfer(
            call.destination,
            own_address,
            call.gas_limit,
            call.gas_locked,
            &call.value,
            async_data,
            call_data.to_bytes(),
            CallType::AsynchronousCall,
            &sender_balance,
        )?;

        log::trace!(
            "async call emitted cross-shard: dest {:?}, gas {}",
            call.destination,
            call.gas_limit
        );
        Ok(())
    }

    /// Persists the async context under the owner's protected storage if
    /// cross-shard children remain unresolved.
    pub(crate) fn save_async_context(&self) -> HostResult<()> {
        if self.async_ctx().is_complete() {
            return Ok(());
        }

        let (bytes, key) = {
            let async_ctx = self.async_ctx();
            let bytes = async_ctx.serialize_state()?;
            let key = AsyncContext::storage_key(async_ctx.call_id());
            (bytes, key)
        };

        self.write_protected_storage(&key, &bytes)?;
        log::trace!("async context saved, {} bytes", bytes.len());
        Ok(())
    }

    fn write_protected_storage(&self, key: &[u8], value: &[u8]) -> HostResult<()> {
        let schedule = *self.metering().schedule();
        let mut storage = self.storage_mut();
        let mut output = self.output_mut();
        let blockchain = self.blockchain();
        let (_, gas) = storage.set_storage(key, value, true, &mut output, &blockchain, &schedule)?;
        drop(storage);
        drop(output);
        drop(blockchain);
        self.use_gas(gas.to_charge);
        if gas.to_refund > 0 {
            self.output_mut().add_gas_refund(gas.to_refund);
        }
        Ok(())
    }

    fn read_own_storage(&self, key: &[u8]) -> HostResult<Vec<u8>> {
        let mut storage = self.storage_mut();
        let output = self.output();
        let blockchain = self.blockchain();
        let (value, _) = storage.get_storage(key, &output, &blockchain)?;
        Ok(value)
    }

    /// Handles the callback leg of an async call in a later transaction:
    /// restores the persisted context, runs the matching callback, then
    /// settles the parent's child counter.
    pub(crate) fn call_sc_method_asynchronous_callback(&self) -> HostResult<()> {
        let async_arguments = self.runtime().vm_input().vm_input.async_arguments.clone();

        let Some(args) = async_arguments else {
            // Legacy callback: the incoming data already names `callBack`.
            self.call_function_and_execute_async()?;
            return Ok(());
        };

        let initiator_call_id = args.callback_async_initiator_call_id.clone();
        let child_call_id = args.caller_call_id.clone();

        let record_key = AsyncContext::storage_key(&initiator_call_id);
        let record = self.read_own_storage(&record_key)?;
        if record.is_empty() {
            return Err(HostError::AsyncContextNotFound);
        }
        let mut parent_state = AsyncContext::deserialize_state(&record)?;
        parent_state.gas_accumulated =
            math::add_u64(parent_state.gas_accumulated, args.gas_accumulated);

        let success = self.callback_leg_succeeded();
        let call = find_call(&mut parent_state, &child_call_id)?;
        call.status = if success {
            AsyncCallStatus::Resolved
        } else {
            AsyncCallStatus::Rejected
        };
        let call = call.clone();

        if let Some(callback_name) = call.callback_name(success) {
            self.runtime_mut().set_custom_call_function(callback_name);
            match self.call_function_and_execute_async() {
                Ok(true) => {}
                // The callback itself spawned async work; settlement of
                // the parent waits for it.
                Ok(false) => return Ok(()),
                Err(err) => {
                    log::trace!("async callback failed: {}", err);
                    let gas_left = self.gas_left();
                    self.use_gas(gas_left);
                }
            }
        }

        self.notify_child_is_complete(parent_state, &child_call_id, &record_key)
    }

    /// The callback's first argument is the child's return code; an empty
    /// argument means Ok.
    fn callback_leg_succeeded(&self) -> bool {
        let runtime = self.runtime();
        match runtime.vm_input().vm_input.arguments.first() {
            None => false,
            Some(code) => code.is_empty() || code.iter().all(|b| *b == 0),
        }
    }

    /// Settles a completed child on the parent record: removes it,
    /// decrements the in-flight counter, and on terminal completion fires
    /// the context callback, restores the accumulated gas and deletes the
    /// persisted record.
    fn notify_child_is_complete(
        &self,
        mut parent_state: AsyncContextState,
        child_call_id: &[u8],
        record_key: &[u8],
    ) -> HostResult<()> {
        remove_call(&mut parent_state, child_call_id);
        parent_state.calls_counter = parent_state.calls_counter.saturating_sub(1);

        let pending_left = parent_state.calls_counter > 0
            || parent_state.call_groups.iter().any(|g| g.has_pending_calls());

        if pending_left {
            let bytes = bincode::serialize(&parent_state)
                .map_err(|err| HostError::AsyncSerializationFailed(err.to_string()))?;
            self.write_protected_storage(record_key, &bytes)?;
            return Ok(());
        }

        // Terminal completion.
        self.write_protected_storage(record_key, &[])?;
        let accumulated = parent_state.gas_accumulated;
        self.restore_gas(accumulated);

        if !parent_state.callback.is_empty() {
            let callback = parent_state.callback.clone();
            let callback_data = parent_state.callback_data.clone();
            self.execute_context_callback(&parent_state, &callback, callback_data)?;
        }
        Ok(())
    }

    fn execute_context_callback(
        &self,
        parent_state: &AsyncContextState,
        callback: &str,
        callback_data: Vec<u8>,
    ) -> HostResult<()> {
        let gas = self.bound_gas_limit(self.gas_left());
        let mut input = CallInput {
            vm_input: VMInput {
                caller_addr: parent_state.address,
                call_type: CallType::AsynchronousCallBack,
                arguments: vec![callback_data],
                gas_provided: gas,
                ..VMInput::default()
            },
            recipient_addr: parent_state.address,
            function: callback.to_string(),
            allow_init_function: false,
        };
        self.copy_tx_hashes_into(&mut input);

        let (_, _, error) = self.execute_on_dest_context(input);
        if let Some(err) = error {
            log::trace!("context callback failed: {}", err);
        }
        Ok(())
    }

    /// Emits the result of a completed `AsynchronousCall` leg back to the
    /// original caller, carrying the correlation 4-tuple followed by the
    /// outcome.
    pub(crate) fn send_cross_shard_callback(
        &self,
        return_code: ReturnCode,
        return_data: &[Vec<u8>],
        return_message: &str,
    ) -> HostResult<()> {
        let (sender, destination, new_call_id, call_id, caller_call_id, gas_accumulated) = {
            let mut async_ctx = self.async_ctx_mut();
            let new_call_id = async_ctx.generate_new_call_id();
            let state = async_ctx.state();
            (
                state.address,
                state.caller_addr,
                new_call_id,
                state.call_id.clone(),
                state.caller_call_id.clone(),
                state.gas_accumulated,
            )
        };

        let async_data = LengthPrefixedBuilder::new()
            .push(&new_call_id)
            .push(&call_id)
            .push(&caller_call_id)
            .push(&gas_accumulated.to_be_bytes())
            .to_bytes();

        let mut data = TxDataBuilder::new()
            .func(CALLBACK_NAME_PLACEHOLDER)
            .arg(&return_code.to_bytes());
        if return_code == ReturnCode::Ok {
            for entry in return_data {
                data = data.arg(entry);
            }
        } else {
            data = data.arg(return_message.as_bytes());
        }

        // Everything left travels back with the callback.
        let gas_left = self.gas_left();
        self.use_gas(gas_left);

        let sender_balance = self.blockchain().get_balance(&sender);
        let transfer = self.output_mut().transfer(
            destination,
            sender,
            gas_left,
            0,
            &BigUint::default(),
            async_data,
            data.to_bytes(),
            CallType::AsynchronousCallBack,
            &sender_balance,
        );
        if let Err(err) = transfer {
            self.runtime_mut().fail_execution(err.clone());
            return Err(err);
        }

        log::trace!(
            "cross-shard callback sent to {:?}, gas {}",
            destination,
            gas_left
        );
        Ok(())
    }

    /// Settles the bookkeeping for a synthetic child call. A fully
    /// resolved child needs nothing: its frame already merged and its gas
    /// came back with the frame. An incomplete child (its `init` left a
    /// cross-shard call pending) becomes an in-flight child of the
    /// current context: the counter keeps this frame from reading as
    /// complete, so it persists its own record and waits for the child's
    /// cross-shard callback, which carries this context's call ID as the
    /// initiator and settles the counter on arrival.
    pub(crate) fn complete_child_conditional(&self, is_complete: bool) -> HostResult<()> {
        if is_complete {
            return Ok(());
        }
        self.async_ctx_mut().increment_calls_counter();
        Ok(())
    }

    fn copy_tx_hashes_into(&self, input: &mut CallInput) {
        let runtime = self.runtime();
        let current = &runtime.vm_input().vm_input;
        input.vm_input.original_tx_hash = current.original_tx_hash.clone();
        input.vm_input.current_tx_hash = current.current_tx_hash.clone();
        input.vm_input.prev_tx_hash = current.prev_tx_hash.clone();
    }
}

fn find_call<'a>(
    state: &'a mut AsyncContextState,
    call_id: &[u8],
) -> HostResult<&'a mut AsyncCall> {
    state
        .call_groups
        .iter_mut()
        .find_map(|group| group.find_call_mut(call_id))
        .ok_or(HostError::AsyncCallNotFound)
}

fn remove_call(state: &mut AsyncContextState, call_id: &[u8]) {
    for group in &mut state.call_groups {
        group.remove_call(call_id);
    }
    state.call_groups.retain(|group| !group.calls.is_empty());
}
