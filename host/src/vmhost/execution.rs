//! Top-level dispatch and the nested synchronous call model.

use skein_vm_common::{Address, CallInput, CallType, CodeMetadata, CreateInput, VMOutput};

use crate::contexts::runtime::{
    DELETE_FUNCTION_NAME, INIT_FUNCTION_NAME, UPGRADE_FUNCTION_NAME,
};
use crate::contexts::CodeDeployInput;
use crate::error::{HostError, HostResult};
use crate::state_stack::StateStack;
use crate::vmhost::VMHost;

/// Result triple of a nested destination-context execution: the child's
/// output, whether the child (including its async work) is complete, and
/// the error if it failed.
pub type DestContextOutcome = (VMOutput, bool, Option<HostError>);

impl VMHost {
    pub(crate) fn do_run_smart_contract_create(&self, input: &CreateInput) -> VMOutput {
        self.init_state();

        let address = match self.blockchain().new_address(&input.vm_input.caller_addr) {
            Ok(address) => address,
            Err(err) => return self.output().new_vm_output_in_case_of_error(&err),
        };

        let call_input = CallInput {
            vm_input: input.vm_input.clone(),
            recipient_addr: address,
            function: INIT_FUNCTION_NAME.to_string(),
            allow_init_function: true,
        };
        self.runtime_mut().init_from_input(call_input);
        self.metering_mut().init_from_input(&input.vm_input);
        self.output_mut()
            .add_tx_value_to_account(address, &input.vm_input.call_value);
        self.storage_mut().set_address(address);

        let deploy_input = CodeDeployInput {
            contract_code: input.contract_code.clone(),
            contract_code_metadata: input.contract_code_metadata.clone(),
            contract_address: address,
            code_deployer_address: input.vm_input.caller_addr,
        };

        match self.perform_code_deployment(deploy_input) {
            Ok(vm_output) => vm_output,
            Err(err) => {
                log::trace!("create failed: {}", err);
                self.runtime_mut().add_error(err.clone(), INIT_FUNCTION_NAME);
                let vm_output = self.output().new_vm_output_in_case_of_error(&err);
                self.runtime_mut().clean_instance();
                vm_output
            }
        }
    }

    fn perform_code_deployment(&self, input: CodeDeployInput) -> HostResult<VMOutput> {
        log::trace!(
            "code deployment at {:?}, {} bytes",
            input.contract_address,
            input.contract_code.len()
        );

        if CodeMetadata::has_reserved_bits(&input.contract_code_metadata) {
            return Err(HostError::InvalidCodeMetadata);
        }

        let deduction = self
            .metering_mut()
            .deduct_initial_gas_for_direct_deployment(input.contract_code.len() as u64);
        if deduction.is_err() {
            self.output_mut()
                .set_return_code(skein_vm_common::ReturnCode::OutOfGas);
            return Err(HostError::NotEnoughGas);
        }

        self.runtime_mut().must_verify_next_contract_code();
        let gas_for_execution = self.metering().gas_for_execution();
        let started = self.with_executor(|executor| {
            self.runtime_mut()
                .start_wasm_instance(executor, &input.contract_code, gas_for_execution, true)
        });
        if let Err(err) = started {
            log::trace!("deployment instance start failed: {}", err);
            return Err(HostError::ContractInvalid);
        }

        self.call_init_function()?;

        self.output_mut().deploy_code(input.clone());
        self.output_mut().remove_non_updated_storage();

        Ok(self.current_vm_output(input.contract_address))
    }

    pub(crate) fn do_run_smart_contract_upgrade(&self, input: &CallInput) -> VMOutput {
        self.init_state();

        if let Err(err) = self.check_upgrade_permission(input) {
            log::trace!("upgrade rejected: {}", err);
            self.runtime_mut().add_error(err.clone(), &input.function);
            return self.output().new_vm_output_in_case_of_error(&err);
        }

        self.runtime_mut().init_from_input(input.clone());
        self.metering_mut().init_from_input(&input.vm_input);
        self.output_mut()
            .add_tx_value_to_account(input.recipient_addr, &input.vm_input.call_value);
        self.storage_mut().set_address(input.recipient_addr);

        let (code, metadata) = match extract_code_upgrade_from_args(&input.vm_input.arguments) {
            Some(parts) => parts,
            None => {
                let err = HostError::InvalidUpgradeArguments;
                self.runtime_mut().add_error(err.clone(), &input.function);
                return self.output().new_vm_output_in_case_of_error(&err);
            }
        };

        let deploy_input = CodeDeployInput {
            contract_code: code,
            contract_code_metadata: metadata,
            contract_address: input.recipient_addr,
            code_deployer_address: input.vm_input.caller_addr,
        };

        match self.perform_code_deployment(deploy_input) {
            Ok(vm_output) => vm_output,
            Err(err) => {
                self.runtime_mut().add_error(err.clone(), &input.function);
                let vm_output = self.output().new_vm_output_in_case_of_error(&err);
                self.runtime_mut().clean_instance();
                vm_output
            }
        }
    }

    pub(crate) fn do_run_smart_contract_delete(&self, input: &CallInput) -> VMOutput {
        self.init_state();

        if let Err(err) = self.check_upgrade_permission(input) {
            log::trace!("delete rejected: {}", err);
            self.runtime_mut().add_error(err.clone(), &input.function);
            return self.output().new_vm_output_in_case_of_error(&err);
        }

        self.metering_mut().init_from_input(&input.vm_input);
        self.output_mut().delete_account(input.recipient_addr);
        self.current_vm_output(input.recipient_addr)
    }

    pub(crate) fn do_run_smart_contract_call(&self, input: &CallInput) -> VMOutput {
        self.init_state();

        self.runtime_mut().init_from_input(input.clone());
        self.async_ctx_mut().init_from_input(input);
        self.metering_mut().init_from_input(&input.vm_input);
        self.output_mut()
            .add_tx_value_to_account(input.recipient_addr, &input.vm_input.call_value);
        self.storage_mut().set_address(input.recipient_addr);

        let vm_output = match self.run_sc_call_body(input) {
            Ok(vm_output) => vm_output,
            Err(err) => {
                log::trace!("call failed: {}", err);
                self.runtime_mut().add_error(err.clone(), &input.function);
                self.output().new_vm_output_in_case_of_error(&err)
            }
        };

        if vm_output.return_code == skein_vm_common::ReturnCode::ExecutionFailed {
            self.runtime_mut().clean_instance();
        }

        log::trace!(
            "call finished: code {:?}, message {:?}",
            vm_output.return_code,
            vm_output.return_message
        );
        vm_output
    }

    fn run_sc_call_body(&self, input: &CallInput) -> HostResult<VMOutput> {
        let get_code_cost = self.metering().schedule().base_operation_cost.get_code;
        if input.vm_input.gas_provided < get_code_cost {
            return Err(HostError::NotEnoughGas);
        }

        let code = self.get_sc_code(&input.recipient_addr)?;
        self.metering_mut()
            .deduct_initial_gas_for_execution(code.len() as u64)?;

        let gas_for_execution = self.metering().gas_for_execution();
        self.with_executor(|executor| {
            self.runtime_mut()
                .start_wasm_instance(executor, &code, gas_for_execution, false)
        })?;

        self.call_sc_method()?;

        self.output_mut().remove_non_updated_storage();
        Ok(self.current_vm_output(input.recipient_addr))
    }

    /// Contract code for execution: staged deployments take precedence
    /// over the chain, so a freshly created contract can run `init`.
    pub(crate) fn get_sc_code(&self, address: &Address) -> HostResult<Vec<u8>> {
        if let Some(account) = self.output().account(address) {
            if let Some(code) = &account.code {
                return Ok(code.clone());
            }
        }
        self.blockchain()
            .get_code(address)
            .map_err(|_| HostError::ContractNotFound)
    }

    /// Assembles the active frame's `VMOutput` with current gas numbers.
    pub(crate) fn current_vm_output(&self, executing_address: Address) -> VMOutput {
        let gas_remaining = self.gas_left();
        let gas_spent = self.gas_spent_by_contract();
        self.output()
            .get_vm_output(executing_address, gas_remaining, gas_spent)
    }

    pub(crate) fn check_upgrade_permission(&self, input: &CallInput) -> HostResult<()> {
        let account = self
            .blockchain()
            .get_user_account(&input.recipient_addr)
            .map_err(|_| HostError::ContractNotFound)?;

        let metadata = CodeMetadata::from_bytes(&account.code_metadata);
        let caller_is_owner = input.vm_input.caller_addr == account.owner_address;
        if metadata.upgradeable && caller_is_owner {
            return Ok(());
        }
        Err(HostError::UpgradeNotAllowed)
    }

    fn call_init_function(&self) -> HostResult<()> {
        if !self.runtime().has_function(INIT_FUNCTION_NAME) {
            return Ok(());
        }
        self.call_sc_function(INIT_FUNCTION_NAME)?;
        self.check_final_gas_after_exit()
    }

    pub(crate) fn check_final_gas_after_exit(&self) -> HostResult<()> {
        let points = self.runtime().points_used();
        if points > self.metering().gas_for_execution() {
            return Err(HostError::NotEnoughGas);
        }
        Ok(())
    }

    fn call_sc_method(&self) -> HostResult<()> {
        let call_type = self.runtime().vm_input().vm_input.call_type;
        match call_type {
            CallType::DirectCall => {
                self.call_function_and_execute_async()?;
                Ok(())
            }
            CallType::AsynchronousCall => {
                let is_complete = self.call_function_and_execute_async()?;
                if is_complete {
                    let (code, data, message) = {
                        let output = self.output();
                        (
                            output.return_code(),
                            output.return_data().to_vec(),
                            output.return_message().to_string(),
                        )
                    };
                    self.send_cross_shard_callback(code, &data, &message)?;
                }
                Ok(())
            }
            CallType::AsynchronousCallBack => self.call_sc_method_asynchronous_callback(),
            _ => Err(HostError::UnknownCallType),
        }
    }

    /// Runs the named export, then drives the async work it registered.
    /// Returns whether the frame is complete (no pending cross-shard
    /// children).
    pub(crate) fn call_function_and_execute_async(&self) -> HostResult<bool> {
        self.runtime().verify_allowed_function_call()?;
        let function_name = self.runtime().function_name_checked()?;

        self.call_sc_function(&function_name)?;
        self.check_final_gas_after_exit()?;

        let is_legacy = self.async_ctx().has_legacy_group();
        self.execute_async_context()?;

        if !self.async_ctx().is_complete() {
            if !is_legacy {
                self.save_async_context()?;
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// The central recursion entry point: runs `input` against the
    /// destination's own storage context, with builtin-function
    /// interception.
    pub fn execute_on_dest_context(&self, input: CallInput) -> DestContextOutcome {
        self.execute_on_dest_context_with_flags(input, false)
    }

    /// Destination-context execution with every state mutation forbidden.
    pub fn execute_read_only(&self, input: CallInput) -> DestContextOutcome {
        self.execute_on_dest_context_with_flags(input, true)
    }

    fn execute_on_dest_context_with_flags(
        &self,
        input: CallInput,
        read_only: bool,
    ) -> DestContextOutcome {
        log::trace!(
            "execute on dest: function {}, dest {:?}, gas {}",
            input.function,
            input.recipient_addr,
            input.vm_input.gas_provided
        );

        self.blockchain_mut().push_state();

        let mut sc_input = Some(input.clone());
        let mut builtin_output: Option<VMOutput> = None;

        if self.blockchain().is_builtin_function(&input.function) {
            match self.handle_builtin_function_call(&input) {
                Ok((post_input, output)) => {
                    builtin_output = Some(output);
                    sc_input = post_input;
                }
                Err(err) => {
                    self.blockchain_mut().pop_set_active_state();
                    self.runtime_mut().add_error(err.clone(), &input.function);
                    let vm_output = self.output().new_vm_output_in_case_of_error(&err);
                    return (vm_output, true, Some(err));
                }
            }
        }

        let (vm_output, is_complete, error) = match sc_input {
            Some(sc_input) => self.execute_on_dest_context_no_builtin(sc_input, read_only),
            None => (
                builtin_output.unwrap_or_default(),
                true,
                None,
            ),
        };

        if error.is_some() {
            self.blockchain_mut().pop_set_active_state();
        } else {
            self.blockchain_mut().pop_discard();
        }

        (vm_output, is_complete, error)
    }

    fn execute_on_dest_context_no_builtin(
        &self,
        mut input: CallInput,
        read_only: bool,
    ) -> DestContextOutcome {
        let parent_read_only = self.runtime().read_only();

        // All forwarded gas is charged to the parent frame up front; the
        // unspent remainder comes back when the child frame closes.
        self.use_gas(input.vm_input.gas_provided);

        self.copy_tx_hashes_from_context(&mut input);

        self.managed_types_mut().push_state();
        self.managed_types_mut().init_state();

        self.output_mut().push_state();
        self.output_mut().censor_vm_output();

        self.runtime_mut().push_state();
        self.runtime_mut().init_from_input(input.clone());
        self.runtime_mut()
            .set_read_only(parent_read_only || read_only);

        self.async_ctx_mut().push_state();
        self.async_ctx_mut().init_from_input(&input);

        self.metering_mut().push_state();
        self.metering_mut().init_from_input(&input.vm_input);

        self.storage_mut().push_state();
        let context_address = self.runtime().context_address();
        self.storage_mut().set_address(context_address);

        let exec_result: HostResult<()> = (|| {
            // Value reaches the callee only if this frame survives.
            let value = input.vm_input.call_value.clone();
            let is_callback = input.vm_input.call_type == CallType::AsynchronousCallBack;
            if !is_callback || value == num_bigint::BigUint::default() {
                let sender_balance = self.blockchain().get_balance(&input.vm_input.caller_addr);
                self.output_mut().transfer_value_only(
                    input.recipient_addr,
                    input.vm_input.caller_addr,
                    &value,
                    &sender_balance,
                )?;
            }

            self.execute(&input)?;
            self.execute_async_context()?;
            Ok(())
        })();

        let is_complete = self.async_ctx().is_complete();
        let vm_output = self.finish_execute_on_dest_context(&exec_result);

        let error = match exec_result {
            Err(err) => Some(err),
            Ok(()) => {
                if vm_output.return_code == skein_vm_common::ReturnCode::Ok {
                    None
                } else {
                    Some(HostError::ExecutionFailed)
                }
            }
        };
        if let Some(err) = &error {
            self.runtime_mut().add_error(err.clone(), &input.function);
        }

        (vm_output, is_complete, error)
    }

    fn finish_execute_on_dest_context(&self, exec_result: &HostResult<()>) -> VMOutput {
        let mut vm_output = match exec_result {
            Err(err) => self.output().new_vm_output_in_case_of_error(err),
            Ok(()) => {
                let address = self.runtime().context_address();
                self.current_vm_output(address)
            }
        };

        if vm_output.return_code == skein_vm_common::ReturnCode::Ok
            && !self.async_ctx().is_complete()
        {
            if let Err(err) = self.save_async_context() {
                vm_output = self.output().new_vm_output_in_case_of_error(&err);
            }
        }

        let is_async_call =
            self.runtime().vm_input().vm_input.call_type == CallType::AsynchronousCall;
        let is_async_complete = self.async_ctx().is_complete();

        self.managed_types_mut().pop_set_active_state();
        self.storage_mut().pop_set_active_state();

        if vm_output.return_code == skein_vm_common::ReturnCode::Ok {
            self.metering_mut().pop_merge_active_state();
            self.output_mut().pop_merge_active_state();
        } else {
            self.metering_mut().pop_set_active_state();
            self.output_mut().pop_set_active_state();
        }

        self.runtime_mut().pop_set_active_state();
        self.async_ctx_mut().pop_set_active_state();

        // Unspent gas flows back to the caller's instance, unless the
        // child is an incomplete async leg whose gas is accounted through
        // the async machinery.
        if !is_async_call || is_async_complete {
            self.restore_gas(vm_output.gas_remaining);
        }

        log::trace!(
            "execute on dest finished: code {:?}, gas remaining {}",
            vm_output.return_code,
            vm_output.gas_remaining
        );
        vm_output
    }

    /// Runs target code against the caller's storage (library call). The
    /// storage and async contexts stay in place; blockchain state is
    /// snapshotted so a failure rolls back node-side effects.
    pub fn execute_on_same_context(&self, mut input: CallInput) -> HostResult<()> {
        log::trace!("execute on same context: function {}", input.function);

        if self.blockchain().is_builtin_function(&input.function) {
            return Err(HostError::BuiltinCallOnSameContextDisallowed);
        }

        self.use_gas(input.vm_input.gas_provided);

        let library_address = input.recipient_addr;
        input.recipient_addr = input.vm_input.caller_addr;
        self.copy_tx_hashes_from_context(&mut input);

        self.managed_types_mut().push_state();
        self.managed_types_mut().init_state();
        self.output_mut().push_state();

        self.runtime_mut().push_state();
        self.runtime_mut().init_from_input(input.clone());
        self.runtime_mut().set_code_address(library_address);

        self.metering_mut().push_state();
        self.metering_mut().init_from_input(&input.vm_input);

        self.blockchain_mut().push_state();

        let exec_result: HostResult<()> = (|| {
            let sender_balance = self.blockchain().get_balance(&input.vm_input.caller_addr);
            self.output_mut().transfer_value_only(
                input.recipient_addr,
                input.vm_input.caller_addr,
                &input.vm_input.call_value,
                &sender_balance,
            )?;
            self.execute(&input)?;
            Ok(())
        })();

        if let Err(err) = &exec_result {
            self.runtime_mut().add_error(err.clone(), &input.function);
        }
        self.finish_execute_on_same_context(&exec_result);
        exec_result
    }

    fn finish_execute_on_same_context(&self, exec_result: &HostResult<()>) {
        let failed =
            exec_result.is_err() || self.output().return_code() != skein_vm_common::ReturnCode::Ok;

        if failed {
            self.managed_types_mut().pop_set_active_state();
            self.metering_mut().pop_set_active_state();
            self.output_mut().pop_set_active_state();
            self.blockchain_mut().pop_set_active_state();
            self.runtime_mut().pop_set_active_state();
            return;
        }

        let gas_remaining = self.gas_left();

        self.metering_mut().pop_merge_active_state();
        self.output_mut().pop_discard();
        self.blockchain_mut().pop_discard();
        self.managed_types_mut().pop_set_active_state();
        self.runtime_mut().pop_set_active_state();

        self.restore_gas(gas_remaining);
    }

    /// Runs an indirect call, assuming the caller already pushed every
    /// context. Starts a fresh instance for the callee and leaves stack
    /// unwinding to the caller.
    fn execute(&self, input: &CallInput) -> HostResult<()> {
        if input.function == INIT_FUNCTION_NAME && !input.allow_init_function {
            return Err(HostError::InitFuncCalledInRun);
        }
        if input.function == crate::contexts::runtime::CALLBACK_FUNCTION_NAME
            && input.vm_input.call_type != CallType::AsynchronousCallBack
        {
            return Err(HostError::CallBackFuncCalledInRun);
        }
        if input.function == UPGRADE_FUNCTION_NAME {
            return self.execute_upgrade(input);
        }
        if input.function == DELETE_FUNCTION_NAME {
            self.check_upgrade_permission(input)?;
            self.output_mut().delete_account(input.recipient_addr);
            return Ok(());
        }

        let code_address = self.runtime().code_address();
        let code = self.get_sc_code(&code_address)?;
        self.metering_mut()
            .deduct_initial_gas_for_execution(code.len() as u64)?;

        let gas_for_execution = self.metering().gas_for_execution();
        self.with_executor(|executor| {
            self.runtime_mut()
                .start_wasm_instance(executor, &code, gas_for_execution, false)
        })?;

        self.call_sc_method_indirect()?;

        if self.output().return_code() != skein_vm_common::ReturnCode::Ok {
            return Err(HostError::ReturnCodeNotOk);
        }
        Ok(())
    }

    fn call_sc_method_indirect(&self) -> HostResult<()> {
        let function_name = match self.runtime().function_name_checked() {
            Ok(name) => name,
            // A callback-less async response has nothing to run.
            Err(_) => return Ok(()),
        };
        self.call_sc_function(&function_name)?;
        self.check_final_gas_after_exit()
    }

    fn execute_upgrade(&self, input: &CallInput) -> HostResult<()> {
        self.check_upgrade_permission(input)?;

        let (code, metadata) = extract_code_upgrade_from_args(&input.vm_input.arguments)
            .ok_or(HostError::InvalidUpgradeArguments)?;

        if CodeMetadata::has_reserved_bits(&metadata) {
            return Err(HostError::InvalidCodeMetadata);
        }

        let deploy_input = CodeDeployInput {
            contract_code: code,
            contract_code_metadata: metadata,
            contract_address: input.recipient_addr,
            code_deployer_address: input.vm_input.caller_addr,
        };

        self.metering_mut()
            .deduct_initial_gas_for_direct_deployment(deploy_input.contract_code.len() as u64)?;

        self.runtime_mut().must_verify_next_contract_code();
        let gas_for_execution = self.metering().gas_for_execution();
        self.with_executor(|executor| {
            self.runtime_mut().start_wasm_instance(
                executor,
                &deploy_input.contract_code,
                gas_for_execution,
                true,
            )
        })
        .map_err(|_| HostError::ContractInvalid)?;

        self.call_init_function()?;

        self.output_mut().deploy_code(deploy_input);
        if self.output().return_code() != skein_vm_common::ReturnCode::Ok {
            return Err(HostError::ReturnCodeNotOk);
        }
        Ok(())
    }

    /// Indirect deploy: derives the address, stages the code and runs
    /// `init` in the new contract's context.
    pub fn create_new_contract(&self, input: &CreateInput) -> HostResult<Address> {
        if self.runtime().read_only() {
            return Err(HostError::InvalidCallOnReadOnlyMode);
        }
        if CodeMetadata::has_reserved_bits(&input.contract_code_metadata) {
            return Err(HostError::InvalidCodeMetadata);
        }

        let indirect_cost = {
            let schedule = *self.metering().schedule();
            let per_byte = skein_vm_common::math::add_u64(
                schedule.base_operation_cost.compile_per_byte,
                schedule.base_operation_cost.store_per_byte,
            );
            skein_vm_common::math::mul_u64(input.contract_code.len() as u64, per_byte)
        };
        self.use_gas_bounded(indirect_cost)?;

        let caller = input.vm_input.caller_addr;
        let chain_nonce = self.blockchain().account_nonce(&caller)?;
        let staged_nonce = self
            .output()
            .account(&caller)
            .map(|account| account.nonce)
            .unwrap_or(0);
        let nonce = chain_nonce.max(staged_nonce);

        let new_address = self.blockchain().new_address_at_nonce(&caller, nonce)?;
        if self.blockchain().account_exists(&new_address) {
            return Err(HostError::DeploymentOverExistingAccount);
        }

        self.output_mut().deploy_code(CodeDeployInput {
            contract_code: input.contract_code.clone(),
            contract_code_metadata: input.contract_code_metadata.clone(),
            contract_address: new_address,
            code_deployer_address: caller,
        });

        self.runtime_mut().must_verify_next_contract_code();

        let mut init_input = CallInput {
            vm_input: input.vm_input.clone(),
            recipient_addr: new_address,
            function: INIT_FUNCTION_NAME.to_string(),
            allow_init_function: true,
        };
        self.set_async_arguments_for_call(&mut init_input);

        let (_, is_complete, error) = self.execute_on_dest_context(init_input);
        if let Some(err) = error {
            self.output_mut().delete_output_account(&new_address);
            return Err(err);
        }
        self.complete_child_conditional(is_complete)?;

        // The next deployment by this caller derives a fresh address.
        self.output_mut().account_mut(caller).nonce = nonce.saturating_add(1);

        Ok(new_address)
    }

    fn copy_tx_hashes_from_context(&self, input: &mut CallInput) {
        if input.vm_input.call_type != CallType::DirectCall {
            return;
        }
        let runtime = self.runtime();
        let current = &runtime.vm_input().vm_input;
        if !current.original_tx_hash.is_empty() {
            input.vm_input.original_tx_hash = current.original_tx_hash.clone();
        }
        if !current.current_tx_hash.is_empty() {
            input.vm_input.current_tx_hash = current.current_tx_hash.clone();
        }
        if !current.prev_tx_hash.is_empty() {
            input.vm_input.prev_tx_hash = current.prev_tx_hash.clone();
        }
    }
}

/// Upgrade arguments carry `(code, codeMetadata, init-args…)`.
fn extract_code_upgrade_from_args(arguments: &[Vec<u8>]) -> Option<(Vec<u8>, Vec<u8>)> {
    if arguments.len() < 2 {
        return None;
    }
    Some((arguments[0].clone(), arguments[1].clone()))
}
