//! Binds a WASM instance to a call input.
//!
//! Owns the currently executing instance, the instance stack for nested
//! synchronous calls, the bound call input, the read-only flag and the
//! error accumulator. The breakpoint register lives here as well: host
//! functions report failure by raising a breakpoint through this context
//! and the executor returns control at the next basic-block boundary.

use std::rc::Rc;
use std::sync::Arc;

use skein_executor::{
    BreakpointValue, CompilationOptions, Executor, ExecutorError, Instance, RuntimeBreakpoints,
};
use skein_vm_common::{Address, CallInput, CallType};

use crate::error::{HostError, HostResult};
use crate::state_stack::StateStack;

/// Default bound of the nested-instance stack.
pub const MAX_INSTANCE_STACK: usize = 10;

/// Exported function invoked on deployment and upgrade.
pub const INIT_FUNCTION_NAME: &str = "init";
/// Exported function invoked as the default async callback.
pub const CALLBACK_FUNCTION_NAME: &str = "callBack";
/// Reserved function name dispatching the upgrade path.
pub const UPGRADE_FUNCTION_NAME: &str = "upgradeContract";
/// Reserved function name dispatching the delete path.
pub const DELETE_FUNCTION_NAME: &str = "deleteContract";

#[derive(Default)]
struct RuntimeFrame {
    vm_input: CallInput,
    code_address: Address,
    custom_call_function: Option<String>,
    read_only: bool,
    verify_code: bool,
    instance: Option<Rc<dyn Instance>>,
}

/// The runtime context.
pub struct RuntimeContext {
    frame: RuntimeFrame,
    state_stack: Vec<RuntimeFrame>,
    max_instance_stack: usize,
    breakpoints: Arc<RuntimeBreakpoints>,
    pending_error: Option<HostError>,
    errors: Vec<(String, HostError)>,
}

impl RuntimeContext {
    /// Creates a context sharing the host's breakpoint register.
    pub fn new(breakpoints: Arc<RuntimeBreakpoints>) -> Self {
        RuntimeContext {
            frame: RuntimeFrame::default(),
            state_stack: Vec::new(),
            max_instance_stack: MAX_INSTANCE_STACK,
            breakpoints,
            pending_error: None,
            errors: Vec::new(),
        }
    }

    /// Overrides the instance stack bound, used by tests.
    pub fn set_max_instance_stack(&mut self, max: usize) {
        self.max_instance_stack = max;
    }

    /// Binds a call input to the active frame.
    pub fn init_from_input(&mut self, input: CallInput) {
        self.frame.code_address = input.recipient_addr;
        self.frame.vm_input = input;
        self.frame.custom_call_function = None;
    }

    /// The bound call input.
    pub fn vm_input(&self) -> &CallInput {
        &self.frame.vm_input
    }

    /// The address whose context is executing (storage owner).
    pub fn context_address(&self) -> Address {
        self.frame.vm_input.recipient_addr
    }

    /// The address whose code is executing; differs from the context
    /// address under same-context execution.
    pub fn code_address(&self) -> Address {
        self.frame.code_address
    }

    /// Points code resolution at a library contract.
    pub fn set_code_address(&mut self, address: Address) {
        self.frame.code_address = address;
    }

    /// The function that will be invoked, honoring callback overrides.
    pub fn function_name(&self) -> String {
        self.frame
            .custom_call_function
            .clone()
            .unwrap_or_else(|| self.frame.vm_input.function.clone())
    }

    /// Overrides the invoked function (async callback dispatch).
    pub fn set_custom_call_function(&mut self, name: &str) {
        self.frame.custom_call_function = Some(name.to_string());
    }

    /// The function name, rejecting the empty string.
    pub fn function_name_checked(&self) -> HostResult<String> {
        let name = self.function_name();
        if name.is_empty() {
            return Err(HostError::InvalidFunction);
        }
        Ok(name)
    }

    /// Read-only flag of the active frame.
    pub fn read_only(&self) -> bool {
        self.frame.read_only
    }

    /// Sets the read-only flag.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.frame.read_only = read_only;
    }

    /// Requires import verification for the next instance start.
    pub fn must_verify_next_contract_code(&mut self) {
        self.frame.verify_code = true;
    }

    /// Enforces the function-name policy for ordinary calls: `init` only
    /// during deploy/upgrade, `callBack` only on the callback leg.
    pub fn verify_allowed_function_call(&self) -> HostResult<()> {
        let name = self.function_name();
        if name == INIT_FUNCTION_NAME && !self.frame.vm_input.allow_init_function {
            return Err(HostError::InitFuncCalledInRun);
        }
        let in_callback = self.frame.vm_input.vm_input.call_type == CallType::AsynchronousCallBack;
        if name == CALLBACK_FUNCTION_NAME && !in_callback {
            return Err(HostError::CallBackFuncCalledInRun);
        }
        Ok(())
    }

    /// Starts a new instance for `code`, stashing any running instance on
    /// the instance stack.
    pub fn start_wasm_instance(
        &mut self,
        executor: &dyn Executor,
        code: &[u8],
        gas_limit: u64,
        for_deployment: bool,
    ) -> HostResult<()> {
        if self.state_stack.len() >= self.max_instance_stack {
            return Err(HostError::MaxInstancesReached);
        }

        let verify = for_deployment || self.frame.verify_code;
        self.frame.verify_code = false;

        let options = CompilationOptions {
            gas_limit,
            for_deployment: verify,
        };
        let instance = executor.new_instance(code, &options).map_err(|err| match err {
            ExecutorError::UnknownImport(_) | ExecutorError::CompilationFailed(_) => {
                HostError::ContractInvalid
            }
            other => HostError::Executor(other),
        })?;
        instance.set_points_used(0);
        log::trace!("instance started, id {}", instance.id());
        self.frame.instance = Some(Rc::from(instance));
        Ok(())
    }

    fn instance(&self) -> HostResult<&dyn Instance> {
        self.frame
            .instance
            .as_deref()
            .ok_or(HostError::ExecutionFailed)
    }

    /// A shared handle on the running instance. The host clones it before
    /// invoking an export so no context borrow is held while guest code
    /// re-enters the bridge.
    pub fn current_instance(&self) -> HostResult<Rc<dyn Instance>> {
        self.frame
            .instance
            .clone()
            .ok_or(HostError::ExecutionFailed)
    }

    /// True if the current instance exports `name`.
    pub fn has_function(&self, name: &str) -> bool {
        self.frame
            .instance
            .as_deref()
            .map(|instance| instance.has_function(name))
            .unwrap_or(false)
    }

    /// Interprets the error returned by the executor after a stopped
    /// call. Clears the breakpoint value; the timeout flag survives so
    /// the top-level dispatcher can classify the run.
    pub fn handle_breakpoint(&mut self, err: ExecutorError) -> HostResult<()> {
        let result = match &err {
            ExecutorError::Breakpoint(value) => match value {
                BreakpointValue::None => Ok(()),
                BreakpointValue::OutOfGas => Err(HostError::NotEnoughGas),
                BreakpointValue::MemoryLimit => Err(HostError::MemoryLimit),
                BreakpointValue::SignalError => Err(HostError::SignalError),
                BreakpointValue::ExecutionFailed => {
                    if self.breakpoints.timed_out() {
                        Err(HostError::ExecutionFailedWithTimeout)
                    } else {
                        Err(self
                            .pending_error
                            .take()
                            .unwrap_or(HostError::ExecutionFailed))
                    }
                }
                // The guest yielded to register async work or exited
                // cleanly; neither is a failure.
                BreakpointValue::AsyncCall | BreakpointValue::SignalExit => Ok(()),
            },
            ExecutorError::FunctionNotFound(_) => Err(HostError::FunctionNotFound),
            ExecutorError::InvalidFunction => Err(HostError::InvalidFunction),
            ExecutorError::Trap(_) => Err(HostError::ExecutionFailed),
            other => Err(HostError::Executor(other.clone())),
        };
        self.breakpoints.clear_value();
        result
    }

    /// Records an error and raises the `ExecutionFailed` breakpoint; the
    /// executor stops at the next basic-block boundary.
    pub fn fail_execution(&mut self, err: HostError) {
        log::trace!("fail execution: {}", err);
        self.pending_error = Some(err);
        self.breakpoints.set(BreakpointValue::ExecutionFailed);
    }

    /// Raises the `SignalError` breakpoint; message and return code are
    /// the output context's concern.
    pub fn signal_user_error(&mut self) {
        self.breakpoints.set(BreakpointValue::SignalError);
    }

    /// Raises an arbitrary breakpoint.
    pub fn set_runtime_breakpoint(&mut self, value: BreakpointValue) {
        self.breakpoints.set(value);
    }

    /// The shared breakpoint register.
    pub fn breakpoints(&self) -> Arc<RuntimeBreakpoints> {
        Arc::clone(&self.breakpoints)
    }

    /// Accumulates an error with the function it came from; surfaced in
    /// the final output as the internal-errors log entry.
    pub fn add_error(&mut self, err: HostError, function: &str) {
        self.errors.push((function.to_string(), err));
    }

    /// The accumulated error chain, oldest first.
    pub fn get_all_errors(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let formatted: Vec<String> = self
            .errors
            .iter()
            .map(|(function, err)| format!("{} [{}]", err, function))
            .collect();
        Some(formatted.join("; "))
    }

    /// Clears the accumulated errors; done at the start of a top-level
    /// call.
    pub fn clear_errors(&mut self) {
        self.errors.clear();
        self.pending_error = None;
    }

    /// Reads bytes from the current instance's memory.
    pub fn mem_load(&self, offset: u32, length: u32) -> HostResult<Vec<u8>> {
        Ok(self.instance()?.mem_load(offset, length)?)
    }

    /// Writes bytes into the current instance's memory.
    pub fn mem_store(&self, offset: u32, data: &[u8]) -> HostResult<()> {
        Ok(self.instance()?.mem_store(offset, data)?)
    }

    /// Gas points consumed by the current instance.
    pub fn points_used(&self) -> u64 {
        self.frame
            .instance
            .as_deref()
            .map(|instance| instance.get_points_used())
            .unwrap_or(0)
    }

    /// Overwrites the consumed-points counter of the current instance.
    pub fn set_points_used(&mut self, points: u64) {
        if let Some(instance) = self.frame.instance.as_deref() {
            instance.set_points_used(points);
        }
    }

    /// Tears down the current instance.
    pub fn clean_instance(&mut self) {
        if let Some(instance) = self.frame.instance.take() {
            instance.reset();
        }
    }

    /// Depth of saved frames, used by tests.
    pub fn stack_depth(&self) -> usize {
        self.state_stack.len()
    }
}

impl StateStack for RuntimeContext {
    fn init_state(&mut self) {
        self.frame = RuntimeFrame::default();
        self.clear_errors();
        self.breakpoints.clear();
    }

    fn push_state(&mut self) {
        self.state_stack.push(std::mem::take(&mut self.frame));
    }

    fn pop_set_active_state(&mut self) {
        if let Some(frame) = self.state_stack.pop() {
            if let Some(instance) = self.frame.instance.take() {
                instance.reset();
            }
            self.frame = frame;
        }
    }

    fn pop_discard(&mut self) {
        if let Some(mut frame) = self.state_stack.pop() {
            if let Some(instance) = frame.instance.take() {
                instance.reset();
            }
        }
    }

    fn clear_state_stack(&mut self) {
        self.state_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_executor::{
        ExecutorFactory, ExecutorFactoryArgs, OpcodeCosts, ScriptedContract,
        ScriptedExecutorFactory, VMHooks,
    };
    use std::rc::Rc;

    struct IdleHooks;

    macro_rules! stub_i32 {
        ($($name:ident ( $($arg:ident : $ty:ty),* )),* $(,)?) => {
            $(fn $name(&self, $(_: $ty),*) -> i32 { 0 })*
        };
    }
    macro_rules! stub_i64 {
        ($($name:ident ( $($arg:ident : $ty:ty),* )),* $(,)?) => {
            $(fn $name(&self, $(_: $ty),*) -> i64 { 0 })*
        };
    }
    macro_rules! stub_void {
        ($($name:ident ( $($arg:ident : $ty:ty),* )),* $(,)?) => {
            $(fn $name(&self, $(_: $ty),*) {})*
        };
    }

    impl VMHooks for IdleHooks {
        stub_i64! {
            get_gas_left(), get_block_timestamp(), get_block_nonce(), get_block_round(),
            get_block_epoch(), get_prev_block_timestamp(), get_prev_block_nonce(),
            get_prev_block_round(), get_prev_block_epoch(),
            get_storage_lock(a: i32, b: i32),
            get_esdt_local_roles(a: i32, b: i32),
            get_current_esdt_nft_nonce(a: i32, b: i32, c: i32),
            get_esdt_token_nonce_by_index(a: i32),
            big_int_get_int64(a: i32),
        }
        stub_i32! {
            get_call_value(a: i32), get_num_arguments(), get_argument_length(a: i32),
            get_argument(a: i32, b: i32), get_function(a: i32),
            get_shard_of_address(a: i32), is_smart_contract(a: i32),
            get_block_hash(a: i64, b: i32),
            storage_store(a: i32, b: i32, c: i32, d: i32),
            storage_load_length(a: i32, b: i32),
            storage_load(a: i32, b: i32, c: i32),
            storage_load_from_address(a: i32, b: i32, c: i32, d: i32),
            set_storage_lock(a: i32, b: i32, c: i64),
            is_storage_locked(a: i32, b: i32),
            clear_storage_lock(a: i32, b: i32),
            get_esdt_balance(a: i32, b: i32, c: i32, d: i64, e: i32),
            get_esdt_token_data(a: i32, b: i32, c: i32, d: i64, e: i32, f: i32),
            validate_token_identifier(a: i32, b: i32),
            get_num_esdt_transfers(),
            get_esdt_value_by_index(a: i32, b: i32),
            get_esdt_token_name_by_index(a: i32, b: i32),
            get_esdt_token_type_by_index(a: i32),
            transfer_value(a: i32, b: i32, c: i32, d: i32),
            transfer_value_execute(a: i32, b: i32, c: i64, d: i32, e: i32, f: i32, g: i32, h: i32),
            transfer_esdt_execute(a: i32, b: i32, c: i32, d: i32, e: i64, f: i32, g: i32, h: i32, i: i32, j: i32),
            transfer_esdt_nft_execute(a: i32, b: i32, c: i32, d: i32, e: i64, f: i64, g: i32, h: i32, i: i32, j: i32, k: i32),
            multi_transfer_esdt_nft_execute(a: i32, b: i32, c: i32, d: i32, e: i64, f: i32, g: i32, h: i32, i: i32, j: i32),
            execute_on_dest_context(a: i64, b: i32, c: i32, d: i32, e: i32, f: i32, g: i32, h: i32),
            execute_on_same_context(a: i64, b: i32, c: i32, d: i32, e: i32, f: i32, g: i32, h: i32),
            execute_read_only(a: i64, b: i32, c: i32, d: i32, e: i32, f: i32, g: i32),
            create_contract(a: i64, b: i32, c: i32, d: i32, e: i32, f: i32, g: i32, h: i32, i: i32),
            deploy_from_source_contract(a: i64, b: i32, c: i32, d: i32, e: i32, f: i32, g: i32, h: i32),
            create_async_call(a: i32, b: i32, c: i32, d: i32, e: i32, f: i32, g: i32, h: i32, i: i64, j: i64),
            set_async_context_callback(a: i32, b: i32, c: i32, d: i32, e: i64),
            get_num_return_data(), get_return_data_size(a: i32), get_return_data(a: i32, b: i32),
            mbuffer_new(), mbuffer_new_from_bytes(a: i32, b: i32), mbuffer_get_length(a: i32),
            mbuffer_get_bytes(a: i32, b: i32), mbuffer_set_bytes(a: i32, b: i32, c: i32),
            mbuffer_append_bytes(a: i32, b: i32, c: i32), mbuffer_finish(a: i32),
            mbuffer_get_argument(a: i32, b: i32),
            mbuffer_storage_store(a: i32, b: i32), mbuffer_storage_load(a: i32, b: i32),
            big_int_new(a: i64), big_int_sign(a: i32), big_int_cmp(a: i32, b: i32),
        }
        stub_void! {
            get_sc_address(a: i32), get_owner_address(a: i32), get_caller(a: i32),
            check_no_payment(),
            get_block_random_seed(a: i32), get_state_root_hash(a: i32),
            get_prev_block_random_seed(a: i32), get_original_tx_hash(a: i32),
            get_external_balance(a: i32, b: i32),
            upgrade_contract(a: i32, b: i64, c: i32, d: i32, e: i32, f: i32, g: i32, h: i32, i: i32),
            upgrade_from_source_contract(a: i32, b: i64, c: i32, d: i32, e: i32, f: i32, g: i32, h: i32),
            delete_contract(a: i32, b: i64, c: i32, d: i32, e: i32),
            async_call(a: i32, b: i32, c: i32, d: i32),
            finish(a: i32, b: i32),
            write_log(a: i32, b: i32, c: i32, d: i32),
            write_event_log(a: i32, b: i32, c: i32, d: i32, e: i32),
            signal_error(a: i32, b: i32),
            clean_return_data(), delete_from_return_data(a: i32),
            big_int_set_int64(a: i32, b: i64),
            big_int_add(a: i32, b: i32, c: i32), big_int_sub(a: i32, b: i32, c: i32),
            big_int_mul(a: i32, b: i32, c: i32),
            big_int_to_buffer(a: i32, b: i32),
            big_int_get_unsigned_argument(a: i32, b: i32),
            big_int_get_call_value(a: i32),
            big_int_finish_unsigned(a: i32),
        }
    }

    fn make_runtime_with_executor() -> (RuntimeContext, Box<dyn Executor>, Rc<ScriptedExecutorFactory>) {
        let breakpoints = RuntimeBreakpoints::new();
        let factory = ScriptedExecutorFactory::new();
        let executor = factory
            .create_executor(ExecutorFactoryArgs {
                vm_hooks: Rc::new(IdleHooks),
                opcode_costs: OpcodeCosts::default(),
                breakpoints: Arc::clone(&breakpoints),
                sigsegv_passthrough: false,
            })
            .unwrap();
        (RuntimeContext::new(breakpoints), executor, factory)
    }

    #[test]
    fn test_instance_stack_bound() {
        let (mut runtime, executor, factory) = make_runtime_with_executor();
        runtime.set_max_instance_stack(2);
        factory.register_contract(b"code", ScriptedContract::new().with_export("f", |_| {}));

        runtime
            .start_wasm_instance(&*executor, b"code", 1_000, false)
            .unwrap();
        runtime.push_state();
        runtime
            .start_wasm_instance(&*executor, b"code", 1_000, false)
            .unwrap();
        runtime.push_state();
        let err = runtime
            .start_wasm_instance(&*executor, b"code", 1_000, false)
            .unwrap_err();
        assert_eq!(err, HostError::MaxInstancesReached);
        assert_eq!(runtime.stack_depth(), 2);
    }

    #[test]
    fn test_function_name_policy() {
        let breakpoints = RuntimeBreakpoints::new();
        let mut runtime = RuntimeContext::new(breakpoints);

        let mut input = CallInput::direct(Address([1u8; 32]), Address([2u8; 32]), "init");
        runtime.init_from_input(input.clone());
        assert_eq!(
            runtime.verify_allowed_function_call().unwrap_err(),
            HostError::InitFuncCalledInRun
        );

        input.allow_init_function = true;
        runtime.init_from_input(input);
        assert!(runtime.verify_allowed_function_call().is_ok());

        let mut input = CallInput::direct(Address([1u8; 32]), Address([2u8; 32]), "callBack");
        runtime.init_from_input(input.clone());
        assert_eq!(
            runtime.verify_allowed_function_call().unwrap_err(),
            HostError::CallBackFuncCalledInRun
        );

        input.vm_input.call_type = CallType::AsynchronousCallBack;
        runtime.init_from_input(input);
        assert!(runtime.verify_allowed_function_call().is_ok());
    }

    #[test]
    fn test_fail_execution_surfaces_recorded_error() {
        let (mut runtime, executor, factory) = make_runtime_with_executor();
        factory.register_contract(b"code", ScriptedContract::new().with_export("f", |_| {}));
        runtime
            .start_wasm_instance(&*executor, b"code", 1_000, false)
            .unwrap();

        runtime.fail_execution(HostError::NegativeLength);
        let instance = runtime.current_instance().unwrap();
        let stopped = instance.call_function("f").unwrap_err();
        let err = runtime.handle_breakpoint(stopped).unwrap_err();
        assert_eq!(err, HostError::NegativeLength);
        // Register is cleared after handling.
        assert!(!runtime.breakpoints().is_set());
    }

    #[test]
    fn test_missing_function() {
        let (mut runtime, executor, factory) = make_runtime_with_executor();
        factory.register_contract(b"code", ScriptedContract::new());
        runtime
            .start_wasm_instance(&*executor, b"code", 1_000, false)
            .unwrap();
        let instance = runtime.current_instance().unwrap();
        let stopped = instance.call_function("missing").unwrap_err();
        assert_eq!(
            runtime.handle_breakpoint(stopped).unwrap_err(),
            HostError::FunctionNotFound
        );
    }

    #[test]
    fn test_error_accumulator() {
        let breakpoints = RuntimeBreakpoints::new();
        let mut runtime = RuntimeContext::new(breakpoints);
        assert!(runtime.get_all_errors().is_none());

        runtime.add_error(HostError::ExecutionFailed, "memoryFault");
        runtime.add_error(HostError::NotEnoughGas, "doWork");
        let formatted = runtime.get_all_errors().unwrap();
        assert!(formatted.contains("memoryFault"));
        assert!(formatted.contains("execution failed"));
        assert!(formatted.contains("doWork"));
    }

    #[test]
    fn test_unknown_bytecode_is_contract_invalid() {
        let (mut runtime, executor, _factory) = make_runtime_with_executor();
        let err = runtime
            .start_wasm_instance(&*executor, b"unregistered", 1_000, false)
            .unwrap_err();
        assert_eq!(err, HostError::ContractInvalid);
    }
}
