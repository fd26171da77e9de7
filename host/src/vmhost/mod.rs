//! The VM host: composition and lifecycle.
//!
//! Owns the seven contexts behind `RefCell`s so the hook bridge can reach
//! them through a shared reference while nested calls re-enter the host.
//! Borrows are kept short: no context borrow is held across a call into
//! another context or back into the executor.

mod async_ops;
pub mod esdt;
mod execution;
mod storage_ops;
mod watchdog;

pub use execution::DestContextOutcome;

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use skein_executor::{BreakpointValue, Executor, RuntimeBreakpoints};
use skein_vm_common::{
    math, Address, BlockchainHook, CallInput, CreateInput, CryptoHook, LogEntry, VMOutput,
};

use crate::contexts::{
    AsyncContext, BlockchainContext, ManagedTypesContext, MeteringContext, OutputContext,
    RuntimeContext, StorageContext,
};
use crate::error::{HostError, HostResult};
use crate::gas::GasSchedule;
use crate::state_stack::StateStack;

pub use watchdog::MIN_EXECUTION_TIMEOUT;

/// Version string reported by the host.
pub const VM_VERSION: &str = "skein-vm/0.3";

/// Log identifier of the internal-errors entry appended to outputs.
pub const INTERNAL_VM_ERRORS: &[u8] = b"internalVMErrors";

const GAS_TRACE_TARGET: &str = "gas_trace";

/// Construction parameters of a host.
pub struct VMHostParameters {
    /// The gas schedule to start with.
    pub gas_schedule: GasSchedule,
    /// Wall-clock budget of one top-level run; clamped up to
    /// [`MIN_EXECUTION_TIMEOUT`].
    pub execution_timeout: Duration,
    /// Forwarded to the executor factory.
    pub sigsegv_passthrough: bool,
}

impl Default for VMHostParameters {
    fn default() -> Self {
        VMHostParameters {
            gas_schedule: GasSchedule::default(),
            execution_timeout: MIN_EXECUTION_TIMEOUT,
            sigsegv_passthrough: false,
        }
    }
}

/// The VM host. One instance serves one logical execution lane; distinct
/// hosts are fully isolated from each other.
pub struct VMHost {
    crypto: Rc<dyn CryptoHook>,
    breakpoints: Arc<RuntimeBreakpoints>,
    executor: RefCell<Option<Box<dyn Executor>>>,

    runtime: RefCell<RuntimeContext>,
    metering: RefCell<MeteringContext>,
    output: RefCell<OutputContext>,
    storage: RefCell<StorageContext>,
    blockchain: RefCell<BlockchainContext>,
    managed_types: RefCell<ManagedTypesContext>,
    async_ctx: RefCell<AsyncContext>,

    gas_schedule: RwLock<GasSchedule>,
    execution_guard: RwLock<()>,
    execution_timeout: Duration,
    closing: Cell<bool>,
    sigsegv_passthrough: bool,
}

impl VMHost {
    /// Creates a host over the given hooks. The executor is wired
    /// afterwards with [`VMHost::set_executor`], once the hook bridge has
    /// a handle on this host.
    pub fn new(
        blockchain_hook: Rc<dyn BlockchainHook>,
        crypto: Rc<dyn CryptoHook>,
        parameters: VMHostParameters,
    ) -> Rc<VMHost> {
        let breakpoints = RuntimeBreakpoints::new();
        let execution_timeout = parameters.execution_timeout.max(MIN_EXECUTION_TIMEOUT);

        Rc::new(VMHost {
            crypto,
            breakpoints: Arc::clone(&breakpoints),
            executor: RefCell::new(None),
            runtime: RefCell::new(RuntimeContext::new(Arc::clone(&breakpoints))),
            metering: RefCell::new(MeteringContext::new(parameters.gas_schedule)),
            output: RefCell::new(OutputContext::new()),
            storage: RefCell::new(StorageContext::new()),
            blockchain: RefCell::new(BlockchainContext::new(blockchain_hook)),
            managed_types: RefCell::new(ManagedTypesContext::new()),
            async_ctx: RefCell::new(AsyncContext::new()),
            gas_schedule: RwLock::new(parameters.gas_schedule),
            execution_guard: RwLock::new(()),
            execution_timeout,
            closing: Cell::new(false),
            sigsegv_passthrough: parameters.sigsegv_passthrough,
        })
    }

    /// Wires the executor; must happen exactly once before the first run.
    pub fn set_executor(&self, executor: Box<dyn Executor>) {
        *self.executor.borrow_mut() = Some(executor);
    }

    /// The host's version string.
    pub fn version(&self) -> &'static str {
        VM_VERSION
    }

    /// The shared breakpoint register.
    pub fn breakpoints(&self) -> Arc<RuntimeBreakpoints> {
        Arc::clone(&self.breakpoints)
    }

    /// Whether guest faults propagate as signals (test harness mode).
    pub fn sigsegv_passthrough(&self) -> bool {
        self.sigsegv_passthrough
    }

    /// The crypto hook.
    pub fn crypto(&self) -> &dyn CryptoHook {
        &*self.crypto
    }

    /// Runtime context, shared.
    pub fn runtime(&self) -> Ref<'_, RuntimeContext> {
        self.runtime.borrow()
    }

    /// Runtime context, exclusive.
    pub fn runtime_mut(&self) -> RefMut<'_, RuntimeContext> {
        self.runtime.borrow_mut()
    }

    /// Metering context, shared.
    pub fn metering(&self) -> Ref<'_, MeteringContext> {
        self.metering.borrow()
    }

    /// Metering context, exclusive.
    pub fn metering_mut(&self) -> RefMut<'_, MeteringContext> {
        self.metering.borrow_mut()
    }

    /// Output context, shared.
    pub fn output(&self) -> Ref<'_, OutputContext> {
        self.output.borrow()
    }

    /// Output context, exclusive.
    pub fn output_mut(&self) -> RefMut<'_, OutputContext> {
        self.output.borrow_mut()
    }

    /// Storage context, exclusive.
    pub fn storage_mut(&self) -> RefMut<'_, StorageContext> {
        self.storage.borrow_mut()
    }

    /// Blockchain context, shared.
    pub fn blockchain(&self) -> Ref<'_, BlockchainContext> {
        self.blockchain.borrow()
    }

    /// Blockchain context, exclusive.
    pub fn blockchain_mut(&self) -> RefMut<'_, BlockchainContext> {
        self.blockchain.borrow_mut()
    }

    /// Managed-types context, exclusive.
    pub fn managed_types_mut(&self) -> RefMut<'_, ManagedTypesContext> {
        self.managed_types.borrow_mut()
    }

    /// Async context, shared.
    pub fn async_ctx(&self) -> Ref<'_, AsyncContext> {
        self.async_ctx.borrow()
    }

    /// Async context, exclusive.
    pub fn async_ctx_mut(&self) -> RefMut<'_, AsyncContext> {
        self.async_ctx.borrow_mut()
    }

    pub(crate) fn with_executor<T>(
        &self,
        f: impl FnOnce(&dyn Executor) -> HostResult<T>,
    ) -> HostResult<T> {
        let executor = self.executor.borrow();
        let executor = executor.as_deref().ok_or(HostError::ExecutorNotSet)?;
        f(executor)
    }

    /// Resets every context for a fresh top-level call.
    pub fn init_state(&self) {
        self.clear_context_state_stacks();
        self.managed_types.borrow_mut().init_state();
        self.output.borrow_mut().init_state();
        self.metering.borrow_mut().init_state();
        self.runtime.borrow_mut().init_state();
        self.async_ctx.borrow_mut().init_state();
        self.storage.borrow_mut().init_state();
        self.blockchain.borrow_mut().init_state();
    }

    /// Clears the state stacks of every context.
    pub fn clear_context_state_stacks(&self) {
        self.managed_types.borrow_mut().clear_state_stack();
        self.output.borrow_mut().clear_state_stack();
        self.metering.borrow_mut().clear_state_stack();
        self.runtime.borrow_mut().clear_state_stack();
        self.async_ctx.borrow_mut().clear_state_stack();
        self.storage.borrow_mut().clear_state_stack();
        self.blockchain.borrow_mut().clear_state_stack();
    }

    /// Swaps the gas schedule. Blocks until in-flight calls complete;
    /// calls started afterwards use the new schedule.
    pub fn gas_schedule_change(&self, new_schedule: GasSchedule) {
        let _guard = self.execution_guard.write();
        *self.gas_schedule.write() = new_schedule;
        self.metering.borrow_mut().set_schedule(new_schedule);
        self.with_executor(|executor| {
            executor.clear_compiled_cache();
            Ok(())
        })
        .ok();
    }

    /// The currently configured schedule.
    pub fn current_gas_schedule(&self) -> GasSchedule {
        *self.gas_schedule.read()
    }

    /// Rejects new calls and drops cached artifacts.
    pub fn close(&self) {
        let _guard = self.execution_guard.write();
        self.closing.set(true);
        self.with_executor(|executor| {
            executor.clear_compiled_cache();
            Ok(())
        })
        .ok();
    }

    /// Drops cached artifacts but keeps accepting calls.
    pub fn reset(&self) {
        let _guard = self.execution_guard.write();
        self.with_executor(|executor| {
            executor.clear_compiled_cache();
            Ok(())
        })
        .ok();
    }

    /// True if both addresses resolve to the same shard.
    pub fn in_same_shard(&self, left: &Address, right: &Address) -> bool {
        self.blockchain.borrow().same_shard(left, right)
    }

    // --- gas plumbing -----------------------------------------------------
    //
    // Opcode-level consumption and API charges share the instance's point
    // counter; these helpers keep the two contexts consistent.

    /// Charges gas unconditionally.
    pub fn use_gas(&self, amount: u64) {
        let mut runtime = self.runtime.borrow_mut();
        let points = math::add_u64(runtime.points_used(), amount);
        runtime.set_points_used(points);
    }

    /// Charges gas; raises the OutOfGas breakpoint if it cannot be
    /// covered.
    pub fn use_gas_bounded(&self, amount: u64) -> HostResult<()> {
        if self.gas_left() < amount {
            self.runtime
                .borrow_mut()
                .set_runtime_breakpoint(BreakpointValue::OutOfGas);
            return Err(HostError::NotEnoughGas);
        }
        self.use_gas(amount);
        Ok(())
    }

    /// Remaining gas of the current frame.
    pub fn gas_left(&self) -> u64 {
        let points = self.runtime.borrow().points_used();
        self.metering.borrow().gas_left(points)
    }

    /// Gas this frame has spent so far, including its initial cost.
    pub fn gas_spent_by_contract(&self) -> u64 {
        let points = self.runtime.borrow().points_used();
        self.metering.borrow().gas_spent_by_contract(points)
    }

    /// Caps a requested forward at the remaining gas.
    pub fn bound_gas_limit(&self, requested: u64) -> u64 {
        requested.min(self.gas_left())
    }

    /// Returns unused gas to the current frame.
    pub fn restore_gas(&self, amount: u64) {
        let mut runtime = self.runtime.borrow_mut();
        let points = math::sub_u64(runtime.points_used(), amount);
        runtime.set_points_used(points);
    }

    /// Charges an API base cost and records it in the tracer.
    pub fn charge_api(&self, api_name: &str, amount: u64) -> HostResult<()> {
        self.use_gas_bounded(amount)?;
        let mut metering = self.metering.borrow_mut();
        if metering.is_gas_tracing() {
            let address = self.runtime.borrow().context_address();
            metering.trace_gas_used(address.as_bytes(), api_name, amount);
        }
        Ok(())
    }

    /// Invokes an exported function on the current instance. The instance
    /// handle is cloned out of the runtime context first, so guest code
    /// can re-enter the bridge while it runs.
    pub fn call_sc_function(&self, name: &str) -> HostResult<()> {
        let instance = self.runtime().current_instance()?;
        match instance.call_function(name) {
            Ok(()) => Ok(()),
            Err(err) => self.runtime_mut().handle_breakpoint(err),
        }
    }

    // --- failure plumbing -------------------------------------------------

    /// Records an error and stops execution at the next boundary.
    pub fn fail_execution(&self, err: HostError) {
        self.runtime.borrow_mut().fail_execution(err);
    }

    /// Terminates the call with a deliberate user error.
    pub fn signal_user_error(&self, message: &str) {
        {
            let mut output = self.output.borrow_mut();
            output.set_return_message(message);
            output.set_return_code(skein_vm_common::ReturnCode::UserError);
        }
        self.runtime.borrow_mut().signal_user_error();
    }

    // --- top-level runs ---------------------------------------------------

    /// Executes the deployment of a new contract.
    pub fn run_smart_contract_create(&self, input: &CreateInput) -> HostResult<VMOutput> {
        let _guard = self.execution_guard.read();
        if self.closing.get() {
            return Err(HostError::VMIsClosing);
        }
        self.set_gas_tracing_from_log_level();

        log::trace!(
            "run create begin: code {} bytes, gas {}",
            input.contract_code.len(),
            input.vm_input.gas_provided
        );

        let result = self.run_guarded(|| {
            let mut vm_output = self.do_run_smart_contract_create(input);
            self.append_internal_errors_log(
                &mut vm_output,
                input.vm_input.caller_addr,
                input.vm_input.caller_addr,
                "_init",
            );
            vm_output
        });
        self.flush_gas_trace("init");
        result
    }

    /// Executes a call of an existing contract, dispatching the reserved
    /// upgrade/delete function names.
    pub fn run_smart_contract_call(&self, input: &CallInput) -> HostResult<VMOutput> {
        let _guard = self.execution_guard.read();
        if self.closing.get() {
            return Err(HostError::VMIsClosing);
        }
        self.set_gas_tracing_from_log_level();

        log::trace!(
            "run call begin: function {}, gas {}",
            input.function,
            input.vm_input.gas_provided
        );

        let result = self.run_guarded(|| {
            let mut vm_output = match input.function.as_str() {
                crate::contexts::runtime::UPGRADE_FUNCTION_NAME => {
                    self.do_run_smart_contract_upgrade(input)
                }
                crate::contexts::runtime::DELETE_FUNCTION_NAME => {
                    self.do_run_smart_contract_delete(input)
                }
                _ => self.do_run_smart_contract_call(input),
            };
            self.append_internal_errors_log(
                &mut vm_output,
                input.vm_input.caller_addr,
                input.recipient_addr,
                &input.function,
            );
            vm_output
        });
        self.flush_gas_trace(&input.function);
        result
    }

    /// Runs a body under the watchdog with panic isolation.
    fn run_guarded(&self, body: impl FnOnce() -> VMOutput) -> HostResult<VMOutput> {
        self.breakpoints.clear();
        let guard = watchdog::arm(Arc::clone(&self.breakpoints), self.execution_timeout);

        let outcome = catch_unwind(AssertUnwindSafe(body));
        drop(guard);

        match outcome {
            Ok(vm_output) => {
                if self.breakpoints.timed_out() {
                    self.breakpoints.clear();
                    self.runtime.borrow_mut().clean_instance();
                    return Err(HostError::ExecutionFailedWithTimeout);
                }
                log::trace!(
                    "run end: code {:?}, message {:?}, gas remaining {}",
                    vm_output.return_code,
                    vm_output.return_message,
                    vm_output.gas_remaining
                );
                Ok(vm_output)
            }
            Err(panic) => {
                log::error!("vm execution panicked: {:?}", panic_message(&panic));
                self.breakpoints.clear();
                self.runtime.borrow_mut().clean_instance();
                Err(HostError::ExecutionPanicked)
            }
        }
    }

    /// Appends the accumulated runtime errors as a log entry.
    fn append_internal_errors_log(
        &self,
        vm_output: &mut VMOutput,
        sender: Address,
        receiver: Address,
        function: &str,
    ) {
        let errors = self.runtime.borrow().get_all_errors();
        if let Some(formatted) = errors {
            vm_output.logs.push(LogEntry {
                identifier: INTERNAL_VM_ERRORS.to_vec(),
                address: sender,
                topics: vec![receiver.as_bytes().to_vec(), function.as_bytes().to_vec()],
                data: formatted.into_bytes(),
            });
        }
    }

    fn set_gas_tracing_from_log_level(&self) {
        let enabled = log::log_enabled!(target: GAS_TRACE_TARGET, log::Level::Trace);
        self.metering.borrow_mut().set_gas_tracing(enabled);
    }

    fn flush_gas_trace(&self, function: &str) {
        if !log::log_enabled!(target: GAS_TRACE_TARGET, log::Level::Trace) {
            return;
        }
        let metering = self.metering.borrow();
        for (sc_address, apis) in metering.gas_trace() {
            let mut total_for_sc = 0u64;
            for (api_name, charges) in apis {
                let total: u64 = charges.iter().fold(0u64, |acc, gas| math::add_u64(acc, *gas));
                total_for_sc = math::add_u64(total_for_sc, total);
                log::trace!(
                    target: GAS_TRACE_TARGET,
                    "sc {} function {} api {} total {} calls {}",
                    sc_address,
                    function,
                    api_name,
                    total,
                    charges.len()
                );
            }
            log::trace!(
                target: GAS_TRACE_TARGET,
                "sc {} function {} total gas used by apis {}",
                sc_address,
                function,
                total_for_sc
            );
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
