//! An executor whose contracts are Rust closures.
//!
//! Host-engine tests need to drive full calls without compiling WASM. The
//! scripted executor keeps a registry mapping "bytecode" (arbitrary byte
//! strings) to [`ScriptedContract`]s whose exports are closures. Each
//! closure receives a [`ScriptedCtx`] giving it a fake linear memory and
//! the same [`VMHooks`] surface a real guest would import, so the host
//! observes an indistinguishable call pattern: memory-offset arguments,
//! breakpoint-mediated failures, gas points on the instance.
//!
//! Closures emulate the executor's basic-block breakpoint poll by checking
//! [`ScriptedCtx::interrupted`] between hook calls; `call_function` performs
//! a final poll when the closure returns.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use crate::breakpoint::{BreakpointValue, RuntimeBreakpoints};
use crate::error::ExecutorError;
use crate::opcodes::OpcodeCosts;
use crate::traits::{
    CompilationOptions, Executor, ExecutorFactory, ExecutorFactoryArgs, Instance,
};
use crate::vm_hooks::VMHooks;

/// Default linear memory size of a scripted instance.
pub const DEFAULT_MEMORY_SIZE: usize = 65_536;

/// A contract export implemented as a closure.
pub type ScriptedExport = Rc<dyn Fn(&ScriptedCtx)>;

/// A "compiled module" of the scripted executor.
#[derive(Clone)]
pub struct ScriptedContract {
    exports: BTreeMap<String, ScriptedExport>,
    memory_size: usize,
    unknown_imports: Vec<String>,
}

impl Default for ScriptedContract {
    fn default() -> Self {
        ScriptedContract::new()
    }
}

impl ScriptedContract {
    /// Creates a contract with no exports and the default memory size.
    pub fn new() -> Self {
        ScriptedContract {
            exports: BTreeMap::new(),
            memory_size: DEFAULT_MEMORY_SIZE,
            unknown_imports: Vec::new(),
        }
    }

    /// Adds an exported function.
    pub fn with_export(mut self, name: &str, f: impl Fn(&ScriptedCtx) + 'static) -> Self {
        self.exports.insert(name.to_string(), Rc::new(f));
        self
    }

    /// Overrides the instance memory size.
    pub fn with_memory_size(mut self, size: usize) -> Self {
        self.memory_size = size;
        self
    }

    /// Declares an import outside the known API set, making the module
    /// fail deployment verification.
    pub fn with_unknown_import(mut self, name: &str) -> Self {
        self.unknown_imports.push(name.to_string());
        self
    }
}

/// Execution context handed to scripted exports.
pub struct ScriptedCtx {
    memory: Rc<RefCell<Vec<u8>>>,
    hooks: Rc<dyn VMHooks>,
    breakpoints: Arc<RuntimeBreakpoints>,
    points: Rc<Cell<u64>>,
    gas_limit: Rc<Cell<u64>>,
    pending_trap: Rc<RefCell<Option<String>>>,
}

impl ScriptedCtx {
    /// The VM-API surface, exactly as a real guest imports it.
    pub fn hooks(&self) -> &dyn VMHooks {
        &*self.hooks
    }

    /// Writes bytes into the fake linear memory, growing it if needed.
    /// Stands in for the data segments a compiled module would carry.
    pub fn write_mem(&self, offset: u32, data: &[u8]) {
        let mut memory = self.memory.borrow_mut();
        let end = (offset as usize).saturating_add(data.len());
        if end > memory.len() {
            memory.resize(end, 0);
        }
        memory[offset as usize..end].copy_from_slice(data);
    }

    /// Reads bytes from the fake linear memory; out-of-bounds reads come
    /// back zero-filled, as from a fresh page.
    pub fn read_mem(&self, offset: u32, length: u32) -> Vec<u8> {
        let memory = self.memory.borrow();
        let mut out = vec![0u8; length as usize];
        let start = (offset as usize).min(memory.len());
        let end = (offset as usize)
            .saturating_add(length as usize)
            .min(memory.len());
        let copied = end.saturating_sub(start);
        out[..copied].copy_from_slice(&memory[start..end]);
        out
    }

    /// True once the breakpoint register requests a stop. Closures check
    /// this between hook calls, mirroring the basic-block poll of a real
    /// executor.
    pub fn interrupted(&self) -> bool {
        self.breakpoints.is_set()
    }

    /// Consumes opcode-level gas points; raises the OutOfGas breakpoint
    /// when the instance budget is exceeded.
    pub fn burn_gas(&self, amount: u64) {
        let used = self.points.get().saturating_add(amount);
        self.points.set(used);
        if used > self.gas_limit.get() {
            self.breakpoints.set(BreakpointValue::OutOfGas);
        }
    }

    /// Records a guest trap; `call_function` surfaces it after the closure
    /// returns.
    pub fn trap(&self, message: &str) {
        *self.pending_trap.borrow_mut() = Some(message.to_string());
    }

    /// Spins until the breakpoint register requests a stop. Used by
    /// timeout tests to model a long-running basic-block loop.
    pub fn spin_until_interrupted(&self) {
        while !self.interrupted() {
            std::thread::yield_now();
        }
    }
}

struct ScriptedInstance {
    contract: Rc<ScriptedContract>,
    memory: Rc<RefCell<Vec<u8>>>,
    points: Rc<Cell<u64>>,
    gas_limit: Rc<Cell<u64>>,
    pending_trap: Rc<RefCell<Option<String>>>,
    hooks: Rc<dyn VMHooks>,
    breakpoints: Arc<RuntimeBreakpoints>,
    sigsegv_passthrough: bool,
    id: u64,
}

impl std::fmt::Debug for ScriptedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedInstance").field("id", &self.id).finish()
    }
}

impl Instance for ScriptedInstance {
    fn call_function(&self, name: &str) -> Result<(), ExecutorError> {
        let export = self
            .contract
            .exports
            .get(name)
            .ok_or_else(|| ExecutorError::FunctionNotFound(name.to_string()))?
            .clone();

        let ctx = ScriptedCtx {
            memory: Rc::clone(&self.memory),
            hooks: Rc::clone(&self.hooks),
            breakpoints: Arc::clone(&self.breakpoints),
            points: Rc::clone(&self.points),
            gas_limit: Rc::clone(&self.gas_limit),
            pending_trap: Rc::clone(&self.pending_trap),
        };

        if self.sigsegv_passthrough {
            export(&ctx);
        } else {
            // A silent engine converts fatal guest faults into traps.
            let outcome = catch_unwind(AssertUnwindSafe(|| export(&ctx)));
            if outcome.is_err() {
                return Err(ExecutorError::Trap("runtime fault".to_string()));
            }
        }

        if let Some(message) = self.pending_trap.borrow_mut().take() {
            return Err(ExecutorError::Trap(message));
        }

        match self.breakpoints.get() {
            BreakpointValue::None => Ok(()),
            value => Err(ExecutorError::Breakpoint(value)),
        }
    }

    fn has_function(&self, name: &str) -> bool {
        self.contract.exports.contains_key(name)
    }

    fn exported_function_names(&self) -> Vec<String> {
        self.contract.exports.keys().cloned().collect()
    }

    fn verify_imports(&self) -> Result<(), ExecutorError> {
        match self.contract.unknown_imports.first() {
            Some(name) => Err(ExecutorError::UnknownImport(name.clone())),
            None => Ok(()),
        }
    }

    fn mem_load(&self, offset: u32, length: u32) -> Result<Vec<u8>, ExecutorError> {
        let memory = self.memory.borrow();
        let end = (offset as usize).saturating_add(length as usize);
        if end > memory.len() {
            return Err(ExecutorError::BadBounds);
        }
        Ok(memory[offset as usize..end].to_vec())
    }

    fn mem_store(&self, offset: u32, data: &[u8]) -> Result<(), ExecutorError> {
        let mut memory = self.memory.borrow_mut();
        let end = (offset as usize).saturating_add(data.len());
        if end > memory.len() {
            return Err(ExecutorError::BadBounds);
        }
        memory[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn get_points_used(&self) -> u64 {
        self.points.get()
    }

    fn set_points_used(&self, points: u64) {
        self.points.set(points);
    }

    fn set_gas_limit(&self, limit: u64) {
        self.gas_limit.set(limit);
    }

    fn get_breakpoint_value(&self) -> BreakpointValue {
        self.breakpoints.get()
    }

    fn set_breakpoint_value(&self, value: BreakpointValue) {
        self.breakpoints.set(value);
    }

    fn reset(&self) {
        self.points.set(0);
        self.pending_trap.borrow_mut().take();
        let size = self.contract.memory_size;
        let mut memory = self.memory.borrow_mut();
        memory.clear();
        memory.resize(size, 0);
    }

    fn id(&self) -> u64 {
        self.id
    }
}

type ContractRegistry = Rc<RefCell<BTreeMap<Vec<u8>, Rc<ScriptedContract>>>>;

/// Factory for scripted executors; also the contract registry handle kept
/// by tests.
#[derive(Default)]
pub struct ScriptedExecutorFactory {
    contracts: ContractRegistry,
}

impl ScriptedExecutorFactory {
    /// Creates an empty factory.
    pub fn new() -> Rc<Self> {
        Rc::new(ScriptedExecutorFactory::default())
    }

    /// Registers `contract` under the given bytecode bytes. Instances are
    /// later resolved by exact code match.
    pub fn register_contract(&self, code: &[u8], contract: ScriptedContract) {
        self.contracts
            .borrow_mut()
            .insert(code.to_vec(), Rc::new(contract));
    }
}

impl ExecutorFactory for ScriptedExecutorFactory {
    fn create_executor(
        &self,
        args: ExecutorFactoryArgs,
    ) -> Result<Box<dyn Executor>, ExecutorError> {
        Ok(Box::new(ScriptedExecutor {
            contracts: Rc::clone(&self.contracts),
            hooks: args.vm_hooks,
            breakpoints: args.breakpoints,
            sigsegv_passthrough: args.sigsegv_passthrough,
            next_id: Cell::new(0),
        }))
    }
}

struct ScriptedExecutor {
    contracts: ContractRegistry,
    hooks: Rc<dyn VMHooks>,
    breakpoints: Arc<RuntimeBreakpoints>,
    sigsegv_passthrough: bool,
    next_id: Cell<u64>,
}

impl Executor for ScriptedExecutor {
    fn set_opcode_costs(&self, _costs: &OpcodeCosts) {
        // Scripted contracts burn points explicitly; the table has no
        // effect here.
    }

    fn new_instance(
        &self,
        code: &[u8],
        options: &CompilationOptions,
    ) -> Result<Box<dyn Instance>, ExecutorError> {
        let contract = self
            .contracts
            .borrow()
            .get(code)
            .cloned()
            .ok_or_else(|| ExecutorError::CompilationFailed("unknown bytecode".to_string()))?;

        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));

        let instance = ScriptedInstance {
            memory: Rc::new(RefCell::new(vec![0u8; contract.memory_size])),
            points: Rc::new(Cell::new(0)),
            gas_limit: Rc::new(Cell::new(options.gas_limit)),
            pending_trap: Rc::new(RefCell::new(None)),
            contract,
            hooks: Rc::clone(&self.hooks),
            breakpoints: Arc::clone(&self.breakpoints),
            sigsegv_passthrough: self.sigsegv_passthrough,
            id,
        };
        if options.for_deployment {
            instance.verify_imports()?;
        }
        Ok(Box::new(instance))
    }

    fn clear_compiled_cache(&self) {
        log::trace!("scripted executor: compiled cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoHooks;

    #[allow(unused_variables)]
    impl VMHooks for NoHooks {
        fn get_gas_left(&self) -> i64 {
            0
        }
        fn get_sc_address(&self, result_offset: i32) {}
        fn get_owner_address(&self, result_offset: i32) {}
        fn get_caller(&self, result_offset: i32) {}
        fn get_call_value(&self, result_offset: i32) -> i32 {
            0
        }
        fn get_num_arguments(&self) -> i32 {
            0
        }
        fn get_argument_length(&self, id: i32) -> i32 {
            -1
        }
        fn get_argument(&self, id: i32, arg_offset: i32) -> i32 {
            -1
        }
        fn get_function(&self, function_offset: i32) -> i32 {
            0
        }
        fn get_shard_of_address(&self, address_offset: i32) -> i32 {
            0
        }
        fn is_smart_contract(&self, address_offset: i32) -> i32 {
            0
        }
        fn check_no_payment(&self) {}
        fn get_block_timestamp(&self) -> i64 {
            0
        }
        fn get_block_nonce(&self) -> i64 {
            0
        }
        fn get_block_round(&self) -> i64 {
            0
        }
        fn get_block_epoch(&self) -> i64 {
            0
        }
        fn get_block_random_seed(&self, pointer: i32) {}
        fn get_state_root_hash(&self, pointer: i32) {}
        fn get_prev_block_timestamp(&self) -> i64 {
            0
        }
        fn get_prev_block_nonce(&self) -> i64 {
            0
        }
        fn get_prev_block_round(&self) -> i64 {
            0
        }
        fn get_prev_block_epoch(&self) -> i64 {
            0
        }
        fn get_prev_block_random_seed(&self, pointer: i32) {}
        fn get_block_hash(&self, nonce: i64, result_offset: i32) -> i32 {
            -1
        }
        fn get_original_tx_hash(&self, result_offset: i32) {}
        fn storage_store(
            &self,
            key_offset: i32,
            key_length: i32,
            data_offset: i32,
            data_length: i32,
        ) -> i32 {
            -1
        }
        fn storage_load_length(&self, key_offset: i32, key_length: i32) -> i32 {
            0
        }
        fn storage_load(&self, key_offset: i32, key_length: i32, data_offset: i32) -> i32 {
            0
        }
        fn storage_load_from_address(
            &self,
            address_offset: i32,
            key_offset: i32,
            key_length: i32,
            data_offset: i32,
        ) -> i32 {
            0
        }
        fn set_storage_lock(&self, key_offset: i32, key_length: i32, lock_timestamp: i64) -> i32 {
            -1
        }
        fn get_storage_lock(&self, key_offset: i32, key_length: i32) -> i64 {
            0
        }
        fn is_storage_locked(&self, key_offset: i32, key_length: i32) -> i32 {
            0
        }
        fn clear_storage_lock(&self, key_offset: i32, key_length: i32) -> i32 {
            -1
        }
        fn get_external_balance(&self, address_offset: i32, result_offset: i32) {}
        fn get_esdt_balance(
            &self,
            address_offset: i32,
            token_id_offset: i32,
            token_id_len: i32,
            nonce: i64,
            result_offset: i32,
        ) -> i32 {
            -1
        }
        fn get_esdt_token_data(
            &self,
            address_offset: i32,
            token_id_offset: i32,
            token_id_len: i32,
            nonce: i64,
            value_offset: i32,
            attributes_offset: i32,
        ) -> i32 {
            -1
        }
        fn get_esdt_local_roles(&self, token_id_offset: i32, token_id_len: i32) -> i64 {
            0
        }
        fn validate_token_identifier(&self, token_id_offset: i32, token_id_len: i32) -> i32 {
            0
        }
        fn get_current_esdt_nft_nonce(
            &self,
            address_offset: i32,
            token_id_offset: i32,
            token_id_len: i32,
        ) -> i64 {
            0
        }
        fn get_num_esdt_transfers(&self) -> i32 {
            0
        }
        fn get_esdt_value_by_index(&self, result_offset: i32, index: i32) -> i32 {
            -1
        }
        fn get_esdt_token_name_by_index(&self, result_offset: i32, index: i32) -> i32 {
            -1
        }
        fn get_esdt_token_nonce_by_index(&self, index: i32) -> i64 {
            0
        }
        fn get_esdt_token_type_by_index(&self, index: i32) -> i32 {
            0
        }
        fn transfer_value(
            &self,
            dest_offset: i32,
            value_offset: i32,
            data_offset: i32,
            length: i32,
        ) -> i32 {
            -1
        }
        fn transfer_value_execute(
            &self,
            dest_offset: i32,
            value_offset: i32,
            gas_limit: i64,
            function_offset: i32,
            function_length: i32,
            num_arguments: i32,
            arguments_length_offset: i32,
            data_offset: i32,
        ) -> i32 {
            -1
        }
        fn transfer_esdt_execute(
            &self,
            dest_offset: i32,
            token_id_offset: i32,
            token_id_len: i32,
            value_offset: i32,
            gas_limit: i64,
            function_offset: i32,
            function_length: i32,
            num_arguments: i32,
            arguments_length_offset: i32,
            data_offset: i32,
        ) -> i32 {
            -1
        }
        fn transfer_esdt_nft_execute(
            &self,
            dest_offset: i32,
            token_id_offset: i32,
            token_id_len: i32,
            value_offset: i32,
            nonce: i64,
            gas_limit: i64,
            function_offset: i32,
            function_length: i32,
            num_arguments: i32,
            arguments_length_offset: i32,
            data_offset: i32,
        ) -> i32 {
            -1
        }
        fn multi_transfer_esdt_nft_execute(
            &self,
            dest_offset: i32,
            num_token_transfers: i32,
            token_transfers_length_offset: i32,
            token_transfers_offset: i32,
            gas_limit: i64,
            function_offset: i32,
            function_length: i32,
            num_arguments: i32,
            arguments_length_offset: i32,
            data_offset: i32,
        ) -> i32 {
            -1
        }
        fn execute_on_dest_context(
            &self,
            gas_limit: i64,
            dest_offset: i32,
            value_offset: i32,
            function_offset: i32,
            function_length: i32,
            num_arguments: i32,
            arguments_length_offset: i32,
            data_offset: i32,
        ) -> i32 {
            -1
        }
        fn execute_on_same_context(
            &self,
            gas_limit: i64,
            dest_offset: i32,
            value_offset: i32,
            function_offset: i32,
            function_length: i32,
            num_arguments: i32,
            arguments_length_offset: i32,
            data_offset: i32,
        ) -> i32 {
            -1
        }
        fn execute_read_only(
            &self,
            gas_limit: i64,
            dest_offset: i32,
            function_offset: i32,
            function_length: i32,
            num_arguments: i32,
            arguments_length_offset: i32,
            data_offset: i32,
        ) -> i32 {
            -1
        }
        fn create_contract(
            &self,
            gas_limit: i64,
            value_offset: i32,
            code_offset: i32,
            code_metadata_offset: i32,
            code_length: i32,
            result_offset: i32,
            num_arguments: i32,
            arguments_length_offset: i32,
            data_offset: i32,
        ) -> i32 {
            -1
        }
        fn deploy_from_source_contract(
            &self,
            gas_limit: i64,
            value_offset: i32,
            source_address_offset: i32,
            code_metadata_offset: i32,
            result_offset: i32,
            num_arguments: i32,
            arguments_length_offset: i32,
            data_offset: i32,
        ) -> i32 {
            -1
        }
        fn upgrade_contract(
            &self,
            dest_offset: i32,
            gas_limit: i64,
            value_offset: i32,
            code_offset: i32,
            code_metadata_offset: i32,
            code_length: i32,
            num_arguments: i32,
            arguments_length_offset: i32,
            data_offset: i32,
        ) {
        }
        fn upgrade_from_source_contract(
            &self,
            dest_offset: i32,
            gas_limit: i64,
            value_offset: i32,
            source_address_offset: i32,
            code_metadata_offset: i32,
            num_arguments: i32,
            arguments_length_offset: i32,
            data_offset: i32,
        ) {
        }
        fn delete_contract(
            &self,
            dest_offset: i32,
            gas_limit: i64,
            num_arguments: i32,
            arguments_length_offset: i32,
            data_offset: i32,
        ) {
        }
        fn create_async_call(
            &self,
            dest_offset: i32,
            value_offset: i32,
            data_offset: i32,
            data_length: i32,
            success_offset: i32,
            success_length: i32,
            error_offset: i32,
            error_length: i32,
            gas: i64,
            extra_gas_for_callback: i64,
        ) -> i32 {
            -1
        }
        fn set_async_context_callback(
            &self,
            callback_offset: i32,
            callback_length: i32,
            data_offset: i32,
            data_length: i32,
            gas: i64,
        ) -> i32 {
            -1
        }
        fn async_call(&self, dest_offset: i32, value_offset: i32, data_offset: i32, length: i32) {}
        fn finish(&self, pointer: i32, length: i32) {}
        fn write_log(&self, data_pointer: i32, data_length: i32, topic_ptr: i32, num_topics: i32) {}
        fn write_event_log(
            &self,
            num_topics: i32,
            topic_lengths_offset: i32,
            topic_offset: i32,
            data_offset: i32,
            data_length: i32,
        ) {
        }
        fn signal_error(&self, message_offset: i32, message_length: i32) {}
        fn get_num_return_data(&self) -> i32 {
            0
        }
        fn get_return_data_size(&self, result_id: i32) -> i32 {
            0
        }
        fn get_return_data(&self, result_id: i32, data_offset: i32) -> i32 {
            0
        }
        fn clean_return_data(&self) {}
        fn delete_from_return_data(&self, result_id: i32) {}
        fn mbuffer_new(&self) -> i32 {
            -1
        }
        fn mbuffer_new_from_bytes(&self, data_offset: i32, data_length: i32) -> i32 {
            -1
        }
        fn mbuffer_get_length(&self, handle: i32) -> i32 {
            -1
        }
        fn mbuffer_get_bytes(&self, handle: i32, result_offset: i32) -> i32 {
            -1
        }
        fn mbuffer_set_bytes(&self, handle: i32, data_offset: i32, data_length: i32) -> i32 {
            -1
        }
        fn mbuffer_append_bytes(&self, handle: i32, data_offset: i32, data_length: i32) -> i32 {
            -1
        }
        fn mbuffer_finish(&self, handle: i32) -> i32 {
            -1
        }
        fn mbuffer_get_argument(&self, arg_id: i32, handle: i32) -> i32 {
            -1
        }
        fn mbuffer_storage_store(&self, key_handle: i32, value_handle: i32) -> i32 {
            -1
        }
        fn mbuffer_storage_load(&self, key_handle: i32, dest_handle: i32) -> i32 {
            -1
        }
        fn big_int_new(&self, small_value: i64) -> i32 {
            -1
        }
        fn big_int_set_int64(&self, dest_handle: i32, value: i64) {}
        fn big_int_get_int64(&self, handle: i32) -> i64 {
            0
        }
        fn big_int_add(&self, dest_handle: i32, op1_handle: i32, op2_handle: i32) {}
        fn big_int_sub(&self, dest_handle: i32, op1_handle: i32, op2_handle: i32) {}
        fn big_int_mul(&self, dest_handle: i32, op1_handle: i32, op2_handle: i32) {}
        fn big_int_sign(&self, handle: i32) -> i32 {
            0
        }
        fn big_int_cmp(&self, op1_handle: i32, op2_handle: i32) -> i32 {
            0
        }
        fn big_int_to_buffer(&self, handle: i32, buffer_handle: i32) {}
        fn big_int_get_unsigned_argument(&self, arg_id: i32, handle: i32) {}
        fn big_int_get_call_value(&self, handle: i32) {}
        fn big_int_finish_unsigned(&self, handle: i32) {}
    }

    fn make_executor(passthrough: bool) -> (Rc<ScriptedExecutorFactory>, Box<dyn Executor>) {
        let factory = ScriptedExecutorFactory::new();
        let executor = factory
            .create_executor(ExecutorFactoryArgs {
                vm_hooks: Rc::new(NoHooks),
                opcode_costs: OpcodeCosts::default(),
                breakpoints: RuntimeBreakpoints::new(),
                sigsegv_passthrough: passthrough,
            })
            .unwrap();
        (factory, executor)
    }

    #[test]
    fn test_unknown_bytecode_fails_compilation() {
        let (_factory, executor) = make_executor(false);
        let err = executor
            .new_instance(b"nope", &CompilationOptions::default())
            .unwrap_err();
        assert!(matches!(err, ExecutorError::CompilationFailed(_)));
    }

    #[test]
    fn test_call_and_memory() {
        let (factory, executor) = make_executor(false);
        factory.register_contract(
            b"code",
            ScriptedContract::new().with_export("copy", |ctx| {
                ctx.write_mem(0, b"hello");
                let read = ctx.read_mem(0, 5);
                assert_eq!(read, b"hello");
            }),
        );

        let instance = executor
            .new_instance(b"code", &CompilationOptions::default())
            .unwrap();
        assert!(instance.has_function("copy"));
        assert!(!instance.has_function("absent"));
        instance.call_function("copy").unwrap();

        let err = instance.call_function("absent").unwrap_err();
        assert_eq!(err, ExecutorError::FunctionNotFound("absent".to_string()));
    }

    #[test]
    fn test_mem_bounds() {
        let (factory, executor) = make_executor(false);
        factory.register_contract(
            b"code",
            ScriptedContract::new().with_memory_size(16),
        );
        let instance = executor
            .new_instance(b"code", &CompilationOptions::default())
            .unwrap();

        assert!(instance.mem_store(0, &[1, 2, 3]).is_ok());
        assert_eq!(instance.mem_load(0, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(instance.mem_load(14, 3).unwrap_err(), ExecutorError::BadBounds);
        assert_eq!(
            instance.mem_store(15, &[1, 2]).unwrap_err(),
            ExecutorError::BadBounds
        );
    }

    #[test]
    fn test_gas_points_raise_out_of_gas() {
        let (factory, executor) = make_executor(false);
        factory.register_contract(
            b"code",
            ScriptedContract::new().with_export("burn", |ctx| {
                ctx.burn_gas(150);
            }),
        );
        let options = CompilationOptions {
            gas_limit: 100,
            for_deployment: false,
        };
        let instance = executor.new_instance(b"code", &options).unwrap();
        let err = instance.call_function("burn").unwrap_err();
        assert_eq!(err, ExecutorError::Breakpoint(BreakpointValue::OutOfGas));
        assert_eq!(instance.get_points_used(), 150);
    }

    #[test]
    fn test_panicking_export_becomes_trap_when_silent() {
        let (factory, executor) = make_executor(false);
        factory.register_contract(
            b"code",
            ScriptedContract::new().with_export("boom", |_ctx| panic!("guest fault")),
        );
        let instance = executor
            .new_instance(b"code", &CompilationOptions::default())
            .unwrap();
        let err = instance.call_function("boom").unwrap_err();
        assert!(matches!(err, ExecutorError::Trap(_)));
    }

    #[test]
    fn test_deployment_checks_imports() {
        let (factory, executor) = make_executor(false);
        factory.register_contract(
            b"code",
            ScriptedContract::new().with_unknown_import("mysteryImport"),
        );
        let options = CompilationOptions {
            gas_limit: 0,
            for_deployment: true,
        };
        let err = executor.new_instance(b"code", &options).unwrap_err();
        assert_eq!(err, ExecutorError::UnknownImport("mysteryImport".to_string()));

        let options = CompilationOptions {
            gas_limit: 0,
            for_deployment: false,
        };
        assert!(executor.new_instance(b"code", &options).is_ok());
    }
}
