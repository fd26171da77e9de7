//! The executor and instance traits.

use std::rc::Rc;
use std::sync::Arc;

use crate::breakpoint::{BreakpointValue, RuntimeBreakpoints};
use crate::error::ExecutorError;
use crate::opcodes::OpcodeCosts;
use crate::vm_hooks::VMHooks;

/// Options for compiling and instantiating one module.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompilationOptions {
    /// Gas available for opcode metering inside the instance.
    pub gas_limit: u64,
    /// True when instantiating for deployment; imports must all resolve
    /// within the known API set or instantiation fails.
    pub for_deployment: bool,
}

/// Arguments for building an executor, fixed per host.
pub struct ExecutorFactoryArgs {
    /// The VM-API bridge guest imports are routed to.
    pub vm_hooks: Rc<dyn VMHooks>,
    /// Initial opcode cost table.
    pub opcode_costs: OpcodeCosts,
    /// The host's breakpoint register, polled between basic blocks.
    pub breakpoints: Arc<RuntimeBreakpoints>,
    /// Let fatal signals inside guest execution propagate instead of
    /// converting them to traps. Test harnesses enable this to prove the
    /// host's panic isolation.
    pub sigsegv_passthrough: bool,
}

/// Builds executors. One factory serves one host for its whole lifetime.
pub trait ExecutorFactory {
    /// Creates an executor wired to the given hooks and breakpoints.
    fn create_executor(&self, args: ExecutorFactoryArgs) -> Result<Box<dyn Executor>, ExecutorError>;
}

/// A compiled-code engine capable of instantiating modules.
pub trait Executor {
    /// Swaps the opcode cost table; affects instances created afterwards.
    fn set_opcode_costs(&self, costs: &OpcodeCosts);

    /// Compiles (or fetches from cache) and instantiates `code`.
    fn new_instance(
        &self,
        code: &[u8],
        options: &CompilationOptions,
    ) -> Result<Box<dyn Instance>, ExecutorError>;

    /// Drops all cached compilation artifacts.
    fn clear_compiled_cache(&self);
}

/// One memory-holding realization of a module, bound to a single call.
///
/// Methods take `&self`: instances carry interior mutability so the host
/// can keep one on the instance stack while a nested call runs another.
pub trait Instance: std::fmt::Debug {
    /// Invokes an exported function. Returns an error if the export is
    /// missing, the guest trapped, or the breakpoint register stopped
    /// execution.
    fn call_function(&self, name: &str) -> Result<(), ExecutorError>;

    /// True if the module exports `name` as a callable function.
    fn has_function(&self, name: &str) -> bool;

    /// Names of all callable exports.
    fn exported_function_names(&self) -> Vec<String>;

    /// Checks that every import of the module is part of the known API
    /// set. Deployment paths call this before running `init`.
    fn verify_imports(&self) -> Result<(), ExecutorError>;

    /// Reads `length` bytes of linear memory at `offset`.
    fn mem_load(&self, offset: u32, length: u32) -> Result<Vec<u8>, ExecutorError>;

    /// Writes `data` into linear memory at `offset`.
    fn mem_store(&self, offset: u32, data: &[u8]) -> Result<(), ExecutorError>;

    /// Gas points consumed by opcode metering so far.
    fn get_points_used(&self) -> u64;

    /// Overwrites the consumed-points counter; the metering context uses
    /// this to charge host-API costs into the same budget.
    fn set_points_used(&self, points: u64);

    /// Resets the metering budget for this instance.
    fn set_gas_limit(&self, limit: u64);

    /// Reads the breakpoint register.
    fn get_breakpoint_value(&self) -> BreakpointValue;

    /// Writes the breakpoint register.
    fn set_breakpoint_value(&self, value: BreakpointValue);

    /// Discards per-call state so the instance can be cached and reused.
    fn reset(&self);

    /// Identifier for logging and instance-stack assertions.
    fn id(&self) -> u64;
}
