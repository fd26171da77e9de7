//! Skein VM
//!
//! The public entry point of the engine: wires a blockchain hook, the VM
//! host, the VM-API bridge and an executor into one ready [`VMHost`].
//!
//! Wiring is two-phase because the bridge needs a handle on the host
//! before the executor can be built:
//!
//! ```text
//! host ──▶ VMHooksDispatcher(host) ──▶ executor factory ──▶ host.set_executor
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::rc::Rc;
//! use skein_executor::ScriptedExecutorFactory;
//! use skein_host::VMHostParameters;
//! use skein_vm::testing::{InMemoryBlockchain, PlainCrypto};
//!
//! let chain = Rc::new(InMemoryBlockchain::new());
//! let executors = ScriptedExecutorFactory::new();
//! let host = skein_vm::wire_host(
//!     chain,
//!     Rc::new(PlainCrypto),
//!     VMHostParameters::default(),
//!     &*executors,
//! )
//! .expect("wiring failed");
//! ```

pub mod testing;

use std::rc::Rc;

use skein_executor::{ExecutorFactory, ExecutorFactoryArgs, OpcodeCosts};
use skein_hooks::VMHooksDispatcher;
use skein_host::{HostError, HostResult, VMHost, VMHostParameters};
use skein_vm_common::{BlockchainHook, CryptoHook};

pub use skein_executor::{ScriptedContract, ScriptedCtx, ScriptedExecutorFactory};
pub use skein_host::{GasSchedule, VM_VERSION};
pub use skein_vm_common::{
    Address, CallInput, CallType, CreateInput, ReturnCode, VMInput, VMOutput,
};

/// Builds a fully wired host over the given hooks and executor factory.
pub fn wire_host(
    blockchain_hook: Rc<dyn BlockchainHook>,
    crypto: Rc<dyn CryptoHook>,
    parameters: VMHostParameters,
    executor_factory: &dyn ExecutorFactory,
) -> HostResult<Rc<VMHost>> {
    let host = VMHost::new(blockchain_hook, crypto, parameters);

    let vm_hooks = Rc::new(VMHooksDispatcher::new(Rc::clone(&host)));
    let executor = executor_factory
        .create_executor(ExecutorFactoryArgs {
            vm_hooks,
            opcode_costs: OpcodeCosts::default(),
            breakpoints: host.breakpoints(),
            sigsegv_passthrough: host.sigsegv_passthrough(),
        })
        .map_err(HostError::Executor)?;
    host.set_executor(executor);

    log::debug!("host wired, version {}", host.version());
    Ok(host)
}
