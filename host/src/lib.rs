//! Skein VM host
//!
//! The host-side core of the Skein smart-contract engine: given a call or
//! deployment input, it loads the contract through an abstract executor,
//! exposes the VM-API to it, executes the named export under a strict gas
//! budget and produces a deterministic `VMOutput`.
//!
//! Seven contexts compose the host, each owning one concern:
//!
//! | Context | Concern |
//! |---|---|
//! | `RuntimeContext` | instance binding, instance stack, breakpoints |
//! | `MeteringContext` | gas budgets, schedule, tracing |
//! | `OutputContext` | the `VMOutput` under construction |
//! | `StorageContext` | key-protected per-account storage |
//! | `BlockchainContext` | chain access with snapshots |
//! | `ManagedTypesContext` | handle heaps for bignums and buffers |
//! | `AsyncContext` | the async call state machine |
//!
//! Nested synchronous calls push every context, merge on success and
//! discard on failure; this replaces unwinding as the control-flow
//! mechanism across the guest boundary.

pub mod contexts;
pub mod error;
pub mod gas;
pub mod state_stack;
pub mod vmhost;

pub use contexts::{
    AsyncCall, AsyncCallGroup, AsyncCallStatus, AsyncContext, BlockchainContext, CodeDeployInput,
    ManagedTypesContext, MeteringContext, OutputContext, RuntimeContext, StorageContext,
    StorageGas, StorageStatus,
};
pub use error::{HostError, HostResult};
pub use gas::{ApiCost, AsyncCost, BaseOperationCost, GasSchedule};
pub use state_stack::StateStack;
pub use vmhost::{VMHost, VMHostParameters, MIN_EXECUTION_TIMEOUT, VM_VERSION};
