//! The execution contexts composing the VM host.
//!
//! Each context owns one concern and implements the stacked-state
//! lifecycle of [`crate::state_stack::StateStack`]; nested synchronous
//! calls push all of them, merge on success, discard on failure.

pub mod async_call;
pub mod async_ctx;
pub mod blockchain;
pub mod managed_types;
pub mod metering;
pub mod output;
pub mod runtime;
pub mod storage;

pub use async_call::{AsyncCall, AsyncCallGroup, AsyncCallStatus, LEGACY_GROUP_ID};
pub use async_ctx::{AsyncContext, AsyncContextState};
pub use blockchain::BlockchainContext;
pub use managed_types::{Handle, ManagedTypesContext};
pub use metering::MeteringContext;
pub use output::{CodeDeployInput, OutputContext};
pub use runtime::RuntimeContext;
pub use storage::{StorageContext, StorageGas, StorageStatus};
