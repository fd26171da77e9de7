//! Skein executor boundary
//!
//! The engine never compiles or runs WASM itself; it drives an abstract
//! executor through the traits in this crate. A production deployment binds
//! a real WASM engine behind [`Executor`]; the [`scripted`] module provides
//! an in-process executor whose contracts are Rust closures, used by the
//! test suites to exercise the host without compiled bytecode.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        skein-host (VM host)             │
//! │   RuntimeContext owns Box<dyn Executor> │
//! └───────────────┬─────────────────────────┘
//!                 │ new_instance / call / mem ops
//!                 ▼
//! ┌─────────────────────────────────────────┐
//! │     skein-executor (this crate)         │
//! │   Executor / Instance / VMHooks traits  │
//! │   breakpoint register, opcode costs     │
//! └───────────────┬─────────────────────────┘
//!                 │ host functions ("env" imports)
//!                 ▼
//! ┌─────────────────────────────────────────┐
//! │     skein-hooks (VM-API bridge)         │
//! │   implements VMHooks over the host      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Failures never unwind across the guest boundary. Host functions report
//! trouble by writing the [`BreakpointValue`] register; the executor polls
//! it between basic blocks and returns control to the host, which then
//! interprets the breakpoint.

#![warn(missing_docs)]
#![deny(clippy::arithmetic_side_effects)]

pub mod breakpoint;
pub mod error;
pub mod opcodes;
pub mod scripted;
pub mod traits;
pub mod vm_hooks;

pub use breakpoint::{BreakpointValue, RuntimeBreakpoints};
pub use error::ExecutorError;
pub use opcodes::OpcodeCosts;
pub use scripted::{ScriptedContract, ScriptedCtx, ScriptedExecutorFactory};
pub use traits::{CompilationOptions, Executor, ExecutorFactory, ExecutorFactoryArgs, Instance};
pub use vm_hooks::VMHooks;
