//! Skein VM common types
//!
//! This crate holds the data model shared between the host engine, the
//! VM-API bridge and the executor boundary: addresses, call inputs, the
//! `VMOutput` family, token transfers, code metadata, the wire format used
//! for cross-shard call data, and the traits through which the engine talks
//! to the enclosing node (blockchain hook, crypto hook).
//!
//! Nothing in here executes contracts; the crate only defines what flows in
//! and out of an execution.

#![warn(missing_docs)]
#![deny(clippy::arithmetic_side_effects)]

pub mod address;
pub mod code_metadata;
pub mod hooks;
pub mod input;
pub mod math;
pub mod output;
pub mod tokens;
pub mod tx_data;

pub use address::Address;
pub use code_metadata::CodeMetadata;
pub use hooks::{Account, BlockInfo, BlockchainHook, CryptoHook, HookError, HookResult};
pub use input::{AsyncArguments, CallInput, CallType, CreateInput, VMInput};
pub use output::{
    LogEntry, OutputAccount, OutputTransfer, ReturnCode, StorageUpdate, VMOutput,
};
pub use tokens::{EsdtLocalRoles, EsdtTokenData, EsdtTokenType, EsdtTransfer};
pub use tx_data::{CallArgsParser, LengthPrefixedBuilder, TxDataBuilder, TxDataError};
