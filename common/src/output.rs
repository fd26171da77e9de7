//! Execution results: the `VMOutput` family.

use num_bigint::{BigInt, BigUint};
use std::collections::BTreeMap;
use std::fmt;

use crate::address::Address;
use crate::input::CallType;

/// Outcome classification of a contract execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnCode {
    /// Execution completed successfully.
    #[default]
    Ok,
    /// The named function is not exported by the contract.
    FunctionNotFound,
    /// The function exists but its signature is not callable.
    FunctionWrongSignature,
    /// The contract signalled an error, or broke a host rule.
    UserError,
    /// The gas budget was exhausted.
    OutOfGas,
    /// Deployment would overwrite an existing account.
    AccountCollision,
    /// The sender cannot cover the transferred value.
    OutOfFunds,
    /// The synchronous call stack exceeded its bound.
    CallStackOverFlow,
    /// The bytecode failed validation or instantiation.
    ContractInvalid,
    /// The execution failed inside the engine or executor.
    ExecutionFailed,
    /// A contract upgrade failed.
    UpgradeFailed,
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReturnCode::Ok => "ok",
            ReturnCode::FunctionNotFound => "function not found",
            ReturnCode::FunctionWrongSignature => "wrong signature for function",
            ReturnCode::UserError => "user error",
            ReturnCode::OutOfGas => "out of gas",
            ReturnCode::AccountCollision => "account collision",
            ReturnCode::OutOfFunds => "out of funds",
            ReturnCode::CallStackOverFlow => "call stack overflow",
            ReturnCode::ContractInvalid => "contract invalid",
            ReturnCode::ExecutionFailed => "execution failed",
            ReturnCode::UpgradeFailed => "upgrade failed",
        };
        write!(f, "{}", text)
    }
}

impl ReturnCode {
    /// Canonical byte encoding used on the cross-shard callback wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let value: u64 = match self {
            ReturnCode::Ok => 0,
            ReturnCode::FunctionNotFound => 1,
            ReturnCode::FunctionWrongSignature => 2,
            ReturnCode::UserError => 4,
            ReturnCode::OutOfGas => 5,
            ReturnCode::AccountCollision => 6,
            ReturnCode::OutOfFunds => 7,
            ReturnCode::CallStackOverFlow => 8,
            ReturnCode::ContractInvalid => 9,
            ReturnCode::ExecutionFailed => 10,
            ReturnCode::UpgradeFailed => 11,
        };
        if value == 0 {
            vec![]
        } else {
            vec![value as u8]
        }
    }
}

/// One storage slot modified during execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageUpdate {
    /// The new value of the slot; empty means deleted.
    pub data: Vec<u8>,
    /// True if the slot was actually written (as opposed to read-tracked).
    pub written: bool,
}

/// An outgoing transfer staged by the execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputTransfer {
    /// Native value carried by the transfer.
    pub value: BigUint,
    /// Gas forwarded to the receiving side.
    pub gas_limit: u64,
    /// Gas reserved for an eventual callback.
    pub gas_locked: u64,
    /// Async correlation prefix, when the transfer is an async leg.
    pub async_data: Vec<u8>,
    /// Call data (`func@hexarg@…`) or raw payload.
    pub data: Vec<u8>,
    /// The call type the receiving side will observe.
    pub call_type: CallType,
    /// The account that staged the transfer.
    pub sender_address: Address,
}

/// Per-account accumulated effects of an execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputAccount {
    /// The account address.
    pub address: Address,
    /// Account nonce after execution, if touched.
    pub nonce: u64,
    /// Net balance change; the sum over all accounts must be zero.
    pub balance_delta: BigInt,
    /// Storage slots written, keyed by raw storage key.
    pub storage_updates: BTreeMap<Vec<u8>, StorageUpdate>,
    /// New contract code, when deployed or upgraded.
    pub code: Option<Vec<u8>>,
    /// Metadata accompanying new code.
    pub code_metadata: Option<Vec<u8>>,
    /// The account that deployed the code.
    pub code_deployer_address: Option<Address>,
    /// Transfers leaving this account.
    pub output_transfers: Vec<OutputTransfer>,
    /// Gas attributed to this account's execution.
    pub gas_used: u64,
}

impl OutputAccount {
    /// Creates an empty account entry for `address`.
    pub fn new(address: Address) -> Self {
        OutputAccount {
            address,
            ..OutputAccount::default()
        }
    }

    /// Returns the count of bytes stored across all storage updates.
    pub fn stored_bytes(&self) -> usize {
        self.storage_updates
            .iter()
            .map(|(k, v)| k.len().saturating_add(v.data.len()))
            .sum()
    }
}

/// A log entry emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogEntry {
    /// Event identifier (first topic in some encodings).
    pub identifier: Vec<u8>,
    /// The emitting account.
    pub address: Address,
    /// Indexed topics.
    pub topics: Vec<Vec<u8>>,
    /// Non-indexed payload.
    pub data: Vec<u8>,
}

/// The complete, deterministic result of one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VMOutput {
    /// Outcome classification.
    pub return_code: ReturnCode,
    /// Human-readable message accompanying a non-Ok code.
    pub return_message: String,
    /// Gas left unspent, returned to the caller.
    pub gas_remaining: u64,
    /// Gas refunded by storage releases.
    pub gas_refund: BigUint,
    /// Data returned by the contract, in `finish` order.
    pub return_data: Vec<Vec<u8>>,
    /// Accounts touched by the execution, keyed by address.
    pub output_accounts: BTreeMap<Address, OutputAccount>,
    /// Accounts scheduled for deletion.
    pub deleted_accounts: Vec<Address>,
    /// Accounts read but not modified.
    pub touched_accounts: Vec<Address>,
    /// Log entries in emission order.
    pub logs: Vec<LogEntry>,
}

impl VMOutput {
    /// A `VMOutput` carrying only a failure code and message; all effects
    /// of the failing frame are discarded.
    pub fn from_failure(return_code: ReturnCode, message: &str) -> Self {
        VMOutput {
            return_code,
            return_message: message.to_string(),
            ..VMOutput::default()
        }
    }

    /// Fetches or creates the output entry for `address`.
    pub fn account_mut(&mut self, address: Address) -> &mut OutputAccount {
        self.output_accounts
            .entry(address)
            .or_insert_with(|| OutputAccount::new(address))
    }

    /// Sum of balance deltas over all output accounts.
    ///
    /// Zero for every successful execution: transfers only move value
    /// between accounts already charged for it.
    pub fn total_balance_delta(&self) -> BigInt {
        self.output_accounts
            .values()
            .map(|acc| acc.balance_delta.clone())
            .sum()
    }

    /// All transfers staged across all accounts, in account order.
    pub fn all_transfers(&self) -> impl Iterator<Item = &OutputTransfer> {
        self.output_accounts
            .values()
            .flat_map(|acc| acc.output_transfers.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_failure_discards_effects() {
        let out = VMOutput::from_failure(ReturnCode::OutOfGas, "out of gas");
        assert_eq!(out.return_code, ReturnCode::OutOfGas);
        assert_eq!(out.return_message, "out of gas");
        assert!(out.output_accounts.is_empty());
        assert!(out.return_data.is_empty());
        assert_eq!(out.gas_remaining, 0);
    }

    #[test]
    fn test_balance_delta_sum() {
        let mut out = VMOutput::default();
        out.account_mut(Address([1u8; 32])).balance_delta = BigInt::from(-500);
        out.account_mut(Address([2u8; 32])).balance_delta = BigInt::from(500);
        assert_eq!(out.total_balance_delta(), BigInt::from(0));
    }

    #[test]
    fn test_return_code_bytes() {
        assert!(ReturnCode::Ok.to_bytes().is_empty());
        assert_eq!(ReturnCode::UserError.to_bytes(), vec![4]);
        assert_eq!(ReturnCode::ExecutionFailed.to_bytes(), vec![10]);
    }

    #[test]
    fn test_account_mut_reuses_entry() {
        let mut out = VMOutput::default();
        out.account_mut(Address([1u8; 32])).nonce = 7;
        assert_eq!(out.account_mut(Address([1u8; 32])).nonce, 7);
        assert_eq!(out.output_accounts.len(), 1);
    }
}
