//! Call and deployment inputs.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::tokens::EsdtTransfer;

/// How a call entered the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CallType {
    /// An ordinary transaction-level or synchronous nested call.
    #[default]
    DirectCall,
    /// The forward leg of an asynchronous call.
    AsynchronousCall,
    /// The callback leg of an asynchronous call, executed on the caller.
    AsynchronousCallBack,
    /// Execution on the destination initiated on behalf of the caller.
    ExecOnDestByCaller,
    /// A token transfer carrying an embedded contract call.
    EsdtTransferAndExecute,
}

/// Correlation identifiers attached to async-call legs.
///
/// Carried on the wire as a prefix of the transfer data so the callback
/// shard can associate the response with the persisted async record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AsyncArguments {
    /// Call ID assigned to the new (child) call.
    pub new_call_id: Vec<u8>,
    /// Call ID of the caller's own frame.
    pub caller_call_id: Vec<u8>,
    /// On callback legs: call ID of the context that registered the async
    /// call, keying its persisted record.
    pub callback_async_initiator_call_id: Vec<u8>,
    /// On callback legs: gas returned by resolved children so far.
    pub gas_accumulated: u64,
}

/// Fields common to calls and deployments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VMInput {
    /// The account that signed or initiated this call.
    pub caller_addr: Address,
    /// Native value transferred with the call.
    pub call_value: BigUint,
    /// How the call entered the engine.
    pub call_type: CallType,
    /// Raw arguments for the called function.
    pub arguments: Vec<Vec<u8>>,
    /// Token transfers accompanying the call.
    pub esdt_transfers: Vec<EsdtTransfer>,
    /// Gas price set by the transaction.
    pub gas_price: u64,
    /// Gas available for this call.
    pub gas_provided: u64,
    /// Gas reserved for the async callback; the callee cannot spend it.
    pub gas_locked: u64,
    /// True when a callback must run even after the child erred.
    pub return_call_after_error: bool,
    /// Hash of the original user transaction.
    pub original_tx_hash: Vec<u8>,
    /// Hash of the current (possibly intermediate) transaction.
    pub current_tx_hash: Vec<u8>,
    /// Hash of the previous transaction in an async chain.
    pub prev_tx_hash: Vec<u8>,
    /// Async correlation identifiers, present on async legs.
    pub async_arguments: Option<AsyncArguments>,
}

/// Input for executing a function of an existing contract.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallInput {
    /// Shared transaction fields.
    pub vm_input: VMInput,
    /// The contract account to execute.
    pub recipient_addr: Address,
    /// Name of the exported function to invoke.
    pub function: String,
    /// Permits invoking `init`; set only by deploy/upgrade paths.
    pub allow_init_function: bool,
}

/// Input for deploying a new contract.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateInput {
    /// Shared transaction fields.
    pub vm_input: VMInput,
    /// The WASM bytecode to install.
    pub contract_code: Vec<u8>,
    /// Two-byte code metadata (see [`crate::CodeMetadata`]).
    pub contract_code_metadata: Vec<u8>,
}

impl CallInput {
    /// Starts a builder for a direct call, the common test entry point.
    pub fn direct(caller: Address, recipient: Address, function: &str) -> Self {
        CallInput {
            vm_input: VMInput {
                caller_addr: caller,
                ..VMInput::default()
            },
            recipient_addr: recipient,
            function: function.to_string(),
            allow_init_function: false,
        }
    }

    /// Sets the gas provided for this call.
    pub fn with_gas_provided(mut self, gas: u64) -> Self {
        self.vm_input.gas_provided = gas;
        self
    }

    /// Sets the native value transferred with the call.
    pub fn with_call_value(mut self, value: BigUint) -> Self {
        self.vm_input.call_value = value;
        self
    }

    /// Sets the raw function arguments.
    pub fn with_arguments(mut self, arguments: Vec<Vec<u8>>) -> Self {
        self.vm_input.arguments = arguments;
        self
    }

    /// Sets the call type.
    pub fn with_call_type(mut self, call_type: CallType) -> Self {
        self.vm_input.call_type = call_type;
        self
    }
}

impl CreateInput {
    /// Starts a builder for a deployment.
    pub fn new(caller: Address, code: Vec<u8>) -> Self {
        CreateInput {
            vm_input: VMInput {
                caller_addr: caller,
                ..VMInput::default()
            },
            contract_code: code,
            contract_code_metadata: vec![0, 0],
        }
    }

    /// Sets the gas provided for the deployment.
    pub fn with_gas_provided(mut self, gas: u64) -> Self {
        self.vm_input.gas_provided = gas;
        self
    }

    /// Sets the code metadata bytes.
    pub fn with_code_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.contract_code_metadata = metadata;
        self
    }

    /// Sets deploy arguments, passed to the contract's `init`.
    pub fn with_arguments(mut self, arguments: Vec<Vec<u8>>) -> Self {
        self.vm_input.arguments = arguments;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_input_builder() {
        let caller = Address([1u8; 32]);
        let dest = Address([2u8; 32]);
        let input = CallInput::direct(caller, dest, "doWork")
            .with_gas_provided(50_000)
            .with_arguments(vec![vec![1], vec![2, 3]]);

        assert_eq!(input.function, "doWork");
        assert_eq!(input.vm_input.caller_addr, caller);
        assert_eq!(input.recipient_addr, dest);
        assert_eq!(input.vm_input.gas_provided, 50_000);
        assert_eq!(input.vm_input.arguments.len(), 2);
        assert_eq!(input.vm_input.call_type, CallType::DirectCall);
        assert!(!input.allow_init_function);
    }

    #[test]
    fn test_create_input_defaults() {
        let input = CreateInput::new(Address([1u8; 32]), vec![0x00, 0x61, 0x73, 0x6d]);
        assert_eq!(input.contract_code_metadata, vec![0, 0]);
        assert_eq!(input.vm_input.gas_provided, 0);
    }
}
