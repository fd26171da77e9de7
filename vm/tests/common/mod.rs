#![allow(dead_code)]

//! Shared fixture for the end-to-end suites: an in-memory chain, a
//! scripted executor registry and a wired host.

use std::rc::Rc;

use num_bigint::BigInt;
use skein_executor::ScriptedExecutorFactory;
use skein_host::{VMHost, VMHostParameters};
use skein_vm::testing::{InMemoryBlockchain, PlainCrypto};
use skein_vm_common::{math, Address, CallInput, VMOutput};

/// Gas given to every test call unless stated otherwise.
pub const GAS_PROVIDED: u64 = 100_000_000;

/// All fixture addresses live in this shard unless placed elsewhere.
pub const HOME_SHARD: u8 = 1;

pub struct TestHost {
    pub chain: Rc<InMemoryBlockchain>,
    pub executors: Rc<ScriptedExecutorFactory>,
    pub host: Rc<VMHost>,
}

pub fn test_host() -> TestHost {
    test_host_with(VMHostParameters::default())
}

pub fn test_host_with(parameters: VMHostParameters) -> TestHost {
    let chain = Rc::new(InMemoryBlockchain::new());
    let executors = ScriptedExecutorFactory::new();
    let host = skein_vm::wire_host(
        Rc::clone(&chain) as Rc<dyn skein_vm_common::BlockchainHook>,
        Rc::new(PlainCrypto),
        parameters,
        &*executors,
    )
    .expect("host wiring");
    TestHost {
        chain,
        executors,
        host,
    }
}

/// An address tagged with `tag`, placed in [`HOME_SHARD`].
pub fn addr(tag: u8) -> Address {
    addr_in_shard(tag, HOME_SHARD)
}

/// An address tagged with `tag` in an explicit shard.
pub fn addr_in_shard(tag: u8, shard: u8) -> Address {
    let mut bytes = [tag; 32];
    bytes[31] = shard;
    Address(bytes)
}

/// A direct call input with the standard gas budget and a fixed tx hash
/// (async call IDs are rooted in it).
pub fn call(caller: Address, dest: Address, function: &str) -> CallInput {
    let mut input = CallInput::direct(caller, dest, function).with_gas_provided(GAS_PROVIDED);
    input.vm_input.current_tx_hash = b"txhash-1".to_vec();
    input.vm_input.original_tx_hash = b"txhash-0".to_vec();
    input
}

/// Asserts the conservation invariant: balance deltas sum to zero.
pub fn assert_balance_conservation(output: &VMOutput) {
    assert_eq!(
        output.total_balance_delta(),
        BigInt::from(0),
        "balance deltas must sum to zero"
    );
}

/// Asserts the gas invariant:
/// `gasProvided >= gasUsed + sum(transfers.gas) + gasRemaining`.
pub fn assert_gas_invariant(gas_provided: u64, output: &VMOutput) {
    let forwarded = output.all_transfers().fold(0u64, |acc, transfer| {
        math::add_u64(acc, math::add_u64(transfer.gas_limit, transfer.gas_locked))
    });
    let used = output
        .output_accounts
        .values()
        .fold(0u64, |acc, account| math::add_u64(acc, account.gas_used));
    let accounted = math::add_u64(math::add_u64(used, forwarded), output.gas_remaining);
    assert!(
        gas_provided >= accounted,
        "gas invariant violated: provided {} < used {} + forwarded {} + remaining {}",
        gas_provided,
        used,
        forwarded,
        output.gas_remaining
    );
}

/// The internal-errors log entry, if present.
pub fn internal_errors_log(output: &VMOutput) -> Option<String> {
    output
        .logs
        .iter()
        .find(|entry| entry.identifier == b"internalVMErrors".to_vec())
        .map(|entry| String::from_utf8_lossy(&entry.data).into_owned())
}
