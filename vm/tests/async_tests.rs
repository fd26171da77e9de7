//! Async state machine scenarios: local resolution with callbacks,
//! cross-shard emission and persistence, and callback-side resumption in
//! a later transaction.

mod common;

use common::*;
use skein_executor::ScriptedContract;
use skein_host::contexts::async_ctx::AsyncContext;
use skein_vm_common::{
    AsyncArguments, CallType, LengthPrefixedBuilder, ReturnCode,
};

const OWNER: u8 = 0x0F;
const ASYNC_GAS: i64 = 20_000_000;

/// Registers a parent that fires one async call to `child_addr` invoking
/// `childFn`, with `onSuccess`/`onError` callbacks that record their
/// outcome in storage.
fn register_async_parent(fixture: &TestHost, child_addr: skein_vm_common::Address) {
    fixture.executors.register_contract(
        b"async-parent",
        ScriptedContract::new()
            .with_export("startAsync", move |ctx| {
                ctx.write_mem(0, child_addr.as_bytes());
                ctx.write_mem(32, &[0u8; 32]); // zero value
                ctx.write_mem(64, b"childFn");
                ctx.write_mem(96, b"onSuccess");
                ctx.write_mem(128, b"onError");
                let status = ctx.hooks().create_async_call(
                    0,   // destination
                    32,  // value
                    64,  // call data
                    7,   // call data length
                    96,  // success callback
                    9,   // success callback length
                    128, // error callback
                    7,   // error callback length
                    ASYNC_GAS,
                    0,
                );
                assert_eq!(status, 0);
            })
            .with_export("onSuccess", |ctx| {
                // args: (return code, child return data...)
                let arg_len = ctx.hooks().get_argument_length(1);
                assert!(arg_len >= 0);
                ctx.hooks().get_argument(1, 64);
                ctx.write_mem(0, b"cb");
                let status = ctx.hooks().storage_store(0, 2, 64, arg_len);
                assert!(status >= 0);
            })
            .with_export("onError", |ctx| {
                ctx.write_mem(0, b"cb");
                ctx.write_mem(8, b"error");
                ctx.hooks().storage_store(0, 2, 8, 5);
            }),
    );
}

#[test]
fn test_local_async_call_resolves_inline_with_callback() {
    let fixture = test_host();
    let parent = addr(0x30);
    let child = addr(0x31);

    register_async_parent(&fixture, child);
    fixture.executors.register_contract(
        b"async-child",
        ScriptedContract::new().with_export("childFn", |ctx| {
            ctx.write_mem(0, b"forty-two");
            ctx.hooks().finish(0, 9);
        }),
    );
    fixture.chain.put_contract(parent, b"async-parent", 1_000, addr(OWNER));
    fixture.chain.put_contract(child, b"async-child", 0, addr(OWNER));

    let output = fixture
        .host
        .run_smart_contract_call(&call(addr(1), parent, "startAsync"))
        .unwrap();

    assert_eq!(output.return_code, ReturnCode::Ok);
    let account = &output.output_accounts[&parent];
    let update = &account.storage_updates[b"cb".as_slice()];
    assert_eq!(update.data, b"forty-two".to_vec());

    // Fully resolved in one transaction: nothing was persisted.
    for (key, update) in &account.storage_updates {
        if key.starts_with(b"ELRONDasync") {
            assert!(update.data.is_empty(), "no async record may survive");
        }
    }
    assert_gas_invariant(GAS_PROVIDED, &output);
    assert_balance_conservation(&output);
}

#[test]
fn test_local_async_failure_runs_error_callback() {
    let fixture = test_host();
    let parent = addr(0x32);
    let child = addr(0x33);

    register_async_parent(&fixture, child);
    fixture.executors.register_contract(
        b"async-child",
        ScriptedContract::new().with_export("childFn", |ctx| {
            ctx.write_mem(0, b"no");
            ctx.hooks().signal_error(0, 2);
        }),
    );
    fixture.chain.put_contract(parent, b"async-parent", 1_000, addr(OWNER));
    fixture.chain.put_contract(child, b"async-child", 0, addr(OWNER));

    let output = fixture
        .host
        .run_smart_contract_call(&call(addr(1), parent, "startAsync"))
        .unwrap();

    assert_eq!(output.return_code, ReturnCode::Ok);
    let account = &output.output_accounts[&parent];
    let update = &account.storage_updates[b"cb".as_slice()];
    assert_eq!(update.data, b"error".to_vec());
}

#[test]
fn test_cross_shard_async_emits_pending_transfer_and_persists() {
    let fixture = test_host();
    let parent = addr(0x34);
    let remote_child = addr_in_shard(0x35, 9);

    register_async_parent(&fixture, remote_child);
    fixture.chain.put_contract(parent, b"async-parent", 1_000, addr(OWNER));

    let output = fixture
        .host
        .run_smart_contract_call(&call(addr(1), parent, "startAsync"))
        .unwrap();

    assert_eq!(output.return_code, ReturnCode::Ok);

    // The outgoing async leg.
    let child_account = &output.output_accounts[&remote_child];
    assert_eq!(child_account.output_transfers.len(), 1);
    let transfer = &child_account.output_transfers[0];
    assert_eq!(transfer.call_type, CallType::AsynchronousCall);
    assert_eq!(transfer.gas_limit, ASYNC_GAS as u64);
    assert_eq!(transfer.data, b"childFn".to_vec());

    // The correlation prefix: (newCallID, currentCallID).
    let parts = LengthPrefixedBuilder::split(&transfer.async_data).unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[1], b"txhash-1".to_vec());
    assert!(parts[0].starts_with(b"txhash-1"));

    // The persisted context, keyed by the owner's call ID.
    let record_key = AsyncContext::storage_key(b"txhash-1");
    let parent_account = &output.output_accounts[&parent];
    let record = &parent_account.storage_updates[&record_key];
    assert!(record.written);
    let state = AsyncContext::deserialize_state(&record.data).unwrap();
    assert_eq!(state.address, parent);
    assert_eq!(state.calls_counter, 1);
    assert_eq!(state.call_groups.len(), 1);
    assert_eq!(state.call_groups[0].calls[0].destination, remote_child);
    assert!(state.call_groups[0].calls[0].is_pending());

    assert_gas_invariant(GAS_PROVIDED, &output);
}

#[test]
fn test_cross_shard_callback_resumes_and_settles_parent() {
    let fixture = test_host();
    let parent = addr(0x36);
    let remote_child = addr_in_shard(0x37, 9);

    register_async_parent(&fixture, remote_child);
    fixture.chain.put_contract(parent, b"async-parent", 1_000, addr(OWNER));

    // Transaction 1: register and emit.
    let first = fixture
        .host
        .run_smart_contract_call(&call(addr(1), parent, "startAsync"))
        .unwrap();
    assert_eq!(first.return_code, ReturnCode::Ok);
    fixture.chain.commit_output(&first);

    let record_key = AsyncContext::storage_key(b"txhash-1");
    let record = fixture.chain.storage_of(parent, &record_key);
    let state = AsyncContext::deserialize_state(&record).unwrap();
    let child_call_id = state.call_groups[0].calls[0].call_id.clone();

    // Transaction 2: the callback leg arrives from the remote shard.
    let mut callback_input = call(remote_child, parent, "<callback>");
    callback_input.vm_input.call_type = CallType::AsynchronousCallBack;
    callback_input.vm_input.arguments =
        vec![Vec::new(), b"remote-result".to_vec()];
    callback_input.vm_input.async_arguments = Some(AsyncArguments {
        new_call_id: b"cb-leg".to_vec(),
        caller_call_id: child_call_id,
        callback_async_initiator_call_id: b"txhash-1".to_vec(),
        gas_accumulated: 0,
    });

    let second = fixture
        .host
        .run_smart_contract_call(&callback_input)
        .unwrap();
    assert_eq!(second.return_code, ReturnCode::Ok);

    // The success callback ran with the remote return data.
    let account = &second.output_accounts[&parent];
    let update = &account.storage_updates[b"cb".as_slice()];
    assert_eq!(update.data, b"remote-result".to_vec());

    // Terminal completion removed the persisted record.
    let record_update = &account.storage_updates[&record_key];
    assert!(record_update.data.is_empty());
}

#[test]
fn test_async_record_round_trip() {
    let fixture = test_host();
    let parent = addr(0x38);
    let remote_child = addr_in_shard(0x39, 9);

    register_async_parent(&fixture, remote_child);
    fixture.chain.put_contract(parent, b"async-parent", 1_000, addr(OWNER));

    let output = fixture
        .host
        .run_smart_contract_call(&call(addr(1), parent, "startAsync"))
        .unwrap();

    let record_key = AsyncContext::storage_key(b"txhash-1");
    let bytes = output.output_accounts[&parent].storage_updates[&record_key]
        .data
        .clone();
    let state = AsyncContext::deserialize_state(&bytes).unwrap();

    // Serialization is canonical: encode(decode(bytes)) == bytes.
    let reencoded = {
        let mut ctx = AsyncContext::new();
        ctx.set_state(state);
        ctx.serialize_state().unwrap()
    };
    assert_eq!(reencoded, bytes);
}

#[test]
fn test_legacy_async_call_with_default_callback() {
    let fixture = test_host();
    let parent = addr(0x3A);
    let child = addr(0x3B);

    fixture.executors.register_contract(
        b"legacy-parent",
        ScriptedContract::new()
            .with_export("fireAndForget", move |ctx| {
                ctx.write_mem(0, child.as_bytes());
                ctx.write_mem(32, &[0u8; 32]);
                ctx.write_mem(64, b"childFn");
                ctx.hooks().async_call(0, 32, 64, 7);
                // The breakpoint stops the export here.
                assert!(ctx.interrupted());
            })
            .with_export("callBack", |ctx| {
                ctx.write_mem(0, b"legacy");
                ctx.write_mem(8, b"done");
                ctx.hooks().storage_store(0, 6, 8, 4);
            }),
    );
    fixture.executors.register_contract(
        b"async-child",
        ScriptedContract::new().with_export("childFn", |ctx| {
            ctx.write_mem(0, b"ok");
            ctx.hooks().finish(0, 2);
        }),
    );
    fixture.chain.put_contract(parent, b"legacy-parent", 1_000, addr(OWNER));
    fixture.chain.put_contract(child, b"async-child", 0, addr(OWNER));

    let output = fixture
        .host
        .run_smart_contract_call(&call(addr(1), parent, "fireAndForget"))
        .unwrap();

    assert_eq!(output.return_code, ReturnCode::Ok);
    let account = &output.output_accounts[&parent];
    let update = &account.storage_updates[b"legacy".as_slice()];
    assert_eq!(update.data, b"done".to_vec());
}

#[test]
fn test_async_registration_requires_minimum_gas() {
    let fixture = test_host();
    let parent = addr(0x3C);
    let child = addr(0x3D);

    fixture.executors.register_contract(
        b"async-parent",
        ScriptedContract::new().with_export("startAsync", move |ctx| {
            ctx.write_mem(0, child.as_bytes());
            ctx.write_mem(32, &[0u8; 32]);
            ctx.write_mem(64, b"childFn");
            ctx.write_mem(96, b"onSuccess");
            ctx.write_mem(128, b"onError");
            // Far below 2 * asyncCallStep + asyncCallbackGasLock.
            let status = ctx
                .hooks()
                .create_async_call(0, 32, 64, 7, 96, 9, 128, 7, 1_000, 0);
            assert_eq!(status, -1);
        }),
    );
    fixture.chain.put_contract(parent, b"async-parent", 1_000, addr(OWNER));

    let output = fixture
        .host
        .run_smart_contract_call(&call(addr(1), parent, "startAsync"))
        .unwrap();

    assert_eq!(output.return_code, ReturnCode::OutOfGas);
}
