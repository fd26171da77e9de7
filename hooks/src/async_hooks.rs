//! Async call registration hooks.

use skein_executor::BreakpointValue;
use skein_host::contexts::AsyncCall;
use skein_host::VMHost;

use crate::util::{charge, fail, load_address, load_function_name, load_value, mem_load};

#[allow(clippy::too_many_arguments)]
pub(crate) fn create_async_call(
    host: &VMHost,
    dest_offset: i32,
    value_offset: i32,
    data_offset: i32,
    data_length: i32,
    success_offset: i32,
    success_length: i32,
    error_offset: i32,
    error_length: i32,
    gas: i64,
    extra_gas_for_callback: i64,
) -> i32 {
    let cost = host.metering().schedule().api_cost.create_async_call;
    if charge(host, "createAsyncCall", cost).is_err() {
        return -1;
    }
    let Ok(destination) = load_address(host, dest_offset) else {
        return -1;
    };
    let Ok(value) = load_value(host, value_offset) else {
        return -1;
    };
    let Ok(data) = mem_load(host, data_offset, data_length) else {
        return -1;
    };
    let Ok(success_callback) = load_function_name(host, success_offset, success_length) else {
        return -1;
    };
    let Ok(error_callback) = load_function_name(host, error_offset, error_length) else {
        return -1;
    };

    let gas_lock = host.metering().schedule().async_cost.async_callback_gas_lock;
    let call = AsyncCall {
        destination,
        data,
        value,
        gas_limit: gas as u64,
        gas_locked: skein_vm_common::math::add_u64(gas_lock, extra_gas_for_callback as u64),
        success_callback,
        error_callback,
        ..AsyncCall::default()
    };

    match host.register_async_call("", call) {
        Ok(()) => 0,
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

pub(crate) fn set_async_context_callback(
    host: &VMHost,
    callback_offset: i32,
    callback_length: i32,
    data_offset: i32,
    data_length: i32,
    gas: i64,
) -> i32 {
    let cost = host.metering().schedule().api_cost.set_async_callback;
    if charge(host, "setAsyncContextCallback", cost).is_err() {
        return -1;
    }
    let Ok(callback) = load_function_name(host, callback_offset, callback_length) else {
        return -1;
    };
    let Ok(data) = mem_load(host, data_offset, data_length) else {
        return -1;
    };

    match host.set_async_context_callback(&callback, &data, gas as u64) {
        Ok(()) => 0,
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

/// The legacy fire-and-forget async call: registers the single call and
/// yields; execution resumes in the async step after the export returns.
pub(crate) fn async_call(
    host: &VMHost,
    dest_offset: i32,
    value_offset: i32,
    data_offset: i32,
    length: i32,
) {
    let cost = host.metering().schedule().api_cost.create_async_call;
    if charge(host, "asyncCall", cost).is_err() {
        return;
    }
    let Ok(destination) = load_address(host, dest_offset) else {
        return;
    };
    let Ok(value) = load_value(host, value_offset) else {
        return;
    };
    let Ok(data) = mem_load(host, data_offset, length) else {
        return;
    };

    if let Err(err) = host.register_legacy_async_call(destination, data, value) {
        fail(host, err);
        return;
    }
    host.runtime_mut()
        .set_runtime_breakpoint(BreakpointValue::AsyncCall);
}
