//! Managed-buffer and managed-bignum hooks.
//!
//! These operate on host-side handles instead of marshalling every value
//! through linear memory; only the explicit get/set hooks copy bytes.

use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

use skein_host::{HostError, VMHost};

use crate::util::{charge, fail, mem_load, mem_store};

fn mbuffer_cost(host: &VMHost) -> u64 {
    host.metering().schedule().api_cost.mbuffer_op
}

fn big_int_cost(host: &VMHost) -> u64 {
    host.metering().schedule().api_cost.big_int_op
}

pub(crate) fn mbuffer_new(host: &VMHost) -> i32 {
    if charge(host, "mBufferNew", mbuffer_cost(host)).is_err() {
        return -1;
    }
    host.managed_types_mut().new_buffer(Vec::new())
}

pub(crate) fn mbuffer_new_from_bytes(host: &VMHost, data_offset: i32, data_length: i32) -> i32 {
    if charge(host, "mBufferNewFromBytes", mbuffer_cost(host)).is_err() {
        return -1;
    }
    let Ok(data) = mem_load(host, data_offset, data_length) else {
        return -1;
    };
    host.managed_types_mut().new_buffer(data)
}

pub(crate) fn mbuffer_get_length(host: &VMHost, handle: i32) -> i32 {
    if charge(host, "mBufferGetLength", mbuffer_cost(host)).is_err() {
        return -1;
    }
    let length = {
        let managed = host.managed_types_mut();
        managed.get_buffer(handle).map(Vec::len)
    };
    match length {
        Ok(length) => length as i32,
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

pub(crate) fn mbuffer_get_bytes(host: &VMHost, handle: i32, result_offset: i32) -> i32 {
    if charge(host, "mBufferGetBytes", mbuffer_cost(host)).is_err() {
        return -1;
    }
    let buffer = {
        let managed = host.managed_types_mut();
        managed.get_buffer(handle).map(Clone::clone)
    };
    match buffer {
        Ok(buffer) => {
            if mem_store(host, result_offset, &buffer).is_err() {
                return -1;
            }
            buffer.len() as i32
        }
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

pub(crate) fn mbuffer_set_bytes(
    host: &VMHost,
    handle: i32,
    data_offset: i32,
    data_length: i32,
) -> i32 {
    if charge(host, "mBufferSetBytes", mbuffer_cost(host)).is_err() {
        return -1;
    }
    let Ok(data) = mem_load(host, data_offset, data_length) else {
        return -1;
    };
    host.managed_types_mut().set_buffer(handle, data);
    0
}

pub(crate) fn mbuffer_append_bytes(
    host: &VMHost,
    handle: i32,
    data_offset: i32,
    data_length: i32,
) -> i32 {
    if charge(host, "mBufferAppendBytes", mbuffer_cost(host)).is_err() {
        return -1;
    }
    let Ok(data) = mem_load(host, data_offset, data_length) else {
        return -1;
    };
    match host.managed_types_mut().append_to_buffer(handle, &data) {
        Ok(()) => 0,
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

pub(crate) fn mbuffer_finish(host: &VMHost, handle: i32) -> i32 {
    if charge(host, "mBufferFinish", mbuffer_cost(host)).is_err() {
        return -1;
    }
    let buffer = {
        let managed = host.managed_types_mut();
        managed.get_buffer(handle).map(Clone::clone)
    };
    match buffer {
        Ok(buffer) => {
            host.output_mut().finish(buffer);
            0
        }
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

pub(crate) fn mbuffer_get_argument(host: &VMHost, arg_id: i32, handle: i32) -> i32 {
    if charge(host, "mBufferGetArgument", mbuffer_cost(host)).is_err() {
        return -1;
    }
    let argument = {
        let runtime = host.runtime();
        runtime
            .vm_input()
            .vm_input
            .arguments
            .get(arg_id as usize)
            .cloned()
    };
    match argument {
        Some(argument) => {
            host.managed_types_mut().set_buffer(handle, argument);
            0
        }
        None => {
            fail(host, HostError::ArgumentIndexOutOfRange);
            -1
        }
    }
}

pub(crate) fn mbuffer_storage_store(host: &VMHost, key_handle: i32, value_handle: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.storage_store;
    if charge(host, "mBufferStorageStore", cost).is_err() {
        return -1;
    }
    let pair = {
        let managed = host.managed_types_mut();
        let key = managed.get_buffer(key_handle).map(Clone::clone);
        let value = managed.get_buffer(value_handle).map(Clone::clone);
        key.and_then(|key| value.map(|value| (key, value)))
    };
    match pair {
        Ok((key, value)) => match host.set_storage_guest(&key, &value) {
            Ok(status) => status as i32,
            Err(err) => {
                fail(host, err);
                -1
            }
        },
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

pub(crate) fn mbuffer_storage_load(host: &VMHost, key_handle: i32, dest_handle: i32) -> i32 {
    let key = {
        let managed = host.managed_types_mut();
        managed.get_buffer(key_handle).map(Clone::clone)
    };
    let key = match key {
        Ok(key) => key,
        Err(err) => {
            fail(host, err);
            return -1;
        }
    };
    match host.get_storage_guest(&key) {
        Ok(value) => {
            host.managed_types_mut().set_buffer(dest_handle, value);
            0
        }
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

pub(crate) fn big_int_new(host: &VMHost, small_value: i64) -> i32 {
    if charge(host, "bigIntNew", big_int_cost(host)).is_err() {
        return -1;
    }
    host.managed_types_mut().new_big_int(BigInt::from(small_value))
}

pub(crate) fn big_int_set_int64(host: &VMHost, dest_handle: i32, value: i64) {
    if charge(host, "bigIntSetInt64", big_int_cost(host)).is_err() {
        return;
    }
    host.managed_types_mut()
        .set_big_int(dest_handle, BigInt::from(value));
}

pub(crate) fn big_int_get_int64(host: &VMHost, handle: i32) -> i64 {
    if charge(host, "bigIntGetInt64", big_int_cost(host)).is_err() {
        return 0;
    }
    let value = {
        let managed = host.managed_types_mut();
        managed.get_big_int(handle).map(Clone::clone)
    };
    match value {
        Ok(value) => match value.to_i64() {
            Some(small) => small,
            None => {
                fail(host, HostError::BigIntCannotBeRepresentedAsInt64);
                0
            }
        },
        Err(err) => {
            fail(host, err);
            0
        }
    }
}

fn big_int_binary_op(
    host: &VMHost,
    api_name: &str,
    dest_handle: i32,
    op1_handle: i32,
    op2_handle: i32,
    op: impl FnOnce(&BigInt, &BigInt) -> BigInt,
) {
    if charge(host, api_name, big_int_cost(host)).is_err() {
        return;
    }
    let operands = {
        let managed = host.managed_types_mut();
        let op1 = managed.get_big_int(op1_handle).map(Clone::clone);
        let op2 = managed.get_big_int(op2_handle).map(Clone::clone);
        op1.and_then(|a| op2.map(|b| (a, b)))
    };
    match operands {
        Ok((a, b)) => {
            let result = op(&a, &b);
            host.managed_types_mut().set_big_int(dest_handle, result);
        }
        Err(err) => fail(host, err),
    }
}

pub(crate) fn big_int_add(host: &VMHost, dest_handle: i32, op1_handle: i32, op2_handle: i32) {
    big_int_binary_op(host, "bigIntAdd", dest_handle, op1_handle, op2_handle, |a, b| a + b);
}

pub(crate) fn big_int_sub(host: &VMHost, dest_handle: i32, op1_handle: i32, op2_handle: i32) {
    big_int_binary_op(host, "bigIntSub", dest_handle, op1_handle, op2_handle, |a, b| a - b);
}

pub(crate) fn big_int_mul(host: &VMHost, dest_handle: i32, op1_handle: i32, op2_handle: i32) {
    big_int_binary_op(host, "bigIntMul", dest_handle, op1_handle, op2_handle, |a, b| a * b);
}

pub(crate) fn big_int_sign(host: &VMHost, handle: i32) -> i32 {
    if charge(host, "bigIntSign", big_int_cost(host)).is_err() {
        return 0;
    }
    let value = {
        let managed = host.managed_types_mut();
        managed.get_big_int(handle).map(Clone::clone)
    };
    match value {
        Ok(value) => match value.sign() {
            Sign::Minus => -1,
            Sign::NoSign => 0,
            Sign::Plus => 1,
        },
        Err(err) => {
            fail(host, err);
            0
        }
    }
}

pub(crate) fn big_int_cmp(host: &VMHost, op1_handle: i32, op2_handle: i32) -> i32 {
    if charge(host, "bigIntCmp", big_int_cost(host)).is_err() {
        return 0;
    }
    let operands = {
        let managed = host.managed_types_mut();
        let op1 = managed.get_big_int(op1_handle).map(Clone::clone);
        let op2 = managed.get_big_int(op2_handle).map(Clone::clone);
        op1.and_then(|a| op2.map(|b| (a, b)))
    };
    match operands {
        Ok((a, b)) => match a.cmp(&b) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        },
        Err(err) => {
            fail(host, err);
            0
        }
    }
}

pub(crate) fn big_int_to_buffer(host: &VMHost, handle: i32, buffer_handle: i32) {
    if charge(host, "bigIntToBuffer", big_int_cost(host)).is_err() {
        return;
    }
    let value = {
        let managed = host.managed_types_mut();
        managed.get_big_int(handle).map(Clone::clone)
    };
    match value {
        Ok(value) => {
            let (_, bytes) = value.to_bytes_be();
            host.managed_types_mut().set_buffer(buffer_handle, bytes);
        }
        Err(err) => fail(host, err),
    }
}

pub(crate) fn big_int_get_unsigned_argument(host: &VMHost, arg_id: i32, handle: i32) {
    if charge(host, "bigIntGetUnsignedArgument", big_int_cost(host)).is_err() {
        return;
    }
    let argument = {
        let runtime = host.runtime();
        runtime
            .vm_input()
            .vm_input
            .arguments
            .get(arg_id as usize)
            .cloned()
    };
    match argument {
        Some(argument) => {
            let value = BigInt::from_bytes_be(Sign::Plus, &argument);
            host.managed_types_mut().set_big_int(handle, value);
        }
        None => fail(host, HostError::ArgumentIndexOutOfRange),
    }
}

pub(crate) fn big_int_get_call_value(host: &VMHost, handle: i32) {
    if charge(host, "bigIntGetCallValue", big_int_cost(host)).is_err() {
        return;
    }
    let value = host.runtime().vm_input().vm_input.call_value.clone();
    host.managed_types_mut()
        .set_big_int(handle, BigInt::from(value));
}

pub(crate) fn big_int_finish_unsigned(host: &VMHost, handle: i32) {
    if charge(host, "bigIntFinishUnsigned", big_int_cost(host)).is_err() {
        return;
    }
    let value = {
        let managed = host.managed_types_mut();
        managed.get_big_int(handle).map(Clone::clone)
    };
    match value {
        Ok(value) => {
            let (_, bytes) = value.to_bytes_be();
            host.output_mut().finish(bytes);
        }
        Err(err) => fail(host, err),
    }
}
