//! Transaction and caller inspection hooks.

use skein_host::VMHost;

use crate::util::{charge, fail, load_address, mem_store};

pub(crate) fn get_gas_left(host: &VMHost) -> i64 {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "getGasLeft", cost).is_err() {
        return 0;
    }
    host.gas_left() as i64
}

pub(crate) fn get_sc_address(host: &VMHost, result_offset: i32) {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "getSCAddress", cost).is_err() {
        return;
    }
    let address = host.runtime().context_address();
    let _ = mem_store(host, result_offset, address.as_bytes());
}

pub(crate) fn get_owner_address(host: &VMHost, result_offset: i32) {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "getOwnerAddress", cost).is_err() {
        return;
    }
    let address = host.runtime().context_address();
    match host.blockchain().get_owner_address(&address) {
        Ok(owner) => {
            let _ = mem_store(host, result_offset, owner.as_bytes());
        }
        Err(err) => fail(host, err),
    }
}

pub(crate) fn get_caller(host: &VMHost, result_offset: i32) {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "getCaller", cost).is_err() {
        return;
    }
    let caller = host.runtime().vm_input().vm_input.caller_addr;
    let _ = mem_store(host, result_offset, caller.as_bytes());
}

pub(crate) fn get_call_value(host: &VMHost, result_offset: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "getCallValue", cost).is_err() {
        return -1;
    }
    let value = host.runtime().vm_input().vm_input.call_value.to_bytes_be();
    if mem_store(host, result_offset, &value).is_err() {
        return -1;
    }
    value.len() as i32
}

pub(crate) fn get_num_arguments(host: &VMHost) -> i32 {
    let cost = host.metering().schedule().api_cost.get_argument;
    if charge(host, "getNumArguments", cost).is_err() {
        return -1;
    }
    host.runtime().vm_input().vm_input.arguments.len() as i32
}

pub(crate) fn get_argument_length(host: &VMHost, id: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.get_argument;
    if charge(host, "getArgumentLength", cost).is_err() {
        return -1;
    }
    let length = {
        let runtime = host.runtime();
        let arguments = &runtime.vm_input().vm_input.arguments;
        arguments.get(id as usize).map(|argument| argument.len())
    };
    match length {
        Some(length) => length as i32,
        None => {
            fail(host, skein_host::HostError::ArgumentIndexOutOfRange);
            -1
        }
    }
}

pub(crate) fn get_argument(host: &VMHost, id: i32, arg_offset: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.get_argument;
    if charge(host, "getArgument", cost).is_err() {
        return -1;
    }
    let argument = {
        let runtime = host.runtime();
        runtime.vm_input().vm_input.arguments.get(id as usize).cloned()
    };
    match argument {
        Some(argument) => {
            if mem_store(host, arg_offset, &argument).is_err() {
                return -1;
            }
            argument.len() as i32
        }
        None => {
            fail(host, skein_host::HostError::ArgumentIndexOutOfRange);
            -1
        }
    }
}

pub(crate) fn get_function(host: &VMHost, function_offset: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "getFunction", cost).is_err() {
        return -1;
    }
    let name = host.runtime().function_name();
    if mem_store(host, function_offset, name.as_bytes()).is_err() {
        return -1;
    }
    name.len() as i32
}

pub(crate) fn get_shard_of_address(host: &VMHost, address_offset: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "getShardOfAddress", cost).is_err() {
        return -1;
    }
    let Ok(address) = load_address(host, address_offset) else {
        return -1;
    };
    host.blockchain().get_shard_of_address(&address) as i32
}

pub(crate) fn is_smart_contract(host: &VMHost, address_offset: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "isSmartContract", cost).is_err() {
        return -1;
    }
    let Ok(address) = load_address(host, address_offset) else {
        return -1;
    };
    host.blockchain().is_smart_contract(&address) as i32
}

pub(crate) fn check_no_payment(host: &VMHost) {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "checkNoPayment", cost).is_err() {
        return;
    }
    let (has_value, has_tokens) = {
        let runtime = host.runtime();
        let vm_input = &runtime.vm_input().vm_input;
        (
            vm_input.call_value > num_bigint::BigUint::default(),
            !vm_input.esdt_transfers.is_empty(),
        )
    };
    if has_value {
        host.signal_user_error("function does not accept payment");
    } else if has_tokens {
        host.signal_user_error("function does not accept token payment");
    }
}
