//! Nested execution and contract management hooks.

use skein_host::VMHost;
use skein_vm_common::{CallInput, CallType, CreateInput, TxDataBuilder, VMInput};

use crate::util::{
    charge, fail, load_address, load_argument_vector, load_function_name, load_value, mem_load,
    mem_store,
};

fn build_call_input(
    host: &VMHost,
    destination: skein_vm_common::Address,
    value: num_bigint::BigUint,
    function: String,
    arguments: Vec<Vec<u8>>,
    gas_limit: i64,
) -> CallInput {
    let sender = host.runtime().context_address();
    CallInput {
        vm_input: VMInput {
            caller_addr: sender,
            call_value: value,
            call_type: CallType::DirectCall,
            arguments,
            gas_price: host.runtime().vm_input().vm_input.gas_price,
            gas_provided: host.bound_gas_limit(gas_limit as u64),
            ..VMInput::default()
        },
        recipient_addr: destination,
        function,
        allow_init_function: false,
    }
}

/// Synchronous sub-calls require caller and destination in one shard.
fn require_same_shard(host: &VMHost, destination: &skein_vm_common::Address) -> Result<(), ()> {
    let sender = host.runtime().context_address();
    if !host.in_same_shard(&sender, destination) {
        fail(host, skein_host::HostError::SyncExecutionNotInSameShard);
        return Err(());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn execute_on_dest_context(
    host: &VMHost,
    gas_limit: i64,
    dest_offset: i32,
    value_offset: i32,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.execute_on_dest_context;
    if charge(host, "executeOnDestContext", cost).is_err() {
        return -1;
    }
    let Ok(destination) = load_address(host, dest_offset) else {
        return -1;
    };
    let Ok(value) = load_value(host, value_offset) else {
        return -1;
    };
    let Ok(function) = load_function_name(host, function_offset, function_length) else {
        return -1;
    };
    let Ok(arguments) =
        load_argument_vector(host, num_arguments, arguments_length_offset, data_offset)
    else {
        return -1;
    };
    if require_same_shard(host, &destination).is_err() {
        return -1;
    }

    let input = build_call_input(host, destination, value, function, arguments, gas_limit);
    let (_, _, error) = host.execute_on_dest_context(input);
    match error {
        None => 0,
        Some(_) => -1,
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn execute_on_same_context(
    host: &VMHost,
    gas_limit: i64,
    dest_offset: i32,
    value_offset: i32,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.execute_on_same_context;
    if charge(host, "executeOnSameContext", cost).is_err() {
        return -1;
    }
    let Ok(destination) = load_address(host, dest_offset) else {
        return -1;
    };
    let Ok(value) = load_value(host, value_offset) else {
        return -1;
    };
    let Ok(function) = load_function_name(host, function_offset, function_length) else {
        return -1;
    };
    let Ok(arguments) =
        load_argument_vector(host, num_arguments, arguments_length_offset, data_offset)
    else {
        return -1;
    };
    if require_same_shard(host, &destination).is_err() {
        return -1;
    }

    let input = build_call_input(host, destination, value, function, arguments, gas_limit);
    match host.execute_on_same_context(input) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn execute_read_only(
    host: &VMHost,
    gas_limit: i64,
    dest_offset: i32,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.execute_read_only;
    if charge(host, "executeReadOnly", cost).is_err() {
        return -1;
    }
    let Ok(destination) = load_address(host, dest_offset) else {
        return -1;
    };
    let Ok(function) = load_function_name(host, function_offset, function_length) else {
        return -1;
    };
    let Ok(arguments) =
        load_argument_vector(host, num_arguments, arguments_length_offset, data_offset)
    else {
        return -1;
    };
    if require_same_shard(host, &destination).is_err() {
        return -1;
    }

    let input = build_call_input(
        host,
        destination,
        num_bigint::BigUint::default(),
        function,
        arguments,
        gas_limit,
    );
    let (_, _, error) = host.execute_read_only(input);
    match error {
        None => 0,
        Some(_) => -1,
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn create_contract(
    host: &VMHost,
    gas_limit: i64,
    value_offset: i32,
    code_offset: i32,
    code_metadata_offset: i32,
    code_length: i32,
    result_offset: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.create_contract;
    if charge(host, "createContract", cost).is_err() {
        return -1;
    }
    let Ok(value) = load_value(host, value_offset) else {
        return -1;
    };
    let Ok(code) = mem_load(host, code_offset, code_length) else {
        return -1;
    };
    let Ok(metadata) = mem_load(
        host,
        code_metadata_offset,
        skein_vm_common::code_metadata::CODE_METADATA_LENGTH as i32,
    ) else {
        return -1;
    };
    let Ok(arguments) =
        load_argument_vector(host, num_arguments, arguments_length_offset, data_offset)
    else {
        return -1;
    };

    let sender = host.runtime().context_address();
    let input = CreateInput {
        vm_input: VMInput {
            caller_addr: sender,
            call_value: value,
            arguments,
            gas_price: host.runtime().vm_input().vm_input.gas_price,
            gas_provided: host.bound_gas_limit(gas_limit as u64),
            ..VMInput::default()
        },
        contract_code: code,
        contract_code_metadata: metadata,
    };

    match host.create_new_contract(&input) {
        Ok(address) => {
            if mem_store(host, result_offset, address.as_bytes()).is_err() {
                return -1;
            }
            0
        }
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn deploy_from_source_contract(
    host: &VMHost,
    gas_limit: i64,
    value_offset: i32,
    source_address_offset: i32,
    code_metadata_offset: i32,
    result_offset: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.create_contract;
    if charge(host, "deployFromSourceContract", cost).is_err() {
        return -1;
    }
    let Ok(value) = load_value(host, value_offset) else {
        return -1;
    };
    let Ok(source_address) = load_address(host, source_address_offset) else {
        return -1;
    };
    let Ok(metadata) = mem_load(
        host,
        code_metadata_offset,
        skein_vm_common::code_metadata::CODE_METADATA_LENGTH as i32,
    ) else {
        return -1;
    };
    let Ok(arguments) =
        load_argument_vector(host, num_arguments, arguments_length_offset, data_offset)
    else {
        return -1;
    };

    let code = match host.blockchain().get_code(&source_address) {
        Ok(code) => code,
        Err(err) => {
            fail(host, err);
            return -1;
        }
    };

    let sender = host.runtime().context_address();
    let input = CreateInput {
        vm_input: VMInput {
            caller_addr: sender,
            call_value: value,
            arguments,
            gas_price: host.runtime().vm_input().vm_input.gas_price,
            gas_provided: host.bound_gas_limit(gas_limit as u64),
            ..VMInput::default()
        },
        contract_code: code,
        contract_code_metadata: metadata,
    };

    match host.create_new_contract(&input) {
        Ok(address) => {
            if mem_store(host, result_offset, address.as_bytes()).is_err() {
                return -1;
            }
            0
        }
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

/// Upgrades run asynchronously: the request travels to the target as an
/// async call invoking the reserved upgrade function.
#[allow(clippy::too_many_arguments)]
pub(crate) fn upgrade_contract(
    host: &VMHost,
    dest_offset: i32,
    gas_limit: i64,
    value_offset: i32,
    code_offset: i32,
    code_metadata_offset: i32,
    code_length: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) {
    let cost = host.metering().schedule().api_cost.create_contract;
    if charge(host, "upgradeContract", cost).is_err() {
        return;
    }
    let Ok(destination) = load_address(host, dest_offset) else {
        return;
    };
    let Ok(value) = load_value(host, value_offset) else {
        return;
    };
    let Ok(code) = mem_load(host, code_offset, code_length) else {
        return;
    };
    let Ok(metadata) = mem_load(
        host,
        code_metadata_offset,
        skein_vm_common::code_metadata::CODE_METADATA_LENGTH as i32,
    ) else {
        return;
    };
    let Ok(arguments) =
        load_argument_vector(host, num_arguments, arguments_length_offset, data_offset)
    else {
        return;
    };

    upgrade_async(host, destination, value, code, metadata, arguments, gas_limit);
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn upgrade_from_source_contract(
    host: &VMHost,
    dest_offset: i32,
    gas_limit: i64,
    value_offset: i32,
    source_address_offset: i32,
    code_metadata_offset: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) {
    let cost = host.metering().schedule().api_cost.create_contract;
    if charge(host, "upgradeFromSourceContract", cost).is_err() {
        return;
    }
    let Ok(destination) = load_address(host, dest_offset) else {
        return;
    };
    let Ok(value) = load_value(host, value_offset) else {
        return;
    };
    let Ok(source_address) = load_address(host, source_address_offset) else {
        return;
    };
    let Ok(metadata) = mem_load(
        host,
        code_metadata_offset,
        skein_vm_common::code_metadata::CODE_METADATA_LENGTH as i32,
    ) else {
        return;
    };
    let Ok(arguments) =
        load_argument_vector(host, num_arguments, arguments_length_offset, data_offset)
    else {
        return;
    };

    let code = match host.blockchain().get_code(&source_address) {
        Ok(code) => code,
        Err(err) => {
            fail(host, err);
            return;
        }
    };

    upgrade_async(host, destination, value, code, metadata, arguments, gas_limit);
}

fn upgrade_async(
    host: &VMHost,
    destination: skein_vm_common::Address,
    value: num_bigint::BigUint,
    code: Vec<u8>,
    metadata: Vec<u8>,
    arguments: Vec<Vec<u8>>,
    _gas_limit: i64,
) {
    let mut data = TxDataBuilder::new()
        .func(skein_host::contexts::runtime::UPGRADE_FUNCTION_NAME)
        .arg(&code)
        .arg(&metadata);
    for argument in &arguments {
        data = data.arg(argument);
    }

    if let Err(err) = host.register_legacy_async_call(destination, data.to_bytes(), value) {
        fail(host, err);
    }
}

pub(crate) fn delete_contract(
    host: &VMHost,
    dest_offset: i32,
    _gas_limit: i64,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) {
    let cost = host.metering().schedule().api_cost.create_contract;
    if charge(host, "deleteContract", cost).is_err() {
        return;
    }
    let Ok(destination) = load_address(host, dest_offset) else {
        return;
    };
    let Ok(arguments) =
        load_argument_vector(host, num_arguments, arguments_length_offset, data_offset)
    else {
        return;
    };

    let mut data =
        TxDataBuilder::new().func(skein_host::contexts::runtime::DELETE_FUNCTION_NAME);
    for argument in &arguments {
        data = data.arg(argument);
    }

    if let Err(err) =
        host.register_legacy_async_call(destination, data.to_bytes(), num_bigint::BigUint::default())
    {
        fail(host, err);
    }
}
