//! Transfer hooks: plain value, value-and-execute, token transfers.

use num_bigint::BigUint;

use skein_host::VMHost;
use skein_vm_common::{
    CallInput, CallType, EsdtTokenType, EsdtTransfer, TxDataBuilder, VMInput,
};

use crate::util::{
    charge, charge_data_copy, fail, load_address, load_argument_vector, load_function_name,
    load_value, mem_load, strip_leading_zeros,
};

pub(crate) fn transfer_value(
    host: &VMHost,
    dest_offset: i32,
    value_offset: i32,
    data_offset: i32,
    length: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.transfer_value;
    if charge(host, "transferValue", cost).is_err() {
        return -1;
    }
    let Ok(destination) = load_address(host, dest_offset) else {
        return -1;
    };
    let Ok(value) = load_value(host, value_offset) else {
        return -1;
    };
    let Ok(data) = mem_load(host, data_offset, length) else {
        return -1;
    };
    if charge_data_copy(host, data.len()).is_err() {
        return -1;
    }

    match host.transfer_value_guest(&destination, &value, data) {
        Ok(()) => 0,
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

/// Shared body of the transfer-and-execute family: moves value and/or
/// tokens, then either executes the named function on an intra-shard
/// contract destination or stages a cross-shard transfer carrying the
/// call data.
#[allow(clippy::too_many_arguments)]
fn transfer_with_execute(
    host: &VMHost,
    destination: skein_vm_common::Address,
    value: BigUint,
    transfers: Vec<EsdtTransfer>,
    gas_limit: i64,
    function: String,
    arguments: Vec<Vec<u8>>,
) -> i32 {
    if host.runtime().read_only() {
        fail(host, skein_host::HostError::InvalidCallOnReadOnlyMode);
        return -1;
    }

    let sender = host.runtime().context_address();
    let same_shard = host.in_same_shard(&sender, &destination);
    let is_contract = host.blockchain().is_smart_contract(&destination);

    if !transfers.is_empty() {
        // Token movement is a protocol builtin; run it first. An
        // intra-shard embedded call continues below on its output.
        let call_type = CallType::EsdtTransferAndExecute;
        match host.execute_esdt_transfer(&destination, &sender, &transfers, call_type) {
            Ok(_) => {}
            Err(err) => {
                fail(host, err);
                return -1;
            }
        }
    }

    if function.is_empty() {
        if value > BigUint::default() {
            if let Err(err) = host.transfer_value_guest(&destination, &value, Vec::new()) {
                fail(host, err);
                return -1;
            }
        }
        return 0;
    }

    if same_shard && is_contract {
        let input = CallInput {
            vm_input: VMInput {
                caller_addr: sender,
                call_value: value,
                call_type: CallType::DirectCall,
                arguments,
                esdt_transfers: transfers,
                gas_price: host.runtime().vm_input().vm_input.gas_price,
                gas_provided: host.bound_gas_limit(gas_limit as u64),
                ..VMInput::default()
            },
            recipient_addr: destination,
            function,
            allow_init_function: false,
        };
        let (_, _, error) = host.execute_on_dest_context(input);
        match error {
            None => 0,
            Some(_) => -1,
        }
    } else {
        // Remote destination: the call travels as transfer data.
        let mut data = TxDataBuilder::new().func(&function);
        for argument in &arguments {
            data = data.arg(argument);
        }
        let gas = host.bound_gas_limit(gas_limit as u64);
        host.use_gas(gas);
        let sender_balance = host.blockchain().get_balance(&sender);
        let staged = host.output_mut().transfer(
            destination,
            sender,
            gas,
            0,
            &value,
            Vec::new(),
            data.to_bytes(),
            CallType::DirectCall,
            &sender_balance,
        );
        match staged {
            Ok(()) => 0,
            Err(err) => {
                fail(host, err);
                -1
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn transfer_value_execute(
    host: &VMHost,
    dest_offset: i32,
    value_offset: i32,
    gas_limit: i64,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.transfer_value;
    if charge(host, "transferValueExecute", cost).is_err() {
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

    transfer_with_execute(host, destination, value, Vec::new(), gas_limit, function, arguments)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn transfer_esdt_execute(
    host: &VMHost,
    dest_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
    value_offset: i32,
    gas_limit: i64,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) -> i32 {
    transfer_esdt_nft_execute(
        host,
        dest_offset,
        token_id_offset,
        token_id_len,
        value_offset,
        0,
        gas_limit,
        function_offset,
        function_length,
        num_arguments,
        arguments_length_offset,
        data_offset,
    )
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn transfer_esdt_nft_execute(
    host: &VMHost,
    dest_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
    value_offset: i32,
    nonce: i64,
    gas_limit: i64,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.transfer_value;
    if charge(host, "transferESDTNFTExecute", cost).is_err() {
        return -1;
    }
    let Ok(destination) = load_address(host, dest_offset) else {
        return -1;
    };
    let Ok(token_name) = mem_load(host, token_id_offset, token_id_len) else {
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

    let transfer = EsdtTransfer {
        token_name,
        nonce: nonce as u64,
        value,
        token_type: if nonce > 0 {
            EsdtTokenType::NonFungible
        } else {
            EsdtTokenType::Fungible
        },
    };

    transfer_with_execute(
        host,
        destination,
        BigUint::default(),
        vec![transfer],
        gas_limit,
        function,
        arguments,
    )
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn multi_transfer_esdt_nft_execute(
    host: &VMHost,
    dest_offset: i32,
    num_token_transfers: i32,
    token_transfers_length_offset: i32,
    token_transfers_offset: i32,
    gas_limit: i64,
    function_offset: i32,
    function_length: i32,
    num_arguments: i32,
    arguments_length_offset: i32,
    data_offset: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.transfer_value;
    if charge(host, "multiTransferESDTNFTExecute", cost).is_err() {
        return -1;
    }
    let Ok(destination) = load_address(host, dest_offset) else {
        return -1;
    };

    // Token transfers arrive as a packed argument vector of
    // (token, nonce, value) triplets.
    let Ok(packed) = load_argument_vector(
        host,
        num_token_transfers.saturating_mul(3),
        token_transfers_length_offset,
        token_transfers_offset,
    ) else {
        return -1;
    };
    let mut transfers = Vec::with_capacity(num_token_transfers as usize);
    for triplet in packed.chunks_exact(3) {
        let nonce_bytes = strip_leading_zeros(&triplet[1]);
        let mut nonce_buf = [0u8; 8];
        let len = nonce_bytes.len().min(8);
        nonce_buf[8usize.saturating_sub(len)..]
            .copy_from_slice(&nonce_bytes[nonce_bytes.len().saturating_sub(len)..]);
        let nonce = u64::from_be_bytes(nonce_buf);
        transfers.push(EsdtTransfer {
            token_name: triplet[0].clone(),
            nonce,
            value: BigUint::from_bytes_be(&triplet[2]),
            token_type: if nonce > 0 {
                EsdtTokenType::NonFungible
            } else {
                EsdtTokenType::Fungible
            },
        });
    }

    let Ok(function) = load_function_name(host, function_offset, function_length) else {
        return -1;
    };
    let Ok(arguments) =
        load_argument_vector(host, num_arguments, arguments_length_offset, data_offset)
    else {
        return -1;
    };

    transfer_with_execute(
        host,
        destination,
        BigUint::default(),
        transfers,
        gas_limit,
        function,
        arguments,
    )
}

/// Exposed for the bridge tests: proves the builtin argument synthesis and
/// its parser are inverses.
#[cfg(test)]
mod tests {
    use super::*;
    use skein_host::vmhost::esdt::parse_esdt_transfers;
    use skein_vm_common::Address;

    #[test]
    fn test_parse_is_inverse_of_synthesis_shape() {
        let caller = Address([1u8; 32]);
        let parsed = parse_esdt_transfers(
            &caller,
            &Address([2u8; 32]),
            "ESDTTransfer",
            &[b"WSKN-1a2b3c".to_vec(), vec![0x10]],
        )
        .unwrap();
        assert_eq!(parsed.transfers[0].value, BigUint::from(0x10u32));
    }
}
