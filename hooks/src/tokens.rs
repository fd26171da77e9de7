//! Balance and token hooks.

use skein_host::VMHost;
use skein_vm_common::{EsdtLocalRoles, EsdtTransfer};

use crate::util::{charge, fail, load_address, mem_load, mem_store};

fn transfer_at_index(host: &VMHost, index: i32) -> Option<EsdtTransfer> {
    let runtime = host.runtime();
    let transfers = &runtime.vm_input().vm_input.esdt_transfers;
    if index < 0 {
        return None;
    }
    transfers.get(index as usize).cloned()
}

pub(crate) fn get_external_balance(host: &VMHost, address_offset: i32, result_offset: i32) {
    let cost = host.metering().schedule().api_cost.get_external_balance;
    if charge(host, "getExternalBalance", cost).is_err() {
        return;
    }
    let Ok(address) = load_address(host, address_offset) else {
        return;
    };
    let balance = host.blockchain().get_balance(&address).to_bytes_be();
    let _ = mem_store(host, result_offset, &balance);
}

pub(crate) fn get_esdt_balance(
    host: &VMHost,
    address_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
    nonce: i64,
    result_offset: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.get_token_data;
    if charge(host, "getESDTBalance", cost).is_err() {
        return -1;
    }
    let Ok(address) = load_address(host, address_offset) else {
        return -1;
    };
    let Ok(token) = mem_load(host, token_id_offset, token_id_len) else {
        return -1;
    };
    let data = match host
        .blockchain()
        .hook()
        .get_esdt_token_data(&address, &token, nonce as u64)
    {
        Ok(data) => data,
        Err(err) => {
            fail(host, err.into());
            return -1;
        }
    };
    let amount = data.amount.to_bytes_be();
    if mem_store(host, result_offset, &amount).is_err() {
        return -1;
    }
    amount.len() as i32
}

pub(crate) fn get_esdt_token_data(
    host: &VMHost,
    address_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
    nonce: i64,
    value_offset: i32,
    attributes_offset: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.get_token_data;
    if charge(host, "getESDTTokenData", cost).is_err() {
        return -1;
    }
    let Ok(address) = load_address(host, address_offset) else {
        return -1;
    };
    let Ok(token) = mem_load(host, token_id_offset, token_id_len) else {
        return -1;
    };
    let data = match host
        .blockchain()
        .hook()
        .get_esdt_token_data(&address, &token, nonce as u64)
    {
        Ok(data) => data,
        Err(err) => {
            fail(host, err.into());
            return -1;
        }
    };
    if mem_store(host, value_offset, &data.amount.to_bytes_be()).is_err() {
        return -1;
    }
    if mem_store(host, attributes_offset, &data.attributes).is_err() {
        return -1;
    }
    data.token_type.as_u32() as i32
}

pub(crate) fn get_esdt_local_roles(host: &VMHost, token_id_offset: i32, token_id_len: i32) -> i64 {
    let cost = host.metering().schedule().api_cost.get_token_data;
    if charge(host, "getESDTLocalRoles", cost).is_err() {
        return 0;
    }
    let Ok(token) = mem_load(host, token_id_offset, token_id_len) else {
        return 0;
    };
    let address = host.runtime().context_address();
    match host
        .blockchain()
        .hook()
        .get_esdt_local_role_names(&address, &token)
    {
        Ok(names) => EsdtLocalRoles::from_role_names(&names).0 as i64,
        Err(err) => {
            fail(host, err.into());
            0
        }
    }
}

pub(crate) fn validate_token_identifier(
    host: &VMHost,
    token_id_offset: i32,
    token_id_len: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "validateTokenIdentifier", cost).is_err() {
        return -1;
    }
    let Ok(token) = mem_load(host, token_id_offset, token_id_len) else {
        return -1;
    };
    skein_vm_common::tokens::validate_token_identifier(&token) as i32
}

pub(crate) fn get_current_esdt_nft_nonce(
    host: &VMHost,
    address_offset: i32,
    token_id_offset: i32,
    token_id_len: i32,
) -> i64 {
    let cost = host.metering().schedule().api_cost.get_token_data;
    if charge(host, "getCurrentESDTNFTNonce", cost).is_err() {
        return 0;
    }
    let Ok(address) = load_address(host, address_offset) else {
        return 0;
    };
    let Ok(token) = mem_load(host, token_id_offset, token_id_len) else {
        return 0;
    };
    match host.blockchain().hook().get_current_nft_nonce(&address, &token) {
        Ok(nonce) => nonce as i64,
        Err(err) => {
            fail(host, err.into());
            0
        }
    }
}

pub(crate) fn get_num_esdt_transfers(host: &VMHost) -> i32 {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "getNumESDTTransfers", cost).is_err() {
        return -1;
    }
    host.runtime().vm_input().vm_input.esdt_transfers.len() as i32
}

pub(crate) fn get_esdt_value_by_index(host: &VMHost, result_offset: i32, index: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "getESDTValueByIndex", cost).is_err() {
        return -1;
    }
    let Some(transfer) = transfer_at_index(host, index) else {
        fail(host, skein_host::HostError::InvalidTokenIndex);
        return -1;
    };
    let value = transfer.value.to_bytes_be();
    if mem_store(host, result_offset, &value).is_err() {
        return -1;
    }
    value.len() as i32
}

pub(crate) fn get_esdt_token_name_by_index(host: &VMHost, result_offset: i32, index: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "getESDTTokenNameByIndex", cost).is_err() {
        return -1;
    }
    let Some(transfer) = transfer_at_index(host, index) else {
        fail(host, skein_host::HostError::InvalidTokenIndex);
        return -1;
    };
    if mem_store(host, result_offset, &transfer.token_name).is_err() {
        return -1;
    }
    transfer.token_name.len() as i32
}

pub(crate) fn get_esdt_token_nonce_by_index(host: &VMHost, index: i32) -> i64 {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "getESDTTokenNonceByIndex", cost).is_err() {
        return 0;
    }
    let Some(transfer) = transfer_at_index(host, index) else {
        fail(host, skein_host::HostError::InvalidTokenIndex);
        return 0;
    };
    transfer.nonce as i64
}

pub(crate) fn get_esdt_token_type_by_index(host: &VMHost, index: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.get_call_info;
    if charge(host, "getESDTTokenTypeByIndex", cost).is_err() {
        return -1;
    }
    let Some(transfer) = transfer_at_index(host, index) else {
        fail(host, skein_host::HostError::InvalidTokenIndex);
        return -1;
    };
    transfer.token_type.as_u32() as i32
}
