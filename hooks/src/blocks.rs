//! Block and chain inspection hooks.

use skein_host::VMHost;

use crate::util::{charge, mem_store};

fn block_info_cost(host: &VMHost) -> u64 {
    host.metering().schedule().api_cost.get_block_info
}

pub(crate) fn get_block_timestamp(host: &VMHost) -> i64 {
    if charge(host, "getBlockTimestamp", block_info_cost(host)).is_err() {
        return 0;
    }
    host.blockchain().current_block().timestamp as i64
}

pub(crate) fn get_block_nonce(host: &VMHost) -> i64 {
    if charge(host, "getBlockNonce", block_info_cost(host)).is_err() {
        return 0;
    }
    host.blockchain().current_block().nonce as i64
}

pub(crate) fn get_block_round(host: &VMHost) -> i64 {
    if charge(host, "getBlockRound", block_info_cost(host)).is_err() {
        return 0;
    }
    host.blockchain().current_block().round as i64
}

pub(crate) fn get_block_epoch(host: &VMHost) -> i64 {
    if charge(host, "getBlockEpoch", block_info_cost(host)).is_err() {
        return 0;
    }
    host.blockchain().current_block().epoch as i64
}

pub(crate) fn get_block_random_seed(host: &VMHost, pointer: i32) {
    if charge(host, "getBlockRandomSeed", block_info_cost(host)).is_err() {
        return;
    }
    let seed = host.blockchain().current_block().random_seed;
    let _ = mem_store(host, pointer, &seed);
}

pub(crate) fn get_state_root_hash(host: &VMHost, pointer: i32) {
    if charge(host, "getStateRootHash", block_info_cost(host)).is_err() {
        return;
    }
    let hash = host.blockchain().get_state_root_hash();
    let _ = mem_store(host, pointer, &hash);
}

pub(crate) fn get_prev_block_timestamp(host: &VMHost) -> i64 {
    if charge(host, "getPrevBlockTimestamp", block_info_cost(host)).is_err() {
        return 0;
    }
    host.blockchain().last_block().timestamp as i64
}

pub(crate) fn get_prev_block_nonce(host: &VMHost) -> i64 {
    if charge(host, "getPrevBlockNonce", block_info_cost(host)).is_err() {
        return 0;
    }
    host.blockchain().last_block().nonce as i64
}

pub(crate) fn get_prev_block_round(host: &VMHost) -> i64 {
    if charge(host, "getPrevBlockRound", block_info_cost(host)).is_err() {
        return 0;
    }
    host.blockchain().last_block().round as i64
}

pub(crate) fn get_prev_block_epoch(host: &VMHost) -> i64 {
    if charge(host, "getPrevBlockEpoch", block_info_cost(host)).is_err() {
        return 0;
    }
    host.blockchain().last_block().epoch as i64
}

pub(crate) fn get_prev_block_random_seed(host: &VMHost, pointer: i32) {
    if charge(host, "getPrevBlockRandomSeed", block_info_cost(host)).is_err() {
        return;
    }
    let seed = host.blockchain().last_block().random_seed;
    let _ = mem_store(host, pointer, &seed);
}

pub(crate) fn get_block_hash(host: &VMHost, nonce: i64, result_offset: i32) -> i32 {
    if charge(host, "getBlockHash", block_info_cost(host)).is_err() {
        return -1;
    }
    let hash = host.blockchain().get_block_hash(nonce as u64);
    if hash.is_empty() {
        return -1;
    }
    if mem_store(host, result_offset, &hash).is_err() {
        return -1;
    }
    0
}

pub(crate) fn get_original_tx_hash(host: &VMHost, result_offset: i32) {
    if charge(host, "getOriginalTxHash", block_info_cost(host)).is_err() {
        return;
    }
    let hash = host.runtime().vm_input().vm_input.original_tx_hash.clone();
    let _ = mem_store(host, result_offset, &hash);
}
