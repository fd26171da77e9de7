//! Storage hooks.

use skein_host::VMHost;

use crate::util::{charge, charge_data_copy, fail, load_address, mem_load, mem_store};

pub(crate) fn storage_store(
    host: &VMHost,
    key_offset: i32,
    key_length: i32,
    data_offset: i32,
    data_length: i32,
) -> i32 {
    let cost = host.metering().schedule().api_cost.storage_store;
    if charge(host, "storageStore", cost).is_err() {
        return -1;
    }
    let Ok(key) = mem_load(host, key_offset, key_length) else {
        return -1;
    };
    let Ok(data) = mem_load(host, data_offset, data_length) else {
        return -1;
    };

    match host.set_storage_guest(&key, &data) {
        Ok(status) => status as i32,
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

pub(crate) fn storage_load_length(host: &VMHost, key_offset: i32, key_length: i32) -> i32 {
    let Ok(key) = mem_load(host, key_offset, key_length) else {
        return -1;
    };
    match host.get_storage_guest(&key) {
        Ok(value) => value.len() as i32,
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

pub(crate) fn storage_load(
    host: &VMHost,
    key_offset: i32,
    key_length: i32,
    data_offset: i32,
) -> i32 {
    let Ok(key) = mem_load(host, key_offset, key_length) else {
        return -1;
    };
    let value = match host.get_storage_guest(&key) {
        Ok(value) => value,
        Err(err) => {
            fail(host, err);
            return -1;
        }
    };
    if charge_data_copy(host, value.len()).is_err() {
        return -1;
    }
    if mem_store(host, data_offset, &value).is_err() {
        return -1;
    }
    value.len() as i32
}

pub(crate) fn storage_load_from_address(
    host: &VMHost,
    address_offset: i32,
    key_offset: i32,
    key_length: i32,
    data_offset: i32,
) -> i32 {
    let Ok(address) = load_address(host, address_offset) else {
        return -1;
    };
    let Ok(key) = mem_load(host, key_offset, key_length) else {
        return -1;
    };
    let value = match host.get_storage_from_address_guest(&address, &key) {
        Ok(value) => value,
        Err(err) => {
            fail(host, err);
            return -1;
        }
    };
    if charge_data_copy(host, value.len()).is_err() {
        return -1;
    }
    if mem_store(host, data_offset, &value).is_err() {
        return -1;
    }
    value.len() as i32
}

pub(crate) fn set_storage_lock(
    host: &VMHost,
    key_offset: i32,
    key_length: i32,
    lock_timestamp: i64,
) -> i32 {
    let cost = host.metering().schedule().api_cost.storage_store;
    if charge(host, "setStorageLock", cost).is_err() {
        return -1;
    }
    let Ok(key) = mem_load(host, key_offset, key_length) else {
        return -1;
    };
    match host.set_storage_lock_guest(&key, lock_timestamp as u64) {
        Ok(()) => 0,
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

pub(crate) fn get_storage_lock(host: &VMHost, key_offset: i32, key_length: i32) -> i64 {
    let cost = host.metering().schedule().api_cost.storage_load;
    if charge(host, "getStorageLock", cost).is_err() {
        return -1;
    }
    let Ok(key) = mem_load(host, key_offset, key_length) else {
        return -1;
    };
    match host.get_storage_lock_guest(&key) {
        Ok(timestamp) => timestamp as i64,
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}

pub(crate) fn is_storage_locked(host: &VMHost, key_offset: i32, key_length: i32) -> i32 {
    let lock = get_storage_lock(host, key_offset, key_length);
    match lock {
        l if l < 0 => -1,
        0 => 0,
        _ => 1,
    }
}

pub(crate) fn clear_storage_lock(host: &VMHost, key_offset: i32, key_length: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.storage_store;
    if charge(host, "clearStorageLock", cost).is_err() {
        return -1;
    }
    let Ok(key) = mem_load(host, key_offset, key_length) else {
        return -1;
    };
    match host.clear_storage_lock_guest(&key) {
        Ok(()) => 0,
        Err(err) => {
            fail(host, err);
            -1
        }
    }
}
