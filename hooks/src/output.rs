//! Output hooks: return data, logs, user errors.

use skein_host::VMHost;

use crate::util::{charge, charge_data_copy, checked_length, fail, mem_load, mem_store};

const TOPIC_LENGTH: i32 = 32;

pub(crate) fn finish(host: &VMHost, pointer: i32, length: i32) {
    let cost = host.metering().schedule().api_cost.finish;
    if charge(host, "finish", cost).is_err() {
        return;
    }
    let Ok(data) = mem_load(host, pointer, length) else {
        return;
    };
    let per_byte = host
        .metering()
        .schedule()
        .base_operation_cost
        .persist_per_byte;
    let byte_cost = skein_vm_common::math::mul_u64(data.len() as u64, per_byte);
    if host.use_gas_bounded(byte_cost).is_err() {
        return;
    }
    host.output_mut().finish(data);
}

pub(crate) fn write_log(
    host: &VMHost,
    data_pointer: i32,
    data_length: i32,
    topic_ptr: i32,
    num_topics: i32,
) {
    let cost = host.metering().schedule().api_cost.log;
    if charge(host, "writeLog", cost).is_err() {
        return;
    }
    if checked_length(host, num_topics).is_err() || checked_length(host, data_length).is_err() {
        return;
    }
    let Ok(data) = mem_load(host, data_pointer, data_length) else {
        return;
    };

    let mut topics = Vec::with_capacity(num_topics as usize);
    for i in 0..num_topics {
        let offset = topic_ptr.saturating_add(i.saturating_mul(TOPIC_LENGTH));
        let Ok(topic) = mem_load(host, offset, TOPIC_LENGTH) else {
            return;
        };
        topics.push(topic);
    }

    if charge_data_copy(host, data.len()).is_err() {
        return;
    }
    let address = host.runtime().context_address();
    host.output_mut().write_log(address, topics, data);
}

pub(crate) fn write_event_log(
    host: &VMHost,
    num_topics: i32,
    topic_lengths_offset: i32,
    topic_offset: i32,
    data_offset: i32,
    data_length: i32,
) {
    let cost = host.metering().schedule().api_cost.log;
    if charge(host, "writeEventLog", cost).is_err() {
        return;
    }
    let Ok(topics) =
        crate::util::load_argument_vector(host, num_topics, topic_lengths_offset, topic_offset)
    else {
        return;
    };
    let Ok(data) = mem_load(host, data_offset, data_length) else {
        return;
    };
    if charge_data_copy(host, data.len()).is_err() {
        return;
    }
    let address = host.runtime().context_address();
    host.output_mut().write_log(address, topics, data);
}

pub(crate) fn signal_error(host: &VMHost, message_offset: i32, message_length: i32) {
    let cost = host.metering().schedule().api_cost.signal_error;
    if charge(host, "signalError", cost).is_err() {
        return;
    }
    let Ok(message) = mem_load(host, message_offset, message_length) else {
        return;
    };
    let message = String::from_utf8_lossy(&message).into_owned();
    host.signal_user_error(&message);
}

pub(crate) fn get_num_return_data(host: &VMHost) -> i32 {
    let cost = host.metering().schedule().api_cost.get_return_data;
    if charge(host, "getNumReturnData", cost).is_err() {
        return -1;
    }
    host.output().return_data().len() as i32
}

pub(crate) fn get_return_data_size(host: &VMHost, result_id: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.get_return_data;
    if charge(host, "getReturnDataSize", cost).is_err() {
        return -1;
    }
    let length = {
        let output = host.output();
        output.return_data().get(result_id as usize).map(Vec::len)
    };
    match length {
        Some(length) => length as i32,
        None => {
            fail(host, skein_host::HostError::ArgumentIndexOutOfRange);
            -1
        }
    }
}

pub(crate) fn get_return_data(host: &VMHost, result_id: i32, data_offset: i32) -> i32 {
    let cost = host.metering().schedule().api_cost.get_return_data;
    if charge(host, "getReturnData", cost).is_err() {
        return -1;
    }
    let entry = {
        let output = host.output();
        output.return_data().get(result_id as usize).cloned()
    };
    match entry {
        Some(entry) => {
            if mem_store(host, data_offset, &entry).is_err() {
                return -1;
            }
            entry.len() as i32
        }
        None => {
            fail(host, skein_host::HostError::ArgumentIndexOutOfRange);
            -1
        }
    }
}

pub(crate) fn clean_return_data(host: &VMHost) {
    let cost = host.metering().schedule().api_cost.clean_return_data;
    if charge(host, "cleanReturnData", cost).is_err() {
        return;
    }
    host.output_mut().clean_return_data();
}

pub(crate) fn delete_from_return_data(host: &VMHost, result_id: i32) {
    let cost = host.metering().schedule().api_cost.clean_return_data;
    if charge(host, "deleteFromReturnData", cost).is_err() {
        return;
    }
    if result_id < 0 {
        fail(host, skein_host::HostError::ArgumentIndexOutOfRange);
        return;
    }
    host.output_mut().delete_return_data(result_id as usize);
}
