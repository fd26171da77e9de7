//! Shared marshalling helpers of the hook bridge.
//!
//! Every hook follows the same skeleton: charge gas, load arguments from
//! guest memory, act on the contexts, store results back. The helpers here
//! implement the loading/storing half with the bridge's failure policy: a
//! recoverable problem records the error and raises a breakpoint through
//! the host, and the hook returns its sentinel value.

use num_bigint::BigUint;

use skein_host::{HostError, VMHost};
use skein_vm_common::Address;

/// Fixed width of value arguments in guest memory.
pub const VALUE_BYTE_LENGTH: u32 = 32;

/// Result of a marshalling step; `Err` means the failure was already
/// reported through the host.
pub type HookResult<T> = Result<T, ()>;

/// Reports a hook failure and stops execution at the next boundary.
pub fn fail(host: &VMHost, err: HostError) {
    host.fail_execution(err);
}

/// Validates a guest-provided length.
pub fn checked_length(host: &VMHost, length: i32) -> HookResult<u32> {
    if length < 0 {
        fail(host, HostError::NegativeLength);
        return Err(());
    }
    Ok(length as u32)
}

/// Loads `length` bytes at `offset` from the instance memory.
pub fn mem_load(host: &VMHost, offset: i32, length: i32) -> HookResult<Vec<u8>> {
    let length = checked_length(host, length)?;
    match host.runtime().mem_load(offset as u32, length) {
        Ok(bytes) => Ok(bytes),
        Err(err) => {
            fail(host, err);
            Err(())
        }
    }
}

/// Stores bytes at `offset` in the instance memory.
pub fn mem_store(host: &VMHost, offset: i32, data: &[u8]) -> HookResult<()> {
    match host.runtime().mem_store(offset as u32, data) {
        Ok(()) => Ok(()),
        Err(err) => {
            fail(host, err);
            Err(())
        }
    }
}

/// Loads a 32-byte address.
pub fn load_address(host: &VMHost, offset: i32) -> HookResult<Address> {
    let bytes = mem_load(host, offset, Address::ZERO.0.len() as i32)?;
    match Address::from_slice(&bytes) {
        Some(address) => Ok(address),
        None => {
            fail(host, HostError::ExecutionFailed);
            Err(())
        }
    }
}

/// Loads a fixed 32-byte big-endian value argument.
pub fn load_value(host: &VMHost, offset: i32) -> HookResult<BigUint> {
    let bytes = mem_load(host, offset, VALUE_BYTE_LENGTH as i32)?;
    Ok(BigUint::from_bytes_be(&bytes))
}

/// Loads a UTF-8 function name.
pub fn load_function_name(host: &VMHost, offset: i32, length: i32) -> HookResult<String> {
    let bytes = mem_load(host, offset, length)?;
    match String::from_utf8(bytes) {
        Ok(name) => Ok(name),
        Err(_) => {
            fail(host, HostError::InvalidFunction);
            Err(())
        }
    }
}

/// Decodes a variable-arity argument vector: `num_arguments` little-endian
/// `u32` lengths at `lengths_offset`, followed by one contiguous payload
/// region at `data_offset` split along those lengths.
pub fn load_argument_vector(
    host: &VMHost,
    num_arguments: i32,
    lengths_offset: i32,
    data_offset: i32,
) -> HookResult<Vec<Vec<u8>>> {
    if num_arguments < 0 {
        fail(host, HostError::NegativeLength);
        return Err(());
    }
    let count = num_arguments as u32;
    if count == 0 {
        return Ok(Vec::new());
    }

    let length_table = mem_load(host, lengths_offset, count.saturating_mul(4) as i32)?;
    let mut lengths = Vec::with_capacity(count as usize);
    let mut total: u32 = 0;
    for chunk in length_table.chunks_exact(4) {
        let len = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        total = total.saturating_add(len);
        lengths.push(len);
    }

    let payload = mem_load(host, data_offset, total as i32)?;
    let mut arguments = Vec::with_capacity(lengths.len());
    let mut cursor = 0usize;
    for len in lengths {
        let end = cursor.saturating_add(len as usize);
        match payload.get(cursor..end) {
            Some(part) => arguments.push(part.to_vec()),
            None => {
                fail(host, HostError::Executor(skein_executor::ExecutorError::BadBounds));
                return Err(());
            }
        }
        cursor = end;
    }
    Ok(arguments)
}

/// Charges the per-byte data-copy cost for `length` bytes.
pub fn charge_data_copy(host: &VMHost, length: usize) -> HookResult<()> {
    let per_byte = host
        .metering()
        .schedule()
        .base_operation_cost
        .data_copy_per_byte;
    let cost = skein_vm_common::math::mul_u64(length as u64, per_byte);
    host.use_gas_bounded(cost).map_err(|_| ())
}

/// Charges a named API base cost.
pub fn charge(host: &VMHost, api_name: &str, cost: u64) -> HookResult<()> {
    host.charge_api(api_name, cost).map_err(|_| ())
}

/// Strips leading zero bytes, the canonical integer argument encoding.
pub fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_leading_zeros() {
        assert_eq!(strip_leading_zeros(&[0, 0, 1, 2]), vec![1, 2]);
        assert_eq!(strip_leading_zeros(&[0, 0]), Vec::<u8>::new());
        assert_eq!(strip_leading_zeros(&[5]), vec![5]);
    }
}
