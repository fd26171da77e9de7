//! The gas schedule.
//!
//! One schedule is attached to a host and captured by the metering context
//! at the start of every call. Hot-swapping the schedule blocks new calls
//! behind the host's execution guard; calls already in flight finish with
//! the schedule they captured.

/// Per-byte costs of data-shaped operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseOperationCost {
    /// Storing one byte into account storage.
    pub store_per_byte: u64,
    /// Releasing one stored byte (refund basis).
    pub release_per_byte: u64,
    /// Copying one byte between guest and host.
    pub data_copy_per_byte: u64,
    /// Persisting one byte into the output.
    pub persist_per_byte: u64,
    /// Compiling one byte of bytecode.
    pub compile_per_byte: u64,
    /// Fetching contract code from the chain.
    pub get_code: u64,
}

impl Default for BaseOperationCost {
    fn default() -> Self {
        BaseOperationCost {
            store_per_byte: 10_000,
            release_per_byte: 1_000,
            data_copy_per_byte: 50,
            persist_per_byte: 1_000,
            compile_per_byte: 300,
            get_code: 2_000,
        }
    }
}

/// Base costs of the VM-API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiCost {
    /// Address/caller/value/function inspection hooks.
    pub get_call_info: u64,
    /// One argument fetched from the call input.
    pub get_argument: u64,
    /// Block-header inspection hooks.
    pub get_block_info: u64,
    /// External balance lookup.
    pub get_external_balance: u64,
    /// Token data and roles lookups.
    pub get_token_data: u64,
    /// Cold storage read.
    pub storage_load: u64,
    /// Warm storage read.
    pub cached_storage_load: u64,
    /// Storage write, before per-byte costs.
    pub storage_store: u64,
    /// Plain value transfer.
    pub transfer_value: u64,
    /// Appending to return data.
    pub finish: u64,
    /// Emitting a log entry.
    pub log: u64,
    /// Signalling a user error.
    pub signal_error: u64,
    /// Return-data inspection hooks.
    pub get_return_data: u64,
    /// Dropping return data.
    pub clean_return_data: u64,
    /// Opening a nested synchronous call.
    pub execute_on_dest_context: u64,
    /// Opening a same-context call.
    pub execute_on_same_context: u64,
    /// Opening a read-only call.
    pub execute_read_only: u64,
    /// Creating a contract from a contract.
    pub create_contract: u64,
    /// Registering an async call.
    pub create_async_call: u64,
    /// Binding the async context callback.
    pub set_async_callback: u64,
    /// Managed-buffer handle operation.
    pub mbuffer_op: u64,
    /// Managed bignum handle operation.
    pub big_int_op: u64,
}

impl Default for ApiCost {
    fn default() -> Self {
        ApiCost {
            get_call_info: 100,
            get_argument: 100,
            get_block_info: 100,
            get_external_balance: 700,
            get_token_data: 1_000,
            storage_load: 10_000,
            cached_storage_load: 1_000,
            storage_store: 75_000,
            transfer_value: 100_000,
            finish: 100,
            log: 3_750,
            signal_error: 100,
            get_return_data: 100,
            clean_return_data: 100,
            execute_on_dest_context: 100_000,
            execute_on_same_context: 100_000,
            execute_read_only: 100_000,
            create_contract: 300_000,
            create_async_call: 100_000,
            set_async_callback: 100_000,
            mbuffer_op: 200,
            big_int_op: 200,
        }
    }
}

/// Gas discipline of the async machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncCost {
    /// Fixed cost of each async hop (registration, emission, callback).
    pub async_call_step: u64,
    /// Gas locked for the callback of every async call.
    pub async_callback_gas_lock: u64,
}

impl Default for AsyncCost {
    fn default() -> Self {
        AsyncCost {
            async_call_step: 100_000,
            async_callback_gas_lock: 4_000_000,
        }
    }
}

/// The complete gas schedule of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GasSchedule {
    /// Per-byte data costs.
    pub base_operation_cost: BaseOperationCost,
    /// VM-API base costs.
    pub api_cost: ApiCost,
    /// Async gas discipline.
    pub async_cost: AsyncCost,
}

impl GasSchedule {
    /// Minimum gas an async call must provide to cover both hops and the
    /// locked callback reserve.
    pub fn min_async_call_gas(&self) -> u64 {
        self.async_cost
            .async_call_step
            .saturating_mul(2)
            .saturating_add(self.async_cost.async_callback_gas_lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_async_call_gas() {
        let schedule = GasSchedule::default();
        assert_eq!(
            schedule.min_async_call_gas(),
            2 * schedule.async_cost.async_call_step
                + schedule.async_cost.async_callback_gas_lock
        );
    }
}
