//! Skein VM-API bridge
//!
//! Implements the host-function surface guest modules import, over a
//! shared [`VMHost`]. Every hook follows the same contract:
//!
//! 1. charge the base cost from the gas schedule (plus per-byte costs for
//!    data-shaped operations);
//! 2. load and validate arguments from the instance's linear memory;
//! 3. delegate to the appropriate context through the host;
//! 4. write results back to memory;
//! 5. on a recoverable failure, record the error, raise a breakpoint and
//!    return the sentinel value (`-1` for `i32` hooks); `void` hooks rely
//!    on the breakpoint alone.
//!
//! Hooks never unwind into the executor: the breakpoint register is the
//! only failure channel across the guest boundary.

#![warn(missing_docs)]
#![deny(clippy::arithmetic_side_effects)]

mod async_hooks;
mod blocks;
mod calls;
mod managed;
mod output;
mod runtime_info;
mod storage;
mod tokens;
mod transfers;
pub mod util;

use std::rc::Rc;

use skein_executor::VMHooks;
use skein_host::VMHost;

/// The VM-API bridge: routes every guest import to the host's contexts.
pub struct VMHooksDispatcher {
    host: Rc<VMHost>,
}

impl VMHooksDispatcher {
    /// Creates a dispatcher over `host`.
    pub fn new(host: Rc<VMHost>) -> Self {
        VMHooksDispatcher { host }
    }

    /// The host behind this dispatcher.
    pub fn host(&self) -> &Rc<VMHost> {
        &self.host
    }
}

impl VMHooks for VMHooksDispatcher {
    fn get_gas_left(&self) -> i64 {
        runtime_info::get_gas_left(&self.host)
    }
    fn get_sc_address(&self, result_offset: i32) {
        runtime_info::get_sc_address(&self.host, result_offset)
    }
    fn get_owner_address(&self, result_offset: i32) {
        runtime_info::get_owner_address(&self.host, result_offset)
    }
    fn get_caller(&self, result_offset: i32) {
        runtime_info::get_caller(&self.host, result_offset)
    }
    fn get_call_value(&self, result_offset: i32) -> i32 {
        runtime_info::get_call_value(&self.host, result_offset)
    }
    fn get_num_arguments(&self) -> i32 {
        runtime_info::get_num_arguments(&self.host)
    }
    fn get_argument_length(&self, id: i32) -> i32 {
        runtime_info::get_argument_length(&self.host, id)
    }
    fn get_argument(&self, id: i32, arg_offset: i32) -> i32 {
        runtime_info::get_argument(&self.host, id, arg_offset)
    }
    fn get_function(&self, function_offset: i32) -> i32 {
        runtime_info::get_function(&self.host, function_offset)
    }
    fn get_shard_of_address(&self, address_offset: i32) -> i32 {
        runtime_info::get_shard_of_address(&self.host, address_offset)
    }
    fn is_smart_contract(&self, address_offset: i32) -> i32 {
        runtime_info::is_smart_contract(&self.host, address_offset)
    }
    fn check_no_payment(&self) {
        runtime_info::check_no_payment(&self.host)
    }

    fn get_block_timestamp(&self) -> i64 {
        blocks::get_block_timestamp(&self.host)
    }
    fn get_block_nonce(&self) -> i64 {
        blocks::get_block_nonce(&self.host)
    }
    fn get_block_round(&self) -> i64 {
        blocks::get_block_round(&self.host)
    }
    fn get_block_epoch(&self) -> i64 {
        blocks::get_block_epoch(&self.host)
    }
    fn get_block_random_seed(&self, pointer: i32) {
        blocks::get_block_random_seed(&self.host, pointer)
    }
    fn get_state_root_hash(&self, pointer: i32) {
        blocks::get_state_root_hash(&self.host, pointer)
    }
    fn get_prev_block_timestamp(&self) -> i64 {
        blocks::get_prev_block_timestamp(&self.host)
    }
    fn get_prev_block_nonce(&self) -> i64 {
        blocks::get_prev_block_nonce(&self.host)
    }
    fn get_prev_block_round(&self) -> i64 {
        blocks::get_prev_block_round(&self.host)
    }
    fn get_prev_block_epoch(&self) -> i64 {
        blocks::get_prev_block_epoch(&self.host)
    }
    fn get_prev_block_random_seed(&self, pointer: i32) {
        blocks::get_prev_block_random_seed(&self.host, pointer)
    }
    fn get_block_hash(&self, nonce: i64, result_offset: i32) -> i32 {
        blocks::get_block_hash(&self.host, nonce, result_offset)
    }
    fn get_original_tx_hash(&self, result_offset: i32) {
        blocks::get_original_tx_hash(&self.host, result_offset)
    }

    fn storage_store(
        &self,
        key_offset: i32,
        key_length: i32,
        data_offset: i32,
        data_length: i32,
    ) -> i32 {
        storage::storage_store(&self.host, key_offset, key_length, data_offset, data_length)
    }
    fn storage_load_length(&self, key_offset: i32, key_length: i32) -> i32 {
        storage::storage_load_length(&self.host, key_offset, key_length)
    }
    fn storage_load(&self, key_offset: i32, key_length: i32, data_offset: i32) -> i32 {
        storage::storage_load(&self.host, key_offset, key_length, data_offset)
    }
    fn storage_load_from_address(
        &self,
        address_offset: i32,
        key_offset: i32,
        key_length: i32,
        data_offset: i32,
    ) -> i32 {
        storage::storage_load_from_address(
            &self.host,
            address_offset,
            key_offset,
            key_length,
            data_offset,
        )
    }
    fn set_storage_lock(&self, key_offset: i32, key_length: i32, lock_timestamp: i64) -> i32 {
        storage::set_storage_lock(&self.host, key_offset, key_length, lock_timestamp)
    }
    fn get_storage_lock(&self, key_offset: i32, key_length: i32) -> i64 {
        storage::get_storage_lock(&self.host, key_offset, key_length)
    }
    fn is_storage_locked(&self, key_offset: i32, key_length: i32) -> i32 {
        storage::is_storage_locked(&self.host, key_offset, key_length)
    }
    fn clear_storage_lock(&self, key_offset: i32, key_length: i32) -> i32 {
        storage::clear_storage_lock(&self.host, key_offset, key_length)
    }

    fn get_external_balance(&self, address_offset: i32, result_offset: i32) {
        tokens::get_external_balance(&self.host, address_offset, result_offset)
    }
    fn get_esdt_balance(
        &self,
        address_offset: i32,
        token_id_offset: i32,
        token_id_len: i32,
        nonce: i64,
        result_offset: i32,
    ) -> i32 {
        tokens::get_esdt_balance(
            &self.host,
            address_offset,
            token_id_offset,
            token_id_len,
            nonce,
            result_offset,
        )
    }
    fn get_esdt_token_data(
        &self,
        address_offset: i32,
        token_id_offset: i32,
        token_id_len: i32,
        nonce: i64,
        value_offset: i32,
        attributes_offset: i32,
    ) -> i32 {
        tokens::get_esdt_token_data(
            &self.host,
            address_offset,
            token_id_offset,
            token_id_len,
            nonce,
            value_offset,
            attributes_offset,
        )
    }
    fn get_esdt_local_roles(&self, token_id_offset: i32, token_id_len: i32) -> i64 {
        tokens::get_esdt_local_roles(&self.host, token_id_offset, token_id_len)
    }
    fn validate_token_identifier(&self, token_id_offset: i32, token_id_len: i32) -> i32 {
        tokens::validate_token_identifier(&self.host, token_id_offset, token_id_len)
    }
    fn get_current_esdt_nft_nonce(
        &self,
        address_offset: i32,
        token_id_offset: i32,
        token_id_len: i32,
    ) -> i64 {
        tokens::get_current_esdt_nft_nonce(&self.host, address_offset, token_id_offset, token_id_len)
    }
    fn get_num_esdt_transfers(&self) -> i32 {
        tokens::get_num_esdt_transfers(&self.host)
    }
    fn get_esdt_value_by_index(&self, result_offset: i32, index: i32) -> i32 {
        tokens::get_esdt_value_by_index(&self.host, result_offset, index)
    }
    fn get_esdt_token_name_by_index(&self, result_offset: i32, index: i32) -> i32 {
        tokens::get_esdt_token_name_by_index(&self.host, result_offset, index)
    }
    fn get_esdt_token_nonce_by_index(&self, index: i32) -> i64 {
        tokens::get_esdt_token_nonce_by_index(&self.host, index)
    }
    fn get_esdt_token_type_by_index(&self, index: i32) -> i32 {
        tokens::get_esdt_token_type_by_index(&self.host, index)
    }

    fn transfer_value(
        &self,
        dest_offset: i32,
        value_offset: i32,
        data_offset: i32,
        length: i32,
    ) -> i32 {
        transfers::transfer_value(&self.host, dest_offset, value_offset, data_offset, length)
    }
    fn transfer_value_execute(
        &self,
        dest_offset: i32,
        value_offset: i32,
        gas_limit: i64,
        function_offset: i32,
        function_length: i32,
        num_arguments: i32,
        arguments_length_offset: i32,
        data_offset: i32,
    ) -> i32 {
        transfers::transfer_value_execute(
            &self.host,
            dest_offset,
            value_offset,
            gas_limit,
            function_offset,
            function_length,
            num_arguments,
            arguments_length_offset,
            data_offset,
        )
    }
    fn transfer_esdt_execute(
        &self,
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
        transfers::transfer_esdt_execute(
            &self.host,
            dest_offset,
            token_id_offset,
            token_id_len,
            value_offset,
            gas_limit,
            function_offset,
            function_length,
            num_arguments,
            arguments_length_offset,
            data_offset,
        )
    }
    fn transfer_esdt_nft_execute(
        &self,
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
        transfers::transfer_esdt_nft_execute(
            &self.host,
            dest_offset,
            token_id_offset,
            token_id_len,
            value_offset,
            nonce,
            gas_limit,
            function_offset,
            function_length,
            num_arguments,
            arguments_length_offset,
            data_offset,
        )
    }
    fn multi_transfer_esdt_nft_execute(
        &self,
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
        transfers::multi_transfer_esdt_nft_execute(
            &self.host,
            dest_offset,
            num_token_transfers,
            token_transfers_length_offset,
            token_transfers_offset,
            gas_limit,
            function_offset,
            function_length,
            num_arguments,
            arguments_length_offset,
            data_offset,
        )
    }
    fn execute_on_dest_context(
        &self,
        gas_limit: i64,
        dest_offset: i32,
        value_offset: i32,
        function_offset: i32,
        function_length: i32,
        num_arguments: i32,
        arguments_length_offset: i32,
        data_offset: i32,
    ) -> i32 {
        calls::execute_on_dest_context(
            &self.host,
            gas_limit,
            dest_offset,
            value_offset,
            function_offset,
            function_length,
            num_arguments,
            arguments_length_offset,
            data_offset,
        )
    }
    fn execute_on_same_context(
        &self,
        gas_limit: i64,
        dest_offset: i32,
        value_offset: i32,
        function_offset: i32,
        function_length: i32,
        num_arguments: i32,
        arguments_length_offset: i32,
        data_offset: i32,
    ) -> i32 {
        calls::execute_on_same_context(
            &self.host,
            gas_limit,
            dest_offset,
            value_offset,
            function_offset,
            function_length,
            num_arguments,
            arguments_length_offset,
            data_offset,
        )
    }
    fn execute_read_only(
        &self,
        gas_limit: i64,
        dest_offset: i32,
        function_offset: i32,
        function_length: i32,
        num_arguments: i32,
        arguments_length_offset: i32,
        data_offset: i32,
    ) -> i32 {
        calls::execute_read_only(
            &self.host,
            gas_limit,
            dest_offset,
            function_offset,
            function_length,
            num_arguments,
            arguments_length_offset,
            data_offset,
        )
    }
    fn create_contract(
        &self,
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
        calls::create_contract(
            &self.host,
            gas_limit,
            value_offset,
            code_offset,
            code_metadata_offset,
            code_length,
            result_offset,
            num_arguments,
            arguments_length_offset,
            data_offset,
        )
    }
    fn deploy_from_source_contract(
        &self,
        gas_limit: i64,
        value_offset: i32,
        source_address_offset: i32,
        code_metadata_offset: i32,
        result_offset: i32,
        num_arguments: i32,
        arguments_length_offset: i32,
        data_offset: i32,
    ) -> i32 {
        calls::deploy_from_source_contract(
            &self.host,
            gas_limit,
            value_offset,
            source_address_offset,
            code_metadata_offset,
            result_offset,
            num_arguments,
            arguments_length_offset,
            data_offset,
        )
    }
    fn upgrade_contract(
        &self,
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
        calls::upgrade_contract(
            &self.host,
            dest_offset,
            gas_limit,
            value_offset,
            code_offset,
            code_metadata_offset,
            code_length,
            num_arguments,
            arguments_length_offset,
            data_offset,
        )
    }
    fn upgrade_from_source_contract(
        &self,
        dest_offset: i32,
        gas_limit: i64,
        value_offset: i32,
        source_address_offset: i32,
        code_metadata_offset: i32,
        num_arguments: i32,
        arguments_length_offset: i32,
        data_offset: i32,
    ) {
        calls::upgrade_from_source_contract(
            &self.host,
            dest_offset,
            gas_limit,
            value_offset,
            source_address_offset,
            code_metadata_offset,
            num_arguments,
            arguments_length_offset,
            data_offset,
        )
    }
    fn delete_contract(
        &self,
        dest_offset: i32,
        gas_limit: i64,
        num_arguments: i32,
        arguments_length_offset: i32,
        data_offset: i32,
    ) {
        calls::delete_contract(
            &self.host,
            dest_offset,
            gas_limit,
            num_arguments,
            arguments_length_offset,
            data_offset,
        )
    }

    fn create_async_call(
        &self,
        dest_offset: i32,
        value_offset: i32,
        data_offset: i32,
        data_length: i32,
        success_offset: i32,
        success_length: i32,
        error_offset: i32,
        error_length: i32,
        gas: i64,
        extra_gas_for_callback: i64,
    ) -> i32 {
        async_hooks::create_async_call(
            &self.host,
            dest_offset,
            value_offset,
            data_offset,
            data_length,
            success_offset,
            success_length,
            error_offset,
            error_length,
            gas,
            extra_gas_for_callback,
        )
    }
    fn set_async_context_callback(
        &self,
        callback_offset: i32,
        callback_length: i32,
        data_offset: i32,
        data_length: i32,
        gas: i64,
    ) -> i32 {
        async_hooks::set_async_context_callback(
            &self.host,
            callback_offset,
            callback_length,
            data_offset,
            data_length,
            gas,
        )
    }
    fn async_call(&self, dest_offset: i32, value_offset: i32, data_offset: i32, length: i32) {
        async_hooks::async_call(&self.host, dest_offset, value_offset, data_offset, length)
    }

    fn finish(&self, pointer: i32, length: i32) {
        output::finish(&self.host, pointer, length)
    }
    fn write_log(&self, data_pointer: i32, data_length: i32, topic_ptr: i32, num_topics: i32) {
        output::write_log(&self.host, data_pointer, data_length, topic_ptr, num_topics)
    }
    fn write_event_log(
        &self,
        num_topics: i32,
        topic_lengths_offset: i32,
        topic_offset: i32,
        data_offset: i32,
        data_length: i32,
    ) {
        output::write_event_log(
            &self.host,
            num_topics,
            topic_lengths_offset,
            topic_offset,
            data_offset,
            data_length,
        )
    }
    fn signal_error(&self, message_offset: i32, message_length: i32) {
        output::signal_error(&self.host, message_offset, message_length)
    }
    fn get_num_return_data(&self) -> i32 {
        output::get_num_return_data(&self.host)
    }
    fn get_return_data_size(&self, result_id: i32) -> i32 {
        output::get_return_data_size(&self.host, result_id)
    }
    fn get_return_data(&self, result_id: i32, data_offset: i32) -> i32 {
        output::get_return_data(&self.host, result_id, data_offset)
    }
    fn clean_return_data(&self) {
        output::clean_return_data(&self.host)
    }
    fn delete_from_return_data(&self, result_id: i32) {
        output::delete_from_return_data(&self.host, result_id)
    }

    fn mbuffer_new(&self) -> i32 {
        managed::mbuffer_new(&self.host)
    }
    fn mbuffer_new_from_bytes(&self, data_offset: i32, data_length: i32) -> i32 {
        managed::mbuffer_new_from_bytes(&self.host, data_offset, data_length)
    }
    fn mbuffer_get_length(&self, handle: i32) -> i32 {
        managed::mbuffer_get_length(&self.host, handle)
    }
    fn mbuffer_get_bytes(&self, handle: i32, result_offset: i32) -> i32 {
        managed::mbuffer_get_bytes(&self.host, handle, result_offset)
    }
    fn mbuffer_set_bytes(&self, handle: i32, data_offset: i32, data_length: i32) -> i32 {
        managed::mbuffer_set_bytes(&self.host, handle, data_offset, data_length)
    }
    fn mbuffer_append_bytes(&self, handle: i32, data_offset: i32, data_length: i32) -> i32 {
        managed::mbuffer_append_bytes(&self.host, handle, data_offset, data_length)
    }
    fn mbuffer_finish(&self, handle: i32) -> i32 {
        managed::mbuffer_finish(&self.host, handle)
    }
    fn mbuffer_get_argument(&self, arg_id: i32, handle: i32) -> i32 {
        managed::mbuffer_get_argument(&self.host, arg_id, handle)
    }
    fn mbuffer_storage_store(&self, key_handle: i32, value_handle: i32) -> i32 {
        managed::mbuffer_storage_store(&self.host, key_handle, value_handle)
    }
    fn mbuffer_storage_load(&self, key_handle: i32, dest_handle: i32) -> i32 {
        managed::mbuffer_storage_load(&self.host, key_handle, dest_handle)
    }

    fn big_int_new(&self, small_value: i64) -> i32 {
        managed::big_int_new(&self.host, small_value)
    }
    fn big_int_set_int64(&self, dest_handle: i32, value: i64) {
        managed::big_int_set_int64(&self.host, dest_handle, value)
    }
    fn big_int_get_int64(&self, handle: i32) -> i64 {
        managed::big_int_get_int64(&self.host, handle)
    }
    fn big_int_add(&self, dest_handle: i32, op1_handle: i32, op2_handle: i32) {
        managed::big_int_add(&self.host, dest_handle, op1_handle, op2_handle)
    }
    fn big_int_sub(&self, dest_handle: i32, op1_handle: i32, op2_handle: i32) {
        managed::big_int_sub(&self.host, dest_handle, op1_handle, op2_handle)
    }
    fn big_int_mul(&self, dest_handle: i32, op1_handle: i32, op2_handle: i32) {
        managed::big_int_mul(&self.host, dest_handle, op1_handle, op2_handle)
    }
    fn big_int_sign(&self, handle: i32) -> i32 {
        managed::big_int_sign(&self.host, handle)
    }
    fn big_int_cmp(&self, op1_handle: i32, op2_handle: i32) -> i32 {
        managed::big_int_cmp(&self.host, op1_handle, op2_handle)
    }
    fn big_int_to_buffer(&self, handle: i32, buffer_handle: i32) {
        managed::big_int_to_buffer(&self.host, handle, buffer_handle)
    }
    fn big_int_get_unsigned_argument(&self, arg_id: i32, handle: i32) {
        managed::big_int_get_unsigned_argument(&self.host, arg_id, handle)
    }
    fn big_int_get_call_value(&self, handle: i32) {
        managed::big_int_get_call_value(&self.host, handle)
    }
    fn big_int_finish_unsigned(&self, handle: i32) {
        managed::big_int_finish_unsigned(&self.host, handle)
    }
}
