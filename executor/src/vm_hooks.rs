//! The host-function surface imported by guest modules.
//!
//! Every function a contract can import from the `env` namespace is a
//! method here, with the scalar WASM ABI it has on the wire: `i32`/`i64`
//! offsets and lengths into the instance's linear memory. The bridge crate
//! implements this trait over the VM host; executors route guest imports to
//! these methods.
//!
//! Conventions, uniform across the surface:
//!
//! - methods take `&self`; the implementation carries interior mutability
//!   so nested calls can re-enter the bridge;
//! - a method returning `i32` reports recoverable failure as `-1` (or a
//!   documented sentinel) after raising a breakpoint;
//! - `void` methods report failure through the breakpoint register alone.

/// Host functions callable from guest code.
#[allow(clippy::too_many_arguments)]
pub trait VMHooks {
    // --- transaction and caller inspection ---

    /// Remaining gas of the current frame.
    fn get_gas_left(&self) -> i64;
    /// Writes the executing contract's address at `result_offset`.
    fn get_sc_address(&self, result_offset: i32);
    /// Writes the executing contract's owner address at `result_offset`.
    fn get_owner_address(&self, result_offset: i32);
    /// Writes the caller address at `result_offset`.
    fn get_caller(&self, result_offset: i32);
    /// Writes the big-endian call value; returns its length.
    fn get_call_value(&self, result_offset: i32) -> i32;
    /// Number of call arguments.
    fn get_num_arguments(&self) -> i32;
    /// Byte length of argument `id`, `-1` if out of range.
    fn get_argument_length(&self, id: i32) -> i32;
    /// Writes argument `id` at `arg_offset`; returns its length.
    fn get_argument(&self, id: i32, arg_offset: i32) -> i32;
    /// Writes the function name; returns its length.
    fn get_function(&self, function_offset: i32) -> i32;
    /// Shard of the address found at `address_offset`.
    fn get_shard_of_address(&self, address_offset: i32) -> i32;
    /// `1` if the address at `address_offset` is a contract.
    fn is_smart_contract(&self, address_offset: i32) -> i32;
    /// Fails the call if any value or token payment accompanies it.
    fn check_no_payment(&self);

    // --- block and chain inspection ---

    /// Timestamp of the block under construction.
    fn get_block_timestamp(&self) -> i64;
    /// Nonce (height) of the block under construction.
    fn get_block_nonce(&self) -> i64;
    /// Round of the block under construction.
    fn get_block_round(&self) -> i64;
    /// Epoch of the block under construction.
    fn get_block_epoch(&self) -> i64;
    /// Writes the 48-byte random seed of the block under construction.
    fn get_block_random_seed(&self, pointer: i32);
    /// Writes the state root hash of the last committed block.
    fn get_state_root_hash(&self, pointer: i32);
    /// Timestamp of the last committed block.
    fn get_prev_block_timestamp(&self) -> i64;
    /// Nonce of the last committed block.
    fn get_prev_block_nonce(&self) -> i64;
    /// Round of the last committed block.
    fn get_prev_block_round(&self) -> i64;
    /// Epoch of the last committed block.
    fn get_prev_block_epoch(&self) -> i64;
    /// Writes the random seed of the last committed block.
    fn get_prev_block_random_seed(&self, pointer: i32);
    /// Writes the hash of block `nonce`; returns `0` on success.
    fn get_block_hash(&self, nonce: i64, result_offset: i32) -> i32;
    /// Writes the original transaction hash.
    fn get_original_tx_hash(&self, result_offset: i32);

    // --- storage ---

    /// Writes a storage slot; returns the storage status code.
    fn storage_store(
        &self,
        key_offset: i32,
        key_length: i32,
        data_offset: i32,
        data_length: i32,
    ) -> i32;
    /// Byte length of a storage slot.
    fn storage_load_length(&self, key_offset: i32, key_length: i32) -> i32;
    /// Reads a storage slot into `data_offset`; returns its length.
    fn storage_load(&self, key_offset: i32, key_length: i32, data_offset: i32) -> i32;
    /// Reads a storage slot of another account; returns its length.
    fn storage_load_from_address(
        &self,
        address_offset: i32,
        key_offset: i32,
        key_length: i32,
        data_offset: i32,
    ) -> i32;
    /// Arms a storage lock until `lock_timestamp`; returns `0` on success.
    fn set_storage_lock(&self, key_offset: i32, key_length: i32, lock_timestamp: i64) -> i32;
    /// Reads a storage lock's expiry timestamp; `0` when unlocked.
    fn get_storage_lock(&self, key_offset: i32, key_length: i32) -> i64;
    /// `1` if the lock is held and unexpired.
    fn is_storage_locked(&self, key_offset: i32, key_length: i32) -> i32;
    /// Clears a storage lock; returns `0` on success.
    fn clear_storage_lock(&self, key_offset: i32, key_length: i32) -> i32;

    // --- balances and tokens ---

    /// Writes the big-endian native balance of an account.
    fn get_external_balance(&self, address_offset: i32, result_offset: i32);
    /// Writes the big-endian ESDT balance; returns its length.
    fn get_esdt_balance(
        &self,
        address_offset: i32,
        token_id_offset: i32,
        token_id_len: i32,
        nonce: i64,
        result_offset: i32,
    ) -> i32;
    /// Writes value and attributes of a token instance; returns the token
    /// type, `-1` on failure.
    fn get_esdt_token_data(
        &self,
        address_offset: i32,
        token_id_offset: i32,
        token_id_len: i32,
        nonce: i64,
        value_offset: i32,
        attributes_offset: i32,
    ) -> i32;
    /// Local-role bitset of the executing contract for a token.
    fn get_esdt_local_roles(&self, token_id_offset: i32, token_id_len: i32) -> i64;
    /// `1` if the bytes form a valid token identifier.
    fn validate_token_identifier(&self, token_id_offset: i32, token_id_len: i32) -> i32;
    /// Current NFT nonce counter of an account for a token.
    fn get_current_esdt_nft_nonce(
        &self,
        address_offset: i32,
        token_id_offset: i32,
        token_id_len: i32,
    ) -> i64;
    /// Number of token transfers accompanying the call.
    fn get_num_esdt_transfers(&self) -> i32;
    /// Writes the value of transfer `index`; returns its length.
    fn get_esdt_value_by_index(&self, result_offset: i32, index: i32) -> i32;
    /// Writes the token name of transfer `index`; returns its length.
    fn get_esdt_token_name_by_index(&self, result_offset: i32, index: i32) -> i32;
    /// Nonce of transfer `index`.
    fn get_esdt_token_nonce_by_index(&self, index: i32) -> i64;
    /// Token type of transfer `index`.
    fn get_esdt_token_type_by_index(&self, index: i32) -> i32;

    // --- transfers and nested execution ---

    /// Stages a plain value transfer; returns `0` on success.
    fn transfer_value(
        &self,
        dest_offset: i32,
        value_offset: i32,
        data_offset: i32,
        length: i32,
    ) -> i32;
    /// Transfers value and, for an intra-shard contract destination,
    /// executes the named function; returns `0` on success.
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
    ) -> i32;
    /// ESDT variant of [`VMHooks::transfer_value_execute`].
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
    ) -> i32;
    /// NFT variant of [`VMHooks::transfer_esdt_execute`].
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
    ) -> i32;
    /// Multi-token variant; transfers are read as a packed argument vector.
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
    ) -> i32;
    /// Synchronous call in the destination's context; returns `0` on
    /// success.
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
    ) -> i32;
    /// Synchronous call running foreign code against the caller's storage.
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
    ) -> i32;
    /// Synchronous call with all state mutation forbidden.
    fn execute_read_only(
        &self,
        gas_limit: i64,
        dest_offset: i32,
        function_offset: i32,
        function_length: i32,
        num_arguments: i32,
        arguments_length_offset: i32,
        data_offset: i32,
    ) -> i32;
    /// Deploys a new contract from code in guest memory; writes the new
    /// address at `result_offset`; returns `0` on success.
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
    ) -> i32;
    /// Deploys a new contract reusing the code of a deployed one.
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
    ) -> i32;
    /// Upgrades a contract with code from guest memory.
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
    );
    /// Upgrades a contract reusing the code of a deployed one.
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
    );
    /// Schedules deletion of a contract owned by the caller.
    fn delete_contract(
        &self,
        dest_offset: i32,
        gas_limit: i64,
        num_arguments: i32,
        arguments_length_offset: i32,
        data_offset: i32,
    );

    // --- async calls ---

    /// Registers an async call in the default group; returns `0` on
    /// success.
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
    ) -> i32;
    /// Binds the context-level callback fired after all groups complete.
    fn set_async_context_callback(
        &self,
        callback_offset: i32,
        callback_length: i32,
        data_offset: i32,
        data_length: i32,
        gas: i64,
    ) -> i32;
    /// Legacy single-slot async call.
    fn async_call(&self, dest_offset: i32, value_offset: i32, data_offset: i32, length: i32);

    // --- output ---

    /// Appends bytes to the call's return data.
    fn finish(&self, pointer: i32, length: i32);
    /// Emits a log entry with fixed 32-byte topics.
    fn write_log(&self, data_pointer: i32, data_length: i32, topic_ptr: i32, num_topics: i32);
    /// Emits a log entry with variable-length topics.
    fn write_event_log(
        &self,
        num_topics: i32,
        topic_lengths_offset: i32,
        topic_offset: i32,
        data_offset: i32,
        data_length: i32,
    );
    /// Terminates the call with a user error message.
    fn signal_error(&self, message_offset: i32, message_length: i32);
    /// Number of return-data entries produced by nested calls.
    fn get_num_return_data(&self) -> i32;
    /// Byte length of return-data entry `result_id`.
    fn get_return_data_size(&self, result_id: i32) -> i32;
    /// Writes return-data entry `result_id`; returns its length.
    fn get_return_data(&self, result_id: i32, data_offset: i32) -> i32;
    /// Drops all return data accumulated from nested calls.
    fn clean_return_data(&self);
    /// Drops return-data entry `result_id`.
    fn delete_from_return_data(&self, result_id: i32);

    // --- managed buffers ---

    /// Allocates an empty managed buffer; returns its handle.
    fn mbuffer_new(&self) -> i32;
    /// Allocates a managed buffer from guest memory; returns its handle.
    fn mbuffer_new_from_bytes(&self, data_offset: i32, data_length: i32) -> i32;
    /// Byte length of a managed buffer.
    fn mbuffer_get_length(&self, handle: i32) -> i32;
    /// Copies a managed buffer into guest memory; returns its length.
    fn mbuffer_get_bytes(&self, handle: i32, result_offset: i32) -> i32;
    /// Overwrites a managed buffer from guest memory; returns `0`.
    fn mbuffer_set_bytes(&self, handle: i32, data_offset: i32, data_length: i32) -> i32;
    /// Appends guest memory to a managed buffer; returns `0`.
    fn mbuffer_append_bytes(&self, handle: i32, data_offset: i32, data_length: i32) -> i32;
    /// Appends a managed buffer to the return data; returns `0`.
    fn mbuffer_finish(&self, handle: i32) -> i32;
    /// Loads call argument `arg_id` into a managed buffer; returns `0`.
    fn mbuffer_get_argument(&self, arg_id: i32, handle: i32) -> i32;
    /// Storage write keyed and valued by managed buffers; returns the
    /// storage status code.
    fn mbuffer_storage_store(&self, key_handle: i32, value_handle: i32) -> i32;
    /// Storage read into a managed buffer; returns `0`.
    fn mbuffer_storage_load(&self, key_handle: i32, dest_handle: i32) -> i32;

    // --- managed big integers ---

    /// Allocates a bignum initialized to `small_value`; returns its handle.
    fn big_int_new(&self, small_value: i64) -> i32;
    /// Sets a bignum from an `i64`.
    fn big_int_set_int64(&self, dest_handle: i32, value: i64);
    /// Reads a bignum as `i64`; fails the call if it does not fit.
    fn big_int_get_int64(&self, handle: i32) -> i64;
    /// `dest = op1 + op2`.
    fn big_int_add(&self, dest_handle: i32, op1_handle: i32, op2_handle: i32);
    /// `dest = op1 - op2`.
    fn big_int_sub(&self, dest_handle: i32, op1_handle: i32, op2_handle: i32);
    /// `dest = op1 * op2`.
    fn big_int_mul(&self, dest_handle: i32, op1_handle: i32, op2_handle: i32);
    /// Sign of a bignum: `-1`, `0` or `1`.
    fn big_int_sign(&self, handle: i32) -> i32;
    /// Three-way comparison of two bignums.
    fn big_int_cmp(&self, op1_handle: i32, op2_handle: i32) -> i32;
    /// Copies a bignum's unsigned big-endian bytes into a managed buffer.
    fn big_int_to_buffer(&self, handle: i32, buffer_handle: i32);
    /// Loads call argument `arg_id` as an unsigned bignum.
    fn big_int_get_unsigned_argument(&self, arg_id: i32, handle: i32);
    /// Loads the call value into a bignum.
    fn big_int_get_call_value(&self, handle: i32);
    /// Appends a bignum's unsigned bytes to the return data.
    fn big_int_finish_unsigned(&self, handle: i32);
}
