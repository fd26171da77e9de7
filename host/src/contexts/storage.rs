//! Key-protected per-account storage.
//!
//! Every key is implicitly scoped to the address of the current execution
//! context. Reads go through the staged updates first (read-your-writes),
//! then the chain. Writes land in the output context as staged updates,
//! so a failing frame discards them together with the rest of its output.
//!
//! Keys beginning with the reserved prefix belong to the host; guest code
//! can neither write them directly nor through storage locks.

use std::collections::{HashMap, HashSet};

use skein_vm_common::{math, Address, StorageUpdate};

use crate::contexts::blockchain::BlockchainContext;
use crate::contexts::output::OutputContext;
use crate::error::{HostError, HostResult};
use crate::gas::GasSchedule;
use crate::state_stack::StateStack;

/// Reserved prefix for host-written keys.
pub const PROTECTED_KEY_PREFIX: &[u8] = b"ELROND";

/// Sub-prefix for storage-lock keys, under the reserved prefix.
pub const TIMELOCK_KEY_PREFIX: &[u8] = b"ELRONDtimelock";

/// Outcome of a storage write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    /// The value did not change.
    Unchanged,
    /// A new slot was created.
    Added,
    /// An existing slot changed value.
    Modified,
    /// An existing slot was emptied.
    Deleted,
}

/// Gas consequences of a storage operation, metered by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageGas {
    /// Gas to charge.
    pub to_charge: u64,
    /// Gas to refund for released bytes.
    pub to_refund: u64,
}

#[derive(Debug, Default, Clone)]
struct StorageState {
    address: Address,
    /// Chain values observed first, per key; the baseline for the
    /// `written` flag and for warm-read pricing.
    originals: HashMap<Vec<u8>, Vec<u8>>,
    warm_keys: HashSet<Vec<u8>>,
}

/// The storage context.
#[derive(Debug, Default)]
pub struct StorageContext {
    state: StorageState,
    state_stack: Vec<StorageState>,
}

impl StorageContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        StorageContext::default()
    }

    /// Binds the context to the account whose storage is addressed.
    pub fn set_address(&mut self, address: Address) {
        self.state.address = address;
    }

    /// The account whose storage is addressed.
    pub fn address(&self) -> Address {
        self.state.address
    }

    /// True if guest code may not write under `key`.
    pub fn is_protected_key(key: &[u8]) -> bool {
        key.starts_with(PROTECTED_KEY_PREFIX)
    }

    fn original_value(
        &mut self,
        blockchain: &BlockchainContext,
        address: &Address,
        key: &[u8],
    ) -> HostResult<Vec<u8>> {
        if let Some(value) = self.state.originals.get(key) {
            return Ok(value.clone());
        }
        let value = blockchain.get_storage_data(address, key)?;
        self.state.originals.insert(key.to_vec(), value.clone());
        Ok(value)
    }

    /// Reads a slot of the current account. Returns the value and whether
    /// the read was warm (key seen before in this frame).
    pub fn get_storage(
        &mut self,
        key: &[u8],
        output: &OutputContext,
        blockchain: &BlockchainContext,
    ) -> HostResult<(Vec<u8>, bool)> {
        let address = self.state.address;
        self.get_storage_from(&address, key, output, blockchain)
    }

    /// Reads a slot of an arbitrary account; reachability rules are the
    /// caller's concern.
    pub fn get_storage_from(
        &mut self,
        address: &Address,
        key: &[u8],
        output: &OutputContext,
        blockchain: &BlockchainContext,
    ) -> HostResult<(Vec<u8>, bool)> {
        let warm = !self.state.warm_keys.insert(key.to_vec());

        if let Some(update) = output.storage_update(address, key) {
            return Ok((update.data.clone(), warm));
        }
        let value = self.original_value(blockchain, address, key)?;
        Ok((value, warm))
    }

    /// Writes a slot of the current account, staging the update in the
    /// output context. Returns the status and the gas consequences.
    ///
    /// `host_internal` marks writes originating inside the engine (async
    /// record persistence); only those may touch reserved keys.
    pub fn set_storage(
        &mut self,
        key: &[u8],
        value: &[u8],
        host_internal: bool,
        output: &mut OutputContext,
        blockchain: &BlockchainContext,
        schedule: &GasSchedule,
    ) -> HostResult<(StorageStatus, StorageGas)> {
        if !host_internal && Self::is_protected_key(key) {
            return Err(HostError::StoreReservedKey);
        }

        let address = self.state.address;
        let current = match output.storage_update(&address, key) {
            Some(update) => update.data.clone(),
            None => self.original_value(blockchain, &address, key)?,
        };
        let original = self.original_value(blockchain, &address, key)?;

        let length_delta_charge = |longer: usize, shorter: usize| {
            let grown = math::sub_u64(longer as u64, shorter as u64);
            math::mul_u64(grown, schedule.base_operation_cost.store_per_byte)
        };

        let (status, gas) = if value == current.as_slice() {
            (StorageStatus::Unchanged, StorageGas::default())
        } else if current.is_empty() {
            let charge = math::mul_u64(
                value.len() as u64,
                schedule.base_operation_cost.store_per_byte,
            );
            (
                StorageStatus::Added,
                StorageGas {
                    to_charge: charge,
                    to_refund: 0,
                },
            )
        } else if value.is_empty() {
            let refund = math::mul_u64(
                current.len() as u64,
                schedule.base_operation_cost.release_per_byte,
            );
            (
                StorageStatus::Deleted,
                StorageGas {
                    to_charge: 0,
                    to_refund: refund,
                },
            )
        } else if value.len() > current.len() {
            let charge = math::add_u64(
                length_delta_charge(value.len(), current.len()),
                math::mul_u64(
                    current.len() as u64,
                    schedule.base_operation_cost.persist_per_byte,
                ),
            );
            (
                StorageStatus::Modified,
                StorageGas {
                    to_charge: charge,
                    to_refund: 0,
                },
            )
        } else {
            let charge = math::mul_u64(
                value.len() as u64,
                schedule.base_operation_cost.persist_per_byte,
            );
            let refund = math::mul_u64(
                math::sub_u64(current.len() as u64, value.len() as u64),
                schedule.base_operation_cost.release_per_byte,
            );
            (
                StorageStatus::Modified,
                StorageGas {
                    to_charge: charge,
                    to_refund: refund,
                },
            )
        };

        output.set_storage_update(
            address,
            key.to_vec(),
            StorageUpdate {
                data: value.to_vec(),
                written: value != original.as_slice(),
            },
        );
        self.state.warm_keys.insert(key.to_vec());

        Ok((status, gas))
    }

    /// The timelock key guarding `key`.
    pub fn timelock_key(key: &[u8]) -> Vec<u8> {
        let mut out = TIMELOCK_KEY_PREFIX.to_vec();
        out.extend_from_slice(key);
        out
    }

    /// Arms a storage lock on `key` until `timestamp`.
    pub fn set_storage_lock(
        &mut self,
        key: &[u8],
        timestamp: u64,
        output: &mut OutputContext,
        blockchain: &BlockchainContext,
        schedule: &GasSchedule,
    ) -> HostResult<(StorageStatus, StorageGas)> {
        let lock_key = Self::timelock_key(key);
        let value = timestamp.to_be_bytes();
        self.set_storage(&lock_key, &value, true, output, blockchain, schedule)
    }

    /// Reads the lock expiry for `key`. Expired locks read as zero.
    pub fn get_storage_lock(
        &mut self,
        key: &[u8],
        current_timestamp: u64,
        output: &OutputContext,
        blockchain: &BlockchainContext,
    ) -> HostResult<u64> {
        let lock_key = Self::timelock_key(key);
        let (value, _) = self.get_storage(&lock_key, output, blockchain)?;
        if value.is_empty() {
            return Ok(0);
        }
        let mut bytes = [0u8; 8];
        let copy_len = value.len().min(8);
        bytes[8usize.saturating_sub(copy_len)..].copy_from_slice(&value[..copy_len]);
        let timelock = u64::from_be_bytes(bytes);
        if timelock <= current_timestamp {
            return Ok(0);
        }
        Ok(timelock)
    }
}

impl StateStack for StorageContext {
    fn init_state(&mut self) {
        self.state = StorageState::default();
    }

    fn push_state(&mut self) {
        self.state_stack.push(std::mem::take(&mut self.state));
    }

    fn pop_set_active_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.state = state;
        }
    }

    fn pop_discard(&mut self) {
        self.state_stack.pop();
    }

    fn clear_state_stack(&mut self) {
        self.state_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::blockchain::BlockchainContext;
    use skein_vm_common::{
        Account, BlockInfo, BlockchainHook, CallInput, EsdtTokenData, HookError, VMOutput,
    };
    use std::collections::HashMap as Map;
    use std::rc::Rc;

    #[derive(Default)]
    struct ChainStub {
        storage: Map<Vec<u8>, Vec<u8>>,
    }

    impl BlockchainHook for ChainStub {
        fn get_user_account(&self, _a: &Address) -> Result<Account, HookError> {
            Err(HookError::AccountNotFound)
        }
        fn account_exists(&self, _a: &Address) -> bool {
            false
        }
        fn get_storage_data(&self, _a: &Address, key: &[u8]) -> Result<Vec<u8>, HookError> {
            Ok(self.storage.get(key).cloned().unwrap_or_default())
        }
        fn new_address(&self, c: &Address, _n: u64) -> Result<Address, HookError> {
            Ok(*c)
        }
        fn get_shard_of_address(&self, _a: &Address) -> u32 {
            0
        }
        fn is_smart_contract(&self, _a: &Address) -> bool {
            false
        }
        fn is_payable(&self, _s: &Address, _r: &Address) -> Result<bool, HookError> {
            Ok(true)
        }
        fn current_block(&self) -> BlockInfo {
            BlockInfo::default()
        }
        fn last_block(&self) -> BlockInfo {
            BlockInfo::default()
        }
        fn get_state_root_hash(&self) -> Vec<u8> {
            Vec::new()
        }
        fn get_block_hash(&self, _n: u64) -> Vec<u8> {
            Vec::new()
        }
        fn get_snapshot(&self) -> i32 {
            0
        }
        fn revert_to_snapshot(&self, _s: i32) -> Result<(), HookError> {
            Ok(())
        }
        fn is_builtin_function(&self, _f: &str) -> bool {
            false
        }
        fn process_builtin_function(&self, _i: &CallInput) -> Result<VMOutput, HookError> {
            Ok(VMOutput::default())
        }
        fn get_esdt_token_data(
            &self,
            _a: &Address,
            _t: &[u8],
            _n: u64,
        ) -> Result<EsdtTokenData, HookError> {
            Ok(EsdtTokenData::default())
        }
        fn get_esdt_local_role_names(
            &self,
            _a: &Address,
            _t: &[u8],
        ) -> Result<Vec<Vec<u8>>, HookError> {
            Ok(Vec::new())
        }
        fn get_current_nft_nonce(&self, _a: &Address, _t: &[u8]) -> Result<u64, HookError> {
            Ok(0)
        }
    }

    fn setup(chain: ChainStub) -> (StorageContext, OutputContext, BlockchainContext, GasSchedule) {
        let mut storage = StorageContext::new();
        storage.set_address(Address([1u8; 32]));
        (
            storage,
            OutputContext::new(),
            BlockchainContext::new(Rc::new(chain)),
            GasSchedule::default(),
        )
    }

    #[test]
    fn test_write_then_read_back() {
        let (mut storage, mut output, blockchain, schedule) = setup(ChainStub::default());

        let (status, gas) = storage
            .set_storage(b"key", b"value", false, &mut output, &blockchain, &schedule)
            .unwrap();
        assert_eq!(status, StorageStatus::Added);
        assert_eq!(
            gas.to_charge,
            5 * schedule.base_operation_cost.store_per_byte
        );

        let (value, _) = storage.get_storage(b"key", &output, &blockchain).unwrap();
        assert_eq!(value, b"value");
    }

    #[test]
    fn test_unknown_key_reads_empty() {
        let (mut storage, output, blockchain, _) = setup(ChainStub::default());
        let (value, warm) = storage.get_storage(b"ghost", &output, &blockchain).unwrap();
        assert!(value.is_empty());
        assert!(!warm);

        let (_, warm) = storage.get_storage(b"ghost", &output, &blockchain).unwrap();
        assert!(warm);
    }

    #[test]
    fn test_statuses_and_refunds() {
        let mut chain = ChainStub::default();
        chain.storage.insert(b"key".to_vec(), b"original".to_vec());
        let (mut storage, mut output, blockchain, schedule) = setup(chain);

        // Same value: unchanged, free.
        let (status, gas) = storage
            .set_storage(b"key", b"original", false, &mut output, &blockchain, &schedule)
            .unwrap();
        assert_eq!(status, StorageStatus::Unchanged);
        assert_eq!(gas, StorageGas::default());

        // Shrink: modified with a refund for the released bytes.
        let (status, gas) = storage
            .set_storage(b"key", b"orig", false, &mut output, &blockchain, &schedule)
            .unwrap();
        assert_eq!(status, StorageStatus::Modified);
        assert_eq!(
            gas.to_refund,
            4 * schedule.base_operation_cost.release_per_byte
        );

        // Empty: deleted, full refund of the remaining bytes.
        let (status, gas) = storage
            .set_storage(b"key", b"", false, &mut output, &blockchain, &schedule)
            .unwrap();
        assert_eq!(status, StorageStatus::Deleted);
        assert_eq!(
            gas.to_refund,
            4 * schedule.base_operation_cost.release_per_byte
        );
    }

    #[test]
    fn test_written_flag_tracks_original_value() {
        let mut chain = ChainStub::default();
        chain.storage.insert(b"key".to_vec(), b"original".to_vec());
        let (mut storage, mut output, blockchain, schedule) = setup(chain);
        let address = storage.address();

        storage
            .set_storage(b"key", b"changed", false, &mut output, &blockchain, &schedule)
            .unwrap();
        assert!(output.storage_update(&address, b"key").unwrap().written);

        // Writing the original value back flips the flag off again, so the
        // no-op elision pass will drop the entry.
        storage
            .set_storage(b"key", b"original", false, &mut output, &blockchain, &schedule)
            .unwrap();
        assert!(!output.storage_update(&address, b"key").unwrap().written);
    }

    #[test]
    fn test_protected_key_rejected_for_guests() {
        let (mut storage, mut output, blockchain, schedule) = setup(ChainStub::default());

        let mut key = PROTECTED_KEY_PREFIX.to_vec();
        key.extend_from_slice(b"config");
        let err = storage
            .set_storage(&key, b"x", false, &mut output, &blockchain, &schedule)
            .unwrap_err();
        assert_eq!(err, HostError::StoreReservedKey);

        // The host-internal path may write it.
        assert!(storage
            .set_storage(&key, b"x", true, &mut output, &blockchain, &schedule)
            .is_ok());
    }

    #[test]
    fn test_storage_lock_expiry_reads_zero() {
        let (mut storage, mut output, blockchain, schedule) = setup(ChainStub::default());

        storage
            .set_storage_lock(b"key", 1_000, &mut output, &blockchain, &schedule)
            .unwrap();

        let live = storage
            .get_storage_lock(b"key", 500, &output, &blockchain)
            .unwrap();
        assert_eq!(live, 1_000);

        let expired = storage
            .get_storage_lock(b"key", 1_000, &output, &blockchain)
            .unwrap();
        assert_eq!(expired, 0);
    }
}
