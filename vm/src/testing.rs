//! In-memory chain backend and crypto stub for driving the engine in
//! tests, the way the no-op providers of the runtime crates support their
//! unit suites.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::time::Duration;

use num_bigint::BigUint;

use skein_vm_common::{
    Account, Address, BlockInfo, BlockchainHook, CallInput, CryptoHook, EsdtTokenData, HookError,
    HookResult, VMOutput,
};

type StorageMap = BTreeMap<(Address, Vec<u8>), Vec<u8>>;
type BuiltinHandler = Box<dyn Fn(&CallInput) -> HookResult<VMOutput>>;

/// An in-memory blockchain hook.
///
/// Accounts and storage live in plain maps; snapshots clone them, so a
/// revert restores exactly the snapshotted state. Failure-injection knobs
/// let resilience tests panic or stall inside a hook callback.
#[derive(Default)]
pub struct InMemoryBlockchain {
    accounts: RefCell<BTreeMap<Address, Account>>,
    storage: RefCell<StorageMap>,
    snapshots: RefCell<Vec<(BTreeMap<Address, Account>, StorageMap)>>,
    current_block: Cell<BlockInfo>,
    last_block: Cell<BlockInfo>,
    builtin_functions: RefCell<BTreeMap<String, BuiltinHandler>>,
    /// Panic inside the next storage read, proving host panic isolation.
    pub panic_on_storage_read: Cell<bool>,
    /// Stall every storage read, proving the watchdog.
    pub storage_read_delay: Cell<Option<Duration>>,
}

impl InMemoryBlockchain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        InMemoryBlockchain::default()
    }

    /// Inserts or replaces an account.
    pub fn put_account(&self, account: Account) {
        self.accounts.borrow_mut().insert(account.address, account);
    }

    /// Convenience: a contract account with the given code and balance.
    pub fn put_contract(&self, address: Address, code: &[u8], balance: u64, owner: Address) {
        self.put_account(Account {
            address,
            nonce: 0,
            balance: BigUint::from(balance),
            code: code.to_vec(),
            code_hash: code.to_vec(),
            code_metadata: vec![0b0000_0101, 0b0000_0110],
            owner_address: owner,
        });
    }

    /// Convenience: a plain user account.
    pub fn put_user(&self, address: Address, balance: u64) {
        self.put_account(Account {
            address,
            balance: BigUint::from(balance),
            ..Account::default()
        });
    }

    /// Writes a raw storage slot.
    pub fn put_storage(&self, address: Address, key: &[u8], value: &[u8]) {
        self.storage
            .borrow_mut()
            .insert((address, key.to_vec()), value.to_vec());
    }

    /// Reads a raw storage slot directly, bypassing the hook interface.
    pub fn storage_of(&self, address: Address, key: &[u8]) -> Vec<u8> {
        self.storage
            .borrow()
            .get(&(address, key.to_vec()))
            .cloned()
            .unwrap_or_default()
    }

    /// Sets both block headers.
    pub fn set_blocks(&self, last: BlockInfo, current: BlockInfo) {
        self.last_block.set(last);
        self.current_block.set(current);
    }

    /// Registers a builtin function handler.
    pub fn register_builtin(
        &self,
        name: &str,
        handler: impl Fn(&CallInput) -> HookResult<VMOutput> + 'static,
    ) {
        self.builtin_functions
            .borrow_mut()
            .insert(name.to_string(), Box::new(handler));
    }

    /// Applies a successful `VMOutput` to the chain state, the way a node
    /// would commit it between the async legs of a transaction.
    pub fn commit_output(&self, output: &VMOutput) {
        for (address, account) in &output.output_accounts {
            for (key, update) in &account.storage_updates {
                if update.data.is_empty() {
                    self.storage
                        .borrow_mut()
                        .remove(&(*address, key.clone()));
                } else {
                    self.put_storage(*address, key, &update.data);
                }
            }
        }
    }
}

impl BlockchainHook for InMemoryBlockchain {
    fn get_user_account(&self, address: &Address) -> HookResult<Account> {
        self.accounts
            .borrow()
            .get(address)
            .cloned()
            .ok_or(HookError::AccountNotFound)
    }

    fn account_exists(&self, address: &Address) -> bool {
        self.accounts.borrow().contains_key(address)
    }

    fn get_storage_data(&self, address: &Address, key: &[u8]) -> HookResult<Vec<u8>> {
        if self.panic_on_storage_read.get() {
            let absent: Option<u64> = None;
            // The faulty-node scenario: an unchecked access inside a hook.
            let _ = absent.unwrap();
        }
        if let Some(delay) = self.storage_read_delay.get() {
            std::thread::sleep(delay);
        }
        Ok(self
            .storage
            .borrow()
            .get(&(*address, key.to_vec()))
            .cloned()
            .unwrap_or_default())
    }

    fn new_address(&self, creator: &Address, creator_nonce: u64) -> HookResult<Address> {
        let mut bytes = creator.0;
        bytes[0..8].copy_from_slice(&creator_nonce.to_be_bytes());
        bytes[8] = 0x5C;
        // Deployed contracts stay in the creator's shard.
        bytes[31] = creator.0[31];
        Ok(Address(bytes))
    }

    fn get_shard_of_address(&self, address: &Address) -> u32 {
        address.0[31] as u32
    }

    fn is_smart_contract(&self, address: &Address) -> bool {
        self.accounts
            .borrow()
            .get(address)
            .map(|account| account.is_smart_contract())
            .unwrap_or(false)
    }

    fn is_payable(&self, _sender: &Address, receiver: &Address) -> HookResult<bool> {
        let accounts = self.accounts.borrow();
        let Some(account) = accounts.get(receiver) else {
            return Ok(true);
        };
        if !account.is_smart_contract() {
            return Ok(true);
        }
        let metadata = skein_vm_common::CodeMetadata::from_bytes(&account.code_metadata);
        Ok(metadata.payable)
    }

    fn current_block(&self) -> BlockInfo {
        self.current_block.get()
    }

    fn last_block(&self) -> BlockInfo {
        self.last_block.get()
    }

    fn get_state_root_hash(&self) -> Vec<u8> {
        vec![0x5C; 32]
    }

    fn get_block_hash(&self, nonce: u64) -> Vec<u8> {
        let mut hash = vec![0u8; 32];
        hash[24..].copy_from_slice(&nonce.to_be_bytes());
        hash
    }

    fn get_snapshot(&self) -> i32 {
        let mut snapshots = self.snapshots.borrow_mut();
        snapshots.push((self.accounts.borrow().clone(), self.storage.borrow().clone()));
        snapshots.len() as i32
    }

    fn revert_to_snapshot(&self, snapshot: i32) -> HookResult<()> {
        let mut snapshots = self.snapshots.borrow_mut();
        if snapshot < 1 || snapshot as usize > snapshots.len() {
            return Err(HookError::Other("unknown snapshot".to_string()));
        }
        snapshots.truncate(snapshot as usize);
        let (accounts, storage) = snapshots.pop().expect("snapshot bounds checked");
        *self.accounts.borrow_mut() = accounts;
        *self.storage.borrow_mut() = storage;
        Ok(())
    }

    fn is_builtin_function(&self, function: &str) -> bool {
        self.builtin_functions.borrow().contains_key(function)
    }

    fn process_builtin_function(&self, input: &CallInput) -> HookResult<VMOutput> {
        let builtins = self.builtin_functions.borrow();
        let handler = builtins
            .get(&input.function)
            .ok_or_else(|| HookError::BuiltinFunctionFailed("unknown builtin".to_string()))?;
        handler(input)
    }

    fn get_esdt_token_data(
        &self,
        _address: &Address,
        _token: &[u8],
        _nonce: u64,
    ) -> HookResult<EsdtTokenData> {
        Ok(EsdtTokenData::default())
    }

    fn get_esdt_local_role_names(
        &self,
        _address: &Address,
        _token: &[u8],
    ) -> HookResult<Vec<Vec<u8>>> {
        Ok(Vec::new())
    }

    fn get_current_nft_nonce(&self, _address: &Address, _token: &[u8]) -> HookResult<u64> {
        Ok(0)
    }
}

/// A deterministic, dependency-free crypto hook for tests: digests are
/// xor-folds, not cryptographic. Production nodes plug their own.
pub struct PlainCrypto;

fn fold_digest(data: &[u8], width: usize, seed: u8) -> Vec<u8> {
    let mut digest = vec![seed; width];
    for (i, byte) in data.iter().enumerate() {
        digest[i % width] ^= *byte;
        digest[(i + 7) % width] = digest[(i + 7) % width].rotate_left(3) ^ *byte;
    }
    digest
}

impl CryptoHook for PlainCrypto {
    fn sha256(&self, data: &[u8]) -> Vec<u8> {
        fold_digest(data, 32, 0x11)
    }

    fn keccak256(&self, data: &[u8]) -> Vec<u8> {
        fold_digest(data, 32, 0x22)
    }

    fn ripemd160(&self, data: &[u8]) -> Vec<u8> {
        fold_digest(data, 20, 0x33)
    }

    fn verify_ed25519(&self, _key: &[u8], _message: &[u8], _signature: &[u8]) -> HookResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_round_trip() {
        let chain = InMemoryBlockchain::new();
        let address = Address([1u8; 32]);
        chain.put_user(address, 100);
        chain.put_storage(address, b"k", b"v1");

        let snapshot = chain.get_snapshot();
        chain.put_storage(address, b"k", b"v2");
        assert_eq!(chain.storage_of(address, b"k"), b"v2");

        chain.revert_to_snapshot(snapshot).unwrap();
        assert_eq!(chain.storage_of(address, b"k"), b"v1");
    }

    #[test]
    fn test_new_address_keeps_shard() {
        let chain = InMemoryBlockchain::new();
        let mut creator = Address([7u8; 32]);
        creator.0[31] = 3;
        let derived = chain.new_address(&creator, 42).unwrap();
        assert_eq!(chain.get_shard_of_address(&derived), 3);
        assert_ne!(derived, creator);
    }

    #[test]
    fn test_payability_follows_metadata() {
        let chain = InMemoryBlockchain::new();
        let sc = Address([2u8; 32]);
        chain.put_account(Account {
            address: sc,
            code: vec![1],
            code_metadata: vec![0, 0],
            ..Account::default()
        });
        assert!(!chain.is_payable(&Address::ZERO, &sc).unwrap());

        chain.put_account(Account {
            address: sc,
            code: vec![1],
            code_metadata: vec![0, 0b10],
            ..Account::default()
        });
        assert!(chain.is_payable(&Address::ZERO, &sc).unwrap());
    }
}
