//! Read-through adapter over the blockchain hook.
//!
//! Keeps no chain data of its own; its state is the stack of node-side
//! snapshots used to roll back exactly the failing sub-call.

use num_bigint::BigUint;
use std::rc::Rc;

use skein_vm_common::{
    Account, Address, BlockInfo, BlockchainHook, CallInput, CodeMetadata, HookError, VMOutput,
};

use crate::error::{HostError, HostResult};
use crate::state_stack::StateStack;

/// Chain access with transactional snapshots.
pub struct BlockchainContext {
    hook: Rc<dyn BlockchainHook>,
    snapshots: Vec<i32>,
}

impl BlockchainContext {
    /// Creates a context over the node's hook.
    pub fn new(hook: Rc<dyn BlockchainHook>) -> Self {
        BlockchainContext {
            hook,
            snapshots: Vec::new(),
        }
    }

    /// Fetches an account; absent accounts surface as a hook error.
    pub fn get_user_account(&self, address: &Address) -> HostResult<Account> {
        Ok(self.hook.get_user_account(address)?)
    }

    /// True if an account exists at `address`.
    pub fn account_exists(&self, address: &Address) -> bool {
        self.hook.account_exists(address)
    }

    /// Chain balance of `address`; absent accounts read as zero.
    pub fn get_balance(&self, address: &Address) -> BigUint {
        match self.hook.get_user_account(address) {
            Ok(account) => account.balance,
            Err(_) => BigUint::default(),
        }
    }

    /// Code of the contract at `address`.
    pub fn get_code(&self, address: &Address) -> HostResult<Vec<u8>> {
        let account = self.hook.get_user_account(address)?;
        if account.code.is_empty() {
            return Err(HostError::ContractNotFound);
        }
        Ok(account.code)
    }

    /// Code metadata of the contract at `address`; absent accounts read as
    /// all-flags-clear.
    pub fn get_code_metadata(&self, address: &Address) -> CodeMetadata {
        match self.hook.get_user_account(address) {
            Ok(account) => CodeMetadata::from_bytes(&account.code_metadata),
            Err(_) => CodeMetadata::default(),
        }
    }

    /// Owner of the contract at `address`.
    pub fn get_owner_address(&self, address: &Address) -> HostResult<Address> {
        Ok(self.hook.get_user_account(address)?.owner_address)
    }

    /// Derives the address of a contract deployed by `creator`, at its
    /// current chain nonce.
    pub fn new_address(&self, creator: &Address) -> HostResult<Address> {
        let nonce = self.account_nonce(creator)?;
        Ok(self.hook.new_address(creator, nonce)?)
    }

    /// Derives a deployment address at an explicit creator nonce; used
    /// when earlier deployments in the same transaction already bumped
    /// the staged nonce.
    pub fn new_address_at_nonce(&self, creator: &Address, nonce: u64) -> HostResult<Address> {
        Ok(self.hook.new_address(creator, nonce)?)
    }

    /// The creator's chain nonce; absent accounts read as zero.
    pub fn account_nonce(&self, address: &Address) -> HostResult<u64> {
        match self.hook.get_user_account(address) {
            Ok(account) => Ok(account.nonce),
            Err(HookError::AccountNotFound) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    /// Shard of `address`.
    pub fn get_shard_of_address(&self, address: &Address) -> u32 {
        self.hook.get_shard_of_address(address)
    }

    /// True if both addresses live in the same shard.
    pub fn same_shard(&self, left: &Address, right: &Address) -> bool {
        self.get_shard_of_address(left) == self.get_shard_of_address(right)
    }

    /// True if `address` carries contract code.
    pub fn is_smart_contract(&self, address: &Address) -> bool {
        self.hook.is_smart_contract(address)
    }

    /// True if a plain user may send value to `receiver`.
    pub fn is_payable(&self, sender: &Address, receiver: &Address) -> HostResult<bool> {
        Ok(self.hook.is_payable(sender, receiver)?)
    }

    /// Header of the block under construction.
    pub fn current_block(&self) -> BlockInfo {
        self.hook.current_block()
    }

    /// Header of the last committed block.
    pub fn last_block(&self) -> BlockInfo {
        self.hook.last_block()
    }

    /// State root hash of the last committed block.
    pub fn get_state_root_hash(&self) -> Vec<u8> {
        self.hook.get_state_root_hash()
    }

    /// Hash of the block at `nonce`.
    pub fn get_block_hash(&self, nonce: u64) -> Vec<u8> {
        self.hook.get_block_hash(nonce)
    }

    /// Reads one raw storage slot through the hook.
    pub fn get_storage_data(&self, address: &Address, key: &[u8]) -> HostResult<Vec<u8>> {
        Ok(self.hook.get_storage_data(address, key)?)
    }

    /// True if `function` names a protocol builtin.
    pub fn is_builtin_function(&self, function: &str) -> bool {
        self.hook.is_builtin_function(function)
    }

    /// Runs a protocol builtin through the hook.
    pub fn process_builtin_function(&self, input: &CallInput) -> HostResult<VMOutput> {
        Ok(self.hook.process_builtin_function(input)?)
    }

    /// Direct access to the hook for token queries.
    pub fn hook(&self) -> &dyn BlockchainHook {
        &*self.hook
    }

    /// Snapshot depth, used by tests to assert balanced push/pop.
    pub fn snapshot_depth(&self) -> usize {
        self.snapshots.len()
    }
}

impl StateStack for BlockchainContext {
    fn init_state(&mut self) {
        // Chain data lives in the hook; nothing to reset here.
    }

    fn push_state(&mut self) {
        self.snapshots.push(self.hook.get_snapshot());
    }

    fn pop_set_active_state(&mut self) {
        if let Some(snapshot) = self.snapshots.pop() {
            if let Err(err) = self.hook.revert_to_snapshot(snapshot) {
                log::error!("revert to snapshot failed: {}", err);
            }
        }
    }

    fn pop_discard(&mut self) {
        self.snapshots.pop();
    }

    fn clear_state_stack(&mut self) {
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct StubHook {
        reverted: RefCell<Vec<i32>>,
    }

    impl BlockchainHook for StubHook {
        fn get_user_account(&self, _address: &Address) -> Result<Account, HookError> {
            Err(HookError::AccountNotFound)
        }
        fn account_exists(&self, _address: &Address) -> bool {
            false
        }
        fn get_storage_data(&self, _address: &Address, _key: &[u8]) -> Result<Vec<u8>, HookError> {
            Ok(Vec::new())
        }
        fn new_address(&self, creator: &Address, nonce: u64) -> Result<Address, HookError> {
            let mut bytes = creator.0;
            bytes[0] = nonce as u8;
            Ok(Address(bytes))
        }
        fn get_shard_of_address(&self, address: &Address) -> u32 {
            address.0[31] as u32
        }
        fn is_smart_contract(&self, _address: &Address) -> bool {
            false
        }
        fn is_payable(&self, _sender: &Address, _receiver: &Address) -> Result<bool, HookError> {
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
        fn get_block_hash(&self, _nonce: u64) -> Vec<u8> {
            Vec::new()
        }
        fn get_snapshot(&self) -> i32 {
            42
        }
        fn revert_to_snapshot(&self, snapshot: i32) -> Result<(), HookError> {
            self.reverted.borrow_mut().push(snapshot);
            Ok(())
        }
        fn is_builtin_function(&self, _function: &str) -> bool {
            false
        }
        fn process_builtin_function(&self, _input: &CallInput) -> Result<VMOutput, HookError> {
            Ok(VMOutput::default())
        }
        fn get_esdt_token_data(
            &self,
            _address: &Address,
            _token: &[u8],
            _nonce: u64,
        ) -> Result<skein_vm_common::EsdtTokenData, HookError> {
            Ok(skein_vm_common::EsdtTokenData::default())
        }
        fn get_esdt_local_role_names(
            &self,
            _address: &Address,
            _token: &[u8],
        ) -> Result<Vec<Vec<u8>>, HookError> {
            Ok(Vec::new())
        }
        fn get_current_nft_nonce(&self, _address: &Address, _token: &[u8]) -> Result<u64, HookError> {
            Ok(0)
        }
    }

    #[test]
    fn test_snapshot_revert_on_pop_set_active() {
        let hook = Rc::new(StubHook::default());
        let mut ctx = BlockchainContext::new(hook.clone());

        ctx.push_state();
        ctx.push_state();
        assert_eq!(ctx.snapshot_depth(), 2);

        ctx.pop_discard();
        assert!(hook.reverted.borrow().is_empty());

        ctx.pop_set_active_state();
        assert_eq!(hook.reverted.borrow().as_slice(), &[42]);
        assert_eq!(ctx.snapshot_depth(), 0);
    }

    #[test]
    fn test_same_shard() {
        let ctx = BlockchainContext::new(Rc::new(StubHook::default()));
        let mut a = Address::ZERO;
        let mut b = Address::ZERO;
        a.0[31] = 1;
        b.0[31] = 1;
        assert!(ctx.same_shard(&a, &b));
        b.0[31] = 2;
        assert!(!ctx.same_shard(&a, &b));
    }

    #[test]
    fn test_missing_account_reads() {
        let ctx = BlockchainContext::new(Rc::new(StubHook::default()));
        let addr = Address([9u8; 32]);
        assert_eq!(ctx.get_balance(&addr), BigUint::default());
        assert_eq!(ctx.get_code_metadata(&addr), CodeMetadata::default());
        assert!(matches!(ctx.get_code(&addr), Err(HostError::Hook(_))));
    }
}
