//! Traits through which the engine reaches the enclosing node.
//!
//! The engine never touches chain state directly. The node injects a
//! [`BlockchainHook`] implementation at host construction; everything the
//! engine needs from the chain — accounts, balances, code, shard layout,
//! builtin functions, block info — flows through it. A [`CryptoHook`]
//! covers the hashing primitives the VM-API exposes.
//!
//! Implementations must be deterministic for a given chain state; the hook
//! is the only shared mutable resource and must be thread-safe if several
//! hosts run against it concurrently.

use num_bigint::BigUint;
use thiserror::Error;

use crate::address::Address;
use crate::input::CallInput;
use crate::output::VMOutput;
use crate::tokens::EsdtTokenData;

/// Errors surfaced by hook implementations.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum HookError {
    /// The requested account does not exist.
    #[error("account not found")]
    AccountNotFound,
    /// A builtin function rejected its input.
    #[error("builtin function failed: {0}")]
    BuiltinFunctionFailed(String),
    /// Any other node-side failure.
    #[error("{0}")]
    Other(String),
}

/// Result alias for hook calls.
pub type HookResult<T> = Result<T, HookError>;

/// A user or contract account as seen by the engine.
#[derive(Debug, Clone, Default)]
pub struct Account {
    /// The account address.
    pub address: Address,
    /// Current nonce.
    pub nonce: u64,
    /// Native balance.
    pub balance: BigUint,
    /// Contract code, empty for user accounts.
    pub code: Vec<u8>,
    /// Hash of the contract code.
    pub code_hash: Vec<u8>,
    /// Two-byte code metadata.
    pub code_metadata: Vec<u8>,
    /// Owner of the contract, for upgrade permission checks.
    pub owner_address: Address,
}

impl Account {
    /// True if the account carries contract code.
    pub fn is_smart_contract(&self) -> bool {
        !self.code.is_empty()
    }
}

/// Header fields of one block.
#[derive(Debug, Clone, Copy)]
pub struct BlockInfo {
    /// Block timestamp, seconds.
    pub timestamp: u64,
    /// Block nonce (height).
    pub nonce: u64,
    /// Consensus round.
    pub round: u64,
    /// Epoch number.
    pub epoch: u32,
    /// Random seed of the block.
    pub random_seed: [u8; 48],
}

impl Default for BlockInfo {
    fn default() -> Self {
        Self {
            timestamp: 0,
            nonce: 0,
            round: 0,
            epoch: 0,
            random_seed: [0u8; 48],
        }
    }
}

/// Snapshot identifier for transactional revert of node-side state.
pub type Snapshot = i32;

/// The node-side chain adapter.
pub trait BlockchainHook {
    /// Fetches an account by address.
    fn get_user_account(&self, address: &Address) -> HookResult<Account>;

    /// True if an account exists at `address`.
    fn account_exists(&self, address: &Address) -> bool;

    /// Reads one storage slot of `address`. Unknown keys read as empty.
    fn get_storage_data(&self, address: &Address, key: &[u8]) -> HookResult<Vec<u8>>;

    /// Derives the address for a contract deployed by `creator` at its
    /// current nonce.
    fn new_address(&self, creator: &Address, creator_nonce: u64) -> HookResult<Address>;

    /// Shard holding `address`.
    fn get_shard_of_address(&self, address: &Address) -> u32;

    /// True if `address` carries contract code.
    fn is_smart_contract(&self, address: &Address) -> bool;

    /// True if value can be transferred to `address` by a plain user.
    fn is_payable(&self, sender: &Address, receiver: &Address) -> HookResult<bool>;

    /// Header of the block under construction.
    fn current_block(&self) -> BlockInfo;

    /// Header of the last committed block.
    fn last_block(&self) -> BlockInfo;

    /// State root hash of the last committed block.
    fn get_state_root_hash(&self) -> Vec<u8>;

    /// Hash of the block at `nonce`, empty if unavailable.
    fn get_block_hash(&self, nonce: u64) -> Vec<u8>;

    /// Opens a snapshot of node-side state.
    fn get_snapshot(&self) -> Snapshot;

    /// Reverts node-side state to `snapshot`.
    fn revert_to_snapshot(&self, snapshot: Snapshot) -> HookResult<()>;

    /// True if `function` names a protocol builtin function.
    fn is_builtin_function(&self, function: &str) -> bool;

    /// Executes a protocol builtin function.
    fn process_builtin_function(&self, input: &CallInput) -> HookResult<VMOutput>;

    /// ESDT balance/instance data of `address` for `token`/`nonce`.
    fn get_esdt_token_data(
        &self,
        address: &Address,
        token: &[u8],
        nonce: u64,
    ) -> HookResult<EsdtTokenData>;

    /// Names of the local ESDT roles `address` holds for `token`.
    fn get_esdt_local_role_names(&self, address: &Address, token: &[u8])
        -> HookResult<Vec<Vec<u8>>>;

    /// Current NFT nonce counter of `address` for `token`.
    fn get_current_nft_nonce(&self, address: &Address, token: &[u8]) -> HookResult<u64>;
}

/// Hashing primitives exposed to contracts.
///
/// Implementations live in the node; the engine only forwards calls.
pub trait CryptoHook {
    /// SHA-256 digest.
    fn sha256(&self, data: &[u8]) -> Vec<u8>;
    /// Keccak-256 digest.
    fn keccak256(&self, data: &[u8]) -> Vec<u8>;
    /// RIPEMD-160 digest.
    fn ripemd160(&self, data: &[u8]) -> Vec<u8>;
    /// Ed25519 signature verification.
    fn verify_ed25519(&self, key: &[u8], message: &[u8], signature: &[u8]) -> HookResult<()>;
}
