//! Host-side errors and their mapping to return codes.

use thiserror::Error;

use skein_executor::ExecutorError;
use skein_vm_common::{HookError, ReturnCode};

/// Result alias for host operations.
pub type HostResult<T> = Result<T, HostError>;

/// Everything that can go wrong while executing a call.
///
/// These never cross into guest code: host functions convert them into
/// breakpoints, and the top-level dispatcher converts them into a failure
/// `VMOutput` via [`HostError::return_code`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The host is shutting down and rejects new calls.
    #[error("vm is closing")]
    VMIsClosing,

    /// No executor was wired before the first call.
    #[error("executor not set")]
    ExecutorNotSet,

    /// A panic escaped guest execution or a hook.
    #[error("execution panicked")]
    ExecutionPanicked,

    /// The watchdog stopped the call.
    #[error("execution failed with timeout")]
    ExecutionFailedWithTimeout,

    /// Generic execution failure.
    #[error("execution failed")]
    ExecutionFailed,

    /// The bytecode failed validation or instantiation.
    #[error("contract invalid")]
    ContractInvalid,

    /// No code found at the called address.
    #[error("contract not found")]
    ContractNotFound,

    /// Gas exhausted.
    #[error("not enough gas")]
    NotEnoughGas,

    /// The synchronous instance stack hit its bound.
    #[error("max instances reached")]
    MaxInstancesReached,

    /// The guest exceeded its memory allowance.
    #[error("memory limit reached")]
    MemoryLimit,

    /// The guest signalled an error; the message lives in the output
    /// context.
    #[error("error signalled by smartcontract")]
    SignalError,

    /// The named export does not exist.
    #[error("function not found")]
    FunctionNotFound,

    /// The export exists but is not callable as an endpoint.
    #[error("invalid function")]
    InvalidFunction,

    /// `init` was called outside deploy/upgrade.
    #[error("it is not allowed to call init in this context")]
    InitFuncCalledInRun,

    /// `callBack` was called outside an async callback.
    #[error("it is not allowed to call callBack directly")]
    CallBackFuncCalledInRun,

    /// Upgrade denied: not upgradeable or caller is not the owner.
    #[error("upgrade not allowed")]
    UpgradeNotAllowed,

    /// Upgrade arguments could not be decoded.
    #[error("invalid upgrade arguments")]
    InvalidUpgradeArguments,

    /// The nested call returned a non-Ok code.
    #[error("return code is not ok")]
    ReturnCodeNotOk,

    /// Builtin functions cannot run on the same context.
    #[error("builtin function called with execute on same context")]
    BuiltinCallOnSameContextDisallowed,

    /// State mutation attempted under the read-only flag.
    #[error("operation not permitted in read only mode")]
    InvalidCallOnReadOnlyMode,

    /// Cross-account storage read denied by the target's metadata.
    #[error("storage of another account is not readable")]
    StorageNotReadable,

    /// Synchronous execution requires both parties in one shard.
    #[error("sync execution request is not in the same shard")]
    SyncExecutionNotInSameShard,

    /// Indirect deployment hit an existing account.
    #[error("deployment over existing account")]
    DeploymentOverExistingAccount,

    /// The sender cannot cover the transferred value.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Value sent to a non-payable contract.
    #[error("sending value to non payable contract")]
    AccountNotPayable,

    /// A transfer could not be composed.
    #[error("failed transfer")]
    FailedTransfer,

    /// A length argument from guest memory was negative.
    #[error("negative length")]
    NegativeLength,

    /// An argument index was out of range.
    #[error("argument index out of range")]
    ArgumentIndexOutOfRange,

    /// A token-transfer index was out of range.
    #[error("invalid token index")]
    InvalidTokenIndex,

    /// A managed-type handle did not resolve.
    #[error("no managed value under the given handle")]
    NoManagedValueUnderHandle,

    /// A bignum did not fit the requested integer width.
    #[error("big int cannot be represented as int64")]
    BigIntCannotBeRepresentedAsInt64,

    /// Guest write attempted under the reserved key prefix.
    #[error("cannot write to storage under reserved key")]
    StoreReservedKey,

    /// The storage key is locked.
    #[error("storage is locked")]
    StorageLocked,

    /// Only one legacy async call may be registered.
    #[error("only one legacy async call allowed")]
    OnlyOneLegacyAsyncCallAllowed,

    /// The async call group already completed or never existed.
    #[error("async call group does not exist")]
    AsyncCallGroupDoesNotExist,

    /// No async call matches the incoming callback.
    #[error("async call not found")]
    AsyncCallNotFound,

    /// The async record could not be loaded from storage.
    #[error("async context does not exist in storage")]
    AsyncContextNotFound,

    /// The async record could not be serialized or deserialized.
    #[error("async state serialization failed: {0}")]
    AsyncSerializationFailed(String),

    /// The call type is not recognised by the dispatcher.
    #[error("unknown call type")]
    UnknownCallType,

    /// Code metadata sets reserved bits or has the wrong length.
    #[error("invalid code metadata")]
    InvalidCodeMetadata,

    /// Wrapped executor failure.
    #[error("executor: {0}")]
    Executor(#[from] ExecutorError),

    /// Wrapped blockchain-hook failure.
    #[error("blockchain hook: {0}")]
    Hook(#[from] HookError),
}

impl HostError {
    /// The return code this error maps to in a failure `VMOutput`.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            HostError::NotEnoughGas => ReturnCode::OutOfGas,
            HostError::SignalError => ReturnCode::UserError,
            HostError::FunctionNotFound => ReturnCode::FunctionNotFound,
            HostError::InvalidFunction => ReturnCode::FunctionWrongSignature,
            HostError::ContractInvalid | HostError::ContractNotFound | HostError::InvalidCodeMetadata => {
                ReturnCode::ContractInvalid
            }
            HostError::InsufficientFunds => ReturnCode::OutOfFunds,
            HostError::DeploymentOverExistingAccount => ReturnCode::AccountCollision,
            HostError::UpgradeNotAllowed | HostError::InvalidUpgradeArguments => {
                ReturnCode::UpgradeFailed
            }
            HostError::InitFuncCalledInRun
            | HostError::CallBackFuncCalledInRun
            | HostError::InvalidCallOnReadOnlyMode
            | HostError::AccountNotPayable
            | HostError::StorageNotReadable
            | HostError::StoreReservedKey => ReturnCode::UserError,
            _ => ReturnCode::ExecutionFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_mapping() {
        assert_eq!(HostError::NotEnoughGas.return_code(), ReturnCode::OutOfGas);
        assert_eq!(HostError::SignalError.return_code(), ReturnCode::UserError);
        assert_eq!(
            HostError::FunctionNotFound.return_code(),
            ReturnCode::FunctionNotFound
        );
        assert_eq!(
            HostError::ContractInvalid.return_code(),
            ReturnCode::ContractInvalid
        );
        assert_eq!(
            HostError::DeploymentOverExistingAccount.return_code(),
            ReturnCode::AccountCollision
        );
        assert_eq!(
            HostError::ExecutionFailedWithTimeout.return_code(),
            ReturnCode::ExecutionFailed
        );
        assert_eq!(
            HostError::UpgradeNotAllowed.return_code(),
            ReturnCode::UpgradeFailed
        );
    }
}
