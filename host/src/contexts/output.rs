//! Accumulates the `VMOutput` under construction.
//!
//! Each synchronous frame owns a fresh output state; on success the child
//! state is merged into the parent (accounts summed, transfers/logs/return
//! data appended), on failure it is discarded wholesale. The final
//! `VMOutput` of a call is assembled here from the active state plus the
//! gas numbers supplied by the metering context.

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use std::collections::BTreeMap;

use skein_vm_common::{
    math, Address, CallType, LogEntry, OutputAccount, OutputTransfer, ReturnCode, StorageUpdate,
    VMOutput,
};

use crate::error::{HostError, HostResult};
use crate::state_stack::StateStack;

/// Staged data of a code deployment or upgrade.
#[derive(Debug, Clone, Default)]
pub struct CodeDeployInput {
    /// The bytecode being installed.
    pub contract_code: Vec<u8>,
    /// Two-byte metadata accompanying the code.
    pub contract_code_metadata: Vec<u8>,
    /// The account receiving the code.
    pub contract_address: Address,
    /// The account performing the deployment.
    pub code_deployer_address: Address,
}

#[derive(Debug, Default, Clone)]
struct OutputState {
    return_data: Vec<Vec<u8>>,
    return_code: ReturnCode,
    return_message: String,
    output_accounts: BTreeMap<Address, OutputAccount>,
    deleted_accounts: Vec<Address>,
    logs: Vec<LogEntry>,
    gas_refund: BigUint,
}

/// The output context.
#[derive(Debug, Default)]
pub struct OutputContext {
    state: OutputState,
    state_stack: Vec<OutputState>,
}

impl OutputContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        OutputContext::default()
    }

    /// Fetches or creates the output entry for `address`.
    pub fn account_mut(&mut self, address: Address) -> &mut OutputAccount {
        self.state
            .output_accounts
            .entry(address)
            .or_insert_with(|| OutputAccount::new(address))
    }

    /// The output entry for `address`, if touched.
    pub fn account(&self, address: &Address) -> Option<&OutputAccount> {
        self.state.output_accounts.get(address)
    }

    /// Removes a staged output account entirely.
    pub fn delete_output_account(&mut self, address: &Address) {
        self.state.output_accounts.remove(address);
    }

    /// Credits the transaction value to the called account.
    pub fn add_tx_value_to_account(&mut self, address: Address, value: &BigUint) {
        let delta = BigInt::from(value.clone());
        let account = self.account_mut(address);
        account.balance_delta += delta;
    }

    /// Current return code of the active frame.
    pub fn return_code(&self) -> ReturnCode {
        self.state.return_code
    }

    /// Sets the return code of the active frame.
    pub fn set_return_code(&mut self, code: ReturnCode) {
        self.state.return_code = code;
    }

    /// Current return message of the active frame.
    pub fn return_message(&self) -> &str {
        &self.state.return_message
    }

    /// Sets the return message of the active frame.
    pub fn set_return_message(&mut self, message: &str) {
        self.state.return_message = message.to_string();
    }

    /// Return data accumulated so far.
    pub fn return_data(&self) -> &[Vec<u8>] {
        &self.state.return_data
    }

    /// Appends bytes to the return data.
    pub fn finish(&mut self, data: Vec<u8>) {
        self.state.return_data.push(data);
    }

    /// Drops all return data. Idempotent.
    pub fn clean_return_data(&mut self) {
        self.state.return_data.clear();
    }

    /// Drops the return-data entry at `index`, ignoring out-of-range.
    pub fn delete_return_data(&mut self, index: usize) {
        if index < self.state.return_data.len() {
            self.state.return_data.remove(index);
        }
    }

    /// Appends a log entry.
    pub fn write_log(&mut self, address: Address, topics: Vec<Vec<u8>>, data: Vec<u8>) {
        let identifier = topics.first().cloned().unwrap_or_default();
        let indexed = if topics.is_empty() {
            Vec::new()
        } else {
            topics[1..].to_vec()
        };
        self.state.logs.push(LogEntry {
            identifier,
            address,
            topics: indexed,
            data,
        });
    }

    /// Appends a fully-formed log entry, used for the internal-errors log.
    pub fn write_log_entry(&mut self, entry: LogEntry) {
        self.state.logs.push(entry);
    }

    /// Adds to the storage gas refund.
    pub fn add_gas_refund(&mut self, amount: u64) {
        self.state.gas_refund += BigUint::from(amount);
    }

    /// True if `sender` can part with `value` given its chain balance:
    /// chain balance plus any staged delta must cover it.
    pub fn has_sufficient_balance(
        &self,
        sender: &Address,
        value: &BigUint,
        sender_chain_balance: &BigUint,
    ) -> bool {
        let delta = self
            .state
            .output_accounts
            .get(sender)
            .map(|acc| acc.balance_delta.clone())
            .unwrap_or_default();
        let available = BigInt::from(sender_chain_balance.clone()) + delta;
        available >= BigInt::from(value.clone())
    }

    /// Moves `value` from `sender` to `dest` in the balance deltas.
    ///
    /// Fails with `InsufficientFunds` if the sender cannot cover it. The
    /// conservation invariant is maintained by construction: the debit and
    /// the credit are equal.
    pub fn transfer_value_only(
        &mut self,
        dest: Address,
        sender: Address,
        value: &BigUint,
        sender_chain_balance: &BigUint,
    ) -> HostResult<()> {
        if !self.has_sufficient_balance(&sender, value, sender_chain_balance) {
            return Err(HostError::InsufficientFunds);
        }
        let value_int = BigInt::from(value.clone());
        self.account_mut(sender).balance_delta -= value_int.clone();
        self.account_mut(dest).balance_delta += value_int;
        Ok(())
    }

    /// Records an outgoing transfer with attached data and gas, debiting
    /// the sender and crediting the destination.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer(
        &mut self,
        dest: Address,
        sender: Address,
        gas_limit: u64,
        gas_locked: u64,
        value: &BigUint,
        async_data: Vec<u8>,
        data: Vec<u8>,
        call_type: CallType,
        sender_chain_balance: &BigUint,
    ) -> HostResult<()> {
        self.transfer_value_only(dest, sender, value, sender_chain_balance)?;
        self.account_mut(dest).output_transfers.push(OutputTransfer {
            value: value.clone(),
            gas_limit,
            gas_locked,
            async_data,
            data,
            call_type,
            sender_address: sender,
        });
        Ok(())
    }

    /// Stages account creation or code replacement.
    pub fn deploy_code(&mut self, input: CodeDeployInput) {
        let account = self.account_mut(input.contract_address);
        account.code = Some(input.contract_code);
        account.code_metadata = Some(input.contract_code_metadata);
        account.code_deployer_address = Some(input.code_deployer_address);
    }

    /// Schedules an account for deletion.
    pub fn delete_account(&mut self, address: Address) {
        self.state.deleted_accounts.push(address);
    }

    /// Reads a staged storage update, if any.
    pub fn storage_update(&self, address: &Address, key: &[u8]) -> Option<&StorageUpdate> {
        self.state
            .output_accounts
            .get(address)?
            .storage_updates
            .get(key)
    }

    /// Stages a storage update for `address`.
    pub fn set_storage_update(&mut self, address: Address, key: Vec<u8>, update: StorageUpdate) {
        self.account_mut(address).storage_updates.insert(key, update);
    }

    /// Drops every staged storage update whose final value equals the
    /// pre-call value (tracked through the `written` flag).
    pub fn remove_non_updated_storage(&mut self) {
        for account in self.state.output_accounts.values_mut() {
            account.storage_updates.retain(|_, update| update.written);
        }
    }

    /// Assembles the final `VMOutput` of a successful frame.
    ///
    /// `gas_spent_by_contract` covers everything this frame consumed,
    /// including what merged child frames already attributed to their own
    /// accounts. The executing account receives only the unattributed
    /// remainder, net of gas attached to outgoing transfers, so the
    /// per-account numbers partition the total and the gas invariant
    /// `gasProvided ≥ Σ gasUsed + Σ transfers.gasLimit + gasRemaining`
    /// holds.
    pub fn get_vm_output(
        &self,
        executing_address: Address,
        gas_remaining: u64,
        gas_spent_by_contract: u64,
    ) -> VMOutput {
        let mut output_accounts = self.state.output_accounts.clone();

        let forwarded: u64 = output_accounts
            .values()
            .flat_map(|acc| acc.output_transfers.iter())
            .fold(0u64, |total, transfer| {
                math::add_u64(total, math::add_u64(transfer.gas_limit, transfer.gas_locked))
            });
        let attributed: u64 = output_accounts
            .values()
            .fold(0u64, |total, acc| math::add_u64(total, acc.gas_used));

        let executing = output_accounts
            .entry(executing_address)
            .or_insert_with(|| OutputAccount::new(executing_address));
        executing.gas_used = math::add_u64(
            executing.gas_used,
            math::sub_u64(gas_spent_by_contract, math::add_u64(forwarded, attributed)),
        );

        VMOutput {
            return_code: self.state.return_code,
            return_message: self.state.return_message.clone(),
            gas_remaining,
            gas_refund: self.state.gas_refund.clone(),
            return_data: self.state.return_data.clone(),
            output_accounts,
            deleted_accounts: self.state.deleted_accounts.clone(),
            touched_accounts: Vec::new(),
            logs: self.state.logs.clone(),
        }
    }

    /// A failure `VMOutput` for `err`; every staged effect of the active
    /// frame is dropped, only the code and message survive.
    pub fn new_vm_output_in_case_of_error(&self, err: &HostError) -> VMOutput {
        let return_code = err.return_code();
        let message = if matches!(err, HostError::SignalError) && !self.state.return_message.is_empty()
        {
            self.state.return_message.clone()
        } else {
            err.to_string()
        };
        VMOutput::from_failure(return_code, &message)
    }

    /// Prepares the active state for a child frame after a push: staged
    /// storage updates, code and nonces stay visible (read-your-writes
    /// across frames), while everything additive starts fresh so the
    /// merge on return cannot double-count.
    pub fn censor_vm_output(&mut self) {
        self.state.return_data.clear();
        self.state.return_code = ReturnCode::Ok;
        self.state.return_message.clear();
        self.state.logs.clear();
        self.state.deleted_accounts.clear();
        self.state.gas_refund = BigUint::default();
        for account in self.state.output_accounts.values_mut() {
            account.balance_delta = BigInt::from(0);
            account.output_transfers.clear();
            account.gas_used = 0;
        }
    }

    /// Folds a ready-made `VMOutput` (from a builtin function) into the
    /// active state.
    pub fn add_to_active_state(&mut self, output: &VMOutput) {
        self.state.return_data.extend(output.return_data.iter().cloned());
        self.state.logs.extend(output.logs.iter().cloned());
        self.state
            .deleted_accounts
            .extend(output.deleted_accounts.iter().cloned());
        self.state.gas_refund += output.gas_refund.clone();
        for (address, account) in &output.output_accounts {
            merge_account(self.account_mut(*address), account);
        }
    }
}

fn merge_account(parent: &mut OutputAccount, child: &OutputAccount) {
    if !child.balance_delta.is_zero() {
        parent.balance_delta += child.balance_delta.clone();
    }
    if child.nonce > parent.nonce {
        parent.nonce = child.nonce;
    }
    for (key, update) in &child.storage_updates {
        parent.storage_updates.insert(key.clone(), update.clone());
    }
    if child.code.is_some() {
        parent.code = child.code.clone();
        parent.code_metadata = child.code_metadata.clone();
        parent.code_deployer_address = child.code_deployer_address;
    }
    parent
        .output_transfers
        .extend(child.output_transfers.iter().cloned());
    parent.gas_used = math::add_u64(parent.gas_used, child.gas_used);
}

impl StateStack for OutputContext {
    fn init_state(&mut self) {
        self.state = OutputState::default();
    }

    // The saved state is a clone: a child frame keeps seeing the staged
    // writes of its ancestors until it is discarded or merged.
    fn push_state(&mut self) {
        self.state_stack.push(self.state.clone());
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

impl OutputContext {
    /// Pops the parent state and merges the child frame into it: account
    /// effects are summed, transfers, logs and return data appended.
    pub fn pop_merge_active_state(&mut self) {
        let child = std::mem::take(&mut self.state);
        self.pop_set_active_state();

        for (address, account) in &child.output_accounts {
            merge_account(self.account_mut(*address), account);
        }
        self.state.return_data.extend(child.return_data);
        self.state.logs.extend(child.logs);
        self.state.deleted_accounts.extend(child.deleted_accounts);
        self.state.gas_refund += child.gas_refund;
        self.state.return_code = child.return_code;
        self.state.return_message = child.return_message;
    }
}
