//! Guest-facing storage and transfer operations.
//!
//! These wrappers enforce the policies the raw contexts cannot see on
//! their own: the read-only flag, reserved-key protection, readability of
//! foreign storage, payability of destinations, and the gas consequences
//! of each operation.

use num_bigint::BigUint;

use skein_vm_common::{Address, CallType};

use crate::contexts::StorageStatus;
use crate::error::{HostError, HostResult};
use crate::vmhost::VMHost;

impl VMHost {
    /// Writes a storage slot on behalf of guest code.
    pub fn set_storage_guest(&self, key: &[u8], value: &[u8]) -> HostResult<StorageStatus> {
        if self.runtime().read_only() {
            return Err(HostError::InvalidCallOnReadOnlyMode);
        }

        let (status, gas) = {
            let schedule = *self.metering().schedule();
            let mut storage = self.storage_mut();
            let mut output = self.output_mut();
            let blockchain = self.blockchain();
            storage.set_storage(key, value, false, &mut output, &blockchain, &schedule)?
        };

        self.use_gas_bounded(gas.to_charge)?;
        if gas.to_refund > 0 {
            self.output_mut().add_gas_refund(gas.to_refund);
        }
        Ok(status)
    }

    /// Reads a storage slot of the executing contract, charging the warm
    /// or cold read cost.
    pub fn get_storage_guest(&self, key: &[u8]) -> HostResult<Vec<u8>> {
        let (value, warm) = {
            let mut storage = self.storage_mut();
            let output = self.output();
            let blockchain = self.blockchain();
            storage.get_storage(key, &output, &blockchain)?
        };

        let cost = {
            let schedule = self.metering();
            if warm {
                schedule.schedule().api_cost.cached_storage_load
            } else {
                schedule.schedule().api_cost.storage_load
            }
        };
        self.use_gas_bounded(cost)?;
        Ok(value)
    }

    /// Reads a storage slot of another account, subject to that account's
    /// `readable` metadata flag.
    pub fn get_storage_from_address_guest(
        &self,
        address: &Address,
        key: &[u8],
    ) -> HostResult<Vec<u8>> {
        let own_address = self.storage_mut().address();
        if *address != own_address {
            let metadata = self.blockchain().get_code_metadata(address);
            if !metadata.readable {
                return Err(HostError::StorageNotReadable);
            }
        }

        let (value, warm) = {
            let mut storage = self.storage_mut();
            let output = self.output();
            let blockchain = self.blockchain();
            storage.get_storage_from(address, key, &output, &blockchain)?
        };

        let cost = if warm {
            self.metering().schedule().api_cost.cached_storage_load
        } else {
            self.metering().schedule().api_cost.storage_load
        };
        self.use_gas_bounded(cost)?;
        Ok(value)
    }

    /// Arms a storage lock for guest code.
    pub fn set_storage_lock_guest(&self, key: &[u8], timestamp: u64) -> HostResult<()> {
        if self.runtime().read_only() {
            return Err(HostError::InvalidCallOnReadOnlyMode);
        }
        if crate::contexts::StorageContext::is_protected_key(key) {
            return Err(HostError::StoreReservedKey);
        }

        let gas = {
            let schedule = *self.metering().schedule();
            let mut storage = self.storage_mut();
            let mut output = self.output_mut();
            let blockchain = self.blockchain();
            let (_, gas) =
                storage.set_storage_lock(key, timestamp, &mut output, &blockchain, &schedule)?;
            gas
        };
        self.use_gas_bounded(gas.to_charge)?;
        Ok(())
    }

    /// Reads a storage lock's expiry; expired locks read as zero.
    pub fn get_storage_lock_guest(&self, key: &[u8]) -> HostResult<u64> {
        let current_timestamp = self.blockchain().current_block().timestamp;
        let mut storage = self.storage_mut();
        let output = self.output();
        let blockchain = self.blockchain();
        storage.get_storage_lock(key, current_timestamp, &output, &blockchain)
    }

    /// Clears a storage lock.
    pub fn clear_storage_lock_guest(&self, key: &[u8]) -> HostResult<()> {
        self.set_storage_lock_guest(key, 0)
    }

    /// Plain value transfer staged by guest code, with payability checks.
    pub fn transfer_value_guest(
        &self,
        destination: &Address,
        value: &BigUint,
        data: Vec<u8>,
    ) -> HostResult<()> {
        if self.runtime().read_only() {
            return Err(HostError::InvalidCallOnReadOnlyMode);
        }

        let sender = self.runtime().context_address();
        self.check_payable(&sender, destination, value, !data.is_empty())?;

        let sender_balance = self.blockchain().get_balance(&sender);
        self.output_mut().transfer(
            *destination,
            sender,
            0,
            0,
            value,
            Vec::new(),
            data,
            CallType::DirectCall,
            &sender_balance,
        )
    }

    /// Rejects value sent to a non-payable contract. Transfers carrying
    /// call data are execution attempts and are checked by the execution
    /// path instead.
    pub(crate) fn check_payable(
        &self,
        sender: &Address,
        destination: &Address,
        value: &BigUint,
        has_data: bool,
    ) -> HostResult<()> {
        if has_data || *value == BigUint::default() {
            return Ok(());
        }
        if !self.blockchain().is_smart_contract(destination) {
            return Ok(());
        }
        let payable = self.blockchain().is_payable(sender, destination)?;
        if !payable {
            return Err(HostError::AccountNotPayable);
        }
        Ok(())
    }
}
