//! Fixed-width account addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bytes in an account address.
pub const ADDRESS_LENGTH: usize = 32;

/// A 32-byte account address.
///
/// Both user accounts and smart contracts are identified by an `Address`.
/// The shard an address belongs to is a deterministic function of its bytes,
/// resolved through the blockchain hook; the address type itself carries no
/// shard information.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address, used as a placeholder before derivation.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Creates an address from a raw byte array.
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Address(bytes)
    }

    /// Creates an address from a byte slice.
    ///
    /// Returns `None` if the slice is not exactly [`ADDRESS_LENGTH`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; ADDRESS_LENGTH] = bytes.try_into().ok()?;
        Some(Address(arr))
    }

    /// Returns the raw bytes of the address.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if every byte of the address is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Address(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice() {
        assert_eq!(Address::from_slice(&[7u8; 32]), Some(Address([7u8; 32])));
        assert_eq!(Address::from_slice(&[7u8; 31]), None);
        assert_eq!(Address::from_slice(&[]), None);
    }

    #[test]
    fn test_zero() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address([1u8; 32]).is_zero());
    }

    #[test]
    fn test_debug_is_hex() {
        let addr = Address([0xABu8; 32]);
        let rendered = format!("{:?}", addr);
        assert!(rendered.contains("abababab"));
    }
}
