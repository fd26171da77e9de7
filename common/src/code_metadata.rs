//! Contract code metadata flags.

use serde::{Deserialize, Serialize};

/// Length in bytes of the serialized metadata.
pub const CODE_METADATA_LENGTH: usize = 2;

const METADATA_UPGRADEABLE: u8 = 0b0000_0001; // byte 0
const METADATA_READABLE: u8 = 0b0000_0100; // byte 0
const METADATA_PAYABLE: u8 = 0b0000_0010; // byte 1
const METADATA_PAYABLE_BY_SC: u8 = 0b0000_0100; // byte 1

/// Deploy-time flags attached to a contract's code.
///
/// Serialized as exactly two bytes. Byte 0 carries `upgradeable` and
/// `readable`, byte 1 carries `payable` and `payable_by_sc`. All remaining
/// bits are reserved and must be zero when a contract is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeMetadata {
    /// The contract may be upgraded by its owner.
    pub upgradeable: bool,
    /// Other contracts may read this contract's storage.
    pub readable: bool,
    /// The contract accepts value transfers from user accounts.
    pub payable: bool,
    /// The contract accepts value transfers from other contracts.
    pub payable_by_sc: bool,
}

impl CodeMetadata {
    /// Decodes metadata from its two-byte representation.
    ///
    /// Slices shorter than two bytes decode as all-flags-clear; extra bytes
    /// are ignored. Reserved bits are dropped silently here; deploy paths
    /// must call [`CodeMetadata::has_reserved_bits`] first.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let b0 = bytes.first().copied().unwrap_or(0);
        let b1 = bytes.get(1).copied().unwrap_or(0);
        CodeMetadata {
            upgradeable: b0 & METADATA_UPGRADEABLE != 0,
            readable: b0 & METADATA_READABLE != 0,
            payable: b1 & METADATA_PAYABLE != 0,
            payable_by_sc: b1 & METADATA_PAYABLE_BY_SC != 0,
        }
    }

    /// Encodes the metadata into its two-byte representation.
    pub fn to_bytes(&self) -> [u8; CODE_METADATA_LENGTH] {
        let mut b0 = 0u8;
        let mut b1 = 0u8;
        if self.upgradeable {
            b0 |= METADATA_UPGRADEABLE;
        }
        if self.readable {
            b0 |= METADATA_READABLE;
        }
        if self.payable {
            b1 |= METADATA_PAYABLE;
        }
        if self.payable_by_sc {
            b1 |= METADATA_PAYABLE_BY_SC;
        }
        [b0, b1]
    }

    /// Returns true if `bytes` sets any bit outside the defined flags, or
    /// has a length other than two.
    pub fn has_reserved_bits(bytes: &[u8]) -> bool {
        if bytes.len() != CODE_METADATA_LENGTH {
            return true;
        }
        let b0_mask = METADATA_UPGRADEABLE | METADATA_READABLE;
        let b1_mask = METADATA_PAYABLE | METADATA_PAYABLE_BY_SC;
        bytes[0] & !b0_mask != 0 || bytes[1] & !b1_mask != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let all = CodeMetadata {
            upgradeable: true,
            readable: true,
            payable: true,
            payable_by_sc: true,
        };
        assert_eq!(CodeMetadata::from_bytes(&all.to_bytes()), all);

        let none = CodeMetadata::default();
        assert_eq!(none.to_bytes(), [0, 0]);
        assert_eq!(CodeMetadata::from_bytes(&[0, 0]), none);
    }

    #[test]
    fn test_individual_bits() {
        let meta = CodeMetadata::from_bytes(&[0b0000_0101, 0]);
        assert!(meta.upgradeable);
        assert!(meta.readable);
        assert!(!meta.payable);

        let meta = CodeMetadata::from_bytes(&[0, 0b0000_0110]);
        assert!(meta.payable);
        assert!(meta.payable_by_sc);
    }

    #[test]
    fn test_reserved_bits() {
        assert!(!CodeMetadata::has_reserved_bits(&[0b101, 0b110]));
        assert!(CodeMetadata::has_reserved_bits(&[0b1000, 0]));
        assert!(CodeMetadata::has_reserved_bits(&[0, 0b0000_1000]));
        assert!(CodeMetadata::has_reserved_bits(&[0]));
        assert!(CodeMetadata::has_reserved_bits(&[0, 0, 0]));
    }

    #[test]
    fn test_short_input_decodes_empty() {
        assert_eq!(CodeMetadata::from_bytes(&[]), CodeMetadata::default());
    }
}
