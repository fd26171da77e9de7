//! ESDT token transfer types.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Kind of an ESDT token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EsdtTokenType {
    /// Divisible token with no per-unit identity.
    #[default]
    Fungible,
    /// Unique token; nonce identifies the single instance.
    NonFungible,
    /// Multiple instances per nonce.
    SemiFungible,
    /// Fungible token with NFT-style attributes.
    Meta,
}

impl EsdtTokenType {
    /// Numeric encoding used across the VM-API.
    pub fn as_u32(&self) -> u32 {
        match self {
            EsdtTokenType::Fungible => 0,
            EsdtTokenType::NonFungible => 1,
            EsdtTokenType::SemiFungible => 2,
            EsdtTokenType::Meta => 3,
        }
    }
}

/// One token transfer accompanying a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EsdtTransfer {
    /// Token identifier, e.g. `WSKN-1a2b3c`.
    pub token_name: Vec<u8>,
    /// Instance nonce; zero for fungible tokens.
    pub nonce: u64,
    /// Amount transferred.
    pub value: BigUint,
    /// Kind of the transferred token.
    pub token_type: EsdtTokenType,
}

/// Token instance data returned by the blockchain hook.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EsdtTokenData {
    /// Kind of the token.
    pub token_type: EsdtTokenType,
    /// Amount held.
    pub amount: BigUint,
    /// True while the balance is frozen.
    pub frozen: bool,
    /// Hash of the instance payload, NFT kinds only.
    pub hash: Vec<u8>,
    /// Display name of the instance.
    pub name: Vec<u8>,
    /// Creator-defined attributes.
    pub attributes: Vec<u8>,
    /// The account that created the instance.
    pub creator: Vec<u8>,
    /// Royalty points out of 10000.
    pub royalties: BigUint,
    /// Content URIs.
    pub uris: Vec<Vec<u8>>,
}

/// Local role bits an account can hold for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EsdtLocalRoles(pub u64);

/// Role bit: local mint.
pub const ROLE_LOCAL_MINT: u64 = 1;
/// Role bit: local burn.
pub const ROLE_LOCAL_BURN: u64 = 1 << 1;
/// Role bit: NFT create.
pub const ROLE_NFT_CREATE: u64 = 1 << 2;
/// Role bit: NFT add quantity.
pub const ROLE_NFT_ADD_QUANTITY: u64 = 1 << 3;
/// Role bit: NFT burn.
pub const ROLE_NFT_BURN: u64 = 1 << 4;

impl EsdtLocalRoles {
    /// Decodes the role bitset from the role names stored on-chain.
    pub fn from_role_names(names: &[Vec<u8>]) -> Self {
        let mut bits = 0u64;
        for name in names {
            match name.as_slice() {
                b"ESDTRoleLocalMint" => bits |= ROLE_LOCAL_MINT,
                b"ESDTRoleLocalBurn" => bits |= ROLE_LOCAL_BURN,
                b"ESDTRoleNFTCreate" => bits |= ROLE_NFT_CREATE,
                b"ESDTRoleNFTAddQuantity" => bits |= ROLE_NFT_ADD_QUANTITY,
                b"ESDTRoleNFTBurn" => bits |= ROLE_NFT_BURN,
                _ => {}
            }
        }
        EsdtLocalRoles(bits)
    }
}

const TICKER_MIN_LENGTH: usize = 3;
const TICKER_MAX_LENGTH: usize = 10;
const RANDOM_SUFFIX_LENGTH: usize = 6;

/// Validates an ESDT token identifier of the form `TICKER-rrrrrr`.
///
/// The ticker is 3 to 10 uppercase alphanumeric characters; the suffix is
/// exactly six lowercase-hex characters.
pub fn validate_token_identifier(token_id: &[u8]) -> bool {
    let Some(dash) = token_id.iter().rposition(|b| *b == b'-') else {
        return false;
    };
    let ticker = &token_id[..dash];
    let suffix = &token_id[dash.saturating_add(1)..];

    if ticker.len() < TICKER_MIN_LENGTH || ticker.len() > TICKER_MAX_LENGTH {
        return false;
    }
    if suffix.len() != RANDOM_SUFFIX_LENGTH {
        return false;
    }
    let ticker_ok = ticker
        .iter()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    let suffix_ok = suffix
        .iter()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b));
    ticker_ok && suffix_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_token_identifier() {
        assert!(validate_token_identifier(b"WSKN-1a2b3c"));
        assert!(validate_token_identifier(b"TOKEN10-abcdef"));
        assert!(!validate_token_identifier(b"WSKN1a2b3c"));
        assert!(!validate_token_identifier(b"wskn-1a2b3c"));
        assert!(!validate_token_identifier(b"WSKN-1A2B3C"));
        assert!(!validate_token_identifier(b"WS-1a2b3c"));
        assert!(!validate_token_identifier(b"WSKN-1a2b3"));
        assert!(!validate_token_identifier(b"TOOLONGTICKER-1a2b3c"));
    }

    #[test]
    fn test_roles_from_names() {
        let roles = EsdtLocalRoles::from_role_names(&[
            b"ESDTRoleLocalMint".to_vec(),
            b"ESDTRoleNFTBurn".to_vec(),
            b"SomethingElse".to_vec(),
        ]);
        assert_eq!(roles.0, ROLE_LOCAL_MINT | ROLE_NFT_BURN);
    }

    #[test]
    fn test_token_type_encoding() {
        assert_eq!(EsdtTokenType::Fungible.as_u32(), 0);
        assert_eq!(EsdtTokenType::Meta.as_u32(), 3);
    }
}
