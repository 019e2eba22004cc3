//! Core type definitions for EduStake

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Seconds since the Unix epoch (UTC)
pub type Timestamp = u64;

/// Token amount in the smallest indivisible unit (e8s)
pub type Tokens = u64;

/// One whole token in e8s
pub const ONE_TOKEN: Tokens = 100_000_000;

pub const SECONDS_PER_DAY: u64 = 24 * 3600;

/// Reward year used by the accrual formula (365 days, no leap handling)
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

/// NeuronId - Opaque unique identifier assigned at creation
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NeuronId(Uuid);

impl NeuronId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse from the hyphenated string form
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl fmt::Debug for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NeuronId({})", self.0)
    }
}

impl fmt::Display for NeuronId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// TransferId - Idempotency key for a payout to an owner's liquid account
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(Uuid);

impl TransferId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Debug for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferId({})", self.0)
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// AccountId - Controlling identity of a neuron
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId {
    id: [u8; 32],
}

impl AccountId {
    pub fn new(id: [u8; 32]) -> Self {
        Self { id }
    }

    /// Derive an account id from an external principal string
    pub fn from_principal(principal: &str) -> Self {
        let hash = blake3::hash(principal.as_bytes());
        Self {
            id: *hash.as_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.id
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Parse from a 64 character hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut id = [0u8; 32];
        hex::decode_to_slice(s, &mut id)?;
        Ok(Self { id })
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_hex_roundtrip() {
        let account = AccountId::from_principal("alice");
        let parsed = AccountId::from_hex(&account.to_hex()).unwrap();
        assert_eq!(account, parsed);
    }

    #[test]
    fn test_account_from_hex_rejects_short_input() {
        assert!(AccountId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_neuron_ids_are_unique() {
        assert_ne!(NeuronId::generate(), NeuronId::generate());
    }

    #[test]
    fn test_neuron_id_parse() {
        let id = NeuronId::generate();
        assert_eq!(NeuronId::parse(&id.to_string()).unwrap(), id);
    }
}
