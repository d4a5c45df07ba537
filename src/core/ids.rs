//! Identifiers for accounts, collateral types, escrows and sales.
//!
//! Accounts are opaque 32-byte identities rendered as hex. The ledger never
//! interprets them; key management and signature checking live outside this
//! crate. Collateral types are short ASCII symbols used as map keys.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};

/// Byte length of an account identity
pub const ACCOUNT_ID_LENGTH: usize = 32;

/// Maximum length of a collateral symbol
pub const MAX_SYMBOL_LENGTH: usize = 12;

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNT ID
// ═══════════════════════════════════════════════════════════════════════════════

/// A 32-byte opaque account identity
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId([u8; ACCOUNT_ID_LENGTH]);

impl Serialize for AccountId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        if bytes.len() != ACCOUNT_ID_LENGTH {
            return Err(serde::de::Error::custom(format!(
                "expected {} bytes, got {}",
                ACCOUNT_ID_LENGTH,
                bytes.len()
            )));
        }
        let mut arr = [0u8; ACCOUNT_ID_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(AccountId(arr))
    }
}

impl AccountId {
    /// Create an account id from raw bytes
    pub fn new(bytes: [u8; ACCOUNT_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create an account id from a slice (must be exactly 32 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != ACCOUNT_ID_LENGTH {
            return Err(Error::InvalidParameter {
                name: "account".into(),
                reason: format!("expected {} bytes, got {}", ACCOUNT_ID_LENGTH, slice.len()),
            });
        }
        let mut bytes = [0u8; ACCOUNT_ID_LENGTH];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Derive a deterministic account id from a human-readable label.
    ///
    /// Used by tests and the simulator; production embedders supply their own
    /// identity bytes.
    pub fn named(label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"breakwater:account:");
        hasher.update(label.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; ACCOUNT_ID_LENGTH];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; ACCOUNT_ID_LENGTH] {
        &self.0
    }

    /// Full hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated rendering for logs
    pub fn short(&self) -> String {
        let hex = self.to_hex();
        format!("{}...{}", &hex[..8], &hex[hex.len() - 8..])
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL ID
// ═══════════════════════════════════════════════════════════════════════════════

/// A fixed-width ASCII symbol naming a collateral type (e.g. `"ETH"`)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollateralId {
    bytes: [u8; MAX_SYMBOL_LENGTH],
    len: u8,
}

impl CollateralId {
    /// Create a collateral id from a symbol.
    ///
    /// Symbols are 1 to 12 ASCII alphanumeric characters (`-` allowed).
    pub fn new(symbol: &str) -> Result<Self> {
        let valid_len = !symbol.is_empty() && symbol.len() <= MAX_SYMBOL_LENGTH;
        let valid_chars = symbol
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-');
        if !valid_len || !valid_chars {
            return Err(Error::InvalidParameter {
                name: "collateral".into(),
                reason: format!("invalid symbol {:?}", symbol),
            });
        }
        let mut bytes = [0u8; MAX_SYMBOL_LENGTH];
        bytes[..symbol.len()].copy_from_slice(symbol.as_bytes());
        Ok(Self {
            bytes,
            len: symbol.len() as u8,
        })
    }

    /// Symbol as a string slice
    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII, so this cannot fail.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("?")
    }
}

impl Serialize for CollateralId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CollateralId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CollateralId::new(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for CollateralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollateralId({})", self.as_str())
    }
}

impl fmt::Display for CollateralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ESCROW AND SALE IDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle for a ledger-allocated escrow account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscrowId(pub(crate) u64);

impl EscrowId {
    /// Numeric handle
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EscrowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "escrow-{}", self.0)
    }
}

/// Identifier of a Dutch auction within one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SaleId(pub(crate) u64);

impl SaleId {
    /// Numeric id
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SaleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sale-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_accounts_are_deterministic() {
        let a = AccountId::named("alice");
        let b = AccountId::named("alice");
        let c = AccountId::named("bob");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn test_account_hex_serde_roundtrip() {
        let id = AccountId::named("carol");
        let json = serde_json::to_string(&id).unwrap();
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_short_rendering() {
        let id = AccountId::named("dave");
        let short = id.short();
        assert_eq!(short.len(), 19);
        assert!(short.contains("..."));
    }

    #[test]
    fn test_collateral_symbols() {
        let eth = CollateralId::new("ETH").unwrap();
        assert_eq!(eth.as_str(), "ETH");
        assert_eq!(eth.to_string(), "ETH");

        assert!(CollateralId::new("").is_err());
        assert!(CollateralId::new("WAY-TOO-LONG-SYMBOL").is_err());
        assert!(CollateralId::new("no spaces").is_err());
    }

    #[test]
    fn test_collateral_serde_roundtrip() {
        let id = CollateralId::new("WSTETH-B").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"WSTETH-B\"");
        let back: CollateralId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
