//! Account types
//!
//! Read-side account representation plus PIN credential helpers. Account
//! rows are owned exclusively by the account gateway; everything else sees
//! accounts only through `AccountSnapshot`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Savings,
    Current,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "savings",
            AccountType::Current => "current",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "savings" => Ok(AccountType::Savings),
            "current" => Ok(AccountType::Current),
            other => Err(format!("Unknown account type: {}", other)),
        }
    }
}

/// Privilege tier controlling daily transfer ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeTier {
    Silver,
    Gold,
    Premium,
}

impl PrivilegeTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivilegeTier::Silver => "silver",
            PrivilegeTier::Gold => "gold",
            PrivilegeTier::Premium => "premium",
        }
    }
}

impl fmt::Display for PrivilegeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PrivilegeTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "silver" => Ok(PrivilegeTier::Silver),
            "gold" => Ok(PrivilegeTier::Gold),
            "premium" => Ok(PrivilegeTier::Premium),
            other => Err(format!("Unknown privilege tier: {}", other)),
        }
    }
}

/// Point-in-time view of an account, as returned by the gateway.
/// Carries no credential material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_number: String,
    pub account_type: AccountType,
    pub holder_name: String,
    pub balance: Decimal,
    pub privilege: PrivilegeTier,
    pub is_active: bool,
    pub closed_at: Option<DateTime<Utc>>,
}

impl AccountSnapshot {
    /// An account can be debited/credited only while active and not closed.
    pub fn is_operational(&self) -> bool {
        self.is_active && self.closed_at.is_none()
    }
}

/// Validate the PIN format rule: 4 to 6 ASCII digits.
pub fn validate_pin_format(pin: &str) -> bool {
    (4..=6).contains(&pin.len()) && pin.bytes().all(|b| b.is_ascii_digit())
}

/// Salted SHA-256 digest of a PIN, hex encoded. This is the only form in
/// which a PIN is ever stored or compared.
pub fn pin_digest(pin: &str, salt: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(pin.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_tier_round_trip() {
        for tier in [
            PrivilegeTier::Silver,
            PrivilegeTier::Gold,
            PrivilegeTier::Premium,
        ] {
            assert_eq!(tier.as_str().parse::<PrivilegeTier>().unwrap(), tier);
        }
    }

    #[test]
    fn test_account_type_parse_unknown() {
        assert!("checking".parse::<AccountType>().is_err());
    }

    #[test]
    fn test_pin_format() {
        assert!(validate_pin_format("1234"));
        assert!(validate_pin_format("123456"));
        assert!(!validate_pin_format("123"));
        assert!(!validate_pin_format("1234567"));
        assert!(!validate_pin_format("12a4"));
        assert!(!validate_pin_format(""));
    }

    #[test]
    fn test_pin_digest_salted() {
        let a = pin_digest("1234", "salt-a");
        let b = pin_digest("1234", "salt-b");
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(a, pin_digest("1234", "salt-a"));
    }

    #[test]
    fn test_operational_flags() {
        let mut snapshot = AccountSnapshot {
            account_number: "1001".to_string(),
            account_type: AccountType::Savings,
            holder_name: "Asha".to_string(),
            balance: Decimal::new(10_000, 0),
            privilege: PrivilegeTier::Gold,
            is_active: true,
            closed_at: None,
        };
        assert!(snapshot.is_operational());

        snapshot.is_active = false;
        assert!(!snapshot.is_operational());

        snapshot.is_active = true;
        snapshot.closed_at = Some(Utc::now());
        assert!(!snapshot.is_operational());
    }
}
