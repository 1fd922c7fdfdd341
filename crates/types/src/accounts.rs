//! Account types.
//!
//! An [`Account`] is a user's token wallet and identity anchor. The balance is
//! only ever changed through the ledger operations in `archrender-core`, which
//! keep it non-negative and append a [`crate::LedgerTransaction`] for every
//! change.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ParseEnumError;

/// Tokens granted to a freshly created account.
pub const DEFAULT_INITIAL_TOKENS: i64 = 3;

/// Capability flag carried by every account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i32,
    /// Identifier assigned by the upstream identity provider
    pub external_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Role,
    /// Token balance, never negative
    pub token_balance: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_signed_in: i64,
}

impl Account {
    pub fn can_afford(&self, tokens: i64) -> bool {
        self.token_balance >= tokens
    }
}

/// Authorization policy for the admin surface.
pub fn is_admin(account: &Account) -> bool {
    match account.role {
        Role::Admin => true,
        Role::User => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(role: Role, balance: i64) -> Account {
        Account {
            id: 1,
            external_id: "user-1".to_string(),
            email: None,
            name: None,
            role,
            token_balance: balance,
            created_at: 0,
            updated_at: 0,
            last_signed_in: 0,
        }
    }

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::User, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_admin_policy_follows_role_flag() {
        assert!(is_admin(&account(Role::Admin, 0)));
        assert!(!is_admin(&account(Role::User, 100)));
    }

    #[test]
    fn test_can_afford() {
        let acc = account(Role::User, 1);
        assert!(acc.can_afford(1));
        assert!(!acc.can_afford(2));
    }
}
