//! Identity resolution and request-scoped context.
//!
//! Operations never consult process-wide session state; every mutating
//! operation receives a [`RequestContext`] carrying the authenticated
//! [`Identity`], and audit fields (`created_by`) are derived from it.
//! Credential verification sits behind the [`IdentityProvider`] trait so
//! the account source can be swapped without touching the operations.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Access roles in the referral network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    HospitalStaff,
    AmbulanceDriver,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::HospitalStaff => "Hospital Staff",
            Self::AmbulanceDriver => "Ambulance Driver",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An authenticated principal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// The facility this principal acts for; "All Facilities" for admins.
    pub facility: String,
}

impl Identity {
    /// Identity used by background tasks acting on their own behalf
    /// (simulator completions, shutdown cleanup).
    pub fn system() -> Self {
        Self {
            username: "system".to_string(),
            name: "System".to_string(),
            email: "system@kisumu.gov".to_string(),
            role: Role::Admin,
            facility: "All Facilities".to_string(),
        }
    }
}

/// Request-scoped context passed to every operation.
#[derive(Clone, Debug)]
pub struct RequestContext {
    identity: Identity,
}

impl RequestContext {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    /// Context for internally-initiated work.
    pub fn system() -> Self {
        Self::new(Identity::system())
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Value recorded in `created_by` audit fields.
    pub fn audit_label(&self) -> &str {
        self.identity.role.label()
    }
}

/// Capability to resolve credentials into an identity.
pub trait IdentityProvider: Send + Sync {
    /// Returns the identity for valid credentials, `None` otherwise.
    fn authenticate(&self, username: &str, password: &str) -> Option<Identity>;
}

struct Account {
    password_digest: String,
    identity: Identity,
}

/// Identity provider backed by a fixed account table.
///
/// Passwords are held as SHA-256 hex digests; plaintext never leaves the
/// constructor.
pub struct StaticIdentityProvider {
    accounts: HashMap<String, Account>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
        }
    }

    /// Adds an account, replacing any existing one for the same username.
    pub fn with_account(mut self, password: &str, identity: Identity) -> Self {
        self.accounts.insert(
            identity.username.clone(),
            Account {
                password_digest: sha256_hex(password),
                identity,
            },
        );
        self
    }

    /// The four stock accounts of the county deployment.
    pub fn with_default_accounts() -> Self {
        Self::new()
            .with_account(
                "admin123",
                Identity {
                    username: "admin".to_string(),
                    name: "System Administrator".to_string(),
                    email: "admin@kisumu.gov".to_string(),
                    role: Role::Admin,
                    facility: "All Facilities".to_string(),
                },
            )
            .with_account(
                "staff123",
                Identity {
                    username: "hospital_staff".to_string(),
                    name: "Hospital Staff Member".to_string(),
                    email: "staff@joortrh.go.ke".to_string(),
                    role: Role::HospitalStaff,
                    facility:
                        "Jaramogi Oginga Odinga Teaching & Referral Hospital (JOOTRH)".to_string(),
                },
            )
            .with_account(
                "driver123",
                Identity {
                    username: "driver".to_string(),
                    name: "Ambulance Driver".to_string(),
                    email: "driver@kisumu.gov".to_string(),
                    role: Role::AmbulanceDriver,
                    facility: "Ambulance Service".to_string(),
                },
            )
            .with_account(
                "kisumu123",
                Identity {
                    username: "kisumu_staff".to_string(),
                    name: "Kisumu County Hospital Staff".to_string(),
                    email: "staff@kisumuhospital.go.ke".to_string(),
                    role: Role::HospitalStaff,
                    facility: "Kisumu County Referral Hospital".to_string(),
                },
            )
    }
}

impl Default for StaticIdentityProvider {
    fn default() -> Self {
        Self::with_default_accounts()
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn authenticate(&self, username: &str, password: &str) -> Option<Identity> {
        let account = self.accounts.get(username)?;
        if account.password_digest == sha256_hex(password) {
            Some(account.identity.clone())
        } else {
            None
        }
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
