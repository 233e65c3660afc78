//! The calling identity, resolved once at the boundary.
use crate::error::{ProcessFileError, Result};
use crate::workflow::RoleCode;
use std::collections::BTreeSet;

/// Identity lookup supplied by the hosting application.
pub trait Authorization {
    fn current_user_id(&self) -> Option<u64>;
    fn current_username(&self) -> Option<String>;
    fn current_user_role_codes(&self) -> Vec<String>;
    /// Older accounts only carry a role name.
    fn current_user_primary_role_name(&self) -> Option<String>;
}

/// A raw role reference as it arrives from the authorization source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleIdentity {
    Code(String),
    LegacyName(String),
}

impl RoleIdentity {
    pub fn resolve(&self) -> Option<RoleCode> {
        match self {
            RoleIdentity::Code(code) => RoleCode::from_code(code),
            RoleIdentity::LegacyName(name) => RoleCode::from_legacy_name(name),
        }
    }
}

/// An authenticated user with canonical roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: u64,
    pub name: String,
    roles: BTreeSet<RoleCode>,
    /// Free-form role label kept for audit columns.
    pub role_name: Option<String>,
}

impl Actor {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            roles: BTreeSet::new(),
            role_name: None,
        }
    }

    pub fn with_role(mut self, role: RoleCode) -> Self {
        self.roles.insert(role);
        self
    }

    pub fn with_role_name(mut self, name: &str) -> Self {
        self.role_name = Some(name.to_string());
        self
    }

    /// Unknown codes and names are dropped, they gate nothing here.
    pub fn from_identities(
        id: u64,
        name: &str,
        identities: impl IntoIterator<Item = RoleIdentity>,
    ) -> Self {
        let mut actor = Self::new(id, name);
        for identity in identities {
            if let RoleIdentity::LegacyName(legacy) = &identity {
                actor.role_name.get_or_insert_with(|| legacy.clone());
            }
            if let Some(role) = identity.resolve() {
                actor.roles.insert(role);
            }
        }
        actor
    }

    pub fn resolve(auth: &dyn Authorization) -> Result<Self> {
        let id = auth
            .current_user_id()
            .ok_or_else(|| ProcessFileError::permission_denied("user is not logged in"))?;
        let name = auth.current_username().unwrap_or_default();
        let identities = auth
            .current_user_role_codes()
            .into_iter()
            .map(RoleIdentity::Code)
            .chain(
                auth.current_user_primary_role_name()
                    .map(RoleIdentity::LegacyName),
            );
        Ok(Self::from_identities(id, &name, identities))
    }

    pub fn holds(&self, role: RoleCode) -> bool {
        self.roles.contains(&role)
    }

    pub fn roles(&self) -> impl Iterator<Item = RoleCode> + '_ {
        self.roles.iter().copied()
    }

    /// Role label written on a preparer's signature.
    pub fn preparer_role(&self) -> String {
        self.role_name
            .clone()
            .unwrap_or_else(|| RoleCode::InjectionLeader.legacy_name().to_string())
    }
}

/// Plain identity data, handy for adapters and tests.
#[derive(Debug, Clone, Default)]
pub struct SessionIdentity {
    pub user_id: Option<u64>,
    pub username: Option<String>,
    pub role_codes: Vec<String>,
    pub primary_role_name: Option<String>,
}

impl Authorization for SessionIdentity {
    fn current_user_id(&self) -> Option<u64> {
        self.user_id
    }
    fn current_username(&self) -> Option<String> {
        self.username.clone()
    }
    fn current_user_role_codes(&self) -> Vec<String> {
        self.role_codes.clone()
    }
    fn current_user_primary_role_name(&self) -> Option<String> {
        self.primary_role_name.clone()
    }
}
