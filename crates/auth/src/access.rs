use {
    relay_config::{RoleTable, RoleTables},
    relay_protocol::WILDCARD,
    tracing::{info, warn},
};

use crate::credentials::{CredentialStore, Namespace};

/// Answers "may this identity run this action?" for both namespaces.
///
/// Permissions are always looked up through the identity's bound role; the
/// identity itself never appears in a role table.
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    credentials: CredentialStore,
    roles: RoleTables,
}

/// True when `permitted` names `action` or contains the wildcard.
pub fn grants(permitted: &[String], action: &str) -> bool {
    permitted.iter().any(|p| p == action || p == WILDCARD)
}

impl AccessControl {
    pub fn new(credentials: CredentialStore, roles: RoleTables) -> Self {
        info!(
            api_credentials = credentials.count(Namespace::Api),
            telegram_credentials = credentials.count(Namespace::Telegram),
            api_roles = roles.api_roles.len(),
            tg_roles = roles.tg_roles.len(),
            "access control initialized"
        );
        Self { credentials, roles }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn roles(&self, ns: Namespace) -> &RoleTable {
        match ns {
            Namespace::Api => &self.roles.api_roles,
            Namespace::Telegram => &self.roles.tg_roles,
        }
    }

    /// Permitted actions for `role`, or `None` when the role is undefined.
    pub fn permitted(&self, ns: Namespace, role: &str) -> Option<&[String]> {
        self.roles(ns).get(role).map(Vec::as_slice)
    }

    pub fn is_authorized(&self, ns: Namespace, identity: &str, action: &str) -> bool {
        let who = ns.display_identity(identity);
        let Some(role) = self.credentials.resolve(ns, identity) else {
            warn!(namespace = %ns, identity = %who, action, "identity has no role assigned");
            return false;
        };
        let granted = self
            .permitted(ns, role)
            .is_some_and(|permitted| grants(permitted, action));
        if granted {
            info!(namespace = %ns, identity = %who, role, action, "access granted");
        } else {
            warn!(namespace = %ns, identity = %who, role, action, "access denied");
        }
        granted
    }

    /// API caller (by key) may run `task`.
    pub fn check_api_access(&self, api_key: &str, task: &str) -> bool {
        self.is_authorized(Namespace::Api, api_key, task)
    }

    /// Telegram user may run bot `command`.
    pub fn check_command_access(&self, user_id: &str, command: &str) -> bool {
        self.is_authorized(Namespace::Telegram, user_id, command)
    }
}
