use std::collections::HashMap;

use tracing::{debug, warn};

// ── Namespaces ───────────────────────────────────────────────────────────────

/// Independent permission namespaces. Being authorized in one grants nothing
/// in the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Tasks invoked through the HTTP gateway, identity is an API key.
    Api,
    /// Interactive bot commands, identity is a Telegram user id.
    Telegram,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Api, Namespace::Telegram];

    /// Environment variable prefix whose suffix is the identity and whose
    /// value is the role, e.g. `API_KEY_FOR_key123=tgbot`.
    pub const fn env_prefix(self) -> &'static str {
        match self {
            Self::Api => "API_KEY_FOR_",
            Self::Telegram => "TELEGRAM_USER_",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Telegram => "telegram",
        }
    }

    /// Render an identity for logs without leaking API keys.
    pub fn display_identity(self, identity: &str) -> String {
        match self {
            Self::Api => redact(identity),
            Self::Telegram => identity.to_string(),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secrets shorter than this are masked completely.
const REDACT_MIN_LEN: usize = 12;

/// Keep the first four characters of a secret, or nothing when it is too
/// short for a prefix to be safe to show.
pub fn redact(secret: &str) -> String {
    if secret.chars().count() < REDACT_MIN_LEN {
        return "****".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}…")
}

// ── Credential store ─────────────────────────────────────────────────────────

/// Identity → role bindings for both namespaces. Built once at startup and
/// read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    api: HashMap<String, String>,
    telegram: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect bindings from the process environment. Variables that are not
    /// valid UTF-8 are skipped.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        )
    }

    /// Collect bindings from `(name, value)` pairs. Names carrying a namespace
    /// prefix bind the suffix (identity) to the value (role); other names are
    /// ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut store = Self::new();
        for (name, value) in vars {
            let name = name.as_ref();
            let Some((ns, identity)) = Namespace::ALL
                .into_iter()
                .find_map(|ns| name.strip_prefix(ns.env_prefix()).map(|id| (ns, id)))
            else {
                continue;
            };
            let role = value.as_ref().trim();
            if identity.is_empty() || role.is_empty() {
                warn!(namespace = %ns, var = name, "ignoring incomplete credential binding");
                continue;
            }
            store.bind(ns, identity, role);
        }
        debug!(
            api = store.count(Namespace::Api),
            telegram = store.count(Namespace::Telegram),
            "loaded credential bindings"
        );
        store
    }

    /// Bind `identity` to `role`, replacing any previous binding.
    pub fn bind(&mut self, ns: Namespace, identity: impl Into<String>, role: impl Into<String>) {
        self.table_mut(ns).insert(identity.into(), role.into());
    }

    pub fn with_binding(
        mut self,
        ns: Namespace,
        identity: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        self.bind(ns, identity, role);
        self
    }

    /// Role bound to `identity`, if any.
    pub fn resolve(&self, ns: Namespace, identity: &str) -> Option<&str> {
        self.table(ns).get(identity).map(String::as_str)
    }

    pub fn is_registered(&self, ns: Namespace, identity: &str) -> bool {
        self.table(ns).contains_key(identity)
    }

    pub fn count(&self, ns: Namespace) -> usize {
        self.table(ns).len()
    }

    /// Distinct roles referenced by bindings in `ns`, sorted.
    pub fn roles(&self, ns: Namespace) -> Vec<&str> {
        let mut roles: Vec<&str> = self.table(ns).values().map(String::as_str).collect();
        roles.sort_unstable();
        roles.dedup();
        roles
    }

    fn table(&self, ns: Namespace) -> &HashMap<String, String> {
        match ns {
            Namespace::Api => &self.api,
            Namespace::Telegram => &self.telegram,
        }
    }

    fn table_mut(&mut self, ns: Namespace) -> &mut HashMap<String, String> {
        match ns {
            Namespace::Api => &mut self.api,
            Namespace::Telegram => &mut self.telegram,
        }
    }
}
