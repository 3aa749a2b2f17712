//! Credential store and role-based access control.
//!
//! Identities are bound to roles through environment variables at startup;
//! roles are bound to permitted actions by the config's role tables.

pub mod access;
pub mod credentials;

pub use {
    access::AccessControl,
    credentials::{CredentialStore, Namespace},
};
