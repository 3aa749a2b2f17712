//! Configuration loading: `relay.{toml,yaml,json}` discovery, `${ENV}`
//! substitution, and the role tables used for access control.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, find_config_file, load_config, load_permissions},
    schema::{PermissionsConfig, RelayConfig, RoleTable, RoleTables, ServerConfig, TelegramConfig},
};
