use std::{
    fs::OpenOptions,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use {
    anyhow::{Context, Result},
    clap::Subcommand,
    rand::{Rng, distr::Alphanumeric},
    relay_auth::{Namespace, credentials::redact},
};

/// Length of generated API keys.
pub const API_KEY_LEN: usize = 43;

#[derive(Subcommand)]
pub enum KeysAction {
    /// Generate an API key bound to a role and append it to an env file.
    Generate {
        /// Role from `api_roles` the key is bound to.
        #[arg(long)]
        role: String,
        /// Env file to append the binding to.
        #[arg(long, default_value = ".env")]
        env_file: PathBuf,
    },
}

pub fn handle_keys(action: KeysAction) -> Result<()> {
    match action {
        KeysAction::Generate { role, env_file } => {
            let key = generate_api_key();
            append_binding(&env_file, &key, &role)?;
            println!("{key}");
            eprintln!(
                "bound {} to role {role} in {} (shown once, store it now)",
                redact(&key),
                env_file.display()
            );
            Ok(())
        },
    }
}

pub fn generate_api_key() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LEN)
        .map(char::from)
        .collect()
}

/// Append `API_KEY_FOR_<key>=<role>` to `path`, creating it if needed.
pub fn append_binding(path: &Path, key: &str, role: &str) -> Result<()> {
    let role = role.trim();
    if role.is_empty() || role.contains(['=', '\n', ' ']) {
        anyhow::bail!("invalid role name: {role:?}");
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open env file {}", path.display()))?;

    let mut prefix = "";
    let len = file.metadata()?.len();
    if len > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            prefix = "\n";
        }
    }

    writeln!(
        file,
        "{prefix}{}{key}={role}",
        Namespace::Api.env_prefix()
    )
    .with_context(|| format!("failed to write env file {}", path.display()))?;
    Ok(())
}
