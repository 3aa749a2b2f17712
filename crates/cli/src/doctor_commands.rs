//! `relay doctor`: validate the startup inputs without connecting anywhere.
//!
//! Prints a report with `[ok]`, `[warn]`, `[fail]` or `[info]` per item and
//! fails when anything would stop `relay gateway` from starting.

use std::{collections::BTreeSet, sync::Arc};

use {
    anyhow::Result,
    relay_auth::{CredentialStore, Namespace},
    relay_channels::RecordingOutbound,
    relay_config::{RelayConfig, RoleTable},
    relay_protocol::WILDCARD,
    relay_tasks::TaskRegistry,
    relay_telegram::{TelegramTasks, commands::COMMANDS},
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Info => CYAN,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }

    fn has(&self, status: Status) -> bool {
        self.items.iter().any(|i| i.status == status)
    }
}

fn print_report(sections: &[Section]) -> (usize, usize) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
            match item.status {
                Status::Fail => errors += 1,
                Status::Warn => warnings += 1,
                _ => {},
            }
        }
        eprintln!();
    }

    (errors, warnings)
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub fn run(config: &RelayConfig) -> Result<()> {
    eprintln!("{BOLD}relay doctor{RESET}");
    eprintln!("{BOLD}============{RESET}\n");

    let credentials = CredentialStore::from_env();
    let sections = diagnose(config, &credentials);
    let (errors, warnings) = print_report(&sections);

    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");
    if errors > 0 {
        anyhow::bail!("doctor found {errors} error(s)");
    }
    Ok(())
}

fn diagnose(config: &RelayConfig, credentials: &CredentialStore) -> Vec<Section> {
    let (tasks, registry_section) = check_tasks(config);
    vec![
        check_server(config),
        check_telegram(config),
        registry_section,
        check_roles(
            "API roles",
            Namespace::Api,
            &config.permissions.roles.api_roles,
            credentials,
            &tasks,
        ),
        check_roles(
            "Telegram roles",
            Namespace::Telegram,
            &config.permissions.roles.tg_roles,
            credentials,
            &COMMANDS
                .iter()
                .map(|(name, _)| name.to_string())
                .collect::<BTreeSet<_>>(),
        ),
    ]
}

// ── Checks ──────────────────────────────────────────────────────────────────

fn check_server(config: &RelayConfig) -> Section {
    let server = &config.server;
    let mut section = Section::new("Server");
    section.push(
        Status::Info,
        format!("listen address {}:{}", server.bind, server.port),
    );
    match server.task_timeout() {
        Ok(timeout) => section.push(Status::Ok, format!("task timeout {timeout:?}")),
        Err(e) => section.push(Status::Fail, e.to_string()),
    }
    section
}

fn check_telegram(config: &RelayConfig) -> Section {
    let telegram = &config.telegram;
    let mut section = Section::new("Telegram");
    if telegram.token_configured() {
        section.push(Status::Ok, "bot token configured");
    } else {
        section.push(
            Status::Fail,
            "telegram.token is empty or an unresolved ${VAR} placeholder",
        );
    }
    match telegram.admin_chat_id {
        Some(id) => section.push(Status::Ok, format!("admin chat {id}")),
        None => section.push(
            Status::Warn,
            "telegram.admin_chat_id is not set, send_message_admin will fail",
        ),
    }
    section
}

/// Build the registry against a recording session, as the worker would.
fn check_tasks(config: &RelayConfig) -> (BTreeSet<String>, Section) {
    let mut section = Section::new("Tasks");
    let provider = TelegramTasks::new(
        Arc::new(RecordingOutbound::new()),
        config.telegram.admin_chat_id,
    );
    match TaskRegistry::from_provider(&provider) {
        Ok(registry) => {
            section.push(
                Status::Ok,
                format!("{} task(s): {}", registry.len(), registry.names().join(", ")),
            );
            for (name, description) in registry.descriptions() {
                section.push(Status::Info, format!("{name}: {description}"));
            }
            (registry.names().into_iter().collect(), section)
        },
        Err(e) => {
            section.push(Status::Fail, e.to_string());
            (BTreeSet::new(), section)
        },
    }
}

fn check_roles(
    title: &str,
    ns: Namespace,
    roles: &RoleTable,
    credentials: &CredentialStore,
    known: &BTreeSet<String>,
) -> Section {
    let mut section = Section::new(title);

    let mut names: Vec<&String> = roles.keys().collect();
    names.sort();
    for role in names {
        let permitted = &roles[role];
        section.push(
            Status::Info,
            format!("{role}: {}", permitted.join(", ")),
        );
        for action in permitted {
            if action != WILDCARD && !known.contains(action) {
                section.push(
                    Status::Warn,
                    format!("role {role} permits unknown action {action}"),
                );
            }
        }
    }

    for role in credentials.roles(ns) {
        if !roles.contains_key(role) {
            section.push(
                Status::Warn,
                format!("{ns} credentials are bound to undefined role {role}, they grant nothing"),
            );
        }
    }

    let count = credentials.count(ns);
    if count == 0 {
        section.push(
            Status::Warn,
            format!(
                "no {ns} credentials ({}<identity>=<role>), every request will be denied",
                ns.env_prefix()
            ),
        );
    } else if !section.has(Status::Warn) {
        section.push(Status::Ok, format!("{count} {ns} credential(s)"));
    } else {
        section.push(Status::Info, format!("{count} {ns} credential(s)"));
    }
    section
}
