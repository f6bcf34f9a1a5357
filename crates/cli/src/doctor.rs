//! `opsrelay doctor`: config validation and credential audit.
//!
//! Prints a report with `[ok]`, `[warn]`, `[fail]`, or `[info]` per item and
//! exits non-zero when anything failed.

use std::path::Path;

use {
    anyhow::Result,
    opsrelay_config::{Credentials, RelayConfig, Severity},
    opsrelay_inbound::{inbox::INBOX_FILE, notifier::wake_url},
    opsrelay_queue::store::{REQUESTS_FILE, RESPONSES_FILE},
};

use crate::instance::read_pid;

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

struct Section {
    title: String,
    items: Vec<(Status, String)>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push((status, message.into()));
    }

    fn count(&self, status: Status) -> usize {
        self.items.iter().filter(|(s, _)| *s == status).count()
    }
}

fn print_report(sections: &[Section]) -> (usize, usize) {
    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for (status, message) in &section.items {
            eprintln!("  [{}{}{RESET}]  {message}", status.color(), status.label());
        }
        eprintln!();
    }
    let errors = sections.iter().map(|s| s.count(Status::Fail)).sum();
    let warnings = sections.iter().map(|s| s.count(Status::Warn)).sum();
    (errors, warnings)
}

pub fn handle_doctor(data_dir: &Path) -> Result<()> {
    eprintln!("{BOLD}opsrelay doctor{RESET}");
    eprintln!("{BOLD}==============={RESET}\n");

    if let Err(e) = opsrelay_config::load_dotenv(data_dir) {
        eprintln!("{YELLOW}warning{RESET}: cannot load .env: {e}\n");
    }

    let (config_section, config) = check_config(data_dir);
    let mut sections = vec![config_section, check_directory(data_dir)];
    if let Some(config) = config {
        let credentials = Credentials::resolve(&config);
        sections.push(check_credentials(&config, &credentials));
    }

    let (errors, warnings) = print_report(&sections);
    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn check_config(data_dir: &Path) -> (Section, Option<RelayConfig>) {
    let Some(path) = opsrelay_config::find_config_file(data_dir) else {
        let mut section = Section::new("Config (defaults)");
        section.push(Status::Info, "no config file, defaults apply until first run");
        return (section, Some(RelayConfig::default()));
    };

    let mut section = Section::new(format!("Config ({})", path.display()));
    let config = match opsrelay_config::load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            section.push(Status::Fail, format!("cannot load: {e}"));
            return (section, None);
        },
    };
    section.push(Status::Ok, "parsed");

    let result = opsrelay_config::validate(&config);
    if result.diagnostics.is_empty() {
        section.push(Status::Ok, "no problems found");
    }
    for d in &result.diagnostics {
        let status = match d.severity {
            Severity::Error => Status::Fail,
            Severity::Warning => Status::Warn,
        };
        section.push(status, format!("{}: {}", d.path, d.message));
    }
    (section, Some(config))
}

fn check_directory(data_dir: &Path) -> Section {
    let mut section = Section::new(format!("Data directory ({})", data_dir.display()));
    if !data_dir.is_dir() {
        section.push(Status::Info, "does not exist yet, created on first run");
        return section;
    }
    for name in [REQUESTS_FILE, RESPONSES_FILE, INBOX_FILE] {
        if data_dir.join(name).is_file() {
            section.push(Status::Ok, format!("{name} present"));
        } else {
            section.push(Status::Info, format!("{name} missing, seeded on first run"));
        }
    }
    if let Some(pid) = read_pid(data_dir) {
        section.push(Status::Info, format!("pid file present (pid {pid})"));
    }
    section
}

fn check_credentials(config: &RelayConfig, credentials: &Credentials) -> Section {
    let mut section = Section::new("Credentials");

    if credentials.bot_token.is_some() {
        section.push(Status::Ok, format!("bot token resolved from {}", config.token_env));
    } else {
        section.push(
            Status::Warn,
            format!(
                "{} not set: send is unavailable and inbound polling is disabled",
                config.token_env
            ),
        );
    }

    if credentials.search_api_key.is_some() {
        section.push(
            Status::Ok,
            format!("search key resolved from {}", config.search_api_key_env),
        );
    } else {
        section.push(
            Status::Warn,
            format!(
                "{} not set: search and read are unavailable",
                config.search_api_key_env
            ),
        );
    }

    match &credentials.hook_url {
        Some(url) => section.push(Status::Ok, format!("wake hook {}", wake_url(url))),
        None => section.push(Status::Warn, "hook URL not set: agent is never woken"),
    }
    if credentials.hook_token.is_none() {
        section.push(Status::Warn, "hook token not set: agent is never woken");
    }

    section
}
