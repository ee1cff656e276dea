//! Scrape every mailbox listed in a paths file:
//!
//! ```text
//! Name: Jane Doe  |  Stream: ADVISING
//!   - Inbox
//!   - Inbox/Resolved
//! ```
//!
//! Each mailbox is an independent scrape; one failing does not stop the
//! others.

use std::path::Path;
use std::sync::LazyLock;

use log::{info, warn};
use regex::Regex;

use crate::domain::filter::Filter;
use crate::error::{Result, ScrapeError};
use crate::scrape::{ScrapeOutcome, Scraper};

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Name:\s*(.*?)\s*\|\s*Stream:\s*([A-Za-z]+)\s*$")
        .unwrap_or_else(|e| panic!("{e}"))
});

static ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*-\s*(.+?)\s*$").unwrap_or_else(|e| panic!("{e}")));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxGroup {
    pub account: String,
    pub stream: String,
    pub mailboxes: Vec<String>,
}

pub fn load_mailbox_paths(path: &Path) -> Result<Vec<MailboxGroup>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_mailbox_paths(&text))
}

/// Blocks start at a `Name: ... | Stream: ...` header and end at a blank
/// line or the next header. Blocks without mailboxes are dropped.
pub fn parse_mailbox_paths(text: &str) -> Vec<MailboxGroup> {
    let mut groups = Vec::new();
    let mut current: Option<MailboxGroup> = None;

    let flush = |current: &mut Option<MailboxGroup>, groups: &mut Vec<MailboxGroup>| {
        if let Some(g) = current.take()
            && !g.mailboxes.is_empty()
        {
            groups.push(g);
        }
    };

    for line in text.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut groups);
        } else if let Some(caps) = HEADER.captures(line) {
            flush(&mut current, &mut groups);
            current = Some(MailboxGroup {
                account: caps[1].to_string(),
                stream: caps[2].to_string(),
                mailboxes: Vec::new(),
            });
        } else if let Some(caps) = ENTRY.captures(line)
            && let Some(g) = current.as_mut()
        {
            g.mailboxes.push(caps[1].to_string());
        }
    }
    flush(&mut current, &mut groups);
    groups
}

/// Map a configured account name onto one the client reports: exact,
/// case-insensitive, then a unique case-insensitive substring. Anything
/// else is passed through unchanged, since delegated mailboxes are often
/// reachable without being listed.
pub fn resolve_account(requested: &str, available: &[String]) -> String {
    if available.iter().any(|a| a == requested) {
        return requested.to_string();
    }
    let wanted = requested.to_lowercase();
    if let Some(a) = available.iter().find(|a| a.to_lowercase() == wanted) {
        return a.clone();
    }
    let candidates: Vec<&String> = available
        .iter()
        .filter(|a| a.to_lowercase().contains(&wanted))
        .collect();
    match candidates[..] {
        [only] => only.clone(),
        _ => requested.to_string(),
    }
}

pub struct MailboxResult {
    pub account: String,
    pub stream: String,
    pub mailbox: String,
    pub outcome: Result<ScrapeOutcome>,
}

#[derive(Default)]
pub struct BatchReport {
    pub mailboxes: Vec<MailboxResult>,
}

impl BatchReport {
    pub fn inserted(&self) -> usize {
        self.mailboxes
            .iter()
            .filter_map(|m| m.outcome.as_ref().ok())
            .map(|o| o.inserted)
            .sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&MailboxResult, &ScrapeError)> {
        self.mailboxes
            .iter()
            .filter_map(|m| m.outcome.as_ref().err().map(|e| (m, e)))
    }
}

pub fn run_batch(scraper: &Scraper<'_>, groups: &[MailboxGroup], filter: &Filter) -> BatchReport {
    let available = match scraper.driver().list_accounts() {
        Ok(a) => a,
        Err(e) => {
            warn!("could not list accounts ({e}); using names from the paths file as given");
            Vec::new()
        }
    };

    let mut report = BatchReport::default();
    for group in groups {
        let account = resolve_account(&group.account, &available);
        info!("account {account} (stream {})", group.stream);
        for mailbox in &group.mailboxes {
            let outcome = scraper.scrape_stream(&account, mailbox, &group.stream, filter);
            if let Err(e) = &outcome {
                warn!("{account}/{mailbox} failed: {e}");
            }
            report.mailboxes.push(MailboxResult {
                account: account.clone(),
                stream: group.stream.clone(),
                mailbox: mailbox.clone(),
                outcome,
            });
        }
    }
    report
}
