use serde::{Deserialize, Serialize};

use crate::domain::email::RawEmail;
use crate::domain::filter::Filter;
use crate::error::Result;

/// Raw emails in the order the driver delivers them. A failing item aborts
/// the fetch it belongs to.
pub type RawEmails<'a> = Box<dyn Iterator<Item = Result<RawEmail>> + 'a>;

/// Automation surface of a desktop mail client.
///
/// Mailbox paths are `/`-separated from the account root, e.g.
/// `Inbox/Resolved`. An empty mailbox yields an empty sequence, never an
/// error.
pub trait MailDriver {
    fn list_accounts(&self) -> Result<Vec<String>>;

    fn list_mailboxes(&self, account: &str) -> Result<Vec<String>>;

    /// Messages of one mailbox matching `filter`. Count based filters yield
    /// newest first and stop after the limit.
    fn fetch<'a>(&'a self, account: &str, mailbox: &str, filter: &Filter) -> Result<RawEmails<'a>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Macos,
    Windows,
}

impl Platform {
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Macos
        }
    }
}

/// Split a mailbox path into its folder names, ignoring stray separators.
pub fn path_segments(mailbox: &str) -> Vec<&str> {
    mailbox
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Bring a batch parsed from automation output in line with the fetch
/// contract: exact-date batches keep only that day in delivered order,
/// count batches are sorted newest first and cut to the limit.
pub fn conform(mut emails: Vec<RawEmail>, filter: &Filter) -> Vec<RawEmail> {
    match filter {
        Filter::ExactDate(day) => emails.retain(|e| e.received_at.date == *day),
        Filter::MostRecent(_) | Filter::Latest => {
            emails.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        }
    }
    if let Some(limit) = filter.limit() {
        emails.truncate(limit);
    }
    emails
}
