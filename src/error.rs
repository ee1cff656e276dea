//! Error types shared by the drivers, the store and the scrape pipeline.

use chrono::NaiveDate;
use rusqlite::ErrorCode;
use thiserror::Error;

use crate::domain::email::ReceivedAt;

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;

/// Categorized failure of a scrape, listing or export invocation.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The mail client refused automation (permission prompt declined or the
    /// new store-app client, which has no scripting surface).
    #[error(
        "mail client automation was denied: {0}\n\
         Allow automation access for this terminal and make sure the legacy Outlook client is running \
         (the new Outlook has no scripting support)."
    )]
    AutomationDenied(String),

    #[error("account '{0}' not found in the mail client")]
    AccountNotFound(String),

    #[error("mailbox '{mailbox}' not found in account '{account}'")]
    MailboxNotFound { account: String, mailbox: String },

    /// Any other driver failure, carrying the client's own message.
    #[error("mail client driver failed: {0}")]
    Driver(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid date '{input}': {reason}")]
    InvalidDate { input: String, reason: String },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

impl ScrapeError {
    pub fn invalid_date(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDate {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn future_date(date: NaiveDate, today: NaiveDate) -> Self {
        Self::invalid_date(
            date.format("%d-%m-%Y").to_string(),
            format!(
                "cannot scrape today ({}) or a future date",
                today.format("%d-%m-%Y")
            ),
        )
    }

    /// Whether the storage layer itself is broken, as opposed to a single
    /// row being rejected.
    pub fn is_fatal_store(&self) -> bool {
        match self {
            Self::Store(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::SystemIoFailure
                    | ErrorCode::DiskFull
                    | ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::ReadOnly
            ),
            Self::Io(_) => true,
            _ => false,
        }
    }
}

/// A record the store failed to persist. Collected per batch instead of
/// aborting the remaining records.
#[derive(Debug)]
pub struct RecordFailure {
    pub subject: String,
    pub received_at: ReceivedAt,
    pub reason: String,
}
