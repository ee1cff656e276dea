#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use chrono::NaiveDate;
use outlook_scraper::domain::email::{MailRecord, RawEmail, ReceivedAt};
use outlook_scraper::domain::filter::Filter;
use outlook_scraper::error::{Result, ScrapeError};
use outlook_scraper::mail::driver::{MailDriver, RawEmails};
use outlook_scraper::store::repo::{DateRange, MailRepository};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn raw(subject: &str, body: &str, received_at: ReceivedAt) -> RawEmail {
    RawEmail {
        subject: subject.to_string(),
        body: body.to_string(),
        received_at,
        is_html: false,
    }
}

/// Mail client stand-in. Mailboxes hold messages newest first, the way a
/// client sorted by received time would deliver them.
#[derive(Default)]
pub struct FakeDriver {
    pub accounts: Vec<String>,
    pub mailboxes: RefCell<BTreeMap<(String, String), Vec<RawEmail>>>,
    pub denied: bool,
    /// Fail mid-stream after yielding this many messages.
    pub fail_after: Option<usize>,
    pub fetches: Cell<usize>,
}

impl FakeDriver {
    pub fn with_mailbox(account: &str, mailbox: &str, emails: Vec<RawEmail>) -> Self {
        let driver = Self {
            accounts: vec![account.to_string()],
            ..Self::default()
        };
        driver.put(account, mailbox, emails);
        driver
    }

    pub fn put(&self, account: &str, mailbox: &str, emails: Vec<RawEmail>) {
        self.mailboxes
            .borrow_mut()
            .insert((account.to_string(), mailbox.to_string()), emails);
    }
}

impl MailDriver for FakeDriver {
    fn list_accounts(&self) -> Result<Vec<String>> {
        if self.denied {
            return Err(ScrapeError::AutomationDenied("not authorized (-1743)".into()));
        }
        Ok(self.accounts.clone())
    }

    fn list_mailboxes(&self, account: &str) -> Result<Vec<String>> {
        Ok(self
            .mailboxes
            .borrow()
            .keys()
            .filter(|(a, _)| a == account)
            .map(|(_, m)| m.clone())
            .collect())
    }

    fn fetch<'a>(&'a self, account: &str, mailbox: &str, filter: &Filter) -> Result<RawEmails<'a>> {
        self.fetches.set(self.fetches.get() + 1);
        if self.denied {
            return Err(ScrapeError::AutomationDenied("not authorized (-1743)".into()));
        }
        let boxes = self.mailboxes.borrow();
        let all = boxes
            .get(&(account.to_string(), mailbox.to_string()))
            .ok_or_else(|| ScrapeError::MailboxNotFound {
                account: account.to_string(),
                mailbox: mailbox.to_string(),
            })?;

        let mut selected: Vec<RawEmail> = match filter {
            Filter::ExactDate(day) => all
                .iter()
                .filter(|e| e.received_at.date == *day)
                .cloned()
                .collect(),
            _ => all.clone(),
        };
        if let Some(limit) = filter.limit() {
            selected.truncate(limit);
        }

        let fail_after = self.fail_after;
        Ok(Box::new(selected.into_iter().enumerate().map(move |(i, e)| {
            match fail_after {
                Some(n) if i >= n => Err(ScrapeError::Driver("Outlook stopped responding".into())),
                _ => Ok(e),
            }
        })))
    }
}

/// Store wrapper that rejects chosen subjects, to exercise per-record
/// failure handling.
pub struct FlakyRepo<R> {
    pub inner: R,
    pub reject_subject: String,
    pub fatal: bool,
}

impl<R: MailRepository> MailRepository for FlakyRepo<R> {
    fn insert(&self, record: &MailRecord) -> Result<bool> {
        if record.subject == self.reject_subject {
            let code = if self.fatal {
                rusqlite::ffi::SQLITE_IOERR
            } else {
                rusqlite::ffi::SQLITE_CONSTRAINT
            };
            return Err(ScrapeError::Store(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(code),
                Some("rejected".into()),
            )));
        }
        self.inner.insert(record)
    }

    fn query(&self, range: DateRange) -> Result<Vec<MailRecord>> {
        self.inner.query(range)
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }
}
