//! Pull one mailbox through the driver, clean each message and merge it
//! into the record store.

pub mod batch;

use chrono::NaiveDate;
use log::{debug, info, warn};

use crate::domain::email::{MailRecord, MessageHeader, RawEmail};
use crate::domain::filter::Filter;
use crate::error::{RecordFailure, Result};
use crate::mail::driver::MailDriver;
use crate::mail::meeting::is_meeting_or_booking;
use crate::mail::normalize::{ClientHints, normalize};
use crate::store::repo::MailRepository;

pub const DEBUG_LISTING_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct ScrapeOptions {
    /// Drop Teams meeting and Bookings notifications.
    pub skip_meetings: bool,
    /// Drop messages received on or after this day.
    pub before: Option<NaiveDate>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            skip_meetings: true,
            before: None,
        }
    }
}

/// Counts for one scrape. Every seen message ends up in exactly one of
/// `inserted`, `filtered`, `failures` or the duplicates.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub seen: usize,
    pub inserted: usize,
    pub filtered: usize,
    pub failures: Vec<RecordFailure>,
    /// Records now in the store for this scrape, new or already present,
    /// in delivery order.
    pub records: Vec<MailRecord>,
}

impl ScrapeOutcome {
    pub fn duplicates(&self) -> usize {
        self.seen - self.inserted - self.filtered - self.failures.len()
    }

    /// `(records_seen, records_inserted)`.
    pub fn counts(&self) -> (usize, usize) {
        (self.seen, self.inserted)
    }
}

pub struct Scraper<'a> {
    driver: &'a dyn MailDriver,
    repo: &'a dyn MailRepository,
    options: ScrapeOptions,
}

impl<'a> Scraper<'a> {
    pub fn new(driver: &'a dyn MailDriver, repo: &'a dyn MailRepository, options: ScrapeOptions) -> Self {
        Self {
            driver,
            repo,
            options,
        }
    }

    pub fn driver(&self) -> &'a dyn MailDriver {
        self.driver
    }

    /// Fetch `account/mailbox` with `filter` and merge every message into
    /// the store, in the order the driver delivers them.
    ///
    /// Driver errors and fatal store errors abort the scrape; whatever was
    /// inserted before stays committed. A record the store rejects is
    /// recorded in `failures` and the rest of the batch continues.
    pub fn scrape(&self, account: &str, mailbox: &str, filter: &Filter) -> Result<ScrapeOutcome> {
        self.scrape_stream(account, mailbox, "", filter)
    }

    /// [`Scraper::scrape`], tagging every stored record with `stream`.
    pub fn scrape_stream(
        &self,
        account: &str,
        mailbox: &str,
        stream: &str,
        filter: &Filter,
    ) -> Result<ScrapeOutcome> {
        info!("scraping {account}/{mailbox} ({filter})");
        let mut outcome = ScrapeOutcome::default();

        for raw in self.driver.fetch(account, mailbox, filter)? {
            let raw = raw?;
            outcome.seen += 1;

            let Some(record) = self.to_record(account, mailbox, stream, raw) else {
                outcome.filtered += 1;
                continue;
            };

            match self.repo.insert(&record) {
                Ok(true) => {
                    outcome.inserted += 1;
                    outcome.records.push(record);
                }
                Ok(false) => {
                    debug!("duplicate: {:?}", record.key());
                    outcome.records.push(record);
                }
                Err(e) if e.is_fatal_store() => return Err(e),
                Err(e) => {
                    warn!(
                        "could not store {:?} ({}): {e}",
                        record.subject, record.received_at
                    );
                    outcome.failures.push(RecordFailure {
                        subject: record.subject,
                        received_at: record.received_at,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "{account}/{mailbox}: {} seen, {} new, {} duplicates, {} filtered, {} failed",
            outcome.seen,
            outcome.inserted,
            outcome.duplicates(),
            outcome.filtered,
            outcome.failures.len()
        );
        Ok(outcome)
    }

    fn to_record(&self, account: &str, mailbox: &str, stream: &str, raw: RawEmail) -> Option<MailRecord> {
        if let Some(before) = self.options.before
            && raw.received_at.date >= before
        {
            return None;
        }
        if self.options.skip_meetings && is_meeting_or_booking(&raw.subject, &raw.body) {
            debug!("skipping meeting notification {:?}", raw.subject);
            return None;
        }

        let content = normalize(&raw.body, ClientHints { html: raw.is_html });
        if raw.subject.is_empty() && content.is_empty() {
            return None;
        }
        Some(MailRecord {
            account: account.to_string(),
            mailbox_path: mailbox.to_string(),
            subject: raw.subject,
            content,
            received_at: raw.received_at,
            stream: stream.to_string(),
        })
    }
}

/// Newest messages of a mailbox for inspection. Takes no store, so it
/// cannot write one.
pub fn list_recent(
    driver: &dyn MailDriver,
    account: &str,
    mailbox: &str,
    limit: usize,
) -> Result<Vec<MessageHeader>> {
    driver
        .fetch(account, mailbox, &Filter::MostRecent(limit))?
        .map(|raw| {
            raw.map(|r| MessageHeader {
                subject: r.subject,
                received_at: r.received_at,
            })
        })
        .collect()
}
