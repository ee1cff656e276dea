use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;

const DATE_FMT: &str = "%Y-%m-%d";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// When a message was received, in local time. Drivers that only know the
/// calendar day leave `time` empty.
///
/// Ordering is by date, then time; a date-only value sorts before any timed
/// value on the same day. The text form (`YYYY-MM-DD` or
/// `YYYY-MM-DD HH:MM:SS`) sorts the same way, which the store relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReceivedAt {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

impl ReceivedAt {
    pub fn on(date: NaiveDate) -> Self {
        Self { date, time: None }
    }

    /// Sub-second precision is dropped so re-fetches of the same message
    /// produce the same key.
    pub fn at(datetime: NaiveDateTime) -> Self {
        let time = datetime.time();
        Self {
            date: datetime.date(),
            time: Some(time.with_nanosecond(0).unwrap_or(time)),
        }
    }
}

impl fmt::Display for ReceivedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time {
            Some(t) => write!(f, "{}", self.date.and_time(t).format(DATETIME_FMT)),
            None => write!(f, "{}", self.date.format(DATE_FMT)),
        }
    }
}

impl FromStr for ReceivedAt {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, DATETIME_FMT) {
            return Ok(Self::at(dt));
        }
        NaiveDate::parse_from_str(s, DATE_FMT)
            .map(Self::on)
            .map_err(|e| ScrapeError::invalid_date(s, e.to_string()))
    }
}

impl TryFrom<String> for ReceivedAt {
    type Error = ScrapeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ReceivedAt> for String {
    fn from(r: ReceivedAt) -> Self {
        r.to_string()
    }
}

/// Email as handed over by a mail client driver, before cleaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEmail {
    pub subject: String,
    pub body: String,
    pub received_at: ReceivedAt,
    /// The driver delivered the body as HTML rather than plain text.
    pub is_html: bool,
}

/// One scraped email. Identity is `(subject, content, received_at)`;
/// `account`, `mailbox_path` and `stream` only record where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailRecord {
    pub account: String,
    pub mailbox_path: String,
    pub subject: String,
    pub content: String,
    pub received_at: ReceivedAt,
    /// Team or work stream from the batch paths file; empty for single scrapes.
    #[serde(default)]
    pub stream: String,
}

impl MailRecord {
    pub fn key(&self) -> (&str, &str, &ReceivedAt) {
        (&self.subject, &self.content, &self.received_at)
    }
}

/// Subject and arrival time of a message, as shown by the debug listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub subject: String,
    pub received_at: ReceivedAt,
}

/// Parse a `DD-MM-YYYY` date as typed on the command line.
pub fn parse_cli_date(input: &str) -> Result<NaiveDate, ScrapeError> {
    NaiveDate::parse_from_str(input.trim(), "%d-%m-%Y")
        .map_err(|_| ScrapeError::invalid_date(input, "expected DD-MM-YYYY"))
}
