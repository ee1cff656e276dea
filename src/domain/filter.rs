use std::fmt;

use chrono::{Days, NaiveDate};

use crate::error::{Result, ScrapeError};

/// Which messages a single scrape pulls from one mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Every message received on this local calendar day.
    ExactDate(NaiveDate),
    /// The N most recent messages, newest first.
    MostRecent(usize),
    /// Only the newest message.
    Latest,
}

impl Filter {
    /// Turn the command line selection into a filter. `today` is the local
    /// date at invocation time; with nothing selected the filter is
    /// yesterday.
    pub fn resolve(
        date: Option<NaiveDate>,
        count: Option<usize>,
        latest: bool,
        today: NaiveDate,
    ) -> Result<Self> {
        match (date, count, latest) {
            (None, None, false) => Ok(Self::yesterday(today)),
            (Some(d), None, false) => {
                if d >= today {
                    return Err(ScrapeError::future_date(d, today));
                }
                Ok(Self::ExactDate(d))
            }
            (None, Some(0), false) => Err(ScrapeError::InvalidFilter(
                "--count must be at least 1".to_string(),
            )),
            (None, Some(n), false) => Ok(Self::MostRecent(n)),
            (None, None, true) => Ok(Self::Latest),
            _ => Err(ScrapeError::InvalidFilter(
                "--date, --count and --latest are mutually exclusive".to_string(),
            )),
        }
    }

    pub fn yesterday(today: NaiveDate) -> Self {
        Self::ExactDate(today.checked_sub_days(Days::new(1)).unwrap_or(today))
    }

    /// Upper bound on the number of messages fetched, if any.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Self::ExactDate(_) => None,
            Self::MostRecent(n) => Some(*n),
            Self::Latest => Some(1),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactDate(d) => write!(f, "{}", d.format("%d-%m-%Y")),
            Self::MostRecent(n) => write!(f, "{n} most recent"),
            Self::Latest => write!(f, "latest"),
        }
    }
}
