use chrono::NaiveDate;

use crate::domain::email::MailRecord;
use crate::error::Result;

/// Which stored records a query returns, by local received date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    /// Received on this calendar day.
    On(NaiveDate),
    /// Received strictly before this day.
    Before(NaiveDate),
    All,
}

/// Persistent, append-only set of mail records keyed by
/// `(subject, content, received_at)`.
pub trait MailRepository {
    /// Returns `false` when a record with the same key is already stored;
    /// the stored record is left untouched.
    fn insert(&self, record: &MailRecord) -> Result<bool>;

    /// Ordered by `received_at`, then subject, then content.
    fn query(&self, range: DateRange) -> Result<Vec<MailRecord>>;

    fn count(&self) -> Result<usize>;
}
