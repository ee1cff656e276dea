use std::path::Path;

use chrono::Days;
use log::debug;
use rusqlite::{Connection, Row, params};

use crate::domain::email::{MailRecord, ReceivedAt};
use crate::error::{Result, ScrapeError};
use crate::store::repo::{DateRange, MailRepository};

const COLUMNS: &str = "account, mailbox_path, subject, content, received_at, stream";
const ORDER: &str = "ORDER BY received_at ASC, subject ASC, content ASC";

/// SQLite-backed record store. Opened once per invocation; the connection
/// is released on [`SqliteRepo::close`] or when dropped.
pub struct SqliteRepo {
    conn: Connection,
}

impl SqliteRepo {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        debug!("opening store at {}", path.display());
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.migrate()?;
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self> {
        let repo = Self {
            conn: Connection::open_in_memory()?,
        };
        repo.migrate()?;
        Ok(repo)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS emails (
                account       TEXT NOT NULL DEFAULT '',
                mailbox_path  TEXT NOT NULL DEFAULT '',
                subject       TEXT NOT NULL,
                content       TEXT NOT NULL,
                received_at   TEXT NOT NULL,
                stream        TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (subject, content, received_at)
            );

            CREATE INDEX IF NOT EXISTS idx_emails_received
                ON emails(received_at);
            "#,
        )?;

        // Stores created before provenance tracking lack the stream column.
        let has_stream = self
            .conn
            .prepare("SELECT 1 FROM pragma_table_info('emails') WHERE name = 'stream'")?
            .exists([])?;
        if !has_stream {
            debug!("adding stream column to existing store");
            self.conn.execute(
                "ALTER TABLE emails ADD COLUMN stream TEXT NOT NULL DEFAULT ''",
                [],
            )?;
        }
        Ok(())
    }

    /// Flush and release the database, surfacing any error the implicit
    /// close on drop would swallow.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| ScrapeError::Store(e))
    }

    fn select(&self, clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<MailRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM emails {clause} {ORDER}");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(args)?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            out.push(record_from_row(r)?);
        }
        Ok(out)
    }
}

fn record_from_row(r: &Row<'_>) -> Result<MailRecord> {
    let received: String = r.get(4)?;
    Ok(MailRecord {
        account: r.get(0)?,
        mailbox_path: r.get(1)?,
        subject: r.get(2)?,
        content: r.get(3)?,
        received_at: received.parse::<ReceivedAt>()?,
        stream: r.get(5)?,
    })
}

fn day_text(date: chrono::NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl MailRepository for SqliteRepo {
    fn insert(&self, record: &MailRecord) -> Result<bool> {
        let changed = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO emails (account, mailbox_path, subject, content, received_at, stream)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.account,
                record.mailbox_path,
                record.subject,
                record.content,
                record.received_at.to_string(),
                record.stream,
            ],
        )?;
        Ok(changed == 1)
    }

    fn query(&self, range: DateRange) -> Result<Vec<MailRecord>> {
        match range {
            // Text timestamps sort chronologically, so a day is the half-open
            // range [day, next day).
            DateRange::On(day) => {
                let next = day.checked_add_days(Days::new(1)).unwrap_or(day);
                self.select(
                    "WHERE received_at >= ?1 AND received_at < ?2",
                    &[&day_text(day), &day_text(next)],
                )
            }
            DateRange::Before(day) => self.select("WHERE received_at < ?1", &[&day_text(day)]),
            DateRange::All => self.select("", &[]),
        }
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM emails", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    fn record(subject: &str, content: &str, received_at: ReceivedAt) -> MailRecord {
        MailRecord {
            account: "Work".into(),
            mailbox_path: "Inbox".into(),
            subject: subject.into(),
            content: content.into(),
            received_at,
            stream: String::new(),
        }
    }

    #[test]
    fn repeated_key_is_ignored_and_original_kept() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        let first = record("A", "body", ReceivedAt::on(date(22)));
        assert!(repo.insert(&first).unwrap());

        let mut again = first.clone();
        again.mailbox_path = "Archive".into();
        again.stream = "OPS".into();
        assert!(!repo.insert(&again).unwrap());

        assert_eq!(repo.query(DateRange::All).unwrap(), vec![first]);
    }

    #[test]
    fn any_key_difference_is_a_new_record() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        let base = record("A", "body", ReceivedAt::on(date(22)));
        assert!(repo.insert(&base).unwrap());
        assert!(repo.insert(&record("B", "body", ReceivedAt::on(date(22)))).unwrap());
        assert!(repo.insert(&record("A", "other", ReceivedAt::on(date(22)))).unwrap());
        assert!(repo.insert(&record("A", "body", ReceivedAt::on(date(23)))).unwrap());
        assert_eq!(repo.count().unwrap(), 4);
    }

    #[test]
    fn queries_are_date_bounded_and_ordered() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        let late = ReceivedAt::at(date(23).and_hms_opt(17, 0, 0).unwrap());
        for r in [
            record("z", "1", late),
            record("b", "2", ReceivedAt::on(date(23))),
            record("a", "3", ReceivedAt::on(date(23))),
            record("a", "0", ReceivedAt::on(date(24))),
            record("q", "9", ReceivedAt::on(date(21))),
        ] {
            repo.insert(&r).unwrap();
        }

        let on: Vec<_> = repo
            .query(DateRange::On(date(23)))
            .unwrap()
            .into_iter()
            .map(|r| r.subject)
            .collect();
        assert_eq!(on, vec!["a", "b", "z"]);

        let before: Vec<_> = repo
            .query(DateRange::Before(date(24)))
            .unwrap()
            .into_iter()
            .map(|r| r.received_at.date)
            .collect();
        assert_eq!(before, vec![date(21), date(23), date(23), date(23)]);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("emails.db");
        let rec = record("A", "body", ReceivedAt::on(date(22)));

        let repo = SqliteRepo::open(&path).unwrap();
        assert!(repo.insert(&rec).unwrap());
        repo.close().unwrap();

        let repo = SqliteRepo::open(&path).unwrap();
        assert!(!repo.insert(&rec).unwrap());
        assert_eq!(repo.query(DateRange::All).unwrap(), vec![rec]);
    }

    #[test]
    fn stream_is_stored_outside_the_key() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        let mut rec = record("A", "body", ReceivedAt::on(date(22)));
        rec.stream = "ADVISING".into();
        assert!(repo.insert(&rec).unwrap());
        assert_eq!(repo.query(DateRange::All).unwrap()[0].stream, "ADVISING");
    }

    #[test]
    fn older_stores_gain_the_stream_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emails.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE emails (
                account TEXT NOT NULL DEFAULT '',
                mailbox_path TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL,
                content TEXT NOT NULL,
                received_at TEXT NOT NULL,
                PRIMARY KEY (subject, content, received_at)
            );
            INSERT INTO emails VALUES ('Work', 'Inbox', 'old', 'x', '2025-05-20');",
        )
        .unwrap();
        conn.close().unwrap();

        let repo = SqliteRepo::open(&path).unwrap();
        let rows = repo.query(DateRange::All).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stream, "");
        let mut rec = record("new", "y", ReceivedAt::on(date(21)));
        rec.stream = "OPS".into();
        assert!(repo.insert(&rec).unwrap());
        assert_eq!(repo.count().unwrap(), 2);
    }
}
