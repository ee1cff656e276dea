//! Select stored records by date and write them out as CSV.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{Days, NaiveDate};
use log::info;

use crate::domain::email::MailRecord;
use crate::domain::filter::Filter;
use crate::error::Result;
use crate::store::repo::{DateRange, MailRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Records received on this day.
    Date(NaiveDate),
    /// Everything received before today; today may still be arriving.
    AllUpToYesterday,
    Yesterday,
}

fn yesterday(today: NaiveDate) -> NaiveDate {
    today.checked_sub_days(Days::new(1)).unwrap_or(today)
}

/// Records for `mode`, with `today` being the local date at invocation.
pub fn select(repo: &dyn MailRepository, mode: ExportMode, today: NaiveDate) -> Result<Vec<MailRecord>> {
    let range = match mode {
        ExportMode::Date(day) => DateRange::On(day),
        ExportMode::AllUpToYesterday => DateRange::Before(today),
        ExportMode::Yesterday => DateRange::On(yesterday(today)),
    };
    repo.query(range)
}

/// Make a name safe for a file name: spaces become `-`, the mailbox
/// separator `/` becomes `--`.
pub fn filename_token(name: &str) -> String {
    name.trim().replace(' ', "-").replace('/', "--")
}

pub fn export_filename(label: &str, mode: ExportMode, today: NaiveDate) -> String {
    let suffix = match mode {
        ExportMode::Date(day) => day.format("%d-%m-%Y").to_string(),
        ExportMode::AllUpToYesterday => "all".to_string(),
        ExportMode::Yesterday => yesterday(today).format("%d-%m-%Y").to_string(),
    };
    format!("{}_{suffix}.csv", filename_token(label))
}

/// File name for the records of one scrape of `account/mailbox`.
pub fn scrape_filename(account: &str, mailbox: &str, filter: &Filter) -> String {
    let suffix = match filter {
        Filter::ExactDate(day) => day.format("%d-%m-%Y").to_string(),
        Filter::MostRecent(n) => format!("recent-{n}"),
        Filter::Latest => "latest".to_string(),
    };
    format!(
        "{}_{}_{suffix}.csv",
        filename_token(account),
        filename_token(mailbox)
    )
}

/// RFC 4180 field: newlines become spaces, quoted when needed.
fn csv_field(value: &str) -> String {
    let flat = value
        .split(['\r', '\n'])
        .filter(|s| !s.trim().is_empty())
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ");
    if flat.contains(',') || flat.contains('"') {
        format!("\"{}\"", flat.replace('"', "\"\""))
    } else {
        flat
    }
}

pub fn write_csv_to<W: Write>(records: &[MailRecord], mut out: W) -> Result<()> {
    writeln!(out, "subject,content,received")?;
    for r in records {
        writeln!(
            out,
            "{},{},{}",
            csv_field(&r.subject),
            csv_field(&r.content),
            r.received_at
        )?;
    }
    out.flush()?;
    Ok(())
}

/// Write `records` to `path`, creating parent directories.
pub fn write_csv(records: &[MailRecord], path: &Path) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }
    write_csv_to(records, BufWriter::new(File::create(path)?))?;
    info!("exported {} emails to {}", records.len(), path.display());
    Ok(())
}
