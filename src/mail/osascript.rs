//! Legacy Outlook for Mac, driven through AppleScript via `osascript`.

use chrono::{Datelike, NaiveDate};
use log::{debug, warn};

use crate::domain::email::{RawEmail, ReceivedAt};
use crate::domain::filter::Filter;
use crate::error::{Result, ScrapeError};
use crate::mail::driver::{MailDriver, RawEmails, conform, path_segments};
use crate::mail::process::run_script;

const FIELD_SEP: &str = "|||DELIM|||";
const RECORD_SEP: &str = "|||EMAIL|||";

const HELPERS: &str = r#"
on pad(n)
    if n < 10 then return "0" & (n as string)
    return n as string
end pad

on stamp(d)
    set secs to time of d
    return ((year of d) as string) & "-" & my pad((month of d) as integer) & "-" & my pad(day of d) & " " & my pad(secs div 3600) & ":" & my pad((secs mod 3600) div 60) & ":" & my pad(secs mod 60)
end stamp

on walk(f, prefix, acc)
    tell application "Microsoft Outlook"
        repeat with sub in (mail folders of f)
            set p to prefix & (name of sub)
            set end of acc to p
            my walk(sub, p & "/", acc)
        end repeat
    end tell
    return acc
end walk
"#;

pub struct OsascriptDriver {
    osascript: String,
}

impl OsascriptDriver {
    pub fn new(osascript: impl Into<String>) -> Self {
        Self {
            osascript: osascript.into(),
        }
    }

    fn run(&self, script: &str, account: &str, mailbox: &str) -> Result<String> {
        run_script(&self.osascript, &["-e"], script, |stderr| {
            classify_error(stderr, account, mailbox)
        })
    }
}

impl MailDriver for OsascriptDriver {
    fn list_accounts(&self) -> Result<Vec<String>> {
        let script = r#"
tell application "Microsoft Outlook"
    set names to name of every exchange account
end tell
set AppleScript's text item delimiters to linefeed
return names as text
"#;
        Ok(split_lines(&self.run(script, "", "")?))
    }

    fn list_mailboxes(&self, account: &str) -> Result<Vec<String>> {
        let script = format!(
            "{HELPERS}\n{select}\nset paths to my walk(acct, \"\", {{}})\n\
             set AppleScript's text item delimiters to linefeed\nreturn paths as text\n",
            select = select_account(account),
        );
        Ok(split_lines(&self.run(&script, account, "")?))
    }

    fn fetch<'a>(&'a self, account: &str, mailbox: &str, filter: &Filter) -> Result<RawEmails<'a>> {
        let out = match (filter, filter.limit()) {
            (Filter::ExactDate(day), _) => {
                self.run(&day_script(account, mailbox, *day), account, mailbox)?
            }
            (_, limit) => {
                // Outlook hands messages back in its own order, so pick the
                // newest by timestamp before asking for any bodies.
                let index = self.run(&index_script(account, mailbox), account, mailbox)?;
                let ids = newest_ids(parse_index(&index), limit.unwrap_or(usize::MAX));
                if ids.is_empty() {
                    String::new()
                } else {
                    self.run(&messages_by_id_script(&ids), account, mailbox)?
                }
            }
        };
        let emails = conform(parse_messages(&out), filter);
        debug!("{account}/{mailbox}: osascript returned {} messages", emails.len());
        Ok(Box::new(emails.into_iter().map(Ok)))
    }
}

/// Quote a value as an AppleScript string literal.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn select_account(account: &str) -> String {
    format!(
        "tell application \"Microsoft Outlook\"\n\
         \tset acct to missing value\n\
         \ttry\n\t\tset acct to (first exchange account whose name is {name})\n\tend try\n\
         \tif acct is missing value then error \"ACCOUNT_NOT_FOUND\"\n\
         end tell",
        name = quote(account),
    )
}

fn select_mailbox(mailbox: &str) -> String {
    let mut steps = String::new();
    for segment in path_segments(mailbox) {
        steps.push_str(&format!(
            "\t\tset mb to (first mail folder of mb whose name is {})\n",
            quote(segment)
        ));
    }
    format!(
        "tell application \"Microsoft Outlook\"\n\
         \tset mb to acct\n\
         \ttry\n{steps}\ton error\n\t\terror \"MAILBOX_NOT_FOUND\"\n\tend try\n\
         end tell"
    )
}

const EMIT: &str = r#"
        set msgSubject to subject of msg
        if msgSubject is missing value then set msgSubject to ""
        set msgContent to plain text content of msg
        if msgContent is missing value then set msgContent to ""
        set end of out to msgSubject & "|||DELIM|||" & msgContent & "|||DELIM|||" & my stamp(time received of msg)"#;

const RETURN_RECORDS: &str = r#"
set AppleScript's text item delimiters to "|||EMAIL|||"
return out as text
"#;

/// All messages received on `day`, in whatever order Outlook yields them.
fn day_script(account: &str, mailbox: &str, day: NaiveDate) -> String {
    format!(
        r#"{HELPERS}
{account}
{mailbox}
set out to {{}}
tell application "Microsoft Outlook"
    set startDate to current date
    set day of startDate to 1
    set year of startDate to {y}
    set month of startDate to {m}
    set day of startDate to {d}
    set time of startDate to 0
    set endDate to startDate + days
    set msgs to (messages of mb whose time received >= startDate and time received < endDate)
    repeat with msg in msgs{EMIT}
    end repeat
end tell{RETURN_RECORDS}"#,
        account = select_account(account),
        mailbox = select_mailbox(mailbox),
        y = day.year(),
        m = day.month(),
        d = day.day(),
    )
}

/// `id DELIM stamp` per message: cheap bulk property reads, no bodies.
fn index_script(account: &str, mailbox: &str) -> String {
    format!(
        r#"{HELPERS}
{account}
{mailbox}
tell application "Microsoft Outlook"
    set ids to id of every message of mb
    set times to time received of every message of mb
end tell
set out to {{}}
repeat with i from 1 to count of ids
    set t to item i of times
    if t is not missing value then
        set end of out to ((item i of ids) as string) & "{FIELD_SEP}" & my stamp(t)
    end if
end repeat
set AppleScript's text item delimiters to linefeed
return out as text
"#,
        account = select_account(account),
        mailbox = select_mailbox(mailbox),
    )
}

fn messages_by_id_script(ids: &[i64]) -> String {
    let list = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
    format!(
        r#"{HELPERS}
set out to {{}}
tell application "Microsoft Outlook"
    repeat with msgId in {{{list}}}
        set msg to message id (msgId as integer){EMIT}
    end repeat
end tell{RETURN_RECORDS}"#
    )
}

fn parse_index(out: &str) -> Vec<(i64, ReceivedAt)> {
    let mut index = Vec::new();
    for line in split_lines(out) {
        let Some((id, stamp)) = line.split_once(FIELD_SEP) else {
            warn!("skipping malformed osascript index line {line:?}");
            continue;
        };
        match (id.trim().parse::<i64>(), stamp.parse::<ReceivedAt>()) {
            (Ok(id), Ok(received_at)) => index.push((id, received_at)),
            _ => warn!("skipping unreadable osascript index line {line:?}"),
        }
    }
    index
}

/// Ids of the `limit` most recently received messages, newest first.
fn newest_ids(mut index: Vec<(i64, ReceivedAt)>, limit: usize) -> Vec<i64> {
    index.sort_by(|a, b| b.1.cmp(&a.1));
    index.truncate(limit);
    index.into_iter().map(|(id, _)| id).collect()
}

fn split_lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `subject DELIM content DELIM stamp` records. Malformed records are
/// skipped with a warning rather than failing the whole mailbox.
pub fn parse_messages(out: &str) -> Vec<RawEmail> {
    let mut emails = Vec::new();
    for record in out.split(RECORD_SEP) {
        if record.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = record.splitn(3, FIELD_SEP).collect();
        let [subject, body, stamp] = parts[..] else {
            warn!("skipping malformed osascript record ({} fields)", parts.len());
            continue;
        };
        let received_at = match stamp.parse::<ReceivedAt>() {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping message with unreadable date: {e}");
                continue;
            }
        };
        emails.push(RawEmail {
            subject: subject.trim().to_string(),
            body: body.to_string(),
            received_at,
            is_html: false,
        });
    }
    emails
}

fn classify_error(stderr: &str, account: &str, mailbox: &str) -> ScrapeError {
    let lower = stderr.to_lowercase();
    if stderr.contains("-1743") || lower.contains("not authorized") || lower.contains("not allowed") {
        ScrapeError::AutomationDenied(stderr.to_string())
    } else if stderr.contains("MAILBOX_NOT_FOUND") {
        ScrapeError::MailboxNotFound {
            account: account.to_string(),
            mailbox: mailbox.to_string(),
        }
    } else if stderr.contains("ACCOUNT_NOT_FOUND") {
        ScrapeError::AccountNotFound(account.to_string())
    } else {
        ScrapeError::Driver(stderr.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_delimited_output() {
        let out = format!(
            "Status{FIELD_SEP}All good\nthanks{FIELD_SEP}2025-05-23 09:15:00{RECORD_SEP}\
             {FIELD_SEP}{FIELD_SEP}2025-05-22 18:00:07"
        );
        let emails = parse_messages(&out);
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].subject, "Status");
        assert_eq!(emails[0].body, "All good\nthanks");
        assert_eq!(emails[0].received_at.to_string(), "2025-05-23 09:15:00");
        assert_eq!(emails[1].subject, "");
    }

    #[test]
    fn skips_malformed_records() {
        let out = format!("only one field{RECORD_SEP}S{FIELD_SEP}B{FIELD_SEP}not a date");
        assert!(parse_messages(&out).is_empty());
        assert!(parse_messages("").is_empty());
    }

    #[test]
    fn classifies_script_errors() {
        assert!(matches!(
            classify_error("execution error: Not authorized to send Apple events to Microsoft Outlook. (-1743)", "a", "b"),
            ScrapeError::AutomationDenied(_)
        ));
        assert!(matches!(
            classify_error("execution error: MAILBOX_NOT_FOUND (-2700)", "a", "Inbox/X"),
            ScrapeError::MailboxNotFound { mailbox, .. } if mailbox == "Inbox/X"
        ));
        assert!(matches!(
            classify_error("Microsoft Outlook got an error: Connection is invalid. (-609)", "a", "b"),
            ScrapeError::Driver(_)
        ));
    }

    #[test]
    fn script_walks_each_path_segment_with_escaping() {
        let script = day_script(
            "Jo \"Work\"",
            "Inbox/Resolved",
            NaiveDate::from_ymd_opt(2025, 5, 23).unwrap(),
        );
        assert!(script.contains(r#"whose name is "Jo \"Work\"""#));
        assert!(script.contains(r#"first mail folder of mb whose name is "Inbox""#));
        assert!(script.contains(r#"first mail folder of mb whose name is "Resolved""#));
        assert!(script.contains("set day of startDate to 23"));
        assert!(script.contains(FIELD_SEP));
        assert!(script.contains(RECORD_SEP));
    }

    #[test]
    fn count_fetch_reads_timestamps_before_any_body() {
        let index = index_script("a", "Inbox");
        assert!(index.contains("time received of every message of mb"));
        assert!(!index.contains("plain text content"));

        let bodies = messages_by_id_script(&[42, 7]);
        assert!(bodies.contains("repeat with msgId in {42, 7}"));
        assert!(bodies.contains("plain text content of msg"));
    }

    #[test]
    fn picks_the_newest_ids_whatever_the_client_order() {
        let out = format!(
            "11{FIELD_SEP}2025-05-20 08:00:00\n\
             12{FIELD_SEP}2025-05-23 09:00:00\n\
             oops\n\
             13{FIELD_SEP}2025-05-21 17:30:00\n\
             14{FIELD_SEP}2025-05-23 09:00:01\n"
        );
        let index = parse_index(&out);
        assert_eq!(index.len(), 4);
        assert_eq!(newest_ids(index.clone(), 2), vec![14, 12]);
        assert_eq!(newest_ids(index.clone(), 1), vec![14]);
        assert_eq!(newest_ids(index, 10), vec![14, 12, 13, 11]);
    }
}
