//! Classic Outlook for Windows, driven through its COM object from
//! PowerShell. Scripts print JSON on stdout and markers on stderr.

use chrono::Datelike;
use log::debug;
use serde::Deserialize;

use crate::domain::email::{RawEmail, ReceivedAt};
use crate::domain::filter::Filter;
use crate::error::{Result, ScrapeError};
use crate::mail::driver::{MailDriver, RawEmails, conform, path_segments};
use crate::mail::process::run_script;

const PRELUDE: &str = r#"
$ErrorActionPreference = 'Stop'
[Console]::OutputEncoding = [System.Text.Encoding]::UTF8
try {
    $outlook = New-Object -ComObject Outlook.Application
} catch {
    [Console]::Error.WriteLine("AUTOMATION_DENIED: $($_.Exception.Message)")
    exit 2
}
$ns = $outlook.GetNamespace('MAPI')
"#;

#[derive(Debug, Deserialize)]
struct PsMessage {
    subject: Option<String>,
    body: Option<String>,
    received: String,
}

pub struct PowerShellDriver {
    powershell: String,
}

impl PowerShellDriver {
    pub fn new(powershell: impl Into<String>) -> Self {
        Self {
            powershell: powershell.into(),
        }
    }

    fn run(&self, script: &str, account: &str, mailbox: &str) -> Result<String> {
        run_script(
            &self.powershell,
            &["-NoProfile", "-NonInteractive", "-Command"],
            script,
            |stderr| classify_error(stderr, account, mailbox),
        )
    }
}

impl MailDriver for PowerShellDriver {
    fn list_accounts(&self) -> Result<Vec<String>> {
        let script = format!(
            "{PRELUDE}\n$names = @($ns.Accounts | ForEach-Object {{ [string]$_.DisplayName }})\n\
             ConvertTo-Json -InputObject $names -Compress\n"
        );
        parse_json(&self.run(&script, "", "")?)
    }

    fn list_mailboxes(&self, account: &str) -> Result<Vec<String>> {
        let script = format!(
            r#"{PRELUDE}
{select}
$paths = New-Object System.Collections.ArrayList
function Walk($folder, $prefix) {{
    foreach ($sub in $folder.Folders) {{
        $p = $prefix + $sub.Name
        [void]$paths.Add($p)
        Walk $sub ($p + '/')
    }}
}}
Walk ($acct.DeliveryStore.GetRootFolder()) ''
ConvertTo-Json -InputObject @($paths) -Compress
"#,
            select = select_account(account),
        );
        parse_json(&self.run(&script, account, "")?)
    }

    fn fetch<'a>(&'a self, account: &str, mailbox: &str, filter: &Filter) -> Result<RawEmails<'a>> {
        let script = fetch_script(account, mailbox, filter);
        let out = self.run(&script, account, mailbox)?;
        let emails = conform(parse_messages(&out)?, filter);
        debug!("{account}/{mailbox}: powershell returned {} messages", emails.len());
        Ok(Box::new(emails.into_iter().map(Ok)))
    }
}

/// Quote a value as a single-quoted PowerShell literal.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn select_account(account: &str) -> String {
    format!(
        "$acct = $ns.Accounts | Where-Object {{ $_.DisplayName -eq {name} }} | Select-Object -First 1\n\
         if (-not $acct) {{ [Console]::Error.WriteLine('ACCOUNT_NOT_FOUND'); exit 3 }}",
        name = quote(account),
    )
}

fn fetch_script(account: &str, mailbox: &str, filter: &Filter) -> String {
    let segments = path_segments(mailbox)
        .into_iter()
        .map(quote)
        .collect::<Vec<_>>()
        .join(", ");
    let restrict = match filter {
        Filter::ExactDate(day) => format!(
            "$start = Get-Date -Year {y} -Month {m} -Day {d} -Hour 0 -Minute 0 -Second 0\n\
             $end = $start.AddDays(1)\n\
             $items = $items.Restrict(\"[ReceivedTime] >= '\" + $start.ToString('g') + \"' AND [ReceivedTime] < '\" + $end.ToString('g') + \"'\")\n",
            y = day.year(),
            m = day.month(),
            d = day.day(),
        ),
        _ => String::new(),
    };
    format!(
        r#"{PRELUDE}
{select}
$folder = $acct.DeliveryStore.GetRootFolder()
foreach ($seg in @({segments})) {{
    $next = $null
    foreach ($f in $folder.Folders) {{ if ($f.Name -eq $seg) {{ $next = $f; break }} }}
    if (-not $next) {{ [Console]::Error.WriteLine('MAILBOX_NOT_FOUND'); exit 4 }}
    $folder = $next
}}
$items = $folder.Items
{restrict}$items.Sort('[ReceivedTime]', $true)
$limit = {limit}
$out = New-Object System.Collections.ArrayList
foreach ($m in $items) {{
    if ($m.Class -ne 43) {{ continue }}
    [void]$out.Add([pscustomobject]@{{
        subject = [string]$m.Subject
        body = [string]$m.Body
        received = $m.ReceivedTime.ToString('yyyy-MM-dd HH:mm:ss')
    }})
    if ($limit -gt 0 -and $out.Count -ge $limit) {{ break }}
}}
ConvertTo-Json -InputObject @($out) -Compress -Depth 2
"#,
        select = select_account(account),
        limit = filter.limit().unwrap_or(0),
    )
}

fn parse_json<T: serde::de::DeserializeOwned>(out: &str) -> Result<Vec<T>> {
    if out.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(out)
        .map_err(|e| ScrapeError::Driver(format!("unexpected PowerShell output: {e}")))
}

pub fn parse_messages(out: &str) -> Result<Vec<RawEmail>> {
    parse_json::<PsMessage>(out)?
        .into_iter()
        .map(|m| {
            Ok(RawEmail {
                subject: m.subject.unwrap_or_default().trim().to_string(),
                body: m.body.unwrap_or_default(),
                received_at: m.received.parse::<ReceivedAt>()?,
                is_html: false,
            })
        })
        .collect()
}

fn classify_error(stderr: &str, account: &str, mailbox: &str) -> ScrapeError {
    if stderr.contains("AUTOMATION_DENIED")
        || stderr.contains("0x80080005")
        || stderr.contains("Access is denied")
    {
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
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_json_messages() {
        let out = r#"[{"subject":" Hi ","body":"Line 1\r\nLine 2","received":"2025-05-23 08:30:00"},
                      {"subject":null,"body":null,"received":"2025-05-22 23:59:59"}]"#;
        let emails = parse_messages(out).unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].subject, "Hi");
        assert_eq!(emails[0].body, "Line 1\r\nLine 2");
        assert_eq!(emails[1].subject, "");
        assert_eq!(
            emails[1].received_at.date,
            NaiveDate::from_ymd_opt(2025, 5, 22).unwrap()
        );
    }

    #[test]
    fn empty_output_is_an_empty_mailbox() {
        assert!(parse_messages("").unwrap().is_empty());
        assert!(parse_messages("[]").unwrap().is_empty());
    }

    #[test]
    fn garbage_output_is_a_driver_error() {
        assert!(matches!(
            parse_messages("Exception calling GetRootFolder"),
            Err(ScrapeError::Driver(_))
        ));
    }

    #[test]
    fn classifies_markers() {
        assert!(matches!(
            classify_error("AUTOMATION_DENIED: Retrieving the COM class factory failed", "a", "b"),
            ScrapeError::AutomationDenied(_)
        ));
        assert!(matches!(
            classify_error("MAILBOX_NOT_FOUND", "a", "Inbox/Gone"),
            ScrapeError::MailboxNotFound { .. }
        ));
        assert!(matches!(
            classify_error("ACCOUNT_NOT_FOUND", "nobody", ""),
            ScrapeError::AccountNotFound(a) if a == "nobody"
        ));
    }

    #[test]
    fn script_restricts_exact_dates_and_quotes_names() {
        let day = NaiveDate::from_ymd_opt(2025, 5, 23).unwrap();
        let script = fetch_script("O'Brien", "Inbox/Resolved", &Filter::ExactDate(day));
        assert!(script.contains("-eq 'O''Brien'"));
        assert!(script.contains("@('Inbox', 'Resolved')"));
        assert!(script.contains("-Year 2025 -Month 5 -Day 23"));
        assert!(script.contains("$limit = 0"));
        assert!(!fetch_script("a", "Inbox", &Filter::Latest).contains("Restrict"));
    }
}
