use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use outlook_scraper::config::{Config, load_config, resolve_db_path};
use outlook_scraper::domain::email::parse_cli_date;
use outlook_scraper::domain::filter::Filter;
use outlook_scraper::export::{self, ExportMode};
use outlook_scraper::mail::driver_for;
use outlook_scraper::scrape::batch::{load_mailbox_paths, run_batch};
use outlook_scraper::scrape::{DEBUG_LISTING_LIMIT, ScrapeOptions, ScrapeOutcome, Scraper, list_recent};
use outlook_scraper::store::sqlite::SqliteRepo;

#[derive(Parser)]
#[command(name = "outlook_scraper")]
#[command(about = "Scrape Outlook mailboxes into a deduplicated local store", long_about = None)]
struct Cli {
    /// Show detailed processing information
    #[arg(long, global = true)]
    verbose: bool,

    /// Record store to use instead of the configured one
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the accounts the mail client exposes
    Accounts,

    /// List the mailbox paths of an account
    Mailboxes {
        #[arg(long)]
        account: String,
    },

    /// Scrape one mailbox into the store
    Scrape {
        #[arg(long)]
        account: String,

        /// Mailbox path, e.g. Inbox/Resolved
        #[arg(long)]
        mailbox: String,

        /// Day to scrape (DD-MM-YYYY); defaults to yesterday
        #[arg(long)]
        date: Option<String>,

        /// Scrape the N most recent emails
        #[arg(long)]
        count: Option<usize>,

        /// Scrape only the most recent email
        #[arg(long)]
        latest: bool,

        /// List the 20 most recent emails without touching the store
        /// (cannot be combined with --date, --count, --latest or --csv)
        #[arg(long, conflicts_with_all = ["date", "count", "latest", "csv"])]
        debug: bool,

        /// Work stream recorded with each stored email
        #[arg(long, default_value = "")]
        stream: String,

        /// Also write the scraped emails to CSV
        #[arg(long)]
        csv: bool,

        /// CSV path (overrides the default naming)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Scrape every mailbox listed in a paths file
    Batch {
        paths_file: PathBuf,

        /// Only scrape the block with this account name
        #[arg(long)]
        only_account: Option<String>,

        /// How many recent emails to pull per mailbox
        #[arg(long, default_value_t = 10_000)]
        count: usize,
    },

    /// Export stored emails to CSV
    Export {
        /// Day to export (DD-MM-YYYY); defaults to yesterday
        #[arg(long, conflicts_with = "all")]
        date: Option<String>,

        /// Export everything up to yesterday
        #[arg(long)]
        all: bool,

        /// Name used in the file name (defaults to the configured account_name)
        #[arg(long)]
        label: Option<String>,

        /// CSV path (overrides the default naming)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let cfg = load_config(cli.config.as_deref()).map_err(|e| anyhow!("Configuration error: {e}"))?;
    // Evaluated once so a run spanning midnight keeps one notion of "today".
    let today = Local::now().date_naive();

    match cli.cmd {
        Command::Accounts => {
            let driver = driver_for(cfg.platform(), &cfg);
            let accounts = driver.list_accounts()?;
            if accounts.is_empty() {
                println!("No accounts found.");
            }
            for a in accounts {
                println!("{a}");
            }
            Ok(())
        }

        Command::Mailboxes { account } => {
            let driver = driver_for(cfg.platform(), &cfg);
            let mailboxes = driver.list_mailboxes(&account)?;
            if mailboxes.is_empty() {
                println!("No mailboxes found for account: {account}");
            }
            for m in mailboxes {
                println!("{m}");
            }
            Ok(())
        }

        Command::Scrape {
            account,
            mailbox,
            date,
            count,
            latest,
            debug,
            stream,
            csv,
            output,
        } => {
            let driver = driver_for(cfg.platform(), &cfg);

            if debug {
                let recent = list_recent(driver.as_ref(), &account, &mailbox, DEBUG_LISTING_LIMIT)?;
                if recent.is_empty() {
                    println!("No emails found in this mailbox.");
                }
                for (i, h) in recent.iter().enumerate() {
                    println!("{}. {}  [{}]", i + 1, h.subject, h.received_at);
                }
                if cli.verbose {
                    println!("\nToday is {}", today.format("%A, %B %d, %Y"));
                }
                return Ok(());
            }

            let date = date.as_deref().map(parse_cli_date).transpose()?;
            let filter = Filter::resolve(date, count, latest, today)?;

            let repo = open_store(&cfg, cli.db.as_ref())?;
            let options = ScrapeOptions {
                skip_meetings: cfg.skip_meetings(),
                ..ScrapeOptions::default()
            };
            let outcome = Scraper::new(driver.as_ref(), &repo, options).scrape_stream(&account, &mailbox, &stream, &filter);
            repo.close()?;
            let outcome = outcome?;

            print_outcome(&format!("{account}/{mailbox}"), &outcome);
            if csv && !outcome.records.is_empty() {
                let path = output.unwrap_or_else(|| {
                    cfg.export_dir()
                        .join(export::scrape_filename(&account, &mailbox, &filter))
                });
                export::write_csv(&outcome.records, &path)?;
                println!("Saved to: {}", path.display());
            }
            Ok(())
        }

        Command::Batch {
            paths_file,
            only_account,
            count,
        } => {
            let mut groups = load_mailbox_paths(&paths_file)
                .with_context(|| format!("reading {}", paths_file.display()))?;
            if let Some(only) = &only_account {
                groups.retain(|g| &g.account == only);
                if groups.is_empty() {
                    println!("No definitions found for account: {only}");
                    return Ok(());
                }
            }

            let driver = driver_for(cfg.platform(), &cfg);
            let repo = open_store(&cfg, cli.db.as_ref())?;
            let options = ScrapeOptions {
                skip_meetings: cfg.skip_meetings(),
                before: Some(today),
            };
            let report = run_batch(
                &Scraper::new(driver.as_ref(), &repo, options),
                &groups,
                &Filter::MostRecent(count),
            );
            repo.close()?;

            for m in &report.mailboxes {
                match &m.outcome {
                    Ok(o) => print_outcome(&format!("{}/{} [{}]", m.account, m.mailbox, m.stream), o),
                    Err(e) => println!("{}/{}: {e}", m.account, m.mailbox),
                }
            }
            println!("\nTotal new emails added across all accounts: {}", report.inserted());
            let failed = report.failed().count();
            if failed > 0 {
                return Err(anyhow!("{failed} mailbox(es) could not be scraped"));
            }
            Ok(())
        }

        Command::Export {
            date,
            all,
            label,
            output,
        } => {
            let mode = match (all, date) {
                (true, _) => ExportMode::AllUpToYesterday,
                (false, Some(d)) => ExportMode::Date(parse_cli_date(&d)?),
                (false, None) => ExportMode::Yesterday,
            };
            let repo = open_store(&cfg, cli.db.as_ref())?;
            let records = export::select(&repo, mode, today);
            repo.close()?;
            let records = records?;

            if records.is_empty() {
                println!("No emails found for {}.", describe(mode, today));
                return Ok(());
            }
            let path = match output {
                Some(p) => p,
                None => {
                    let label = label
                        .or_else(|| cfg.account_name.clone())
                        .ok_or_else(|| anyhow!("pass --label or set account_name in the config"))?;
                    cfg.export_dir().join(export::export_filename(&label, mode, today))
                }
            };
            export::write_csv(&records, &path)?;
            println!("Exported {} emails to {}", records.len(), path.display());
            Ok(())
        }
    }
}

fn open_store(cfg: &Config, db: Option<&PathBuf>) -> Result<SqliteRepo> {
    let path = match db {
        Some(p) => p.clone(),
        None => resolve_db_path(cfg)?,
    };
    SqliteRepo::open(&path).with_context(|| format!("opening store {}", path.display()))
}

fn print_outcome(what: &str, o: &ScrapeOutcome) {
    if o.seen == 0 {
        println!("{what}: no emails found.");
        return;
    }
    println!(
        "{what}: {} new emails added, {} duplicates skipped ({} seen, {} filtered)",
        o.inserted,
        o.duplicates(),
        o.seen,
        o.filtered
    );
    if !o.failures.is_empty() {
        println!("  {} emails could not be stored:", o.failures.len());
        for f in &o.failures {
            println!("  - {:?} ({}): {}", f.subject, f.received_at, f.reason);
        }
    }
}

fn describe(mode: ExportMode, today: NaiveDate) -> String {
    match mode {
        ExportMode::Date(d) => d.format("%d-%m-%Y").to_string(),
        ExportMode::AllUpToYesterday => format!("any day before {}", today.format("%d-%m-%Y")),
        ExportMode::Yesterday => "yesterday".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_listing_rejects_fetch_filters() {
        let base = ["outlook_scraper", "scrape", "--account", "Work", "--mailbox", "Inbox", "--debug"];
        assert!(Cli::try_parse_from(base).is_ok());
        for extra in [
            &["--date", "22-05-2025"][..],
            &["--count", "5"][..],
            &["--latest"][..],
            &["--csv"][..],
        ] {
            let args = base.iter().chain(extra.iter());
            assert!(Cli::try_parse_from(args).is_err(), "accepted --debug with {extra:?}");
        }
    }

    #[test]
    fn scrape_stream_defaults_to_empty() {
        let cli = Cli::try_parse_from(["outlook_scraper", "scrape", "--account", "Work", "--mailbox", "Inbox"]).unwrap();
        let Command::Scrape { stream, .. } = cli.cmd else {
            panic!("expected scrape");
        };
        assert_eq!(stream, "");
    }
}
