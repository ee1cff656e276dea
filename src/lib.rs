//! Scrape emails out of a desktop Outlook client into a local,
//! deduplicated SQLite store and export them as CSV.

pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod mail;
pub mod scrape;
pub mod store;
