//! `cdr-admin biblio fetch`.

use anyhow::{Context, Result};
use clap::Subcommand;

use cdr::config::Config;
use cdr::resolve_secret_optional;
use cdr::services::BibliographicClient;

use super::emit;

#[derive(Debug, Subcommand)]
pub enum BiblioCommand {
    /// Fetch one article record by PMID
    Fetch {
        pmid: String,
        /// Print the record as received
        #[arg(long)]
        raw: bool,
    },
}

pub fn run(cmd: &BiblioCommand, config: &Config, json: bool) -> Result<()> {
    let BiblioCommand::Fetch { pmid, raw } = cmd;
    let host = config
        .hosts()?
        .bibliographic
        .as_deref()
        .with_context(|| format!("no bibliographic host configured for tier {}", config.tier))?;
    let api_key = resolve_secret_optional(&config.credentials.bibliographic_api_key)?;
    let client = BibliographicClient::new(host, config.timeouts().http, api_key)?
        .with_retries(config.jobs.max_retries);

    let record = client.fetch(pmid)?;
    if *raw {
        println!("{}", record.xml);
        return Ok(());
    }
    emit(&record, json, |r| {
        println!("PMID {}: {}", r.pmid, r.title);
        if let Some(journal) = &r.journal {
            println!("  journal: {}", journal);
        }
        if let Some(year) = &r.year {
            println!("  year: {}", year);
        }
        if let Some(status) = &r.status {
            println!("  status: {}", status);
        }
    })
}
