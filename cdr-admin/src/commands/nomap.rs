//! `cdr-admin nomap`: patterns marking external-map values unmappable.

use anyhow::Result;
use clap::Subcommand;

use cdr::RequestContext;

use super::emit;

#[derive(Debug, Subcommand)]
pub enum NomapCommand {
    /// List suppression patterns
    List,
    /// Add a pattern (`%` any run, `_` one character, `\` escapes)
    Add { pattern: String },
    /// Replace a pattern
    Update { id: i64, pattern: String },
    /// Remove a pattern
    Delete { id: i64 },
    /// Show the unmapped values a pattern would suppress
    Preview { pattern: String },
    /// Mark every value matching a pattern as unmappable
    Apply,
    /// List values still waiting for a mapping
    Unmapped {
        #[arg(long)]
        usage: Option<String>,
    },
}

pub fn run(cmd: NomapCommand, ctx: &RequestContext, json: bool) -> Result<()> {
    let patterns = ctx.nomap();
    match cmd {
        NomapCommand::List => emit(&patterns.list()?, json, |list| {
            for p in list {
                println!("{:>5}  {}", p.id, p.pattern);
            }
        }),
        NomapCommand::Add { pattern } => {
            let id = patterns.add(&pattern)?;
            emit(&id, json, |id| println!("Added pattern {}", id))
        }
        NomapCommand::Update { id, pattern } => {
            patterns.update(id, &pattern)?;
            emit(&id, json, |id| println!("Updated pattern {}", id))
        }
        NomapCommand::Delete { id } => {
            patterns.delete(id)?;
            emit(&id, json, |id| println!("Deleted pattern {}", id))
        }
        NomapCommand::Preview { pattern } => emit(&patterns.preview(&pattern)?, json, |values| {
            for v in values {
                println!("{:<20} {}", v.usage, v.value);
            }
        }),
        NomapCommand::Apply => {
            let count = patterns.apply()?;
            emit(&count, json, |n| println!("{} values marked unmappable", n))
        }
        NomapCommand::Unmapped { usage } => emit(&patterns.unmapped(usage.as_deref())?, json, |values| {
            for v in values {
                println!("{:>6}  {:<20} {}", v.id, v.usage, v.value);
            }
        }),
    }
}
