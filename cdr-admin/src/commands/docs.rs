//! `cdr-admin docs`: document reports.

use anyhow::{bail, Result};
use clap::Subcommand;

use cdr::docs::{DocSummary, VersionHistory, VersionInfo};
use cdr::{canonical, CdrId, DocId, RequestContext, VersionSelector, Wildcard};

use super::emit;

const TITLE_MATCH_LIMIT: u32 = 100;

#[derive(Debug, Subcommand)]
pub enum DocsCommand {
    /// Version history with publication events and removal status
    History {
        /// Document id
        #[arg(required_unless_present = "title")]
        id: Option<String>,
        /// Title pattern (`%` any run, `_` one character) instead of an id
        #[arg(long, conflicts_with = "id")]
        title: Option<String>,
        #[arg(long)]
        doc_type: Option<String>,
    },

    /// Versions of a document, newest first
    Versions {
        id: String,
    },

    /// Print a document body
    Show {
        id: String,
        /// Version number, `last`, `lastp` or `cwd`
        #[arg(long, default_value = "cwd")]
        version: String,
    },

    /// Documents linking to a document
    Links {
        id: String,
    },

    /// Documents changed since their last publishable version
    Unpublished {
        #[arg(long)]
        doc_type: Option<String>,
    },
}

fn doc_id(text: &str) -> Result<DocId> {
    Ok(CdrId::parse(text)?.id)
}

fn print_history(h: &VersionHistory) {
    println!("{} {} ({})", canonical(h.doc_id), h.title, h.doc_type);
    println!("  status: {}", h.active_status);
    println!("  created {} by {}", h.created_at, h.created_by);
    if let (Some(at), Some(by)) = (&h.modified_at, &h.modified_by) {
        println!("  modified {} by {}", at, by);
    }
    if let Some(removal) = &h.removal {
        println!("  removed: {}", removal.describe());
    }
    for row in &h.versions {
        println!(
            "  {:>4} {} {:<10} {:<3} {:<30} {}",
            row.version.num,
            row.version.created_at,
            row.version.user,
            if row.version.publishable { "Y" } else { "N" },
            row.publications.join(" "),
            row.version.comment.as_deref().unwrap_or("")
        );
    }
}

fn print_versions(versions: &[VersionInfo]) {
    for v in versions {
        println!(
            "{:>4} {} {:<10} {:?} publishable={} {}",
            v.num,
            v.created_at,
            v.user,
            v.val_status,
            v.publishable,
            v.comment.as_deref().unwrap_or("")
        );
    }
}

fn print_summaries(docs: &[DocSummary]) {
    if docs.is_empty() {
        println!("No matching documents");
    }
    for d in docs {
        println!("{:<12} {:<16} {:<8} {}", canonical(d.id), d.doc_type, d.active_status, d.title);
    }
}

pub fn run(cmd: DocsCommand, ctx: &RequestContext, json: bool) -> Result<()> {
    let store = ctx.documents();
    match cmd {
        DocsCommand::History { id, title, doc_type } => {
            let id = match (id, title) {
                (Some(id), _) => doc_id(&id)?,
                (None, Some(title)) => {
                    let matches =
                        store.find_by_title(&Wildcard::new(&title), doc_type.as_deref(), TITLE_MATCH_LIMIT)?;
                    match matches.as_slice() {
                        [only] => only.id,
                        [] => bail!("No document title matches '{}'", title),
                        several => {
                            // Let the operator pick one.
                            return emit(several, json, print_summaries);
                        }
                    }
                }
                (None, None) => bail!("a document id or --title is required"),
            };
            let history = store.version_history(id, &ctx.ledger())?;
            emit(&history, json, print_history)
        }
        DocsCommand::Versions { id } => {
            let versions = store.list_versions(doc_id(&id)?)?.collect::<Result<Vec<_>, _>>()?;
            emit(versions.as_slice(), json, print_versions)
        }
        DocsCommand::Show { id, version } => {
            let doc = store.get_doc(doc_id(&id)?, VersionSelector::parse(&version)?)?;
            emit(&doc, json, |d| println!("{}", d.xml))
        }
        DocsCommand::Links { id } => {
            let linking = store.summaries(&store.linking_docs(doc_id(&id)?)?)?;
            emit(linking.as_slice(), json, print_summaries)
        }
        DocsCommand::Unpublished { doc_type } => {
            let changes = store.unpublished_changes(doc_type.as_deref())?;
            emit(changes.as_slice(), json, |changes| {
                for c in changes {
                    println!(
                        "{:<12} {:<40} last publishable {:<6} modified {}",
                        c.doc_id,
                        c.title,
                        c.last_publishable.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
                        c.modified_at.as_deref().unwrap_or("")
                    );
                }
            })
        }
    }
}
