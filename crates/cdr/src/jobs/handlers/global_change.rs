//! Rewrites every `cdr:ref` / `cdr:href` pointing at one document so it
//! points at another. Arguments: `from`, `to` (document ids) and an
//! optional `doc_type` restricting which linking documents are touched.

use tracing::info_span;

use crate::docs::link_index::referenced_id;
use crate::docs::{DocumentStore, SaveOptions};
use crate::error::CdrError;
use crate::ids::{canonical, CdrId, DocId, VersionSelector};
use crate::jobs::context::JobContext;
use crate::jobs::error::JobError;
use crate::jobs::handler::JobHandler;
use crate::jobs::GLOBAL_CHANGE_COMMAND;
use crate::xml;

const LINK_ATTRIBUTES: [&str; 2] = ["cdr:ref", "cdr:href"];

/// New value for a link attribute, keeping any `#fragment`.
fn retarget(value: &str, from: DocId, to: DocId) -> Option<String> {
    if referenced_id(value) != Some(from) {
        return None;
    }
    let parsed = CdrId::parse(value.trim()).ok()?;
    Some(match parsed.fragment {
        Some(fragment) => format!("{}#{}", canonical(to), fragment),
        None => canonical(to),
    })
}

/// Rewritten body and number of links changed.
pub fn rewrite_links(body: &str, from: DocId, to: DocId) -> Result<(String, usize), CdrError> {
    xml::rewrite_attributes(body, |name, value| {
        if LINK_ATTRIBUTES.contains(&name) {
            retarget(value, from, to)
        } else {
            None
        }
    })
    .map_err(|e| CdrError::InvalidInput(format!("cannot rewrite links: {}", e)))
}

pub struct GlobalChangeHandler {
    store: DocumentStore,
}

impl GlobalChangeHandler {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    fn change_one(&self, doc_id: DocId, from: DocId, to: DocId, comment: &str) -> Result<usize, CdrError> {
        let mut doc = self.store.get_doc(doc_id, VersionSelector::Current)?;
        let (body, changed) = rewrite_links(&doc.xml, from, to)?;
        if changed == 0 {
            return Ok(0);
        }
        doc.xml = body;
        self.store.save_doc(&doc, &SaveOptions::versioned(comment))?;
        Ok(changed)
    }
}

impl JobHandler for GlobalChangeHandler {
    fn command(&self) -> &'static str {
        GLOBAL_CHANGE_COMMAND
    }

    fn run(&self, ctx: &JobContext) -> Result<String, JobError> {
        let from = CdrId::parse(ctx.require_arg("from")?)?.id;
        let to = CdrId::parse(ctx.require_arg("to")?)?.id;
        if from == to {
            return Err(JobError::Failed("source and target documents are the same".to_string()));
        }
        if !self.store.exists(to)? {
            return Err(CdrError::not_found("Document", canonical(to)).into());
        }
        let doc_type = ctx.arg("doc_type").map(str::trim).filter(|t| !t.is_empty());

        let mut linking = self.store.linking_docs(from)?;
        if let Some(doc_type) = doc_type {
            let wanted: Vec<DocId> = self
                .store
                .summaries(&linking)?
                .into_iter()
                .filter(|s| s.doc_type == doc_type)
                .map(|s| s.id)
                .collect();
            linking = wanted;
        }

        let comment = format!("Global change: links to {} now point to {}", canonical(from), canonical(to));
        let (mut docs_changed, mut links_changed, mut failed) = (0usize, 0usize, Vec::new());
        for (i, doc_id) in linking.iter().enumerate() {
            ctx.checkpoint()?;
            ctx.progress(&format!("{} of {} linking documents", i, linking.len()))?;
            let _span = info_span!("global_change_doc", doc = %canonical(*doc_id)).entered();
            match self.change_one(*doc_id, from, to, &comment) {
                Ok(0) => {}
                Ok(n) => {
                    docs_changed += 1;
                    links_changed += n;
                }
                Err(e) if e.is_transient() => return Err(e.into()),
                Err(e) => {
                    log::warn!("Links in {} not changed: {}", canonical(*doc_id), e);
                    failed.push(canonical(*doc_id));
                }
            }
        }

        let mut message = format!(
            "Changed {} links in {} documents from {} to {}",
            links_changed,
            docs_changed,
            canonical(from),
            canonical(to)
        );
        if !failed.is_empty() {
            message.push_str(&format!("; not changed: {}", failed.join(", ")));
        }
        Ok(message)
    }
}
