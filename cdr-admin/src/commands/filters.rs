//! `cdr-admin filters`: resolve filter references and maintain sets.

use anyhow::Result;
use clap::Subcommand;

use cdr::filters::{SetTree, SetTreeNode};
use cdr::{canonical, CdrId, FilterRef, FilterSetSpec, RequestContext};

use super::emit;

#[derive(Debug, Subcommand)]
pub enum FiltersCommand {
    /// Expand filter references (`CDR123`, `name:X`, `set:Y`) to filter ids
    Resolve {
        #[arg(required = true)]
        refs: Vec<String>,
    },

    /// List filter documents
    List,

    /// List filter sets
    Sets,

    /// Show a set with nested sets expanded
    Show {
        name: String,
    },

    /// Create or replace a set
    Put {
        name: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        notes: Option<String>,
        /// Member reference, in order (repeatable)
        #[arg(long = "member", value_name = "REF")]
        members: Vec<String>,
    },

    /// Delete a set not contained in any other set
    Delete {
        name: String,
    },

    /// Sets containing every given filter, or the sets including a set
    Containing {
        /// Filter references, or one `set:NAME`
        #[arg(required = true)]
        refs: Vec<String>,
    },

    /// Include and import references of one filter
    Includes {
        filter: String,
    },
}

fn print_tree(tree: &SetTree, depth: usize) {
    println!("{}{} (set {})", "  ".repeat(depth), tree.name, tree.id);
    for node in &tree.members {
        match node {
            SetTreeNode::Filter(f) => println!("{}{} {}", "  ".repeat(depth + 1), canonical(f.id), f.name),
            SetTreeNode::Set(sub) => print_tree(sub, depth + 1),
        }
    }
}

fn print_names(names: &[String]) {
    if names.is_empty() {
        println!("(none)");
    }
    for name in names {
        println!("{}", name);
    }
}

fn parse_refs(refs: &[String]) -> Result<Vec<FilterRef>> {
    Ok(refs.iter().map(|r| FilterRef::parse(r)).collect::<Result<_, _>>()?)
}

pub fn run(cmd: FiltersCommand, ctx: &RequestContext, json: bool) -> Result<()> {
    let registry = ctx.filters();
    match cmd {
        FiltersCommand::Resolve { refs } => {
            let ids: Vec<String> = registry
                .resolve_refs(&parse_refs(&refs)?)?
                .into_iter()
                .map(canonical)
                .collect();
            emit(ids.as_slice(), json, print_names)
        }
        FiltersCommand::List => emit(&registry.list_filters()?, json, |filters| {
            for f in filters {
                println!("{:<12} {}", canonical(f.id), f.name);
            }
        }),
        FiltersCommand::Sets => emit(&registry.list_filter_sets()?, json, |sets| {
            for s in sets {
                println!("{:<40} {}", s.name, s.description);
            }
        }),
        FiltersCommand::Show { name } => emit(&registry.set_tree(&name)?, json, |tree| print_tree(tree, 0)),
        FiltersCommand::Put {
            name,
            description,
            notes,
            members,
        } => {
            let mut spec = FilterSetSpec::new(name, description, parse_refs(&members)?);
            spec.notes = notes;
            let id = registry.put_filter_set(&spec)?;
            emit(&id, json, |id| println!("Stored filter set '{}' ({})", spec.name, id))
        }
        FiltersCommand::Delete { name } => {
            registry.delete_filter_set(&name)?;
            emit(&name, json, |name| println!("Deleted filter set '{}'", name))
        }
        FiltersCommand::Containing { refs } => {
            let parsed = parse_refs(&refs)?;
            let names = match parsed.as_slice() {
                [FilterRef::SetName(set)] => registry.sets_including_set(set)?,
                _ => registry.sets_containing(&registry.resolve_refs(&parsed)?)?,
            };
            emit(names.as_slice(), json, print_names)
        }
        FiltersCommand::Includes { filter } => {
            let id = CdrId::parse(&filter)?.id;
            emit(&registry.filter_includes(id)?, json, |includes| {
                for inc in includes {
                    let target = inc.resolved.map(canonical).unwrap_or_else(|| "unresolved".to_string());
                    println!("{:<8} {:<40} {}", inc.kind, inc.href, target);
                }
            })
        }
    }
}
