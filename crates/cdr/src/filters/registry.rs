use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use rusqlite::Connection;

use super::expand::SetGraph;
use super::includes::{self, FilterInclude};
use super::{
    FilterSet, FilterSetMember, FilterSetSpec, FilterSetSummary, FilterSummary, SetTree,
    SetTreeNode, MAX_SET_DESCRIPTION_CHARS, MAX_SET_NAME_CHARS,
};
use crate::db::doc_repo;
use crate::db::filter_set_repo::{self, MemberRow};
use crate::db::Database;
use crate::docs::FILTER_DOC_TYPE;
use crate::error::{CdrError, Result};
use crate::ids::{canonical, DocId, FilterRef};
use crate::session::{Action, Session};

const CACHE_CAPACITY: u64 = 1_000;
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Memoized set expansions, shared by every registry built from the same
/// context. Writes through any registry holding the cache clear it.
#[derive(Clone)]
pub struct ExpansionCache {
    sets: Cache<String, Arc<Vec<DocId>>>,
    all: Cache<(), Arc<BTreeMap<String, Vec<DocId>>>>,
}

impl ExpansionCache {
    pub fn new() -> Self {
        Self {
            sets: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(CACHE_TTL)
                .build(),
            all: Cache::builder().max_capacity(1).time_to_live(CACHE_TTL).build(),
        }
    }

    pub fn invalidate(&self) {
        self.sets.invalidate_all();
        self.all.invalidate_all();
    }
}

impl Default for ExpansionCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Looks up filters by id or name and expands filter sets.
#[derive(Clone)]
pub struct FilterRegistry {
    db: Database,
    session: Session,
    cache: ExpansionCache,
}

fn filter_id(conn: &Connection, id: DocId) -> Result<Option<DocId>> {
    Ok(doc_repo::find_by_id(conn, id)?
        .filter(|row| row.doc_type == FILTER_DOC_TYPE)
        .map(|row| row.id))
}

fn check_spec(spec: &FilterSetSpec) -> Result<()> {
    let name = spec.name.trim();
    if name.is_empty() {
        return Err(CdrError::InvalidInput("filter set name is required".to_string()));
    }
    if !name.is_ascii() {
        return Err(CdrError::InvalidInput(format!(
            "filter set name '{}' must be ASCII",
            name
        )));
    }
    if name.len() > MAX_SET_NAME_CHARS {
        return Err(CdrError::InvalidInput(format!(
            "filter set name exceeds {} characters",
            MAX_SET_NAME_CHARS
        )));
    }
    if spec.description.trim().is_empty() {
        return Err(CdrError::InvalidInput(format!(
            "filter set '{}' needs a description",
            name
        )));
    }
    if spec.description.chars().count() > MAX_SET_DESCRIPTION_CHARS {
        return Err(CdrError::InvalidInput(format!(
            "filter set description exceeds {} characters",
            MAX_SET_DESCRIPTION_CHARS
        )));
    }
    Ok(())
}

impl FilterRegistry {
    pub fn new(db: Database, session: Session) -> Self {
        Self::with_cache(db, session, ExpansionCache::new())
    }

    pub fn with_cache(db: Database, session: Session, cache: ExpansionCache) -> Self {
        Self { db, session, cache }
    }

    pub fn cache(&self) -> &ExpansionCache {
        &self.cache
    }

    /// Resolves one reference to the filters it stands for, in order.
    pub fn resolve_filter_ref(&self, reference: &FilterRef) -> Result<Vec<DocId>> {
        match reference {
            FilterRef::Id(id) => {
                let found = self.db.read(|conn| filter_id(conn, *id))?;
                found
                    .map(|id| vec![id])
                    .ok_or_else(|| CdrError::UnknownFilter(canonical(*id)))
            }
            FilterRef::Name(name) => {
                let found = self
                    .db
                    .read(|conn| Ok(doc_repo::find_filter_by_name(conn, name)?))?;
                found
                    .map(|id| vec![id])
                    .ok_or_else(|| CdrError::UnknownFilter(name.clone()))
            }
            FilterRef::SetName(name) => Ok(self.expand_set(name)?.as_ref().clone()),
        }
    }

    /// Resolves a list of references, concatenating their filters.
    pub fn resolve_refs(&self, references: &[FilterRef]) -> Result<Vec<DocId>> {
        let mut ids = Vec::new();
        for reference in references {
            ids.extend(self.resolve_filter_ref(reference)?);
        }
        Ok(ids)
    }

    fn expand_set(&self, name: &str) -> Result<Arc<Vec<DocId>>> {
        let key = name.to_lowercase();
        if let Some(hit) = self.cache.sets.get(&key) {
            return Ok(hit);
        }
        let graph = self.load_graph()?;
        let id = graph
            .id_of(name)
            .ok_or_else(|| CdrError::UnknownFilterSet(name.to_string()))?;
        let expanded = Arc::new(graph.expand(id)?);
        self.cache.sets.insert(key, expanded.clone());
        Ok(expanded)
    }

    fn load_graph(&self) -> Result<SetGraph> {
        self.db.read(|conn| Ok(SetGraph::load(conn)?))
    }

    /// Expansion of every set, keyed by set name.
    pub fn expand_all_sets(&self) -> Result<Arc<BTreeMap<String, Vec<DocId>>>> {
        if let Some(hit) = self.cache.all.get(&()) {
            return Ok(hit);
        }
        let all = Arc::new(self.load_graph()?.expand_all()?);
        self.cache.all.insert((), all.clone());
        Ok(all)
    }

    pub fn list_filters(&self) -> Result<Vec<FilterSummary>> {
        let rows = self
            .db
            .read(|conn| Ok(doc_repo::list_by_type(conn, FILTER_DOC_TYPE)?))?;
        Ok(rows
            .into_iter()
            .map(|r| FilterSummary {
                id: r.id,
                name: r.title,
            })
            .collect())
    }

    pub fn list_filter_sets(&self) -> Result<Vec<FilterSetSummary>> {
        let rows = self.db.read(|conn| Ok(filter_set_repo::list(conn)?))?;
        Ok(rows
            .into_iter()
            .map(|r| FilterSetSummary {
                id: r.id,
                name: r.name,
                description: r.description,
            })
            .collect())
    }

    /// A set with its direct members.
    pub fn get_filter_set(&self, name: &str) -> Result<FilterSet> {
        self.db.read(|conn| {
            let row = filter_set_repo::find_by_name(conn, name)?
                .ok_or_else(|| CdrError::UnknownFilterSet(name.to_string()))?;
            let mut members = Vec::new();
            for member in filter_set_repo::members(conn, row.id)? {
                members.push(match member {
                    MemberRow::Filter(id) => FilterSetMember::Filter {
                        id,
                        name: doc_repo::find_by_id(conn, id)?
                            .map(|d| d.title)
                            .unwrap_or_else(|| canonical(id)),
                    },
                    MemberRow::Subset(id) => FilterSetMember::Set {
                        id,
                        name: filter_set_repo::find_by_id(conn, id)?
                            .map(|s| s.name)
                            .unwrap_or_else(|| format!("#{}", id)),
                    },
                });
            }
            Ok(FilterSet {
                id: row.id,
                name: row.name,
                description: row.description,
                notes: row.notes,
                members,
            })
        })
    }

    /// Creates the set named in `spec`, or replaces its description,
    /// notes and members if it exists. Fails without writing anything
    /// when a member is unknown or the result would contain a cycle.
    pub fn put_filter_set(&self, spec: &FilterSetSpec) -> Result<i64> {
        self.session.require(Action::ModifyFilterSet)?;
        check_spec(spec)?;
        let name = spec.name.trim();

        let id = self.db.with_tx(|tx| {
            let existing = filter_set_repo::find_by_name(tx, name)?;
            let mut members = Vec::with_capacity(spec.members.len());
            for reference in &spec.members {
                members.push(match reference {
                    FilterRef::Id(id) => MemberRow::Filter(
                        filter_id(tx, *id)?.ok_or_else(|| CdrError::UnknownFilter(canonical(*id)))?,
                    ),
                    FilterRef::Name(n) => MemberRow::Filter(
                        doc_repo::find_filter_by_name(tx, n)?
                            .ok_or_else(|| CdrError::UnknownFilter(n.clone()))?,
                    ),
                    FilterRef::SetName(n) if n.trim().eq_ignore_ascii_case(name) => {
                        return Err(CdrError::FilterSetCycle(vec![
                            name.to_string(),
                            name.to_string(),
                        ]));
                    }
                    FilterRef::SetName(n) => MemberRow::Subset(
                        filter_set_repo::find_by_name(tx, n.trim())?
                            .ok_or_else(|| CdrError::UnknownFilterSet(n.clone()))?
                            .id,
                    ),
                });
            }

            let id = match &existing {
                Some(row) => {
                    filter_set_repo::update(tx, row.id, name, &spec.description, spec.notes.as_deref())?;
                    row.id
                }
                None => filter_set_repo::insert(tx, name, &spec.description, spec.notes.as_deref())?,
            };
            filter_set_repo::replace_members(tx, id, &members)?;

            // Every set that now reaches this one must still expand.
            let graph = SetGraph::load(tx)?;
            graph.expand(id)?;
            for parent in graph.ancestors_of(id) {
                if let Some(pid) = graph.id_of(&parent) {
                    graph.expand(pid)?;
                }
            }
            Ok(id)
        })?;

        self.cache.invalidate();
        log::info!(
            "Filter set '{}' saved by {} ({} members)",
            name,
            self.session.user,
            spec.members.len()
        );
        Ok(id)
    }

    /// Deletes a set no other set contains.
    pub fn delete_filter_set(&self, name: &str) -> Result<()> {
        self.session.require(Action::ModifyFilterSet)?;
        self.db.with_tx(|tx| {
            let row = filter_set_repo::find_by_name(tx, name)?
                .ok_or_else(|| CdrError::UnknownFilterSet(name.to_string()))?;
            let parents = filter_set_repo::direct_parents(tx, row.id)?;
            if !parents.is_empty() {
                return Err(CdrError::InvariantViolation(format!(
                    "filter set '{}' is a member of: {}",
                    row.name,
                    parents.join(", ")
                )));
            }
            filter_set_repo::delete(tx, row.id)?;
            Ok(())
        })?;
        self.cache.invalidate();
        log::info!("Filter set '{}' deleted by {}", name, self.session.user);
        Ok(())
    }

    /// Names of the sets whose expansion contains every one of `filters`.
    pub fn sets_containing(&self, filters: &[DocId]) -> Result<Vec<String>> {
        if filters.is_empty() {
            return Ok(Vec::new());
        }
        let all = self.expand_all_sets()?;
        let mut names: Vec<String> = all
            .iter()
            .filter(|(_, ids)| filters.iter().all(|f| ids.contains(f)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_by_key(|n| n.to_lowercase());
        Ok(names)
    }

    /// Names of the sets containing the named set at any depth.
    pub fn sets_including_set(&self, name: &str) -> Result<Vec<String>> {
        let graph = self.load_graph()?;
        let id = graph
            .id_of(name)
            .ok_or_else(|| CdrError::UnknownFilterSet(name.to_string()))?;
        Ok(graph.ancestors_of(id))
    }

    /// The named set with nested sets expanded in place.
    pub fn set_tree(&self, name: &str) -> Result<SetTree> {
        let graph = self.load_graph()?;
        let id = graph
            .id_of(name)
            .ok_or_else(|| CdrError::UnknownFilterSet(name.to_string()))?;
        // Fails on a cycle before the recursive walk below.
        graph.expand(id)?;
        let names: BTreeMap<DocId, String> = self
            .list_filters()?
            .into_iter()
            .map(|f| (f.id, f.name))
            .collect();
        Ok(build_tree(&graph, id, &names))
    }

    /// The `xsl:include` and `xsl:import` references of one filter.
    pub fn filter_includes(&self, filter: DocId) -> Result<Vec<FilterInclude>> {
        self.db.read(|conn| {
            let row = doc_repo::find_by_id(conn, filter)?
                .filter(|r| r.doc_type == FILTER_DOC_TYPE)
                .ok_or_else(|| CdrError::UnknownFilter(canonical(filter)))?;
            includes::scan(&row.xml, |name| Ok(doc_repo::find_filter_by_name(conn, name)?))
        })
    }
}

fn build_tree(graph: &SetGraph, id: i64, names: &BTreeMap<DocId, String>) -> SetTree {
    let members = graph
        .members(id)
        .unwrap_or(&[])
        .iter()
        .map(|m| match m {
            MemberRow::Filter(f) => SetTreeNode::Filter(FilterSummary {
                id: *f,
                name: names.get(f).cloned().unwrap_or_else(|| canonical(*f)),
            }),
            MemberRow::Subset(s) => SetTreeNode::Set(build_tree(graph, *s, names)),
        })
        .collect();
    SetTree {
        id,
        name: graph.name_of(id).unwrap_or_default().to_string(),
        members,
    }
}
