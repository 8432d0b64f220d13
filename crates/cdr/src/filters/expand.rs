//! Filter set expansion over an in-memory snapshot of the set graph.

use std::collections::{BTreeMap, HashMap};

use rusqlite::Connection;

use crate::db::filter_set_repo::{self, MemberRow};
use crate::db::DatabaseError;
use crate::error::{CdrError, Result};
use crate::ids::DocId;

#[derive(Debug, Clone)]
struct SetNode {
    name: String,
    members: Vec<MemberRow>,
}

/// Every set and its ordered members, loaded in one pass.
#[derive(Debug, Clone, Default)]
pub struct SetGraph {
    sets: HashMap<i64, SetNode>,
    by_name: HashMap<String, i64>,
}

impl SetGraph {
    pub fn load(conn: &Connection) -> std::result::Result<Self, DatabaseError> {
        let mut graph = SetGraph::default();
        for row in filter_set_repo::list(conn)? {
            graph.insert(row.id, &row.name, Vec::new());
        }
        for (set_id, member) in filter_set_repo::all_members(conn)? {
            if let Some(node) = graph.sets.get_mut(&set_id) {
                node.members.push(member);
            }
        }
        Ok(graph)
    }

    /// Adds or replaces one set. Used to check a proposed edit before it
    /// is written.
    pub fn insert(&mut self, id: i64, name: &str, members: Vec<MemberRow>) {
        if let Some(old) = self.sets.get(&id) {
            self.by_name.remove(&old.name.to_lowercase());
        }
        self.by_name.insert(name.to_lowercase(), id);
        self.sets.insert(
            id,
            SetNode {
                name: name.to_string(),
                members,
            },
        );
    }

    /// Set id by name, ignoring case.
    pub fn id_of(&self, name: &str) -> Option<i64> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn name_of(&self, id: i64) -> Option<&str> {
        self.sets.get(&id).map(|n| n.name.as_str())
    }

    pub fn members(&self, id: i64) -> Option<&[MemberRow]> {
        self.sets.get(&id).map(|n| n.members.as_slice())
    }

    /// Flattens a set into its filters, depth first in member order.
    /// Duplicates are kept; a set reached again while it is still being
    /// expanded is a cycle.
    pub fn expand(&self, id: i64) -> Result<Vec<DocId>> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        self.expand_into(id, &mut stack, &mut out)?;
        Ok(out)
    }

    fn expand_into(&self, id: i64, stack: &mut Vec<i64>, out: &mut Vec<DocId>) -> Result<()> {
        if let Some(pos) = stack.iter().position(|s| *s == id) {
            let mut path: Vec<String> = stack[pos..].iter().map(|s| self.display(*s)).collect();
            path.push(self.display(id));
            return Err(CdrError::FilterSetCycle(path));
        }
        let node = self
            .sets
            .get(&id)
            .ok_or_else(|| CdrError::UnknownFilterSet(format!("#{}", id)))?;
        stack.push(id);
        for member in &node.members {
            match member {
                MemberRow::Filter(f) => out.push(*f),
                MemberRow::Subset(s) => self.expand_into(*s, stack, out)?,
            }
        }
        stack.pop();
        Ok(())
    }

    fn display(&self, id: i64) -> String {
        self.name_of(id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", id))
    }

    /// Expansion of every set, keyed by set name.
    pub fn expand_all(&self) -> Result<BTreeMap<String, Vec<DocId>>> {
        let mut all = BTreeMap::new();
        for (id, node) in &self.sets {
            all.insert(node.name.clone(), self.expand(*id)?);
        }
        Ok(all)
    }

    /// Whether `ancestor` contains `target` at any depth.
    pub fn contains_set(&self, ancestor: i64, target: i64) -> bool {
        let mut seen = Vec::new();
        let mut pending = vec![ancestor];
        while let Some(id) = pending.pop() {
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            for member in self.members(id).unwrap_or(&[]) {
                if let MemberRow::Subset(s) = member {
                    if *s == target {
                        return true;
                    }
                    pending.push(*s);
                }
            }
        }
        false
    }

    /// Names of all sets containing `target` directly or indirectly,
    /// sorted.
    pub fn ancestors_of(&self, target: i64) -> Vec<String> {
        let mut names: Vec<String> = self
            .sets
            .iter()
            .filter(|(id, _)| **id != target && self.contains_set(**id, target))
            .map(|(_, node)| node.name.clone())
            .collect();
        names.sort_by_key(|n| n.to_lowercase());
        names
    }
}
