//! Invariant checker for a [`VaultState`].
//!
//! Every mutation keeps these invariants on its own; the checker exists for
//! states that arrive from outside (a persisted file, an external writer)
//! and for tests. Findings are reported as [`DiagnosticKind::IndexMismatch`]
//! errors and never repaired here.

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::model::{EntityId, EntityKind, IdList, VaultState};
use std::collections::{HashMap, HashSet};

/// Run every structural check over the flat state
pub fn check_integrity(state: &VaultState) -> Vec<Diagnostic> {
    let mut checker = IntegrityChecker::new(state);
    checker.check_buckets();
    checker.check_ownership();
    checker.check_membership();
    checker.check_root();
    checker.check_trash();
    checker.findings
}

/// True when [`check_integrity`] finds nothing
pub fn is_consistent(state: &VaultState) -> bool {
    check_integrity(state).is_empty()
}

struct IntegrityChecker<'a> {
    state: &'a VaultState,
    findings: Vec<Diagnostic>,
}

impl<'a> IntegrityChecker<'a> {
    fn new(state: &'a VaultState) -> Self {
        Self {
            state,
            findings: Vec::new(),
        }
    }

    fn report(&mut self, id: &str, message: String) {
        self.findings
            .push(Diagnostic::error(DiagnosticKind::IndexMismatch, message).for_entity(id));
    }

    /// Each id lives in exactly one bucket and the type index names it
    fn check_buckets(&mut self) {
        let state = self.state;
        let mut seen: HashMap<&str, EntityKind> = HashMap::new();
        for (kind, entity) in state.entities.iter() {
            if let Some(previous) = seen.insert(entity.id.as_str(), kind) {
                self.report(&entity.id, format!("'{}' is stored in both {previous} and {kind}", entity.id));
            }
            if entity.kind != kind {
                self.report(
                    &entity.id,
                    format!("'{}' is a {} stored in the {kind} bucket", entity.id, entity.kind),
                );
            }
            match state.type_index.get(&entity.id) {
                Some(recorded) if *recorded == kind => {}
                Some(recorded) => {
                    self.report(&entity.id, format!("type index records {recorded} for '{}'", entity.id))
                }
                None => self.report(&entity.id, format!("'{}' is missing from the type index", entity.id)),
            }
        }

        for id in state.type_index.keys() {
            if !seen.contains_key(id.as_str()) {
                self.report(id, format!("type index names '{id}' but no bucket holds it"));
            }
        }
    }

    /// `references` and `reverse_refs` are exact inverses
    fn check_ownership(&mut self) {
        let mut owner: HashMap<&str, &str> = HashMap::new();
        let mut problems = Vec::new();

        for (parent, children) in self.state.references.iter() {
            if children.is_empty() {
                problems.push((parent.clone(), format!("'{parent}' has an empty child list entry")));
            }
            for child in children.iter() {
                if let Some(other) = owner.insert(child.as_str(), parent.as_str()) {
                    problems.push((child.clone(), format!("'{child}' is listed under both '{other}' and '{parent}'")));
                }
                match self.state.reverse_refs.get(child) {
                    Some(recorded) if recorded == parent => {}
                    Some(recorded) => problems.push((
                        child.clone(),
                        format!("'{child}' is listed under '{parent}' but its parent is recorded as '{recorded}'"),
                    )),
                    None => problems.push((
                        child.clone(),
                        format!("'{child}' is listed under '{parent}' but has no recorded parent"),
                    )),
                }
            }
        }

        for (child, parent) in self.state.reverse_refs.iter() {
            if owner.get(child.as_str()) != Some(&parent.as_str()) {
                problems.push((
                    child.clone(),
                    format!("'{child}' records parent '{parent}' but is not in its child list"),
                ));
            }
        }

        for (id, message) in problems {
            self.report(&id, message);
        }
    }

    /// Membership lists mirror each other
    fn check_membership(&mut self) {
        let forward = pairs(&self.state.collection_members);
        let backward: HashSet<(&str, &str)> = pairs(&self.state.member_of_collections)
            .into_iter()
            .map(|(member, collection)| (collection, member))
            .collect();

        let mut problems = Vec::new();
        for (collection, member) in forward.difference(&backward) {
            problems.push((
                member.to_string(),
                format!("'{collection}' lists '{member}' but '{member}' does not record the membership"),
            ));
        }
        for (collection, member) in backward.difference(&forward) {
            problems.push((
                member.to_string(),
                format!("'{member}' records membership in '{collection}' but the collection does not list it"),
            ));
        }
        for (collection, labels) in self.state.reference_labels.iter() {
            for member in labels.keys() {
                if !forward.contains(&(collection.as_str(), member.as_str())) {
                    problems.push((
                        member.to_string(),
                        format!("'{collection}' keeps a reference label for '{member}' but does not list it"),
                    ));
                }
            }
        }
        problems.sort();

        for (id, message) in problems {
            self.report(&id, message);
        }
    }

    fn check_root(&mut self) {
        let state = self.state;
        if let Some(root) = state.root_id.as_deref() {
            let exists = EntityKind::ALL
                .into_iter()
                .any(|kind| state.entities.get(kind, root).is_some());
            if !exists {
                self.report(root, format!("root '{root}' does not exist"));
            }
        }
    }

    /// Trashed ids have left every active index
    fn check_trash(&mut self) {
        let mut problems = Vec::new();
        for trashed in self.state.trashed_entities.values() {
            for id in trashed.subtree_ids() {
                let active = self.state.type_index.contains_key(id)
                    || EntityKind::ALL
                        .into_iter()
                        .any(|kind| self.state.entities.get(kind, id).is_some())
                    || self.state.references.contains_key(id)
                    || self.state.reverse_refs.contains_key(id)
                    || self.state.collection_members.contains_key(id)
                    || self.state.member_of_collections.contains_key(id)
                    || self.state.reference_labels.contains_key(id);
                if active {
                    problems.push((id.to_string(), format!("'{id}' is trashed but still indexed")));
                }
            }
        }
        for (id, message) in problems {
            self.report(&id, message);
        }
    }
}

fn pairs(map: &HashMap<EntityId, IdList>) -> HashSet<(&str, &str)> {
    map.iter()
        .flat_map(|(key, values)| values.iter().map(move |value| (key.as_str(), value.as_str())))
        .collect()
}
