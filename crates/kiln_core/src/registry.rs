//! Node identity and `<ref>` resolution.
//!
//! Ids are declared in a pre-pass over the whole parse tree so duplicates can
//! be reported with both positions. A declaration only becomes visible to
//! references once the instantiator has finished building it, which is what
//! forbids forward references (and references to an enclosing node).

use std::collections::{HashMap, HashSet};

use crate::document::{Child, NodeDecl, NodeIndex, NodeKind};
use crate::error::{LoadError, Location};

#[derive(Clone, Debug)]
enum EntryState<T> {
    Pending,
    Built(T),
    Failed,
}

#[derive(Clone, Debug)]
struct Entry<T> {
    kind: NodeKind,
    index: NodeIndex,
    location: Location,
    state: EntryState<T>,
}

/// Maps ids to the objects built for them.
#[derive(Clone, Debug)]
pub struct NodeRegistry<T> {
    entries: HashMap<String, Entry<T>>,
    /// Later declarations of an already-declared id
    duplicates: HashSet<NodeIndex>,
}

impl<T> Default for NodeRegistry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            duplicates: HashSet::new(),
        }
    }
}

impl<T> NodeRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declaration. The first declaration of an id wins.
    pub fn declare(
        &mut self,
        id: &str,
        kind: NodeKind,
        index: NodeIndex,
        location: Location,
    ) -> Result<(), LoadError> {
        if let Some(first) = self.entries.get(id) {
            self.duplicates.insert(index);
            return Err(LoadError::DuplicateId {
                id: id.to_string(),
                first: first.location,
                second: location,
            });
        }
        self.entries.insert(
            id.to_string(),
            Entry {
                kind,
                index,
                location,
                state: EntryState::Pending,
            },
        );
        Ok(())
    }

    /// Declare every id in the tree, in document order.
    pub fn declare_all(&mut self, nodes: &[NodeDecl], errors: &mut Vec<LoadError>) {
        for node in nodes {
            self.declare_tree(node, errors);
        }
    }

    fn declare_tree(&mut self, node: &NodeDecl, errors: &mut Vec<LoadError>) {
        if let Some(id) = &node.id {
            if let Err(e) = self.declare(id, node.kind, node.index, node.location) {
                errors.push(e);
                // The duplicate's subtree is skipped entirely
                return;
            }
        }
        for child in &node.children {
            if let Child::Node(child) = child {
                self.declare_tree(child, errors);
            }
        }
    }

    /// True if this node re-declares an id that was already taken.
    pub fn is_duplicate(&self, index: NodeIndex) -> bool {
        self.duplicates.contains(&index)
    }

    fn owned_entry(&mut self, id: &str, index: NodeIndex) -> Option<&mut Entry<T>> {
        self.entries.get_mut(id).filter(|e| e.index == index)
    }

    /// Make a finished node visible to later references.
    pub fn complete(&mut self, id: &str, index: NodeIndex, value: T) {
        if let Some(entry) = self.owned_entry(id, index) {
            entry.state = EntryState::Built(value);
        }
    }

    /// Mark a node whose instantiation failed.
    pub fn fail(&mut self, id: &str, index: NodeIndex) {
        if let Some(entry) = self.owned_entry(id, index) {
            entry.state = EntryState::Failed;
        }
    }

    /// Look up a reference at the current point of the instantiation pass.
    ///
    /// Returns `Ok(None)` when the target exists but failed to build; its
    /// own error has already been reported.
    pub fn resolve_ref(&self, id: &str, location: Location) -> Result<Option<&T>, LoadError> {
        let unresolved = |reason: String| LoadError::UnresolvedReference {
            id: id.to_string(),
            location,
            reason,
        };
        match self.entries.get(id) {
            None => Err(unresolved("no node with this id is declared".to_string())),
            Some(entry) => match &entry.state {
                EntryState::Built(value) => Ok(Some(value)),
                EntryState::Failed => Ok(None),
                EntryState::Pending => Err(unresolved(format!(
                    "{} '{}' at {} is not fully declared before this point",
                    entry.kind, id, entry.location
                ))),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_id_cites_both_locations() {
        let mut reg: NodeRegistry<u32> = NodeRegistry::new();
        reg.declare("mat-itu_glass", NodeKind::Bsdf, 0, Location::new(4, 1))
            .unwrap();
        let err = reg
            .declare("mat-itu_glass", NodeKind::Bsdf, 3, Location::new(20, 1))
            .unwrap_err();
        assert_eq!(
            err,
            LoadError::DuplicateId {
                id: "mat-itu_glass".into(),
                first: Location::new(4, 1),
                second: Location::new(20, 1),
            }
        );
        assert!(reg.is_duplicate(3));
        assert!(!reg.is_duplicate(0));
    }

    #[test]
    fn test_first_declaration_wins() {
        let mut reg: NodeRegistry<u32> = NodeRegistry::new();
        reg.declare("a", NodeKind::Bsdf, 0, Location::new(1, 1)).unwrap();
        let _ = reg.declare("a", NodeKind::Bsdf, 1, Location::new(2, 1));

        reg.complete("a", 1, 99);
        assert!(reg.resolve_ref("a", Location::default()).is_err());

        reg.complete("a", 0, 7);
        assert_eq!(reg.resolve_ref("a", Location::default()).unwrap(), Some(&7));
    }

    #[test]
    fn test_pending_is_unresolved() {
        let mut reg: NodeRegistry<u32> = NodeRegistry::new();
        reg.declare("later", NodeKind::Bsdf, 5, Location::new(30, 1))
            .unwrap();
        let err = reg.resolve_ref("later", Location::new(10, 3)).unwrap_err();
        match err {
            LoadError::UnresolvedReference { id, location, .. } => {
                assert_eq!(id, "later");
                assert_eq!(location, Location::new(10, 3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_and_failed() {
        let mut reg: NodeRegistry<u32> = NodeRegistry::new();
        assert!(reg.resolve_ref("ghost", Location::default()).is_err());

        reg.declare("broken", NodeKind::Shape, 0, Location::default())
            .unwrap();
        reg.fail("broken", 0);
        assert_eq!(reg.resolve_ref("broken", Location::default()).unwrap(), None);
    }
}
