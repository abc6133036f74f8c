//! Registry holding the active members of an engine.
//!
//! Members are kept in insertion order, without duplicates by identity.
//! The list is copy-on-write: a [`Snapshot`] is just another reference to
//! the current list, so taking one costs a refcount bump and can never
//! observe a half-applied change.
//!
//! The lock only covers swapping the list. Callers broadcast membership
//! changes with the snapshot returned from [`Registry::add`] /
//! [`Registry::remove`] after the lock is released, so callbacks are free to
//! add or remove members themselves.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::KnowledgeRef;

/// Immutable, ordered view of the members at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    members: Arc<[KnowledgeRef]>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            members: Arc::from(Vec::new()),
        }
    }

    /// Number of members in the snapshot.
    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the snapshot has no members.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member at `index`, in insertion order.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&KnowledgeRef> {
        self.members.get(index)
    }

    /// Iterate over members in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, KnowledgeRef> {
        self.members.iter()
    }

    /// Whether `knowledge` is a member of this snapshot.
    pub fn contains(&self, knowledge: &KnowledgeRef) -> bool {
        self.members.iter().any(|m| m == knowledge)
    }

    fn position(&self, knowledge: &KnowledgeRef) -> Option<usize> {
        self.members.iter().position(|m| m == knowledge)
    }
}

impl Deref for Snapshot {
    type Target = [KnowledgeRef];

    fn deref(&self) -> &Self::Target {
        &self.members
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a KnowledgeRef;
    type IntoIter = std::slice::Iter<'a, KnowledgeRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

/// Thread-safe ordered set of members.
#[derive(Debug)]
pub struct Registry {
    current: Mutex<Snapshot>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Snapshot::empty()),
        }
    }

    /// Append `knowledge` unless it is already a member.
    ///
    /// Returns the snapshot that includes it, or `None` if it was
    /// already present (the registry is unchanged).
    pub fn add(&self, knowledge: &KnowledgeRef) -> Option<Snapshot> {
        let mut current = self.lock();
        if current.contains(knowledge) {
            return None;
        }

        let mut members = Vec::with_capacity(current.len() + 1);
        members.extend(current.iter().cloned());
        members.push(knowledge.clone());

        *current = Snapshot {
            members: Arc::from(members),
        };
        Some(current.clone())
    }

    /// Remove `knowledge` if it is a member.
    ///
    /// Returns the snapshot taken just before removal (so it still
    /// contains `knowledge`), or `None` if it was not a member.
    pub fn remove(&self, knowledge: &KnowledgeRef) -> Option<Snapshot> {
        let mut current = self.lock();
        let index = current.position(knowledge)?;

        let before = current.clone();
        let members: Vec<KnowledgeRef> = before
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, m)| m.clone())
            .collect();

        *current = Snapshot {
            members: Arc::from(members),
        };
        Some(before)
    }

    /// Point-in-time copy of the current members.
    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    /// Number of current members.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `knowledge` is currently a member.
    pub fn contains(&self, knowledge: &KnowledgeRef) -> bool {
        self.lock().contains(knowledge)
    }

    // No user code ever runs while the lock is held, so a poisoned
    // lock still guards a consistent list.
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
