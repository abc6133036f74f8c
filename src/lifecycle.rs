//! Membership broadcasts.
//!
//! Every member hears about every join and leave, including the member
//! that is itself joining or leaving. A member tells the two apart with
//! `subject.is(self)`; that is how autonomous knowledge starts its own
//! background work on admission and stops it on removal.
//!
//! A faulting member never stops the broadcast. Its fault is reported and
//! returned, and the remaining members are still notified.
//!
//! Broadcasts are delivered in the order the registry changed. Each change
//! is queued under the same lock that records it; whichever thread finds
//! no delivery in progress drains the queue. A change made while another
//! delivery runs (on another thread, or from inside a callback further up
//! the stack) is only queued, so `learn` and `unlearn` never wait on a
//! slow callback and never deadlock on re-entry.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::engine::Engine;
use crate::fault::{guard, HandlerFault, Phase};
use crate::knowledge::{Capabilities, KnowledgeRef, Snapshot};

/// A recorded membership change waiting for its broadcast.
pub(crate) struct Change {
    subject: KnowledgeRef,
    snapshot: Snapshot,
    phase: Phase,
}

impl Change {
    /// `subject` joined; `snapshot` includes it.
    pub(crate) fn join(subject: KnowledgeRef, snapshot: Snapshot) -> Self {
        Self {
            subject,
            snapshot,
            phase: Phase::Join,
        }
    }

    /// `subject` left; `snapshot` was taken before removal and still includes it.
    pub(crate) fn leave(subject: KnowledgeRef, snapshot: Snapshot) -> Self {
        Self {
            subject,
            snapshot,
            phase: Phase::Leave,
        }
    }
}

/// How a submitted change reached the members.
pub(crate) enum Delivery {
    /// Broadcast by the submitting call, with the faults it raised.
    Delivered(Vec<HandlerFault>),
    /// Handed to the delivery already in progress.
    Queued,
}

#[derive(Default)]
struct Pending {
    changes: VecDeque<Change>,
    delivering: bool,
}

/// Per-engine queue that serializes join and leave broadcasts.
#[derive(Default)]
pub(crate) struct Notifier {
    pending: Mutex<Pending>,
}

impl Notifier {
    /// Record a change with `record` and get it broadcast.
    ///
    /// `record` runs under the queue lock, so queue order is registry order.
    /// Returns `None` when `record` reports no change.
    pub(crate) fn submit<F>(&self, engine: &Engine, record: F) -> Option<Delivery>
    where
        F: FnOnce() -> Option<Change>,
    {
        {
            let mut pending = self.lock();
            let change = record()?;
            pending.changes.push_back(change);
            if pending.delivering {
                return Some(Delivery::Queued);
            }
            pending.delivering = true;
        }

        // The queue was idle, so the first change out is the one just recorded.
        let mut own = None;
        while let Some(change) = self.next() {
            let faults = broadcast(&change.subject, &change.snapshot, engine, change.phase);
            if own.is_none() {
                own = Some(faults);
            }
        }
        Some(Delivery::Delivered(own.unwrap_or_default()))
    }

    fn next(&self) -> Option<Change> {
        let mut pending = self.lock();
        let change = pending.changes.pop_front();
        if change.is_none() {
            pending.delivering = false;
        }
        change
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn broadcast(
    subject: &KnowledgeRef,
    snapshot: &Snapshot,
    engine: &Engine,
    phase: Phase,
) -> Vec<HandlerFault> {
    let required = match phase {
        Phase::Leave => Capabilities::LEAVE,
        _ => Capabilities::JOIN,
    };

    let mut faults = Vec::new();
    for member in snapshot
        .iter()
        .filter(|m| m.capabilities().contains(required))
    {
        let knowledge = member.knowledge();
        let outcome = guard(member, phase, || match phase {
            Phase::Leave => knowledge.on_leave(subject, engine),
            _ => knowledge.on_join(subject, engine),
        });

        if let Err(fault) = outcome {
            engine.reporter().report(&fault);
            faults.push(fault);
        }
    }
    faults
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::error::{KnowledgeError, KnowledgeResult};
    use crate::knowledge::{FnKnowledge, Knowledge};

    /// Records `(self is subject, subject id)` for every notification.
    #[derive(Default)]
    struct Witness {
        joins: Mutex<Vec<(bool, KnowledgeRef)>>,
        leaves: Mutex<Vec<(bool, KnowledgeRef)>>,
    }

    impl Knowledge for Witness {
        fn on_join(&self, subject: &KnowledgeRef, _engine: &Engine) -> KnowledgeResult<()> {
            self.joins
                .lock()
                .unwrap()
                .push((subject.is(self), subject.clone()));
            Ok(())
        }

        fn on_leave(&self, subject: &KnowledgeRef, _engine: &Engine) -> KnowledgeResult<()> {
            self.leaves
                .lock()
                .unwrap()
                .push((subject.is(self), subject.clone()));
            Ok(())
        }
    }

    #[test]
    fn test_new_member_sees_its_own_join() {
        let engine = Engine::new();
        let w = Arc::new(Witness::default());
        let handle = KnowledgeRef::from(w.clone());

        let membership = engine.learn(&handle);
        assert!(membership.changed);

        let joins = w.joins.lock().unwrap();
        assert_eq!(joins.len(), 1);
        assert!(joins[0].0);
        assert_eq!(joins[0].1, handle);
    }

    #[test]
    fn test_peers_see_every_join() {
        let engine = Engine::new();
        let first = Arc::new(Witness::default());
        let second = Arc::new(Witness::default());

        let _ = engine.learn(first.clone());
        let _ = engine.learn(second.clone());

        let first_joins = first.joins.lock().unwrap();
        assert_eq!(first_joins.len(), 2);
        assert!(first_joins[0].0);
        assert!(!first_joins[1].0);
        assert!(first_joins[1].1.is(second.as_ref()));

        // `second` was not a member when `first` joined.
        assert_eq!(second.joins.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_leaving_member_sees_its_own_leave() {
        let engine = Engine::new();
        let stays = Arc::new(Witness::default());
        let goes = Arc::new(Witness::default());
        let _ = engine.learn(stays.clone());
        let _ = engine.learn(goes.clone());

        let membership = engine.unlearn(goes.clone());
        assert!(membership.changed);

        let goes_leaves = goes.leaves.lock().unwrap();
        assert_eq!(goes_leaves.len(), 1);
        assert!(goes_leaves[0].0);

        let stays_leaves = stays.leaves.lock().unwrap();
        assert_eq!(stays_leaves.len(), 1);
        assert!(!stays_leaves[0].0);
        assert!(stays_leaves[0].1.is(goes.as_ref()));
    }

    #[test]
    fn test_fault_does_not_stop_broadcast() {
        let (engine, mut rx) = Engine::builder().build_with_fault_channel();
        let bad = FnKnowledge::builder()
            .name("bad")
            .on_join(|_, _| Err(KnowledgeError::failed("no")))
            .build();
        let _ = engine.learn(bad);

        let witness = Arc::new(Witness::default());
        let membership = engine.learn(witness.clone());

        assert!(membership.changed);
        assert_eq!(membership.faults.len(), 1);
        assert_eq!(membership.faults[0].name, "bad");
        assert_eq!(membership.faults[0].phase, Phase::Join);
        assert_eq!(witness.joins.lock().unwrap().len(), 1);

        // One fault from each of the two joins `bad` heard about.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_panicking_member_is_isolated() {
        let engine = Engine::new();
        let _ = engine.learn(
            FnKnowledge::builder()
                .on_leave(|_, _| panic!("leave panic"))
                .build(),
        );
        let witness = Arc::new(Witness::default());
        let _ = engine.learn(witness.clone());

        let membership = engine.unlearn(witness.clone());
        assert_eq!(membership.faults.len(), 1);
        assert!(membership.faults[0].is_panic());
        assert_eq!(witness.leaves.lock().unwrap().len(), 1);
    }

    /// Implements `on_join` but does not advertise it.
    #[derive(Default)]
    struct Undeclared {
        calls: Mutex<usize>,
    }

    impl Knowledge for Undeclared {
        fn on_join(&self, _subject: &KnowledgeRef, _engine: &Engine) -> KnowledgeResult<()> {
            *self.calls.lock().unwrap() += 1;
            Ok(())
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::LEAVE
        }
    }

    #[test]
    fn test_members_without_capability_are_skipped() {
        let engine = Engine::new();
        let undeclared = Arc::new(Undeclared::default());
        let _ = engine.learn(undeclared.clone());
        let _ = engine.learn(Arc::new(Witness::default()));

        assert_eq!(*undeclared.calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_join_can_learn_more_knowledge() {
        let engine = Engine::new();
        let spawner = FnKnowledge::builder()
            .name("spawner")
            .on_join(|subject, engine| {
                if subject.name() == "spawner" {
                    let _ = engine.learn(FnKnowledge::builder().name("child").build());
                }
                Ok(())
            })
            .build();

        let membership = engine.learn(spawner);
        assert!(membership.is_clean());
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.members()[1].name(), "child");
    }

    #[test]
    fn test_nested_change_is_broadcast_after_current_one() {
        let engine = Engine::new();
        let witness = Arc::new(Witness::default());
        let _ = engine.learn(witness.clone());

        let child = KnowledgeRef::new(FnKnowledge::builder().name("child").build());
        let nested = Arc::new(Mutex::new(None));

        let child_for_join = child.clone();
        let nested_for_join = nested.clone();
        let parent = KnowledgeRef::new(
            FnKnowledge::builder()
                .name("parent")
                .on_join(move |subject, engine| {
                    if subject.name() == "parent" {
                        let membership = engine.learn(&child_for_join);
                        *nested_for_join.lock().unwrap() =
                            Some((membership.changed, membership.queued));
                    }
                    Ok(())
                })
                .build(),
        );

        let membership = engine.learn(&parent);
        assert!(membership.changed);
        assert!(!membership.queued);

        // Recorded at once, broadcast once the parent's join is done.
        assert_eq!(*nested.lock().unwrap(), Some((true, true)));
        let joins = witness.joins.lock().unwrap();
        assert_eq!(joins.len(), 3);
        assert_eq!(joins[1].1, parent);
        assert_eq!(joins[2].1, child);
    }

    #[test]
    fn test_leave_of_nested_join_follows_the_join() {
        let engine = Engine::new();
        let witness = Arc::new(Witness::default());
        let _ = engine.learn(witness.clone());

        let events = Arc::new(Mutex::new(Vec::new()));
        let (on_join_events, on_leave_events) = (events.clone(), events.clone());
        let transient = KnowledgeRef::new(
            FnKnowledge::builder()
                .name("transient")
                .on_join(move |subject, _| {
                    if subject.name() == "transient" {
                        on_join_events.lock().unwrap().push("join");
                    }
                    Ok(())
                })
                .on_leave(move |subject, _| {
                    if subject.name() == "transient" {
                        on_leave_events.lock().unwrap().push("leave");
                    }
                    Ok(())
                })
                .build(),
        );
        let transient_for_join = transient.clone();
        let _ = engine.learn(
            FnKnowledge::builder()
                .name("churner")
                .on_join(move |subject, engine| {
                    if subject.name() == "churner" {
                        let _ = engine.learn(&transient_for_join);
                        let _ = engine.unlearn(&transient_for_join);
                    }
                    Ok(())
                })
                .build(),
        );

        assert!(!engine.contains(&transient));
        assert_eq!(*events.lock().unwrap(), vec!["join", "leave"]);
        let joins = witness.joins.lock().unwrap();
        let leaves = witness.leaves.lock().unwrap();
        assert_eq!(joins.last().map(|j| &j.1), Some(&transient));
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].1, transient);
    }
}
