//! Collaborative composition.
//!
//! A composition pass is eager and single-shot:
//! 1. take a membership snapshot
//! 2. let every member with `CONTRIBUTE` work on the shared context, in order
//! 3. run the caller's finalizer on the context and return its value
//!
//! There is no merge policy: the last writer of a field wins. Members that
//! need to accumulate use additive patterns such as [`Context::append`].
//! A faulting contributor is reported and skipped; the finalizer always runs.

use crate::engine::Engine;
use crate::fault::{guard, HandlerFault, Phase};
use crate::knowledge::{Capabilities, Context, Snapshot};

/// Per-contribution view of the composition pass.
#[derive(Debug, Clone, Copy)]
pub struct Composer<'a> {
    participants: &'a Snapshot,
    position: usize,
    faults: &'a [HandlerFault],
}

impl<'a> Composer<'a> {
    /// Index of the current contributor within [`participants`](Self::participants).
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Snapshot this pass runs over (all members, not only contributors).
    #[inline]
    pub fn participants(&self) -> &'a Snapshot {
        self.participants
    }

    /// Faults raised by earlier contributors in this pass.
    #[inline]
    pub fn faults_so_far(&self) -> &'a [HandlerFault] {
        self.faults
    }
}

/// Result of a composition pass.
#[derive(Debug)]
pub struct Composed<R> {
    /// Value returned by the finalizer.
    pub value: R,
    /// Contributors that faulted.
    pub faults: Vec<HandlerFault>,
}

impl<R> Composed<R> {
    /// Whether every contribution succeeded.
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    /// Drop the faults and keep the value.
    pub fn into_value(self) -> R {
        self.value
    }
}

pub(crate) fn run<R, F>(
    engine: &Engine,
    snapshot: &Snapshot,
    ctx: &mut Context,
    finalize: F,
) -> Composed<R>
where
    F: FnOnce(&mut Context) -> R,
{
    let mut faults = Vec::new();

    for (position, member) in snapshot.iter().enumerate() {
        if !member.capabilities().contains(Capabilities::CONTRIBUTE) {
            continue;
        }

        let composer = Composer {
            participants: snapshot,
            position,
            faults: &faults,
        };
        let knowledge = member.knowledge();
        let outcome = guard(member, Phase::Contribute, || {
            knowledge.contribute(ctx, &composer, engine)
        });

        if let Err(fault) = outcome {
            engine.reporter().report(&fault);
            faults.push(fault);
        }
    }

    Composed {
        value: finalize(ctx),
        faults,
    }
}
