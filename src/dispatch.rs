//! Reactive dispatch.
//!
//! [`Engine::on`](crate::Engine::on) returns a [`Dispatch`]: the membership
//! snapshot taken at call time plus the borrowed stimulus context. Nothing
//! runs until it is iterated.
//!
//! Iterating yields one value per member whose `react` returned `Some`,
//! in snapshot order. Members are invoked one at a time, on demand, so
//! stopping early leaves the rest uninvoked. Results are never cached:
//! every call to [`Dispatch::iter`] is a fresh pass over the same snapshot.
//!
//! # Example
//!
//! ```
//! use gi_engine::{Context, Engine, FnKnowledge};
//! use serde_json::json;
//!
//! let engine = Engine::new();
//! engine.learn(FnKnowledge::builder().react(|_, _| Ok(Some(json!(1)))).build());
//! engine.learn(FnKnowledge::builder().react(|_, _| Ok(Some(json!(2)))).build());
//!
//! let mut ctx = Context::new();
//! let mut dispatch = engine.on(&mut ctx);
//!
//! // Take only the first reaction; the second member is never invoked.
//! assert_eq!(dispatch.iter().next(), Some(json!(1)));
//!
//! // A new pass over the same snapshot invokes both again.
//! assert_eq!(dispatch.iter().count(), 2);
//! ```

use std::iter::FusedIterator;

use serde_json::Value;

use crate::engine::Engine;
use crate::fault::{guard, HandlerFault, Phase};
use crate::knowledge::{Capabilities, Context, Snapshot};

/// A stimulus bound to a membership snapshot, ready to be iterated.
pub struct Dispatch<'c> {
    engine: Engine,
    snapshot: Snapshot,
    ctx: &'c mut Context,
}

impl<'c> Dispatch<'c> {
    pub(crate) fn new(engine: Engine, snapshot: Snapshot, ctx: &'c mut Context) -> Self {
        Self {
            engine,
            snapshot,
            ctx,
        }
    }

    /// Members this dispatch will visit.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The stimulus context, including side effects of passes so far.
    pub fn context(&self) -> &Context {
        &*self.ctx
    }

    /// Start a new lazy pass over the snapshot.
    pub fn iter(&mut self) -> Reactions<'_> {
        Reactions::new(self.engine.clone(), self.snapshot.clone(), &mut *self.ctx)
    }

    /// Run one full pass eagerly.
    pub fn collect_values(&mut self) -> Reacted {
        let mut reactions = self.iter();
        let values = reactions.by_ref().collect();
        Reacted {
            values,
            faults: reactions.into_faults(),
        }
    }
}

impl<'c> IntoIterator for Dispatch<'c> {
    type Item = Value;
    type IntoIter = Reactions<'c>;

    fn into_iter(self) -> Self::IntoIter {
        Reactions::new(self.engine, self.snapshot, self.ctx)
    }
}

/// Values and faults of one eager pass.
#[derive(Debug, Default)]
pub struct Reacted {
    /// Reactions in snapshot order.
    pub values: Vec<Value>,
    /// Members whose `react` faulted; they contributed no value.
    pub faults: Vec<HandlerFault>,
}

/// One lazy pass over a snapshot.
pub struct Reactions<'a> {
    engine: Engine,
    snapshot: Snapshot,
    ctx: &'a mut Context,
    next: usize,
    faults: Vec<HandlerFault>,
}

impl<'a> Reactions<'a> {
    fn new(engine: Engine, snapshot: Snapshot, ctx: &'a mut Context) -> Self {
        Self {
            engine,
            snapshot,
            ctx,
            next: 0,
            faults: Vec::new(),
        }
    }

    /// Faults raised so far in this pass.
    pub fn faults(&self) -> &[HandlerFault] {
        &self.faults
    }

    /// Consume the pass, keeping its faults.
    pub fn into_faults(self) -> Vec<HandlerFault> {
        self.faults
    }
}

impl Iterator for Reactions<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let Self {
            engine,
            snapshot,
            ctx,
            next,
            faults,
        } = self;
        let engine: &Engine = engine;

        while let Some(member) = snapshot.get(*next) {
            *next += 1;
            if !member.capabilities().contains(Capabilities::REACT) {
                continue;
            }

            let knowledge = member.knowledge();
            match guard(member, Phase::React, || knowledge.react(&mut **ctx, engine)) {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(fault) => {
                    engine.reporter().report(&fault);
                    faults.push(fault);
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.snapshot.len().saturating_sub(self.next)))
    }
}

impl FusedIterator for Reactions<'_> {}
