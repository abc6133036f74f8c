//! Knowledge module - the handler capability interface.
//!
//! Provides:
//! - [`Knowledge`] - the trait every handler implements (all operations optional)
//! - [`KnowledgeRef`] - identity-compared shared handle to one registration
//! - [`Capabilities`] - which protocols a handler takes part in
//! - [`FnKnowledge`] - closure-backed handler for small or ad-hoc knowledge
//! - [`Context`] - the attribute bag passed through every pass
//! - [`Registry`] / [`Snapshot`] - the membership list
//!
//! # Example
//!
//! ```
//! use gi_engine::{Capabilities, Context, Engine, Knowledge, KnowledgeResult};
//! use serde_json::{json, Value};
//!
//! struct Doubler;
//!
//! impl Knowledge for Doubler {
//!     fn react(&self, ctx: &mut Context, _engine: &Engine) -> KnowledgeResult<Option<Value>> {
//!         Ok(ctx.get_as::<i64>("n")?.map(|n| json!(n * 2)))
//!     }
//!
//!     fn capabilities(&self) -> Capabilities {
//!         Capabilities::REACT
//!     }
//! }
//!
//! let engine = Engine::new();
//! engine.learn(Doubler);
//!
//! let mut ctx = Context::new().with("n", 21);
//! let out: Vec<Value> = engine.on(&mut ctx).into_iter().collect();
//! assert_eq!(out, vec![json!(42)]);
//! ```

mod context;
mod func;
mod registry;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use serde_json::Value;

use crate::compose::Composer;
use crate::engine::Engine;
use crate::error::KnowledgeResult;

pub use context::Context;
pub use func::{FnKnowledge, FnKnowledgeBuilder};
pub use registry::{Registry, Snapshot};

/// A unit of knowledge living in an engine's pool.
///
/// Every operation is optional. The defaults do nothing, and
/// [`capabilities`](Knowledge::capabilities) tells the engine which
/// operations are worth calling at all; anything outside the set is
/// skipped without an invocation.
///
/// Callbacks take `&self` because the same knowledge can be driven from
/// several threads at once (the caller's thread and any background task).
/// Private state therefore lives behind the implementor's own locks or atomics.
pub trait Knowledge: Send + Sync + 'static {
    /// React to a stimulus. `Ok(None)` means "no opinion" and yields nothing.
    fn react(&self, _ctx: &mut Context, _engine: &Engine) -> KnowledgeResult<Option<Value>> {
        Ok(None)
    }

    /// Called on every member, the new one included, after `subject` joins.
    fn on_join(&self, _subject: &KnowledgeRef, _engine: &Engine) -> KnowledgeResult<()> {
        Ok(())
    }

    /// Called on every member, the leaving one included, when `subject` leaves.
    ///
    /// This is the only stop signal a member gets. Background work started
    /// from `on_join` should be stopped here when `subject.is(self)`.
    fn on_leave(&self, _subject: &KnowledgeRef, _engine: &Engine) -> KnowledgeResult<()> {
        Ok(())
    }

    /// Add to a shared context during a composition pass.
    fn contribute(
        &self,
        _ctx: &mut Context,
        _composer: &Composer<'_>,
        _engine: &Engine,
    ) -> KnowledgeResult<()> {
        Ok(())
    }

    /// Protocols this knowledge takes part in.
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    /// Name used in logs and fault reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Set of protocols a [`Knowledge`] participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    /// Reactive dispatch (`react`).
    pub const REACT: Self = Self(1 << 0);
    /// Join notifications (`on_join`).
    pub const JOIN: Self = Self(1 << 1);
    /// Leave notifications (`on_leave`).
    pub const LEAVE: Self = Self(1 << 2);
    /// Collaborative composition (`contribute`).
    pub const CONTRIBUTE: Self = Self(1 << 3);

    /// No protocols.
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// All four protocols.
    #[inline]
    pub const fn all() -> Self {
        Self(Self::REACT.0 | Self::JOIN.0 | Self::LEAVE.0 | Self::CONTRIBUTE.0)
    }

    /// Whether every protocol in `other` is also in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Combine two sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether the set is empty.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// Identity of one registration: the address of its shared allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KnowledgeId(usize);

impl fmt::Display for KnowledgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Shared handle to a registered [`Knowledge`].
///
/// Equality and hashing are by identity: two structurally identical
/// handlers are still two different members.
#[derive(Clone)]
pub struct KnowledgeRef(Arc<dyn Knowledge>);

impl KnowledgeRef {
    /// Wrap a knowledge value in a new shared handle.
    pub fn new<K: Knowledge>(knowledge: K) -> Self {
        Self(Arc::new(knowledge))
    }

    /// Identity of this registration.
    #[inline]
    pub fn id(&self) -> KnowledgeId {
        KnowledgeId(Arc::as_ptr(&self.0).cast::<()>() as usize)
    }

    /// Whether this handle points at `other`.
    ///
    /// Used from inside callbacks as `subject.is(self)`.
    #[inline]
    pub fn is<K: ?Sized>(&self, other: &K) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0).cast::<()>(),
            (other as *const K).cast::<()>(),
        )
    }

    /// Name reported by the knowledge.
    #[inline]
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Capabilities reported by the knowledge.
    #[inline]
    pub fn capabilities(&self) -> Capabilities {
        self.0.capabilities()
    }

    /// Borrow the underlying knowledge.
    #[inline]
    pub fn knowledge(&self) -> &dyn Knowledge {
        self.0.as_ref()
    }
}

impl<K: Knowledge> From<K> for KnowledgeRef {
    fn from(knowledge: K) -> Self {
        Self::new(knowledge)
    }
}

impl<K: Knowledge> From<Arc<K>> for KnowledgeRef {
    fn from(knowledge: Arc<K>) -> Self {
        Self(knowledge)
    }
}

impl From<Arc<dyn Knowledge>> for KnowledgeRef {
    fn from(knowledge: Arc<dyn Knowledge>) -> Self {
        Self(knowledge)
    }
}

impl From<&KnowledgeRef> for KnowledgeRef {
    fn from(knowledge: &KnowledgeRef) -> Self {
        knowledge.clone()
    }
}

impl PartialEq for KnowledgeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for KnowledgeRef {}

impl Hash for KnowledgeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for KnowledgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnowledgeRef")
            .field("name", &self.name())
            .field("id", &self.id())
            .finish()
    }
}
