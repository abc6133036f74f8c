//! Engine builder and the shared engine handle.
//!
//! The [`EngineBuilder`] provides a fluent API for configuring an engine.
//! The [`Engine`] is the one handle callers and knowledge share:
//! 1. `learn` / `unlearn` change membership and broadcast the change
//! 2. `on` dispatches a stimulus, lazily, over a membership snapshot
//! 3. `compose` runs a collaborative pass and finalizes it
//!
//! # Example
//!
//! ```
//! use gi_engine::{Context, Engine, FnKnowledge};
//! use serde_json::{json, Value};
//!
//! let (engine, mut faults) = Engine::builder()
//!     .label("demo")
//!     .build_with_fault_channel();
//!
//! engine.learn(
//!     FnKnowledge::builder()
//!         .react(|ctx, _| Ok(ctx.get("a").map(|_| json!("x"))))
//!         .build(),
//! );
//!
//! let mut ctx = Context::new().with("a", true);
//! let out: Vec<Value> = engine.on(&mut ctx).into_iter().collect();
//! assert_eq!(out, vec![json!("x")]);
//! assert!(faults.try_recv().is_err());
//! ```

use std::sync::{Arc, Weak};

use serde::Deserialize;
use tokio::sync::mpsc;

use crate::compose::{self, Composed};
use crate::dispatch::Dispatch;
use crate::error::{EngineError, Result};
use crate::fault::{FaultReceiver, FaultReporter, HandlerFault};
use crate::knowledge::{Context, KnowledgeRef, Registry, Snapshot};
use crate::lifecycle::{Change, Delivery, Notifier};

/// Default label attached to every log event of an engine.
pub const DEFAULT_LABEL: &str = "gi";

/// Engine configuration.
///
/// Can be loaded from JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Label attached to log events, to tell engines apart.
    pub label: String,
    /// Whether faults are forwarded to the fault channel (when one exists).
    pub report_faults: bool,
}

impl EngineConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(EngineError::Config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            report_faults: true,
        }
    }
}

/// Builder for configuring and creating an [`Engine`].
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Create a new engine builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the log label.
    ///
    /// Default: `"gi"`
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = label.into();
        self
    }

    /// Enable or disable forwarding faults to the fault channel.
    ///
    /// Faults are always returned to the caller and logged either way.
    /// Default: true
    pub fn report_faults(mut self, enabled: bool) -> Self {
        self.config.report_faults = enabled;
        self
    }

    /// Build an engine without a fault channel.
    pub fn build(self) -> Engine {
        Engine::from_parts(self.config, None)
    }

    /// Build an engine plus the receiving end of its fault channel.
    ///
    /// Every fault from every pass, whichever thread drove it, is sent
    /// here when `report_faults` is enabled.
    pub fn build_with_fault_channel(self) -> (Engine, FaultReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = self.config.report_faults.then_some(tx);
        (Engine::from_parts(self.config, sink), rx)
    }
}

/// Outcome of `learn` / `unlearn`.
#[derive(Debug, Default)]
pub struct Membership {
    /// Whether membership actually changed. `false` means the knowledge was
    /// already a member (learn) or was not a member (unlearn).
    pub changed: bool,
    /// Whether the broadcast was left to a delivery already in progress,
    /// on another thread or further up this one. Its faults then reach only
    /// the log and the fault channel.
    pub queued: bool,
    /// Faults raised by members while being notified.
    pub faults: Vec<HandlerFault>,
}

impl Membership {
    fn unchanged() -> Self {
        Self::default()
    }

    fn from_delivery(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Delivered(faults) => Self {
                changed: true,
                queued: false,
                faults,
            },
            Delivery::Queued => Self {
                changed: true,
                queued: true,
                faults: Vec::new(),
            },
        }
    }

    /// Whether every notified member handled the change cleanly.
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

struct EngineInner {
    registry: Registry,
    notifier: Notifier,
    config: EngineConfig,
    reporter: FaultReporter,
}

/// A pool of knowledge with no central scheduler.
///
/// `Engine` is cheap to clone; clones share the same registry, so a
/// background task can keep one and drive its own passes concurrently
/// with the caller.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine with default configuration.
    pub fn new() -> Self {
        EngineBuilder::new().build()
    }

    /// Create a new engine builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn from_parts(config: EngineConfig, sink: Option<mpsc::UnboundedSender<HandlerFault>>) -> Self {
        let reporter = FaultReporter::new(config.label.clone(), sink);
        tracing::debug!(engine = %config.label, "engine created");
        Self {
            inner: Arc::new(EngineInner {
                registry: Registry::new(),
                notifier: Notifier::default(),
                config,
                reporter,
            }),
        }
    }

    /// Add knowledge to the pool and notify every member, itself included.
    ///
    /// Learning something already present changes nothing and notifies no one.
    /// Notifications follow registry order: if another join or leave is
    /// still being broadcast, this one is queued behind it and the call
    /// returns without waiting.
    pub fn learn(&self, knowledge: impl Into<KnowledgeRef>) -> Membership {
        let knowledge = knowledge.into();
        let registry = &self.inner.registry;
        let delivery = self.inner.notifier.submit(self, || {
            let snapshot = registry.add(&knowledge)?;
            tracing::info!(
                engine = %self.label(),
                knowledge = %knowledge.name(),
                members = snapshot.len(),
                "learned"
            );
            Some(Change::join(knowledge.clone(), snapshot))
        });

        match delivery {
            Some(delivery) => Membership::from_delivery(delivery),
            None => {
                tracing::debug!(engine = %self.label(), knowledge = %knowledge.name(), "already a member");
                Membership::unchanged()
            }
        }
    }

    /// Remove knowledge from the pool and notify every member, itself included.
    ///
    /// Unlearning a non-member changes nothing and notifies no one. Ordering
    /// follows [`learn`](Self::learn), so a member never hears its own leave
    /// before its own join.
    pub fn unlearn(&self, knowledge: impl Into<KnowledgeRef>) -> Membership {
        let knowledge = knowledge.into();
        let registry = &self.inner.registry;
        let delivery = self.inner.notifier.submit(self, || {
            let snapshot = registry.remove(&knowledge)?;
            tracing::info!(
                engine = %self.label(),
                knowledge = %knowledge.name(),
                members = snapshot.len() - 1,
                "unlearned"
            );
            Some(Change::leave(knowledge.clone(), snapshot))
        });

        match delivery {
            Some(delivery) => Membership::from_delivery(delivery),
            None => {
                tracing::debug!(engine = %self.label(), knowledge = %knowledge.name(), "not a member");
                Membership::unchanged()
            }
        }
    }

    /// Present a stimulus to the pool.
    ///
    /// Nothing is invoked until the returned [`Dispatch`] is iterated.
    pub fn on<'c>(&self, ctx: &'c mut Context) -> Dispatch<'c> {
        let snapshot = self.inner.registry.snapshot();
        tracing::debug!(engine = %self.label(), members = snapshot.len(), "dispatch");
        Dispatch::new(self.clone(), snapshot, ctx)
    }

    /// Let every contributing member work on `ctx`, then finalize it.
    pub fn compose<R, F>(&self, ctx: &mut Context, finalize: F) -> Composed<R>
    where
        F: FnOnce(&mut Context) -> R,
    {
        let snapshot = self.inner.registry.snapshot();
        tracing::debug!(engine = %self.label(), members = snapshot.len(), "compose");
        compose::run(self, &snapshot, ctx, finalize)
    }

    /// Point-in-time copy of the current members.
    pub fn members(&self) -> Snapshot {
        self.inner.registry.snapshot()
    }

    /// Number of current members.
    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    /// Whether `knowledge` is currently a member.
    pub fn contains(&self, knowledge: &KnowledgeRef) -> bool {
        self.inner.registry.contains(knowledge)
    }

    /// Label from the configuration.
    pub fn label(&self) -> &str {
        &self.inner.config.label
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub(crate) fn reporter(&self) -> &FaultReporter {
        &self.inner.reporter
    }

    /// Whether two handles address the same engine.
    pub fn same_engine(&self, other: &Engine) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Handle that does not keep the engine alive.
    ///
    /// Background work owned by a member should hold this rather than an
    /// [`Engine`], otherwise the engine and the member keep each other alive.
    pub fn downgrade(&self) -> WeakEngine {
        WeakEngine {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning engine handle, see [`Engine::downgrade`].
#[derive(Clone)]
pub struct WeakEngine {
    inner: Weak<EngineInner>,
}

impl WeakEngine {
    /// Get the engine back, if it still exists.
    pub fn upgrade(&self) -> Option<Engine> {
        self.inner.upgrade().map(|inner| Engine { inner })
    }
}

impl std::fmt::Debug for WeakEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakEngine")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("label", &self.label())
            .field("members", &self.len())
            .finish()
    }
}
