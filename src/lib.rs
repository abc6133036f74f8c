//! # gi-engine
//!
//! A flat, decentralized dispatch engine for pluggable knowledge.
//!
//! An [`Engine`] holds a pool of independent [`Knowledge`] members. There is
//! no scheduler and no pipeline; members take part in up to three protocols:
//!
//! - **Reactive dispatch** - [`Engine::on`] presents a stimulus [`Context`]
//!   and lazily yields each member's reaction
//! - **Membership** - [`Engine::learn`] / [`Engine::unlearn`] notify every
//!   member of every join and leave
//! - **Composition** - [`Engine::compose`] lets members build up a shared
//!   context, then finalizes it into one value
//!
//! Members may run their own background work (see [`BackgroundTask`]) that
//! drives passes or changes membership concurrently with the caller. Every
//! pass works on a snapshot of the membership taken when it starts, and no
//! lock is held while member code runs.
//!
//! ## Example
//!
//! ```
//! use gi_engine::{Context, Engine, FnKnowledge};
//! use serde_json::{json, Value};
//!
//! let engine = Engine::new();
//!
//! engine.learn(
//!     FnKnowledge::builder()
//!         .name("h1")
//!         .react(|ctx, _| Ok(ctx.contains("a").then(|| json!("x"))))
//!         .build(),
//! );
//! engine.learn(
//!     FnKnowledge::builder()
//!         .name("h2")
//!         .react(|ctx, _| Ok(ctx.contains("b").then(|| json!("y"))))
//!         .build(),
//! );
//!
//! let mut ctx = Context::new().with("a", 1).with("b", 2);
//! let out: Vec<Value> = engine.on(&mut ctx).into_iter().collect();
//! assert_eq!(out, vec![json!("x"), json!("y")]);
//! ```

pub mod compose;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fault;
pub mod knowledge;
mod lifecycle;
pub mod task;

pub use compose::{Composed, Composer};
pub use dispatch::{Dispatch, Reacted, Reactions};
pub use engine::{Engine, EngineBuilder, EngineConfig, Membership, WeakEngine};
pub use error::{ContextError, EngineError, KnowledgeError, KnowledgeResult, Result};
pub use fault::{FaultReceiver, HandlerFault, Phase};
pub use knowledge::{
    Capabilities, Context, FnKnowledge, FnKnowledgeBuilder, Knowledge, KnowledgeId, KnowledgeRef,
    Registry, Snapshot,
};
pub use task::BackgroundTask;
