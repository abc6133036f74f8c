//! Closure-backed knowledge.
//!
//! [`FnKnowledge`] implements [`Knowledge`] from up to four closures.
//! Its capability set is exactly the set of closures supplied, so a value
//! built with only `.contribute(..)` never takes part in dispatch.
//!
//! # Example
//!
//! ```
//! use gi_engine::{Context, Engine, FnKnowledge};
//! use serde_json::json;
//!
//! let step = FnKnowledge::builder()
//!     .name("step")
//!     .contribute(|ctx, _composer, _engine| {
//!         ctx.append("accum", "step")?;
//!         Ok(())
//!     })
//!     .build();
//!
//! let engine = Engine::new();
//! engine.learn(step);
//!
//! let composed = engine.compose(&mut Context::new(), |ctx| ctx.get("accum").cloned());
//! assert_eq!(composed.value, Some(json!(["step"])));
//! ```

use serde_json::Value;

use super::{Capabilities, Context, Knowledge, KnowledgeRef};
use crate::compose::Composer;
use crate::engine::Engine;
use crate::error::KnowledgeResult;

type ReactFn = Box<dyn Fn(&mut Context, &Engine) -> KnowledgeResult<Option<Value>> + Send + Sync>;
type MembershipFn = Box<dyn Fn(&KnowledgeRef, &Engine) -> KnowledgeResult<()> + Send + Sync>;
type ContributeFn =
    Box<dyn Fn(&mut Context, &Composer<'_>, &Engine) -> KnowledgeResult<()> + Send + Sync>;

/// Knowledge assembled from optional closures.
pub struct FnKnowledge {
    name: String,
    react: Option<ReactFn>,
    on_join: Option<MembershipFn>,
    on_leave: Option<MembershipFn>,
    contribute: Option<ContributeFn>,
}

impl FnKnowledge {
    /// Start building a closure-backed knowledge.
    pub fn builder() -> FnKnowledgeBuilder {
        FnKnowledgeBuilder::new()
    }
}

impl Knowledge for FnKnowledge {
    fn react(&self, ctx: &mut Context, engine: &Engine) -> KnowledgeResult<Option<Value>> {
        match &self.react {
            Some(f) => f(ctx, engine),
            None => Ok(None),
        }
    }

    fn on_join(&self, subject: &KnowledgeRef, engine: &Engine) -> KnowledgeResult<()> {
        match &self.on_join {
            Some(f) => f(subject, engine),
            None => Ok(()),
        }
    }

    fn on_leave(&self, subject: &KnowledgeRef, engine: &Engine) -> KnowledgeResult<()> {
        match &self.on_leave {
            Some(f) => f(subject, engine),
            None => Ok(()),
        }
    }

    fn contribute(
        &self,
        ctx: &mut Context,
        composer: &Composer<'_>,
        engine: &Engine,
    ) -> KnowledgeResult<()> {
        match &self.contribute {
            Some(f) => f(ctx, composer, engine),
            None => Ok(()),
        }
    }

    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        if self.react.is_some() {
            caps |= Capabilities::REACT;
        }
        if self.on_join.is_some() {
            caps |= Capabilities::JOIN;
        }
        if self.on_leave.is_some() {
            caps |= Capabilities::LEAVE;
        }
        if self.contribute.is_some() {
            caps |= Capabilities::CONTRIBUTE;
        }
        caps
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fluent builder for [`FnKnowledge`].
pub struct FnKnowledgeBuilder {
    inner: FnKnowledge,
}

impl FnKnowledgeBuilder {
    /// Create a builder with no closures and the name `"fn-knowledge"`.
    pub fn new() -> Self {
        Self {
            inner: FnKnowledge {
                name: "fn-knowledge".to_string(),
                react: None,
                on_join: None,
                on_leave: None,
                contribute: None,
            },
        }
    }

    /// Set the name used in logs and fault reports.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Handle reactive dispatch.
    pub fn react<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context, &Engine) -> KnowledgeResult<Option<Value>> + Send + Sync + 'static,
    {
        self.inner.react = Some(Box::new(f));
        self
    }

    /// Handle join notifications.
    pub fn on_join<F>(mut self, f: F) -> Self
    where
        F: Fn(&KnowledgeRef, &Engine) -> KnowledgeResult<()> + Send + Sync + 'static,
    {
        self.inner.on_join = Some(Box::new(f));
        self
    }

    /// Handle leave notifications.
    pub fn on_leave<F>(mut self, f: F) -> Self
    where
        F: Fn(&KnowledgeRef, &Engine) -> KnowledgeResult<()> + Send + Sync + 'static,
    {
        self.inner.on_leave = Some(Box::new(f));
        self
    }

    /// Handle composition passes.
    pub fn contribute<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context, &Composer<'_>, &Engine) -> KnowledgeResult<()> + Send + Sync + 'static,
    {
        self.inner.contribute = Some(Box::new(f));
        self
    }

    /// Finish building.
    pub fn build(self) -> FnKnowledge {
        self.inner
    }
}

impl Default for FnKnowledgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capabilities_follow_closures() {
        let empty = FnKnowledge::builder().build();
        assert!(empty.capabilities().is_empty());

        let react_only = FnKnowledge::builder().react(|_, _| Ok(None)).build();
        assert_eq!(react_only.capabilities(), Capabilities::REACT);

        let membership = FnKnowledge::builder()
            .on_join(|_, _| Ok(()))
            .on_leave(|_, _| Ok(()))
            .build();
        assert_eq!(
            membership.capabilities(),
            Capabilities::JOIN | Capabilities::LEAVE
        );
    }

    #[test]
    fn test_builder_name() {
        let k = FnKnowledge::builder().name("h1").build();
        assert_eq!(Knowledge::name(&k), "h1");

        let unnamed = FnKnowledge::builder().build();
        assert_eq!(Knowledge::name(&unnamed), "fn-knowledge");
    }

    #[test]
    fn test_react_closure_is_called() {
        let engine = Engine::new();
        let k = FnKnowledge::builder()
            .react(|ctx, _| Ok(ctx.get("a").map(|_| json!("x"))))
            .build();

        let mut with_a = Context::new().with("a", 1);
        assert_eq!(k.react(&mut with_a, &engine).unwrap(), Some(json!("x")));

        let mut without = Context::new();
        assert_eq!(k.react(&mut without, &engine).unwrap(), None);
    }
}
