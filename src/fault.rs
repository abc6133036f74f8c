//! Handler fault capture and reporting.
//!
//! A fault in one knowledge callback never stops a pass. Each callback is
//! run through [`guard`], which turns both returned errors and panics into
//! a [`HandlerFault`]. Faults are then:
//! - returned to the caller alongside the primary result
//! - logged with `tracing::warn!`
//! - cloned into the engine's fault channel, if one is configured

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::{KnowledgeError, KnowledgeResult};
use crate::knowledge::{KnowledgeId, KnowledgeRef};

/// Receiving end of an engine's fault channel.
pub type FaultReceiver = mpsc::UnboundedReceiver<HandlerFault>;

/// Protocol step during which a fault happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// `react` during dispatch.
    React,
    /// `on_join` during a join broadcast.
    Join,
    /// `on_leave` during a leave broadcast.
    Leave,
    /// `contribute` during composition.
    Contribute,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::React => "react",
            Phase::Join => "on_join",
            Phase::Leave => "on_leave",
            Phase::Contribute => "contribute",
        };
        f.write_str(s)
    }
}

/// A knowledge callback failed (returned an error or panicked).
#[derive(Debug, Clone, Error)]
#[error("{phase} failed in '{name}' ({knowledge}): {error}")]
pub struct HandlerFault {
    /// Identity of the faulting member.
    pub knowledge: KnowledgeId,
    /// Name of the faulting member.
    pub name: String,
    /// Which callback faulted.
    pub phase: Phase,
    /// The underlying error.
    #[source]
    pub error: KnowledgeError,
}

impl HandlerFault {
    /// Build a fault for `knowledge`.
    pub fn new(knowledge: &KnowledgeRef, phase: Phase, error: KnowledgeError) -> Self {
        Self {
            knowledge: knowledge.id(),
            name: knowledge.name().to_string(),
            phase,
            error,
        }
    }

    /// Whether the fault came from a panic rather than a returned error.
    pub fn is_panic(&self) -> bool {
        matches!(self.error, KnowledgeError::Panicked(_))
    }
}

/// Where an engine sends its faults besides the per-call result.
#[derive(Debug, Clone)]
pub(crate) struct FaultReporter {
    label: String,
    sink: Option<mpsc::UnboundedSender<HandlerFault>>,
}

impl FaultReporter {
    pub(crate) fn new(label: String, sink: Option<mpsc::UnboundedSender<HandlerFault>>) -> Self {
        Self { label, sink }
    }

    /// Log `fault` and forward it to the channel.
    pub(crate) fn report(&self, fault: &HandlerFault) {
        tracing::warn!(engine = %self.label, phase = %fault.phase, knowledge = %fault.name, "{}", fault);

        if let Some(sink) = &self.sink {
            // A dropped receiver just means nobody is listening.
            let _ = sink.send(fault.clone());
        }
    }
}

/// Run one knowledge callback, converting an error or panic into a fault.
pub(crate) fn guard<T, F>(knowledge: &KnowledgeRef, phase: Phase, f: F) -> Result<T, HandlerFault>
where
    F: FnOnce() -> KnowledgeResult<T>,
{
    tracing::trace!(knowledge = %knowledge.name(), %phase, "invoke");

    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(HandlerFault::new(knowledge, phase, error)),
        Err(payload) => Err(HandlerFault::new(
            knowledge,
            phase,
            KnowledgeError::Panicked(panic_message(payload.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
