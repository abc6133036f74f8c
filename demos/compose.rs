//! Compose - example of a collaborative pass.
//!
//! This example demonstrates:
//! - Members appending to a lazily created accumulator
//! - A faulting contributor being reported while the rest still contribute
//! - Receiving faults out of band through the fault channel
//!
//! # Running
//!
//! ```text
//! cargo run --example compose
//! ```

use gi_engine::{Context, Engine, FnKnowledge, KnowledgeError};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

fn stage(name: &'static str) -> FnKnowledge {
    FnKnowledge::builder()
        .name(name)
        .contribute(move |ctx, composer, _| {
            ctx.append("accum", format!("{name}@{}", composer.position()))?;
            Ok(())
        })
        .build()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let (engine, mut faults) = Engine::builder()
        .label("compose-demo")
        .build_with_fault_channel();

    engine.learn(stage("parse"));
    engine.learn(
        FnKnowledge::builder()
            .name("validate")
            .contribute(|ctx, _, _| match ctx.get("input") {
                Some(Value::String(s)) if !s.is_empty() => Ok(()),
                _ => Err(KnowledgeError::failed("missing input")),
            })
            .build(),
    );
    engine.learn(stage("render"));

    let mut ctx = Context::new();
    let composed = engine.compose(&mut ctx, |ctx| {
        ctx.get_as::<Vec<String>>("accum")
            .ok()
            .flatten()
            .unwrap_or_default()
            .join(" -> ")
    });

    println!("composed: {}", composed.value);
    for fault in &composed.faults {
        println!("fault: {fault}");
    }

    while let Ok(fault) = faults.try_recv() {
        println!("reported: {} ({})", fault.name, fault.phase);
    }

    Ok(())
}
