//! Ticker - example of an autonomous member.
//!
//! This example demonstrates:
//! - Starting background work from `on_join` when the member is the subject
//! - The background task driving its own dispatch passes on the shared engine
//! - Stopping the task from `on_leave` via `unlearn`
//!
//! # Running
//!
//! ```text
//! RUST_LOG=gi_engine=debug cargo run --example ticker
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gi_engine::{
    BackgroundTask, Capabilities, Context, Engine, FnKnowledge, Knowledge, KnowledgeRef,
    KnowledgeResult,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

/// Emits a `tick` stimulus to the whole pool every `period`.
struct Ticker {
    period: Duration,
    runtime: tokio::runtime::Handle,
    task: BackgroundTask,
    count: Arc<AtomicU64>,
}

impl Knowledge for Ticker {
    fn on_join(&self, subject: &KnowledgeRef, engine: &Engine) -> KnowledgeResult<()> {
        if !subject.is(self) {
            return Ok(());
        }

        let count = self.count.clone();
        self.task
            .start_every(&self.runtime, self.period, engine, move |engine| {
                let n = count.fetch_add(1, Ordering::SeqCst) + 1;
                let mut ctx = Context::new().with("tick", n);
                for reaction in engine.on(&mut ctx) {
                    tracing::info!(tick = n, %reaction, "reaction");
                }
            });
        Ok(())
    }

    fn on_leave(&self, subject: &KnowledgeRef, _engine: &Engine) -> KnowledgeResult<()> {
        if subject.is(self) {
            self.task.stop();
        }
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::JOIN | Capabilities::LEAVE
    }

    fn name(&self) -> &str {
        "ticker"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let engine = Engine::builder().label("ticker-demo").build();

    // Reacts to every third tick.
    engine.learn(
        FnKnowledge::builder()
            .name("fizz")
            .react(|ctx, _| {
                let tick: Option<u64> = ctx.get_as("tick")?;
                Ok(tick.filter(|n| n % 3 == 0).map(|n| json!(format!("fizz {n}"))))
            })
            .build(),
    );

    let ticker = KnowledgeRef::new(Ticker {
        period: Duration::from_millis(100),
        runtime: tokio::runtime::Handle::current(),
        task: BackgroundTask::new(),
        count: Arc::new(AtomicU64::new(0)),
    });
    engine.learn(&ticker);

    // The caller keeps using the engine while the ticker runs.
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(350)).await;
        let mut ctx = Context::new().with("tick", 0);
        let out: Vec<Value> = engine.on(&mut ctx).into_iter().collect();
        tracing::info!(?out, "caller pass");
    }

    let membership = engine.unlearn(&ticker);
    tracing::info!(changed = membership.changed, members = engine.len(), "ticker unlearned");

    tokio::time::sleep(Duration::from_millis(300)).await;
    Ok(())
}
