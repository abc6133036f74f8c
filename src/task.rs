//! Background work owned by a member.
//!
//! The engine never starts, tracks or stops member tasks. A member that
//! wants to act on its own (a timer, a poller) embeds a [`BackgroundTask`],
//! starts it from `on_join` when it is the subject, and stops it from
//! `on_leave` when it is the subject.
//!
//! Stopping is cooperative. `stop` only signals; a tick that is already
//! running finishes, and no further tick starts.
//!
//! Each tick runs on tokio's blocking pool. A tick drives whole passes and
//! callbacks may block, so it must never occupy an async worker.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use gi_engine::{BackgroundTask, Context, Engine, Knowledge, KnowledgeRef, KnowledgeResult};
//!
//! struct Ticker {
//!     task: BackgroundTask,
//!     runtime: tokio::runtime::Handle,
//! }
//!
//! impl Knowledge for Ticker {
//!     fn on_join(&self, subject: &KnowledgeRef, engine: &Engine) -> KnowledgeResult<()> {
//!         if subject.is(self) {
//!             self.task.start_every(&self.runtime, Duration::from_millis(100), engine, |engine| {
//!                 let mut ctx = Context::new().with("tick", true);
//!                 engine.on(&mut ctx).into_iter().for_each(drop);
//!             });
//!         }
//!         Ok(())
//!     }
//!
//!     fn on_leave(&self, subject: &KnowledgeRef, _engine: &Engine) -> KnowledgeResult<()> {
//!         if subject.is(self) {
//!             self.task.stop();
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::Engine;

struct Running {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// A repeating task owned by one member.
///
/// Dropping a `BackgroundTask` signals stop as well.
#[derive(Default)]
pub struct BackgroundTask {
    running: Mutex<Option<Running>>,
}

impl BackgroundTask {
    /// Create an idle task.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `tick` every `period` on `runtime` until stopped.
    ///
    /// The task holds only a weak engine handle; it ends by itself once
    /// the engine is gone. The first tick happens one `period` after start.
    /// Ticks never overlap, and a tick that panics ends the task.
    /// Returns `false` (and starts nothing) if already running.
    pub fn start_every<F>(
        &self,
        runtime: &Handle,
        period: Duration,
        engine: &Engine,
        mut tick: F,
    ) -> bool
    where
        F: FnMut(&Engine) + Send + 'static,
    {
        let mut running = self.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let (stop, mut stopped) = watch::channel(false);
        let weak = engine.downgrade();
        let label = engine.label().to_string();

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    biased;
                    // Only `true` is ever sent, and a dropped sender means stop too.
                    _ = stopped.changed() => break,
                    _ = interval.tick() => {
                        let Some(engine) = weak.upgrade() else {
                            break;
                        };
                        let ran = tokio::task::spawn_blocking(move || {
                            tick(&engine);
                            tick
                        })
                        .await;
                        match ran {
                            Ok(returned) => tick = returned,
                            Err(e) => {
                                tracing::warn!(engine = %label, "background tick failed: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
            tracing::debug!(engine = %label, "background task stopped");
        });

        tracing::debug!(engine = %engine.label(), ?period, "background task started");
        *running = Some(Running { stop, handle });
        true
    }

    /// Signal the task to stop. Returns whether it was running.
    pub fn stop(&self) -> bool {
        match self.lock().take() {
            Some(running) => {
                let _ = running.stop.send(true);
                !running.handle.is_finished()
            }
            None => false,
        }
    }

    /// Whether a started task has not finished yet.
    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ticks_until_stopped() {
        let engine = Engine::new();
        let task = BackgroundTask::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        assert!(task.start_every(&Handle::current(), Duration::from_millis(5), &engine, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(task.is_running());

        wait_until(|| ticks.load(Ordering::SeqCst) >= 3).await;
        assert!(task.stop());
        assert!(!task.is_running());

        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_stop = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_twice_is_refused() {
        let engine = Engine::new();
        let task = BackgroundTask::new();
        let handle = Handle::current();

        assert!(task.start_every(&handle, Duration::from_secs(60), &engine, |_| {}));
        assert!(!task.start_every(&handle, Duration::from_secs(60), &engine, |_| {}));
        assert!(task.stop());
        assert!(!task.stop());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ends_when_engine_dropped() {
        let engine = Engine::new();
        let task = BackgroundTask::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        task.start_every(&Handle::current(), Duration::from_millis(5), &engine, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(engine);

        wait_until(|| !task.is_running()).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_blocking_tick_leaves_async_workers_free() {
        let engine = Engine::new();
        let task = BackgroundTask::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        task.start_every(&Handle::current(), Duration::from_millis(5), &engine, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
        });
        wait_until(|| ticks.load(Ordering::SeqCst) >= 1).await;

        // The only worker must stay free while the tick sleeps.
        let started = std::time::Instant::now();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            started.elapsed()
        });
        let elapsed = timer.await.unwrap();
        assert!(elapsed < Duration::from_millis(200), "async sleep took {elapsed:?}");

        task.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_tick_ends_task() {
        let engine = Engine::new();
        let task = BackgroundTask::new();

        task.start_every(&Handle::current(), Duration::from_millis(5), &engine, |_| {
            panic!("tick failed");
        });

        wait_until(|| !task.is_running()).await;
    }

    #[tokio::test]
    async fn test_ticks_on_current_thread_runtime() {
        let engine = Engine::new();
        let task = BackgroundTask::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        task.start_every(&Handle::current(), Duration::from_millis(5), &engine, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        wait_until(|| ticks.load(Ordering::SeqCst) >= 2).await;
        assert!(task.stop());
    }

    #[test]
    fn test_idle_task() {
        let task = BackgroundTask::new();
        assert!(!task.is_running());
        assert!(!task.stop());
    }
}
