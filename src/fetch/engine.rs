use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc::{
    UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel,
};
use tokio::task::JoinHandle;

use crate::error::{AppError, AppResult};

/// Completion of one submitted fetch.
#[derive(Debug)]
pub struct FetchEvent<K, T> {
    pub generation: u64,
    pub kind: K,
    pub output: AppResult<T>,
}

struct InFlight {
    generation: u64,
    task: JoinHandle<()>,
}

/// Runs fetches as background tasks, one slot per kind.
///
/// Submitting a fetch of a kind that is already in flight aborts the older
/// task. Every submission gets a fresh generation so owners can recognise
/// completions that raced an abort.
pub struct FetchEngine<K, T> {
    event_tx: UnboundedSender<FetchEvent<K, T>>,
    event_rx: UnboundedReceiver<FetchEvent<K, T>>,
    in_flight: HashMap<K, InFlight>,
    next_generation: u64,
    closed: bool,
    runtime: FetchRuntime,
}

struct FetchRuntime {
    _owned: Option<Runtime>,
    handle: Handle,
}

impl FetchRuntime {
    fn new() -> AppResult<Self> {
        if let Ok(handle) = Handle::try_current() {
            return Ok(Self {
                _owned: None,
                handle,
            });
        }

        let runtime = Builder::new_multi_thread()
            .enable_all()
            .worker_threads(2)
            .thread_name("rbrowse-fetch")
            .build()
            .map_err(|source| {
                AppError::io_with_context(source, "failed to start fetch runtime")
            })?;
        let handle = runtime.handle().clone();
        Ok(Self {
            _owned: Some(runtime),
            handle,
        })
    }

    fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(task)
    }
}

impl<K, T> FetchEngine<K, T>
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
    T: Send + 'static,
{
    pub fn new() -> AppResult<Self> {
        let (event_tx, event_rx) = unbounded_channel();
        Ok(Self {
            event_tx,
            event_rx,
            in_flight: HashMap::new(),
            next_generation: 0,
            closed: false,
            runtime: FetchRuntime::new()?,
        })
    }

    pub fn submit<F>(&mut self, kind: K, fetch: F) -> AppResult<u64>
    where
        F: Future<Output = AppResult<T>> + Send + 'static,
    {
        if self.closed {
            return Err(AppError::internal("fetch engine is shut down"));
        }

        if let Some(previous) = self.in_flight.remove(&kind) {
            previous.task.abort();
            tracing::debug!(
                ?kind,
                generation = previous.generation,
                "aborted superseded fetch"
            );
        }

        self.next_generation = self.next_generation.saturating_add(1);
        let generation = self.next_generation;
        let event_tx = self.event_tx.clone();
        let task = self.runtime.spawn(async move {
            let output = match AssertUnwindSafe(fetch).catch_unwind().await {
                Ok(output) => output,
                Err(_) => Err(AppError::internal("fetch task panicked")),
            };
            let _ = event_tx.send(FetchEvent {
                generation,
                kind,
                output,
            });
        });
        self.in_flight.insert(kind, InFlight { generation, task });
        Ok(generation)
    }

    /// Aborts every in-flight fetch and returns how many were stopped.
    pub fn cancel_all(&mut self) -> usize {
        let canceled = self.in_flight.len();
        for (_, entry) in self.in_flight.drain() {
            entry.task.abort();
        }
        canceled
    }

    /// Cancels everything and rejects later submissions.
    pub fn shutdown(&mut self) {
        self.cancel_all();
        self.closed = true;
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn in_flight_generation(&self, kind: K) -> Option<u64> {
        self.in_flight.get(&kind).map(|entry| entry.generation)
    }

    pub fn drain_events(&mut self) -> Vec<FetchEvent<K, T>> {
        let mut drained = Vec::new();

        loop {
            match self.event_rx.try_recv() {
                Ok(event) => {
                    self.retire(&event);
                    drained.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }

        drained
    }

    /// Waits for the next completion. Returns `None` once nothing is in flight
    /// and no completion is queued.
    pub async fn next_event(&mut self) -> Option<FetchEvent<K, T>> {
        if let Ok(event) = self.event_rx.try_recv() {
            self.retire(&event);
            return Some(event);
        }
        if self.in_flight.is_empty() {
            return None;
        }

        let event = self.event_rx.recv().await?;
        self.retire(&event);
        Some(event)
    }

    fn retire(&mut self, event: &FetchEvent<K, T>) {
        if self.in_flight_generation(event.kind) == Some(event.generation) {
            self.in_flight.remove(&event.kind);
        }
    }
}

impl<K, T> Drop for FetchEngine<K, T> {
    fn drop(&mut self) {
        for (_, entry) in self.in_flight.drain() {
            entry.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::FetchEngine;
    use crate::error::AppError;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Fast,
        Slow,
    }

    #[tokio::test]
    async fn submit_returns_incrementing_generation() {
        let mut engine = FetchEngine::<Kind, u32>::new().expect("engine should start");
        let gen1 = engine
            .submit(Kind::Fast, async { Ok(1) })
            .expect("first submit should succeed");
        let gen2 = engine
            .submit(Kind::Slow, async { Ok(2) })
            .expect("second submit should succeed");

        assert_eq!(gen1, 1);
        assert_eq!(gen2, 2);
    }

    #[tokio::test]
    async fn resubmitting_a_kind_aborts_the_older_fetch() {
        let mut engine = FetchEngine::<Kind, &'static str>::new().expect("engine should start");
        engine
            .submit(Kind::Slow, async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok("stale")
            })
            .expect("submit should succeed");
        let latest = engine
            .submit(Kind::Slow, async { Ok("fresh") })
            .expect("submit should succeed");

        let mut outputs = Vec::new();
        while let Some(event) = engine.next_event().await {
            outputs.push((event.generation, event.output.expect("fetch should succeed")));
        }

        assert_eq!(outputs, vec![(latest, "fresh")]);
        assert!(engine.is_idle());
    }

    #[tokio::test]
    async fn different_kinds_run_side_by_side() {
        let mut engine = FetchEngine::<Kind, u32>::new().expect("engine should start");
        engine
            .submit(Kind::Slow, async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(2)
            })
            .expect("submit should succeed");
        engine
            .submit(Kind::Fast, async { Ok(1) })
            .expect("submit should succeed");

        let mut kinds = Vec::new();
        while let Some(event) = engine.next_event().await {
            kinds.push(event.kind);
        }

        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&Kind::Fast));
        assert!(kinds.contains(&Kind::Slow));
    }

    #[tokio::test]
    async fn panicking_fetch_reports_internal_error() {
        let mut engine = FetchEngine::<Kind, u32>::new().expect("engine should start");
        engine
            .submit(Kind::Fast, async {
                if true {
                    panic!("boom");
                }
                Ok(0)
            })
            .expect("submit should succeed");

        let event = engine.next_event().await.expect("panic should still report");
        assert!(matches!(event.output, Err(AppError::Internal(_))));
        assert!(engine.next_event().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_rejects_new_fetches() {
        let mut engine = FetchEngine::<Kind, u32>::new().expect("engine should start");
        engine
            .submit(Kind::Slow, async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(1)
            })
            .expect("submit should succeed");

        engine.shutdown();

        assert!(engine.is_idle());
        assert!(engine.submit(Kind::Fast, async { Ok(2) }).is_err());
        assert!(engine.next_event().await.is_none());
    }

    #[test]
    fn engine_owns_a_runtime_outside_async_context() {
        let mut engine = FetchEngine::<Kind, u32>::new().expect("engine should start");
        engine
            .submit(Kind::Fast, async { Ok(5) })
            .expect("submit should succeed");

        let start = std::time::Instant::now();
        loop {
            let events = engine.drain_events();
            if let Some(event) = events.into_iter().next() {
                assert_eq!(event.output.expect("fetch should succeed"), 5);
                break;
            }
            assert!(
                start.elapsed() <= Duration::from_secs(3),
                "timed out waiting for fetch completion"
            );
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(engine.is_idle());
    }
}
