use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::trace;

use crate::TransferError;

/// One link of a chain: resolves to the context for the next link.
pub type ChainLink<C, E> = Pin<Box<dyn Future<Output = Result<C, E>> + Send>>;

/// A chain of tasks where each link is computed from the previous outcome.
pub struct ChainSpec<C, E> {
    /// Produces the next link, or `None` when the chain is done.
    pub get_next: Box<dyn FnMut(&C) -> Option<ChainLink<C, E>> + Send>,
    pub init_ctx: C,
    /// Runs once with the error of the first link that fails.
    pub on_failure: Box<dyn FnOnce(E) + Send>,
}

impl<C, E> ChainSpec<C, E> {
    pub fn new(
        init_ctx: C,
        get_next: impl FnMut(&C) -> Option<ChainLink<C, E>> + Send + 'static,
        on_failure: impl FnOnce(E) + Send + 'static,
    ) -> Self {
        Self {
            get_next: Box::new(get_next),
            init_ctx,
            on_failure: Box::new(on_failure),
        }
    }
}

/// Bounded worker pool shared by one-shot tasks and continuation chains.
///
/// At most `max_concurrent` tasks run at once. A chain holds a slot only
/// while one of its links runs, so it competes for every link.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    in_flight: AtomicUsize,
    closed: AtomicBool,
    tracker: TaskTracker,
}

/// An occupied slot; frees itself on drop.
struct Slot<'a> {
    _permit: OwnedSemaphorePermit,
    in_flight: &'a AtomicUsize,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl QueueInner {
    async fn acquire(&self) -> Result<Slot<'_>, TransferError> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| TransferError::QueueClosed)?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(Slot {
            _permit: permit,
            in_flight: &self.in_flight,
        })
    }
}

impl TaskQueue {
    /// Creates a queue running at most `max_concurrent` tasks (at least 1).
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            inner: Arc::new(QueueInner {
                slots: Arc::new(Semaphore::new(max_concurrent)),
                max_concurrent,
                in_flight: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Number of tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Stops accepting new work. Work already submitted runs to completion.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Submits a one-shot task; it occupies one slot until it settles.
    pub fn add_task<F, T>(
        &self,
        task: F,
    ) -> Result<JoinHandle<Result<T, TransferError>>, TransferError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_open()?;
        let inner = Arc::clone(&self.inner);
        Ok(self.inner.tracker.spawn(async move {
            let _slot = inner.acquire().await?;
            Ok(task.await)
        }))
    }

    /// Submits a chain. Links run strictly one after another; the chain
    /// stops at the first `None` or the first failing link.
    pub fn run_with_next<C, E>(
        &self,
        spec: ChainSpec<C, E>,
    ) -> Result<JoinHandle<()>, TransferError>
    where
        C: Send + 'static,
        E: Send + 'static,
    {
        self.ensure_open()?;
        let inner = Arc::clone(&self.inner);
        Ok(self.inner.tracker.spawn(async move {
            let ChainSpec {
                mut get_next,
                init_ctx,
                on_failure,
            } = spec;
            let mut ctx = init_ctx;
            while let Some(link) = get_next(&ctx) {
                let outcome = {
                    let Ok(_slot) = inner.acquire().await else {
                        trace!("queue shut down mid-chain");
                        return;
                    };
                    link.await
                };
                match outcome {
                    Ok(next) => ctx = next,
                    Err(e) => {
                        on_failure(e);
                        return;
                    }
                }
            }
        }))
    }

    /// Waits until every task and chain submitted so far has finished.
    pub async fn wait_idle(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    fn ensure_open(&self) -> Result<(), TransferError> {
        if self.is_closed() {
            return Err(TransferError::QueueClosed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Tracks the highest number of concurrently running tasks.
    #[derive(Clone, Default)]
    struct Gauge {
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Gauge {
        async fn hold(&self, d: Duration) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(d).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_more_than_max_in_flight() {
        let queue = TaskQueue::new(2);
        let gauge = Gauge::default();
        let mut handles = Vec::new();
        for _ in 0..5 {
            let p = gauge.clone();
            handles.push(
                queue
                    .add_task(async move { p.hold(Duration::from_millis(50)).await })
                    .unwrap(),
            );
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(gauge.peak(), 2);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn add_task_returns_value() {
        let queue = TaskQueue::new(1);
        let v = queue.add_task(async { 41 + 1 }).unwrap().await.unwrap().unwrap();
        assert_eq!(v, 42);
    }

    #[tokio::test]
    async fn chain_feeds_context_forward() {
        let queue = TaskQueue::new(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);

        let spec = ChainSpec::new(
            0u32,
            move |ctx: &u32| {
                let ctx = *ctx;
                if ctx >= 4 {
                    return None;
                }
                let s = Arc::clone(&s);
                Some(Box::pin(async move {
                    s.lock().unwrap().push(ctx);
                    Ok::<_, String>(ctx + 1)
                }) as ChainLink<u32, String>)
            },
            |e: String| panic!("unexpected failure: {e}"),
        );
        queue.run_with_next(spec).unwrap().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn failing_link_stops_only_its_chain() {
        let queue = TaskQueue::new(2);
        let failures = Arc::new(Mutex::new(Vec::new()));
        let steps = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&failures);
        let st = Arc::clone(&steps);
        let failing = ChainSpec::new(
            0u32,
            move |ctx: &u32| {
                let ctx = *ctx;
                let st = Arc::clone(&st);
                Some(Box::pin(async move {
                    st.fetch_add(1, Ordering::SeqCst);
                    if ctx == 1 {
                        Err("link 1 failed".to_string())
                    } else {
                        Ok(ctx + 1)
                    }
                }) as ChainLink<u32, String>)
            },
            move |e| f.lock().unwrap().push(e),
        );

        let done = Arc::new(AtomicBool::new(false));
        let d = Arc::clone(&done);
        let healthy = ChainSpec::new(
            0u32,
            move |ctx: &u32| {
                let ctx = *ctx;
                if ctx == 3 {
                    d.store(true, Ordering::SeqCst);
                    return None;
                }
                Some(Box::pin(async move { Ok::<_, String>(ctx + 1) }) as ChainLink<u32, String>)
            },
            |_| {},
        );

        let a = queue.run_with_next(failing).unwrap();
        let b = queue.run_with_next(healthy).unwrap();
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(*failures.lock().unwrap(), vec!["link 1 failed".to_string()]);
        assert_eq!(steps.load(Ordering::SeqCst), 2);
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn chains_and_tasks_share_the_budget() {
        let queue = TaskQueue::new(2);
        let gauge = Gauge::default();

        for _ in 0..3 {
            let p = gauge.clone();
            let spec = ChainSpec::new(
                0u32,
                move |ctx: &u32| {
                    let ctx = *ctx;
                    if ctx == 3 {
                        return None;
                    }
                    let p = p.clone();
                    Some(Box::pin(async move {
                        p.hold(Duration::from_millis(10)).await;
                        Ok::<_, ()>(ctx + 1)
                    }) as ChainLink<u32, ()>)
                },
                |_| {},
            );
            queue.run_with_next(spec).unwrap();
        }
        for _ in 0..3 {
            let p = gauge.clone();
            queue
                .add_task(async move { p.hold(Duration::from_millis(15)).await })
                .unwrap();
        }

        queue.wait_idle().await;
        assert_eq!(gauge.peak(), 2);
    }

    #[tokio::test]
    async fn closed_queue_rejects_work() {
        let queue = TaskQueue::new(1);
        queue.close();
        assert!(matches!(
            queue.add_task(async {}),
            Err(TransferError::QueueClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_idle_can_be_reused() {
        let queue = TaskQueue::new(1);
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let c = Arc::clone(&count);
            queue
                .add_task(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            queue.wait_idle().await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
