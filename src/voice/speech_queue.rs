//! Prioritized speech synthesis queue
//!
//! A single worker task synthesizes requests one at a time. Higher priorities
//! jump ahead of lower ones; equal priorities keep arrival order. Every
//! request must finish within the queue timeout of being enqueued, time
//! spent waiting behind other requests included.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;

use super::tts::Synthesizer;
use crate::{Error, Result};

/// Speech request priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SpeechPriority {
    /// Background chatter
    Low,
    /// Regular responses
    #[default]
    Normal,
    /// Errors and warnings
    High,
    /// Served before anything else queued
    Immediate,
}

struct Request {
    id: u64,
    text: String,
    priority: SpeechPriority,
    deadline: Instant,
    reply: oneshot::Sender<Result<Vec<u8>>>,
}

struct Inner {
    pending: Mutex<VecDeque<Request>>,
    notify: Notify,
    shutdown: AtomicBool,
    next_id: AtomicU64,
    timeout: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Request>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a queued request
#[derive(Debug)]
pub struct SpeechTicket {
    id: u64,
    deadline: Instant,
    timeout: Duration,
    done: oneshot::Receiver<Result<Vec<u8>>>,
}

impl SpeechTicket {
    /// Request identifier, for [`SpeechQueue::cancel`]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the synthesized audio
    ///
    /// # Errors
    ///
    /// Returns error if synthesis failed, the request was cancelled, or the
    /// queue timeout elapsed since it was enqueued
    pub async fn wait(self) -> Result<Vec<u8>> {
        match tokio::time::timeout_at(self.deadline, self.done).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Tts(format!(
                "speech request {} was cancelled",
                self.id
            ))),
            Err(_) => Err(timed_out(self.id, self.timeout)),
        }
    }
}

/// Queue of pending synthesis requests served by a background task
pub struct SpeechQueue {
    inner: Arc<Inner>,
}

impl SpeechQueue {
    /// Start the worker task
    ///
    /// A request that is not synthesized within `timeout` of being enqueued
    /// fails, whether it was still queued or mid-synthesis. Must be called
    /// from within a tokio runtime.
    #[must_use]
    pub fn spawn(synthesizer: Arc<dyn Synthesizer>, timeout: Duration) -> Self {
        let inner = Arc::new(Inner {
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            shutdown: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            timeout,
        });

        tokio::spawn(run_worker(Arc::clone(&inner), synthesizer));

        Self { inner }
    }

    /// Queue text for synthesis
    pub fn enqueue(&self, text: impl Into<String>, priority: SpeechPriority) -> SpeechTicket {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, done) = oneshot::channel();
        let timeout = self.inner.timeout;
        let deadline = Instant::now() + timeout;
        let request = Request {
            id,
            text: text.into(),
            priority,
            deadline,
            reply,
        };

        {
            let mut pending = self.inner.lock();
            let position = pending
                .iter()
                .position(|queued| queued.priority < priority)
                .unwrap_or(pending.len());
            pending.insert(position, request);
            tracing::debug!(id, ?priority, position, "speech request queued");
        }

        self.inner.notify.notify_one();
        SpeechTicket {
            id,
            deadline,
            timeout,
            done,
        }
    }

    /// Remove a request that has not started yet
    ///
    /// Returns false if the request is already being synthesized or finished.
    pub fn cancel(&self, id: u64) -> bool {
        let mut pending = self.inner.lock();
        let Some(position) = pending.iter().position(|queued| queued.id == id) else {
            return false;
        };
        pending.remove(position);
        tracing::debug!(id, "speech request cancelled");
        true
    }

    /// Drop every request that has not started yet, returning how many
    pub fn cancel_all(&self) -> usize {
        let mut pending = self.inner.lock();
        let count = pending.len();
        pending.clear();
        if count > 0 {
            tracing::debug!(count, "speech queue cleared");
        }
        count
    }

    /// Requests waiting to be synthesized
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing is waiting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Drop for SpeechQueue {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.notify.notify_one();
    }
}

fn timed_out(id: u64, timeout: Duration) -> Error {
    Error::Tts(format!(
        "speech request {id} timed out after {}ms",
        timeout.as_millis()
    ))
}

async fn run_worker(inner: Arc<Inner>, synthesizer: Arc<dyn Synthesizer>) {
    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        let next = inner.lock().pop_front();
        let Some(request) = next else {
            inner.notify.notified().await;
            continue;
        };

        // Expired while queued
        if Instant::now() >= request.deadline {
            tracing::warn!(id = request.id, "speech request expired before synthesis");
            let _ = request.reply.send(Err(timed_out(request.id, inner.timeout)));
            continue;
        }

        tracing::debug!(id = request.id, chars = request.text.len(), "synthesizing");

        let result = match tokio::time::timeout_at(
            request.deadline,
            synthesizer.synthesize(&request.text),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    id = request.id,
                    timeout = ?inner.timeout,
                    "speech synthesis timed out"
                );
                Err(timed_out(request.id, inner.timeout))
            }
        };

        if request.reply.send(result).is_err() {
            tracing::debug!(id = request.id, "speech ticket dropped before completion");
        }
    }

    tracing::debug!("speech queue worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    /// Synthesizer that returns the text as bytes once a permit is released
    struct Gated {
        gate: Arc<Semaphore>,
        spoken: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Synthesizer for Gated {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| Error::Tts(e.to_string()))?;
            permit.forget();
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(text.as_bytes().to_vec())
        }
    }

    struct Hang;

    #[async_trait]
    impl Synthesizer for Hang {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
            std::future::pending().await
        }
    }

    fn gated() -> (SpeechQueue, Arc<Semaphore>, Arc<Mutex<Vec<String>>>) {
        gated_with(Duration::from_secs(5))
    }

    fn gated_with(timeout: Duration) -> (SpeechQueue, Arc<Semaphore>, Arc<Mutex<Vec<String>>>) {
        let gate = Arc::new(Semaphore::new(0));
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let queue = SpeechQueue::spawn(
            Arc::new(Gated {
                gate: Arc::clone(&gate),
                spoken: Arc::clone(&spoken),
            }),
            timeout,
        );
        (queue, gate, spoken)
    }

    async fn until_empty(queue: &SpeechQueue) {
        while !queue.is_empty() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_priority_order() {
        let (queue, gate, spoken) = gated();

        // Occupy the worker so the rest queue up behind it
        let first = queue.enqueue("first", SpeechPriority::Normal);
        until_empty(&queue).await;

        let low = queue.enqueue("low", SpeechPriority::Low);
        let normal = queue.enqueue("normal", SpeechPriority::Normal);
        let high = queue.enqueue("high", SpeechPriority::High);
        let normal_two = queue.enqueue("normal two", SpeechPriority::Normal);
        let now = queue.enqueue("now", SpeechPriority::Immediate);
        assert_eq!(queue.len(), 5);

        gate.add_permits(6);
        for ticket in [first, low, normal, high, normal_two, now] {
            ticket.wait().await.unwrap();
        }

        assert_eq!(
            *spoken.lock().unwrap(),
            vec!["first", "now", "high", "normal", "normal two", "low"]
        );
    }

    #[tokio::test]
    async fn test_wait_returns_audio() {
        let (queue, gate, _) = gated();
        gate.add_permits(1);

        let audio = queue
            .enqueue("hello", SpeechPriority::Normal)
            .wait()
            .await
            .unwrap();
        assert_eq!(audio, b"hello");
    }

    #[tokio::test]
    async fn test_cancel_pending() {
        let (queue, gate, spoken) = gated();

        let first = queue.enqueue("first", SpeechPriority::Normal);
        until_empty(&queue).await;

        let doomed = queue.enqueue("doomed", SpeechPriority::Normal);
        let kept = queue.enqueue("kept", SpeechPriority::Normal);

        assert!(queue.cancel(doomed.id()));
        assert!(!queue.cancel(doomed.id()));
        assert!(!queue.cancel(first.id()));

        gate.add_permits(2);
        first.wait().await.unwrap();
        kept.wait().await.unwrap();
        assert!(matches!(doomed.wait().await, Err(Error::Tts(_))));
        assert_eq!(*spoken.lock().unwrap(), vec!["first", "kept"]);
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let (queue, _gate, _) = gated();

        let _first = queue.enqueue("first", SpeechPriority::Normal);
        until_empty(&queue).await;

        let a = queue.enqueue("a", SpeechPriority::Low);
        let _b = queue.enqueue("b", SpeechPriority::High);

        assert_eq!(queue.cancel_all(), 2);
        assert!(queue.is_empty());
        assert!(a.wait().await.is_err());
    }

    #[tokio::test]
    async fn test_synthesis_timeout() {
        let queue = SpeechQueue::spawn(Arc::new(Hang), Duration::from_millis(20));

        let result = queue.enqueue("stuck", SpeechPriority::Normal).wait().await;
        assert!(matches!(result, Err(Error::Tts(msg)) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_timeout_counts_time_spent_queued() {
        let timeout = Duration::from_millis(200);
        let queue = SpeechQueue::spawn(Arc::new(Hang), timeout);

        let started = std::time::Instant::now();
        let a = queue.enqueue("a", SpeechPriority::Normal);
        let b = queue.enqueue("b", SpeechPriority::Normal);
        let c = queue.enqueue("c", SpeechPriority::Normal);

        // The last request fails on its own deadline, not after a and b time out in turn
        assert!(matches!(c.wait().await, Err(Error::Tts(msg)) if msg.contains("timed out")));
        let elapsed = started.elapsed();
        assert!(elapsed < timeout + Duration::from_millis(150), "{elapsed:?}");

        assert!(a.wait().await.is_err());
        assert!(b.wait().await.is_err());
        assert!(started.elapsed() < timeout + Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_expired_requests_are_skipped() {
        let (queue, gate, spoken) = gated_with(Duration::from_millis(100));

        let first = queue.enqueue("first", SpeechPriority::Normal);
        until_empty(&queue).await;
        let stale = queue.enqueue("stale", SpeechPriority::Normal);

        // Both deadlines pass while the worker is blocked on the first request
        assert!(first.wait().await.is_err());
        assert!(stale.wait().await.is_err());

        // Let the worker observe the stale deadline before releasing the gate
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.add_permits(1);
        let fresh = queue.enqueue("fresh", SpeechPriority::Normal);
        assert_eq!(fresh.wait().await.unwrap(), b"fresh");
        assert_eq!(*spoken.lock().unwrap(), vec!["fresh"]);
    }
}
