//! # Turnstile Runtime
//!
//! Runtime coordinator for Turnstile aggregates: the [`store::Store`].
//!
//! A store owns one aggregate's state, its reducer, and its environment.
//! Every action — a registration attempt, a payment result, an expiry
//! sweep — is reduced while holding the store's write lock, so all
//! capacity-affecting operations for one ticketed event execute with mutual
//! exclusion, while stores for different events proceed fully in parallel.
//! Effects returned by the reducer run asynchronously in spawned tasks with
//! a feedback loop: an effect may produce a new action, which re-enters the
//! same store.
//!
//! Event-store appends are retried per [`RetryPolicy`] and dead-lettered
//! into the [`DeadLetterQueue`] when retries are exhausted. Notification
//! delivery is fire-and-forget: failures are logged, never retried, and
//! never fed back.

pub mod retry;

pub use retry::RetryPolicy;
pub use store::Store;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Errors surfaced by the store runtime.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store is shutting down and rejects new actions.
    #[error("Store is shutting down; action rejected")]
    ShutdownInProgress,

    /// Timed out waiting for effects to complete.
    #[error("Timed out waiting for effects to complete")]
    Timeout,

    /// Shutdown timeout expired with effects still running.
    #[error("Shutdown timeout expired with {0} effects still running")]
    ShutdownTimeout(usize),
}

/// A failed operation parked for later inspection.
#[derive(Debug, Clone)]
pub struct DeadLetter<T> {
    /// Description or payload of the failed operation.
    pub payload: T,
    /// The terminal error message.
    pub error: String,
    /// How many attempts were made before giving up.
    pub attempts: u32,
}

/// Bounded queue of permanently failed operations.
///
/// When the queue is full the oldest entry is dropped; the queue exists for
/// operators to inspect, not as durable storage.
#[derive(Debug)]
pub struct DeadLetterQueue<T> {
    inner: Arc<Mutex<VecDeque<DeadLetter<T>>>>,
    max_size: usize,
}

impl<T> Clone for DeadLetterQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            max_size: self.max_size,
        }
    }
}

impl<T> Default for DeadLetterQueue<T> {
    fn default() -> Self {
        Self::new(100)
    }
}

impl<T> DeadLetterQueue<T> {
    /// Create a queue holding at most `max_size` entries.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            max_size: max_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DeadLetter<T>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park a failed operation.
    pub fn push(&self, payload: T, error: String, attempts: u32) {
        let mut queue = self.lock();
        if queue.len() >= self.max_size {
            queue.pop_front();
        }
        queue.push_back(DeadLetter {
            payload,
            error,
            attempts,
        });
    }

    /// Number of parked entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum capacity.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Remove and return all parked entries.
    #[must_use]
    pub fn drain(&self) -> Vec<DeadLetter<T>> {
        self.lock().drain(..).collect()
    }
}

/// Tracks the in-flight effects spawned on behalf of one `send`, including
/// cascaded feedback actions. Delayed actions are excluded: they are
/// scheduled work, not part of the originating request.
#[derive(Clone)]
struct EffectTracker {
    count: Arc<Mutex<usize>>,
    tx: Arc<watch::Sender<usize>>,
    global: Arc<AtomicUsize>,
}

impl EffectTracker {
    fn new(global: Arc<AtomicUsize>) -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            count: Arc::new(Mutex::new(0)),
            tx: Arc::new(tx),
            global,
        }
    }

    fn register(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
        let _ = self.tx.send_replace(*count);
        self.global.fetch_add(1, Ordering::AcqRel);
    }

    fn complete(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        let _ = self.tx.send_replace(*count);
        self.global.fetch_sub(1, Ordering::AcqRel);
    }

    fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }
}

/// Handle for awaiting the effects started by one `send`.
///
/// `send()` returns after *starting* effect execution. Callers that need the
/// persistence/notification side effects to have landed (tests, graceful
/// handlers) wait on the handle.
pub struct EffectHandle {
    rx: watch::Receiver<usize>,
}

impl EffectHandle {
    fn new(tracker: &EffectTracker) -> Self {
        Self {
            rx: tracker.subscribe(),
        }
    }

    /// A handle whose effects have already completed.
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(0);
        drop(tx);
        Self { rx }
    }

    /// Wait until every tracked effect (including cascaded feedback
    /// actions) has completed.
    pub async fn wait(mut self) {
        loop {
            if *self.rx.borrow_and_update() == 0 {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Wait with a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the effects do not complete in
    /// time.
    pub async fn wait_with_timeout(self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

pub mod store {
    use super::{
        Arc, AtomicUsize, DeadLetterQueue, Duration, EffectHandle, EffectTracker, Ordering,
        RetryPolicy, StoreError,
    };
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::RwLock;
    use turnstile_core::effect::{Effect, EventStoreOperation};
    use turnstile_core::reducer::Reducer;

    /// The Store — runtime coordinator for one aggregate instance.
    ///
    /// The store manages:
    /// 1. State (behind an `RwLock`; the write guard is the per-aggregate
    ///    serialization point)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution with feedback loop
    ///
    /// # Concurrency
    ///
    /// - The reducer executes synchronously while holding the write lock;
    ///   concurrent `send()` calls for the same store serialize there.
    /// - Effects execute asynchronously in spawned tasks; `send()` returns
    ///   after starting them, not after they finish.
    /// - Actions produced by effects re-enter the same store and serialize
    ///   with everything else.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: RwLock<S>,
        reducer: R,
        environment: E,
        retry_policy: RetryPolicy,
        dlq: DeadLetterQueue<String>,
        shutdown: AtomicBool,
        pending_effects: Arc<AtomicUsize>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        S: Send + Sync + 'static,
        A: Send + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_retry_policy(initial_state, reducer, environment, RetryPolicy::default())
        }

        /// Create a new store with a custom retry policy for event appends.
        #[must_use]
        pub fn with_retry_policy(
            initial_state: S,
            reducer: R,
            environment: E,
            retry_policy: RetryPolicy,
        ) -> Self {
            Self {
                state: RwLock::new(initial_state),
                reducer,
                environment,
                retry_policy,
                dlq: DeadLetterQueue::default(),
                shutdown: AtomicBool::new(false),
                pending_effects: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Access to the dead letter queue of permanently failed appends.
        #[must_use]
        pub fn dlq(&self) -> DeadLetterQueue<String> {
            self.dlq.clone()
        }

        /// Number of effects currently in flight.
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Read the state through a closure.
        pub async fn state<T>(&self, f: impl FnOnce(&S) -> T) -> T {
            let state = self.state.read().await;
            f(&state)
        }

        /// Send an action to the store.
        ///
        /// Acquires the write lock, reduces, then starts effect execution.
        /// The returned [`EffectHandle`] completes when every effect spawned
        /// by this send (and its cascaded feedback actions) has finished.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is
        /// shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(self: &Arc<Self>, action: A) -> Result<EffectHandle, StoreError> {
            let tracker = EffectTracker::new(Arc::clone(&self.pending_effects));
            self.dispatch(action, &tracker).await?;
            Ok(EffectHandle::new(&tracker))
        }

        /// Send an action and read the state inside the same critical
        /// section.
        ///
        /// The query closure observes the state exactly as the reduced
        /// action left it — no other command can interleave between the
        /// reduction and the read. This is the request/response primitive
        /// the engine facade uses to return typed outcomes.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is
        /// shutting down.
        pub async fn send_and_query<T>(
            self: &Arc<Self>,
            action: A,
            query: impl FnOnce(&S) -> T,
        ) -> Result<(T, EffectHandle), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(StoreError::ShutdownInProgress);
            }

            let tracker = EffectTracker::new(Arc::clone(&self.pending_effects));
            let (effects, result) = {
                let mut state = self.state.write().await;
                let effects = self.reducer.reduce(&mut state, action, &self.environment);
                let result = query(&state);
                (effects, result)
            };

            for effect in effects {
                self.spawn_effect(effect, &tracker);
            }

            Ok((result, EffectHandle::new(&tracker)))
        }

        /// Wait until no effects are in flight.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Timeout`] if effects are still running
        /// when the timeout expires.
        pub async fn settle(&self, timeout: Duration) -> Result<(), StoreError> {
            let start = std::time::Instant::now();
            loop {
                if self.pending_effects.load(Ordering::Acquire) == 0 {
                    return Ok(());
                }
                if start.elapsed() >= timeout {
                    return Err(StoreError::Timeout);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        /// Initiate graceful shutdown: reject new actions, then wait for
        /// pending effects to complete.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires
        /// with effects still running.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);
                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }
                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    return Err(StoreError::ShutdownTimeout(pending));
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        async fn dispatch(
            self: &Arc<Self>,
            action: A,
            tracker: &EffectTracker,
        ) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(StoreError::ShutdownInProgress);
            }

            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut state, action, &self.environment)
            };

            for effect in effects {
                self.spawn_effect(effect, tracker);
            }

            Ok(())
        }

        fn spawn_effect(self: &Arc<Self>, effect: Effect<A>, tracker: &EffectTracker) {
            match effect {
                Effect::None => {},
                Effect::Delay { duration, action } => {
                    let store = Arc::clone(self);
                    tokio::spawn(async move {
                        tokio::time::sleep(duration).await;
                        if store.shutdown.load(Ordering::Acquire) {
                            return;
                        }
                        let tracker = EffectTracker::new(Arc::clone(&store.pending_effects));
                        if let Err(error) = store.dispatch(*action, &tracker).await {
                            tracing::debug!(%error, "delayed action dropped");
                        }
                    });
                },
                other => {
                    tracker.register();
                    let store = Arc::clone(self);
                    let tracker = tracker.clone();
                    tokio::spawn(async move {
                        store.run_effect(other, &tracker).await;
                        tracker.complete();
                    });
                },
            }
        }

        fn run_effect_boxed<'a>(
            self: &'a Arc<Self>,
            effect: Effect<A>,
            tracker: &'a EffectTracker,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            Box::pin(self.run_effect(effect, tracker))
        }

        async fn run_effect(self: &Arc<Self>, effect: Effect<A>, tracker: &EffectTracker) {
            match effect {
                Effect::None => {},
                Effect::Parallel(effects) => {
                    for inner in effects {
                        self.spawn_effect(inner, tracker);
                    }
                },
                Effect::Sequential(effects) => {
                    for inner in effects {
                        self.run_effect_boxed(inner, tracker).await;
                    }
                },
                delay @ Effect::Delay { .. } => {
                    self.spawn_effect(delay, tracker);
                },
                Effect::Future(future) => {
                    if let Some(action) = future.await {
                        self.feed_back(action, tracker).await;
                    }
                },
                Effect::EventStore(op) => {
                    self.run_append(op, tracker).await;
                },
                Effect::Notify(op) => {
                    let recipient = op.notice.recipient.clone();
                    let kind = op.notice.kind.clone();
                    if let Err(error) = op.sink.deliver(op.notice).await {
                        tracing::warn!(%error, %recipient, %kind, "notification delivery failed");
                    }
                },
            }
        }

        async fn run_append(self: &Arc<Self>, op: EventStoreOperation<A>, tracker: &EffectTracker) {
            let EventStoreOperation::AppendEvents {
                event_store,
                stream_id,
                expected_version,
                events,
                on_success,
                on_error,
            } = op;

            let mut attempt = 1_u32;
            loop {
                match event_store
                    .append_events(stream_id.clone(), expected_version, events.clone())
                    .await
                {
                    Ok(version) => {
                        if let Some(action) = on_success(version) {
                            self.feed_back(action, tracker).await;
                        }
                        return;
                    },
                    Err(error) => {
                        if attempt >= self.retry_policy.max_attempts {
                            tracing::error!(%stream_id, %error, attempt, "event append dead-lettered");
                            self.dlq.push(
                                format!("append of {} events to {stream_id}", events.len()),
                                error.to_string(),
                                attempt,
                            );
                            if let Some(action) = on_error(error) {
                                self.feed_back(action, tracker).await;
                            }
                            return;
                        }

                        let delay = self.retry_policy.delay_for_attempt(attempt);
                        tracing::warn!(%stream_id, %error, attempt, "event append failed; retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    },
                }
            }
        }

        async fn feed_back(self: &Arc<Self>, action: A, tracker: &EffectTracker) {
            if let Err(error) = self.dispatch(action, tracker).await {
                tracing::debug!(%error, "feedback action dropped during shutdown");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::store::Store;
    use super::*;
    use smallvec::{SmallVec, smallvec};
    use std::time::Duration;
    use turnstile_core::effect::Effect;
    use turnstile_core::reducer::Reducer;

    #[derive(Clone, Debug, Default)]
    struct CounterState {
        count: i64,
        echoes: usize,
    }

    #[derive(Clone, Debug)]
    enum CounterAction {
        Increment,
        IncrementViaEffect,
        Echo,
        DelayedIncrement { after: Duration },
    }

    #[derive(Clone)]
    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = CounterState;
        type Action = CounterAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            (): &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                CounterAction::Increment => {
                    state.count += 1;
                    SmallVec::new()
                },
                CounterAction::IncrementViaEffect => {
                    smallvec![Effect::Future(Box::pin(async {
                        Some(CounterAction::Increment)
                    }))]
                },
                CounterAction::Echo => {
                    state.echoes += 1;
                    SmallVec::new()
                },
                CounterAction::DelayedIncrement { after } => {
                    smallvec![Effect::Delay {
                        duration: after,
                        action: Box::new(CounterAction::Increment),
                    }]
                },
            }
        }
    }

    fn store() -> std::sync::Arc<Store<CounterState, CounterAction, (), CounterReducer>> {
        std::sync::Arc::new(Store::new(CounterState::default(), CounterReducer, ()))
    }

    #[tokio::test]
    async fn send_reduces_synchronously() {
        let store = store();
        store.send(CounterAction::Increment).await.unwrap();
        assert_eq!(store.state(|s| s.count).await, 1);
    }

    #[tokio::test]
    async fn effect_feedback_reaches_the_reducer() {
        let store = store();
        let handle = store.send(CounterAction::IncrementViaEffect).await.unwrap();
        handle
            .wait_with_timeout(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(store.state(|s| s.count).await, 1);
    }

    #[tokio::test]
    async fn send_and_query_observes_the_reduced_state() {
        let store = store();
        let (count, _handle) = store
            .send_and_query(CounterAction::Increment, |s| s.count)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn delayed_actions_fire_after_the_delay() {
        let store = store();
        store
            .send(CounterAction::DelayedIncrement {
                after: Duration::from_millis(20),
            })
            .await
            .unwrap();

        assert_eq!(store.state(|s| s.count).await, 0);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.state(|s| s.count).await, 1);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() {
        let store = store();
        store.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(
            store.send(CounterAction::Echo).await,
            Err(StoreError::ShutdownInProgress)
        ));
    }

    #[test]
    fn dead_letter_queue_is_bounded() {
        let dlq: DeadLetterQueue<String> = DeadLetterQueue::new(2);
        dlq.push("a".into(), "err".into(), 1);
        dlq.push("b".into(), "err".into(), 1);
        dlq.push("c".into(), "err".into(), 1);

        let letters = dlq.drain();
        assert_eq!(letters.len(), 2);
        assert_eq!(letters[0].payload, "b");
        assert_eq!(letters[1].payload, "c");
        assert!(dlq.is_empty());
    }
}
