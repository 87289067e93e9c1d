//! # Cognito Auth Runtime
//!
//! Runtime implementation for the Cognito authentication state machine.
//!
//! This crate provides the [`Store`] that coordinates reducer execution and
//! effect handling:
//!
//! - **Serialized dispatch**: no two events are resolved concurrently against
//!   the same state snapshot; the reducer runs behind a write lock
//! - **Commit-then-effect**: the committed state is published to subscribers
//!   before any effect of that transition starts executing
//! - **State publisher**: a `tokio::sync::watch` channel with current-value +
//!   updates semantics (late subscribers always see the latest state)
//! - **Dispatch notices**: every processed event is broadcast together with
//!   its outcome, so callers can observe events that resolved to a no-op
//!   instead of waiting forever on a result that will never come
//! - **Effect feedback loop**: effects run on spawned tasks and re-enter the
//!   store through the same serialized `send` path
//!
//! ## Example
//!
//! ```ignore
//! let store = Store::new(initial_state, reducer, environment);
//!
//! let handle = store.send(Event::Configure).await?;
//! let state = store
//!     .wait_for(|s| s.is_configured(), Duration::from_secs(5))
//!     .await?;
//! ```

use cognito_auth_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, watch};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new events
        ///
        /// This error is returned when `send()` is called after shutdown
        /// initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a matching state
        ///
        /// Returned by `wait_for` / `send_and_wait_for` when the timeout
        /// expires before a committed state matches the predicate. The
        /// underlying machine continues unaffected; the timeout is a
        /// caller-local concern.
        #[error("Timeout waiting for a matching state")]
        Timeout,

        /// State channel closed
        ///
        /// The state watch channel was closed, typically because the store
        /// was dropped while a caller was still waiting.
        #[error("State channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Outcome of dispatching a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The event produced a state transition, an effect, or both.
    Committed,

    /// The event was a no-op for the current state: no transition, no work.
    ///
    /// Out-of-order events (a challenge answer arriving while nothing waits
    /// for one, a refresh request while a refresh is already underway) land
    /// here rather than erroring the whole machine.
    NoTransition,
}

/// A processed event paired with its dispatch outcome.
///
/// Broadcast to observers after every `send`, whether or not the event
/// changed anything. Request/response callers use the state watch channel
/// instead; this channel exists for diagnostics and for detecting ignored
/// events.
#[derive(Debug, Clone)]
pub struct DispatchNotice<Event> {
    /// The event as it was dispatched.
    pub event: Event,

    /// Whether the event produced any transition or work.
    pub outcome: DispatchOutcome,
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects of one
/// dispatch to complete. Each bridged effect resolves exactly once; the
/// counter reaching zero is the completion signal.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Event::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Event::Start are now complete
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a new effect handle together with its tracking side.
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: tx,
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    ///
    /// Useful for initialization in loops where you need a `last_handle`.
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Wait for all effects of this dispatch to complete.
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            let _ = self.completion.changed().await;
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all
    /// effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: effect tracking context passed through effect execution
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

impl Clone for EffectTracking {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
            notifier: self.notifier.clone(),
        }
    }
}

/// Internal: RAII guard that decrements the effect counter on drop
///
/// Ensures the counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store module - the runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DecrementGuard, DispatchNotice,
        DispatchOutcome, Duration, Effect, EffectHandle, EffectTracking, Ordering, Reducer,
        RwLock, StoreError, broadcast, watch,
    };

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store owns the single mutable machine state and guarantees:
    ///
    /// 1. Transitions are serialized (write lock around the pure reducer)
    /// 2. Committed states are published before their effects execute
    /// 3. Effect results re-enter through the same serialized path
    ///
    /// # Type Parameters
    ///
    /// - `S`: state type (`Clone + PartialEq`, published by value)
    /// - `A`: event type
    /// - `E`: environment type
    /// - `R`: reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Event = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        /// Publishes every committed state. Current-value + updates semantics:
        /// a late subscriber sees the latest state, not the full history.
        state_watch: watch::Sender<S>,
        /// Per-event dispatch notices, including the ignored-event signal.
        notices: broadcast::Sender<DispatchNotice<A>>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Event = A, Environment = E> + Clone + Send + Sync + 'static,
        S: Clone + PartialEq + Send + Sync + 'static,
        A: Clone + Send + std::fmt::Debug + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            let (state_watch, _) = watch::channel(initial_state.clone());
            let (notices, _) = broadcast::channel(64);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                state_watch,
                notices,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Send an event to the store
        ///
        /// This is the only way state changes:
        ///
        /// 1. Acquires the write lock on state (serializing all transitions)
        /// 2. Calls the reducer with `(state, event, environment)`
        /// 3. Publishes the committed state to subscribers, still inside the
        ///    critical section, so observers see every intermediate state
        ///    before its effect runs
        /// 4. Executes returned effects on spawned tasks; their results come
        ///    back as new events through this same path
        ///
        /// Events from one caller are applied in submission order; across
        /// callers the lock imposes some consistent total order with no
        /// fairness guarantee.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is
        /// shutting down.
        #[tracing::instrument(skip(self, event), name = "store_send")]
        pub async fn send(&self, event: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected event: store is shutting down");
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.events.total").increment(1);

            let (handle, tracking) = EffectHandle::new();

            let (effects, transitioned) = {
                let mut state = self.state.write().await;
                let before = state.clone();

                let start = std::time::Instant::now();
                let effects = self
                    .reducer
                    .reduce(&mut state, event.clone(), &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                let transitioned = *state != before;
                if transitioned {
                    // Commit-then-effect: publish before any effect starts.
                    self.state_watch.send_replace(state.clone());
                }

                (effects, transitioned)
            };

            let worked = transitioned || effects.iter().any(|e| !e.is_noop());
            let outcome = if worked {
                DispatchOutcome::Committed
            } else {
                metrics::counter!("store.events.ignored").increment(1);
                tracing::warn!(?event, "event resolved to a no-op in the current state");
                DispatchOutcome::NoTransition
            };
            let _ = self.notices.send(DispatchNotice { event, outcome });

            for effect in effects {
                self.execute_effect(effect, tracking.clone());
            }

            Ok(handle)
        }

        /// Subscribe to committed states.
        ///
        /// The receiver holds the latest committed state at all times;
        /// `changed()` wakes on every commit after the last read. Rapid
        /// successive commits may coalesce — this is a current-value channel,
        /// not a lossless log.
        #[must_use]
        pub fn subscribe(&self) -> watch::Receiver<S> {
            self.state_watch.subscribe()
        }

        /// Subscribe to per-event dispatch notices.
        ///
        /// Every processed event is delivered with its [`DispatchOutcome`],
        /// including events that resolved to a no-op.
        #[must_use]
        pub fn subscribe_notices(&self) -> broadcast::Receiver<DispatchNotice<A>> {
            self.notices.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let signed_in = store.state(|s| s.is_signed_in()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Wait for the first state committed after this call that matches
        /// the predicate.
        ///
        /// The state present at subscription time is deliberately skipped, so
        /// a caller never resolves against a stale terminal state left over
        /// from a previous flow.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`] if no matching state is committed in time
        /// - [`StoreError::ChannelClosed`] if the store was dropped
        pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> Result<S, StoreError>
        where
            F: Fn(&S) -> bool,
        {
            let mut rx = self.state_watch.subscribe();
            rx.borrow_and_update();
            Self::wait_on(&mut rx, predicate, timeout).await
        }

        /// Submit an event, then wait for the first subsequent committed
        /// state matching the predicate.
        ///
        /// Subscribes (and marks the current state as seen) before sending,
        /// so the resulting transition cannot be missed.
        ///
        /// # Errors
        ///
        /// - [`StoreError::ShutdownInProgress`] if the store is shutting down
        /// - [`StoreError::Timeout`] if no matching state is committed in time
        /// - [`StoreError::ChannelClosed`] if the store was dropped
        pub async fn send_and_wait_for<F>(
            &self,
            event: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<S, StoreError>
        where
            F: Fn(&S) -> bool,
        {
            let mut rx = self.state_watch.subscribe();
            rx.borrow_and_update();

            self.send(event).await?;

            Self::wait_on(&mut rx, predicate, timeout).await
        }

        async fn wait_on<F>(
            rx: &mut watch::Receiver<S>,
            predicate: F,
            timeout: Duration,
        ) -> Result<S, StoreError>
        where
            F: Fn(&S) -> bool,
        {
            tokio::time::timeout(timeout, async {
                loop {
                    rx.changed()
                        .await
                        .map_err(|_| StoreError::ChannelClosed)?;
                    let snapshot = rx.borrow_and_update().clone();
                    if predicate(&snapshot) {
                        return Ok(snapshot);
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Sets the shutdown flag (rejecting new events), then waits for
        /// pending effects to complete.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires
        /// before all pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(100);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Shutdown timeout with effects still running"
                    );
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Execute an effect with tracking
        ///
        /// Effects run outside the serialized critical section and may be
        /// concurrent with each other and with new submissions. Each spawned
        /// task carries a [`DecrementGuard`] so the counter is updated even
        /// if the effect panics.
        fn execute_effect(&self, effect: Effect<A>, tracking: EffectTracking) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    tracking.increment();

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

                    let tracking_clone = tracking.clone();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking_clone);
                        let _pending_guard = pending_guard;

                        if let Some(event) = fut.await {
                            tracing::trace!("effect produced a follow-up event");
                            let _ = store.send(event).await;
                        }
                    });
                },
                Effect::Delay { duration, event } => {
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    tracking.increment();

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

                    let tracking_clone = tracking.clone();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking_clone);
                        let _pending_guard = pending_guard;

                        tokio::time::sleep(duration).await;
                        let _ = store.send(*event).await;
                    });
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect, tracking.clone());
                    }
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential")
                        .increment(1);
                    tracking.increment();

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

                    let tracking_clone = tracking.clone();
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking_clone);
                        let _pending_guard = pending_guard;

                        for effect in effects {
                            let (sub_tx, mut sub_rx) = watch::channel(());
                            let sub_tracking = EffectTracking {
                                counter: Arc::new(AtomicUsize::new(0)),
                                notifier: sub_tx,
                            };

                            store.execute_effect(effect, sub_tracking.clone());

                            // Wait for this effect to finish before the next
                            while sub_tracking.counter.load(Ordering::SeqCst) > 0 {
                                if sub_rx.changed().await.is_err() {
                                    break;
                                }
                            }
                        }
                    });
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Event = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                state_watch: self.state_watch.clone(),
                notices: self.notices.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;
