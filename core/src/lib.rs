//! # Cognito Auth Core
//!
//! Core traits and types for the Cognito authentication state machine.
//!
//! This crate provides the fundamental abstractions shared by the runtime and
//! the auth domain crate:
//!
//! - **State**: a pure value describing the current configuration of a machine
//! - **Event**: all possible inputs to a reducer (caller requests, service
//!   responses, failure notifications)
//! - **Reducer**: pure function `(State, Event, Environment) → (State, Effects)`
//! - **Effect**: side effect descriptions (not execution)
//! - **Environment**: injected dependencies via traits
//!
//! ## Architecture Principles
//!
//! - Functional core, imperative shell: reducers never perform I/O
//! - Unidirectional data flow: effects feed their results back as new events
//! - Explicit effects: everything the runtime executes is a value first
//! - Dependency injection via the environment (clock included — expiry logic
//!   never reads the wall clock directly)

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - the core trait for transition logic
///
/// Reducers are pure functions: `(State, Event, Environment) → (State, Effects)`.
/// They contain the whole transition table of a machine and are deterministic
/// and testable in isolation.
pub mod reducer {
    use super::effect::Effects;

    /// The Reducer trait - core abstraction for transition logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: the machine state this reducer operates on
    /// - `Event`: the event vocabulary this reducer processes
    /// - `Environment`: the injected dependencies effects may capture
    ///
    /// # Contract
    ///
    /// `reduce` must be total over `(State, Event)`: every pairing resolves to
    /// a next state (possibly the unchanged one) and a list of effects. A
    /// reducer never performs I/O and never panics; failures travel through
    /// the state's `Error` variants or through failure events produced by
    /// effect execution.
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The event type this reducer processes
        type Event;

        /// The environment type with injected dependencies
        type Environment;

        /// Resolve an event against the current state.
        ///
        /// Updates `state` in place and returns effect descriptions for the
        /// runtime to execute. Returning an empty list (or only
        /// [`Effect::None`](super::effect::Effect::None)) with an unchanged
        /// state marks the event as ignored for this state.
        fn reduce(
            &self,
            state: &mut Self::State,
            event: Self::Event,
            env: &Self::Environment,
        ) -> Effects<Self::Event>;
    }
}

/// Effect module - side effect descriptions
///
/// Effects describe side effects to be performed by the runtime. They are
/// values (not execution) and are composable: parallel, sequential, delayed.
pub mod effect {
    use smallvec::SmallVec;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// The effect list returned by a reducer.
    ///
    /// Most transitions produce zero or one effect; four slots keep the
    /// common case off the heap.
    pub type Effects<Event> = SmallVec<[Effect<Event>; 4]>;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed when constructed. They are descriptions of
    /// what should happen, returned from reducers and executed by the Store
    /// runtime. A future-bearing effect optionally resolves to a follow-up
    /// event, which the runtime feeds back through the same serialized
    /// dispatch path.
    #[allow(missing_docs)]
    pub enum Effect<Event> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Event>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Event>>),

        /// Delayed event (for timeouts, caller-driven retries)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Event to dispatch after the delay
            event: Box<Event>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Event>` - if `Some`, the event is fed back into
        /// the reducer. Exactly one resolution per future: it completes once,
        /// with either a follow-up event or nothing.
        Future(Pin<Box<dyn Future<Output = Option<Event>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Event> std::fmt::Debug for Effect<Event>
    where
        Event: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, event } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("event", event)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Event> Effect<Event> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Event>>) -> Effect<Event> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Event>>) -> Effect<Event> {
            Effect::Sequential(effects)
        }

        /// Whether this effect (recursively) performs any work at all.
        #[must_use]
        pub fn is_noop(&self) -> bool {
            match self {
                Effect::None => true,
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.iter().all(Effect::is_noop)
                },
                Effect::Delay { .. } | Effect::Future(_) => false,
            }
        }
    }
}

/// Environment module - dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected via
/// the environment parameter of the reducer. Only the clock lives here; the
/// service-specific collaborators (network clients, credential storage) are
/// defined next to the domain that consumes them.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Every expiration comparison in the system goes through an injected
    /// `Clock`; production wires [`SystemClock`], tests wire a fixed or
    /// advanceable clock for deterministic boundary checks.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Current time as whole seconds since the Unix epoch.
        fn epoch_seconds(&self) -> i64 {
            self.now().timestamp()
        }
    }

    /// Production clock backed by the system time source.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, SystemClock};

    #[test]
    fn merge_builds_parallel_effect() {
        let effect: Effect<()> = Effect::merge(vec![Effect::None, Effect::None]);
        assert!(matches!(effect, Effect::Parallel(ref inner) if inner.len() == 2));
        assert!(effect.is_noop());
    }

    #[test]
    fn chain_builds_sequential_effect() {
        let effect: Effect<()> = Effect::chain(vec![Effect::None]);
        assert!(matches!(effect, Effect::Sequential(_)));
    }

    #[test]
    fn future_effect_is_not_noop() {
        let effect: Effect<u8> = Effect::Future(Box::pin(async { None }));
        assert!(!effect.is_noop());
        assert_eq!(format!("{effect:?}"), "Effect::Future(<future>)");
    }

    #[test]
    fn system_clock_reports_epoch_seconds() {
        let clock = SystemClock;
        assert_eq!(clock.epoch_seconds(), clock.now().timestamp());
    }
}
