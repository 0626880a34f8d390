//! The Reducer trait — the single home for business logic.
//!
//! Reducers are pure functions: `(State, Action, Environment) → Effects`.
//! They validate commands, apply events to state in place, and return
//! descriptions of the side effects the runtime should execute. All state
//! mutation for one aggregate flows through its reducer, which is the only
//! code path permitted to flip a registration's status.

use crate::effect::Effect;
use smallvec::SmallVec;

/// The Reducer trait — core abstraction for business logic.
///
/// # Type Parameters
///
/// - `State`: the domain state this reducer operates on
/// - `Action`: the action type this reducer processes (commands + events)
/// - `Environment`: the injected dependencies this reducer needs
///
/// # Contract
///
/// `reduce` must be deterministic given `(state, action, env)` and must not
/// perform I/O directly — anything that touches the outside world is
/// returned as an [`Effect`] for the runtime to execute. Events replayed
/// from the event store pass through the same `reduce` and must produce no
/// effects, only state mutation.
pub trait Reducer {
    /// The state type this reducer operates on
    type State;

    /// The action type this reducer processes
    type Action;

    /// The environment type with injected dependencies
    type Environment;

    /// Reduce an action into state changes and effects.
    ///
    /// The small-vector capacity of 4 covers the common case (persist +
    /// notify + a delayed action) without a heap allocation; larger effect
    /// sets spill transparently.
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]>;
}
