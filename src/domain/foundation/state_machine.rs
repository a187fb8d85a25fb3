//! State machine trait for mode enums.
//!
//! Gives every small lifecycle enum (backend mode, etc.) the same
//! validated `transition_to` entry point.

use super::ValidationError;

/// Trait for enums that represent state machines.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for BackendMode {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         matches!((self, target), (Distributed, Degraded) | (Degraded, Distributed))
///     }
/// }
///
/// let next = BackendMode::Distributed.transition_to(BackendMode::Degraded)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }
}
