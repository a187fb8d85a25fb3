//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers and error types shared by the
//! admission-control domain.

mod auth;
mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use auth::AuthenticatedUser;
pub use errors::ValidationError;
pub use ids::UserId;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
