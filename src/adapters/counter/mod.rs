//! Counter backend adapters.
//!
//! Implementations of the CounterBackend port.
//!
//! ## Available Adapters
//!
//! - `RedisCounter` - Redis sorted sets, shared by every instance
//! - `LocalCounter` - in-memory, per instance (fallback and tests)
//! - `DegradationSupervisor` - routes to Redis, falls back to local
//!
//! ## Usage
//!
//! ```ignore
//! use gatekeeper::adapters::counter::{
//!     DegradationSupervisor, LocalCounter, RedisCounter, SupervisorConfig,
//! };
//!
//! let redis = Arc::new(RedisCounter::new("redis://localhost:6379", Duration::from_millis(50))?);
//! let supervisor = DegradationSupervisor::new(redis, Arc::new(LocalCounter::new()), SupervisorConfig::default());
//! ```

mod in_memory;
mod redis;
mod supervisor;

pub use in_memory::LocalCounter;
pub use redis::RedisCounter;
pub use supervisor::{DegradationSupervisor, SupervisorConfig, SupervisorMetrics};
