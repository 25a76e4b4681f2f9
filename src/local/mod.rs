//! In-process storage provider.
//!
//! [`MemoryStore`] keeps histories inside the current process using a
//! [`DashMap`](dashmap::DashMap), with per-entry expiry checked on access.
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** Safe for concurrent use across multiple threads
//! - **No external service:** No network or database required
//! - **Atomic evaluation:** Implements [`AtomicRateLimitStore`](crate::AtomicRateLimitStore)
//! - **Process-scoped:** State is not shared across processes
//!
//! # When to Use
//!
//! - Single-process deployments
//! - Tests and local development
//!
//! Several application instances that must share limits need a shared store such as
//! the Redis provider.

mod memory_store;
pub use memory_store::*;
