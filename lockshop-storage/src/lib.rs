//! Lockshop Storage - Store Traits and In-Memory Backends
//!
//! Defines the record store abstraction used by every entity service, plus
//! the counter and response-cache backends behind the rate limiter and the
//! response cache. The PostgreSQL implementations live in lockshop-api.

pub mod counter;
pub mod error;
pub mod memory;
pub mod pattern;
pub mod response_cache;
pub mod store;

pub use counter::{CounterHit, CounterStore, InMemoryCounterStore};
pub use error::{BackendError, BackendResult};
pub use memory::InMemoryStore;
pub use pattern::{glob_to_like, glob_to_regex};
pub use response_cache::{CacheBackend, CachedResponse, InMemoryCacheBackend};
pub use store::{BalanceChange, BulkAddOutcome, ShopStore, StockFilter, DEFAULT_HISTORY_LIMIT};
