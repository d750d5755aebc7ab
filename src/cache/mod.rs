//! Query-result cache for expensive catalog reads.
//!
//! Two cooperating halves:
//!
//! - **Read-through store**: [`ListStore::get_or_compute`] returns a cached
//!   ordered id list or computes, stores and tags it. Entries carry a TTL
//!   and hold identifiers only; hydration always goes back to the
//!   repository.
//! - **Write-side invalidation**: mutations publish [`EventKind`] values
//!   into an epoch-ordered queue; the consumer merges a batch into an
//!   [`InvalidationPlan`] and drops every entry whose registered kind tags
//!   intersect the touched kinds.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `plaudit.toml`:
//!
//! ```toml
//! [cache]
//! enable_list_cache = true
//! list_limit = 256
//! search_ttl_secs = 300
//! # ... see config.rs for all options
//! ```

mod config;
mod consumer;
mod events;
mod keys;
mod lock;
mod planner;
mod registry;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use consumer::CacheConsumer;
pub use events::{CacheEvent, Epoch, EventKind, EventQueue};
pub use keys::{CacheKey, hash_search_key, hash_value, normalize_query};
pub use planner::InvalidationPlan;
pub use registry::CacheRegistry;
pub use store::{CachedIdList, ListStore};
pub use trigger::CacheTrigger;
