pub mod cache;

pub use cache::{AccountCache, CACHE_FRESHNESS_SECS};
pub use crate::domain::account::active_account;
