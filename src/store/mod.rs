pub mod memory;
pub mod repo;
pub mod sqlite;

pub use memory::MemoryRepo;
pub use repo::StateRepository;
pub use sqlite::SqliteRepo;

/// Persisted keys.
pub mod keys {
    pub const ACCOUNTS_CACHE: &str = "email_accounts_cache";
    pub const ACCOUNTS_CACHE_AT: &str = "email_accounts_cache_at";
    pub const OAUTH_IN_PROGRESS: &str = "email_oauth_in_progress";
    pub const CONNECTED_AT: &str = "email_connected_at";
}
