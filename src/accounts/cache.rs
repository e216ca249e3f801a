use crate::domain::account::EmailAccount;
use crate::error::Result;
use crate::store::StateRepository;
use crate::store::keys::{ACCOUNTS_CACHE, ACCOUNTS_CACHE_AT};

pub const CACHE_FRESHNESS_SECS: i64 = 10 * 60;

/// Time-boxed snapshot of the connected accounts.
#[derive(Debug, Clone, Copy)]
pub struct AccountCache {
    freshness_secs: i64,
}

impl Default for AccountCache {
    fn default() -> Self {
        Self::new(CACHE_FRESHNESS_SECS)
    }
}

impl AccountCache {
    pub fn new(freshness_secs: i64) -> Self {
        Self { freshness_secs }
    }

    /// The cached accounts if the snapshot is younger than the freshness
    /// window. A corrupt blob reads as no cache.
    pub fn read(&self, repo: &dyn StateRepository, now: i64) -> Result<Option<Vec<EmailAccount>>> {
        let Some(written_at) = repo.get_i64(ACCOUNTS_CACHE_AT)? else {
            return Ok(None);
        };
        if now - written_at >= self.freshness_secs {
            log::debug!("account cache is {}s old; stale", now - written_at);
            return Ok(None);
        }
        let Some(blob) = repo.get_text(ACCOUNTS_CACHE)? else {
            return Ok(None);
        };
        match serde_json::from_str(&blob) {
            Ok(accounts) => Ok(Some(accounts)),
            Err(e) => {
                log::warn!("discarding unreadable account cache: {e}");
                Ok(None)
            }
        }
    }

    /// Blob and timestamp land in one write.
    pub fn write(&self, repo: &dyn StateRepository, accounts: &[EmailAccount], now: i64) -> Result<()> {
        let blob = serde_json::to_string(accounts)?;
        let at = now.to_string();
        repo.set_many(&[(ACCOUNTS_CACHE, blob.as_str()), (ACCOUNTS_CACHE_AT, at.as_str())])
    }

    /// Drop the snapshot, and any `also` keys with it, in one write.
    pub fn invalidate(&self, repo: &dyn StateRepository, also: &[&str]) -> Result<()> {
        let mut keys = vec![ACCOUNTS_CACHE, ACCOUNTS_CACHE_AT];
        keys.extend_from_slice(also);
        repo.remove_many(&keys)
    }
}
