use std::collections::HashMap;

use crate::api::Backend;
use crate::domain::account::EmailAccount;
use crate::domain::email::{Message, MessageId};
use crate::error::{Result, TrackerError};
use crate::mail::query::SearchQuery;

pub const DEFAULT_MAX_RESULTS: u32 = 20;

/// In-memory message collection: a set keyed by id, ordered newest first.
#[derive(Debug, Default)]
pub struct Mailbox {
    by_id: HashMap<MessageId, Message>,
    ordered: Vec<Message>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Union `incoming` into the collection; for an id seen before the
    /// incoming copy replaces the stored one. The whole collection is then
    /// re-sorted by date descending (id ascending on equal dates).
    pub fn merge(&mut self, incoming: Vec<Message>) {
        for m in incoming {
            self.by_id.insert(m.id.clone(), m);
        }
        let mut ordered: Vec<Message> = self.by_id.values().cloned().collect();
        ordered.sort_by(|a, b| b.date_epoch.cmp(&a.date_epoch).then_with(|| a.id.cmp(&b.id)));
        self.ordered = ordered;
    }

    /// Pull one page for `account` and merge it. On error the collection is
    /// left exactly as it was.
    pub fn fetch(
        &mut self,
        backend: &dyn Backend,
        token: &str,
        account: Option<&EmailAccount>,
        query: &SearchQuery,
        max_results: u32,
    ) -> Result<&[Message]> {
        let account = account.ok_or(TrackerError::NoAccountConnected)?;
        let q = query.to_provider_query();
        log::debug!(
            "fetching up to {max_results} messages for {} (query={q:?})",
            account.email_address
        );
        let page = backend.list_messages(token, account.id, &q, max_results)?;
        log::info!("fetched {} messages", page.len());
        self.merge(page);
        Ok(self.messages())
    }
}
