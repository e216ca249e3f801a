//! Boundary to the backend: account listing, OAuth initiation, account
//! deletion, message listing and the job-application store.

pub mod http;

use url::Url;

use crate::domain::account::{AccountId, EmailAccount, Provider};
use crate::domain::application::{ApplicationId, ApplicationRecord, ApplicationStatus};
use crate::domain::email::Message;
use crate::error::Result;

pub use http::HttpBackend;

/// Every call takes the bearer token handed out by the credential gate.
/// Implementations must be shareable with the background account refresh.
pub trait Backend: Send + Sync {
    fn list_accounts(&self, token: &str) -> Result<Vec<EmailAccount>>;

    /// Authorization URL the popup should open.
    fn oauth_init(&self, token: &str, provider: Provider) -> Result<Url>;

    fn delete_account(&self, token: &str, id: AccountId) -> Result<()>;

    fn list_messages(
        &self,
        token: &str,
        account: AccountId,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<Message>>;

    fn list_applications(&self, token: &str) -> Result<Vec<ApplicationRecord>>;

    fn update_application_status(
        &self,
        token: &str,
        id: ApplicationId,
        status: ApplicationStatus,
    ) -> Result<()>;
}
