use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type AccountId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gmail,
    Outlook,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::Outlook => "outlook",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gmail" => Ok(Provider::Gmail),
            "outlook" => Ok(Provider::Outlook),
            other => Err(format!("unknown provider '{other}' (expected gmail or outlook)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAccount {
    pub id: AccountId,
    pub provider: Provider,
    #[serde(alias = "emailAddress")]
    pub email_address: String,
    #[serde(default, alias = "connectedAt")]
    pub connected_at: String,
}

/// The account fetches run against: the first Gmail account, otherwise the
/// first account of whichever single provider is connected.
pub fn active_account(accounts: &[EmailAccount]) -> Option<&EmailAccount> {
    accounts
        .iter()
        .find(|a| a.provider == Provider::Gmail)
        .or_else(|| accounts.first())
}
