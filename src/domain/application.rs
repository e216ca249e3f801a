use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

pub type ApplicationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Applied,
    Viewed,
    Interview,
    Offer,
    Rejected,
    Ghosted,
    Other,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Viewed => "viewed",
            ApplicationStatus::Interview => "interview",
            ApplicationStatus::Offer => "offer",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Ghosted => "ghosted",
            ApplicationStatus::Other => "other",
        }
    }

    /// Suggested next step for an application sitting in this status.
    pub fn next_action(&self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "Wait for a response",
            ApplicationStatus::Viewed => "Follow up if no reply within a week",
            ApplicationStatus::Interview => "Prepare for the interview",
            ApplicationStatus::Offer => "Review the offer",
            ApplicationStatus::Rejected => "Archive and move on",
            ApplicationStatus::Ghosted => "Send a polite follow-up",
            ApplicationStatus::Other => "Review the latest email",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_ascii_lowercase()))
            .map_err(|_| format!("unknown application status '{s}'"))
    }
}

/// Job application as stored by the external application service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub company: String,
    #[serde(alias = "jobTitle")]
    pub job_title: String,
    #[serde(default, alias = "jobBoard", deserialize_with = "null_as_empty")]
    pub job_board: String,
    #[serde(default, alias = "recruiterEmail")]
    pub recruiter_email: Option<String>,
    #[serde(default, alias = "dateApplied", deserialize_with = "null_as_empty")]
    pub date_applied: String,
    pub status: ApplicationStatus,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub notes: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}
