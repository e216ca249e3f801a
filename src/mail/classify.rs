//! Deterministic keyword classifier for job-search mail.
//!
//! Groups are checked in a fixed order and the first group with any hit
//! wins: interview, offer, rejection, follow-up, application. A rejection
//! letter that mentions the "interview process" therefore lands on
//! interview; that ordering is part of the contract.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::email::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Application,
    Interview,
    Offer,
    Rejection,
    FollowUp,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Application => "application",
            Category::Interview => "interview",
            Category::Offer => "offer",
            Category::Rejection => "rejection",
            Category::FollowUp => "follow_up",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

pub const INTERVIEW_KEYWORDS: &[&str] = &["interview", "schedule", "meeting", "call"];
pub const OFFER_KEYWORDS: &[&str] = &[
    "offer",
    "congratulations",
    "pleased to",
    "excited to offer",
];
pub const REJECTION_KEYWORDS: &[&str] = &[
    "reject",
    "unfortunately",
    "not selected",
    "moving forward with other",
];
pub const FOLLOW_UP_KEYWORDS: &[&str] = &["follow", "update", "checking in"];
pub const APPLICATION_KEYWORDS: &[&str] = &[
    "application",
    "received",
    "reviewing",
    "thank you for applying",
];

/// Precedence order, highest first.
const RULES: &[(Category, &[&str])] = &[
    (Category::Interview, INTERVIEW_KEYWORDS),
    (Category::Offer, OFFER_KEYWORDS),
    (Category::Rejection, REJECTION_KEYWORDS),
    (Category::FollowUp, FOLLOW_UP_KEYWORDS),
    (Category::Application, APPLICATION_KEYWORDS),
];

pub fn classify(subject: &str, body_or_snippet: &str) -> Category {
    let text = format!(
        "{} {}",
        subject.to_lowercase(),
        body_or_snippet.to_lowercase()
    );
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

pub fn classify_message(message: &Message) -> Category {
    classify(&message.subject, message.text())
}
