//! Joins classified messages to job applications and scores their progress.
//!
//! Matching is loose (company in sender or subject, job title
//! in subject, recruiter address in sender). Derived statuses are display
//! overlays; stored records only change through an explicit status update.

use serde::Serialize;

use crate::domain::application::{ApplicationId, ApplicationRecord, ApplicationStatus};
use crate::domain::email::Message;
use crate::mail::classify::{Category, classify_message};

/// Score for an application no message could be matched to ("just applied").
pub const NO_SIGNAL_SCORE: u8 = 15;

pub const FOLLOW_UP_ACTION: &str = "Continue dialogue";

pub fn category_weight(category: Category) -> u8 {
    match category {
        Category::Application => 20,
        Category::FollowUp => 40,
        Category::Interview => 70,
        Category::Offer => 95,
        Category::Rejection => 0,
        Category::Other => 10,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub category: Category,
    pub date_epoch: i64,
    pub subject: String,
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredApplication {
    pub record: ApplicationRecord,
    /// Status to display: derived from the newest matched message when
    /// there is one, otherwise the stored status.
    pub display_status: ApplicationStatus,
    /// Newest first.
    pub email_categories: Vec<TimelineEntry>,
    pub progress_score: u8,
    pub next_action: String,
}

impl ScoredApplication {
    pub fn status_changed(&self) -> bool {
        self.display_status != self.record.status
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Does `message` belong to `app`? Empty company, title or recruiter
/// fields never match.
pub fn matches(app: &ApplicationRecord, message: &Message) -> bool {
    contains_ci(&message.sender, &app.company)
        || contains_ci(&message.subject, &app.company)
        || contains_ci(&message.subject, &app.job_title)
        || app
            .recruiter_email
            .as_deref()
            .is_some_and(|r| contains_ci(&message.sender, r))
}

/// Highest weight among `categories`; `NO_SIGNAL_SCORE` when empty.
pub fn progress_score<'a>(categories: impl IntoIterator<Item = &'a Category>) -> u8 {
    categories
        .into_iter()
        .map(|c| category_weight(*c))
        .max()
        .unwrap_or(NO_SIGNAL_SCORE)
}

/// Status and next action implied by the most recent category.
pub fn derive_status(latest: Category, current: ApplicationStatus) -> (ApplicationStatus, String) {
    let status = match latest {
        Category::Interview => ApplicationStatus::Interview,
        Category::Offer => ApplicationStatus::Offer,
        Category::Rejection => ApplicationStatus::Rejected,
        Category::Application => ApplicationStatus::Viewed,
        Category::FollowUp => return (current, FOLLOW_UP_ACTION.to_string()),
        Category::Other => current,
    };
    (status, status.next_action().to_string())
}

pub fn score_application(app: &ApplicationRecord, messages: &[Message]) -> ScoredApplication {
    let mut timeline: Vec<TimelineEntry> = messages
        .iter()
        .filter(|m| matches(app, m))
        .map(|m| TimelineEntry {
            category: classify_message(m),
            date_epoch: m.date_epoch,
            subject: m.subject.clone(),
            sender: m.sender.clone(),
        })
        .collect();
    // stable: equal dates keep input order
    timeline.sort_by(|a, b| b.date_epoch.cmp(&a.date_epoch));

    let progress_score = progress_score(timeline.iter().map(|e| &e.category));
    let (display_status, next_action) = match timeline.first() {
        Some(latest) => derive_status(latest.category, app.status),
        None => (app.status, app.status.next_action().to_string()),
    };

    ScoredApplication {
        record: app.clone(),
        display_status,
        email_categories: timeline,
        progress_score,
        next_action,
    }
}

pub fn correlate(applications: &[ApplicationRecord], messages: &[Message]) -> Vec<ScoredApplication> {
    applications
        .iter()
        .map(|app| score_application(app, messages))
        .collect()
}

/// Applications whose derived status differs from the stored one.
pub fn pending_status_updates(scored: &[ScoredApplication]) -> Vec<(ApplicationId, ApplicationStatus)> {
    scored
        .iter()
        .filter(|s| s.status_changed())
        .map(|s| (s.record.id, s.display_status))
        .collect()
}
