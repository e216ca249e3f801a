use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mail::decoders::{SNIPPET_MAX_CHARS, body_to_text, epoch_from_number, normalize_snippet, parse_date};

pub type MessageId = String;

/// A provider message after ingestion. Immutable once fetched; `id` is its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub subject: String,
    /// Epoch seconds; 0 when the provider date could not be parsed.
    pub date_epoch: i64,
    pub snippet: String,
    pub body: Option<String>,
    pub is_read: bool,
}

impl Message {
    /// Body if present, otherwise the snippet.
    pub fn text(&self) -> &str {
        match &self.body {
            Some(b) if !b.trim().is_empty() => b,
            _ => &self.snippet,
        }
    }
}

/// Message as it arrives from the email-listing endpoint. Every field is
/// loose here; `into_message` is the only way in.
#[derive(Debug, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    id: Value,
    #[serde(default, alias = "from")]
    sender: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    date: Value,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default, alias = "isRead")]
    is_read: Option<bool>,
}

impl RawMessage {
    pub fn into_message(self) -> Result<Message, String> {
        let id = match self.id {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            other => return Err(format!("message without usable id ({other})")),
        };

        let date_epoch = match &self.date {
            Value::String(s) => parse_date(s),
            Value::Number(n) => n.as_i64().map(epoch_from_number),
            _ => None,
        }
        .unwrap_or_else(|| {
            log::debug!("message {id}: unparseable date {}, using 0", self.date);
            0
        });

        let subject = self
            .subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "(no subject)".to_string());
        let sender = self
            .sender
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "(unknown)".to_string());

        let body = self
            .body
            .filter(|b| !b.trim().is_empty())
            .map(|b| body_to_text(&b));
        let snippet = match self.snippet.filter(|s| !s.trim().is_empty()) {
            Some(s) => normalize_snippet(&s, SNIPPET_MAX_CHARS),
            None => body
                .as_deref()
                .map(|b| normalize_snippet(b, SNIPPET_MAX_CHARS))
                .unwrap_or_default(),
        };

        Ok(Message {
            id,
            sender,
            subject,
            date_epoch,
            snippet,
            body,
            is_read: self.is_read.unwrap_or(false),
        })
    }
}
