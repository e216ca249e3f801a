use chrono::NaiveDate;

/// Filters for a provider search. Rendered in a fixed order so the same
/// filters always produce the same query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
    pub has_attachment: bool,
    pub unread_only: bool,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Free text, `after:`, `before:`, `has:attachment`, `is:unread`, each
    /// only when requested, joined by single spaces.
    pub fn to_provider_query(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            parts.push(text.to_string());
        }
        if let Some(d) = self.after {
            parts.push(format!("after:{}", d.format("%Y/%m/%d")));
        }
        if let Some(d) = self.before {
            parts.push(format!("before:{}", d.format("%Y/%m/%d")));
        }
        if self.has_attachment {
            parts.push("has:attachment".to_string());
        }
        if self.unread_only {
            parts.push("is:unread".to_string());
        }
        parts.join(" ")
    }
}
