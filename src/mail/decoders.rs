use chrono::DateTime;

pub const SNIPPET_MAX_CHARS: usize = 200;

/// Collapse whitespace runs and blank lines into single spaces, capped at
/// `max_chars` characters.
pub fn normalize_snippet(s: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        if out.chars().count() >= max_chars {
            break;
        }
    }
    out.chars().take(max_chars).collect()
}

/// Parse a provider date: RFC 2822 header value, RFC 3339 timestamp or a
/// plain epoch (seconds, or milliseconds when it is too large for seconds).
pub fn parse_date(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Some(epoch_from_number(n));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    mailparse::dateparse(raw).ok()
}

pub fn epoch_from_number(n: i64) -> i64 {
    // anything past year ~5138 in seconds is a millisecond stamp
    if n > 100_000_000_000 { n / 1000 } else { n }
}

/// Render an HTML body as plain text; other bodies pass through untouched.
pub fn body_to_text(body: &str) -> String {
    if !looks_like_html(body) {
        return body.to_string();
    }
    match html2text::from_read(body.as_bytes(), 100) {
        Ok(text) => text,
        Err(e) => {
            log::debug!("html2text failed ({e}); stripping tags");
            strip_html_minimal(body)
        }
    }
}

fn looks_like_html(s: &str) -> bool {
    let lower = s.trim_start().to_ascii_lowercase();
    lower.starts_with("<!doctype html")
        || lower.starts_with("<html")
        || ["<div", "<p>", "<br", "<table", "<body"]
            .iter()
            .any(|tag| lower.contains(tag))
}

fn strip_html_minimal(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}
