use notify_rust::{Hint, Notification, Timeout};
use std::time::Duration;

/// How long a success toast stays up.
pub const TOAST_SECS: i64 = 5;

/// Desktop-level toast.
pub trait Toaster {
    fn toast(&self, summary: &str, body: &str, ttl: Duration);
}

pub struct DesktopToaster;

impl Toaster for DesktopToaster {
    fn toast(&self, summary: &str, body: &str, ttl: Duration) {
        let mut n = Notification::new();
        n.summary(summary)
            .body(body)
            .hint(Hint::Category("email".to_string()))
            .timeout(Timeout::Milliseconds(ttl.as_millis() as u32));

        // a missing notification daemon must not fail the flow
        if let Err(e) = n.show() {
            log::warn!("Notification error: {e}");
        }
    }
}

/// Writes toasts to the log only.
pub struct LogToaster;

impl Toaster for LogToaster {
    fn toast(&self, summary: &str, body: &str, _ttl: Duration) {
        log::info!("{summary}: {body}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Info,
    Error,
}

/// User-visible status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    shown_at: i64,
    /// `None` keeps the notice up until replaced.
    ttl_secs: Option<i64>,
}

#[derive(Debug, Default)]
pub struct StatusBoard {
    current: Option<Notice>,
}

impl StatusBoard {
    pub fn show(&mut self, kind: NoticeKind, text: impl Into<String>, now: i64) {
        self.current = Some(Notice {
            kind,
            text: text.into(),
            shown_at: now,
            ttl_secs: None,
        });
    }

    pub fn flash(&mut self, kind: NoticeKind, text: impl Into<String>, now: i64, ttl_secs: i64) {
        self.current = Some(Notice {
            kind,
            text: text.into(),
            shown_at: now,
            ttl_secs: Some(ttl_secs),
        });
    }

    pub fn visible(&self, now: i64) -> Option<&Notice> {
        self.current.as_ref().filter(|n| match n.ttl_secs {
            Some(ttl) => now - n.shown_at < ttl,
            None => true,
        })
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
