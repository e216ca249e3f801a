use serde_json::Value;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use url::Url;

use crate::connect::session::ConnectEvent;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Completion signal posted by the popup to its opener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowMessage {
    Success,
    Error(String),
}

const SUCCESS_TAGS: &[&str] = &["gmail_oauth_success", "outlook_oauth_success", "oauth_success"];
const ERROR_TAGS: &[&str] = &["gmail_oauth_error", "outlook_oauth_error", "oauth_error"];

impl WindowMessage {
    /// Recognize a posted payload. Anything that is not JSON with a known
    /// `type` tag yields `None` and is meant to be ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let tag = value.get("type")?.as_str()?;
        if SUCCESS_TAGS.contains(&tag) {
            return Some(WindowMessage::Success);
        }
        if ERROR_TAGS.contains(&tag) {
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .unwrap_or("Authorization failed.");
            return Some(WindowMessage::Error(error.to_string()));
        }
        None
    }
}

/// Position of the window the popup is centered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self {
            left: 0,
            top: 0,
            width: 1280,
            height: 800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupFeatures {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
}

impl PopupFeatures {
    /// A `width` x `height` popup centered on `parent`, never placed left of
    /// or above the parent's origin.
    pub fn centered(parent: WindowGeometry, width: u32, height: u32) -> Self {
        let left = parent.left + (parent.width as i32 - width as i32) / 2;
        let top = parent.top + (parent.height as i32 - height as i32) / 2;
        Self {
            width,
            height,
            left: left.max(parent.left),
            top: top.max(parent.top),
        }
    }

    pub fn to_feature_string(&self) -> String {
        format!(
            "width={},height={},left={},top={},scrollbars=yes",
            self.width, self.height, self.left, self.top
        )
    }
}

/// An open popup as seen from the opener: only its closed state is visible.
pub trait PopupWindow {
    fn is_closed(&self) -> bool;
    fn close(&mut self) {}
}

/// A popup plus the listener for messages it posts back. Dropping the
/// handle removes the listener.
pub struct PopupHandle {
    pub window: Box<dyn PopupWindow>,
    pub messages: Receiver<String>,
}

pub trait PopupLauncher {
    /// `None` means the popup could not be opened (blocked).
    fn open(&mut self, url: &Url, features: &PopupFeatures) -> Option<PopupHandle>;
}

/// Block until the popup posts a recognized message or is found closed.
/// The closed state is checked every `interval`; the popup's contents are
/// never inspected. Messages are handled in arrival order.
pub fn await_popup(handle: &PopupHandle, interval: Duration) -> ConnectEvent {
    loop {
        match handle.messages.recv_timeout(interval) {
            Ok(raw) => match WindowMessage::parse(&raw) {
                Some(msg) => return ConnectEvent::Window(msg),
                None => {
                    log::debug!("ignoring unrecognized popup message");
                    continue;
                }
            },
            Err(RecvTimeoutError::Timeout) => {}
            // listener gone; only the closed poll is left to wait on
            Err(RecvTimeoutError::Disconnected) => thread::sleep(interval),
        }
        if handle.window.is_closed() {
            // a message may have landed right before the close
            if let Some(msg) = handle.messages.try_iter().find_map(|raw| WindowMessage::parse(&raw)) {
                return ConnectEvent::Window(msg);
            }
            return ConnectEvent::PopupClosed;
        }
    }
}
