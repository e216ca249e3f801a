use crate::domain::account::Provider;
use crate::connect::popup::WindowMessage;

pub const CANCELLED_MESSAGE: &str = "Email connection was cancelled.";
pub const POPUP_BLOCKED_MESSAGE: &str =
    "The authorization popup was blocked. Allow popups for this app and try again.";
pub const SIGN_IN_MESSAGE: &str = "Please sign in first.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Initiating,
    AwaitingAuthorization,
    Finalizing,
    Connected,
    Failed,
    Cancelled,
}

impl ConnectionState {
    /// An attempt is underway.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Initiating
                | ConnectionState::AwaitingAuthorization
                | ConnectionState::Finalizing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Failed | ConnectionState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectEvent {
    /// Token present; begin a new attempt.
    Start(Provider),
    /// No bearer token: the attempt never starts.
    SignInRequired,
    AuthUrlReady,
    InitFailed(String),
    PopupOpened,
    PopupBlocked,
    /// The closed-state poll is running.
    WatchStarted,
    Window(WindowMessage),
    PopupClosed,
    RefreshCompleted,
    RefreshFailed(String),
    /// An in-progress flag survived a restart.
    Interrupted,
}

/// One OAuth attempt. Popup handles stay with the driver; this is plain data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionSession {
    pub provider: Option<Provider>,
    pub state: ConnectionState,
    pub progress: u8,
    pub in_progress: bool,
    pub message: Option<String>,
}

impl ConnectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(session, event) -> session'`. Events that make no sense in the
    /// current state leave it unchanged. Progress never decreases while an
    /// attempt is active.
    pub fn transition(self, event: ConnectEvent) -> Self {
        use ConnectEvent as E;
        use ConnectionState as S;

        match (self.state, event) {
            (state, E::Start(provider)) if !state.is_active() => Self {
                provider: Some(provider),
                state: S::Initiating,
                progress: 0,
                in_progress: true,
                message: None,
            },
            (state, E::SignInRequired) if !state.is_active() => Self {
                state: S::Idle,
                progress: 0,
                in_progress: false,
                message: Some(SIGN_IN_MESSAGE.to_string()),
                ..self
            },
            (S::Initiating, E::AuthUrlReady) => self.advance(S::Initiating, 20),
            (S::Initiating, E::InitFailed(msg)) => self.fail(msg),
            (S::Initiating, E::PopupOpened) => self.advance(S::AwaitingAuthorization, 40),
            (S::Initiating, E::PopupBlocked) => self.fail(POPUP_BLOCKED_MESSAGE.to_string()),
            (S::AwaitingAuthorization, E::WatchStarted) => {
                self.advance(S::AwaitingAuthorization, 60)
            }
            (S::AwaitingAuthorization, E::Window(WindowMessage::Success)) => {
                self.advance(S::Finalizing, 80)
            }
            (S::AwaitingAuthorization, E::Window(WindowMessage::Error(msg))) => self.fail(msg),
            (S::AwaitingAuthorization, E::PopupClosed) if self.in_progress => Self {
                state: S::Cancelled,
                in_progress: false,
                message: Some(CANCELLED_MESSAGE.to_string()),
                ..self
            },
            (S::Finalizing, E::RefreshCompleted) => {
                let message = format!("{} account connected.", provider_label(self.provider));
                self.connected(message)
            }
            (S::Finalizing, E::RefreshFailed(msg)) => {
                let message = format!(
                    "{} account connected, but the account list could not be refreshed: {msg}",
                    provider_label(self.provider)
                );
                self.connected(message)
            }
            (S::Idle, E::Interrupted) => Self {
                state: S::Cancelled,
                in_progress: false,
                message: Some(CANCELLED_MESSAGE.to_string()),
                ..self
            },
            (_, _) => self,
        }
    }

    fn advance(self, state: ConnectionState, progress: u8) -> Self {
        Self {
            state,
            progress: self.progress.max(progress),
            ..self
        }
    }

    fn fail(self, message: String) -> Self {
        Self {
            state: ConnectionState::Failed,
            progress: 0,
            in_progress: false,
            message: Some(message),
            ..self
        }
    }

    fn connected(self, message: String) -> Self {
        Self {
            state: ConnectionState::Connected,
            progress: 100,
            in_progress: false,
            message: Some(message),
            ..self
        }
    }
}

fn provider_label(provider: Option<Provider>) -> &'static str {
    match provider {
        Some(Provider::Gmail) => "Gmail",
        Some(Provider::Outlook) => "Outlook",
        None => "Email",
    }
}
