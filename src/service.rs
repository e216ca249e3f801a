//! `TrackerService`: the one object that owns client-side state (account
//! cache, connection session, message collection, status line). Consumers
//! get it passed in; nothing here is global.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use crate::accounts::{AccountCache, CACHE_FRESHNESS_SECS, active_account};
use crate::api::Backend;
use crate::auth::CredentialGate;
use crate::clock::Clock;
use crate::connect::{
    ConnectEvent, ConnectionSession, ConnectionState, PopupFeatures, PopupLauncher,
    WindowGeometry, await_popup,
};
use crate::connect::popup::POLL_INTERVAL;
use crate::correlate::{ScoredApplication, correlate, pending_status_updates};
use crate::domain::account::{AccountId, EmailAccount, Provider};
use crate::domain::application::{ApplicationId, ApplicationStatus};
use crate::domain::email::Message;
use crate::error::{Result, TrackerError};
use crate::mail::fetch::{DEFAULT_MAX_RESULTS, Mailbox};
use crate::mail::query::SearchQuery;
use crate::notifier::{Notice, NoticeKind, StatusBoard, TOAST_SECS, Toaster};
use crate::store::StateRepository;
use crate::store::keys::{CONNECTED_AT, OAUTH_IN_PROGRESS};

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub max_results: u32,
    pub cache_freshness_secs: i64,
    /// Interval of the popup closed-state poll.
    pub poll_interval: Duration,
    pub parent_window: WindowGeometry,
    pub popup_width: u32,
    pub popup_height: u32,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            cache_freshness_secs: CACHE_FRESHNESS_SECS,
            poll_interval: POLL_INTERVAL,
            parent_window: WindowGeometry::default(),
            popup_width: 500,
            popup_height: 600,
        }
    }
}

type RefreshResult = Result<Vec<EmailAccount>>;

pub struct TrackerService {
    gate: CredentialGate,
    backend: Arc<dyn Backend>,
    repo: Box<dyn StateRepository>,
    clock: Box<dyn Clock>,
    toaster: Box<dyn Toaster>,
    options: ServiceOptions,

    cache: AccountCache,
    accounts: Vec<EmailAccount>,
    account_error: Option<String>,
    pending_refresh: Option<Receiver<RefreshResult>>,

    session: ConnectionSession,
    status: StatusBoard,
    mailbox: Mailbox,
}

impl TrackerService {
    pub fn new(
        gate: CredentialGate,
        backend: Arc<dyn Backend>,
        repo: Box<dyn StateRepository>,
        clock: Box<dyn Clock>,
        toaster: Box<dyn Toaster>,
        options: ServiceOptions,
    ) -> Result<Self> {
        let mut svc = Self {
            gate,
            backend,
            repo,
            clock,
            toaster,
            cache: AccountCache::new(options.cache_freshness_secs),
            options,
            accounts: Vec::new(),
            account_error: None,
            pending_refresh: None,
            session: ConnectionSession::new(),
            status: StatusBoard::default(),
            mailbox: Mailbox::new(),
        };
        svc.recover_interrupted_attempt()?;
        Ok(svc)
    }

    /// A set in-progress flag at startup means the previous process died
    /// while a popup was open.
    fn recover_interrupted_attempt(&mut self) -> Result<()> {
        if self.repo.get_text(OAUTH_IN_PROGRESS)?.is_some() {
            log::info!("previous connection attempt was abandoned");
            self.repo.remove(OAUTH_IN_PROGRESS)?;
            self.apply(ConnectEvent::Interrupted);
            self.publish_session();
        }
        Ok(())
    }

    // ----- Accounts -----

    pub fn accounts(&self) -> &[EmailAccount] {
        &self.accounts
    }

    pub fn account_error(&self) -> Option<&str> {
        self.account_error.as_deref()
    }

    pub fn active_account(&self) -> Option<&EmailAccount> {
        active_account(&self.accounts)
    }

    /// Startup load: a fresh cache is shown right away and refreshed in the
    /// background; without one the list is pulled in the foreground and a
    /// failure is recorded in `account_error`.
    pub fn load_accounts(&mut self) -> &[EmailAccount] {
        let now = self.clock.now_epoch();
        match self.cache.read(self.repo.as_ref(), now) {
            Ok(Some(cached)) => {
                log::debug!("using {} cached accounts", cached.len());
                self.accounts = cached;
                self.spawn_background_refresh();
            }
            Ok(None) => {
                let _ = self.refresh_accounts();
            }
            Err(e) => {
                log::warn!("account cache unreadable: {e}");
                let _ = self.refresh_accounts();
            }
        }
        &self.accounts
    }

    /// Foreground pull of the account list; replaces the cache on success.
    pub fn refresh_accounts(&mut self) -> Result<&[EmailAccount]> {
        let fetched = self
            .gate
            .require()
            .and_then(|token| self.gate.observe(self.backend.list_accounts(&token)));
        match fetched {
            Ok(list) => {
                self.store_accounts(list);
                Ok(&self.accounts)
            }
            Err(e) => {
                self.account_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    fn store_accounts(&mut self, list: Vec<EmailAccount>) {
        let now = self.clock.now_epoch();
        if let Err(e) = self.cache.write(self.repo.as_ref(), &list, now) {
            log::warn!("could not write account cache: {e}");
        }
        self.accounts = list;
        self.account_error = None;
    }

    fn spawn_background_refresh(&mut self) {
        let token = match self.gate.require() {
            Ok(t) => t,
            Err(_) => {
                log::debug!("no token; skipping background account refresh");
                return;
            }
        };
        let backend = Arc::clone(&self.backend);
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(backend.list_accounts(&token));
        });
        self.pending_refresh = Some(rx);
    }

    pub fn refresh_pending(&self) -> bool {
        self.pending_refresh.is_some()
    }

    /// Apply a finished background refresh, if any. Returns true when one
    /// was applied.
    pub fn poll_account_refresh(&mut self) -> bool {
        let Some(rx) = &self.pending_refresh else {
            return false;
        };
        match rx.try_recv() {
            Ok(result) => {
                self.pending_refresh = None;
                self.apply_background_refresh(result);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.pending_refresh = None;
                false
            }
        }
    }

    /// Block until the background refresh (if any) lands.
    pub fn wait_account_refresh(&mut self) {
        if let Some(rx) = self.pending_refresh.take()
            && let Ok(result) = rx.recv()
        {
            self.apply_background_refresh(result);
        }
    }

    /// Success silently replaces the cached list; failure keeps it.
    fn apply_background_refresh(&mut self, result: RefreshResult) {
        match self.gate.observe(result) {
            Ok(list) => self.store_accounts(list),
            Err(e) => log::warn!("background account refresh failed: {e}"),
        }
    }

    // ----- Connection -----

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    fn apply(&mut self, event: ConnectEvent) {
        let before = self.session.state;
        let session = std::mem::take(&mut self.session);
        self.session = session.transition(event);
        log::debug!(
            "connection {:?} -> {:?} ({}%)",
            before,
            self.session.state,
            self.session.progress
        );
    }

    fn set_in_progress_flag(&self, on: bool) {
        let result = if on {
            self.repo.set_text(OAUTH_IN_PROGRESS, "1")
        } else {
            self.repo.remove(OAUTH_IN_PROGRESS)
        };
        if let Err(e) = result {
            log::warn!("could not update in-progress flag: {e}");
        }
    }

    /// Mirror the session's message onto the status line.
    fn publish_session(&mut self) {
        let now = self.clock.now_epoch();
        let Some(text) = self.session.message.clone() else {
            return;
        };
        match self.session.state {
            ConnectionState::Connected => {
                self.status.flash(NoticeKind::Success, text.as_str(), now, TOAST_SECS);
                self.toaster.toast(
                    "Email connected",
                    &text,
                    Duration::from_secs(TOAST_SECS as u64),
                );
            }
            ConnectionState::Cancelled => self.status.show(NoticeKind::Info, text, now),
            _ => self.status.show(NoticeKind::Error, text, now),
        }
    }

    /// Run one OAuth handshake to a terminal state. Never returns an error:
    /// the outcome is the session's state and message.
    pub fn connect(
        &mut self,
        provider: Provider,
        launcher: &mut dyn PopupLauncher,
    ) -> &ConnectionSession {
        if self.session.state.is_active() {
            log::warn!("connect requested while an attempt is running");
            return &self.session;
        }

        let token = match self.gate.require() {
            Ok(t) => t,
            Err(_) => {
                self.apply(ConnectEvent::SignInRequired);
                self.publish_session();
                return &self.session;
            }
        };

        self.apply(ConnectEvent::Start(provider));
        self.set_in_progress_flag(true);
        self.status.clear();

        let url = match self.gate.observe(self.backend.oauth_init(&token, provider)) {
            Ok(url) => url,
            Err(e) => {
                log::info!("oauth-init failed: {e}");
                return self.finish(ConnectEvent::InitFailed(e.user_message()));
            }
        };
        self.apply(ConnectEvent::AuthUrlReady);

        let features = PopupFeatures::centered(
            self.options.parent_window,
            self.options.popup_width,
            self.options.popup_height,
        );
        let Some(mut popup) = launcher.open(&url, &features) else {
            return self.finish(ConnectEvent::PopupBlocked);
        };
        self.apply(ConnectEvent::PopupOpened);
        self.apply(ConnectEvent::WatchStarted);

        let outcome = await_popup(&popup, self.options.poll_interval);
        popup.window.close();
        drop(popup);
        self.apply(outcome);

        if self.session.state == ConnectionState::Finalizing {
            let event = match self.refresh_accounts() {
                Ok(_) => ConnectEvent::RefreshCompleted,
                Err(e) => ConnectEvent::RefreshFailed(e.user_message()),
            };
            let now = self.clock.now_epoch();
            if let Err(e) = self.repo.set_i64(CONNECTED_AT, now) {
                log::warn!("could not record connection time: {e}");
            }
            return self.finish(event);
        }
        self.finish_terminal()
    }

    fn finish(&mut self, event: ConnectEvent) -> &ConnectionSession {
        self.apply(event);
        self.finish_terminal()
    }

    fn finish_terminal(&mut self) -> &ConnectionSession {
        if !self.session.in_progress {
            self.set_in_progress_flag(false);
        }
        log::info!(
            "connection attempt ended: {:?} {}",
            self.session.state,
            self.session.message.as_deref().unwrap_or("")
        );
        self.publish_session();
        &self.session
    }

    /// Delete the account server-side. Only a confirmed deletion touches
    /// local state: the account leaves the in-memory list, cache and
    /// connection marker are dropped together, and the list is re-pulled.
    pub fn disconnect(&mut self, id: AccountId) -> Result<()> {
        let now = self.clock.now_epoch();
        let deleted = self
            .gate
            .require()
            .and_then(|token| self.gate.observe(self.backend.delete_account(&token, id)));
        if let Err(e) = deleted {
            self.status.show(NoticeKind::Error, e.user_message(), now);
            return Err(e);
        }

        log::info!("disconnected email account {id}");
        self.accounts.retain(|a| a.id != id);
        self.cache.invalidate(self.repo.as_ref(), &[CONNECTED_AT])?;
        if let Err(e) = self.refresh_accounts() {
            log::warn!("account list refresh after disconnect failed: {e}");
        }
        self.status.flash(NoticeKind::Success, "Email account disconnected.", now, TOAST_SECS);
        Ok(())
    }

    pub fn connected_at(&self) -> Option<i64> {
        self.repo.get_i64(CONNECTED_AT).ok().flatten()
    }

    // ----- Messages -----

    pub fn messages(&self) -> &[Message] {
        self.mailbox.messages()
    }

    /// Fetch one page for the active account and merge it into the
    /// collection. Errors leave the collection as it was.
    pub fn fetch_emails(&mut self, query: &SearchQuery, max_results: Option<u32>) -> Result<&[Message]> {
        // a landed background refresh may change the active account
        self.poll_account_refresh();
        let Some(account) = self.active_account().cloned() else {
            return Err(TrackerError::NoAccountConnected);
        };
        let max = max_results.unwrap_or(self.options.max_results);
        let outcome = self.gate.require().and_then(|token| {
            self.mailbox
                .fetch(self.backend.as_ref(), &token, Some(&account), query, max)
                .map(|m| m.len())
        });
        match self.gate.observe(outcome) {
            Ok(_) => Ok(self.mailbox.messages()),
            Err(e) => {
                let now = self.clock.now_epoch();
                self.status.show(NoticeKind::Error, e.user_message(), now);
                Err(e)
            }
        }
    }

    // ----- Applications -----

    /// Score every tracked application against the current collection.
    pub fn application_progress(&self) -> Result<Vec<ScoredApplication>> {
        let token = self.gate.require()?;
        let apps = self.gate.observe(self.backend.list_applications(&token))?;
        Ok(correlate(&apps, self.mailbox.messages()))
    }

    /// Push one status change to the application store.
    pub fn update_application_status(&self, id: ApplicationId, status: ApplicationStatus) -> Result<()> {
        let token = self.gate.require()?;
        self.gate
            .observe(self.backend.update_application_status(&token, id, status))
    }

    /// Write back every derived status that differs from the stored one.
    /// Returns how many records were updated.
    pub fn sync_derived_statuses(&self, scored: &[ScoredApplication]) -> Result<usize> {
        let updates = pending_status_updates(scored);
        for (id, status) in &updates {
            self.update_application_status(*id, *status)?;
            log::info!("application {id} -> {status}");
        }
        Ok(updates.len())
    }

    // ----- Status line -----

    pub fn notice(&self) -> Option<&Notice> {
        self.status.visible(self.clock.now_epoch())
    }
}

#[cfg(test)]
mod tests;
