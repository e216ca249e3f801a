use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, mpsc};

use url::Url;

use super::*;
use crate::auth::MemoryCredentials;
use crate::clock::ManualClock;
use crate::connect::{PopupHandle, PopupWindow};
use crate::connect::session::{CANCELLED_MESSAGE, SIGN_IN_MESSAGE};
use crate::domain::application::ApplicationRecord;
use crate::store::MemoryRepo;
use crate::store::keys::{ACCOUNTS_CACHE, ACCOUNTS_CACHE_AT};

const NOW: i64 = 1_790_000_000;

#[derive(Default)]
struct FakeBackend {
    accounts: Mutex<Vec<EmailAccount>>,
    oauth: Mutex<Option<Result<Url>>>,
    messages: Mutex<Vec<Message>>,
    applications: Mutex<Vec<ApplicationRecord>>,
    patched: Mutex<Vec<(ApplicationId, ApplicationStatus)>>,
    fail_accounts: AtomicBool,
    fail_messages: AtomicBool,
    fail_delete: AtomicBool,
    unauthorized: AtomicBool,
    account_calls: AtomicUsize,
    oauth_calls: AtomicUsize,
    /// When set, the next account listing waits for a release signal.
    account_gate: Mutex<Option<mpsc::Receiver<()>>>,
}

fn gmail(id: AccountId) -> EmailAccount {
    EmailAccount {
        id,
        provider: Provider::Gmail,
        email_address: format!("me{id}@gmail.com"),
        connected_at: "2026-10-19T09:00:00Z".into(),
    }
}

fn msg(id: &str, date: i64, sender: &str, subject: &str) -> Message {
    Message {
        id: id.into(),
        sender: sender.into(),
        subject: subject.into(),
        date_epoch: date,
        snippet: String::new(),
        body: None,
        is_read: false,
    }
}

impl FakeBackend {
    fn with_oauth_url() -> Arc<Self> {
        let b = FakeBackend::default();
        *b.oauth.lock().unwrap() = Some(Ok(Url::parse("https://accounts.example.com/auth").unwrap()));
        Arc::new(b)
    }

    fn check_auth(&self) -> Result<()> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(TrackerError::AuthExpired);
        }
        Ok(())
    }
}

impl Backend for FakeBackend {
    fn list_accounts(&self, _token: &str) -> Result<Vec<EmailAccount>> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.account_gate.lock().unwrap().take();
        if let Some(release) = gate {
            let _ = release.recv();
        }
        self.check_auth()?;
        if self.fail_accounts.load(Ordering::SeqCst) {
            return Err(TrackerError::Api {
                status: 503,
                message: String::new(),
            });
        }
        Ok(self.accounts.lock().unwrap().clone())
    }

    fn oauth_init(&self, _token: &str, _provider: Provider) -> Result<Url> {
        self.oauth_calls.fetch_add(1, Ordering::SeqCst);
        match self.oauth.lock().unwrap().take() {
            Some(r) => r,
            None => Err(TrackerError::InvalidPayload("authorization URL missing".into())),
        }
    }

    fn delete_account(&self, _token: &str, id: AccountId) -> Result<()> {
        self.check_auth()?;
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(TrackerError::Provider("Account is locked".into()));
        }
        self.accounts.lock().unwrap().retain(|a| a.id != id);
        Ok(())
    }

    fn list_messages(&self, _token: &str, _account: AccountId, _query: &str, max: u32) -> Result<Vec<Message>> {
        self.check_auth()?;
        if self.fail_messages.load(Ordering::SeqCst) {
            return Err(TrackerError::Api {
                status: 500,
                message: "provider down".into(),
            });
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .take(max as usize)
            .cloned()
            .collect())
    }

    fn list_applications(&self, _token: &str) -> Result<Vec<ApplicationRecord>> {
        self.check_auth()?;
        Ok(self.applications.lock().unwrap().clone())
    }

    fn update_application_status(&self, _token: &str, id: ApplicationId, status: ApplicationStatus) -> Result<()> {
        self.check_auth()?;
        self.patched.lock().unwrap().push((id, status));
        Ok(())
    }
}

enum Script {
    /// Server finishes OAuth (account appears) and the popup posts success.
    Success,
    PostError(&'static str),
    Close,
    Blocked,
}

struct ClosedAfter(bool);

impl PopupWindow for ClosedAfter {
    fn is_closed(&self) -> bool {
        self.0
    }
}

struct ScriptedLauncher {
    script: Script,
    backend: Arc<FakeBackend>,
    opened: Vec<(Url, PopupFeatures)>,
}

impl ScriptedLauncher {
    fn new(script: Script, backend: &Arc<FakeBackend>) -> Self {
        Self {
            script,
            backend: Arc::clone(backend),
            opened: Vec::new(),
        }
    }
}

impl PopupLauncher for ScriptedLauncher {
    fn open(&mut self, url: &Url, features: &PopupFeatures) -> Option<PopupHandle> {
        let (tx, rx) = mpsc::channel();
        let closed = match self.script {
            Script::Blocked => return None,
            Script::Success => {
                self.backend.accounts.lock().unwrap().push(gmail(1));
                tx.send(r#"{"type":"gmail_oauth_success"}"#.to_string()).unwrap();
                false
            }
            Script::PostError(err) => {
                tx.send(format!(r#"{{"type":"gmail_oauth_error","error":"{err}"}}"#))
                    .unwrap();
                false
            }
            Script::Close => true,
        };
        self.opened.push((url.clone(), *features));
        Some(PopupHandle {
            window: Box::new(ClosedAfter(closed)),
            messages: rx,
        })
    }
}

#[derive(Clone, Default)]
struct RecordingToaster(Rc<RefCell<Vec<String>>>);

impl Toaster for RecordingToaster {
    fn toast(&self, _summary: &str, body: &str, ttl: Duration) {
        assert_eq!(ttl, Duration::from_secs(5));
        self.0.borrow_mut().push(body.to_string());
    }
}

struct Harness {
    svc: TrackerService,
    backend: Arc<FakeBackend>,
    repo: Rc<MemoryRepo>,
    clock: Rc<ManualClock>,
    toasts: RecordingToaster,
}

fn harness_with(token: Option<&str>, backend: Arc<FakeBackend>, repo: Rc<MemoryRepo>) -> Harness {
    let clock = Rc::new(ManualClock::new(NOW));
    let toasts = RecordingToaster::default();
    let options = ServiceOptions {
        poll_interval: Duration::from_millis(5),
        ..ServiceOptions::default()
    };
    let svc = TrackerService::new(
        CredentialGate::new(Box::new(MemoryCredentials::new(token))),
        backend.clone(),
        Box::new(repo.clone()),
        Box::new(clock.clone()),
        Box::new(toasts.clone()),
        options,
    )
    .unwrap();
    Harness {
        svc,
        backend,
        repo,
        clock,
        toasts,
    }
}

fn harness(backend: Arc<FakeBackend>) -> Harness {
    harness_with(Some("tok"), backend, Rc::new(MemoryRepo::new()))
}

// ----- connect -----

#[test]
fn connect_success_refreshes_accounts() {
    let backend = FakeBackend::with_oauth_url();
    let mut h = harness(backend.clone());
    let mut launcher = ScriptedLauncher::new(Script::Success, &backend);

    let s = h.svc.connect(Provider::Gmail, &mut launcher).clone();

    assert_eq!(s.state, ConnectionState::Connected);
    assert_eq!(s.progress, 100);
    assert!(!s.in_progress);
    assert_eq!(h.svc.accounts(), &[gmail(1)]);
    assert_eq!(h.repo.get_text(OAUTH_IN_PROGRESS).unwrap(), None);
    assert_eq!(h.svc.connected_at(), Some(NOW));
    assert!(h.repo.get_text(ACCOUNTS_CACHE).unwrap().is_some());

    let (_, features) = &launcher.opened[0];
    assert_eq!((features.width, features.height), (500, 600));
    assert_eq!((features.left, features.top), (390, 100));

    assert_eq!(h.toasts.0.borrow().as_slice(), ["Gmail account connected."]);
    assert!(h.svc.notice().is_some());
    h.clock.advance(5);
    assert!(h.svc.notice().is_none());
}

#[test]
fn connect_without_token_never_calls_backend() {
    let backend = FakeBackend::with_oauth_url();
    let mut h = harness_with(None, backend.clone(), Rc::new(MemoryRepo::new()));
    let mut launcher = ScriptedLauncher::new(Script::Success, &backend);

    let s = h.svc.connect(Provider::Gmail, &mut launcher).clone();

    assert_eq!(s.state, ConnectionState::Idle);
    assert_eq!(s.message.as_deref(), Some(SIGN_IN_MESSAGE));
    assert_eq!(backend.oauth_calls.load(Ordering::SeqCst), 0);
    assert!(launcher.opened.is_empty());
    assert_eq!(h.repo.get_text(OAUTH_IN_PROGRESS).unwrap(), None);
}

#[test]
fn connect_init_error_is_shown_verbatim() {
    let backend = Arc::new(FakeBackend::default());
    *backend.oauth.lock().unwrap() = Some(Err(TrackerError::Provider("Gmail OAuth is not configured".into())));
    let mut h = harness(backend.clone());
    let mut launcher = ScriptedLauncher::new(Script::Success, &backend);

    let s = h.svc.connect(Provider::Gmail, &mut launcher).clone();

    assert_eq!(s.state, ConnectionState::Failed);
    assert_eq!(s.message.as_deref(), Some("Gmail OAuth is not configured"));
    assert_eq!(h.repo.get_text(OAUTH_IN_PROGRESS).unwrap(), None);
    assert!(launcher.opened.is_empty());
    assert_eq!(
        h.svc.notice().map(|n| n.kind),
        Some(NoticeKind::Error)
    );
}

#[test]
fn blocked_popup_fails_and_clears_flag() {
    let backend = FakeBackend::with_oauth_url();
    let mut h = harness(backend.clone());
    let mut launcher = ScriptedLauncher::new(Script::Blocked, &backend);

    let s = h.svc.connect(Provider::Gmail, &mut launcher).clone();

    assert_eq!(s.state, ConnectionState::Failed);
    assert!(s.message.unwrap().contains("popup"));
    assert_eq!(h.repo.get_text(OAUTH_IN_PROGRESS).unwrap(), None);
}

#[test]
fn closing_popup_cancels() {
    let backend = FakeBackend::with_oauth_url();
    let mut h = harness(backend.clone());
    let mut launcher = ScriptedLauncher::new(Script::Close, &backend);

    let s = h.svc.connect(Provider::Gmail, &mut launcher).clone();

    assert_eq!(s.state, ConnectionState::Cancelled);
    assert_eq!(s.message.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(h.svc.accounts().is_empty());
    assert_eq!(h.repo.get_text(OAUTH_IN_PROGRESS).unwrap(), None);
    assert!(h.toasts.0.borrow().is_empty());
}

#[test]
fn popup_error_message_fails() {
    let backend = FakeBackend::with_oauth_url();
    let mut h = harness(backend.clone());
    let mut launcher = ScriptedLauncher::new(Script::PostError("access_denied"), &backend);

    let s = h.svc.connect(Provider::Gmail, &mut launcher).clone();

    assert_eq!((s.state, s.progress), (ConnectionState::Failed, 0));
    assert_eq!(s.message.as_deref(), Some("access_denied"));
}

#[test]
fn reconnect_after_failure_starts_fresh() {
    let backend = FakeBackend::with_oauth_url();
    let mut h = harness(backend.clone());
    let mut blocked = ScriptedLauncher::new(Script::Blocked, &backend);
    h.svc.connect(Provider::Gmail, &mut blocked);

    *backend.oauth.lock().unwrap() = Some(Ok(Url::parse("https://accounts.example.com/again").unwrap()));
    let mut ok = ScriptedLauncher::new(Script::Success, &backend);
    assert_eq!(
        h.svc.connect(Provider::Gmail, &mut ok).state,
        ConnectionState::Connected
    );
}

#[test]
fn leftover_in_progress_flag_reports_cancelled() {
    let repo = Rc::new(MemoryRepo::new());
    repo.set_text(OAUTH_IN_PROGRESS, "1").unwrap();
    let h = harness_with(Some("tok"), Arc::new(FakeBackend::default()), repo);

    assert_eq!(h.svc.session().state, ConnectionState::Cancelled);
    assert_eq!(h.repo.get_text(OAUTH_IN_PROGRESS).unwrap(), None);
    assert_eq!(
        h.svc.notice().map(|n| n.text.as_str()),
        Some(CANCELLED_MESSAGE)
    );
}

// ----- accounts -----

#[test]
fn fresh_cache_is_shown_then_replaced_in_background() {
    let backend = Arc::new(FakeBackend::default());
    backend.accounts.lock().unwrap().push(gmail(2));
    let repo = Rc::new(MemoryRepo::new());
    AccountCache::default().write(repo.as_ref(), &[gmail(1)], NOW - 60).unwrap();
    let mut h = harness_with(Some("tok"), backend, repo);

    assert_eq!(h.svc.load_accounts(), &[gmail(1)]);
    assert!(h.svc.refresh_pending());

    h.svc.wait_account_refresh();
    assert_eq!(h.svc.accounts(), &[gmail(2)]);
    assert!(!h.svc.refresh_pending());
    assert_eq!(
        AccountCache::default().read(h.repo.as_ref(), NOW).unwrap(),
        Some(vec![gmail(2)])
    );
}

#[test]
fn poll_applies_background_refresh_only_once_it_lands() {
    let backend = Arc::new(FakeBackend::default());
    backend.accounts.lock().unwrap().push(gmail(2));
    let (release, gate) = mpsc::channel();
    *backend.account_gate.lock().unwrap() = Some(gate);
    let repo = Rc::new(MemoryRepo::new());
    AccountCache::default().write(repo.as_ref(), &[gmail(1)], NOW - 60).unwrap();
    let mut h = harness_with(Some("tok"), backend, repo);

    assert!(!h.svc.poll_account_refresh());
    h.svc.load_accounts();

    // still in flight
    assert!(!h.svc.poll_account_refresh());
    assert!(h.svc.refresh_pending());
    assert_eq!(h.svc.accounts(), &[gmail(1)]);

    release.send(()).unwrap();
    let mut applied = false;
    for _ in 0..400 {
        if h.svc.poll_account_refresh() {
            applied = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(applied);
    assert!(!h.svc.refresh_pending());
    assert_eq!(h.svc.accounts(), &[gmail(2)]);
    assert_eq!(
        AccountCache::default().read(h.repo.as_ref(), NOW).unwrap(),
        Some(vec![gmail(2)])
    );
    assert!(!h.svc.poll_account_refresh());
}

#[test]
fn fetch_picks_up_finished_background_refresh() {
    let backend = Arc::new(FakeBackend::default());
    backend.accounts.lock().unwrap().push(gmail(5));
    backend.messages.lock().unwrap().push(msg("m", 1, "x@acme.com", "hi"));
    let repo = Rc::new(MemoryRepo::new());
    AccountCache::default().write(repo.as_ref(), &[gmail(1)], NOW - 60).unwrap();
    let mut h = harness_with(Some("tok"), backend.clone(), repo);

    h.svc.load_accounts();
    // let the refresh thread finish before fetching
    while backend.account_calls.load(Ordering::SeqCst) == 0 {
        std::thread::sleep(Duration::from_millis(2));
    }
    std::thread::sleep(Duration::from_millis(50));

    h.svc.fetch_emails(&SearchQuery::default(), None).unwrap();
    assert!(!h.svc.refresh_pending());
    assert_eq!(h.svc.active_account().map(|a| a.id), Some(5));
}

#[test]
fn failed_background_refresh_keeps_stale_list() {
    let backend = Arc::new(FakeBackend::default());
    backend.fail_accounts.store(true, Ordering::SeqCst);
    let repo = Rc::new(MemoryRepo::new());
    AccountCache::default().write(repo.as_ref(), &[gmail(1)], NOW).unwrap();
    let mut h = harness_with(Some("tok"), backend, repo);

    h.svc.load_accounts();
    h.svc.wait_account_refresh();
    assert_eq!(h.svc.accounts(), &[gmail(1)]);
    assert_eq!(h.svc.account_error(), None);
}

#[test]
fn stale_cache_loads_in_foreground() {
    let backend = Arc::new(FakeBackend::default());
    backend.accounts.lock().unwrap().push(gmail(3));
    let repo = Rc::new(MemoryRepo::new());
    AccountCache::default().write(repo.as_ref(), &[gmail(1)], NOW - 11 * 60).unwrap();
    let mut h = harness_with(Some("tok"), backend.clone(), repo);

    assert_eq!(h.svc.load_accounts(), &[gmail(3)]);
    assert!(!h.svc.refresh_pending());
    assert_eq!(backend.account_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn foreground_failure_sets_error() {
    let backend = Arc::new(FakeBackend::default());
    backend.fail_accounts.store(true, Ordering::SeqCst);
    let mut h = harness(backend);

    assert!(h.svc.load_accounts().is_empty());
    assert!(h.svc.account_error().unwrap().contains("503"));
}

#[test]
fn expired_token_is_dropped() {
    let backend = Arc::new(FakeBackend::default());
    backend.unauthorized.store(true, Ordering::SeqCst);
    let mut h = harness(backend);

    assert!(matches!(h.svc.refresh_accounts(), Err(TrackerError::AuthExpired)));
    assert!(matches!(h.svc.refresh_accounts(), Err(TrackerError::AuthRequired)));
}

#[test]
fn disconnect_invalidates_and_repulls() {
    let backend = Arc::new(FakeBackend::default());
    backend.accounts.lock().unwrap().extend([gmail(1), gmail(2)]);
    let mut h = harness(backend);
    h.svc.refresh_accounts().unwrap();
    h.repo.set_i64(CONNECTED_AT, NOW).unwrap();

    h.svc.disconnect(1).unwrap();

    assert_eq!(h.svc.accounts(), &[gmail(2)]);
    assert_eq!(h.svc.connected_at(), None);
    // re-pulled list was cached again
    assert!(h.repo.get_text(ACCOUNTS_CACHE_AT).unwrap().is_some());
}

#[test]
fn disconnect_drops_account_even_if_repull_fails() {
    let backend = Arc::new(FakeBackend::default());
    backend.accounts.lock().unwrap().extend([gmail(1), gmail(2)]);
    let mut h = harness(backend.clone());
    h.svc.refresh_accounts().unwrap();
    h.repo.set_i64(CONNECTED_AT, NOW).unwrap();
    backend.fail_accounts.store(true, Ordering::SeqCst);

    h.svc.disconnect(1).unwrap();

    assert_eq!(h.svc.accounts(), &[gmail(2)]);
    assert_eq!(h.repo.get_text(ACCOUNTS_CACHE).unwrap(), None);
    assert_eq!(h.repo.get_text(ACCOUNTS_CACHE_AT).unwrap(), None);
    assert_eq!(h.svc.connected_at(), None);
}

#[test]
fn failed_disconnect_keeps_account() {
    let backend = Arc::new(FakeBackend::default());
    backend.accounts.lock().unwrap().push(gmail(1));
    backend.fail_delete.store(true, Ordering::SeqCst);
    let mut h = harness(backend);
    h.svc.refresh_accounts().unwrap();

    assert!(h.svc.disconnect(1).is_err());
    assert_eq!(h.svc.accounts(), &[gmail(1)]);
    assert_eq!(
        h.svc.notice().map(|n| n.text.as_str()),
        Some("Account is locked")
    );
    assert!(h.repo.get_text(ACCOUNTS_CACHE).unwrap().is_some());
}

// ----- fetch -----

#[test]
fn fetch_without_account_fails_untouched() {
    let backend = Arc::new(FakeBackend::default());
    backend.messages.lock().unwrap().push(msg("1", 1, "a@b.c", "x"));
    let mut h = harness(backend);

    assert!(matches!(
        h.svc.fetch_emails(&SearchQuery::default(), None),
        Err(TrackerError::NoAccountConnected)
    ));
    assert!(h.svc.messages().is_empty());
    assert_eq!(h.svc.session().state, ConnectionState::Idle);
}

#[test]
fn fetch_twice_is_idempotent_and_errors_keep_data() {
    let backend = Arc::new(FakeBackend::default());
    backend.accounts.lock().unwrap().push(gmail(1));
    backend.messages.lock().unwrap().extend([
        msg("a", 10, "x@acme.com", "one"),
        msg("b", 30, "x@acme.com", "two"),
        msg("c", 20, "x@acme.com", "three"),
    ]);
    let mut h = harness(backend.clone());
    h.svc.refresh_accounts().unwrap();

    let first: Vec<Message> = h.svc.fetch_emails(&SearchQuery::default(), None).unwrap().to_vec();
    let second: Vec<Message> = h.svc.fetch_emails(&SearchQuery::default(), None).unwrap().to_vec();
    assert_eq!(first, second);
    let ids: Vec<&str> = second.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c", "a"]);

    backend.fail_messages.store(true, Ordering::SeqCst);
    assert!(h.svc.fetch_emails(&SearchQuery::default(), None).is_err());
    assert_eq!(h.svc.messages(), second.as_slice());
}

#[test]
fn max_results_caps_the_page() {
    let backend = Arc::new(FakeBackend::default());
    backend.accounts.lock().unwrap().push(gmail(1));
    backend.messages.lock().unwrap().extend((0..30).map(|i| msg(&i.to_string(), i, "x@y.z", "s")));
    let mut h = harness(backend);
    h.svc.refresh_accounts().unwrap();

    assert_eq!(h.svc.fetch_emails(&SearchQuery::default(), None).unwrap().len(), 20);
    assert_eq!(h.svc.fetch_emails(&SearchQuery::default(), Some(25)).unwrap().len(), 25);
}

// ----- applications -----

#[test]
fn progress_and_explicit_sync() {
    let backend = Arc::new(FakeBackend::default());
    backend.accounts.lock().unwrap().push(gmail(1));
    backend.messages.lock().unwrap().push(msg("m1", 100, "talent@globex.com", "Interview availability"));
    backend.applications.lock().unwrap().push(ApplicationRecord {
        id: 9,
        company: "Globex".into(),
        job_title: "Data Engineer".into(),
        job_board: String::new(),
        recruiter_email: None,
        date_applied: "2026-09-30".into(),
        status: ApplicationStatus::Applied,
        notes: String::new(),
    });
    let mut h = harness(backend.clone());
    h.svc.refresh_accounts().unwrap();
    h.svc.fetch_emails(&SearchQuery::default(), None).unwrap();

    let scored = h.svc.application_progress().unwrap();
    assert_eq!(scored[0].progress_score, 70);
    assert_eq!(scored[0].display_status, ApplicationStatus::Interview);
    // scoring alone never writes back
    assert!(backend.patched.lock().unwrap().is_empty());

    assert_eq!(h.svc.sync_derived_statuses(&scored).unwrap(), 1);
    assert_eq!(
        backend.patched.lock().unwrap().as_slice(),
        &[(9, ApplicationStatus::Interview)]
    );
}
