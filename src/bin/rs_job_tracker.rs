use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rs_job_tracker::api::HttpBackend;
use rs_job_tracker::auth::{CredentialGate, KeyringCredentials, token_store};
use rs_job_tracker::clock::SystemClock;
use rs_job_tracker::config::{Config, load_config, resolve_db_path};
use rs_job_tracker::connect::{BrowserLauncher, ConnectionState, WindowGeometry};
use rs_job_tracker::domain::account::Provider;
use rs_job_tracker::mail::query::SearchQuery;
use rs_job_tracker::notifier::DesktopToaster;
use rs_job_tracker::service::{ServiceOptions, TrackerService};
use rs_job_tracker::store::SqliteRepo;

#[derive(Parser)]
#[command(name = "rs_job_tracker")]
#[command(about = "Track job applications from your inbox", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store the API bearer token in the keyring
    SetToken,

    /// List connected email accounts
    Accounts,

    /// Link an email account through the provider's authorization page
    Connect { provider: Provider },

    /// Unlink an email account
    Disconnect { id: u64 },

    /// Fetch recent messages for the active account
    Emails(FetchArgs),

    /// Score tracked applications against recent messages
    Progress {
        #[command(flatten)]
        fetch: FetchArgs,

        /// Write derived statuses back to the application store
        #[arg(long)]
        apply: bool,
    },
}

#[derive(Args)]
struct FetchArgs {
    /// Free-text provider query
    #[arg(long)]
    query: Option<String>,

    /// Only messages after this date (YYYY-MM-DD)
    #[arg(long)]
    after: Option<NaiveDate>,

    /// Only messages before this date (YYYY-MM-DD)
    #[arg(long)]
    before: Option<NaiveDate>,

    #[arg(long)]
    attachment: bool,

    #[arg(long)]
    unread: bool,

    #[arg(long)]
    max: Option<u32>,
}

impl FetchArgs {
    fn search_query(&self) -> SearchQuery {
        SearchQuery {
            text: self.query.clone(),
            after: self.after,
            before: self.before,
            has_attachment: self.attachment,
            unread_only: self.unread,
        }
    }
}

fn build_service(cfg: &Config) -> Result<TrackerService> {
    let db_path = resolve_db_path(cfg)?;
    let repo = SqliteRepo::open(&db_path)?;
    let backend = HttpBackend::new(&cfg.api_base_url)?;
    let gate = CredentialGate::new(Box::new(KeyringCredentials::new(cfg.keyring_user())));

    let defaults = ServiceOptions::default();
    let options = ServiceOptions {
        max_results: cfg.max_results(),
        cache_freshness_secs: cfg.account_cache_secs(),
        parent_window: WindowGeometry {
            left: 0,
            top: 0,
            width: cfg.screen_width.unwrap_or(defaults.parent_window.width),
            height: cfg.screen_height.unwrap_or(defaults.parent_window.height),
        },
        popup_width: cfg.popup_width.unwrap_or(defaults.popup_width),
        popup_height: cfg.popup_height.unwrap_or(defaults.popup_height),
        ..defaults
    };

    Ok(TrackerService::new(
        gate,
        Arc::new(backend),
        Box::new(repo),
        Box::new(SystemClock),
        Box::new(DesktopToaster),
        options,
    )?)
}

fn print_accounts(svc: &TrackerService) {
    if svc.accounts().is_empty() {
        println!("No email accounts connected.");
    }
    let active = svc.active_account().map(|a| a.id);
    for a in svc.accounts() {
        let marker = if Some(a.id) == active { "*" } else { " " };
        println!("{marker} [{}] {:<8} {}  (since {})", a.id, a.provider, a.email_address, a.connected_at);
    }
    if let Some(err) = svc.account_error() {
        eprintln!("{err}");
    }
}

fn format_date(epoch: i64) -> String {
    DateTime::from_timestamp(epoch, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn fetch(svc: &mut TrackerService, args: &FetchArgs) -> Result<()> {
    svc.load_accounts();
    let fetched = svc.fetch_emails(&args.search_query(), args.max).map(|_| ());
    // the process exits soon; let the background refresh land in the cache
    svc.wait_account_refresh();
    match fetched {
        Ok(_) => Ok(()),
        Err(e) if e.is_auth() => Err(anyhow!("{} Run `rs_job_tracker set-token`.", e.user_message())),
        Err(e) => Err(anyhow!(e.user_message())),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e:#}"))?;

    match cli.cmd {
        Command::SetToken => {
            eprintln!("Paste API bearer token (end with Ctrl-D):");
            let mut token = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut token)?;
            token_store::save_bearer_token(&cfg.keyring_user(), token.trim())?;
            println!("Saved bearer token for {}", cfg.keyring_user());
            Ok(())
        }

        Command::Accounts => {
            let mut svc = build_service(&cfg)?;
            svc.load_accounts();
            svc.wait_account_refresh();
            print_accounts(&svc);
            Ok(())
        }

        Command::Connect { provider } => {
            let mut svc = build_service(&cfg)?;
            // Ctrl-C while waiting means the user gave up on the popup
            let abandoned = Arc::new(AtomicBool::new(false));
            let flag = abandoned.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

            let mut launcher = BrowserLauncher::new(cfg.relay_addr(), &cfg.relay_origin()?, abandoned);
            println!("Opening {provider} authorization in your browser (Ctrl-C to cancel)...");
            let session = svc.connect(provider, &mut launcher);
            let state = session.state;
            let message = session.message.clone().unwrap_or_default();
            match state {
                ConnectionState::Connected => {
                    println!("{message}");
                    print_accounts(&svc);
                    Ok(())
                }
                ConnectionState::Cancelled => {
                    println!("{message}");
                    Ok(())
                }
                _ => Err(anyhow!(message)),
            }
        }

        Command::Disconnect { id } => {
            let mut svc = build_service(&cfg)?;
            svc.disconnect(id).map_err(|e| anyhow!(e.user_message()))?;
            println!("Disconnected account {id}.");
            print_accounts(&svc);
            Ok(())
        }

        Command::Emails(args) => {
            let mut svc = build_service(&cfg)?;
            fetch(&mut svc, &args)?;
            for m in svc.messages() {
                let unread = if m.is_read { " " } else { "*" };
                println!("{unread} {}  {:<30.30}  {}", format_date(m.date_epoch), m.sender, m.subject);
            }
            Ok(())
        }

        Command::Progress { fetch: args, apply } => {
            let mut svc = build_service(&cfg)?;
            fetch(&mut svc, &args)?;
            let scored = svc
                .application_progress()
                .map_err(|e| anyhow!(e.user_message()))?;

            for s in &scored {
                println!(
                    "[{:>3}%] {} - {} ({}) -> {}",
                    s.progress_score, s.record.company, s.record.job_title, s.display_status, s.next_action
                );
                for e in &s.email_categories {
                    println!("        {} {:<11} {}", format_date(e.date_epoch), e.category, e.subject);
                }
            }

            if apply {
                let n = svc
                    .sync_derived_statuses(&scored)
                    .map_err(|e| anyhow!(e.user_message()))?;
                println!("Updated {n} application(s).");
            }
            Ok(())
        }
    }
}
