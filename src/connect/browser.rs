use std::io::{Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};
use url::Url;

use crate::connect::popup::{PopupFeatures, PopupHandle, PopupLauncher, PopupWindow};

const BIND_ATTEMPTS: u32 = 10;
const BIND_RETRY: Duration = Duration::from_millis(25);

/// Opens the authorization page in the system browser. The callback page
/// posts its completion message to a loopback relay:
///
/// - `POST /oauth/message` with the JSON message as body, or
///   `GET /oauth/message?payload=<json>`
/// - `GET|POST /oauth/closed` when the window unloads
///
/// Only pages served from `allowed_origin` are heard.
pub struct BrowserLauncher {
    relay_addr: String,
    allowed_origin: String,
    /// Set from outside (Ctrl-C) when the user gives up on the attempt.
    abandoned: Arc<AtomicBool>,
}

impl BrowserLauncher {
    pub fn new(relay_addr: impl Into<String>, allowed_origin: &Url, abandoned: Arc<AtomicBool>) -> Self {
        Self {
            relay_addr: relay_addr.into(),
            allowed_origin: allowed_origin.origin().ascii_serialization(),
            abandoned,
        }
    }
}

impl PopupLauncher for BrowserLauncher {
    fn open(&mut self, url: &Url, features: &PopupFeatures) -> Option<PopupHandle> {
        if self.abandoned.load(Ordering::SeqCst) {
            // Ctrl-C landed before the popup existed: report it as closed
            log::info!("attempt abandoned before the popup opened");
            let (_tx, rx) = mpsc::channel();
            return Some(PopupHandle {
                window: Box::new(BrowserWindow {
                    relay: None,
                    abandoned: self.abandoned.clone(),
                }),
                messages: rx,
            });
        }

        // Listen before the page can possibly post back
        let (relay, rx) = match Relay::start(&self.relay_addr, &self.allowed_origin) {
            Ok(r) => r,
            Err(e) => {
                log::error!("could not bind popup relay on {}: {e}", self.relay_addr);
                return None;
            }
        };

        log::debug!("opening popup ({})", features.to_feature_string());
        if let Err(e) = open::that(url.as_str()) {
            log::warn!("could not open browser: {e}");
            return None;
        }

        Some(PopupHandle {
            window: Box::new(BrowserWindow {
                relay: Some(relay),
                abandoned: self.abandoned.clone(),
            }),
            messages: rx,
        })
    }
}

struct BrowserWindow {
    /// `None` when the attempt was abandoned before anything was opened.
    relay: Option<Relay>,
    abandoned: Arc<AtomicBool>,
}

impl PopupWindow for BrowserWindow {
    fn is_closed(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
            || self.relay.as_ref().is_none_or(Relay::saw_close)
    }

    fn close(&mut self) {
        if let Some(relay) = self.relay.as_mut() {
            relay.shutdown();
        }
    }
}

/// Loopback listener for one attempt. Shutting it down joins the worker and
/// releases the port before returning.
struct Relay {
    server: Option<Arc<Server>>,
    closed: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Relay {
    fn start(addr: &str, allowed_origin: &str) -> Result<(Relay, Receiver<String>), String> {
        let server = Arc::new(bind(addr)?);
        let (tx, rx) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let worker = {
            let server = server.clone();
            let closed = closed.clone();
            let stop = stop.clone();
            let allowed = allowed_origin.to_string();
            thread::spawn(move || serve(&server, &tx, &closed, &stop, &allowed))
        };
        let relay = Relay {
            server: Some(server),
            closed,
            stop,
            worker: Some(worker),
        };
        Ok((relay, rx))
    }

    fn saw_close(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(server) = &self.server {
            server.unblock();
        }
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            log::warn!("popup relay thread panicked");
        }
        // last reference; dropping it closes the listening socket
        self.server = None;
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The previous attempt's listener may still be winding down.
fn bind(addr: &str) -> Result<Server, String> {
    let mut last = String::new();
    for _ in 0..BIND_ATTEMPTS {
        match Server::http(addr) {
            Ok(s) => return Ok(s),
            Err(e) => last = e.to_string(),
        }
        thread::sleep(BIND_RETRY);
    }
    Err(last)
}

fn serve(server: &Server, tx: &Sender<String>, closed: &AtomicBool, stop: &AtomicBool, allowed: &str) {
    while !stop.load(Ordering::SeqCst) {
        let Ok(maybe_request) = server.recv_timeout(Duration::from_millis(250)) else {
            continue;
        };
        let Some(request) = maybe_request else {
            continue;
        };
        handle_request(request, tx, closed, allowed);
    }
    log::debug!("popup relay stopped");
}

fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Browsers send `Origin` on POST and CORS requests and `Referer` on plain
/// navigations; a request carrying neither is refused.
fn from_allowed_origin(origin: Option<&str>, referer: Option<&str>, allowed: &str) -> bool {
    if let Some(origin) = origin {
        return origin.trim().trim_end_matches('/') == allowed;
    }
    referer
        .and_then(|r| Url::parse(r).ok())
        .is_some_and(|u| u.origin().ascii_serialization() == allowed)
}

fn handle_request(mut request: Request, tx: &Sender<String>, closed: &AtomicBool, allowed: &str) {
    // request.url() is a path+query like "/oauth/message?payload=..."
    let Ok(parsed) = Url::parse(&format!("http://relay{}", request.url())) else {
        let _ = request.respond(reply("Bad request", 400, allowed));
        return;
    };

    if *request.method() == Method::Options {
        let _ = request.respond(reply("", 204, allowed));
        return;
    }

    if !from_allowed_origin(header(&request, "Origin"), header(&request, "Referer"), allowed) {
        log::warn!("relay request to {} from a foreign origin refused", parsed.path());
        let _ = request.respond(reply("Forbidden", 403, allowed));
        return;
    }

    match parsed.path() {
        "/oauth/message" => {
            let payload = if *request.method() == Method::Post {
                let mut body = String::new();
                match request.as_reader().read_to_string(&mut body) {
                    Ok(_) => Some(body),
                    Err(e) => {
                        log::debug!("unreadable relay body: {e}");
                        None
                    }
                }
            } else {
                parsed
                    .query_pairs()
                    .find(|(k, _)| k == "payload")
                    .map(|(_, v)| v.into_owned())
            };
            if let Some(p) = payload {
                // opener may already be gone; nothing to do then
                let _ = tx.send(p);
            }
            let _ = request.respond(reply("ok", 200, allowed));
        }
        "/oauth/closed" => {
            closed.store(true, Ordering::SeqCst);
            let _ = request.respond(reply("ok", 200, allowed));
        }
        _ => {
            let _ = request.respond(reply("Not found", 404, allowed));
        }
    }
}

fn reply(body: &str, status: u16, allowed: &str) -> Response<Cursor<Vec<u8>>> {
    let mut resp = Response::from_string(body).with_status_code(status);
    for (name, value) in [
        ("Access-Control-Allow-Origin", allowed),
        ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
        ("Access-Control-Allow-Headers", "Content-Type"),
        ("Vary", "Origin"),
    ] {
        if let Ok(h) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            resp.add_header(h);
        }
    }
    resp
}
