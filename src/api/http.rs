use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::api::Backend;
use crate::domain::account::{AccountId, EmailAccount, Provider};
use crate::domain::application::{ApplicationId, ApplicationRecord, ApplicationStatus};
use crate::domain::email::{Message, RawMessage};
use crate::error::{Result, TrackerError};

#[derive(Debug, Deserialize)]
struct OAuthInitResponse {
    #[serde(default)]
    oauth_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    emails: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Blocking REST client for the tracker backend.
pub struct HttpBackend {
    base: Url,
    client: Client,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| TrackerError::InvalidPayload(format!("api_base_url '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| TrackerError::InvalidPayload(format!("bad endpoint '{path}': {e}")))
    }

    fn send(&self, req: RequestBuilder, token: &str) -> Result<Response> {
        let resp = req.bearer_auth(token).send()?;
        check_status(resp)
    }
}

/// Map non-success responses onto the error taxonomy. A server-provided
/// `error`/`detail` message is kept verbatim.
fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(TrackerError::AuthExpired);
    }
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(error_from_body(status.as_u16(), &body))
}

fn error_from_body(status: u16, body: &str) -> TrackerError {
    let server_msg = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.detail))
        .filter(|m| !m.trim().is_empty());
    match server_msg {
        Some(msg) => TrackerError::Provider(msg),
        None => TrackerError::Api {
            status,
            message: body.trim().to_string(),
        },
    }
}

/// Decode a response body. A body that is not the expected JSON is the
/// server's fault, not the network's.
fn decode<T: DeserializeOwned>(what: &str, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| TrackerError::InvalidPayload(format!("{what}: {e}")))
}

/// Decode a JSON array entry by entry. Entries that do not fit `T` are
/// logged and dropped; only a body that is not an array fails.
fn parse_list<T: DeserializeOwned>(what: &str, text: &str) -> Result<Vec<T>> {
    let values: Vec<Value> = decode(what, text)?;
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value(value) {
            Ok(item) => out.push(item),
            Err(e) => log::warn!("skipping malformed {what} entry: {e}"),
        }
    }
    Ok(out)
}

/// Validate the OAuth initiation payload: an `error` wins, otherwise the
/// URL must be present and absolute http(s).
fn parse_oauth_init(body: OAuthInitResponse) -> Result<Url> {
    if let Some(err) = body.error.filter(|e| !e.trim().is_empty()) {
        return Err(TrackerError::Provider(err));
    }
    let raw = body
        .oauth_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| TrackerError::InvalidPayload("authorization URL missing".into()))?;
    let url = Url::parse(raw.trim())
        .map_err(|e| TrackerError::InvalidPayload(format!("malformed authorization URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(TrackerError::InvalidPayload(format!(
            "authorization URL has unsupported scheme '{other}'"
        ))),
    }
}

/// Normalize each listed message; malformed entries are dropped here so
/// nothing downstream sees them.
fn parse_messages(list: MessageListResponse) -> Vec<Message> {
    let mut out = Vec::with_capacity(list.emails.len());
    for value in list.emails {
        let parsed = serde_json::from_value::<RawMessage>(value)
            .map_err(|e| e.to_string())
            .and_then(RawMessage::into_message);
        match parsed {
            Ok(m) => out.push(m),
            Err(e) => log::warn!("skipping malformed message: {e}"),
        }
    }
    out
}

impl Backend for HttpBackend {
    fn list_accounts(&self, token: &str) -> Result<Vec<EmailAccount>> {
        let url = self.endpoint("api/email-accounts/")?;
        let text = self.send(self.client.get(url), token)?.text()?;
        parse_list("account list", &text)
    }

    fn oauth_init(&self, token: &str, provider: Provider) -> Result<Url> {
        let url = self.endpoint("api/email-accounts/oauth-init/")?;
        let req = self.client.get(url).query(&[("provider", provider.as_str())]);
        let text = self.send(req, token)?.text()?;
        parse_oauth_init(decode("oauth-init response", &text)?)
    }

    fn delete_account(&self, token: &str, id: AccountId) -> Result<()> {
        let url = self.endpoint(&format!("api/email-accounts/{id}/"))?;
        self.send(self.client.delete(url), token)?;
        Ok(())
    }

    fn list_messages(
        &self,
        token: &str,
        account: AccountId,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<Message>> {
        let url = self.endpoint(&format!("api/email-accounts/{account}/gmail-emails/"))?;
        let mut params = vec![("max_results", max_results.to_string())];
        if !query.is_empty() {
            params.push(("query", query.to_string()));
        }
        let text = self.send(self.client.get(url).query(&params), token)?.text()?;
        Ok(parse_messages(decode("email list", &text)?))
    }

    fn list_applications(&self, token: &str) -> Result<Vec<ApplicationRecord>> {
        let url = self.endpoint("api/applications/")?;
        let text = self.send(self.client.get(url), token)?.text()?;
        parse_list("application list", &text)
    }

    fn update_application_status(
        &self,
        token: &str,
        id: ApplicationId,
        status: ApplicationStatus,
    ) -> Result<()> {
        let url = self.endpoint(&format!("api/applications/{id}/"))?;
        let body = serde_json::json!({ "status": status });
        self.send(self.client.patch(url).json(&body), token)?;
        Ok(())
    }
}
