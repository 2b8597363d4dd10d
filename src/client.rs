use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use url::Url;

use crate::config::Credentials;
use crate::error::{Error, Result as EResult};
use crate::request::Request;
use crate::status::{Reply, TaskState};

const DOWNLOAD_CHUNK: usize = 128 * 1024;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Service endpoint; `None` falls back to env / rc file / default.
    pub url: Option<String>,
    /// API key, either `uid:secret` (legacy) or a bare token; `None` falls
    /// back to env / rc file.
    pub key: Option<String>,
    /// Attempts per HTTP call before giving up on transient failures. Must be
    /// at least 1.
    pub retry_max: u32,
    /// Cap, in seconds, on the sleep between polls and between retries.
    pub sleep_max: f64,
    /// Log download progress.
    pub progress: bool,
    /// Delete the remote task after a successful download.
    pub delete: bool,
    /// Per-request timeout.
    pub timeout: Duration,
    pub verify_tls: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        // Same defaults as the upstream cdsapi client.
        Self {
            url: None,
            key: None,
            retry_max: 500,
            sleep_max: 120.0,
            progress: true,
            delete: true,
            timeout: Duration::from_secs(60),
            verify_tls: true,
        }
    }
}

/// Outcome of a completed retrieval.
#[derive(Debug, Clone)]
pub struct RetrieveResult {
    pub request_id: String,
    pub location: String,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub target: String,
    pub size_bytes: u64,
}

/// How the key is presented to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Auth {
    /// Legacy `uid:secret` keys use HTTP basic auth.
    Basic { user: String, secret: String },
    /// Bare tokens are sent as a `PRIVATE-TOKEN` header.
    Token(String),
}

impl Auth {
    fn from_key(key: &str) -> Self {
        match key.split_once(':') {
            Some((user, secret)) => Auth::Basic {
                user: user.to_string(),
                secret: secret.to_string(),
            },
            None => Auth::Token(key.to_string()),
        }
    }

    fn apply(&self, req: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match self {
            Auth::Basic { user, secret } => req.basic_auth(user, Some(secret)),
            Auth::Token(t) => req.header("PRIVATE-TOKEN", t),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    auth: Auth,
    http: HttpClient,
    retry_max: u32,
    sleep_max: f64,
    progress: bool,
    delete: bool,
}

impl Client {
    pub fn new(opts: ClientOptions) -> EResult<Self> {
        if opts.retry_max == 0 {
            return Err(Error::InvalidRequest("retry_max must be at least 1".into()));
        }

        let creds = Credentials::resolve(opts.url.as_deref(), opts.key.as_deref())?;
        let base_url = parse_base_url(&creds.url)?;
        let auth = Auth::from_key(&creds.key);

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("cds-api-rs/0.1"));

        let mut builder = HttpClient::builder()
            .default_headers(headers)
            .timeout(opts.timeout);
        if !opts.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;

        Ok(Self {
            base_url,
            auth,
            http,
            retry_max: opts.retry_max,
            sleep_max: opts.sleep_max,
            progress: opts.progress,
            delete: opts.delete,
        })
    }

    /// Convenience constructor with upstream-like defaults.
    pub fn default_client() -> EResult<Self> {
        Self::new(ClientOptions::default())
    }

    /// Submit `request` against `dataset`, wait for the server-side task to
    /// complete, and write the result to `target` (truncating any existing
    /// file). This is the single blocking call of the upstream client.
    pub fn retrieve(
        &self,
        dataset: &str,
        request: &Request,
        target: impl Into<String>,
    ) -> EResult<RetrieveResult> {
        self.retrieve_inner(dataset, request, Some(target.into()))
    }

    /// Like [`Client::retrieve`], but the target may live inside the request
    /// (`target` keyword). Without one, the file name is taken from the
    /// result location.
    pub fn retrieve_request(&self, dataset: &str, request: &Request) -> EResult<RetrieveResult> {
        let target = request
            .get("target")
            .and_then(|v| v.as_strings().into_iter().next());
        self.retrieve_inner(dataset, request, target)
    }

    /// Build a request from keyword/value pairs and retrieve it.
    pub fn retrieve_pairs<K, V>(
        &self,
        dataset: &str,
        pairs: impl IntoIterator<Item = (K, V)>,
        target: impl Into<String>,
    ) -> EResult<RetrieveResult>
    where
        K: Into<String>,
        V: Into<crate::request::RequestValue>,
    {
        self.retrieve(dataset, &Request::from_pairs(pairs), target)
    }

    fn retrieve_inner(
        &self,
        dataset: &str,
        request: &Request,
        target: Option<String>,
    ) -> EResult<RetrieveResult> {
        let reply = self.submit(dataset, request)?;
        let request_id = reply
            .request_id
            .clone()
            .ok_or_else(|| Error::InvalidRequest("reply carries no request_id".into()))?;
        info!("request {request_id} submitted for {dataset}");

        let reply = self.wait(&request_id, reply)?;

        match reply.state {
            TaskState::Completed => {}
            TaskState::Failed => {
                let (message, reason) = reply
                    .error
                    .map(|e| (e.message, e.reason))
                    .unwrap_or_else(|| ("task failed".into(), String::new()));
                return Err(Error::TaskFailed { message, reason });
            }
            other => {
                return Err(Error::InvalidRequest(format!(
                    "unexpected terminal task state: {other}"
                )));
            }
        }

        let location = reply
            .location
            .ok_or_else(|| Error::InvalidRequest("completed reply carries no location".into()))?;
        let location = resolve_location(&self.base_url, &location)?;

        let target = target.unwrap_or_else(|| target_from_location(&location));
        let size_bytes = self.download(&location, &target, reply.content_length)?;

        if let Some(expected) = reply.content_length {
            if size_bytes != expected {
                return Err(Error::DownloadTruncated {
                    got: size_bytes,
                    expected,
                });
            }
        }

        if self.delete {
            self.delete_task(&request_id);
        }

        Ok(RetrieveResult {
            request_id,
            location: location.to_string(),
            content_length: reply.content_length,
            content_type: reply.content_type,
            target,
            size_bytes,
        })
    }

    fn submit(&self, dataset: &str, request: &Request) -> EResult<Reply> {
        let url = self.endpoint(&format!("resources/{dataset}"))?;
        let body = request.to_json();
        debug!("POST {url} {body}");

        let resp = self.robust(|| {
            self.auth
                .apply(self.http.post(url.clone()).json(&body))
                .send()
        })?;
        decode_reply(resp)
    }

    /// Poll `tasks/{request_id}` until the task reaches a terminal state.
    /// Sleeps between polls, starting at one second and backing off up to
    /// `sleep_max`.
    fn wait(&self, request_id: &str, mut reply: Reply) -> EResult<Reply> {
        let url = self.endpoint(&format!("tasks/{request_id}"))?;
        let mut last_state = reply.state.clone();
        let mut poll: u32 = 0;

        while !reply.state.is_terminal() {
            if reply.state != last_state {
                info!("request {request_id} is {}", reply.state);
                last_state = reply.state.clone();
            } else {
                debug!("request {request_id} is {}", reply.state);
            }

            thread::sleep(Duration::from_secs_f64(backoff_seconds(poll, self.sleep_max)));
            poll += 1;

            let resp = self.robust(|| self.auth.apply(self.http.get(url.clone())).send())?;
            reply = decode_reply(resp)?;
        }

        info!("request {request_id} is {}", reply.state);
        Ok(reply)
    }

    fn download(&self, location: &Url, target: &str, content_length: Option<u64>) -> EResult<u64> {
        info!(
            "downloading {location} to {target}{}",
            content_length
                .map(|n| format!(" ({n} bytes)"))
                .unwrap_or_default()
        );
        let started = Instant::now();

        let mut resp = self
            .robust(|| self.auth.apply(self.http.get(location.clone())).send())?
            .error_for_status()?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(target)?;

        let mut total: u64 = 0;
        let mut last_percent: u64 = 0;
        let mut buf = vec![0u8; DOWNLOAD_CHUNK];

        loop {
            let n = resp.read(&mut buf)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            total += n as u64;

            if self.progress {
                if let Some(expected) = content_length.filter(|e| *e > 0) {
                    let percent = total * 100 / expected;
                    if percent / 10 > last_percent / 10 {
                        info!("{target}: {percent}% ({total}/{expected} bytes)");
                        last_percent = percent;
                    }
                }
            }
        }
        file.flush()?;

        info!(
            "downloaded {total} bytes in {:.1}s",
            started.elapsed().as_secs_f64()
        );
        Ok(total)
    }

    /// Remove the finished task server-side. Failure here never fails the
    /// retrieval; the data is already on disk.
    fn delete_task(&self, request_id: &str) {
        let Ok(url) = self.endpoint(&format!("tasks/{request_id}")) else {
            return;
        };
        match self.auth.apply(self.http.delete(url)).send() {
            Ok(resp) if resp.status().is_success() => {
                debug!("deleted task {request_id}");
            }
            Ok(resp) => warn!("could not delete task {request_id}: HTTP {}", resp.status()),
            Err(e) => warn!("could not delete task {request_id}: {e}"),
        }
    }

    /// Issue an HTTP call, retrying transient failures (connect errors,
    /// timeouts, 429 and 5xx) up to `retry_max` attempts with capped backoff.
    fn robust<F>(&self, mut send: F) -> EResult<reqwest::blocking::Response>
    where
        F: FnMut() -> std::result::Result<reqwest::blocking::Response, reqwest::Error>,
    {
        let mut last: Option<String> = None;

        for attempt in 0..self.retry_max {
            if attempt > 0 {
                let sleep = backoff_seconds(attempt - 1, self.sleep_max);
                warn!(
                    "retrying in {sleep:.0}s (attempt {}/{}): {}",
                    attempt + 1,
                    self.retry_max,
                    last.as_deref().unwrap_or("transient failure")
                );
                thread::sleep(Duration::from_secs_f64(sleep));
            }

            match send() {
                Ok(resp) if !is_transient_status(resp.status()) => return Ok(resp),
                Ok(resp) => last = Some(format!("HTTP {}", resp.status())),
                Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
                    last = Some(e.to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::RetriesExhausted {
            attempts: self.retry_max,
            last: last.unwrap_or_else(|| "transient failure".into()),
        })
    }

    fn endpoint(&self, path: &str) -> EResult<Url> {
        Ok(self.base_url.join(path)?)
    }
}

/// Parse the base URL, ensuring a trailing slash so `Url::join` keeps the
/// `/api/v2` segment.
fn parse_base_url(url: &str) -> EResult<Url> {
    let normalized = if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    };
    Ok(Url::parse(&normalized)?)
}

/// Result locations may be absolute or relative to the service endpoint.
fn resolve_location(base: &Url, location: &str) -> EResult<Url> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Ok(Url::parse(location)?)
    } else {
        Ok(base.join(location)?)
    }
}

/// Default target: the file name component of the result location.
fn target_from_location(location: &Url) -> String {
    location
        .path_segments()
        .and_then(|mut s| s.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("download")
        .to_string()
}

/// Sleep for poll/retry number `n` (0-based): 1s, 1.5s, 2.25s, ... capped at
/// `sleep_max`.
fn backoff_seconds(n: u32, sleep_max: f64) -> f64 {
    let raw = 1.5f64.powi(n.min(64) as i32);
    raw.min(sleep_max.max(0.0))
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Turn an HTTP response into a [`Reply`], mapping auth failures and
/// service-side validation errors to their own variants.
fn decode_reply(resp: reqwest::blocking::Response) -> EResult<Reply> {
    let status = resp.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let body = resp.text().unwrap_or_default();
        return Err(Error::Unauthorized(error_message(&body, status)));
    }

    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(&body) {
            if let Some(message) = v.get("message").and_then(|m| m.as_str()) {
                let reason = v
                    .get("reason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("")
                    .to_string();
                return Err(Error::TaskFailed {
                    message: message.to_string(),
                    reason,
                });
            }
        }
        return Err(Error::TaskFailed {
            message: format!("HTTP {status}"),
            reason: body,
        });
    }

    Ok(resp.json::<Reply>()?)
}

fn error_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(|s| s.to_string()))
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts_with_key(key: &str) -> ClientOptions {
        ClientOptions {
            url: Some("https://cds.climate.copernicus.eu/api/v2".to_string()),
            key: Some(key.to_string()),
            ..ClientOptions::default()
        }
    }

    #[test]
    fn rejects_zero_retry_max() {
        let opts = ClientOptions {
            retry_max: 0,
            ..opts_with_key("uid:secret")
        };
        assert!(matches!(Client::new(opts), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn auth_mode_follows_key_shape() {
        assert_eq!(
            Auth::from_key("2548:a32dce56-b04a-42fc-8fc3-a972f94772ad"),
            Auth::Basic {
                user: "2548".to_string(),
                secret: "a32dce56-b04a-42fc-8fc3-a972f94772ad".to_string(),
            }
        );
        assert_eq!(
            Auth::from_key("baretoken"),
            Auth::Token("baretoken".to_string())
        );
    }

    #[test]
    fn endpoint_keeps_api_prefix() {
        let client = Client::new(opts_with_key("uid:secret")).unwrap();
        let url = client
            .endpoint("resources/insitu-gridded-observations-europe")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://cds.climate.copernicus.eu/api/v2/resources/insitu-gridded-observations-europe"
        );
        let url = client.endpoint("tasks/a1b2c3").unwrap();
        assert_eq!(
            url.as_str(),
            "https://cds.climate.copernicus.eu/api/v2/tasks/a1b2c3"
        );
    }

    #[test]
    fn resolves_absolute_and_relative_locations() {
        let base = parse_base_url("https://cds.climate.copernicus.eu/api/v2").unwrap();

        let abs = resolve_location(&base, "https://download.cds.climate.copernicus.eu/cache/x.tar.gz").unwrap();
        assert_eq!(abs.host_str(), Some("download.cds.climate.copernicus.eu"));

        let rel = resolve_location(&base, "cache/x.tar.gz").unwrap();
        assert_eq!(
            rel.as_str(),
            "https://cds.climate.copernicus.eu/api/v2/cache/x.tar.gz"
        );
    }

    #[test]
    fn target_defaults_to_location_file_name() {
        let url = Url::parse("https://download.cds.climate.copernicus.eu/cache/eobs.tar.gz").unwrap();
        assert_eq!(target_from_location(&url), "eobs.tar.gz");

        let bare = Url::parse("https://download.cds.climate.copernicus.eu/").unwrap();
        assert_eq!(target_from_location(&bare), "download");
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        assert_eq!(backoff_seconds(0, 120.0), 1.0);
        assert!(backoff_seconds(1, 120.0) > backoff_seconds(0, 120.0));
        assert_eq!(backoff_seconds(60, 120.0), 120.0);
        // A tiny cap still wins.
        assert_eq!(backoff_seconds(10, 0.5), 0.5);
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::OK));
    }
}
