use crate::error::SyncError;
use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::redirect::Policy;
use std::io::Read;
use std::thread;
use std::time::Duration;

/// How many times a rate-limited request is attempted before the run aborts.
pub const RATE_LIMIT_ATTEMPTS: usize = 5;
/// Fixed wait between rate-limited attempts.
pub const RATE_LIMIT_WAIT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("sebsync/", env!("CARGO_PKG_VERSION"));

/// Result of a metadata-only request.
#[derive(Debug, Clone, Default)]
pub struct HeadResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub location: Option<String>,
}

/// The sole network primitive the engine sees. The 429 retry policy lives
/// behind this trait, so callers never re-implement it, and tests substitute
/// stubs to assert which requests are (not) issued.
pub trait Transport {
    /// Metadata-only request, following redirects.
    fn head(&self, url: &str) -> Result<HeadResponse>;

    /// Metadata-only request that reports redirects instead of following
    /// them; used by the deprecation check.
    fn head_no_redirect(&self, url: &str) -> Result<HeadResponse>;

    /// Fetch a resource, streaming the body. `basic_auth_user` is sent with
    /// an empty password when present (the catalog authenticates by email).
    fn get(&self, url: &str, basic_auth_user: Option<&str>) -> Result<Box<dyn Read>>;
}

/// Blocking reqwest-backed transport with transparent rate-limit retry.
pub struct HttpTransport {
    follow: Client,
    bare: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let follow = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        let bare = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::none())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { follow, bare })
    }
}

/// Issue `send` until it yields a status other than 429, waiting a fixed
/// interval between attempts. Exhausting the bound aborts the whole run: at
/// that point the remote is misbehaving, not the entry. Transport-level
/// failures are not retried; only an explicit 429 is.
fn with_retry<T>(
    attempts: usize,
    wait: Duration,
    send: impl Fn() -> Result<T>,
    status_of: impl Fn(&T) -> u16,
) -> Result<T> {
    for attempt in 1..=attempts {
        let response = send()?;
        if status_of(&response) != 429 {
            return Ok(response);
        }
        if attempt < attempts {
            thread::sleep(wait);
        }
    }
    Err(SyncError::RateLimitExceeded(attempts).into())
}

fn head_of(response: &Response) -> HeadResponse {
    HeadResponse {
        status: response.status().as_u16(),
        content_length: response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok()),
        location: response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned),
    }
}

impl Transport for HttpTransport {
    fn head(&self, url: &str) -> Result<HeadResponse> {
        let response = with_retry(
            RATE_LIMIT_ATTEMPTS,
            RATE_LIMIT_WAIT,
            || self.follow.head(url).send().context("request failed"),
            |r| r.status().as_u16(),
        )?;
        Ok(head_of(&response))
    }

    fn head_no_redirect(&self, url: &str) -> Result<HeadResponse> {
        let response = with_retry(
            RATE_LIMIT_ATTEMPTS,
            RATE_LIMIT_WAIT,
            || self.bare.head(url).send().context("request failed"),
            |r| r.status().as_u16(),
        )?;
        Ok(head_of(&response))
    }

    fn get(&self, url: &str, basic_auth_user: Option<&str>) -> Result<Box<dyn Read>> {
        let response = with_retry(
            RATE_LIMIT_ATTEMPTS,
            RATE_LIMIT_WAIT,
            || {
                let mut request = self.follow.get(url);
                if let Some(user) = basic_auth_user {
                    request = request.basic_auth(user, Some(""));
                }
                request.send().context("request failed")
            },
            |r| r.status().as_u16(),
        )?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} returned {status}");
        }
        Ok(Box::new(response))
    }
}
