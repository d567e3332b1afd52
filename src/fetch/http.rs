use super::{FetchOutcome, Fetcher, RetryPolicy};
use crate::config::FetchConfig;
use anyhow::{Context, Result};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect, Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Redirect hops followed before giving up.
const MAX_REDIRECTS: usize = 10;

const USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Mobile Safari/537.36";
const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "pt-BR,pt;q=0.8,en-US;q=0.5,en;q=0.3";

/// Static browser-like headers sent with every ping. Some hosts put
/// obvious bots behind a challenge page; these values will age.
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE));
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers
}

/// Reqwest-backed fetcher: timeout per request, redirects followed,
/// transient failures retried per its [`RetryPolicy`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .default_headers(browser_headers())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, policy })
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        Self::new(Duration::from_secs(config.timeout_secs), config.retry_policy())
    }

    fn retry_delay(&self, response: &Response, retry_index: u32) -> Duration {
        let honours_header = matches!(
            response.status(),
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
        );
        let requested = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        match requested {
            Some(secs) if honours_header => self.policy.server_delay(secs),
            _ => self.policy.delay(retry_index),
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if self.policy.is_retryable_status(status.as_u16())
                        && self.policy.should_retry(attempts)
                    {
                        let delay = self.retry_delay(&response, attempts - 1);
                        // release the connection before waiting
                        drop(response);
                        debug!(%url, attempt = attempts, status = status.as_u16(), ?delay, "Transient status, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return classify(url, status);
                }
                Err(e) => {
                    if is_transient(&e) && self.policy.should_retry(attempts) {
                        let delay = self.policy.delay(attempts - 1);
                        debug!(%url, attempt = attempts, error = %e, ?delay, "Transport failure, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return FetchOutcome::error(url, &describe(&e));
                }
            }
        }
    }
}

fn classify(url: &str, status: StatusCode) -> FetchOutcome {
    let text = status_text(status);
    if status == StatusCode::OK {
        FetchOutcome::success(url, text)
    } else {
        FetchOutcome::failure(url, text)
    }
}

/// "503 Service Unavailable", or the bare code when it has no reason phrase.
pub fn status_text(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

/// Innermost cause of a transport error; reqwest's own message mostly repeats the URL.
fn describe(e: &reqwest::Error) -> String {
    let mut cause: &(dyn std::error::Error + 'static) = e;
    while let Some(source) = cause.source() {
        cause = source;
    }
    cause.to_string()
}
