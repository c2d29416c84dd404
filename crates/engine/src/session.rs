//! Base HTTP session shared by site fetchers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, SET_COOKIE, USER_AGENT};
use tracing::{debug, warn};

use folio_types::FetcherConfig;

use crate::cookies::{parse_set_cookie, CookieParam, StorageState};
use crate::error::SessionError;
use crate::limiter::RateLimiter;
use crate::time::sleep_with_random_delay;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Persistent HTTP session for one site.
///
/// Wraps a `reqwest::Client` with the ambient behavior every site adapter
/// needs: default headers, a cookie map captured from responses and
/// persisted to `state/<site>/session_state.cookies`, optional
/// token-bucket pacing, and transport-level retries with jittered
/// backoff in [`fetch`](Self::fetch).
pub struct SessionClient {
    site: String,
    config: FetcherConfig,
    client: reqwest::Client,
    cookies: Mutex<HashMap<String, CookieParam>>,
    limiter: Option<RateLimiter>,
    state_file: PathBuf,
}

impl SessionClient {
    pub fn new(site: impl Into<String>, config: FetcherConfig) -> eyre::Result<Self> {
        let site = site.into();

        let mut headers = HeaderMap::new();
        if let Some(extra) = &config.headers {
            for (name, value) in extra {
                let name: HeaderName = name.parse()?;
                headers.insert(name, HeaderValue::from_str(value)?);
            }
        }
        let agent = config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        headers.insert(USER_AGENT, HeaderValue::from_str(agent)?);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(config.timeout))
            .pool_max_idle_per_host(config.max_connections)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .default_headers(headers)
            .build()?;

        let limiter = config
            .max_rps
            .filter(|rps| *rps > 0.0)
            .map(RateLimiter::new);

        let state_file = config.state_dir.join(&site).join("session_state.cookies");

        Ok(Self {
            site,
            config,
            client,
            cookies: Mutex::new(HashMap::new()),
            limiter,
            state_file,
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch a URL's body as text, retrying transient failures with
    /// `backoff_factor`-based jittered delays.
    pub async fn fetch(&self, url: &str) -> Result<String, SessionError> {
        let retry_times = self.config.retry_times;
        let mut attempt = 0;
        loop {
            match self.try_fetch(url).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    if attempt >= retry_times {
                        return Err(SessionError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: retry_times + 1,
                            source: Box::new(err),
                        });
                    }
                    debug!(url, attempt, error = %err, "fetch attempt failed");
                    sleep_with_random_delay(
                        self.config.backoff_factor,
                        1.1,
                        self.config.backoff_factor + 2.0,
                    )
                    .await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<String, SessionError> {
        let response = self.get(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|e| SessionError::Request {
            url: url.to_string(),
            source: e,
        })
    }

    /// Single GET without retries; the caller inspects the response.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, SessionError> {
        if let Some(limiter) = &self.limiter {
            limiter.wait().await;
        }
        let mut request = self.client.get(url);
        if let Some(header) = self.cookie_header() {
            request = request.header(COOKIE, header);
        }
        let response = request.send().await.map_err(|e| SessionError::Request {
            url: url.to_string(),
            source: e,
        })?;
        self.capture_cookies(&response);
        Ok(response)
    }

    /// Single form POST without retries, with optional extra headers.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        extra_headers: &[(&str, &str)],
    ) -> Result<reqwest::Response, SessionError> {
        if let Some(limiter) = &self.limiter {
            limiter.wait().await;
        }
        let mut request = self.client.post(url).form(form);
        if let Some(header) = self.cookie_header() {
            request = request.header(COOKIE, header);
        }
        for (name, value) in extra_headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await.map_err(|e| SessionError::Request {
            url: url.to_string(),
            source: e,
        })?;
        self.capture_cookies(&response);
        Ok(response)
    }

    fn cookie_header(&self) -> Option<String> {
        let cookies = self.cookies.lock().expect("cookie map poisoned");
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .values()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn capture_cookies(&self, response: &reqwest::Response) {
        let mut cookies = self.cookies.lock().expect("cookie map poisoned");
        for header in response.headers().get_all(SET_COOKIE) {
            if let Ok(raw) = header.to_str() {
                if let Some(cookie) = parse_set_cookie(raw) {
                    cookies.insert(cookie.name.clone(), cookie);
                }
            }
        }
    }

    /// Merge plain name/value cookies into the session.
    pub fn update_cookies(&self, pairs: &HashMap<String, String>) {
        let mut cookies = self.cookies.lock().expect("cookie map poisoned");
        for (name, value) in pairs {
            cookies.insert(name.clone(), CookieParam::new(name.clone(), value.clone()));
        }
    }

    pub fn cookie_value(&self, name: &str) -> Option<String> {
        self.cookies
            .lock()
            .expect("cookie map poisoned")
            .get(name)
            .map(|c| c.value.clone())
    }

    pub fn cookie_pairs(&self) -> HashMap<String, String> {
        self.cookies
            .lock()
            .expect("cookie map poisoned")
            .values()
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect()
    }

    /// Restore cookies from the persisted state file. Returns `false`
    /// when no usable state exists; adapters still decide what a live
    /// login means for their site.
    pub async fn load_state(&self) -> bool {
        let raw = match tokio::fs::read_to_string(&self.state_file).await {
            Ok(raw) => raw,
            Err(_) => return false,
        };
        let state: StorageState = match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(site = %self.site, error = %e, "failed to parse session state");
                return false;
            }
        };
        let mut cookies = self.cookies.lock().expect("cookie map poisoned");
        for cookie in state.cookies {
            cookies.insert(cookie.name.clone(), cookie);
        }
        true
    }

    /// Persist the current cookies for future runs.
    pub async fn save_state(&self) -> bool {
        let state = StorageState {
            cookies: {
                let cookies = self.cookies.lock().expect("cookie map poisoned");
                let mut all: Vec<CookieParam> = cookies.values().cloned().collect();
                all.sort_by(|a, b| a.name.cmp(&b.name));
                all
            },
            origins: Vec::new(),
        };
        let Ok(json) = serde_json::to_string_pretty(&state) else {
            return false;
        };
        if let Some(parent) = self.state_file.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(site = %self.site, error = %e, "failed to create state dir");
                return false;
            }
        }
        match tokio::fs::write(&self.state_file, json).await {
            Ok(()) => true,
            Err(e) => {
                warn!(site = %self.site, error = %e, "failed to save session state");
                false
            }
        }
    }
}
