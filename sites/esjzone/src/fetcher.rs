//! Session fetcher and login flow for www.esjzone.cc.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use eyre::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use folio_engine::time::sleep_with_random_delay;
use folio_engine::{Fetcher, SessionClient};
use folio_types::{FetcherConfig, LoginField, LoginFieldKind};

const BOOKCASE_URL: &str = "https://www.esjzone.cc/my/favorite";
const BOOK_INFO_URL: &str = "https://www.esjzone.cc/detail/{book_id}.html";
const CHAPTER_URL: &str = "https://www.esjzone.cc/forum/{book_id}/{chapter_id}.html";

const AUTH_TOKEN_URL: &str = "https://www.esjzone.cc/my/login";
const MEMBER_LOGIN_URL: &str = "https://www.esjzone.cc/inc/mem_login.php";

/// Markers the site injects into pages served to logged-out visitors.
const LOGOUT_MARKERS: &[&str] = &["window.location.href='/my/login'"];

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<JinJing>(.+?)</JinJing>").expect("valid regex"));

pub struct EsjzoneFetcher {
    session: SessionClient,
    logged_in: AtomicBool,
}

impl EsjzoneFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        Ok(Self {
            session: SessionClient::new(crate::SITE, config)?,
            logged_in: AtomicBool::new(false),
        })
    }

    fn book_info_url(book_id: &str) -> String {
        BOOK_INFO_URL.replace("{book_id}", book_id)
    }

    fn chapter_url(book_id: &str, chapter_id: &str) -> String {
        CHAPTER_URL
            .replace("{book_id}", book_id)
            .replace("{chapter_id}", chapter_id)
    }

    /// Logged-out sessions get a redirect script instead of the bookcase.
    async fn check_login_status(&self) -> bool {
        match self.session.fetch(BOOKCASE_URL).await {
            Ok(html) => !LOGOUT_MARKERS.iter().any(|marker| html.contains(marker)),
            Err(e) => {
                debug!(error = %e, "bookcase probe failed");
                false
            }
        }
    }

    /// Two-step token login: fetch an auth token, then post credentials
    /// with the token in the `Authorization` header.
    async fn api_login(&self, username: &str, password: &str) -> bool {
        let token = match self
            .session
            .post_form(AUTH_TOKEN_URL, &[("plxf", "getAuthToken")], &[])
            .await
        {
            Ok(response) => match response.text().await {
                Ok(body) => extract_token(&body),
                Err(e) => {
                    warn!(error = %e, "auth token response unreadable");
                    return false;
                }
            },
            Err(e) => {
                warn!(error = %e, "auth token request failed");
                return false;
            }
        };
        let Some(token) = token else {
            warn!("no auth token in login response");
            return false;
        };

        let form = [
            ("email", username),
            ("pwd", password),
            ("remember_me", "on"),
        ];
        match self
            .session
            .post_form(MEMBER_LOGIN_URL, &form, &[("Authorization", token.as_str())])
            .await
        {
            Ok(response) => match response.json::<serde_json::Value>().await {
                Ok(body) => body.get("status").and_then(|s| s.as_i64()) == Some(200),
                Err(e) => {
                    warn!(error = %e, "login response was not json");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "member login request failed");
                false
            }
        }
    }
}

fn extract_token(body: &str) -> Option<String> {
    TOKEN_RE
        .captures(body)
        .map(|caps| caps[1].to_string())
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl Fetcher for EsjzoneFetcher {
    async fn login(
        &self,
        username: &str,
        password: &str,
        cookies: &HashMap<String, String>,
        attempt: u32,
    ) -> bool {
        if !cookies.is_empty() {
            self.session.update_cookies(cookies);
        }
        if self.check_login_status().await {
            debug!("logged in via cookies");
            self.logged_in.store(true, Ordering::SeqCst);
            return true;
        }

        if username.is_empty() || password.is_empty() {
            warn!("no credentials provided");
            return false;
        }

        let interval = self.session.config().request_interval;
        for _ in 0..attempt.max(1) {
            if self.api_login(username, password).await && self.check_login_status().await {
                self.logged_in.store(true, Ordering::SeqCst);
                return true;
            }
            sleep_with_random_delay(interval, 1.1, interval + 2.0).await;
        }

        let logged_in = self.check_login_status().await;
        self.logged_in.store(logged_in, Ordering::SeqCst);
        logged_in
    }

    async fn load_state(&self) -> bool {
        if !self.session.load_state().await {
            return false;
        }
        let logged_in = self.check_login_status().await;
        self.logged_in.store(logged_in, Ordering::SeqCst);
        logged_in
    }

    async fn save_state(&self) -> bool {
        self.session.save_state().await
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn login_fields(&self) -> Vec<LoginField> {
        vec![
            LoginField {
                name: "cookies".to_string(),
                label: "Cookie".to_string(),
                kind: LoginFieldKind::Cookie,
                required: false,
                default: String::new(),
                placeholder: "ews_key=...; ews_token=...".to_string(),
                description: "从已登录的浏览器会话复制的 Cookie".to_string(),
            },
            LoginField {
                name: "username".to_string(),
                label: "邮箱".to_string(),
                kind: LoginFieldKind::Text,
                required: true,
                default: String::new(),
                placeholder: "email".to_string(),
                description: "登录邮箱".to_string(),
            },
            LoginField {
                name: "password".to_string(),
                label: "密码".to_string(),
                kind: LoginFieldKind::Password,
                required: true,
                default: String::new(),
                placeholder: "password".to_string(),
                description: "登录密码".to_string(),
            },
        ]
    }

    /// The member bookcase page; only served to authenticated sessions.
    async fn get_bookcase(&self) -> Result<Vec<String>> {
        Ok(vec![self.session.fetch(BOOKCASE_URL).await?])
    }

    async fn get_book_info(&self, book_id: &str) -> Result<Vec<String>> {
        let url = Self::book_info_url(book_id);
        Ok(vec![self.session.fetch(&url).await?])
    }

    async fn get_book_chapter(&self, book_id: &str, chapter_id: &str) -> Result<Vec<String>> {
        let url = Self::chapter_url(book_id, chapter_id);
        Ok(vec![self.session.fetch(&url).await?])
    }
}
