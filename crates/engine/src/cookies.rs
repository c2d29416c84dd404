//! Cookie normalization and the persisted session-state format.

use std::collections::HashMap;
use std::path::Path;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One cookie as persisted in a session state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieParam {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Epoch seconds, or `-1` for a session cookie.
    #[serde(default = "default_expires")]
    pub expires: i64,
    #[serde(rename = "httpOnly", default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(rename = "sameSite", default = "default_same_site")]
    pub same_site: String,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_expires() -> i64 {
    -1
}

fn default_same_site() -> String {
    "Lax".to_string()
}

impl CookieParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: default_path(),
            expires: default_expires(),
            http_only: false,
            secure: false,
            same_site: default_same_site(),
        }
    }
}

/// Contents of `state/<site>/session_state.cookies`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<CookieParam>,
    #[serde(default)]
    pub origins: Vec<Value>,
}

/// Parse cookies from a `key1=value1; key2=value2` header string into a
/// normalized map. Pairs without `=` are dropped.
pub fn resolve_cookies(cookies: &str) -> HashMap<String, String> {
    cookies
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Parse a cookie expiration into epoch seconds.
///
/// Accepts integer epoch seconds or an RFC-1123 date string; anything
/// unparseable becomes `-1` (session cookie).
pub fn parse_cookie_expires(value: Option<&str>) -> i64 {
    let Some(value) = value else { return -1 };
    let value = value.trim();
    if value.is_empty() {
        return -1;
    }
    if let Ok(epoch) = value.parse::<i64>() {
        return epoch;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return dt.timestamp();
    }
    -1
}

/// Look up a named cookie value across persisted state files, first match
/// wins. Unreadable files are skipped.
pub fn find_cookie_value(state_files: &[impl AsRef<Path>], key: &str) -> Option<String> {
    for file in state_files {
        let Ok(raw) = std::fs::read_to_string(file.as_ref()) else {
            continue;
        };
        let Ok(state) = serde_json::from_str::<StorageState>(&raw) else {
            continue;
        };
        if let Some(cookie) = state.cookies.into_iter().find(|c| c.name == key) {
            return Some(cookie.value);
        }
    }
    None
}

/// Parse one `Set-Cookie` response header into a [`CookieParam`].
pub fn parse_set_cookie(header: &str) -> Option<CookieParam> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let mut cookie = CookieParam::new(name, value.trim());

    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim().to_ascii_lowercase(), v.trim()),
            None => (attr.trim().to_ascii_lowercase(), ""),
        };
        match key.as_str() {
            "domain" => cookie.domain = val.to_string(),
            "path" => cookie.path = val.to_string(),
            "expires" => cookie.expires = parse_cookie_expires(Some(val)),
            "max-age" => {
                if let Ok(secs) = val.parse::<i64>() {
                    cookie.expires = chrono::Utc::now().timestamp() + secs;
                }
            }
            "httponly" => cookie.http_only = true,
            "secure" => cookie.secure = true,
            "samesite" => cookie.same_site = val.to_string(),
            _ => {}
        }
    }
    Some(cookie)
}
