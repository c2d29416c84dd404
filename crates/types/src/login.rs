//! Login field descriptors advertised by fetchers.

use serde::{Deserialize, Serialize};

/// Kind of input a login field expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginFieldKind {
    Text,
    Password,
    Cookie,
    /// The site only supports an interactive browser login; the UI should
    /// direct the user there and collect the resulting cookies.
    ManualLogin,
}

/// Description of one credential input a site's login flow accepts.
///
/// Fetchers expose these so an invoking UI can prompt without knowing the
/// site; the core itself only forwards the collected values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: LoginFieldKind,
    pub required: bool,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub description: String,
}
