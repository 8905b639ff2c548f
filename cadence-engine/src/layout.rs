//! Unsubscribe links and the footer appended to every outgoing email.

use serde::{Deserialize, Serialize};

/// Public URLs embedded in outgoing mail.
///
/// ```ron
/// links: (app_url: "https://example.org"),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default = "default_app_url")]
    pub app_url: String,
}

fn default_app_url() -> String {
    String::from("http://localhost:3000")
}

impl Default for Links {
    fn default() -> Self {
        Self {
            app_url: default_app_url(),
        }
    }
}

impl Links {
    pub fn new(app_url: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into(),
        }
    }

    fn base(&self) -> &str {
        self.app_url.trim_end_matches('/')
    }

    /// Generic unsubscribe page used by drip emails
    #[must_use]
    pub fn unsubscribe(&self) -> String {
        format!("{}/unsubscribe", self.base())
    }

    /// One-click unsubscribe carrying the subscriber's token
    #[must_use]
    pub fn unsubscribe_with_token(&self, token: &str) -> String {
        format!("{}/unsubscribe?token={token}", self.base())
    }
}

/// `html` followed by the standard footer pointing at `unsubscribe_url`
#[must_use]
pub fn with_footer(html: &str, unsubscribe_url: &str) -> String {
    format!(
        "{html}\n<hr style=\"margin-top:32px;border:none;border-top:1px solid #e5e5e5\" />\n\
         <p style=\"font-size:12px;color:#888\">You are receiving this email because you \
         signed up with us. <a href=\"{unsubscribe_url}\">Unsubscribe</a></p>"
    )
}

/// Escape `text` for inclusion in HTML element content or attributes
#[must_use]
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
