//! End-of-cycle notifications.
//!
//! The message is HTML as understood by the Telegram bot API.  Sends are
//! never retried; a failed send is logged and the next cycle carries on.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::NotifyError;

const TELEGRAM_API: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY: usize = 1024;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// A container name with a short identity (updated) or reason (failed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyEntry {
    pub name: String,
    pub info: String,
}

impl NotifyEntry {
    pub fn new(name: impl Into<String>, info: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            info: info.into(),
        }
    }
}

pub fn build_message(updated: &[NotifyEntry], failed: &[NotifyEntry]) -> String {
    let mut msg = String::from("<b>Up-to-date</b>");
    if !updated.is_empty() {
        msg.push_str("\n\n✅ Updated:\n");
        for entry in updated {
            write_name(&mut msg, &entry.name);
            let info = entry.info.trim();
            if !info.is_empty() {
                let _ = write!(msg, " – <code>{}</code>", escape_html(info));
            }
        }
    }
    if !failed.is_empty() {
        msg.push_str("\n\n❌ Failed:\n");
        for (i, entry) in failed.iter().enumerate() {
            if i > 0 {
                msg.push('\n');
            }
            write_name(&mut msg, &entry.name);
            let info = entry.info.trim();
            if !info.is_empty() {
                let _ = write!(msg, "\n<pre>{}</pre>", escape_html(info));
            }
        }
    }
    msg
}

fn write_name(msg: &mut String, name: &str) {
    let name = if name.is_empty() { "<noname>" } else { name };
    let _ = write!(msg, "\n• <code>{}</code>", escape_html(name));
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Sends through a Telegram bot.
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        Self::with_base_url(TELEGRAM_API, token, chat_id)
    }

    pub fn with_base_url(base_url: &str, token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        let chat_id = chat_id.trim();
        if chat_id.is_empty() {
            return Err(NotifyError::MissingChatId);
        }
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                base_url.trim_end_matches('/'),
                token.trim()
            ),
            chat_id: chat_id.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        let resp = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        let mut end = body.len().min(MAX_ERROR_BODY);
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        Err(NotifyError::Status {
            status: status.as_u16(),
            body: body[..end].trim().to_string(),
        })
    }
}
