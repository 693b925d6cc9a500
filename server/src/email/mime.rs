//! Normalizes a provider message (headers + recursive MIME part tree) into the
//! flat projection that classification and storage work with.
//!
//! Nothing in here fails: a tree missing the parts we look for yields empty
//! strings, and a missing or garbled timestamp yields the Unix epoch.

use chrono::{DateTime, Utc};
use lib_email_clients::gmail::system_labels::{self, has_label};
use regex::Regex;

use super::provider::ProviderMessage;

lazy_static::lazy_static!(
    static ref RE_HTML_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref RE_WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
);

const MIME_TEXT_PLAIN: &str = "text/plain";
const MIME_TEXT_HTML: &str = "text/html";
const SNIPPET_CHARS: usize = 200;

/// One node of a message's MIME tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMimePart {
    pub mime_type: String,
    /// Decoded body bytes, absent for containers and attachments fetched by reference
    pub body: Option<Vec<u8>>,
    pub parts: Vec<RawMimePart>,
}

impl RawMimePart {
    pub fn leaf(mime_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            body: Some(body.into()),
            parts: Vec::new(),
        }
    }

    pub fn container(mime_type: &str, parts: Vec<RawMimePart>) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            body: None,
            parts,
        }
    }

    fn payload(&self) -> Option<&[u8]> {
        self.body.as_deref().filter(|b| !b.is_empty())
    }

    fn is_type(&self, mime_type: &str) -> bool {
        self.mime_type.eq_ignore_ascii_case(mime_type)
    }

    /// Depth-first, pre-order search for the first part of `mime_type` that
    /// carries a payload.
    fn find_first(&self, mime_type: &str) -> Option<&RawMimePart> {
        if self.is_type(mime_type) && self.payload().is_some() {
            return Some(self);
        }
        self.parts.iter().find_map(|p| p.find_first(mime_type))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedMessage {
    pub id: String,
    pub thread_id: String,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
    pub snippet: Option<String>,
    pub label_ids: Vec<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_important: bool,
    pub is_sent: bool,
    pub is_draft: bool,
    pub is_trash: bool,
    pub date: DateTime<Utc>,
}

impl NormalizedMessage {
    /// Provider snippet, else the start of the plain body. Reads body text, so
    /// only for records that keep content.
    pub fn snippet_or_body_prefix(&self) -> Option<String> {
        self.snippet.clone().or_else(|| {
            let s: String = self.plain_body.chars().take(SNIPPET_CHARS).collect();
            (!s.is_empty()).then_some(s)
        })
    }
}

pub fn normalize(message: &ProviderMessage) -> NormalizedMessage {
    let headers = &message.headers;
    let plain_body = extract_plain_body(&message.payload);
    let html_body = extract_html_body(&message.payload);
    let labels = &message.label_ids;

    NormalizedMessage {
        id: message.id.clone(),
        thread_id: message.thread_id.clone(),
        from: header_value(headers, "From"),
        to: address_list(headers, "To"),
        cc: address_list(headers, "Cc"),
        bcc: address_list(headers, "Bcc"),
        subject: header_value(headers, "Subject"),
        plain_body,
        html_body,
        snippet: message.snippet.clone().filter(|s| !s.is_empty()),
        label_ids: labels.clone(),
        is_read: !has_label(labels, system_labels::UNREAD),
        is_starred: has_label(labels, system_labels::STARRED),
        is_important: has_label(labels, system_labels::IMPORTANT),
        is_sent: has_label(labels, system_labels::SENT),
        is_draft: has_label(labels, system_labels::DRAFT),
        is_trash: has_label(labels, system_labels::TRASH),
        date: parse_epoch_millis(message.internal_date.as_deref()),
    }
}

/// Case-insensitive header lookup; missing headers read as empty.
pub fn header_value(headers: &[(String, String)], name: &str) -> String {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
        .unwrap_or_default()
}

fn address_list(headers: &[(String, String)], name: &str) -> Vec<String> {
    header_value(headers, name)
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

/// Plain text body. Preference order: the root's own payload, the first
/// `text/plain` part anywhere in the tree, then the first `text/html` part
/// reduced to text.
pub fn extract_plain_body(root: &RawMimePart) -> String {
    if let Some(payload) = root.payload() {
        return decode_body_data(payload);
    }

    if let Some(part) = root.find_first(MIME_TEXT_PLAIN) {
        return part.payload().map(decode_body_data).unwrap_or_default();
    }

    root.find_first(MIME_TEXT_HTML)
        .and_then(RawMimePart::payload)
        .map(|p| html_to_text(&decode_body_data(p)))
        .unwrap_or_default()
}

pub fn extract_html_body(root: &RawMimePart) -> String {
    root.find_first(MIME_TEXT_HTML)
        .and_then(RawMimePart::payload)
        .map(decode_body_data)
        .unwrap_or_default()
}

fn html_to_text(html: &str) -> String {
    let text = RE_HTML_TAG.replace_all(html, "");
    RE_WHITESPACE_RUN.replace_all(&text, " ").trim().to_string()
}

fn decode_body_data(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Missing or invalid timestamps fall back to the epoch, not the current time.
fn parse_epoch_millis(value: Option<&str>) -> DateTime<Utc> {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default()
}
