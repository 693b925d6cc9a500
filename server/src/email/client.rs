extern crate google_gmail1 as gmail1;

use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use gmail1::api::{ListMessagesResponse, Message, MessagePart};
use leaky_bucket::RateLimiter;
use lib_email_clients::gmail::api_quota::{GMAIL_API_QUOTA, GMAIL_QUOTA_PER_SECOND};
use reqwest::{StatusCode, Url};

use crate::{
    error::{IngestError, IngestResult},
    HttpClient,
};

use super::{
    mime::RawMimePart,
    provider::{Credentials, MailProvider, MessagePage, ProviderMessage},
};

/// Gmail REST client. One instance serves every user; the access token is
/// supplied per call.
#[derive(Clone)]
pub struct GmailClient {
    http_client: HttpClient,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
}

impl GmailClient {
    pub fn new(http_client: HttpClient, base_url: &str) -> Self {
        let rate_limiter = Arc::new(
            RateLimiter::builder()
                .initial(GMAIL_QUOTA_PER_SECOND)
                .interval(Duration::from_secs(1))
                .refill(GMAIL_QUOTA_PER_SECOND)
                .max(GMAIL_QUOTA_PER_SECOND)
                .build(),
        );

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// `messages/{id}` with the id percent-encoded as a single path segment.
    fn message_url(&self, message_id: &str) -> IngestResult<Url> {
        let invalid_base = || {
            IngestError::Configuration(format!("Invalid Gmail base url {}", self.base_url))
        };
        let mut url = Url::parse(&self.url("messages")).map_err(|_| invalid_base())?;
        url.path_segments_mut()
            .map_err(|_| invalid_base())?
            .push(message_id);
        Ok(url)
    }
}

/// Auth failures mean the stored credentials are unusable, which is a
/// configuration problem for that user rather than something a retry fixes.
fn error_for_status(status: StatusCode, body: String) -> IngestError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            IngestError::Configuration(format!("Gmail rejected credentials ({status}): {body}"))
        }
        _ => IngestError::TransientProvider(anyhow!("Gmail request failed ({status}): {body}")),
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> IngestResult<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(error_for_status(status, body));
    }
    Ok(resp.json::<T>().await?)
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list(
        &self,
        credentials: &Credentials,
        label_filter: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> IngestResult<MessagePage> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_list)
            .await;

        let mut query = vec![("maxResults".to_string(), page_size.to_string())];
        if !label_filter.is_empty() {
            query.push(("labelIds".to_string(), label_filter.to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken".to_string(), token));
        }

        let resp = self
            .http_client
            .get(self.url("messages"))
            .query(&query)
            .bearer_auth(&credentials.access_token)
            .send()
            .await?;

        let data = read_json::<ListMessagesResponse>(resp).await?;

        Ok(MessagePage {
            message_ids: data
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|m| m.id)
                .collect(),
            next_page_token: data.next_page_token,
        })
    }

    async fn get(
        &self,
        credentials: &Credentials,
        message_id: &str,
    ) -> IngestResult<ProviderMessage> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_get)
            .await;

        let resp = self
            .http_client
            .get(self.message_url(message_id)?)
            .query(&[("format", "full")])
            .bearer_auth(&credentials.access_token)
            .send()
            .await?;

        let message = read_json::<Message>(resp).await?;
        provider_message_from_gmail(message)
    }
}

pub fn provider_message_from_gmail(msg: Message) -> IngestResult<ProviderMessage> {
    let id = msg
        .id
        .ok_or_else(|| IngestError::Validation("Gmail message missing id".to_string()))?;
    let payload = msg.payload.unwrap_or_default();
    let headers = payload
        .headers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|h| Some((h.name?, h.value.unwrap_or_default())))
        .collect();

    Ok(ProviderMessage {
        thread_id: msg.thread_id.unwrap_or_else(|| id.clone()),
        id,
        headers,
        payload: mime_part_from_gmail(payload),
        label_ids: msg.label_ids.unwrap_or_default(),
        internal_date: msg.internal_date.map(|d| d.to_string()),
        snippet: msg.snippet,
    })
}

/// The gmail1 types already hold base64url-decoded body bytes.
fn mime_part_from_gmail(part: MessagePart) -> RawMimePart {
    RawMimePart {
        mime_type: part.mime_type.unwrap_or_default(),
        body: part.body.and_then(|b| b.data),
        parts: part
            .parts
            .unwrap_or_default()
            .into_iter()
            .map(mime_part_from_gmail)
            .collect(),
    }
}
