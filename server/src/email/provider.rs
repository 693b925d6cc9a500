use async_trait::async_trait;

use crate::error::IngestResult;

use super::mime::RawMimePart;

/// Access token handed to the provider on every call.
#[derive(Clone)]
pub struct Credentials {
    pub access_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub message_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// A message as returned by the provider, before normalization.
#[derive(Debug, Clone, Default)]
pub struct ProviderMessage {
    pub id: String,
    pub thread_id: String,
    pub headers: Vec<(String, String)>,
    pub payload: RawMimePart,
    pub label_ids: Vec<String>,
    /// Epoch milliseconds, as a string
    pub internal_date: Option<String>,
    pub snippet: Option<String>,
}

#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn list(
        &self,
        credentials: &Credentials,
        label_filter: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> IngestResult<MessagePage>;

    async fn get(&self, credentials: &Credentials, message_id: &str)
        -> IngestResult<ProviderMessage>;
}
