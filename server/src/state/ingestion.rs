//! Fetch → normalize → dedup → classify → persist, one page of message ids at
//! a time.
//!
//! Convergence under overlapping runs rests entirely on the storage unique
//! index over `(user_id, provider_message_id)`: whoever loses the insert race
//! gets a duplicate-key error, which counts as success here.

use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use chrono::Utc;
use derive_more::derive::Display;
use entity::email_record::LabelSet;
use lib_email_clients::gmail::system_labels::{self, has_label};

use crate::{
    db_core::prelude::*,
    email::{
        mime::{self, NormalizedMessage},
        provider::{Credentials, MailProvider, MessagePage, ProviderMessage},
        rules::{Action, UserRules},
    },
    error::{IngestError, IngestResult},
    model::{
        classification_rule::RuleSource,
        email_record::{EmailStore, NewEmailRecord, StatusUpdate},
        user::{MailAccount, UserDirectory},
    },
};

/// Storage policy for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum IngestMode {
    /// A user is looking at the inbox: keep full bodies and return the page.
    Interactive,
    /// Scheduled sync: metadata only, report a count.
    Background,
}

#[derive(Debug)]
pub enum IngestOutcome {
    Page {
        records: Vec<email_record::Model>,
        next_page_token: Option<String>,
    },
    Count(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[display("created: {created}, updated: {updated}, duplicates: {duplicates}, failed: {failed}")]
pub struct IngestStats {
    pub created: usize,
    pub updated: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl IngestStats {
    /// Items that ended up tracked, whoever created them
    pub fn ingested(&self) -> usize {
        self.created + self.updated + self.duplicates
    }

    fn record(&mut self, outcome: &IngestResult<ItemOutcome>) {
        match outcome {
            Ok(ItemOutcome::Created) => self.created += 1,
            Ok(ItemOutcome::Updated) => self.updated += 1,
            Ok(ItemOutcome::Duplicate) => self.duplicates += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: IngestStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Created,
    Updated,
    Duplicate,
}

/// Per-run state resolved once before the item loop
struct RunContext<'a> {
    user: &'a MailAccount,
    credentials: Credentials,
    rules: UserRules,
    mode: IngestMode,
}

#[derive(Clone)]
pub struct IngestionCoordinator {
    provider: Arc<dyn MailProvider>,
    store: Arc<dyn EmailStore>,
    rules: Arc<dyn RuleSource>,
    users: Arc<dyn UserDirectory>,
    item_timeout: Duration,
}

impl IngestionCoordinator {
    pub fn new(
        provider: Arc<dyn MailProvider>,
        store: Arc<dyn EmailStore>,
        rules: Arc<dyn RuleSource>,
        users: Arc<dyn UserDirectory>,
        item_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            rules,
            users,
            item_timeout,
        }
    }

    pub fn users(&self) -> &Arc<dyn UserDirectory> {
        &self.users
    }

    pub fn store(&self) -> &Arc<dyn EmailStore> {
        &self.store
    }

    /// Ingests one page of `label_filter`. Failed items are logged and left out;
    /// only listing failures and missing credentials or rules fail the call.
    pub async fn ingest_page(
        &self,
        user: &MailAccount,
        label_filter: &str,
        page_size: u32,
        page_token: Option<String>,
        mode: IngestMode,
    ) -> IngestResult<IngestOutcome> {
        let ctx = self.prepare_run(user, mode).await?;
        let (stats, page) = self
            .run_page(&ctx, label_filter, page_size, page_token)
            .await?;

        tracing::info!(
            "{} ingestion for {} finished page ({})",
            mode,
            user.email,
            stats
        );

        match mode {
            IngestMode::Interactive => {
                let records = self
                    .store
                    .find_page(user.id, &page.message_ids, page_size as u64)
                    .await?;
                Ok(IngestOutcome::Page {
                    records,
                    next_page_token: page.next_page_token,
                })
            }
            IngestMode::Background => Ok(IngestOutcome::Count(stats.ingested())),
        }
    }

    /// Follows continuation tokens for up to `max_pages` pages.
    pub async fn ingest_all(
        &self,
        user: &MailAccount,
        label_filter: &str,
        page_size: u32,
        max_pages: u32,
        mode: IngestMode,
    ) -> IngestResult<IngestStats> {
        let ctx = self.prepare_run(user, mode).await?;
        let mut total = IngestStats::default();
        let mut page_token = None;

        for _ in 0..max_pages.max(1) {
            let (stats, page) = self
                .run_page(&ctx, label_filter, page_size, page_token)
                .await?;
            total.merge(stats);

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        tracing::info!("{} ingestion for {} done ({})", mode, user.email, total);

        Ok(total)
    }

    /// Fills in the body of a record stored without one, e.g. by a background
    /// sync. Returns `None` when the message is not tracked.
    pub async fn hydrate_body(
        &self,
        user: &MailAccount,
        provider_message_id: &str,
    ) -> IngestResult<Option<email_record::Model>> {
        let Some(existing) = self.store.find(user.id, provider_message_id).await? else {
            return Ok(None);
        };
        if existing.plain_body.as_deref().is_some_and(|b| !b.is_empty()) {
            return Ok(Some(existing));
        }

        let credentials = self.users.credentials(user).await?;
        let message = self.fetch(&credentials, provider_message_id).await?;
        let normalized = mime::normalize(&message);

        let updated = self
            .store
            .set_body(
                existing.id,
                normalized.plain_body,
                non_empty(normalized.html_body),
            )
            .await?;

        Ok(Some(updated))
    }

    async fn prepare_run<'a>(
        &self,
        user: &'a MailAccount,
        mode: IngestMode,
    ) -> IngestResult<RunContext<'a>> {
        let credentials = self.users.credentials(user).await?;
        let rules = self.rules.active_rules(user.id).await?;

        Ok(RunContext {
            user,
            credentials,
            rules,
            mode,
        })
    }

    async fn run_page(
        &self,
        ctx: &RunContext<'_>,
        label_filter: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> IngestResult<(IngestStats, MessagePage)> {
        let page = self
            .provider
            .list(&ctx.credentials, label_filter, page_size, page_token)
            .await?;

        let mut stats = IngestStats::default();
        for message_id in &page.message_ids {
            let outcome = self.ingest_item(ctx, message_id).await;
            if let Err(e) = &outcome {
                tracing::error!(
                    "Failed to ingest message {} for {}: {}",
                    message_id,
                    ctx.user.email,
                    e
                );
            }
            stats.record(&outcome);
        }

        Ok((stats, page))
    }

    async fn ingest_item(&self, ctx: &RunContext<'_>, message_id: &str) -> IngestResult<ItemOutcome> {
        let existing = self.store.find(ctx.user.id, message_id).await?;
        let message = self.fetch(&ctx.credentials, message_id).await?;

        if let Some(existing) = existing {
            // Tracked already: refresh status only, classification and content stay as first written
            self.store
                .update_status(existing.id, status_update(&message, existing.rule_label.as_deref()))
                .await?;
            return Ok(ItemOutcome::Updated);
        }

        let normalized = mime::normalize(&message);
        let action = ctx.rules.classify(&normalized);
        let record = build_record(ctx.user.id, normalized, action, ctx.mode);

        match self.store.create(record).await {
            Ok(_) => Ok(ItemOutcome::Created),
            Err(IngestError::DuplicateKey(_)) => {
                tracing::debug!(
                    "Message {} for {} was created by a concurrent run",
                    message_id,
                    ctx.user.email
                );
                Ok(ItemOutcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch(&self, credentials: &Credentials, message_id: &str) -> IngestResult<ProviderMessage> {
        tokio::time::timeout(self.item_timeout, self.provider.get(credentials, message_id))
            .await
            .map_err(|_| {
                IngestError::TransientProvider(anyhow!(
                    "Timed out after {:?} fetching message {}",
                    self.item_timeout,
                    message_id
                ))
            })?
    }
}

fn status_update(message: &ProviderMessage, rule_label: Option<&str>) -> StatusUpdate {
    let labels = &message.label_ids;
    StatusUpdate {
        labels: LabelSet::merged(labels, rule_label),
        is_read: !has_label(labels, system_labels::UNREAD),
        is_starred: has_label(labels, system_labels::STARRED),
    }
}

fn build_record(
    user_id: i32,
    message: NormalizedMessage,
    action: Action,
    mode: IngestMode,
) -> NewEmailRecord {
    let snippet = match mode {
        IngestMode::Interactive => message.snippet_or_body_prefix(),
        IngestMode::Background => message.snippet.clone(),
    };
    let (plain_body, html_body) = match mode {
        IngestMode::Interactive => (Some(message.plain_body), non_empty(message.html_body)),
        IngestMode::Background => (None, None),
    };

    NewEmailRecord {
        user_id,
        provider_message_id: message.id,
        thread_id: message.thread_id,
        from: message.from,
        to: message.to,
        cc: message.cc,
        bcc: message.bcc,
        subject: message.subject,
        date: message.date,
        plain_body,
        html_body,
        snippet,
        is_read: message.is_read,
        is_starred: message.is_starred,
        is_important: message.is_important,
        is_sent: message.is_sent,
        priority: action.priority.unwrap_or(Priority::Medium),
        category: action.category,
        labels: message.label_ids,
        rule_label: action.label,
        created_at: Utc::now(),
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
