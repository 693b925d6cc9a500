use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entity::classification_rule::{RuleCondition, RuleConditions};
use sea_orm::{ConnectOptions, Database};

use crate::{
    db_core::{create_schema, prelude::*},
    email::{
        mime::RawMimePart,
        provider::{Credentials, MailProvider, MessagePage, ProviderMessage},
    },
    error::{IngestError, IngestResult},
    model::{email_record::NewEmailRecord, user::MailAccount},
    state::ingestion::IngestionCoordinator,
};

/// Fresh in-memory database with the full schema. A single pooled connection
/// keeps every query on the same SQLite memory instance.
pub async fn setup_db() -> DatabaseConnection {
    let mut db_options = ConnectOptions::new("sqlite::memory:");
    db_options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let conn = Database::connect(db_options)
        .await
        .expect("Database connection failed");
    create_schema(&conn).await.expect("Schema creation failed");
    conn
}

pub fn new_record(user_id: i32, provider_message_id: &str) -> NewEmailRecord {
    let now = Utc::now();
    NewEmailRecord {
        user_id,
        provider_message_id: provider_message_id.to_string(),
        thread_id: format!("thread-{provider_message_id}"),
        from: "sender@example.com".to_string(),
        to: vec!["me@example.com".to_string()],
        subject: format!("Subject {provider_message_id}"),
        date: DateTime::from_timestamp(now.timestamp(), 0).unwrap(),
        created_at: now,
        ..Default::default()
    }
}

pub async fn insert_user(
    conn: &DatabaseConnection,
    email: &str,
    access_token: Option<&str>,
    is_active: bool,
) -> MailAccount {
    mail_user::ActiveModel {
        id: ActiveValue::NotSet,
        email: ActiveValue::Set(email.to_string()),
        access_token: ActiveValue::Set(access_token.map(str::to_string)),
        is_active: ActiveValue::Set(is_active),
        created_at: ActiveValue::Set(Utc::now().into()),
    }
    .insert(conn)
    .await
    .expect("Failed to insert user")
    .into()
}

pub async fn insert_rule(
    conn: &DatabaseConnection,
    user_id: i32,
    name: &str,
    position: i32,
    conditions: Vec<RuleCondition>,
    priority: Option<Priority>,
    is_active: bool,
) -> classification_rule::Model {
    let now: DateTimeWithTimeZone = Utc::now().into();
    classification_rule::ActiveModel {
        id: ActiveValue::NotSet,
        user_id: ActiveValue::Set(user_id),
        name: ActiveValue::Set(name.to_string()),
        position: ActiveValue::Set(position),
        conditions: ActiveValue::Set(RuleConditions(conditions)),
        action_label: ActiveValue::Set(None),
        action_priority: ActiveValue::Set(priority),
        action_category: ActiveValue::Set(None),
        is_active: ActiveValue::Set(is_active),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    }
    .insert(conn)
    .await
    .expect("Failed to insert rule")
}

fn alternative_body(body: &str) -> RawMimePart {
    RawMimePart::container(
        "multipart/alternative",
        vec![
            RawMimePart::leaf("text/plain", body),
            RawMimePart::leaf("text/html", format!("<p>{body}</p>")),
        ],
    )
}

/// A Gmail-shaped message with a plain/html alternative body. The date is
/// assigned when the message is added to a [`FakeProvider`].
pub fn gmail_message(
    id: &str,
    from: &str,
    subject: &str,
    body: &str,
    labels: &[&str],
) -> ProviderMessage {
    ProviderMessage {
        id: id.to_string(),
        thread_id: format!("thread-{id}"),
        headers: vec![
            ("From".to_string(), from.to_string()),
            ("To".to_string(), "me@example.com".to_string()),
            ("Subject".to_string(), subject.to_string()),
        ],
        payload: alternative_body(body),
        label_ids: labels.iter().map(|l| l.to_string()).collect(),
        internal_date: None,
        snippet: None,
    }
}

#[derive(Default)]
struct Mailbox {
    messages: Vec<ProviderMessage>,
    failing: HashSet<String>,
    slow: HashSet<String>,
    get_calls: usize,
}

/// Scripted mailbox. Page tokens are list offsets.
#[derive(Clone, Default)]
pub struct FakeProvider {
    mailbox: Arc<Mutex<Mailbox>>,
}

impl FakeProvider {
    /// Each message added is one minute newer than the previous one.
    pub fn add_message(&self, mut message: ProviderMessage) {
        let mut mailbox = self.mailbox.lock().unwrap();
        if message.internal_date.is_none() {
            let millis = 1_700_000_000_000i64 + mailbox.messages.len() as i64 * 60_000;
            message.internal_date = Some(millis.to_string());
        }
        mailbox.messages.push(message);
    }

    pub fn fail_on(&self, id: &str) {
        self.mailbox.lock().unwrap().failing.insert(id.to_string());
    }

    /// Fetches of `id` hang well past any test timeout.
    pub fn slow_on(&self, id: &str) {
        self.mailbox.lock().unwrap().slow.insert(id.to_string());
    }

    pub fn set_labels(&self, id: &str, labels: &[&str]) {
        self.with_message(id, |m| {
            m.label_ids = labels.iter().map(|l| l.to_string()).collect();
        });
    }

    pub fn set_body(&self, id: &str, body: &str) {
        self.with_message(id, |m| m.payload = alternative_body(body));
    }

    pub fn get_calls(&self) -> usize {
        self.mailbox.lock().unwrap().get_calls
    }

    fn with_message(&self, id: &str, f: impl FnOnce(&mut ProviderMessage)) {
        let mut mailbox = self.mailbox.lock().unwrap();
        let message = mailbox
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .expect("unknown fake message");
        f(message);
    }
}

#[async_trait]
impl MailProvider for FakeProvider {
    async fn list(
        &self,
        _credentials: &Credentials,
        label_filter: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> IngestResult<MessagePage> {
        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| IngestError::TransientProvider(anyhow!("bad page token {token}")))?,
            None => 0,
        };

        let mailbox = self.mailbox.lock().unwrap();
        let matching: Vec<_> = mailbox
            .messages
            .iter()
            .filter(|m| label_filter.is_empty() || m.label_ids.iter().any(|l| l == label_filter))
            .map(|m| m.id.clone())
            .collect();

        let end = (offset + page_size as usize).min(matching.len());
        let message_ids = matching.get(offset..end).unwrap_or_default().to_vec();
        let next_page_token = (end < matching.len()).then(|| end.to_string());

        Ok(MessagePage {
            message_ids,
            next_page_token,
        })
    }

    async fn get(
        &self,
        _credentials: &Credentials,
        message_id: &str,
    ) -> IngestResult<ProviderMessage> {
        let (message, slow) = {
            let mut mailbox = self.mailbox.lock().unwrap();
            mailbox.get_calls += 1;
            if mailbox.failing.contains(message_id) {
                return Err(IngestError::TransientProvider(anyhow!(
                    "scripted failure for {message_id}"
                )));
            }
            let message = mailbox.messages.iter().find(|m| m.id == message_id).cloned();
            (message, mailbox.slow.contains(message_id))
        };

        if slow {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }

        message.ok_or_else(|| IngestError::TransientProvider(anyhow!("no message {message_id}")))
    }
}

/// Coordinator over the database for storage, users and rules, with a short
/// per-item timeout.
pub fn coordinator(conn: &DatabaseConnection, provider: &FakeProvider) -> IngestionCoordinator {
    let conn = Arc::new(conn.clone());
    IngestionCoordinator::new(
        Arc::new(provider.clone()),
        conn.clone(),
        conn.clone(),
        conn,
        Duration::from_millis(200),
    )
}
