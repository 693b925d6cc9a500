use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entity::email_record::{AddressList, LabelSet, ReplySuggestion, ReplySuggestions};
use sea_orm::{
    sea_query::{Alias, Expr, Func},
    Condition,
};

use crate::{
    db_core::prelude::*,
    error::{IngestError, IngestResult},
};

/// Everything needed to insert a freshly classified message.
#[derive(Debug, Clone, Default)]
pub struct NewEmailRecord {
    pub user_id: i32,
    pub provider_message_id: String,
    pub thread_id: String,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub plain_body: Option<String>,
    pub html_body: Option<String>,
    pub snippet: Option<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_important: bool,
    pub is_sent: bool,
    pub priority: Priority,
    pub category: Option<String>,
    pub labels: Vec<String>,
    pub rule_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewEmailRecord {
    fn validate(&self) -> IngestResult<()> {
        if self.provider_message_id.is_empty() {
            return Err(IngestError::Validation(
                "provider_message_id is required".to_string(),
            ));
        }
        if self.thread_id.is_empty() {
            return Err(IngestError::Validation(format!(
                "thread_id is required for message {}",
                self.provider_message_id
            )));
        }
        Ok(())
    }

    fn into_active_model(self) -> email_record::ActiveModel {
        let created_at: DateTimeWithTimeZone = self.created_at.into();
        let labels = LabelSet::merged(&self.labels, self.rule_label.as_deref());

        email_record::ActiveModel {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(self.user_id),
            provider_message_id: ActiveValue::Set(self.provider_message_id),
            thread_id: ActiveValue::Set(self.thread_id),
            from_address: ActiveValue::Set(self.from),
            to_addresses: ActiveValue::Set(AddressList(self.to)),
            cc_addresses: ActiveValue::Set(AddressList(self.cc)),
            bcc_addresses: ActiveValue::Set(AddressList(self.bcc)),
            subject: ActiveValue::Set(self.subject),
            date: ActiveValue::Set(self.date.into()),
            plain_body: ActiveValue::Set(self.plain_body),
            html_body: ActiveValue::Set(self.html_body),
            snippet: ActiveValue::Set(self.snippet),
            is_read: ActiveValue::Set(self.is_read),
            is_starred: ActiveValue::Set(self.is_starred),
            is_important: ActiveValue::Set(self.is_important),
            is_sent: ActiveValue::Set(self.is_sent),
            priority: ActiveValue::Set(self.priority),
            category: ActiveValue::Set(self.category),
            labels: ActiveValue::Set(labels),
            rule_label: ActiveValue::Set(self.rule_label),
            summary: ActiveValue::Set(None),
            suggestions: ActiveValue::Set(ReplySuggestions::default()),
            created_at: ActiveValue::Set(created_at),
            updated_at: ActiveValue::Set(created_at),
        }
    }
}

/// Fields refreshed when an already tracked message is seen again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub labels: LabelSet,
    pub is_read: bool,
    pub is_starred: bool,
}

#[async_trait]
pub trait EmailStore: Send + Sync {
    async fn find(
        &self,
        user_id: i32,
        provider_message_id: &str,
    ) -> IngestResult<Option<email_record::Model>>;

    /// Fails with [`IngestError::DuplicateKey`] when the record already exists.
    async fn create(&self, record: NewEmailRecord) -> IngestResult<email_record::Model>;

    async fn update_status(&self, id: i32, status: StatusUpdate) -> IngestResult<()>;

    /// Records for the given ids, newest message first.
    async fn find_page(
        &self,
        user_id: i32,
        provider_message_ids: &[String],
        limit: u64,
    ) -> IngestResult<Vec<email_record::Model>>;

    async fn set_body(
        &self,
        id: i32,
        plain_body: String,
        html_body: Option<String>,
    ) -> IngestResult<email_record::Model>;

    /// Deletes records created before `cutoff` that carry no summary and no
    /// reply suggestions. Returns the number removed.
    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> IngestResult<u64>;

    async fn set_summary(
        &self,
        user_id: i32,
        provider_message_id: &str,
        summary: String,
    ) -> IngestResult<Option<email_record::Model>>;

    async fn push_suggestion(
        &self,
        user_id: i32,
        provider_message_id: &str,
        suggestion: ReplySuggestion,
    ) -> IngestResult<Option<email_record::Model>>;
}

pub struct EmailRecordCtrl;

impl EmailRecordCtrl {
    pub async fn get_by_message_id(
        conn: &DatabaseConnection,
        user_id: i32,
        provider_message_id: &str,
    ) -> Result<Option<email_record::Model>, DbErr> {
        EmailRecord::find()
            .filter(email_record::Column::UserId.eq(user_id))
            .filter(email_record::Column::ProviderMessageId.eq(provider_message_id))
            .one(conn)
            .await
    }

    pub async fn insert(
        conn: &DatabaseConnection,
        record: NewEmailRecord,
    ) -> IngestResult<email_record::Model> {
        record.validate()?;
        let model = record.into_active_model().insert(conn).await?;
        Ok(model)
    }

    pub async fn update_status(
        conn: &DatabaseConnection,
        id: i32,
        status: StatusUpdate,
    ) -> Result<(), DbErr> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        EmailRecord::update_many()
            .col_expr(email_record::Column::Labels, Expr::value(status.labels))
            .col_expr(email_record::Column::IsRead, Expr::value(status.is_read))
            .col_expr(email_record::Column::IsStarred, Expr::value(status.is_starred))
            .col_expr(email_record::Column::UpdatedAt, Expr::value(now))
            .filter(email_record::Column::Id.eq(id))
            .exec(conn)
            .await?;

        Ok(())
    }

    pub async fn get_page(
        conn: &DatabaseConnection,
        user_id: i32,
        provider_message_ids: &[String],
        limit: u64,
    ) -> Result<Vec<email_record::Model>, DbErr> {
        if provider_message_ids.is_empty() {
            return Ok(Vec::new());
        }

        EmailRecord::find()
            .filter(email_record::Column::UserId.eq(user_id))
            .filter(email_record::Column::ProviderMessageId.is_in(provider_message_ids.to_vec()))
            .order_by_desc(email_record::Column::Date)
            .order_by_desc(email_record::Column::Id)
            .limit(limit)
            .all(conn)
            .await
    }

    pub async fn set_body(
        conn: &DatabaseConnection,
        id: i32,
        plain_body: String,
        html_body: Option<String>,
    ) -> Result<email_record::Model, DbErr> {
        email_record::ActiveModel {
            id: ActiveValue::Unchanged(id),
            plain_body: ActiveValue::Set(Some(plain_body)),
            html_body: ActiveValue::Set(html_body),
            updated_at: ActiveValue::Set(Utc::now().into()),
            ..Default::default()
        }
        .update(conn)
        .await
    }

    /// One statement, every exemption checked in SQL, so the row count is
    /// unbounded and a summary or draft written meanwhile keeps its record.
    pub async fn delete_expired(
        conn: &DatabaseConnection,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let cutoff: DateTimeWithTimeZone = cutoff.into();
        let no_summary = Condition::any()
            .add(email_record::Column::Summary.is_null())
            .add(email_record::Column::Summary.eq(""));
        let no_suggestions = Expr::expr(Func::cast_as(
            Expr::col(email_record::Column::Suggestions),
            Alias::new("text"),
        ))
        .eq("[]");

        let result = EmailRecord::delete_many()
            .filter(email_record::Column::CreatedAt.lt(cutoff))
            .filter(no_summary)
            .filter(no_suggestions)
            .exec(conn)
            .await?;

        Ok(result.rows_affected)
    }

    pub async fn set_summary(
        conn: &DatabaseConnection,
        user_id: i32,
        provider_message_id: &str,
        summary: String,
    ) -> Result<Option<email_record::Model>, DbErr> {
        let Some(existing) = Self::get_by_message_id(conn, user_id, provider_message_id).await?
        else {
            return Ok(None);
        };

        let updated = email_record::ActiveModel {
            id: ActiveValue::Unchanged(existing.id),
            summary: ActiveValue::Set(Some(summary)),
            updated_at: ActiveValue::Set(Utc::now().into()),
            ..Default::default()
        }
        .update(conn)
        .await?;

        Ok(Some(updated))
    }

    pub async fn push_suggestion(
        conn: &DatabaseConnection,
        user_id: i32,
        provider_message_id: &str,
        suggestion: ReplySuggestion,
    ) -> Result<Option<email_record::Model>, DbErr> {
        let Some(existing) = Self::get_by_message_id(conn, user_id, provider_message_id).await?
        else {
            return Ok(None);
        };

        let mut suggestions = existing.suggestions.clone();
        suggestions.0.push(suggestion);

        let updated = email_record::ActiveModel {
            id: ActiveValue::Unchanged(existing.id),
            suggestions: ActiveValue::Set(suggestions),
            updated_at: ActiveValue::Set(Utc::now().into()),
            ..Default::default()
        }
        .update(conn)
        .await?;

        Ok(Some(updated))
    }
}

#[async_trait]
impl EmailStore for DatabaseConnection {
    async fn find(
        &self,
        user_id: i32,
        provider_message_id: &str,
    ) -> IngestResult<Option<email_record::Model>> {
        Ok(EmailRecordCtrl::get_by_message_id(self, user_id, provider_message_id).await?)
    }

    async fn create(&self, record: NewEmailRecord) -> IngestResult<email_record::Model> {
        EmailRecordCtrl::insert(self, record).await
    }

    async fn update_status(&self, id: i32, status: StatusUpdate) -> IngestResult<()> {
        Ok(EmailRecordCtrl::update_status(self, id, status).await?)
    }

    async fn find_page(
        &self,
        user_id: i32,
        provider_message_ids: &[String],
        limit: u64,
    ) -> IngestResult<Vec<email_record::Model>> {
        Ok(EmailRecordCtrl::get_page(self, user_id, provider_message_ids, limit).await?)
    }

    async fn set_body(
        &self,
        id: i32,
        plain_body: String,
        html_body: Option<String>,
    ) -> IngestResult<email_record::Model> {
        Ok(EmailRecordCtrl::set_body(self, id, plain_body, html_body).await?)
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> IngestResult<u64> {
        Ok(EmailRecordCtrl::delete_expired(self, cutoff).await?)
    }

    async fn set_summary(
        &self,
        user_id: i32,
        provider_message_id: &str,
        summary: String,
    ) -> IngestResult<Option<email_record::Model>> {
        Ok(EmailRecordCtrl::set_summary(self, user_id, provider_message_id, summary).await?)
    }

    async fn push_suggestion(
        &self,
        user_id: i32,
        provider_message_id: &str,
        suggestion: ReplySuggestion,
    ) -> IngestResult<Option<email_record::Model>> {
        Ok(
            EmailRecordCtrl::push_suggestion(self, user_id, provider_message_id, suggestion)
                .await?,
        )
    }
}
