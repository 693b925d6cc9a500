use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::Priority;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_record")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub provider_message_id: String,
    pub thread_id: String,
    pub from_address: String,
    #[sea_orm(column_type = "Json")]
    pub to_addresses: AddressList,
    #[sea_orm(column_type = "Json")]
    pub cc_addresses: AddressList,
    #[sea_orm(column_type = "Json")]
    pub bcc_addresses: AddressList,
    pub subject: String,
    pub date: DateTimeWithTimeZone,
    #[sea_orm(column_type = "Text", nullable)]
    pub plain_body: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub html_body: Option<String>,
    pub snippet: Option<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_important: bool,
    pub is_sent: bool,
    pub priority: Priority,
    pub category: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub labels: LabelSet,
    /// Label applied by the rule that classified this record
    pub rule_label: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub summary: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub suggestions: ReplySuggestions,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Records carrying a summary or reply drafts are exempt from retention.
    pub fn has_ai_content(&self) -> bool {
        self.summary.as_deref().is_some_and(|s| !s.is_empty()) || !self.suggestions.0.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct AddressList(pub Vec<String>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct LabelSet(pub Vec<String>);

impl LabelSet {
    /// Builds a de-duplicated label set, keeping first-seen order.
    pub fn merged(labels: &[String], extra: Option<&str>) -> Self {
        let mut set: Vec<String> = Vec::with_capacity(labels.len() + 1);
        for label in labels.iter().map(String::as_str).chain(extra) {
            if !set.iter().any(|l| l == label) {
                set.push(label.to_string());
            }
        }
        LabelSet(set)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplySuggestion {
    pub tone: String,
    pub draft_text: String,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct ReplySuggestions(pub Vec<ReplySuggestion>);
