use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Deserializer, Serialize};

use super::sea_orm_active_enums::Priority;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "classification_rule")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    /// Evaluation order, ascending
    pub position: i32,
    #[sea_orm(column_type = "Json")]
    pub conditions: RuleConditions,
    pub action_label: Option<String>,
    pub action_priority: Option<Priority>,
    pub action_category: Option<String>,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Message field a condition inspects. Anything unrecognised in stored rules
/// lands on `Unknown` and never matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionField {
    Subject,
    Body,
    From,
    To,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: ConditionField,
    pub operator: ConditionOperator,
    pub value: String,
}

impl RuleCondition {
    /// Stand-in for a stored condition that could not be decoded. Never matches.
    pub fn unreadable() -> Self {
        Self {
            field: ConditionField::Unknown,
            operator: ConditionOperator::Unknown,
            value: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, FromJsonQueryResult)]
pub struct RuleConditions(pub Vec<RuleCondition>);

/// Decodes condition by condition so one bad entry only disables its own rule.
/// A value that is not a list at all becomes a single unreadable condition.
impl<'de> Deserialize<'de> for RuleConditions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let conditions = match raw {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    serde_json::from_value(item).unwrap_or_else(|_| RuleCondition::unreadable())
                })
                .collect(),
            _ => vec![RuleCondition::unreadable()],
        };
        Ok(RuleConditions(conditions))
    }
}
