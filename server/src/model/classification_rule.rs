use async_trait::async_trait;

use crate::{
    db_core::prelude::*,
    email::rules::UserRules,
    error::{IngestError, IngestResult},
};

#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Active rules for a user in evaluation order. Read fresh on every call.
    async fn active_rules(&self, user_id: i32) -> IngestResult<UserRules>;
}

pub struct ClassificationRuleCtrl;

impl ClassificationRuleCtrl {
    pub async fn get_active_by_user_id(
        conn: &DatabaseConnection,
        user_id: i32,
    ) -> Result<Vec<classification_rule::Model>, DbErr> {
        ClassificationRule::find()
            .filter(classification_rule::Column::UserId.eq(user_id))
            .filter(classification_rule::Column::IsActive.eq(true))
            .order_by_asc(classification_rule::Column::Position)
            .order_by_asc(classification_rule::Column::Id)
            .all(conn)
            .await
    }
}

#[async_trait]
impl RuleSource for DatabaseConnection {
    async fn active_rules(&self, user_id: i32) -> IngestResult<UserRules> {
        let rules = ClassificationRuleCtrl::get_active_by_user_id(self, user_id)
            .await
            .map_err(|e| {
                IngestError::Configuration(format!("Could not load rules for user {user_id}: {e}"))
            })?;

        Ok(rules.into_iter().collect())
    }
}
