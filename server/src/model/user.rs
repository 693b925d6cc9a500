use async_trait::async_trait;

use crate::{
    db_core::prelude::*,
    email::provider::Credentials,
    error::{IngestError, IngestResult},
};

/// A user whose mailbox is kept in sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAccount {
    pub id: i32,
    pub email: String,
}

impl From<mail_user::Model> for MailAccount {
    fn from(model: mail_user::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
        }
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn active_users(&self) -> IngestResult<Vec<MailAccount>>;

    /// Fails with [`IngestError::Configuration`] when no usable credentials exist.
    async fn credentials(&self, user: &MailAccount) -> IngestResult<Credentials>;
}

pub struct UserCtrl;

impl UserCtrl {
    pub async fn all_active(conn: &DatabaseConnection) -> Result<Vec<mail_user::Model>, DbErr> {
        MailUser::find()
            .filter(mail_user::Column::IsActive.eq(true))
            .order_by_asc(mail_user::Column::Id)
            .all(conn)
            .await
    }

    pub async fn get_by_id(
        conn: &DatabaseConnection,
        user_id: i32,
    ) -> Result<Option<mail_user::Model>, DbErr> {
        MailUser::find_by_id(user_id).one(conn).await
    }
}

#[async_trait]
impl UserDirectory for DatabaseConnection {
    async fn active_users(&self) -> IngestResult<Vec<MailAccount>> {
        let users = UserCtrl::all_active(self).await?;
        Ok(users.into_iter().map(MailAccount::from).collect())
    }

    async fn credentials(&self, user: &MailAccount) -> IngestResult<Credentials> {
        let model = UserCtrl::get_by_id(self, user.id)
            .await
            .map_err(|e| {
                IngestError::Configuration(format!("Could not load user {}: {e}", user.email))
            })?
            .ok_or_else(|| IngestError::Configuration(format!("Unknown user {}", user.email)))?;

        match model.access_token {
            Some(access_token) if !access_token.is_empty() => Ok(Credentials { access_token }),
            _ => Err(IngestError::Configuration(format!(
                "No access token for {}",
                user.email
            ))),
        }
    }
}
