use std::time::Duration;

use sea_orm::{
    sea_query::Index, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr,
    Schema,
};

use self::prelude::*;

pub mod prelude {
    pub use entity::prelude::*;
    pub use entity::{classification_rule, email_record, mail_user, sea_orm_active_enums::*};
    pub use sea_orm::prelude::DateTimeWithTimeZone;
    pub use sea_orm::{
        ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
        QueryFilter, QueryOrder, QuerySelect,
    };
}

pub async fn connect(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut db_options = ConnectOptions::new(db_url);
    db_options
        .sqlx_logging(false)
        .connect_timeout(Duration::from_secs(10));

    Database::connect(db_options).await
}

/// Creates every table plus the `(user_id, provider_message_id)` unique index
/// ingestion relies on to resolve races. Safe to run repeatedly.
pub async fn create_schema(conn: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    let tables = [
        schema.create_table_from_entity(MailUser),
        schema.create_table_from_entity(ClassificationRule),
        schema.create_table_from_entity(EmailRecord),
    ];
    for mut table in tables {
        let stmt = table.if_not_exists().to_owned();
        conn.execute(backend.build(&stmt)).await?;
    }

    let unique_message = Index::create()
        .name("idx_email_record_user_message")
        .table(EmailRecord)
        .col(email_record::Column::UserId)
        .col(email_record::Column::ProviderMessageId)
        .unique()
        .if_not_exists()
        .to_owned();
    conn.execute(backend.build(&unique_message)).await?;

    Ok(())
}
