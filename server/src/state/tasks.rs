use std::panic::AssertUnwindSafe;
use std::sync::Mutex;

use chrono::Utc;
use derive_more::derive::Display;
use futures::stream::{self, StreamExt};
use futures::FutureExt;

use crate::error::IngestResult;
use crate::model::email_record::EmailStore;
use crate::model::user::UserDirectory;
use crate::server_config::SchedulerConfig;

use super::ingestion::{IngestMode, IngestStats, IngestionCoordinator};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[display("{users} users, {failed_users} failed ({stats})")]
pub struct SweepReport {
    pub users: usize,
    pub failed_users: usize,
    pub stats: IngestStats,
}

pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Unknown panic".to_string())
}

/// Background ingestion for every active user. A failing or panicking user is
/// logged and counted; the rest of the sweep carries on.
pub async fn run_sync_sweep(
    coordinator: &IngestionCoordinator,
    config: &SchedulerConfig,
) -> IngestResult<SweepReport> {
    let users = coordinator.users().active_users().await?;
    tracing::info!("Syncing {} users", users.len());

    let report = Mutex::new(SweepReport {
        users: users.len(),
        ..Default::default()
    });

    stream::iter(users)
        .for_each_concurrent(config.max_concurrent_users.max(1), |user| {
            let report = &report;
            async move {
                let result = AssertUnwindSafe(coordinator.ingest_all(
                    &user,
                    &config.sync_label_filter,
                    config.sync_page_size,
                    config.sync_max_pages,
                    IngestMode::Background,
                ))
                .catch_unwind()
                .await;

                let mut report = report.lock().unwrap();
                match result {
                    Ok(Ok(stats)) => report.stats.merge(stats),
                    Ok(Err(e)) => {
                        tracing::error!("Sync failed for {}: {}", user.email, e);
                        report.failed_users += 1;
                    }
                    Err(panic) => {
                        tracing::error!(
                            "Sync for {} panicked, recovering: {}",
                            user.email,
                            panic_message(panic.as_ref())
                        );
                        report.failed_users += 1;
                    }
                }
            }
        })
        .await;

    let report = report.into_inner().unwrap();
    tracing::info!("Sync sweep done: {}", report);

    Ok(report)
}

pub async fn run_retention_sweep(
    store: &dyn EmailStore,
    max_age: chrono::Duration,
) -> IngestResult<u64> {
    let cutoff = Utc::now() - max_age;
    let deleted = store.delete_expired(cutoff).await?;
    tracing::info!("Retention sweep removed {} records created before {}", deleted, cutoff);

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;

    use super::*;
    use crate::db_core::prelude::*;
    use crate::email::provider::{Credentials, MailProvider, MessagePage, ProviderMessage};
    use crate::testing::common::{
        coordinator, gmail_message, insert_user, new_record, setup_db, FakeProvider,
    };

    fn sweep_config() -> SchedulerConfig {
        SchedulerConfig {
            sync_interval_secs: 60,
            retention_interval_secs: 86400,
            sync_label_filter: "INBOX".to_string(),
            sync_page_size: 2,
            sync_max_pages: 5,
            max_concurrent_users: 2,
        }
    }

    fn provider_with(count: usize) -> FakeProvider {
        let provider = FakeProvider::default();
        for i in 1..=count {
            provider.add_message(gmail_message(
                &format!("m{i}"),
                "news@example.com",
                "Weekly digest",
                "Top stories",
                &["INBOX", "CATEGORY_UPDATES"],
            ));
        }
        provider.add_message(gmail_message(
            "archived",
            "old@example.com",
            "Archived",
            "Not in the inbox",
            &["CATEGORY_UPDATES"],
        ));
        provider
    }

    #[tokio::test]
    async fn test_sync_sweep_isolates_failing_users() {
        let conn = setup_db().await;
        let a = insert_user(&conn, "a@example.com", Some("token-a"), true).await;
        let b = insert_user(&conn, "b@example.com", Some("token-b"), true).await;
        insert_user(&conn, "broken@example.com", None, true).await;
        insert_user(&conn, "inactive@example.com", Some("token"), false).await;
        let ingest = coordinator(&conn, &provider_with(3));

        let report = run_sync_sweep(&ingest, &sweep_config()).await.unwrap();
        assert_eq!(report.users, 3);
        assert_eq!(report.failed_users, 1);
        assert_eq!(report.stats.created, 6);

        for user in [&a, &b] {
            let records = EmailRecord::find()
                .filter(email_record::Column::UserId.eq(user.id))
                .all(&conn)
                .await
                .unwrap();
            assert_eq!(records.len(), 3);
            assert!(records.iter().all(|r| r.plain_body.is_none()));
        }

        let again = run_sync_sweep(&ingest, &sweep_config()).await.unwrap();
        assert_eq!(again.stats.created, 0);
        assert_eq!(again.stats.updated, 6);
    }

    /// Panics for one user's token, delegates otherwise.
    struct PanickingProvider(FakeProvider);

    #[async_trait]
    impl MailProvider for PanickingProvider {
        async fn list(
            &self,
            credentials: &Credentials,
            label_filter: &str,
            page_size: u32,
            page_token: Option<String>,
        ) -> IngestResult<MessagePage> {
            if credentials.access_token == "boom" {
                panic!("provider blew up");
            }
            self.0
                .list(credentials, label_filter, page_size, page_token)
                .await
        }

        async fn get(
            &self,
            credentials: &Credentials,
            message_id: &str,
        ) -> IngestResult<ProviderMessage> {
            self.0.get(credentials, message_id).await
        }
    }

    #[tokio::test]
    async fn test_sync_sweep_survives_panics() {
        let conn = setup_db().await;
        insert_user(&conn, "boom@example.com", Some("boom"), true).await;
        insert_user(&conn, "ok@example.com", Some("fine"), true).await;

        let db = Arc::new(conn.clone());
        let ingest = IngestionCoordinator::new(
            Arc::new(PanickingProvider(provider_with(2))),
            db.clone(),
            db.clone(),
            db,
            Duration::from_secs(1),
        );

        let report = run_sync_sweep(&ingest, &sweep_config()).await.unwrap();
        assert_eq!(report.failed_users, 1);
        assert_eq!(report.stats.created, 2);
    }

    #[tokio::test]
    async fn test_retention_sweep_keeps_recent_and_summarized() {
        let conn = setup_db().await;
        let old = Utc::now() - chrono::Duration::days(45);
        for id in ["stale", "summarized", "recent"] {
            let mut record = new_record(1, id);
            if id != "recent" {
                record.created_at = old;
            }
            conn.create(record).await.unwrap();
        }
        conn.set_summary(1, "summarized", "Meeting moved to Tuesday".to_string())
            .await
            .unwrap();

        let deleted = run_retention_sweep(&conn, chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let remaining: Vec<_> = EmailRecord::find()
            .all(&conn)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.provider_message_id)
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(!remaining.contains(&"stale".to_string()));

        assert_eq!(
            run_retention_sweep(&conn, chrono::Duration::days(30))
                .await
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "Unknown panic");
    }
}
