use std::{future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use super::tasks::panic_message;

/// The one scheduler every periodic sweep runs on.
pub struct SweepScheduler {
    scheduler: JobScheduler,
}

impl SweepScheduler {
    pub async fn new() -> anyhow::Result<Self> {
        let mut scheduler = JobScheduler::new().await?;
        scheduler.set_shutdown_handler(Box::new(|| {
            Box::pin(async move {
                tracing::info!("Shutting down scheduler");
            })
        }));

        Ok(Self { scheduler })
    }

    /// Runs `task` every `interval`. Errors and panics are logged per tick and
    /// never cancel the job.
    pub async fn add_sweep<F, Fut>(
        &self,
        name: &'static str,
        interval: Duration,
        task: F,
    ) -> anyhow::Result<Uuid>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task = Arc::new(task);
        let job = Job::new_repeated_async(interval, move |uuid, mut l| {
            let task = task.clone();
            Box::pin(async move {
                tracing::info!("Running {} job {}", name, uuid);
                match AssertUnwindSafe(task()).catch_unwind().await {
                    Ok(Ok(())) => {
                        tracing::info!("{} job {} succeeded", name, uuid);
                    }
                    Ok(Err(e)) => {
                        tracing::error!("{} job {} failed: {:?}", name, uuid, e);
                    }
                    Err(panic) => {
                        tracing::error!(
                            "{} job {} panicked, recovering: {}",
                            name,
                            uuid,
                            panic_message(panic.as_ref())
                        );
                    }
                }

                let next_tick = l.next_tick_for_job(uuid).await;
                if let Ok(Some(ts)) = next_tick {
                    tracing::debug!("Next time for {} job is {:?}", name, ts)
                }
            })
        })?;

        Ok(self.scheduler.add(job).await?)
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.start().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.scheduler.shutdown().await?;
        Ok(())
    }
}
