use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::models::job::RecognitionJob;
use crate::models::record::{BatchEntry, BatchResult, ExtractedRecord, ProcessingFailure};
use crate::services::extraction::{self, CoordinateRegion};
use crate::services::pool::{EnginePoolManager, PoolError};

/// One image supplied by the caller.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl ImageInput {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Emitted once per image as it reaches a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub image_name: String,
    pub succeeded: bool,
}

/// Runs one batch of images through the shared engine pool and the extraction pipeline.
pub struct BatchCoordinator {
    pools: Arc<EnginePoolManager>,
    pool_size: usize,
    region: CoordinateRegion,
}

impl BatchCoordinator {
    pub fn new(pools: Arc<EnginePoolManager>, pool_size: usize, region: CoordinateRegion) -> Self {
        Self {
            pools,
            pool_size,
            region,
        }
    }

    pub fn region(&self) -> &CoordinateRegion {
        &self.region
    }

    pub async fn process_batch(&self, images: Vec<ImageInput>) -> Result<BatchResult, PoolError> {
        self.process_batch_with_progress(images, |_| {}).await
    }

    /// Process every image concurrently and wait for all of them.
    ///
    /// The returned entries line up with `images` by index. A failed image
    /// becomes a [`BatchEntry::Failed`]; only a pool that cannot be built
    /// fails the whole batch.
    pub async fn process_batch_with_progress<F>(
        &self,
        images: Vec<ImageInput>,
        on_progress: F,
    ) -> Result<BatchResult, PoolError>
    where
        F: Fn(BatchProgress) + Send + Sync,
    {
        let pool = self.pools.initialize(self.pool_size).await?;
        let total = images.len();
        let completed = AtomicUsize::new(0);

        tracing::info!(images = total, engines = pool.size(), "Processing batch");

        let jobs = images.into_iter().map(|image| {
            let mut handle = pool.submit(RecognitionJob::new(image.name, image.bytes));
            let image_name = handle.image_name().to_string();
            let completed = &completed;
            let on_progress = &on_progress;

            async move {
                let outcome = (&mut handle).await;
                tracing::debug!(
                    job_id = %handle.job_id(),
                    image_name = %image_name,
                    state = %handle.state(),
                    "Job settled"
                );

                let entry = match outcome {
                    Ok(raw) => {
                        let fields = extraction::extract(&raw.recognized_text, &self.region);
                        BatchEntry::Extracted(ExtractedRecord::new(
                            image_name,
                            fields,
                            raw.recognized_text,
                        ))
                    }
                    Err(failure) => BatchEntry::Failed(ProcessingFailure {
                        image_name: failure.image_name,
                        job_id: failure.job_id,
                        error: failure.error.to_string(),
                    }),
                };

                on_progress(BatchProgress {
                    completed: completed.fetch_add(1, Ordering::SeqCst) + 1,
                    total,
                    image_name: entry.image_name().to_string(),
                    succeeded: entry.is_success(),
                });

                entry
            }
        });

        let result = BatchResult {
            entries: join_all(jobs).await,
        };

        tracing::info!(
            images = total,
            succeeded = result.success_count(),
            failed = result.failure_count(),
            "Batch complete"
        );

        Ok(result)
    }
}
