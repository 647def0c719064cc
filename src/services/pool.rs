use futures::future::{try_join_all, BoxFuture, Shared};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, PoisonError};
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use crate::models::job::{JobState, RawRecognitionResult, RecognitionJob};
use crate::services::ocr::{EngineFactory, Recognition, RecognitionEngine, RecognitionError};
use crate::services::staging::{ImageStager, StagedImage};

/// Settings shared by every worker in a pool.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Language/script hint passed to each recognition call.
    pub language: String,
    /// Per-job deadline; `None` lets a call run until the engine returns.
    pub job_timeout: Option<Duration>,
}

type JobReply = Result<RawRecognitionResult, RecognitionError>;

struct QueuedJob {
    job: RecognitionJob,
    reply: oneshot::Sender<JobReply>,
}

struct WorkerContext {
    stager: ImageStager,
    settings: PoolSettings,
}

/// Fixed set of engines, each driven by its own worker task pulling from a
/// shared queue. A worker runs one job at a time, so an engine never has more
/// than one active job.
pub struct EnginePool {
    sender: mpsc::UnboundedSender<QueuedJob>,
    engine_names: Vec<String>,
}

impl EnginePool {
    /// Construct `size` engines concurrently and start their workers.
    /// Fails without starting anything if any engine fails to construct.
    pub async fn start(
        size: usize,
        factory: &dyn EngineFactory,
        stager: ImageStager,
        settings: PoolSettings,
    ) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }

        let engines = try_join_all((0..size).map(|index| factory.create(index)))
            .await
            .map_err(|e| PoolError::Initialization(Arc::new(e)))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let context = Arc::new(WorkerContext { stager, settings });

        let engine_names = engines.iter().map(|e| e.name().to_string()).collect();
        for engine in engines {
            tokio::spawn(run_worker(engine, Arc::clone(&receiver), Arc::clone(&context)));
        }

        metrics::gauge!("ocr_pool_engines").set(size as f64);
        tracing::info!(engines = size, "Recognition engine pool started");

        Ok(Self { sender, engine_names })
    }

    pub fn size(&self) -> usize {
        self.engine_names.len()
    }

    pub fn engine_names(&self) -> &[String] {
        &self.engine_names
    }

    /// Queue a job. The returned handle resolves once an engine has processed it.
    pub fn submit(&self, job: RecognitionJob) -> JobHandle {
        let (reply, receiver) = oneshot::channel();
        let handle = JobHandle {
            job_id: job.id,
            image_name: job.image_name.clone(),
            state: JobState::Pending,
            receiver,
        };

        metrics::counter!("ocr_jobs_submitted_total").increment(1);
        tracing::debug!(job_id = %job.id, image_name = %job.image_name, "Job queued");

        if let Err(mpsc::error::SendError(queued)) = self.sender.send(QueuedJob { job, reply }) {
            let _ = queued.reply.send(Err(RecognitionError::Engine(
                "engine pool is shut down".to_string(),
            )));
        }

        handle
    }
}

async fn run_worker(
    engine: Arc<dyn RecognitionEngine>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<QueuedJob>>>,
    context: Arc<WorkerContext>,
) {
    loop {
        let next = { queue.lock().await.recv().await };
        let Some(QueuedJob { job, reply }) = next else {
            break;
        };

        let outcome = execute(engine.as_ref(), &context, &job).await;

        match &outcome {
            Ok(result) => {
                metrics::counter!("ocr_jobs_completed_total").increment(1);
                tracing::info!(
                    job_id = %job.id,
                    image_name = %job.image_name,
                    engine = engine.name(),
                    duration_ms = result.diagnostics.duration_ms,
                    "Recognition complete"
                );
            }
            Err(e) => {
                metrics::counter!("ocr_jobs_failed_total").increment(1);
                tracing::warn!(
                    job_id = %job.id,
                    image_name = %job.image_name,
                    engine = engine.name(),
                    error = %e,
                    "Recognition failed"
                );
            }
        }

        // The submitter may have stopped waiting; the job still counts as done.
        let _ = reply.send(outcome);
    }

    tracing::debug!(engine = engine.name(), "Engine worker stopped");
}

async fn execute(
    engine: &dyn RecognitionEngine,
    context: &WorkerContext,
    job: &RecognitionJob,
) -> JobReply {
    let staged = context.stager.stage(job).await?;
    let start = Instant::now();

    let result = recognize_staged(engine, &staged, &context.settings).await;
    metrics::histogram!("ocr_recognition_seconds").record(start.elapsed().as_secs_f64());

    if let Err(e) = staged.release().await {
        tracing::warn!(job_id = %job.id, error = %e, "Failed to release staged image");
    }

    let recognition = result?;
    Ok(RawRecognitionResult {
        source_job_id: job.id,
        recognized_text: recognition.text,
        diagnostics: recognition.diagnostics,
    })
}

async fn recognize_staged(
    engine: &dyn RecognitionEngine,
    staged: &StagedImage,
    settings: &PoolSettings,
) -> Result<Recognition, RecognitionError> {
    let call = AssertUnwindSafe(engine.recognize(staged, &settings.language)).catch_unwind();

    let caught = match settings.job_timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| RecognitionError::TimedOut(limit))?,
        None => call.await,
    };

    caught.map_err(|_| RecognitionError::Panicked)?
}

/// A failed job, tagged with the job it belongs to.
#[derive(Debug, thiserror::Error)]
#[error("Job {job_id} ({image_name}) failed: {error}")]
pub struct JobFailure {
    pub job_id: Uuid,
    pub image_name: String,
    #[source]
    pub error: RecognitionError,
}

/// Pending result of one submitted job. Resolves exactly once.
pub struct JobHandle {
    job_id: Uuid,
    image_name: String,
    state: JobState,
    receiver: oneshot::Receiver<JobReply>,
}

impl JobHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn state(&self) -> JobState {
        self.state
    }
}

impl Future for JobHandle {
    type Output = Result<RawRecognitionResult, JobFailure>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let reply = ready!(Pin::new(&mut this.receiver).poll(cx)).unwrap_or_else(|_| {
            Err(RecognitionError::Engine(
                "engine worker stopped before completing the job".to_string(),
            ))
        });

        this.state = match reply {
            Ok(_) => JobState::Resolved,
            Err(_) => JobState::Rejected,
        };

        Poll::Ready(reply.map_err(|error| JobFailure {
            job_id: this.job_id,
            image_name: this.image_name.clone(),
            error,
        }))
    }
}

type PoolInit = Shared<BoxFuture<'static, Result<Arc<EnginePool>, PoolError>>>;

/// Process-wide owner of the engine pool. The pool is built on the first
/// `initialize` call. Callers that arrive while an attempt is running wait on
/// that attempt and share its result, success or failure.
pub struct EnginePoolManager {
    pool: OnceLock<Arc<EnginePool>>,
    in_flight: StdMutex<Option<PoolInit>>,
    factory: Arc<dyn EngineFactory>,
    stager: ImageStager,
    settings: PoolSettings,
    last_init_failed: AtomicBool,
}

impl EnginePoolManager {
    pub fn new(factory: Arc<dyn EngineFactory>, stager: ImageStager, settings: PoolSettings) -> Self {
        Self {
            pool: OnceLock::new(),
            in_flight: StdMutex::new(None),
            factory,
            stager,
            settings,
            last_init_failed: AtomicBool::new(false),
        }
    }

    /// Build the pool with `pool_size` engines, or return the existing pool.
    /// `pool_size` is ignored once a pool exists. A failed attempt is not
    /// retried; the next call after it settles starts a fresh one.
    pub async fn initialize(&self, pool_size: usize) -> Result<Arc<EnginePool>, PoolError> {
        if let Some(pool) = self.pool.get() {
            return Ok(Arc::clone(pool));
        }

        let attempt = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(pool) = self.pool.get() {
                return Ok(Arc::clone(pool));
            }
            slot.get_or_insert_with(|| self.start_attempt(pool_size)).clone()
        };

        let result = attempt.clone().await;

        if let Ok(pool) = &result {
            let _ = self.pool.set(Arc::clone(pool));
        }
        {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&attempt)) {
                *slot = None;
            }
        }

        match result {
            Ok(pool) => {
                self.last_init_failed.store(false, Ordering::Relaxed);
                Ok(pool)
            }
            Err(e) => {
                self.last_init_failed.store(true, Ordering::Relaxed);
                tracing::error!(error = %e, "Recognition engine pool failed to initialize");
                Err(e)
            }
        }
    }

    fn start_attempt(&self, pool_size: usize) -> PoolInit {
        let factory = Arc::clone(&self.factory);
        let stager = self.stager.clone();
        let settings = self.settings.clone();

        async move {
            tracing::info!(engines = pool_size, "Initializing recognition engine pool");
            EnginePool::start(pool_size, factory.as_ref(), stager, settings)
                .await
                .map(Arc::new)
        }
        .boxed()
        .shared()
    }

    /// The pool, if it has been initialized.
    pub fn get(&self) -> Option<Arc<EnginePool>> {
        self.pool.get().cloned()
    }

    pub fn last_init_failed(&self) -> bool {
        self.last_init_failed.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("Recognition engine failed to initialize: {0}")]
    Initialization(#[source] Arc<RecognitionError>),

    #[error("Engine pool size must be at least 1")]
    InvalidSize,
}
