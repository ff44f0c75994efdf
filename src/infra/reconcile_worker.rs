use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard, Semaphore, mpsc, mpsc::error::TrySendError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::reconcile_queue::{ReconcileDispatcher, ReconcileJob},
        use_cases::reconciler::{ReconcileOutcome, SubscriptionReconciler},
    },
};

const LOCK_SHARDS: usize = 64;

/// Work executed by the pool for each queued job.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn run(&self, job: &ReconcileJob) -> AppResult<ReconcileOutcome>;
}

#[async_trait]
impl JobHandler for SubscriptionReconciler {
    async fn run(&self, job: &ReconcileJob) -> AppResult<ReconcileOutcome> {
        self.handle(job).await
    }
}

/// Fixed table of async mutexes; jobs whose keys hash to the same shard run one at a time.
struct KeyLocks {
    shards: Vec<Mutex<()>>,
}

impl KeyLocks {
    fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards).map(|_| Mutex::new(())).collect(),
        }
    }

    async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let shard = (hasher.finish() % self.shards.len() as u64) as usize;
        self.shards[shard].lock().await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub workers: usize,
    pub capacity: usize,
    pub job_timeout: Duration,
}

/// Bounded in-process queue feeding a pool of reconciliation workers.
///
/// When the channel is full, up to `capacity` more jobs wait on detached
/// hand-off tasks. Past that, dispatch fails and the stored event is left
/// for redelivery or replay.
#[derive(Clone)]
pub struct ReconcileQueue {
    sender: mpsc::Sender<ReconcileJob>,
    handoffs: Arc<Semaphore>,
}

impl ReconcileQueue {
    /// Spawns the worker pool. Workers stop once every queue handle is dropped.
    pub fn start(handler: Arc<dyn JobHandler>, settings: WorkerSettings) -> Self {
        let capacity = settings.capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let locks = Arc::new(KeyLocks::new(LOCK_SHARDS));

        for worker in 0..settings.workers.max(1) {
            tokio::spawn(run_worker(
                worker,
                receiver.clone(),
                handler.clone(),
                locks.clone(),
                settings.job_timeout,
            ));
        }

        info!(
            workers = settings.workers,
            capacity = settings.capacity,
            "Reconcile workers started"
        );
        Self {
            sender,
            handoffs: Arc::new(Semaphore::new(capacity)),
        }
    }
}

impl ReconcileDispatcher for ReconcileQueue {
    fn dispatch(&self, job: ReconcileJob) -> AppResult<()> {
        match self.sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                let Ok(permit) = self.handoffs.clone().try_acquire_owned() else {
                    error!(
                        raw_event_id = ?raw_event_id(&job),
                        key = %job.ordering_key(),
                        "Reconcile queue overloaded, job dropped"
                    );
                    return Err(AppError::QueueUnavailable);
                };
                warn!(key = %job.ordering_key(), "Reconcile queue full, handing off");
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    if let Err(e) = sender.send(job).await {
                        error!(
                            raw_event_id = ?raw_event_id(&e.0),
                            "Reconcile queue closed before job could be queued"
                        );
                    }
                    drop(permit);
                });
                Ok(())
            }
            Err(TrySendError::Closed(job)) => {
                error!(raw_event_id = ?raw_event_id(&job), "Reconcile queue closed");
                Err(AppError::QueueUnavailable)
            }
        }
    }
}

fn raw_event_id(job: &ReconcileJob) -> Option<Uuid> {
    match job {
        ReconcileJob::Webhook { raw_event_id, .. } => Some(*raw_event_id),
        ReconcileJob::LinkExisting { .. } => None,
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<ReconcileJob>>>,
    handler: Arc<dyn JobHandler>,
    locks: Arc<KeyLocks>,
    job_timeout: Duration,
) {
    loop {
        let job = { receiver.lock().await.recv().await };
        let Some(job) = job else {
            debug!(worker, "Reconcile queue closed, worker exiting");
            return;
        };

        let raw_event_id = raw_event_id(&job);
        let key = job.ordering_key();
        let task = tokio::spawn(process_job(
            handler.clone(),
            locks.clone(),
            job,
            job_timeout,
        ));
        if let Err(e) = task.await {
            error!(worker, ?raw_event_id, %key, error = %e, "Reconcile task panicked");
        }
    }
}

async fn process_job(
    handler: Arc<dyn JobHandler>,
    locks: Arc<KeyLocks>,
    job: ReconcileJob,
    job_timeout: Duration,
) {
    let raw_event_id = raw_event_id(&job);
    let key = job.ordering_key();
    let _guard = locks.lock(&key).await;

    match tokio::time::timeout(job_timeout, handler.run(&job)).await {
        Ok(Ok(outcome)) => debug!(?raw_event_id, %key, ?outcome, "Reconcile job done"),
        Ok(Err(e)) => error!(?raw_event_id, %key, error = %e, "Reconcile job failed"),
        Err(_) => error!(
            ?raw_event_id,
            %key,
            timeout_secs = job_timeout.as_secs(),
            "Reconcile job timed out"
        ),
    }
}
