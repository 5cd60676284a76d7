use std::{fmt, future::Future, sync::Arc};

use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::logging::SharedLogger;

/// A unit of work run by the pool. It receives the run's cancellation token.
pub type Job<E> = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), E>> + Send>;

/// Boxes an async closure into a [`Job`].
pub fn job<E, F, Fut>(f: F) -> Job<E>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    Box::new(move |cancel| Box::pin(f(cancel)))
}

/// Every failure observed during one pool run.
#[derive(Debug)]
pub struct PoolError<E> {
    pub failures: Vec<E>,
    pub cancelled: bool,
    /// Workers that died from a panicking job.
    pub panicked: usize,
}

impl<E> PoolError<E> {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<E: fmt::Display> fmt::Display for PoolError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines: Vec<String> = self.failures.iter().map(|e| e.to_string()).collect();
        if self.panicked > 0 {
            lines.push(format!("{} worker(s) panicked", self.panicked));
        }
        if self.cancelled {
            lines.push("operation cancelled".to_string());
        }
        write!(f, "{}", lines.join("\n"))
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for PoolError<E> {}

/// Runs independent jobs on a fixed number of long-lived workers.
///
/// Workers pull from one shared queue. Failures are collected, never
/// short-circuited, and returned together once every dispatched job finished.
pub struct WorkerPool {
    workers: usize,
    logger: SharedLogger,
}

impl WorkerPool {
    /// # Arguments
    ///
    /// * `workers` - Number of concurrent workers; values below one are
    ///   coerced to one
    /// * `logger` - Receives dispatch warnings and worker crash reports
    pub fn new(workers: usize, logger: SharedLogger) -> Self {
        Self {
            workers: workers.max(1),
            logger,
        }
    }

    /// # Returns
    ///
    /// The effective worker count, always at least one.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Feeds `jobs` to the workers in order and waits for all of them.
    ///
    /// Jobs already handed to a worker run to completion when `cancel` fires;
    /// the rest are dropped.
    ///
    /// # Errors
    ///
    /// A [`PoolError`] carrying every job failure, the cancellation flag and
    /// the number of panicked workers, if any of them is set.
    ///
    /// # Example
    ///
    /// ```
    /// use msrcli::engine::{WorkerPool, job};
    /// use msrcli::logging::NullLogger;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let pool = WorkerPool::new(2, NullLogger::shared());
    /// let jobs = vec![job(|_| async { Ok::<(), String>(()) })];
    /// pool.run(&CancellationToken::new(), jobs).await.unwrap();
    /// # });
    /// ```
    pub async fn run<E>(
        &self,
        cancel: &CancellationToken,
        jobs: Vec<Job<E>>,
    ) -> Result<(), PoolError<E>>
    where
        E: Send + 'static,
    {
        if jobs.is_empty() {
            return Ok(());
        }

        let total = jobs.len();
        let (job_tx, job_rx) = mpsc::channel::<Job<E>>(1);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (err_tx, mut err_rx) = mpsc::unbounded_channel::<E>();

        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let job_rx = Arc::clone(&job_rx);
            let err_tx = err_tx.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    // the lock is released as soon as a job is taken off the queue
                    let next = job_rx.lock().await.recv().await;
                    let Some(job) = next else { break };
                    if let Err(err) = job(cancel.clone()).await {
                        let _ = err_tx.send(err);
                    }
                }
            }));
        }
        drop(err_tx);

        let mut dispatched = 0;
        for job in jobs {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = job_tx.send(job) => {
                    if sent.is_err() {
                        break;
                    }
                    dispatched += 1;
                }
            }
        }
        drop(job_tx);

        if dispatched < total {
            self.logger.warn(&format!(
                "Stopped dispatching; {} of {} jobs were not started",
                total - dispatched,
                total
            ));
        }

        let mut panicked = 0;
        for handle in handles {
            if let Err(e) = handle.await {
                self.logger.error(&format!("Worker stopped unexpectedly: {}", e));
                panicked += 1;
            }
        }

        let mut failures = Vec::new();
        while let Some(err) = err_rx.recv().await {
            failures.push(err);
        }

        let cancelled = cancel.is_cancelled();
        if failures.is_empty() && !cancelled && panicked == 0 {
            return Ok(());
        }

        Err(PoolError {
            failures,
            cancelled,
            panicked,
        })
    }
}
