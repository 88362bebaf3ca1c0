use super::{
    errors::{panic_message, Error, JobError, Result},
    handle::{Job, JobHandle},
    model::PoolMetrics,
    result::JobResult,
};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread,
};
use crossbeam::channel::{self, Receiver, Sender};
use tokio::sync::oneshot;
use tracing::{debug, error, info_span, Span};


/// Конфигурация пула потоков
#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: usize,
    /// `None` - очередь без ограничения, `Some(n)` - `submit` блокируется на полной очереди
    pub max_pending: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: 10,
            max_pending: None,
            thread_name_prefix: "worker".to_string(),
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            num_threads: num_cpus,
            max_pending: Some(num_cpus * 10),
            ..Default::default()
        }
    }

    pub fn io_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            num_threads: num_cpus * 2, // Для I/O-bound задач
            max_pending: None,
            ..Default::default()
        }
    }
}


#[derive(Default)]
struct PoolStats {
    active_jobs: AtomicUsize,
    idle_workers: AtomicUsize,
    queued_jobs: AtomicUsize,
    total_submitted: AtomicUsize,
    completed_jobs: AtomicUsize,
    failed_jobs: AtomicUsize,
}


/// Выполняет работу, ловит ошибку или панику и логирует её.
/// Ошибка не проглатывается: она возвращается вызывающему
pub(crate) fn call_wrapper<T, F>(job: F) -> JobResult<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    let result = match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(JobError::Failed(err)),
        Err(payload) => Err(JobError::Panic(panic_message(payload))),
    };

    if let Err(err) = &result {
        err.log();
    }
    result
}


/// Пул из N постоянных потоков, разбирающих общую очередь джобов.
/// Одновременно выполняется не больше N джобов, остальные ждут в очереди
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    stats: Arc<PoolStats>,
    span: Span,
    config: Config,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Result<Self> {
        let config = Config {
            num_threads,
            ..Default::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        Self::with_span(config, info_span!("worker_pool"))
    }

    pub fn with_span(config: Config, span: Span) -> Result<Self> {
        if config.num_threads == 0 {
            return Err(Error::InvalidProperty("need at least 1 worker thread".into()));
        }

        let (sender, receiver) = match config.max_pending {
            Some(cap) => channel::bounded::<Job>(cap),
            None => channel::unbounded::<Job>(),
        };
        let stats = Arc::new(PoolStats::default());

        let mut workers = Vec::with_capacity(config.num_threads);
        for index in 0..config.num_threads {
            let receiver = receiver.clone();
            let stats = stats.clone();
            let worker_span = info_span!(parent: &span, "worker", index);

            let handle = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name_prefix, index))
                .spawn(move || {
                    let _enter = worker_span.enter();
                    worker_loop(receiver, stats);
                });

            match handle {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    // Уже запущенные воркеры завершатся, когда отпустим sender
                    drop(sender);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(err.into());
                }
            }
        }

        span.in_scope(|| debug!(threads = config.num_threads, "worker pool started"));

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            stats,
            span,
            config,
        })
    }

    /// Ставит джоб в очередь и сразу возвращает handle на результат
    pub fn submit<T, F>(&self, job: F) -> JobResult<JobHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.submit_with_callback(job, |_| {})
    }

    /// Как `submit`, но `callback` получает значение после успешного завершения.
    /// Вызывается в потоке воркера, до того как результат уйдёт в handle
    pub fn submit_with_callback<T, F, C>(&self, job: F, callback: C) -> JobResult<JobHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        C: FnOnce(&T) + Send + 'static,
    {
        // Клон sender'а, чтобы не держать мьютекс, пока bounded-очередь полна
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(JobError::PoolClosed)?;

        let (tx, rx) = oneshot::channel::<JobResult<T>>();
        let stats = self.stats.clone();

        let wrapped: Job = Box::new(move || {
            let result = call_wrapper(job);
            match &result {
                Ok(value) => {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(value))) {
                        error!("job callback panicked: {}", panic_message(payload));
                    }
                    stats.completed_jobs.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    stats.failed_jobs.fetch_add(1, Ordering::Relaxed);
                }
            }
            let _ = tx.send(result);
        });

        self.stats.queued_jobs.fetch_add(1, Ordering::Relaxed);
        if sender.send(wrapped).is_err() {
            self.stats.queued_jobs.fetch_sub(1, Ordering::Relaxed);
            return Err(JobError::PoolClosed);
        }
        self.stats.total_submitted.fetch_add(1, Ordering::Relaxed);

        Ok(JobHandle::new(rx))
    }

    /// Закрывает приём джобов и ждёт, пока воркеры разберут очередь и выйдут.
    /// Повторный вызов ничего не делает.
    ///
    /// Из потока воркера (джоб или callback держал последний `Arc` пула)
    /// свой поток не джойнится: он выйдет сам, когда джоб вернётся
    pub fn wait_all(&self) {
        drop(self.sender.lock().unwrap_or_else(PoisonError::into_inner).take());

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if workers.is_empty() {
            return;
        }

        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                self.span.in_scope(|| error!("worker thread panicked"));
            }
        }
        self.span.in_scope(|| {
            debug!(submitted = self.submitted(), "worker pool drained")
        });
    }

    #[inline]
    pub fn submitted(&self) -> usize {
        self.stats.total_submitted.load(Ordering::Acquire)
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.config.num_threads
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            active_jobs: self.stats.active_jobs.load(Ordering::Relaxed),
            idle_workers: self.stats.idle_workers.load(Ordering::Relaxed),
            queued_jobs: self.stats.queued_jobs.load(Ordering::Relaxed),
            total_submitted: self.stats.total_submitted.load(Ordering::Relaxed),
            completed_jobs: self.stats.completed_jobs.load(Ordering::Relaxed),
            failed_jobs: self.stats.failed_jobs.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.wait_all();
    }
}


fn worker_loop(receiver: Receiver<Job>, stats: Arc<PoolStats>) {
    loop {
        stats.idle_workers.fetch_add(1, Ordering::Release);
        let next = receiver.recv();
        stats.idle_workers.fetch_sub(1, Ordering::Acquire);

        // Err - все sender'ы отпущены и очередь пуста
        let Ok(job) = next else { break };

        stats.queued_jobs.fetch_sub(1, Ordering::Relaxed);
        stats.active_jobs.fetch_add(1, Ordering::Relaxed);
        job();
        stats.active_jobs.fetch_sub(1, Ordering::Relaxed);
    }
    debug!("worker exiting");
}
