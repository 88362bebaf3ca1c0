use super::{
    errors::JobError,
    model::{TaskId, TaskState},
    pool::call_wrapper,
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Mutex, OnceLock, PoisonError,
    },
    time::{Duration, Instant},
};
use crossbeam::channel::Sender;
use tracing::warn;


/// Единица работы с условием готовности.
///
/// `can_start` раннер вызывает многократно на каждом проходе `check`,
/// поэтому он должен быть дешёвым и без побочных эффектов.
/// `execute` выполняется один раз, в отдельном потоке.
pub trait Task: Send + Sync + 'static {
    fn name(&self) -> &str {
        "task"
    }

    fn can_start(&self) -> bool {
        true
    }

    fn execute(&self) -> anyhow::Result<()>;
}


type Body = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;
type Predicate = Box<dyn Fn() -> bool + Send + Sync + 'static>;

/// Задача на замыканиях
pub struct FnTask {
    name: String,
    body: Mutex<Option<Body>>,
    ready: Predicate,
}

impl FnTask {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Mutex::new(Some(Box::new(body))),
            ready: Box::new(|| true),
        }
    }

    pub fn ready_when<P>(mut self, predicate: P) -> Self
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        self.ready = Box::new(predicate);
        self
    }

    /// Готова, когда все `deps` дошли до Stopped
    pub fn after(self, deps: &[TaskRef]) -> Self {
        let deps = deps.to_vec();
        self.ready_when(move || deps.iter().all(TaskRef::is_stopped))
    }
}

impl Task for FnTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_start(&self) -> bool {
        (self.ready)()
    }

    fn execute(&self) -> anyhow::Result<()> {
        let body = self
            .body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match body {
            Some(body) => body(),
            None => anyhow::bail!("task {} already executed", self.name),
        }
    }
}


pub(crate) struct TaskEntry {
    id: TaskId,
    task: Box<dyn Task>,
    state: AtomicU8,
    started_at: OnceLock<Instant>,
    stopped_at: OnceLock<Instant>,
    outcome: OnceLock<Result<(), JobError>>,
}

/// Handle на зарегистрированную задачу. Сравнивается по идентичности, не по значению
#[derive(Clone)]
pub struct TaskRef(Arc<TaskEntry>);

impl TaskRef {
    pub(crate) fn new(id: TaskId, task: Box<dyn Task>) -> Self {
        Self(Arc::new(TaskEntry {
            id,
            task,
            state: AtomicU8::new(TaskState::NotStarted as u8),
            started_at: OnceLock::new(),
            stopped_at: OnceLock::new(),
            outcome: OnceLock::new(),
        }))
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        self.0.task.name()
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.0.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.state() == TaskState::Stopped
    }

    pub fn can_start(&self) -> bool {
        self.0.task.can_start()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.0.started_at.get().copied()
    }

    pub fn stopped_at(&self) -> Option<Instant> {
        self.0.stopped_at.get().copied()
    }

    pub fn duration(&self) -> Option<Duration> {
        Some(self.stopped_at()?.duration_since(self.started_at()?))
    }

    /// Ошибка `execute`, если задача завершилась неудачно
    pub fn error(&self) -> Option<&JobError> {
        self.0.outcome.get()?.as_ref().err()
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.0.outcome.get(), Some(Ok(())))
    }

    /// Переходы делает только раннер; назад состояние не откатывается
    pub(crate) fn advance(&self, state: TaskState) {
        self.0.state.fetch_max(state as u8, Ordering::AcqRel);
    }
}

impl PartialEq for TaskRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TaskRef {}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRef")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}


/// Обратная связь задачи с раннером.
/// Живёт в потоке задачи и при drop отправляет ровно одно событие завершения,
/// в том числе при раскрутке стека.
pub(crate) struct RunnerLink {
    task: TaskRef,
    finished: Sender<TaskId>,
}

impl RunnerLink {
    pub(crate) fn new(task: TaskRef, finished: Sender<TaskId>) -> Self {
        Self { task, finished }
    }

    /// Тело потока задачи
    pub(crate) fn run(self) {
        let entry = &self.task.0;
        let _ = entry.started_at.set(Instant::now());
        let outcome = call_wrapper(|| entry.task.execute());
        let _ = entry.outcome.set(outcome);
    }

    fn task_finished(&mut self) {
        // Поток так и не стартовал (spawn упал) - раннер этого события не ждёт
        if self.task.started_at().is_none() {
            return;
        }
        let _ = self.task.0.stopped_at.set(Instant::now());
        if self.finished.send(self.task.id()).is_err() {
            warn!(task = %self.task.id(), "runner is gone, completion dropped");
        }
    }
}

impl Drop for RunnerLink {
    fn drop(&mut self) {
        self.task_finished();
    }
}
