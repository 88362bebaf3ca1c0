use super::{
    errors::{Error, Result},
    model::{RunnerSnapshot, TaskId, TaskState},
    task::{RunnerLink, Task, TaskRef},
};
use std::{
    collections::{HashMap, HashSet},
    thread,
};
use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, info_span, Span};


/// Запускает задачи по мере готовности и собирает их завершения.
///
/// Каждая задача попадает ровно в одно из множеств
/// `not_started` / `started` / `stopped`, менять их может только сам раннер.
/// Потоки задач касаются раннера в одном месте: отправка в канал завершений.
///
/// Если в `not_started` остались задачи, которые никогда не станут готовы,
/// а запущенных нет, `run_all` зависнет навсегда: детектора такой ситуации нет.
pub struct Runner {
    tasks: HashMap<TaskId, TaskRef>,
    not_started: HashSet<TaskId>,
    started: HashSet<TaskId>,
    stopped: HashSet<TaskId>,
    stop_order: Vec<TaskId>,
    threads: HashMap<TaskId, thread::JoinHandle<()>>,
    finished_tx: Sender<TaskId>,
    finished_rx: Receiver<TaskId>,
    next_id: u64,
    span: Span,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self::with_span(info_span!("runner"))
    }

    pub fn with_span(span: Span) -> Self {
        let (finished_tx, finished_rx) = channel::unbounded();
        Self {
            tasks: HashMap::new(),
            not_started: HashSet::new(),
            started: HashSet::new(),
            stopped: HashSet::new(),
            stop_order: Vec::new(),
            threads: HashMap::new(),
            finished_tx,
            finished_rx,
            next_id: 0,
            span,
        }
    }

    pub fn add_task<T: Task>(&mut self, task: T) -> TaskRef {
        self.add_boxed(Box::new(task))
    }

    pub fn add_boxed(&mut self, task: Box<dyn Task>) -> TaskRef {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        let task = TaskRef::new(id, task);
        self.tasks.insert(id, task.clone());
        self.not_started.insert(id);
        task
    }

    /// Один проход по снимку `not_started`: готовые задачи уходят в `started`.
    /// Возвращает число запущенных задач
    pub fn check(&mut self) -> Result<usize> {
        // Порядок регистрации: id выдаются по возрастанию
        let mut snapshot: Vec<TaskId> = self.not_started.iter().copied().collect();
        snapshot.sort_unstable();
        let mut launched = 0;

        for id in snapshot {
            let Some(task) = self.tasks.get(&id).cloned() else {
                continue;
            };
            if !task.can_start() {
                continue;
            }
            self.start(task)?;
            launched += 1;
        }

        Ok(launched)
    }

    fn start(&mut self, task: TaskRef) -> Result<()> {
        let id = task.id();
        let link = RunnerLink::new(task.clone(), self.finished_tx.clone());
        let span = info_span!(parent: &self.span, "task", id = %id, name = task.name());

        let handle = thread::Builder::new()
            .name(id.to_string())
            .spawn(move || {
                let _enter = span.enter();
                link.run();
            })?;

        self.not_started.remove(&id);
        self.started.insert(id);
        task.advance(TaskState::Started);
        self.threads.insert(id, handle);
        Ok(())
    }

    /// Блокируется до следующего события завершения и переводит задачу в `stopped`
    pub fn wait_task_to_finish(&mut self) -> Result<TaskRef> {
        let id = self.finished_rx.recv().map_err(|_| Error::ChannelClosed)?;
        let task = self.tasks.get(&id).cloned().ok_or(Error::UnknownTask(id))?;

        // Событие уходит из drop'а, поток вот-вот завершится
        if let Some(handle) = self.threads.remove(&id) {
            if handle.join().is_err() {
                self.span.in_scope(|| error!(task = %id, "task thread panicked"));
            }
        }

        self.started.remove(&id);
        self.stopped.insert(id);
        self.stop_order.push(id);
        task.advance(TaskState::Stopped);

        let secs = task.duration().unwrap_or_default().as_secs_f64();
        self.span.in_scope(|| {
            debug!(task = %id, "task {} finished, took {:.2} seconds", task.name(), secs)
        });
        Ok(task)
    }

    #[inline]
    pub fn task_pending(&self) -> bool {
        !self.not_started.is_empty() || !self.started.is_empty()
    }

    /// Крутит `check` + `wait_task_to_finish`, пока есть незапущенные или работающие задачи.
    /// Новая готовность обнаруживается только после очередного завершения
    pub fn run_all(&mut self) -> Result<()> {
        while self.task_pending() {
            self.check()?;
            self.wait_task_to_finish()?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> RunnerSnapshot {
        RunnerSnapshot {
            not_started: self.not_started.len(),
            started: self.started.len(),
            stopped: self.stopped.len(),
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskRef> {
        self.tasks.get(&id)
    }

    /// Задачи в порядке завершения
    pub fn stopped_order(&self) -> Vec<TaskRef> {
        self.stop_order
            .iter()
            .filter_map(|id| self.tasks.get(id).cloned())
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
