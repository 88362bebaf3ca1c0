use std::fmt;


#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub active_jobs: usize,
    pub idle_workers: usize,
    pub queued_jobs: usize,
    pub total_submitted: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.active_jobs + self.idle_workers == 0 {
            return 0.0;
        }
        self.active_jobs as f64 / (self.active_jobs + self.idle_workers) as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_jobs + self.failed_jobs;
        if total == 0 {
            return 1.0;
        }
        self.completed_jobs as f64 / total as f64
    }

    /// Сколько джобов ещё не дошло до конца (в очереди или выполняются)
    pub fn pending(&self) -> usize {
        self.total_submitted
            .saturating_sub(self.completed_jobs + self.failed_jobs)
    }
}


/// Размеры трёх множеств раннера в момент наблюдения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunnerSnapshot {
    pub not_started: usize,
    pub started: usize,
    pub stopped: usize,
}

impl RunnerSnapshot {
    pub fn total(&self) -> usize {
        self.not_started + self.started + self.stopped
    }

    pub fn is_done(&self) -> bool {
        self.not_started == 0 && self.started == 0
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}


/// Жизненный цикл задачи: только вперёд, NotStarted -> Started -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TaskState {
    NotStarted = 0,
    Started = 1,
    Stopped = 2,
}

impl TaskState {
    #[inline]
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::NotStarted,
            1 => TaskState::Started,
            _ => TaskState::Stopped,
        }
    }
}


pub enum JoinOrdering {
    Ordered,
    UnOrdered,
}
