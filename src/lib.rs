//! Небольшое ядро конкурентности: раннер задач и пул воркеров
//!
//! # Features
//! - `Runner`: запуск задач по условию готовности, поток на задачу,
//!   сбор завершений через канал
//! - `WorkerPool`: N постоянных потоков, общая очередь, ожидание всех джобов
//! - Единая обработка ошибок и паник с логированием через `tracing`
//! - Вспомогательное: вложенные свойства с атомарной записью JSON, Git

pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;
pub mod props;
pub mod result;
pub mod runner;
pub mod task;
pub mod vc;

pub use errors::{format_error, Error, JobError};
pub use handle::{join_handles, JobHandle};
pub use model::{JoinOrdering, PoolMetrics, RunnerSnapshot, TaskId, TaskState};
pub use pool::{Config, WorkerPool};
pub use result::JobResult;
pub use runner::Runner;
pub use task::{FnTask, Task, TaskRef};
