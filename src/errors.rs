use std::any::Any;

use crate::model::TaskId;


pub type Result<T> = std::result::Result<T, Error>;

/// Ожидаемые ошибки предметной области.
/// Всё, что приводится к этому типу, считается "доменной" ошибкой:
/// в пуле она логируется как fatal, без полного разбора цепочки.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    InvalidProperty(String),
    #[error("{0}")]
    InvalidRange(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Git(#[from] git2::Error),
    #[error("completion channel closed")]
    ChannelClosed,
    #[error("unknown task {0}")]
    UnknownTask(TaskId),
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidProperty(_) => "InvalidProperty",
            Error::InvalidRange(_) => "InvalidRange",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
            Error::Git(_) => "GitError",
            Error::ChannelClosed => "ChannelClosed",
            Error::UnknownTask(_) => "UnknownTask",
        }
    }
}


/// Итог выполнения одной единицы работы (задачи раннера или джоба пула)
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    Failed(anyhow::Error),
    #[error("{0}")]
    Panic(String),
    #[error("result channel closed")]
    ChannelClosed,
    #[error("pool no longer accepts jobs")]
    PoolClosed,
}

impl JobError {
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Failed(err) => error_kind(err),
            JobError::Panic(_) => "Panic",
            JobError::ChannelClosed => "ChannelClosed",
            JobError::PoolClosed => "PoolClosed",
        }
    }

    /// `true`, если причина сбоя - доменная ошибка `Error`
    #[inline]
    pub fn is_domain(&self) -> bool {
        matches!(self, JobError::Failed(err) if err.downcast_ref::<Error>().is_some())
    }

    pub(crate) fn log(&self) {
        match self {
            JobError::Failed(err) if self.is_domain() => {
                tracing::error!(fatal = true, kind = self.kind(), "task error: {}: {}", self.kind(), err);
            }
            JobError::Failed(err) => {
                tracing::error!(kind = self.kind(), "task error: {}: {:?}", self.kind(), err);
            }
            JobError::Panic(msg) => {
                tracing::error!(kind = "Panic", "task panicked: {}", msg);
            }
            JobError::ChannelClosed | JobError::PoolClosed => {
                tracing::warn!(kind = self.kind(), "{}", self);
            }
        }
    }
}


/// Имя категории ошибки для пользовательского вывода
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    if let Some(e) = err.downcast_ref::<Error>() {
        e.kind()
    } else if let Some(e) = err.downcast_ref::<JobError>() {
        e.kind()
    } else if err.downcast_ref::<std::io::Error>().is_some() {
        "IoError"
    } else {
        "Error"
    }
}

/// `ERROR: <kind>: <message>` - единый формат для всех компонентов
pub fn format_error(err: &anyhow::Error) -> String {
    format!("ERROR: {}: {}", error_kind(err), err)
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
