use super::errors::JobError;

pub type JobResult<T> = Result<T, JobError>;
