use super::{
    errors::JobError,
    model::JoinOrdering,
    result::JobResult,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll}
};
use futures::{
    future::join_all,
    stream::{FuturesUnordered, StreamExt},
};
use tokio::sync::oneshot::{self, error::TryRecvError};


/// Тип джоба в очереди пула: уже обёрнутый, с отправкой результата внутри
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;


/// Handle на результат джоба.
/// Можно дождаться блокирующе (`wait`) или через `.await`
pub struct JobHandle<T> {
    receiver: oneshot::Receiver<JobResult<T>>,
}

impl<T> JobHandle<T> {

    pub(crate) fn new(receiver: oneshot::Receiver<JobResult<T>>) -> Self {
        Self { receiver }
    }

    /// Блокирует текущий поток до завершения джоба.
    /// Не вызывать изнутри async-контекста - там нужен `.await`
    pub fn wait(self) -> JobResult<T> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(JobError::ChannelClosed))
    }

    /// `None`, пока джоб ещё в очереди или выполняется
    pub fn try_result(&mut self) -> Option<JobResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(JobError::ChannelClosed)),
        }
    }
}

impl<T> Future for JobHandle<T> {
    type Output = JobResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(JobError::ChannelClosed))),
            Poll::Pending => Poll::Pending,
        }
    }
}


/// Собирает результаты набора handles.
/// `Ordered` - в порядке handles, `UnOrdered` - в порядке завершения
pub async fn join_handles<T>(handles: Vec<JobHandle<T>>, ordering: JoinOrdering) -> Vec<JobResult<T>> {
    if handles.is_empty() {
        return Vec::new();
    }

    match ordering {
        JoinOrdering::Ordered => join_all(handles).await,
        JoinOrdering::UnOrdered => {
            let len = handles.len();
            let mut futures = FuturesUnordered::from_iter(handles);
            let mut results = Vec::with_capacity(len);

            while let Some(result) = futures.next().await {
                results.push(result);
            }

            results
        }
    }
}
