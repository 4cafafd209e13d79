use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pub use tokio::task::{spawn, JoinError, JoinHandle};

/// A spawned task that is aborted when dropped.
///
/// Used for background workers whose lifetime must not exceed the owner that
/// started them (e.g., a punch sender bound to one attempt).
pub struct ScopedTask<T> {
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> ScopedTask<T> {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            handle: tokio::task::spawn(future),
        }
    }
}

impl<T> ScopedTask<T> {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Future for ScopedTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

impl<T> Drop for ScopedTask<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::ScopedTask;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn scoped_task_yields_output() {
        let task = ScopedTask::spawn(async { 7u8 });
        assert_eq!(task.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn scoped_task_aborts_on_drop() {
        let reached = Arc::new(AtomicBool::new(false));
        let flag = reached.clone();
        let task = ScopedTask::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
        });

        drop(task);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!reached.load(Ordering::SeqCst));
    }
}
