//! Periodic pulling with reset-on-read semantics.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use log::debug;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

pub type PullFn<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync + 'static>;
pub type PushFn<T> = Box<dyn Fn(T) + Send + Sync + 'static>;

/// Restarts the countdown of a [`PullTimer`].
///
/// Cheap to clone; holding one does not keep the timer task alive.
#[derive(Debug, Clone)]
pub struct TimerReset(Arc<Notify>);

impl TimerReset {
    pub fn reset(&self) {
        self.0.notify_one();
    }
}

/// Runs a pull function every `interval` and pushes successful results.
///
/// The countdown starts over whenever [`TimerReset::reset`] is called, so an
/// interval always passes between the last read, from any source, and the
/// next pull. The task is aborted when the timer is dropped.
#[derive(Debug)]
pub struct PullTimer {
    interval: Duration,
    reset: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl PullTimer {
    pub fn new(interval: Duration) -> Self {
        PullTimer {
            interval,
            reset: Arc::new(Notify::new()),
            task: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn reset_handle(&self) -> TimerReset {
        TimerReset(Arc::clone(&self.reset))
    }

    pub fn reset_timer(&self) {
        self.reset.notify_one();
    }

    /// Spawn the pull loop on the current tokio runtime.
    ///
    /// Calling this again replaces the running loop.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start<T: Send + 'static>(&mut self, pull: PullFn<T>, push: PushFn<T>) {
        self.stop();

        let interval = self.interval;
        let reset = Arc::clone(&self.reset);
        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        debug!("Pull timer fired after {:?}", interval);
                        match pull().await {
                            Ok(value) => push(value),
                            Err(e) => debug!("Pull failed: {}", e),
                        }
                    }
                    _ = reset.notified() => {}
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PullTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_pull(count: Arc<AtomicUsize>) -> PullFn<usize> {
        Box::new(move || {
            let count = Arc::clone(&count);
            async move { Ok(count.fetch_add(1, Ordering::SeqCst) + 1) }.boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulls_every_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let pushed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&pushed);

        let mut timer = PullTimer::new(Duration::from_secs(10));
        timer.start(
            counting_pull(Arc::clone(&count)),
            Box::new(move |v: usize| sink.lock().unwrap().push(v)),
        );
        assert!(timer.is_running());

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(*pushed.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restarts_countdown() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut timer = PullTimer::new(Duration::from_secs(10));
        timer.start(counting_pull(Arc::clone(&count)), Box::new(|_| {}));

        tokio::time::sleep(Duration::from_secs(6)).await;
        timer.reset_handle().reset();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_not_pushed() {
        let pushed = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&pushed);

        let mut timer = PullTimer::new(Duration::from_secs(1));
        timer.start::<f64>(
            Box::new(|| async { Err::<f64, _>(Error::HttpStatus(500)) }.boxed()),
            Box::new(move |_| {
                sink.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(pushed.load(Ordering::SeqCst), 0);
        assert!(timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_pulling() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut timer = PullTimer::new(Duration::from_secs(1));
        timer.start(counting_pull(Arc::clone(&count)), Box::new(|_| {}));
        timer.stop();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!timer.is_running());
    }
}
