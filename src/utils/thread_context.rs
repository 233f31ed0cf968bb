//! Cooperative-task primitive: a named OS thread paired with a one-shot "please stop"
//! channel. The callback is handed the stop-consumer and is expected to check it
//! (typically via `is_cancelled`/`recv_timeout` on its own sleep) between units of work.

use std::thread::{sleep, JoinHandle};
use std::time::Duration;

use crate::event::cancellation::CancellationMessage;
use crate::event::channel::{pub_sub, EventConsumer, EventPublisher};
use crate::utils::threads::spawn_named_thread;

const GRACEFUL_STOP_RETRY: u16 = 10;
const GRACEFUL_STOP_RETRY_INTERVAL: Duration = Duration::from_millis(100);

pub struct NotStartedThreadContext<F, T>
where
    F: FnOnce(EventConsumer<CancellationMessage>) -> T + Send + 'static,
    T: Send + 'static,
{
    thread_name: String,
    callback: F,
}

impl<F, T> NotStartedThreadContext<F, T>
where
    F: FnOnce(EventConsumer<CancellationMessage>) -> T + Send + 'static,
    T: Send + 'static,
{
    pub fn new<S: Into<String>>(thread_name: S, callback: F) -> Self {
        Self {
            thread_name: thread_name.into(),
            callback,
        }
    }

    pub fn start(self) -> StartedThreadContext {
        let (stop_publisher, stop_consumer) = pub_sub::<CancellationMessage>();

        StartedThreadContext::new(
            self.thread_name.clone(),
            stop_publisher,
            spawn_named_thread(&self.thread_name, move || {
                (self.callback)(stop_consumer);
            }),
        )
    }
}

pub struct StartedThreadContext {
    thread_name: String,
    stop_publisher: EventPublisher<CancellationMessage>,
    join_handle: JoinHandle<()>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ThreadContextStopperError {
    #[error("error sending stop signal to '{0}' thread: {1}")]
    EventPublisherError(String, String),

    #[error("error joining '{0}' thread")]
    JoinError(String),

    #[error("timeout waiting for '{0}' thread to finish")]
    StopTimeout(String),
}

impl StartedThreadContext {
    pub fn new(
        thread_name: String,
        stop_publisher: EventPublisher<CancellationMessage>,
        join_handle: JoinHandle<()>,
    ) -> Self {
        Self {
            thread_name,
            stop_publisher,
            join_handle,
        }
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Publishes the stop signal without waiting for the thread to exit. Safe to call
    /// more than once or alongside [`Self::stop`]/[`Self::stop_blocking`].
    pub fn signal_stop(&self) -> Result<(), ThreadContextStopperError> {
        self.stop_publisher.publish(()).map_err(|err| {
            ThreadContextStopperError::EventPublisherError(
                self.thread_name.clone(),
                err.to_string(),
            )
        })
    }

    /// Sends the stop signal and polls until the thread finishes, up to `deadline`.
    /// On timeout the `JoinHandle` is dropped without joining — the thread is
    /// considered leaked and the caller should log it.
    pub fn join_within(self, deadline: Duration) -> Result<(), ThreadContextStopperError> {
        let _ = self.signal_stop();
        let retries = (deadline.as_millis() / GRACEFUL_STOP_RETRY_INTERVAL.as_millis()).max(1);
        for _ in 0..retries {
            if self.join_handle.is_finished() {
                return self.join_handle.join().map_err(|err| {
                    ThreadContextStopperError::JoinError(
                        err.downcast_ref::<&str>()
                            .unwrap_or(&"unknown error")
                            .to_string(),
                    )
                });
            }
            sleep(GRACEFUL_STOP_RETRY_INTERVAL);
        }
        Err(ThreadContextStopperError::StopTimeout(self.thread_name))
    }

    /// Sends the stop signal and waits with the default retry budget
    /// (`GRACEFUL_STOP_RETRY` * `GRACEFUL_STOP_RETRY_INTERVAL`, i.e. ~1s).
    pub fn stop(self) -> Result<(), ThreadContextStopperError> {
        self.join_within(GRACEFUL_STOP_RETRY_INTERVAL * GRACEFUL_STOP_RETRY as u32)
    }

    /// Sends the stop signal and blocks until the thread exits, however long that takes.
    pub fn stop_blocking(self) -> Result<(), ThreadContextStopperError> {
        self.signal_stop().map_err(|err| {
            ThreadContextStopperError::EventPublisherError(
                self.thread_name.clone(),
                err.to_string(),
            )
        })?;
        self.join_handle.join().map_err(|err| {
            ThreadContextStopperError::JoinError(
                err.downcast_ref::<&str>()
                    .unwrap_or(&"unknown error")
                    .to_string(),
            )
        })
    }
}
