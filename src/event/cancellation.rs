//! Marker event published on a thread's dedicated stop channel. Carries no data — the
//! act of receiving anything at all on that channel means "stop".
use super::channel::EventConsumer;
use crossbeam::channel::RecvTimeoutError;
use std::time::Duration;

pub type CancellationMessage = ();

impl EventConsumer<CancellationMessage> {
    /// Blocks up to `timeout`, returning `true` as soon as a stop message (or a
    /// disconnect) arrives, `false` if `timeout` elapses with nothing received.
    pub fn is_cancelled(&self, timeout: Duration) -> bool {
        let timed_out = matches!(
            self.as_ref().recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        );
        !timed_out
    }
}
