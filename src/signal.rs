//! Signal bridge (`spec.md` §4.7): converts OS signals into [`ApplicationEvent`]s on the
//! application event channel. The handler itself never touches the supervisor directly —
//! it only publishes, so it stays async-signal-safe and cannot deadlock against whatever
//! the main loop happens to be doing.

use crate::event::channel::EventPublisher;
use crate::event::ApplicationEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Installs handlers for SIGINT/SIGTERM (stop) and SIGHUP (reload). A second
/// stop signal while one is already pending is coalesced: we don't publish twice,
/// but the caller can inspect [`SignalBridge::stop_requested_twice`] to detect a
/// user's "I mean it" double Ctrl-C and escalate to the emergency shutdown path
/// (`spec.md` §4.8 Phase 4).
pub struct SignalBridge {
    stop_seen: Arc<AtomicBool>,
}

impl SignalBridge {
    /// Registers the process-wide signal handler. May only be called once per process
    /// (a second call returns `ctrlc::Error::MultipleHandlers`).
    pub fn install(publisher: EventPublisher<ApplicationEvent>) -> Result<Self, ctrlc::Error> {
        let stop_seen = Arc::new(AtomicBool::new(false));
        let stop_seen_handler = stop_seen.clone();

        ctrlc::set_handler(move || {
            let already_seen = stop_seen_handler.swap(true, Ordering::SeqCst);
            if already_seen {
                info!("received a second stop signal, requesting immediate shutdown");
            } else {
                info!("received stop signal, requesting graceful shutdown");
            }
            let _ = publisher.publish(ApplicationEvent::StopRequested);
        })?;

        Ok(Self { stop_seen })
    }

    pub fn stop_requested_twice(&self) -> bool {
        self.stop_seen.load(Ordering::SeqCst)
    }
}

#[cfg(unix)]
pub mod reload {
    //! SIGHUP handling lives separately from [`super::SignalBridge`] since `ctrlc` only
    //! covers the termination-style signals; reload uses `signal-hook`'s lower-level
    //! flag registration instead.
    use crate::event::channel::EventPublisher;
    use crate::event::ApplicationEvent;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Spawns a background thread that polls a SIGHUP flag and republishes it as
    /// [`ApplicationEvent::ReloadRequested`]. Polling (rather than a dedicated signal
    /// thread callback) keeps this off the async-signal-safe hot path entirely.
    pub fn spawn_watcher(publisher: EventPublisher<ApplicationEvent>) -> Result<(), std::io::Error> {
        let flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(signal_hook::consts::SIGHUP, flag.clone())?;

        thread::Builder::new()
            .name("sighup-watcher".to_string())
            .spawn(move || loop {
                if flag.swap(false, Ordering::SeqCst) {
                    let _ = publisher.publish(ApplicationEvent::ReloadRequested);
                }
                thread::sleep(Duration::from_millis(200));
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::channel::pub_sub;

    #[test]
    fn stop_requested_twice_starts_false() {
        let (publisher, _consumer) = pub_sub::<ApplicationEvent>();
        let bridge = SignalBridge { stop_seen: Arc::new(AtomicBool::new(false)) };
        drop(publisher);
        assert!(!bridge.stop_requested_twice());
    }
}
