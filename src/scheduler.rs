//! Timer glue for the repository's event loop.
//!
//! Every timeout in the core is a scheduled delivery of a typed event into
//! the owning actor's channel: a timer that fires posts its event like any
//! other completion, and a cancelled timer posts nothing. There is no
//! callback capture; the state the timeout guards stays inside the actor.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Schedules typed events after a delay on behalf of one actor channel.
#[derive(Clone)]
pub struct Scheduler<E: Send + 'static> {
    tx: mpsc::Sender<E>,
}

impl<E: Send + 'static> Scheduler<E> {
    pub fn new(tx: mpsc::Sender<E>) -> Self {
        Self { tx }
    }

    /// Deliver `event` into the actor channel after `delay`, unless the
    /// returned handle is cancelled (or dropped) first.
    pub fn schedule_after(&self, delay: Duration, event: E) -> TimerHandle {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the actor is shutting down.
            let _ = tx.send(event).await;
        });
        TimerHandle {
            task,
            detached: false,
        }
    }
}

/// Cancellable handle to one scheduled event. Dropping the handle cancels
/// the timer, so replacing a stored handle replaces the pending timeout.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
    detached: bool,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Let the timer outlive the handle. For timers with no owner to cancel
    /// them, like a rescheduled storage retry.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if !self.detached {
            self.task.abort();
        }
    }
}
