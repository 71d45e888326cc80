use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Once-per-second tick while a call has a start timestamp. The tick callback
/// returns `false` to end the task (call destroyed or timestamp cleared).
pub(crate) struct CallTimer {
    cancel: CancellationToken,
}

impl CallTimer {
    pub(crate) fn spawn<F, Fut>(parent: &CancellationToken, on_tick: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let cancel = parent.child_token();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick of a tokio interval fires immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    _ = interval.tick() => {
                        if !on_tick().await {
                            break;
                        }
                    }
                }
            }
            tracing::trace!("Call timer finished");
        });
        Self { cancel }
    }

    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for CallTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
