use std::{future::Future, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info};

/// Runs `tick` once per period, the first time one period after spawning.
/// Ticks never overlap; a slow tick delays the next one instead of bunching.
pub struct RefreshScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    pub fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut stop) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("refreshing every {}s", period.as_secs());

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        debug!("scheduled refresh");
                        tick().await;
                    }
                    _ = stop.changed() => break,
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Stops ticking. A tick already in progress runs to completion.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
