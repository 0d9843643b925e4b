//! Fixed-cadence background polling

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::api::OrchestratorApi;
use crate::session::Session;
use crate::sync::Dashboard;
use crate::view::DashboardView;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Called with the fresh view after every poll, failed or not
pub type OnTick = Box<dyn Fn(&DashboardView) + Send + Sync>;

/// Handle to a running poller. Polls are serialized inside the task; a tick
/// that comes due while a poll is still running is skipped.
pub struct AutoRefresh {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl AutoRefresh {
    /// Starts polling; the first poll fires immediately
    pub fn start<A>(
        dashboard: Arc<Dashboard<A>>,
        session: Option<Session>,
        every: Duration,
        on_tick: Option<OnTick>,
    ) -> Self
    where
        A: OrchestratorApi + 'static,
    {
        let (stop, mut stopped) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        if let Err(e) = dashboard.refresh_all(session.as_ref()).await {
                            warn!("auto-refresh failed: {}", e);
                        }
                        if let Some(callback) = &on_tick {
                            callback(&dashboard.view());
                        }
                    }
                }
            }
            debug!("auto-refresh stopped");
        });

        Self { stop, task }
    }

    /// Signals the poller and waits for it to exit. An in-flight poll is
    /// allowed to finish; none fires afterwards.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            warn!("auto-refresh task ended abnormally: {}", e);
        }
    }
}
