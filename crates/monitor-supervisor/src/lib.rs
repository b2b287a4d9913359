//! Constructs one [`chain_monitor::ChainMonitor`] per configured chain and
//! manages their shared lifecycle: `start` launches all in parallel and
//! awaits their initialization, `stop` signals each monitor and then the
//! shared source fetcher.

use std::sync::Arc;
use std::time::Duration;

use chain_monitor::{
    ChainMonitor, ChainMonitorHandle, ChainSettings, DownstreamVerifier, MonitorState,
    PacingSettings,
};
use source_fetcher::SourceFetcher;

/// Fans out one chain monitor per entry of `chains` (sourced from either the
/// monitored-chains list or the test-chains list, gated by configuration
/// before reaching here) and tracks their handles.
pub struct MonitorSupervisor {
    handles: Vec<ChainMonitorHandle>,
    fetcher: SourceFetcher,
}

impl MonitorSupervisor {
    /// Spawns a `ChainMonitor` task per chain and returns once every one of
    /// them has left `Initializing` (either reaching `Polling` or falling
    /// back to `Stopped` when no RPC endpoint answered).
    pub async fn start(
        chains: Vec<ChainSettings>,
        pacing: PacingSettings,
        verifier: Arc<dyn DownstreamVerifier>,
        fetcher: SourceFetcher,
    ) -> Self {
        let mut handles = Vec::with_capacity(chains.len());
        for chain in chains {
            let chain_id = chain.chain_id;
            let (monitor, handle) =
                ChainMonitor::new(chain, pacing.clone(), verifier.clone(), fetcher.clone());
            tokio::spawn(monitor.run());
            tracing::info!(chain_id, "spawned chain monitor");
            handles.push(handle);
        }

        futures::future::join_all(handles.iter_mut().map(|handle| {
            let mut handle = handle.clone();
            async move {
                while matches!(handle.state(), MonitorState::Initializing) {
                    if handle.changed().await.is_err() {
                        break;
                    }
                }
            }
        }))
        .await;

        Self { handles, fetcher }
    }

    pub fn handles(&self) -> &[ChainMonitorHandle] {
        &self.handles
    }

    /// Signals every chain monitor to stop, then the shared source fetcher.
    /// Does not wait for monitors to fully reach `Stopped`; callers that
    /// need that can poll `handles()`.
    pub fn stop(&self) {
        for handle in &self.handles {
            handle.stop();
        }
        self.fetcher.stop();
    }

    /// Waits (with a per-chain ceiling) for every monitor to reach `Stopped`.
    pub async fn await_stopped(&self, per_chain_timeout: Duration) {
        for handle in &self.handles {
            let mut handle = handle.clone();
            let _ = tokio::time::timeout(
                per_chain_timeout,
                handle.wait_for_state(MonitorState::Stopped),
            )
            .await;
        }
    }
}
