use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ethers::providers::{Http, Middleware, Provider};
use ethers::types::Address;
use source_fetcher::SourceFetcher;
use tokio::sync::watch;

use crate::downstream::{CreationData, DownstreamVerifier, InjectPayload};
use crate::settings::{ChainSettings, PacingSettings};
use crate::state::{ChainMonitorHandle, MonitorState};

/// Polls one chain's block stream, discovers contract creations, and drives
/// the bytecode -> metadata -> sources -> inject pipeline for each. See the
/// state machine description at module level in `lib.rs`.
pub struct ChainMonitor {
    settings: ChainSettings,
    pacing: PacingSettings,
    verifier: Arc<dyn DownstreamVerifier>,
    fetcher: SourceFetcher,
    running: Arc<AtomicBool>,
    state_tx: watch::Sender<MonitorState>,
}

impl ChainMonitor {
    pub fn new(
        settings: ChainSettings,
        pacing: PacingSettings,
        verifier: Arc<dyn DownstreamVerifier>,
        fetcher: SourceFetcher,
    ) -> (Self, ChainMonitorHandle) {
        pacing.assert_valid();
        let running = Arc::new(AtomicBool::new(true));
        let (state_tx, state_rx) = watch::channel(MonitorState::Initializing);
        let handle = ChainMonitorHandle {
            state_rx,
            running: running.clone(),
        };
        let monitor = Self {
            settings,
            pacing,
            verifier,
            fetcher,
            running,
            state_tx,
        };
        (monitor, handle)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: MonitorState) {
        let _ = self.state_tx.send(state);
    }

    /// Runs the monitor to completion: `Initializing` -> `Polling` ->
    /// (on stop) `Stopping` -> `Stopped`. Consumes `self`; spawn this on a
    /// dedicated task per chain.
    pub async fn run(self) {
        let Some((provider, mut current_block)) = self.initialize().await else {
            self.set_state(MonitorState::Stopped);
            return;
        };

        self.set_state(MonitorState::Polling);
        let mut pause = self.pacing.get_block_pause;

        while self.is_running() {
            match provider.get_block_with_txs(current_block).await {
                Ok(None) => {
                    pause = self.pacing.increase(pause);
                }
                Ok(Some(block)) => {
                    pause = self.pacing.decrease(pause);
                    for tx in &block.transactions {
                        if tx.to.is_some() {
                            continue;
                        }
                        self.handle_contract_creation(&provider, tx).await;
                    }
                    current_block += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        chain_id = self.settings.chain_id,
                        block = current_block,
                        error = %err,
                        "block fetch failed, rescheduling without advancing"
                    );
                }
            }

            if !self.is_running() {
                break;
            }
            tokio::time::sleep(pause).await;
        }

        self.set_state(MonitorState::Stopping);
        self.fetcher.stop();
        self.set_state(MonitorState::Stopped);
    }

    /// Iterates configured RPC endpoints, probing each with a timeout. Latches
    /// the first that answers and returns its provider plus the starting
    /// block (env override, else the probed current head).
    async fn initialize(&self) -> Option<(Provider<Http>, u64)> {
        for url in &self.settings.rpc_urls {
            let Ok(provider) = Provider::<Http>::try_from(url.as_str()) else {
                continue;
            };
            match tokio::time::timeout(self.pacing.web3_timeout, provider.get_block_number()).await
            {
                Ok(Ok(probed)) => {
                    let start = self
                        .settings
                        .start_block_override
                        .unwrap_or_else(|| probed.as_u64());
                    tracing::info!(
                        chain_id = self.settings.chain_id,
                        rpc = %url,
                        start_block = start,
                        "latched rpc endpoint"
                    );
                    return Some((provider, start));
                }
                Ok(Err(err)) => {
                    tracing::warn!(chain_id = self.settings.chain_id, rpc = %url, error = %err, "rpc probe failed");
                }
                Err(_) => {
                    tracing::warn!(chain_id = self.settings.chain_id, rpc = %url, "rpc probe timed out");
                }
            }
        }
        tracing::error!(
            chain_id = self.settings.chain_id,
            "no working rpc endpoint, exiting to Stopped"
        );
        None
    }

    async fn handle_contract_creation(
        &self,
        provider: &Provider<Http>,
        tx: &ethers::types::Transaction,
    ) {
        let address = ethers::utils::get_contract_address(tx.from, tx.nonce);
        match self.verifier.find_by_address(address, self.settings.chain_id).await {
            Ok(results) if !results.is_empty() => return,
            Err(err) => {
                tracing::warn!(chain_id = self.settings.chain_id, %address, error = %err, "verified-status lookup failed, proceeding as unverified");
            }
            _ => {}
        }

        let creation_data = CreationData {
            sender: tx.from,
            nonce: tx.nonce,
        };
        self.process_bytecode(
            provider.clone(),
            creation_data,
            address,
            self.pacing.initial_get_bytecode_tries,
        );
    }

    /// Fetches deployed code at `address`; retries on empty code up to
    /// `tries_left` times, then gives up silently. Fire-and-forget: spawns so
    /// the polling loop is never stalled by a contract's deployment still
    /// settling.
    fn process_bytecode(
        &self,
        provider: Provider<Http>,
        creation_data: CreationData,
        address: Address,
        tries_left: u32,
    ) {
        let running = self.running.clone();
        let fetcher = self.fetcher.clone();
        let verifier = self.verifier.clone();
        let chain_id = self.settings.chain_id;
        let retry_pause = self.pacing.get_bytecode_retry_pause;

        tokio::spawn(async move {
            let mut tries_left = tries_left;
            loop {
                if !running.load(Ordering::SeqCst) {
                    return;
                }
                let code = match provider.get_code(address, None).await {
                    Ok(code) => code,
                    Err(err) => {
                        tracing::warn!(chain_id, %address, error = %err, "get_code failed");
                        return;
                    }
                };
                if !code.0.is_empty() {
                    let deployed_bytecode = code.to_vec();
                    let source_address = match bytecode_pointer::decode_source_address(&deployed_bytecode) {
                        Ok(address) => address,
                        Err(err) => {
                            tracing::info!(chain_id, %address, error = %err, "no decodable metadata pointer, skipping");
                            return;
                        }
                    };

                    let verifier = verifier.clone();
                    let bytecode = deployed_bytecode.clone();
                    fetcher.enqueue(source_address, move |contract| {
                        inject_fire_and_forget(
                            verifier,
                            InjectPayload {
                                contract,
                                bytecode,
                                creation_data,
                                chain_id,
                                addresses: vec![address],
                            },
                        );
                    });
                    return;
                }

                if tries_left == 0 {
                    return;
                }
                tries_left -= 1;
                tokio::time::sleep(retry_pause).await;
            }
        });
    }
}

fn inject_fire_and_forget(verifier: Arc<dyn DownstreamVerifier>, payload: InjectPayload) {
    tokio::spawn(async move {
        let chain_id = payload.chain_id;
        let addresses = payload.addresses.clone();
        match verifier.inject(payload).await {
            Ok(()) => tracing::info!(chain_id, ?addresses, "injected verified contract"),
            Err(err) => tracing::warn!(chain_id, ?addresses, error = %err, "injection failed"),
        }
    });
}
