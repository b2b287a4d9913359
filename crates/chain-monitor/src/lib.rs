//! Per-chain polling state machine.
//!
//! *Initializing*: probe configured RPC endpoints until one answers, latch
//! it, move to *Polling* with the probed or overridden starting block.
//! *Polling*: fetch `block(current_block, with_txs=true)` on a loop whose
//! pause adapts (widened on empty blocks, narrowed on nonempty ones) and
//! for every contract-creating transaction, drive bytecode -> metadata ->
//! sources -> inject. *Stopping*/*Stopped*: `running` flips false, no further
//! timer re-arms, in-flight work completes without re-scheduling.

mod downstream;
mod monitor;
mod settings;
mod state;

pub use downstream::{CreationData, DownstreamError, DownstreamVerifier, InjectPayload};
pub use monitor::ChainMonitor;
pub use settings::{ChainSettings, PacingSettings};
pub use state::{ChainMonitorHandle, MonitorState};
