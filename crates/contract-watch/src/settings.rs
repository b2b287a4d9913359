//! Flat environment-variable configuration, per the variable table named by
//! the contract verification core: `MONITOR_START_<chainId>`,
//! `BLOCK_PAUSE_FACTOR`, `BLOCK_PAUSE_UPPER_LIMIT`, `BLOCK_PAUSE_LOWER_LIMIT`,
//! `WEB3_TIMEOUT`, `GET_BYTECODE_RETRY_PAUSE`, `GET_BLOCK_PAUSE`,
//! `INITIAL_GET_BYTECODE_TRIES`. These are flat, unnamespaced variable names
//! rather than the `SERVICE_NAME__...` convention `blockscout-service-launcher`'s
//! `ConfigSettings` always applies, so this loader builds a `config::Config`
//! directly instead of going through that trait.

use std::time::Duration;

use chain_monitor::{ChainSettings, PacingSettings};
use serde::Deserialize;

/// The chain-list configuration is named an external collaborator; this is a
/// minimal concrete loader so the binary is runnable, read from the file
/// named by `CHAINS_CONFIG_PATH`.
#[derive(Debug, Clone, Deserialize, Default)]
struct ChainList {
    #[serde(default)]
    monitored_chains: Vec<ChainDescriptor>,
    #[serde(default)]
    test_chains: Vec<ChainDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChainDescriptor {
    chain_id: u64,
    name: String,
    rpc_urls: Vec<String>,
}

pub struct Settings {
    pub chains: Vec<ChainSettings>,
    pub pacing: PacingSettings,
    pub downstream_verifier_url: String,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let env = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let pacing = PacingSettings {
            block_pause_factor: env.get_float("block_pause_factor").unwrap_or(1.1),
            block_pause_upper_limit: millis(env.get_int("block_pause_upper_limit").ok(), 30_000),
            block_pause_lower_limit: millis(env.get_int("block_pause_lower_limit").ok(), 500),
            web3_timeout: millis(env.get_int("web3_timeout").ok(), 3_000),
            get_bytecode_retry_pause: millis(env.get_int("get_bytecode_retry_pause").ok(), 5_000),
            get_block_pause: millis(env.get_int("get_block_pause").ok(), 10_000),
            initial_get_bytecode_tries: env
                .get_int("initial_get_bytecode_tries")
                .ok()
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(3),
        };
        pacing.assert_valid();

        let downstream_verifier_url = env
            .get_string("downstream_verifier_url")
            .unwrap_or_else(|_| "http://localhost:8050".to_string());

        let chains_config_path = env
            .get_string("chains_config_path")
            .unwrap_or_else(|_| "chains.json".to_string());
        let use_test_chains = env
            .get_bool("use_test_chains")
            .unwrap_or(false);

        let chain_list: ChainList = config::Config::builder()
            .add_source(config::File::with_name(&chains_config_path).required(false))
            .build()?
            .try_deserialize()
            .unwrap_or_default();

        let descriptors = if use_test_chains {
            chain_list.test_chains
        } else {
            chain_list.monitored_chains
        };

        let chains = descriptors
            .into_iter()
            .map(|descriptor| {
                let start_block_override = std::env::var(format!(
                    "MONITOR_START_{}",
                    descriptor.chain_id
                ))
                .ok()
                .and_then(|v| v.parse::<u64>().ok());

                let rpc_urls = descriptor
                    .rpc_urls
                    .iter()
                    .filter_map(|raw| url::Url::parse(raw).ok())
                    .collect();

                ChainSettings {
                    chain_id: descriptor.chain_id,
                    name: descriptor.name,
                    rpc_urls,
                    start_block_override,
                }
            })
            .collect();

        Ok(Self {
            chains,
            pacing,
            downstream_verifier_url,
        })
    }
}

fn millis(value: Option<i64>, default_ms: u64) -> Duration {
    value
        .and_then(|v| u64::try_from(v).ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_ms))
}
