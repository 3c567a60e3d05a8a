//! # Rollup stack configuration.
//!
//! [`StackConfig`] is what the caller provides; the per-component configs
//! ([`NodeConfig`], [`TxManagerConfig`], [`ProposerConfig`], [`BatcherConfig`])
//! are derived from it by the launcher with fixed devnet values.
//!
//! ## Derived values
//! ```text
//! node:      batch size 10, max concurrency 10, zero JWT secret, sequencer on,
//!            RPC listen host/port taken from node_url
//! tx:        10 confirmations, 10s network timeout, fee limit x5,
//!            48s resubmission, 12s receipt polling, 2m not-in-mempool, 3 nonce-too-low
//! proposer:  50ms poll, 2s network timeout
//! batcher:   50ms poll, 10s network timeout,
//!            channel: duration 1, safety margin 4, frame size u64::MAX,
//!            compressor: 100_000 byte frames, 1 frame, ratio 0.4
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use super::components::L1Client;

/// Errors raised while parsing or deriving stack configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Input was not valid hex.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Decoded value has the wrong size.
    #[error("expected {expected} bytes, got {got}")]
    Length {
        /// Required byte length.
        expected: usize,
        /// Decoded byte length.
        got: usize,
    },

    /// A URL lacks a part the stack needs.
    #[error("{url} has no {part}")]
    Url {
        /// The offending URL.
        url: String,
        /// Missing part (`host`, `port`).
        part: &'static str,
    },

    /// Rollup config JSON could not be decoded.
    #[error("invalid rollup config: {0}")]
    Rollup(String),
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ConfigError> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw)?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ConfigError::Length { expected: N, got })
}

/// 20-byte L1 account or contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl FromStr for Address {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s).map(Address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Private key used to sign proposer and batcher transactions.
///
/// Never printed: `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SignerKey([u8; 32]);

impl SignerKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for SignerKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s).map(SignerKey)
    }
}

impl fmt::Debug for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SignerKey(<redacted>)")
    }
}

/// Rollup chain parameters.
///
/// Only the fields the launcher reads are typed; everything else is kept as-is
/// and handed to the node untouched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RollupConfig {
    /// Sequencing window, in L1 blocks.
    pub seq_window_size: u64,
    /// Channel timeout, in L1 blocks.
    pub channel_timeout: u64,
    /// Remaining fields of the rollup config document.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl RollupConfig {
    /// Decodes a rollup config JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Rollup(e.to_string()))
    }
}

/// Everything needed to launch the stack.
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// L1 JSON-RPC endpoint.
    pub l1_url: Url,
    /// L2 execution engine endpoint.
    pub engine_url: Url,
    /// Address the consensus node serves its RPC on.
    pub node_url: Url,
    /// Key signing proposer and batcher transactions.
    pub signer: SignerKey,
    pub rollup: Arc<RollupConfig>,
    /// L2 output oracle (proxy) contract on L1.
    pub output_oracle: Address,
}

/// Consensus node parameters.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub l1_addr: Url,
    pub l1_batch_size: usize,
    pub l1_max_concurrency: usize,
    pub engine_addr: Url,
    pub engine_jwt_secret: [u8; 32],
    pub sequencer_enabled: bool,
    pub rpc_listen_host: String,
    pub rpc_listen_port: u16,
    pub rollup: Arc<RollupConfig>,
}

impl NodeConfig {
    /// Derives the node config; the RPC listen address comes from `node_url`.
    pub fn from_stack(cfg: &StackConfig) -> Result<Self, ConfigError> {
        let missing = |part| ConfigError::Url {
            url: cfg.node_url.to_string(),
            part,
        };
        let host = cfg.node_url.host_str().ok_or_else(|| missing("host"))?;
        let port = cfg
            .node_url
            .port_or_known_default()
            .ok_or_else(|| missing("port"))?;

        Ok(Self {
            l1_addr: cfg.l1_url.clone(),
            l1_batch_size: 10,
            l1_max_concurrency: 10,
            engine_addr: cfg.engine_url.clone(),
            engine_jwt_secret: [0; 32],
            sequencer_enabled: true,
            rpc_listen_host: host.to_string(),
            rpc_listen_port: port,
            rollup: Arc::clone(&cfg.rollup),
        })
    }
}

/// Transaction manager settings, shared by the proposer and the batcher.
#[derive(Clone)]
pub struct TxManagerConfig {
    pub l1: Arc<dyn L1Client>,
    pub chain_id: u64,
    pub signer: SignerKey,
    pub num_confirmations: u64,
    pub network_timeout: Duration,
    pub fee_limit_multiplier: u64,
    pub resubmission_timeout: Duration,
    pub receipt_query_interval: Duration,
    pub tx_not_in_mempool_timeout: Duration,
    pub safe_abort_nonce_too_low_count: u64,
}

impl TxManagerConfig {
    /// Tx manager defaults for the given L1 chain.
    pub fn new(chain_id: u64, signer: SignerKey, l1: Arc<dyn L1Client>) -> Self {
        Self {
            l1,
            chain_id,
            signer,
            num_confirmations: 10,
            network_timeout: Duration::from_secs(10),
            fee_limit_multiplier: 5,
            resubmission_timeout: Duration::from_secs(48),
            receipt_query_interval: Duration::from_secs(12),
            tx_not_in_mempool_timeout: Duration::from_secs(2 * 60),
            safe_abort_nonce_too_low_count: 3,
        }
    }
}

impl fmt::Debug for TxManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxManagerConfig")
            .field("chain_id", &self.chain_id)
            .field("signer", &self.signer)
            .field("num_confirmations", &self.num_confirmations)
            .field("network_timeout", &self.network_timeout)
            .field("fee_limit_multiplier", &self.fee_limit_multiplier)
            .field("resubmission_timeout", &self.resubmission_timeout)
            .field("receipt_query_interval", &self.receipt_query_interval)
            .field("tx_not_in_mempool_timeout", &self.tx_not_in_mempool_timeout)
            .field("safe_abort_nonce_too_low_count", &self.safe_abort_nonce_too_low_count)
            .finish_non_exhaustive()
    }
}

/// Output proposer parameters.
#[derive(Debug, Clone)]
pub struct ProposerConfig {
    pub poll_interval: Duration,
    pub network_timeout: Duration,
    pub output_oracle: Address,
    /// Rollup RPC of the node the proposer reads outputs from.
    pub rollup_rpc: Url,
    pub tx_manager: TxManagerConfig,
}

impl ProposerConfig {
    pub fn new(cfg: &StackConfig, tx_manager: TxManagerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            network_timeout: Duration::from_secs(2),
            output_oracle: cfg.output_oracle,
            rollup_rpc: cfg.node_url.clone(),
            tx_manager,
        }
    }
}

/// Batch compression targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorConfig {
    pub target_frame_size: u64,
    pub target_num_frames: usize,
    pub approx_compr_ratio: f64,
}

/// Channel building parameters of the batcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    pub seq_window_size: u64,
    pub channel_timeout: u64,
    pub max_channel_duration: u64,
    pub sub_safety_margin: u64,
    pub max_frame_size: u64,
    pub compressor: CompressorConfig,
}

impl ChannelConfig {
    /// Devnet channel settings; window and timeout come from the rollup config.
    pub fn for_rollup(rollup: &RollupConfig) -> Self {
        Self {
            seq_window_size: rollup.seq_window_size,
            channel_timeout: rollup.channel_timeout,
            max_channel_duration: 1,
            sub_safety_margin: 4,
            max_frame_size: u64::MAX,
            compressor: CompressorConfig {
                target_frame_size: 100_000,
                target_num_frames: 1,
                approx_compr_ratio: 0.4,
            },
        }
    }
}

/// Batch submitter parameters.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    pub poll_interval: Duration,
    pub network_timeout: Duration,
    pub engine_rpc: Url,
    pub rollup_rpc: Url,
    pub rollup: Arc<RollupConfig>,
    pub channel: ChannelConfig,
    pub tx_manager: TxManagerConfig,
}

impl BatcherConfig {
    pub fn new(cfg: &StackConfig, tx_manager: TxManagerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            network_timeout: Duration::from_secs(10),
            engine_rpc: cfg.engine_url.clone(),
            rollup_rpc: cfg.node_url.clone(),
            rollup: Arc::clone(&cfg.rollup),
            channel: ChannelConfig::for_rollup(&cfg.rollup),
            tx_manager,
        }
    }
}
