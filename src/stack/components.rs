//! External collaborators of the rollup stack.
//!
//! The launcher only sequences and supervises; the node, proposer and batcher
//! are built by a [`StackComponents`] implementation. Each returned subsystem
//! acquires its resources inside [`Subsystem::run`](crate::Subsystem::run) and
//! registers every stop routine with [`Scope::defer`](crate::Scope::defer).

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::config::{BatcherConfig, NodeConfig, ProposerConfig};
use crate::error::TaskError;
use crate::tasks::SubsystemRef;

/// Minimal L1 client needed during launch; also handed to the tx managers.
#[async_trait]
pub trait L1Client: Send + Sync + 'static {
    /// Chain id of the L1 network.
    async fn chain_id(&self) -> Result<u64, TaskError>;
}

/// Factory for the stack's subsystems.
#[async_trait]
pub trait StackComponents: Send + Sync + 'static {
    /// Connects to the L1 JSON-RPC endpoint.
    async fn dial_l1(&self, url: &Url) -> Result<Arc<dyn L1Client>, TaskError>;

    /// The rollup consensus node (sequencer).
    fn node(&self, cfg: NodeConfig) -> SubsystemRef;

    /// The L2 output proposer.
    fn proposer(&self, cfg: ProposerConfig) -> SubsystemRef;

    /// The batch submitter.
    fn batcher(&self, cfg: BatcherConfig) -> SubsystemRef;
}
