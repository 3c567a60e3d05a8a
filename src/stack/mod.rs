//! # Rollup stack launcher.
//!
//! [`OpStack`] runs a consensus node, an L2 output proposer and a batch
//! submitter as one supervised group. The first of them to exit stops the
//! other two; so does cancelling the parent token.
//!
//! ## Launch order
//! ```text
//! step "dial l1"          components.dial_l1(l1_url)
//! spawn node              NodeConfig::from_stack
//! step "get l1 chain id"  l1.chain_id()
//!                         TxManagerConfig (shared by proposer and batcher)
//! spawn proposer          ProposerConfig
//! spawn batcher           BatcherConfig
//! after_startup()
//! ```
//! A failing step is a startup error: the node (if already spawned) is stopped
//! and `run` returns [`RuntimeError::Startup`].

mod components;
mod config;

pub use components::{L1Client, StackComponents};
pub use config::{
    Address, BatcherConfig, ChannelConfig, CompressorConfig, ConfigError, NodeConfig,
    ProposerConfig, RollupConfig, SignerKey, StackConfig, TxManagerConfig,
};

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{CauseToken, Launch, Launcher, Supervisor, SupervisorConfig};
use crate::error::{RuntimeError, TaskError};
use crate::listener::EventListener;

/// The rollup stack: node, proposer and batcher under one supervisor.
pub struct OpStack {
    cfg: StackConfig,
    components: Arc<dyn StackComponents>,
    supervisor: Arc<Supervisor>,
}

impl OpStack {
    /// Creates a stack with a default supervisor reporting to `listener`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        cfg: StackConfig,
        components: Arc<dyn StackComponents>,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        let supervisor = Supervisor::builder(SupervisorConfig::default())
            .with_listener(listener)
            .build();
        Self::with_supervisor(cfg, components, supervisor)
    }

    /// Creates a stack run by a preconfigured supervisor (grace period, subscribers).
    pub fn with_supervisor(
        cfg: StackConfig,
        components: Arc<dyn StackComponents>,
        supervisor: Arc<Supervisor>,
    ) -> Self {
        Self {
            cfg,
            components,
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Runs the stack until a component exits or `parent` is cancelled.
    pub async fn run(&self, parent: &CauseToken) -> Result<(), RuntimeError> {
        let plan = StackPlan {
            cfg: self.cfg.clone(),
            components: Arc::clone(&self.components),
        };
        self.supervisor.run(parent, plan).await
    }
}

struct StackPlan {
    cfg: StackConfig,
    components: Arc<dyn StackComponents>,
}

#[async_trait]
impl Launch for StackPlan {
    async fn launch(self, launcher: &mut Launcher) -> Result<(), TaskError> {
        let log = launcher.logger_for("op stack");
        let node = NodeConfig::from_stack(&self.cfg)
            .map_err(|e| TaskError::fail(e.to_string()).in_step("node config"))?;

        let l1 = launcher
            .step("dial l1", self.components.dial_l1(&self.cfg.l1_url))
            .await?;
        launcher.spawn(self.components.node(node));

        let chain_id = launcher.step("get l1 chain id", l1.chain_id()).await?;
        log.debug(format!("l1 chain id {chain_id}"));
        let tx_manager = TxManagerConfig::new(chain_id, self.cfg.signer.clone(), l1);

        launcher.spawn(
            self.components
                .proposer(ProposerConfig::new(&self.cfg, tx_manager.clone())),
        );
        launcher.spawn(self.components.batcher(BatcherConfig::new(&self.cfg, tx_manager)));
        Ok(())
    }
}
