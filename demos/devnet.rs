//! # Example: devnet
//!
//! Three stand-in subsystems (node, proposer, batcher) under one supervisor.
//! The batcher gives up after a few seconds; the other two are stopped in turn
//! and the run returns the batcher's error. Press Ctrl-C earlier to stop the
//! group with the signal as the cause instead.
//!
//! ## Flow
//! ```text
//! Supervisor::run_until_signal(plan)
//!   ├─► spawn node, proposer, batcher
//!   ├─► after_startup()
//!   ├─► batcher fails (or SIGINT/SIGTERM)
//!   ├─► before_shutdown()
//!   └─► release steps: stop node, stop l2 output submitting, close tx manager, ...
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example devnet
//! ```

use std::sync::Arc;
use std::time::Duration;

use stackvisor::{
    LogWriter, Scope, Subscribe, SubsystemFn, SubsystemRef, Supervisor, SupervisorConfig,
    TaskError,
};
use tracing_subscriber::EnvFilter;

fn node() -> SubsystemRef {
    SubsystemFn::arc("node", |scope: Scope| async move {
        let log = scope.logger();
        log.info("node started");
        scope.defer("stop node", || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        });

        let mut tick = tokio::time::interval(Duration::from_millis(500));
        scope.mark_running();
        loop {
            tokio::select! {
                _ = scope.cancelled() => return Ok::<(), TaskError>(()),
                _ = tick.tick() => log.debug("derived l2 block"),
            }
        }
    })
}

fn proposer() -> SubsystemRef {
    SubsystemFn::arc("proposer", |scope: Scope| async move {
        let tx = scope.logger_for("proposer tx manager");
        tx.info("tx manager ready");
        scope.defer_close("close tx manager", move || tx.info("tx manager closed"));
        scope.defer_close("close dialer", || {});
        scope.defer("stop l2 output submitting", || async { Ok(()) });
        scope.run_until_cancelled().await
    })
}

fn batcher() -> SubsystemRef {
    SubsystemFn::arc("batcher", |scope: Scope| async move {
        scope.defer_close("close tx manager", || {});
        scope.mark_running();
        tokio::select! {
            _ = scope.cancelled() => Ok(()),
            _ = tokio::time::sleep(Duration::from_secs(3)) => {
                Err(TaskError::fail("channel full").in_step("publish tx data"))
            }
        }
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = SupervisorConfig {
        grace: Duration::from_secs(10),
        ..SupervisorConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sup = Supervisor::builder(cfg).with_subscribers(subs).build();

    match sup.run_until_signal(vec![node(), proposer(), batcher()]).await {
        Ok(()) => println!("stack stopped cleanly"),
        Err(err) => println!("stack stopped: {err} ({})", err.as_label()),
    }
}
