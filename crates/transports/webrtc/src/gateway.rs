//! Gateway child-process lifecycle
//!
//! Spawns the external signaling gateway, watches its standard output for
//! the readiness marker, and terminates it on demand.

use crate::{Error, Result};
use peercam_core::GatewayConfig;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Controller for the external signaling gateway process
///
/// Owned by the orchestrator and only driven while the registry lock is
/// held, so the handle needs no internal synchronization.
pub struct GatewayProcess {
    config: GatewayConfig,
    child: Option<Child>,
}

impl GatewayProcess {
    /// Create a controller; no process is spawned yet
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            child: None,
        }
    }

    /// Whether a gateway child is currently alive
    pub fn is_running(&mut self) -> bool {
        match self.child {
            Some(ref mut child) => child.try_wait().ok().flatten().is_none(),
            None => false,
        }
    }

    /// OS process id of the running gateway, if any
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Spawn the gateway and wait until it reports readiness
    ///
    /// Reads the child's standard output line by line until the configured
    /// readiness marker appears (bounded by `startup_timeout`; `None` waits
    /// forever), then sleeps the settle delay. A child that never becomes
    /// ready is killed before the error is returned.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("Gateway already running");
            return Ok(());
        }

        info!(
            "Starting gateway process: {}",
            self.config.command.display()
        );

        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::GatewaySpawn(format!(
                    "failed to spawn {}: {}",
                    self.config.command.display(),
                    e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::GatewaySpawn("gateway stdout not captured".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let readiness = Self::wait_ready(&mut lines, &self.config.ready_marker);
        let ready = match self.config.startup_timeout() {
            Some(limit) => match tokio::time::timeout(limit, readiness).await {
                Ok(result) => result,
                Err(_) => Err(Error::GatewaySpawn(format!(
                    "gateway not ready within {:?}",
                    limit
                ))),
            },
            None => readiness.await,
        };

        if let Err(e) = ready {
            let _ = child.kill().await;
            return Err(e);
        }

        // keep draining stdout so the child never blocks on a full pipe
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("[gateway] {}", line);
            }
        });

        tokio::time::sleep(self.config.settle_delay()).await;
        info!("Gateway ready");

        self.child = Some(child);
        Ok(())
    }

    async fn wait_ready<R>(lines: &mut tokio::io::Lines<R>, marker: &str) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!("[gateway] {}", line);
                    if line.contains(marker) {
                        return Ok(());
                    }
                }
                Ok(None) => {
                    return Err(Error::GatewaySpawn(
                        "gateway exited before reporting readiness".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(Error::GatewaySpawn(format!(
                        "failed reading gateway output: {}",
                        e
                    )));
                }
            }
        }
    }

    /// Terminate the gateway
    ///
    /// Safe to call when no process is held; the failure is reported
    /// without panicking so teardown always makes progress.
    pub async fn stop(&mut self) -> Result<()> {
        match self.child.take() {
            Some(mut child) => {
                info!("Stopping gateway process");
                child
                    .kill()
                    .await
                    .map_err(|e| Error::GatewayStopped(format!("failed to kill gateway: {}", e)))?;
                Ok(())
            }
            None => {
                warn!("Gateway stop requested but it is not running");
                Err(Error::GatewayStopped("gateway is not running".to_string()))
            }
        }
    }
}
