// mockbrew-core/src/smoke.rs
//! Post-install smoke test: start the installed server on a free port, wait
//! until `PUT /status` succeeds, send `PUT /stop`, and wait for the process
//! to exit.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use mockbrew_aio::fs::create_dir_all;
use mockbrew_aio::process::SupervisedChild;
use mockbrew_common::config::{Config, SmokeSettings};
use mockbrew_common::error::{MbError, Result};
use mockbrew_common::keg::InstalledKeg;
use mockbrew_net::port::reserve_ephemeral_port;
use mockbrew_net::probe::{Backoff, ServerProbe};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::install::InstallReceipt;

/// How long a failing test gives the server to honour SIGTERM before killing it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmokeStage {
    Start,
    PortReserved,
    ServerLaunched,
    Polling,
    Ready,
    StopRequested,
    Done,
}

impl fmt::Display for SmokeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::PortReserved => "port_reserved",
            Self::ServerLaunched => "server_launched",
            Self::Polling => "polling",
            Self::Ready => "ready",
            Self::StopRequested => "stop_requested",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct SmokeReport {
    pub port: u16,
    pub status_attempts: u32,
    pub ready_after: Duration,
    /// `None` when the stop request itself failed at the transport level.
    pub stop_status: Option<StatusCode>,
    pub exit_status: ExitStatus,
}

#[derive(Debug, Clone)]
pub struct SmokeTest {
    launcher: PathBuf,
    port_flag: String,
    port: Option<u16>,
    settings: SmokeSettings,
    output_log: Option<PathBuf>,
}

impl SmokeTest {
    pub fn new(launcher: impl Into<PathBuf>) -> Self {
        Self {
            launcher: launcher.into(),
            port_flag: "-serverPort".to_string(),
            port: None,
            settings: SmokeSettings::default(),
            output_log: None,
        }
    }

    /// Tests an installed keg the way its receipt says it was installed:
    /// through the recorded product link and port flag, with server output
    /// going to `smoke-test.log` in the keg's log dir.
    pub fn for_keg(keg: &InstalledKeg, config: &Config) -> Result<Self> {
        let receipt = InstallReceipt::read(&keg.path)?;
        debug!(
            "Smoke testing {} {} via {}",
            receipt.name,
            receipt.version,
            receipt.launcher.display()
        );
        Ok(Self::new(receipt.launcher)
            .port_flag(&receipt.port_flag)
            .settings(config.smoke)
            .output_log(receipt.log_dir.join("smoke-test.log")))
    }

    pub fn port_flag(mut self, flag: &str) -> Self {
        self.port_flag = flag.to_string();
        self
    }

    /// Uses `port` instead of reserving an ephemeral one.
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn settings(mut self, settings: SmokeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn output_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_log = Some(path.into());
        self
    }

    pub fn launcher(&self) -> &Path {
        &self.launcher
    }

    pub fn port_flag_name(&self) -> &str {
        &self.port_flag
    }

    /// Errors carry the stage that was in progress when the test failed.
    pub async fn run(&self) -> Result<SmokeReport> {
        let mut stage = SmokeStage::Start;

        advance(&mut stage, SmokeStage::PortReserved);
        let port = match self.port {
            Some(p) => p,
            None => reserve_ephemeral_port().map_err(|e| failed(stage, e))?,
        };

        advance(&mut stage, SmokeStage::ServerLaunched);
        let probe = ServerProbe::localhost(port).map_err(|e| failed(stage, e))?;
        if let Some(parent) = self.output_log.as_deref().and_then(Path::parent) {
            create_dir_all(parent).map_err(|e| failed(stage, e))?;
        }
        let args = vec![self.port_flag.clone(), port.to_string()];
        let mut child = SupervisedChild::spawn(&self.launcher, &args, self.output_log.as_deref())
            .map_err(|e| failed(stage, e))?;
        info!(
            "Started {} on port {} (pid {:?})",
            self.launcher.display(),
            port,
            child.id()
        );

        advance(&mut stage, SmokeStage::Polling);
        let backoff = Backoff::new(
            self.settings.poll_initial_delay,
            self.settings.poll_max_delay,
        );
        let ready = probe
            .wait_until_ready(&backoff, self.settings.ready_timeout, || {
                match child.try_exit_status()? {
                    Some(status) => Err(MbError::ServerExited(format!(
                        "{} exited with {}",
                        self.launcher.display(),
                        status
                    ))),
                    None => Ok(()),
                }
            })
            .await;
        let ready = match ready {
            Ok(r) => r,
            Err(e) => {
                shut_down(&mut child).await;
                return Err(failed(stage, e));
            }
        };
        advance(&mut stage, SmokeStage::Ready);

        advance(&mut stage, SmokeStage::StopRequested);
        // Sent once; the outcome is recorded but does not decide the test. A
        // lost stop request shows up as an exit timeout below.
        let stop_status = match probe.stop().await {
            Ok(status) => {
                if !status.is_success() {
                    warn!("Stop request answered {}", status);
                }
                Some(status)
            }
            Err(e) => {
                warn!("Stop request failed: {}; waiting for exit anyway", e);
                None
            }
        };

        let exit_status = match child.wait_timeout(self.settings.stop_timeout).await {
            Ok(status) => status,
            Err(e) => {
                shut_down(&mut child).await;
                return Err(failed(stage, e));
            }
        };
        if !exit_status.success() {
            warn!("Server exited with {} after stop", exit_status);
        }
        advance(&mut stage, SmokeStage::Done);

        Ok(SmokeReport {
            port,
            status_attempts: ready.attempts,
            ready_after: ready.elapsed,
            stop_status,
            exit_status,
        })
    }
}

fn advance(stage: &mut SmokeStage, next: SmokeStage) {
    debug!("Smoke test: {} -> {}", stage, next);
    *stage = next;
}

fn failed(stage: SmokeStage, source: MbError) -> MbError {
    MbError::SmokeTest {
        stage: stage.to_string(),
        source: Box::new(source),
    }
}

/// SIGTERM, a short grace period, then SIGKILL.
async fn shut_down(child: &mut SupervisedChild) {
    if let Err(e) = child.terminate() {
        debug!("SIGTERM to {} failed: {}", child.program(), e);
    }
    if child.wait_timeout(SHUTDOWN_GRACE).await.is_err() {
        if let Err(e) = child.kill().await {
            warn!("Failed to kill {}: {}", child.program(), e);
        }
    }
}
