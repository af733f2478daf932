// mockbrew-aio/src/process.rs
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output as StdOutput, Stdio};
use std::sync::Arc;
use std::time::Duration;

use mockbrew_common::error::{MbError, Result};
use tokio::process::{Child, Command};
use tracing::{debug, error, warn};

/// Asynchronously runs an external command and captures its output.
pub async fn run_command_async(
    command: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    envs: Option<HashMap<String, String>>,
) -> Result<StdOutput> {
    debug!(
        "Async Running command: {} {:?} (cwd: {:?}, envs: {:?})",
        command,
        args,
        cwd,
        envs.as_ref().map(|e| e.keys().collect::<Vec<_>>())
    );

    let mut cmd = Command::new(&command);
    cmd.args(args);
    cmd.kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    if let Some(env_map) = envs {
        cmd.envs(env_map);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null());

    match cmd.output().await {
        Ok(output) => {
            if !output.status.success() {
                debug!("Async Command failed with status: {}", output.status);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.trim().is_empty() {
                    debug!("Stderr:\n{}", stderr.trim());
                }
            } else {
                debug!("Async Command finished successfully.");
            }
            Ok(output)
        }
        Err(e) => {
            error!("Async Failed to execute command {}: {}", command, e);
            Err(MbError::CommandExecError(format!("{command}: {e}")))
        }
    }
}

/// A child process owned by its spawner.
///
/// The child is killed if the handle is dropped while it is still running, so
/// it never outlives the code that started it.
#[derive(Debug)]
pub struct SupervisedChild {
    program: String,
    child: Child,
    exit_status: Option<ExitStatus>,
}

impl SupervisedChild {
    /// Starts `program` with `args`. stdout and stderr are appended to
    /// `output_log` when given, discarded otherwise.
    pub fn spawn(program: &Path, args: &[String], output_log: Option<&Path>) -> Result<Self> {
        let program_name = program.display().to_string();
        debug!("Spawning supervised child: {} {:?}", program_name, args);

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.kill_on_drop(true);
        cmd.stdin(Stdio::null());
        match output_log {
            Some(log_path) => {
                let log = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(log_path)
                    .map_err(|e| {
                        MbError::Io(Arc::new(std::io::Error::new(
                            e.kind(),
                            format!("Failed to open child log {}: {}", log_path.display(), e),
                        )))
                    })?;
                let log_err = log.try_clone()?;
                cmd.stdout(Stdio::from(log));
                cmd.stderr(Stdio::from(log_err));
            }
            None => {
                cmd.stdout(Stdio::null());
                cmd.stderr(Stdio::null());
            }
        }

        let child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", program_name, e);
            MbError::CommandExecError(format!("Failed to spawn {program_name}: {e}"))
        })?;
        debug!("Spawned {} with pid {:?}", program_name, child.id());
        Ok(Self {
            program: program_name,
            child,
            exit_status: None,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// OS process id, `None` once the child has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking exit check.
    pub fn try_exit_status(&mut self) -> Result<Option<ExitStatus>> {
        if self.exit_status.is_some() {
            return Ok(self.exit_status);
        }
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.exit_status = status;
        }
        Ok(status)
    }

    /// Asks the child to shut down (SIGTERM).
    #[cfg(unix)]
    pub fn terminate(&self) -> Result<()> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        debug!("Sending SIGTERM to {} (pid {})", self.program, pid);
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(MbError::from(err));
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn terminate(&self) -> Result<()> {
        Err(MbError::Generic(
            "Graceful termination is not supported on this platform".to_string(),
        ))
    }

    /// Forcefully kills the child and reaps it.
    pub async fn kill(&mut self) -> Result<()> {
        if self.try_exit_status()?.is_some() {
            return Ok(());
        }
        warn!("Killing {} (pid {:?})", self.program, self.child.id());
        self.child.kill().await?;
        self.exit_status = self.child.try_wait()?;
        Ok(())
    }

    /// Waits for the child to exit, giving up after `timeout`.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("{} exited with {}", self.program, status);
                self.exit_status = Some(status);
                Ok(status)
            }
            Ok(Err(e)) => Err(MbError::from(e)),
            Err(_) => Err(MbError::Timeout(format!(
                "{} did not exit within {:?}",
                self.program, timeout
            ))),
        }
    }
}
