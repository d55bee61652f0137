//! Encoder process supervision.
//!
//! Shutdown is two-phase: interrupt, wait up to the grace period, then kill.
//! Encoders such as ffmpeg only flush their output on an interrupt, so a
//! bare kill could cut a frame in half while the demuxer is reading it.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::source::EncoderSpec;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Handle to a running OS process. Implemented for spawned encoders and for
/// test doubles.
#[async_trait]
pub trait ProcessHandle: Send {
    fn id(&self) -> Option<u32>;

    /// Ask the process to stop (SIGINT on unix).
    fn interrupt(&mut self) -> anyhow::Result<()>;

    /// Wait for the process to exit.
    async fn wait(&mut self) -> anyhow::Result<Option<ExitStatus>>;

    /// Force termination and reap.
    async fn kill(&mut self) -> anyhow::Result<()>;
}

/// Run the interrupt → grace → kill sequence on `process`.
///
/// Returns `true` when the process exited within the grace period.
pub async fn shutdown(process: &mut dyn ProcessHandle, grace: Duration) -> anyhow::Result<bool> {
    if let Err(e) = process.interrupt() {
        log::warn!("Encoder: interrupt {:?} failed: {:#}", process.id(), e);
    }

    match tokio::time::timeout(grace, process.wait()).await {
        Ok(Ok(status)) => {
            log::debug!("Encoder: {:?} exited after interrupt: {:?}", process.id(), status);
            Ok(true)
        }
        Ok(Err(e)) => {
            log::warn!("Encoder: wait on {:?} failed: {:#}", process.id(), e);
            process.kill().await?;
            Ok(false)
        }
        Err(_) => {
            log::info!(
                "Encoder: {:?} still running after {:?}, killing",
                process.id(),
                grace
            );
            process.kill().await?;
            Ok(false)
        }
    }
}

/// Encoder spawned with `tokio::process`.
pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn interrupt(&mut self) -> anyhow::Result<()> {
        // `id()` is None once the child has been reaped.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            kill(Pid::from_raw(pid as i32), Signal::SIGINT)
                .map_err(|e| anyhow::anyhow!("SIGINT to {}: {}", pid, e))?;
        }

        #[cfg(not(unix))]
        {
            // No interrupt signal for child processes here; go straight to kill.
            let _ = pid;
            self.child.start_kill()?;
        }

        Ok(())
    }

    async fn wait(&mut self) -> anyhow::Result<Option<ExitStatus>> {
        Ok(Some(self.child.wait().await?))
    }

    async fn kill(&mut self) -> anyhow::Result<()> {
        match self.child.try_wait()? {
            Some(_) => Ok(()),
            None => Ok(self.child.kill().await?),
        }
    }
}

/// Start the encoder described by `spec` with stdout piped.
///
/// stderr is drained into the log so the child never stalls on a full pipe.
pub fn spawn_encoder(spec: &EncoderSpec) -> anyhow::Result<(ChildProcess, ChildStdout)> {
    let mut child = Command::new(spec.program())
        .args(spec.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow::anyhow!("spawn {}: {}", spec.program(), e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("encoder stdout not captured"))?;

    if let Some(stderr) = child.stderr.take() {
        let pid = child.id();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!("Encoder[{:?}]: {}", pid, line);
            }
        });
    }

    log::info!(
        "Encoder: started {} ({}) pid {:?}",
        spec.program(),
        spec.name(),
        child.id()
    );
    Ok((ChildProcess::new(child), stdout))
}

/// Lifecycle of the supervised process: absent → running → terminated.
enum Slot {
    Absent,
    Running(Box<dyn ProcessHandle>),
    Terminated,
}

/// Owns at most one encoder process for a session and guarantees it is
/// stopped exactly once, whether by an explicit [`Supervisor::stop`] or by
/// the cancellation watcher.
#[derive(Clone)]
pub struct Supervisor {
    slot: Arc<Mutex<Slot>>,
    grace: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

impl Supervisor {
    pub fn new(grace: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Absent)),
            grace,
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Hand a freshly spawned process to the supervisor.
    ///
    /// Fails, returning the process, if one was already attached or the
    /// supervisor has been stopped. The caller must then shut it down.
    pub async fn attach(
        &self,
        process: Box<dyn ProcessHandle>,
    ) -> Result<(), Box<dyn ProcessHandle>> {
        let mut slot = self.slot.lock().await;
        match *slot {
            Slot::Absent => {
                *slot = Slot::Running(process);
                Ok(())
            }
            Slot::Running(_) | Slot::Terminated => Err(process),
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.slot.lock().await, Slot::Running(_))
    }

    pub async fn is_terminated(&self) -> bool {
        matches!(*self.slot.lock().await, Slot::Terminated)
    }

    /// Stop the process if one is running and move to the terminal state.
    /// Safe to call more than once and before anything was attached.
    pub async fn stop(&self) -> anyhow::Result<()> {
        let previous = {
            let mut slot = self.slot.lock().await;
            std::mem::replace(&mut *slot, Slot::Terminated)
        };

        match previous {
            Slot::Running(mut process) => {
                shutdown(process.as_mut(), self.grace).await?;
                Ok(())
            }
            Slot::Absent | Slot::Terminated => Ok(()),
        }
    }

    /// Spawn a task that stops the process once `cancel` fires.
    ///
    /// The task only waits on the token, so it never hangs on a process
    /// that failed to start.
    pub fn watch(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            if let Err(e) = supervisor.stop().await {
                log::warn!("Encoder: stop on cancel failed: {:#}", e);
            }
        })
    }
}

#[cfg(test)]
#[path = "process_test.rs"]
mod process_test;
