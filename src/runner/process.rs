//! Subprocess runner - launches step commands as child processes

use crate::core::{Step, StepResult, TriggerContext};
use crate::runner::{RunnerError, StepRunner};
use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the process runner
#[derive(Debug, Clone)]
pub struct ProcessRunnerConfig {
    /// How long to wait for a killed process and its output pipes
    pub kill_grace: Duration,
}

impl Default for ProcessRunnerConfig {
    fn default() -> Self {
        Self {
            kill_grace: Duration::from_secs(5),
        }
    }
}

impl ProcessRunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }
}

/// Runner that executes each step command as a subprocess
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    config: ProcessRunnerConfig,
}

/// How the wait on a child process ended
enum Ending {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl ProcessRunner {
    pub fn new(config: ProcessRunnerConfig) -> Self {
        Self { config }
    }

    pub fn kill_grace(&self) -> Duration {
        self.config.kill_grace
    }

    /// Kill the child's process group and wait a bounded time for the child
    async fn terminate(&self, step_name: &str, child: &mut Child, group: Option<u32>) {
        kill_group(step_name, group);
        if let Err(e) = child.start_kill() {
            debug!("Kill for step {} failed (already exited?): {}", step_name, e);
        }
        if timeout(self.config.kill_grace, child.wait()).await.is_err() {
            warn!(
                "Step {} did not exit within {:?} of being killed",
                step_name, self.config.kill_grace
            );
        }
    }
}

/// Send SIGKILL to every process in the step's group
#[cfg(unix)]
fn kill_group(step_name: &str, group: Option<u32>) {
    let Some(pgid) = group.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    // SAFETY: killpg has no memory effects; the group was created for this child
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        debug!("Killed process group {} of step {}", pgid, step_name);
    }
}

#[cfg(not(unix))]
fn kill_group(_step_name: &str, _group: Option<u32>) {}

/// Output of one pipe, read incrementally into a shared buffer
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl Capture {
    fn spawn<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = buf.clone();
        let handle = tokio::spawn(async move {
            let Some(mut reader) = reader else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        lock(&sink).extend_from_slice(&chunk[..n]);
                    }
                    Err(e) => {
                        debug!("Error reading step output: {}", e);
                        break;
                    }
                }
            }
        });
        Self { buf, handle }
    }

    /// Wait up to `grace` for the pipe to close, then return what was read
    async fn finish(mut self, grace: Duration) -> String {
        match timeout(grace, &mut self.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Output reader task failed: {}", e),
            Err(_) => {
                debug!("Output pipe still open after {:?}, keeping partial output", grace);
                self.handle.abort();
            }
        }
        let bytes = lock(&self.buf);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn lock(buf: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl StepRunner for ProcessRunner {
    async fn run(
        &self,
        step: &Step,
        workdir: &Path,
        context: &TriggerContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, RunnerError> {
        let argv = step.render_command(&context.template_variables());
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RunnerError::launch(&step.name, "empty command"))?;

        info!("Executing step: {} ({})", step.name, argv.join(" "));

        let start = Instant::now();
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(workdir)
            .envs(context.environment())
            .envs(&step.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so helpers the command starts die with it
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| RunnerError::launch(&step.name, format!("{}: {}", program, e)))?;
        let group = child.id();

        let stdout = Capture::spawn(child.stdout.take());
        let stderr = Capture::spawn(child.stderr.take());

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = tokio::time::sleep(step.timeout) => Ending::TimedOut,
            _ = cancel.cancelled() => Ending::Cancelled,
        };

        match ending {
            // Leftover background processes would hold the pipes open
            Ending::Exited(_) => kill_group(&step.name, group),
            _ => self.terminate(&step.name, &mut child, group).await,
        }

        let stdout = stdout.finish(self.config.kill_grace).await;
        let stderr = stderr.finish(self.config.kill_grace).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match ending {
            Ending::Exited(Ok(status)) if status.success() => {
                debug!("Step {} succeeded in {}ms", step.name, duration_ms);
                Ok(StepResult::success(&step.name, stdout, stderr, duration_ms))
            }
            Ending::Exited(Ok(status)) => {
                let exit_code = status.code();
                warn!(
                    "Step {} failed with exit code {}",
                    step.name,
                    exit_code.map_or_else(|| "none (signal)".to_string(), |c| c.to_string())
                );
                Ok(StepResult::failed(&step.name, exit_code, stdout, stderr, duration_ms))
            }
            Ending::Exited(Err(e)) => Err(RunnerError::launch(
                &step.name,
                format!("failed to wait for process: {}", e),
            )),
            Ending::TimedOut => {
                warn!("Timeout for step {} after {:?}", step.name, step.timeout);
                Ok(StepResult::timed_out(&step.name, stdout, stderr, duration_ms))
            }
            Ending::Cancelled => {
                info!("Step {} cancelled after {}ms", step.name, duration_ms);
                Err(RunnerError::cancelled(&step.name))
            }
        }
    }
}
