use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SandboxRequest {
    pub script_contents: String,
    pub timeout: Duration,
}

impl SandboxRequest {
    pub fn new(script_contents: impl Into<String>) -> Self {
        Self {
            script_contents: script_contents.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.script_contents.trim().is_empty() {
            return Err(anyhow!("code must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SandboxResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

impl SandboxResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxResult>;
}

#[derive(Debug, Clone)]
pub struct ProcessSandboxConfig {
    pub python_binary: String,
    /// Scripts run with this as their current directory.
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl Default for ProcessSandboxConfig {
    fn default() -> Self {
        Self {
            python_binary: "python3".to_string(),
            working_dir: PathBuf::from("data/workspace"),
            env: vec![("MPLBACKEND".to_string(), "Agg".to_string())],
        }
    }
}

/// Runs Python code as a child process of the service.
#[derive(Debug)]
pub struct ProcessSandboxRunner {
    config: ProcessSandboxConfig,
}

static SANDBOX_FAILURE_STREAK: AtomicUsize = AtomicUsize::new(0);

impl ProcessSandboxRunner {
    pub fn new(mut config: ProcessSandboxConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.working_dir).with_context(|| {
            format!(
                "failed to create working directory {}",
                config.working_dir.display()
            )
        })?;
        // the script path and the child's cwd must agree
        config.working_dir = std::fs::canonicalize(&config.working_dir).with_context(|| {
            format!(
                "failed to resolve working directory {}",
                config.working_dir.display()
            )
        })?;
        Ok(Self { config })
    }

    /// Absolute directory scripts are written to and run from.
    pub fn working_dir(&self) -> &Path {
        &self.config.working_dir
    }

    #[tracing::instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    async fn execute_internal(&self, request: SandboxRequest) -> Result<SandboxResult> {
        request.validate()?;

        let script_path = self
            .config
            .working_dir
            .join(format!(".agentteams_{}.py", Uuid::new_v4().simple()));
        std::fs::write(&script_path, request.script_contents.as_bytes())
            .with_context(|| format!("failed to write script {}", script_path.display()))?;
        let guard = ScriptGuard::new(script_path.clone());

        let mut cmd = Command::new(&self.config.python_binary);
        cmd.arg(&script_path)
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        debug!(binary = %self.config.python_binary, script = %script_path.display(), "prepared python invocation");

        let start = Instant::now();
        let mut child = cmd.spawn().with_context(|| {
            format!("failed to spawn python binary `{}`", self.config.python_binary)
        })?;
        let stdout_reader = child.stdout.take();
        let stderr_reader = child.stderr.take();

        let stdout_task = tokio::spawn(async move { read_pipe(stdout_reader).await });
        let stderr_task = tokio::spawn(async move { read_pipe(stderr_reader).await });

        let wait_result = time::timeout(request.timeout, child.wait()).await;

        let (timed_out, status) = match wait_result {
            Ok(wait_outcome) => {
                let status = wait_outcome.context("failed to wait for python process")?;
                (false, status)
            }
            Err(_elapsed) => {
                warn!("python execution timed out; terminating process");
                if let Err(err) = child.kill().await {
                    warn!(error = %err, "failed to kill python process after timeout");
                }
                let status = child
                    .wait()
                    .await
                    .context("failed to obtain exit status after timeout")?;
                (true, status)
            }
        };

        let stdout_bytes = stdout_task
            .await
            .context("failed to join stdout collection task")??;
        let stderr_bytes = stderr_task
            .await
            .context("failed to join stderr collection task")??;
        drop(guard);

        let result = SandboxResult {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            timed_out,
            duration: start.elapsed(),
        };

        let failure_streak = if result.success() {
            SANDBOX_FAILURE_STREAK.swap(0, Ordering::Relaxed);
            0
        } else {
            let streak = SANDBOX_FAILURE_STREAK.fetch_add(1, Ordering::Relaxed) + 1;
            if streak >= 3 {
                error!(streak, "python execution failure streak exceeded threshold");
            }
            streak
        };

        let status_label = if result.timed_out {
            "timeout"
        } else if result.success() {
            "success"
        } else {
            "failure"
        };
        info!(
            target: "telemetry.sandbox",
            status = status_label,
            exit_code = result.exit_code,
            duration_ms = result.duration.as_millis() as u64,
            failure_streak,
            "python execution finished"
        );

        Ok(result)
    }
}

#[async_trait]
impl SandboxExecutor for ProcessSandboxRunner {
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxResult> {
        self.execute_internal(request).await
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buffer = Vec::new();
    if let Some(mut reader) = pipe {
        reader
            .read_to_end(&mut buffer)
            .await
            .context("failed to drain python pipe")?;
    }
    Ok(buffer)
}

struct ScriptGuard {
    path: PathBuf,
}

impl ScriptGuard {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for ScriptGuard {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(err) = std::fs::remove_file(&self.path) {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to remove python script"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_code_is_rejected() {
        assert!(SandboxRequest::new("  \n").validate().is_err());
        assert!(SandboxRequest::new("print(1)").validate().is_ok());
    }

    #[tokio::test]
    async fn missing_interpreter_is_an_error_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessSandboxRunner::new(ProcessSandboxConfig {
            python_binary: "agentteams-no-such-python".to_string(),
            working_dir: dir.path().to_path_buf(),
            env: Vec::new(),
        })
        .unwrap();

        let err = runner
            .execute(SandboxRequest::new("print('hi')"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("agentteams-no-such-python"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
