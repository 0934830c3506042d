//! Session-aware assistant CLI client
//!
//! Each query launches the assistant executable once, in the workspace root,
//! with the prompt on stdin. The first query of a workspace creates the
//! conversation under a deterministic id; later ones resume it.
//!
//! If the assistant reports that a freshly "new" id is already in use (a
//! session left over from an earlier run of this program), the id is adopted
//! and the same prompt is resent once as a resume.

use crate::config::SharedSettings;
use crate::error::ClientError;
use crate::session::{SessionId, SessionRegistry, Workspace};
use crate::util::truncate;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;

/// Returned when the assistant exits cleanly without printing anything.
pub const EMPTY_FEEDBACK: &str = "No feedback received.";

/// Conflict text in the assistant's stderr. Matching on it is a fallback
/// until the CLI exposes a dedicated exit code for this case.
const SESSION_IN_USE_HINT: &str = "already in use";

/// One launch of the assistant executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub stdin: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an [`Invocation`] to completion, stdout and stderr fully drained.
///
/// A spawn failure is an `Err`; a non-zero exit is an `Ok` with its code.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput>;
}

/// Launches real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin concurrently so a chatty child can't deadlock on a full stdout pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = invocation.stdin.clone();
            tokio::spawn(async move {
                let result = stdin.write_all(prompt.as_bytes()).await;
                drop(stdin);
                result
            })
        });

        let output = child.wait_with_output().await?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // The child may exit without reading its input.
                Ok(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => {}
                Ok(Err(err)) => return Err(err),
                Err(join_err) => return Err(io::Error::other(join_err)),
            }
        }

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Create,
    Resume,
}

pub struct CliClient {
    workspace: Workspace,
    settings: SharedSettings,
    registry: SessionRegistry,
    runner: Arc<dyn CommandRunner>,
    /// Serializes invocations so the new-session check and the registry update stay paired.
    invocation_lock: Mutex<()>,
}

impl CliClient {
    pub fn new(workspace: Workspace, settings: SharedSettings) -> Self {
        Self::with_runner(workspace, settings, Arc::new(ProcessRunner))
    }

    pub fn with_runner(
        workspace: Workspace,
        settings: SharedSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            workspace,
            settings,
            registry: SessionRegistry::new(),
            runner,
            invocation_lock: Mutex::new(()),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn session_id(&self) -> SessionId {
        self.workspace.session_id()
    }

    /// True until this client has completed a query for its workspace.
    pub fn is_new_session(&self) -> bool {
        !self.registry.contains(self.session_id())
    }

    /// Send `prompt` to the assistant and return its reply.
    pub async fn get_feedback(&self, prompt: &str) -> Result<String, ClientError> {
        self.get_feedback_with(|_| prompt.to_string()).await
    }

    /// Like [`CliClient::get_feedback`], but the prompt is built once the
    /// session state is settled: `build` receives whether this query opens a
    /// new session.
    pub async fn get_feedback_with<F>(&self, build: F) -> Result<String, ClientError>
    where
        F: FnOnce(bool) -> String + Send,
    {
        let _guard = self.invocation_lock.lock().await;

        let session_id = self.session_id();
        let mode = if self.registry.contains(session_id) {
            SessionMode::Resume
        } else {
            SessionMode::Create
        };
        let prompt = build(mode == SessionMode::Create);
        let prompt = prompt.as_str();

        match self.invoke(session_id, mode, prompt).await {
            Err(ClientError::SessionConflict { detail, .. }) => {
                tracing::warn!(
                    %session_id,
                    detail = %truncate(&detail, 200),
                    "session already exists; resuming it instead"
                );
                self.registry.mark_known(session_id);
                self.invoke(session_id, SessionMode::Resume, prompt).await
            }
            result => result,
        }
    }

    pub fn build_invocation(&self, session_id: SessionId, mode: SessionMode, prompt: &str) -> Invocation {
        let settings = crate::config::snapshot(&self.settings);

        let session_flag = match mode {
            SessionMode::Create => "--session-id",
            SessionMode::Resume => "--resume",
        };

        Invocation {
            program: settings.command.clone(),
            args: vec![
                session_flag.to_string(),
                session_id.to_string(),
                "--print".to_string(),
                "--allowedTools".to_string(),
                settings.allowed_tools_arg(),
            ],
            cwd: self.workspace.root().to_path_buf(),
            stdin: prompt.to_string(),
        }
    }

    async fn invoke(
        &self,
        session_id: SessionId,
        mode: SessionMode,
        prompt: &str,
    ) -> Result<String, ClientError> {
        let invocation = self.build_invocation(session_id, mode, prompt);
        tracing::debug!(
            program = %invocation.program,
            %session_id,
            ?mode,
            prompt_chars = prompt.chars().count(),
            "launching assistant"
        );

        let output = match self.runner.run(&invocation).await {
            Ok(output) => output,
            // Spawn reports a missing working directory as NotFound too.
            Err(err) if err.kind() == io::ErrorKind::NotFound && !invocation.cwd.is_dir() => {
                return Err(ClientError::WorkspaceMissing {
                    path: invocation.cwd,
                });
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ClientError::ToolNotInstalled {
                    program: invocation.program,
                });
            }
            Err(err) => return Err(ClientError::io("launching the assistant", err)),
        };

        if output.success() {
            self.registry.mark_known(session_id);
            let feedback = output.stdout.trim();
            tracing::info!(%session_id, ?mode, feedback_chars = feedback.len(), "assistant replied");
            return Ok(if feedback.is_empty() {
                EMPTY_FEEDBACK.to_string()
            } else {
                feedback.to_string()
            });
        }

        let stderr = output.stderr.trim();
        if mode == SessionMode::Create && is_session_conflict(stderr) {
            return Err(ClientError::SessionConflict {
                session_id,
                detail: stderr.to_string(),
            });
        }

        let detail = if stderr.is_empty() {
            match output.code {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            }
        } else {
            stderr.to_string()
        };
        Err(ClientError::ToolFailed { detail })
    }
}

fn is_session_conflict(stderr: &str) -> bool {
    stderr.to_lowercase().contains(SESSION_IN_USE_HINT)
}
