use std::process::{ExitStatus, Stdio};

use nodelink_intercom::{start_intercom, IntercomServer};
use nodelink_stream::{pump, ByteStream};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::NodeCommand;
use crate::error::{Result, RunnerError};

/// What the child's stdin is wired to.
#[derive(Debug, Default)]
pub enum StdinMode {
    /// Inherit the parent's stdin handle.
    #[default]
    Inherit,
    /// No input: the child sees immediate EOF.
    Null,
    /// Pump a caller-supplied stream into the child's stdin, closing it when
    /// the source is exhausted.
    Stream(ByteStream),
}

/// Options for [`spawn`].
///
/// Sinks default to the parent's inherited std handles, mirroring a child
/// that simply shares the parent's terminal.
#[derive(Debug, Default)]
pub struct SpawnOptions {
    stdout: Option<ByteStream>,
    stderr: Option<ByteStream>,
    stdin: StdinMode,
    use_intercom: bool,
    intercom: Option<IntercomServer>,
}

impl SpawnOptions {
    /// Redirect the child's stdout into `sink`.
    pub fn with_stdout(mut self, sink: ByteStream) -> Self {
        self.stdout = Some(sink);
        self
    }

    /// Redirect the child's stderr into `sink`.
    pub fn with_stderr(mut self, sink: ByteStream) -> Self {
        self.stderr = Some(sink);
        self
    }

    /// Wire the child's stdin per `mode`.
    pub fn with_stdin(mut self, mode: StdinMode) -> Self {
        self.stdin = mode;
        self
    }

    /// Start a fresh intercom server for this child.
    pub fn with_intercom(mut self) -> Self {
        self.use_intercom = true;
        self
    }

    /// Adopt an already-started intercom server for this child.
    pub fn with_intercom_server(mut self, server: IntercomServer) -> Self {
        self.intercom = Some(server);
        self
    }
}

/// A supervised node process.
///
/// The handle owns the OS child, both output pumps, and (when requested)
/// the intercom server. It is complete only once the child has exited and
/// both pumps have finished; the child is configured kill-on-drop so
/// discarding the handle early cannot leak the OS process.
#[derive(Debug)]
pub struct NodeProcess {
    child: Child,
    stdout_pump: Option<JoinHandle<()>>,
    stderr_pump: Option<JoinHandle<()>>,
    stdin_pump: Option<JoinHandle<()>>,
    intercom: Option<IntercomServer>,
    status: Option<ExitStatus>,
}

/// Launch a node child process under supervision.
///
/// If an intercom was requested, its bound port is injected into the
/// child's arguments as `--intercom-port <N>` ahead of the user arguments;
/// without the request the flag is absent and the child must not attempt
/// intercom. Two pump tasks start immediately, copying the child's stdout
/// and stderr line by line into the sinks until EOF.
pub async fn spawn(command: NodeCommand, options: SpawnOptions) -> Result<NodeProcess> {
    let SpawnOptions {
        stdout,
        stderr,
        mut stdin,
        use_intercom,
        intercom,
    } = options;

    let intercom = match intercom {
        Some(server) => Some(server),
        None if use_intercom => Some(start_intercom().await?),
        None => None,
    };

    let mut cmd = Command::new(command.program());
    if let Some(server) = &intercom {
        cmd.arg("--intercom-port").arg(server.port().to_string());
    }
    cmd.args(command.args());
    for (key, value) in command.env_vars() {
        cmd.env(key, value);
    }
    if let Some(dir) = command.current_dir() {
        cmd.current_dir(dir);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(match &stdin {
        StdinMode::Inherit => Stdio::inherit(),
        StdinMode::Null => Stdio::null(),
        StdinMode::Stream(_) => Stdio::piped(),
    });
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
        command: command.program().to_string(),
        source,
    })?;
    info!(program = command.program(), pid = child.id(), "node process spawned");

    let child_stdout = child.stdout.take().expect("stdout was configured");
    let child_stderr = child.stderr.take().expect("stderr was configured");

    let stdout_sink = stdout.unwrap_or_else(ByteStream::stdout);
    let stderr_sink = stderr.unwrap_or_else(ByteStream::stderr);

    let stdout_pump = tokio::spawn(pump_into(
        ByteStream::from_child_stdout(child_stdout),
        stdout_sink,
    ));
    let stderr_pump = tokio::spawn(pump_into(
        ByteStream::from_child_stderr(child_stderr),
        stderr_sink,
    ));
    let stdin_pump = match std::mem::take(&mut stdin) {
        StdinMode::Stream(source) => {
            let child_stdin = child.stdin.take().expect("stdin was configured");
            Some(tokio::spawn(pump_into(
                source,
                ByteStream::from_child_stdin(child_stdin),
            )))
        }
        _ => None,
    };

    Ok(NodeProcess {
        child,
        stdout_pump: Some(stdout_pump),
        stderr_pump: Some(stderr_pump),
        stdin_pump,
        intercom,
        status: None,
    })
}

/// Pump `src` into `sink`, downgrading faults to EOF.
///
/// A broken pipe after partial output is an expected termination mode for a
/// child process, not a supervisor-level failure.
async fn pump_into(mut src: ByteStream, mut sink: ByteStream) {
    if let Err(err) = pump(&mut src, &mut sink).await {
        debug!(error = %err, "output pump ended early");
        let _ = sink.eof().await;
    }
}

async fn join_pump(handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        let _ = handle.await;
    }
}

impl NodeProcess {
    /// Wait for the process to exit and every pump to finish draining.
    ///
    /// All waits run concurrently; waiting on the process alone while a
    /// pipe buffer fills would deadlock the child. A non-zero exit code is
    /// reported via [`NodeProcess::returncode`], never as an error here.
    pub async fn wait(&mut self) -> Result<()> {
        if self.status.is_some() {
            return Ok(());
        }

        let stdout_pump = self.stdout_pump.take();
        let stderr_pump = self.stderr_pump.take();
        let stdin_pump = self.stdin_pump.take();

        let (status, _, _, _) = tokio::join!(
            self.child.wait(),
            join_pump(stdout_pump),
            join_pump(stderr_pump),
            join_pump(stdin_pump),
        );
        let status = status.map_err(RunnerError::Wait)?;
        debug!(code = ?status.code(), "node process exited");
        self.status = Some(status);
        Ok(())
    }

    /// Exit code of the child, once [`NodeProcess::wait`] has returned.
    ///
    /// `None` before exit, or when the child was killed by a signal.
    pub fn returncode(&self) -> Option<i32> {
        self.status.as_ref().and_then(ExitStatus::code)
    }

    /// OS process id, while the child is running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// The intercom server owned by this handle, if one was requested.
    pub fn intercom(&self) -> Option<&IntercomServer> {
        self.intercom.as_ref()
    }

    /// Mutable access to the owned intercom server.
    pub fn intercom_mut(&mut self) -> Option<&mut IntercomServer> {
        self.intercom.as_mut()
    }

    /// Kill the child and reap it.
    pub async fn kill(&mut self) -> Result<()> {
        self.child.start_kill().map_err(RunnerError::Wait)?;
        self.wait().await
    }

    /// Tear down resources owned by this handle.
    ///
    /// Closes and awaits the intercom server (if any), guaranteeing no
    /// leaked listening socket even if the caller never touched intercom.
    pub async fn close(&mut self) {
        if let Some(mut server) = self.intercom.take() {
            server.close();
            server.wait_closed().await;
        }
    }
}
