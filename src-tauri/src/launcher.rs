use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::mpsc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendLaunch {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Handle to the long-lived separation backend.
///
/// The child is owned by a monitor task that streams its output into the log
/// and records how it ended. Dropping the handle kills the child.
pub struct BackendProcess {
    pid: Option<u32>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    exited_rx: mpsc::Receiver<Option<ExitStatus>>,
}

impl BackendProcess {
    /// Must be called from within a Tokio runtime.
    pub fn spawn(launch: &BackendLaunch) -> io::Result<Self> {
        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &launch.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let pid = child.id();
        info!(
            program = %launch.program.display(),
            args = ?launch.args,
            pid,
            "backend started"
        );

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, true));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = mpsc::channel();
        tokio::spawn(monitor(child, shutdown_rx, exited_tx));

        Ok(Self {
            pid,
            shutdown_tx: Some(shutdown_tx),
            exited_rx,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Kills the backend (if it is still running) and waits up to `timeout`
    /// for the monitor to confirm. Safe to call from a synchronous context
    /// such as the Tauri exit hook.
    pub fn shutdown(mut self, timeout: Duration) -> Option<ExitStatus> {
        if let Some(tx) = self.shutdown_tx.take() {
            // Err means the monitor already saw the process exit.
            let _ = tx.send(());
        }
        match self.exited_rx.recv_timeout(timeout) {
            Ok(status) => status,
            Err(_) => {
                warn!(pid = self.pid, "backend did not confirm shutdown in time");
                None
            }
        }
    }
}

/// Logs the stream line by line until EOF. Bytes that are not UTF-8 are
/// logged lossily; the pipe is never closed early, or the backend's next
/// write would fail.
async fn forward_lines<R>(stream: R, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if is_stderr {
                    warn!(target: "backend", "{}", line);
                } else {
                    info!(target: "backend", "{}", line);
                }
            }
            Err(e) => {
                warn!(target: "backend", "failed to read backend output, discarding the rest: {}", e);
                break;
            }
        }
    }

    // Keep the read end open so the backend never sees a broken pipe.
    if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
        warn!(target: "backend", "stopped draining backend output: {}", e);
    }
}

async fn monitor(
    mut child: Child,
    mut shutdown: oneshot::Receiver<()>,
    exited: mpsc::Sender<Option<ExitStatus>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        // Fires on an explicit shutdown and when the handle is dropped.
        _ = &mut shutdown => {
            if let Err(e) = child.start_kill() {
                warn!("failed to kill backend: {}", e);
            }
            child.wait().await
        }
    };

    let status = match status {
        Ok(status) => {
            info!(%status, "backend exited");
            Some(status)
        }
        Err(e) => {
            error!("failed to wait for backend: {}", e);
            None
        }
    };
    let _ = exited.send(status);
}
