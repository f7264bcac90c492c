//! Notebook server management - spawning and readiness polling

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::capture::StreamCapturer;
use crate::env::{jupyter_runtime_dir, IsolatedEnv};
use crate::error::{E2eError, E2eResult};

/// Configuration for spawning the notebook server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Python interpreter the server is started with (`python -m notebook`)
    pub python: PathBuf,

    /// Base URL the server is mounted under
    pub base_url: String,

    /// Interval between readiness polls
    pub poll_interval: Duration,

    /// Total budget for the server to write its runtime descriptor
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python3"),
            base_url: "/".to_string(),
            poll_interval: Duration::from_millis(100),
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// The slice of the runtime descriptor the harness needs. The server
/// writes more (token, url, pid); only the bound port matters here.
#[derive(Debug, Deserialize)]
struct ServerInfo {
    port: u16,
}

/// Handle to a running notebook server process
pub struct NotebookServer {
    child: Child,
    capturer: StreamCapturer,
    stopped: bool,

    /// Command line the server was started with, kept for the log block
    pub command_line: Vec<String>,

    /// Port from the runtime descriptor; `None` if readiness timed out
    pub port: Option<u16>,

    /// Descriptor path derived from the child's pid
    pub info_file: PathBuf,
}

impl NotebookServer {
    /// Spawn the server bound to the isolated notebook dir, then wait
    /// (bounded) for its runtime descriptor.
    ///
    /// A readiness timeout is not an error: the handle comes back with
    /// `port: None` and the caller decides how to degrade. One attempt,
    /// no retry.
    pub async fn spawn(
        config: &ServerConfig,
        env: &IsolatedEnv,
        overlay: &[(String, String)],
    ) -> E2eResult<Self> {
        let command_line = vec![
            config.python.display().to_string(),
            "-m".to_string(),
            "notebook".to_string(),
            "--no-browser".to_string(),
            "--notebook-dir".to_string(),
            env.notebook_dir().display().to_string(),
            format!("--NotebookApp.base_url={}", config.base_url),
        ];

        info!("Starting notebook server: {}", command_line.join(" "));

        let mut cmd = Command::new(&config.python);
        cmd.args(&command_line[1..])
            .current_dir(env.notebook_dir())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in overlay {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!(
                "Failed to spawn {}: {}",
                config.python.display(),
                e
            ))
        })?;

        // Capture is wired up first so no early output is dropped; stdout
        // and stderr land interleaved in one buffer.
        let mut capturer = StreamCapturer::new(true);
        if let Some(stdout) = child.stdout.take() {
            capturer.attach(stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            capturer.attach(stderr);
        }

        let info_file =
            jupyter_runtime_dir(env.home()).join(format!("nbserver-{}.json", child.id()));

        let port = wait_for_descriptor(&info_file, config).await;
        match port {
            Some(port) => info!("Notebook server ready on port {}", port),
            None => warn!(
                "Notebook server never wrote {} within {:?}",
                info_file.display(),
                config.startup_timeout
            ),
        }

        Ok(Self {
            child,
            capturer,
            stopped: false,
            command_line,
            port,
            info_file,
        })
    }

    /// Stop the server and finalize its captured output. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        info!("Stopping notebook server (pid: {})", self.child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = self.child.kill();
        let _ = self.child.wait();

        self.capturer.halt();
        self.stopped = true;
    }

    /// The server's combined output, available once stopped.
    pub fn output(&self) -> E2eResult<String> {
        self.capturer.text()
    }
}

impl Drop for NotebookServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Poll for the pid-derived descriptor file and read the bound port out of
/// it. Returns `None` when the poll window closes first. A descriptor that
/// exists but does not parse yet is polled past; the server may still be
/// writing it.
async fn wait_for_descriptor(info_file: &Path, config: &ServerConfig) -> Option<u16> {
    let start = Instant::now();
    while start.elapsed() < config.startup_timeout {
        if info_file.exists() {
            if let Ok(raw) = std::fs::read_to_string(info_file) {
                if let Ok(info) = serde_json::from_str::<ServerInfo>(&raw) {
                    return Some(info.port);
                }
            }
        }
        sleep(config.poll_interval).await;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> ServerConfig {
        ServerConfig {
            poll_interval: Duration::from_millis(5),
            startup_timeout: Duration::from_millis(100),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn descriptor_port_is_parsed_once_present() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nbserver-1.json");
        std::fs::write(&file, r#"{"port": 8888, "token": "", "url": "http://localhost:8888/"}"#)
            .unwrap();

        assert_eq!(wait_for_descriptor(&file, &quick_config()).await, Some(8888));
    }

    #[tokio::test]
    async fn missing_descriptor_times_out_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nbserver-2.json");

        assert_eq!(wait_for_descriptor(&file, &quick_config()).await, None);
    }

    #[tokio::test]
    async fn unparsable_descriptor_is_polled_past() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nbserver-3.json");
        std::fs::write(&file, "{\"po").unwrap();

        assert_eq!(wait_for_descriptor(&file, &quick_config()).await, None);
    }
}
