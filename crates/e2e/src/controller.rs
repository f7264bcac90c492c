//! Per-section test controller: setup, launch, wait, cleanup

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use tracing::warn;

use crate::casper::{self, CasperConfig, CasperHandle};
use crate::env::IsolatedEnv;
use crate::error::{E2eError, E2eResult};
use crate::extension::{self, ExtensionConfig};
use crate::section::TestSection;
use crate::server::{NotebookServer, ServerConfig};

/// Everything a controller needs to drive one section end to end
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub server: ServerConfig,
    pub casper: CasperConfig,
    pub extension: ExtensionConfig,

    /// Pre-configured server URL; when set, the controller probes it and
    /// never spawns a local server
    pub url: Option<String>,

    /// Shared append-only log all sections write their blocks to
    pub log_path: PathBuf,

    /// Local bin directory appended to the subprocess PATH
    pub extra_path: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            casper: CasperConfig::default(),
            extension: ExtensionConfig::default(),
            url: None,
            log_path: PathBuf::from(".nbcloud-jstest.log"),
            extra_path: None,
        }
    }
}

/// Drives one test section through its strictly sequential lifecycle:
/// provision, install, start server, run casperjs, collect, tear down.
///
/// The controller exclusively owns its scratch directories and both of
/// its subprocesses; nothing is shared with sibling controllers except
/// the append-only log file.
pub struct TestController {
    pub section: TestSection,
    config: ControllerConfig,
    cmd: Vec<String>,
    env: Option<IsolatedEnv>,
    overlay: Vec<(String, String)>,
    server: Option<NotebookServer>,
    casper: Option<CasperHandle>,
    cleaned: bool,
}

impl TestController {
    /// Assemble the base casper command for the section.
    pub fn new(section: TestSection, config: ControllerConfig) -> E2eResult<Self> {
        let cmd = casper::build_command(&config.casper, section)?;
        Ok(Self {
            section,
            config,
            cmd,
            env: None,
            overlay: Vec::new(),
            server: None,
            casper: None,
            cleaned: false,
        })
    }

    /// The command line as currently assembled.
    pub fn command(&self) -> &[String] {
        &self.cmd
    }

    /// The local server's discovered port, if one was spawned and came up.
    pub fn server_port(&self) -> Option<u16> {
        self.server.as_ref().and_then(|s| s.port)
    }

    /// Provision the environment, put the extension into the section's
    /// auth posture, and arrange the server URL: probing a fixed one, or
    /// spawning a local server and waiting on its descriptor.
    pub async fn setup(&mut self) -> E2eResult<()> {
        let env = IsolatedEnv::provision()?;
        self.overlay = env.vars();
        if let Some(extra) = &self.config.extra_path {
            self.overlay.push(("PATH".to_string(), extend_path(extra)?));
        }

        extension::install_nbextension(&self.config.extension, &self.overlay)?;
        extension::enable_nbextension(&self.config.extension, &self.overlay)?;
        extension::toggle_serverextension(
            &self.config.extension,
            &self.overlay,
            &self.config.extension.package,
            true,
        )?;

        if let Some(dest) = extension::apply_auth_posture(
            &self.config.extension,
            &self.overlay,
            self.section,
            env.home(),
        )? {
            let mut log = TestLog::open(&self.config.log_path)?;
            log.note(&format!("Copying auth token to {}", dest.display()))?;
        }

        if let Some(url) = self.config.url.clone() {
            self.probe_url(&url).await?;
            self.cmd.push(format!("--url={}", url));
        } else {
            let server = NotebookServer::spawn(&self.config.server, &env, &self.overlay).await?;
            match server.port {
                Some(port) => {
                    self.cmd.push(format!(
                        "--url=http://localhost:{}{}",
                        port, self.config.server.base_url
                    ));
                }
                None => {
                    // Don't run the suites against a server that never came
                    // up; fail the section fast instead.
                    self.cmd = casper::abort_command();
                }
            }
            self.server = Some(server);
        }

        self.env = Some(env);
        Ok(())
    }

    /// Single liveness probe for a pre-configured URL. Any transport error
    /// or non-200 counts as unreachable and aborts before anything spawns.
    async fn probe_url(&self, url: &str) -> E2eResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        let alive = match client.get(url).send().await {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(_) => false,
        };
        if alive {
            Ok(())
        } else {
            Err(E2eError::UrlUnreachable(url.to_string()))
        }
    }

    /// Start the browser runner against the assembled command.
    pub fn launch(&mut self, buffer_output: bool) -> E2eResult<()> {
        let handle = CasperHandle::launch(&self.cmd, &self.overlay, !buffer_output)?;
        self.casper = Some(handle);
        Ok(())
    }

    /// Block until the runner exits; zero is the section's pass signal.
    pub fn wait(&mut self) -> E2eResult<i32> {
        let casper = self
            .casper
            .as_mut()
            .ok_or_else(|| E2eError::Casper("wait() before launch()".to_string()))?;
        casper.wait()
    }

    /// Captured casperjs stdout, once the run has exited.
    pub fn runner_output(&self) -> Option<&str> {
        self.casper.as_ref().and_then(CasperHandle::output)
    }

    /// Flush the server's captured output to the shared log and tear the
    /// environment down. Idempotent; also runs on drop so the scratch
    /// dirs and log block survive a failed run.
    pub fn cleanup(&mut self) -> E2eResult<()> {
        if self.cleaned {
            return Ok(());
        }
        self.cleaned = true;

        if let Some(mut server) = self.server.take() {
            server.stop();
            let captured = server.output()?;
            let mut log = TestLog::open(&self.config.log_path)?;
            log.section_block(self.section, &server.command_line, &captured)?;
        }
        self.env = None;
        Ok(())
    }
}

impl Drop for TestController {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("controller cleanup failed: {}", e);
        }
    }
}

/// The configured bin dir goes at the end of the inherited search path,
/// and only inside the overlay; the parent environment keeps its own
/// `PATH`.
fn extend_path(extra: &Path) -> E2eResult<String> {
    let mut paths: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default();
    paths.push(extra.to_path_buf());
    let joined = std::env::join_paths(paths)
        .map_err(|e| E2eError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
    Ok(joined.to_string_lossy().into_owned())
}

/// Append-only handle on the shared run log. All sections write here;
/// blocks are labeled so interleaved runs stay diagnosable.
pub struct TestLog {
    file: File,
}

impl TestLog {
    pub fn open(path: &Path) -> E2eResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    /// Free-form one-line note.
    pub fn note(&mut self, line: &str) -> E2eResult<()> {
        writeln!(self.file, "\n{}", line)?;
        Ok(())
    }

    /// Labeled per-section block: header, the server command line, then
    /// the server's captured output.
    pub fn section_block(
        &mut self,
        section: TestSection,
        server_cmd: &[String],
        captured: &str,
    ) -> E2eResult<()> {
        writeln!(self.file, "-----------------------")?;
        writeln!(
            self.file,
            "{} results ({}):",
            section,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(self.file, "{}", server_cmd.join(" "))?;
        writeln!(self.file, "{}", captured)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_block_is_labeled_and_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");

        let mut log = TestLog::open(&path).unwrap();
        log.section_block(
            TestSection::Auth,
            &["python3".to_string(), "-m".to_string(), "notebook".to_string()],
            "bound on port 8888",
        )
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("auth results"));
        assert!(text.contains("python3 -m notebook"));
        assert!(text.contains("bound on port 8888"));
    }

    #[test]
    fn log_blocks_append_rather_than_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");

        for section in [TestSection::Auth, TestSection::NoAuth] {
            let mut log = TestLog::open(&path).unwrap();
            log.section_block(section, &["srv".to_string()], "output").unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("auth results"));
        assert!(text.contains("noauth results"));
    }

    #[cfg(unix)]
    #[test]
    fn extra_path_lands_at_the_end_of_the_overlay_path() {
        let joined = extend_path(Path::new("/opt/fake/bin")).unwrap();
        assert!(joined.ends_with("/opt/fake/bin"));
    }
}
