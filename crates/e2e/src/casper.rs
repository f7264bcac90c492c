//! CasperJS invocation - command assembly, launch, and output parsing

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::capture::StreamCapturer;
use crate::error::{E2eError, E2eResult};
use crate::section::TestSection;

/// Browser engine casperjs drives
#[derive(Debug, Clone, Copy, Default)]
pub enum Engine {
    #[default]
    PhantomJs,
    SlimerJs,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::PhantomJs => "phantomjs",
            Engine::SlimerJs => "slimerjs",
        }
    }
}

/// Configuration for assembling the casperjs command line
#[derive(Debug, Clone)]
pub struct CasperConfig {
    /// `casperjs` executable
    pub casperjs: PathBuf,

    /// Suite root: `<js_dir>/<section>/test_*.js` cases plus `_*.js`
    /// helpers at the top level
    pub js_dir: PathBuf,

    /// Shared utility script injected ahead of the helpers
    pub util_script: Option<PathBuf>,

    /// Browser engine flag
    pub engine: Engine,

    /// Directory for per-section xUnit reports; `None` disables them
    pub xunit_dir: Option<PathBuf>,

    /// Extra arguments appended after the test cases
    pub extra_args: Vec<String>,
}

impl Default for CasperConfig {
    fn default() -> Self {
        Self {
            casperjs: PathBuf::from("casperjs"),
            js_dir: PathBuf::from("js"),
            util_script: None,
            engine: Engine::default(),
            xunit_dir: None,
            extra_args: Vec::new(),
        }
    }
}

/// Include scripts: the shared util first, then the suite's
/// underscore-prefixed helpers in name order.
pub fn discover_includes(config: &CasperConfig) -> E2eResult<Vec<PathBuf>> {
    let mut includes = Vec::new();
    if let Some(util) = &config.util_script {
        includes.push(util.clone());
    }

    let mut helpers = Vec::new();
    if config.js_dir.is_dir() {
        for entry in WalkDir::new(&config.js_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.into_path();
            if is_helper(&path) {
                helpers.push(path);
            }
        }
    }
    helpers.sort();
    includes.extend(helpers);
    Ok(includes)
}

fn is_helper(path: &Path) -> bool {
    path.extension().map_or(false, |e| e == "js")
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with('_'))
}

/// Test cases for a section: `<js_dir>/<section>/test_*.js`, name order.
pub fn discover_cases(js_dir: &Path, section: TestSection) -> E2eResult<Vec<PathBuf>> {
    let section_dir = js_dir.join(section.as_str());
    let mut cases = Vec::new();
    if section_dir.is_dir() {
        for entry in WalkDir::new(&section_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.into_path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with("test_") && name.ends_with(".js") {
                cases.push(path);
            }
        }
    }
    cases.sort();
    Ok(cases)
}

/// Assemble the full casperjs command line for a section. The server URL
/// is appended separately once known; after launch the command is
/// immutable.
pub fn build_command(config: &CasperConfig, section: TestSection) -> E2eResult<Vec<String>> {
    let includes = discover_includes(config)?;
    let cases = discover_cases(&config.js_dir, section)?;

    let binary = if cfg!(windows) {
        format!("{}.cmd", config.casperjs.display())
    } else {
        config.casperjs.display().to_string()
    };

    let joined = includes
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",");

    let mut cmd = vec![
        binary,
        "test".to_string(),
        format!("--includes={}", joined),
        format!("--engine={}", config.engine.as_str()),
    ];
    cmd.extend(cases.iter().map(|p| p.display().to_string()));
    cmd.extend(config.extra_args.iter().cloned());
    if let Some(dir) = &config.xunit_dir {
        cmd.push(format!(
            "--xunit={}",
            dir.join(format!("{}.xml", section)).display()
        ));
    }
    Ok(cmd)
}

/// Placeholder substituted when the server never became ready: a no-op
/// that exits non-zero, so the section reports a clean failure instead of
/// hanging on a server that is not there.
pub fn abort_command() -> Vec<String> {
    if cfg!(windows) {
        vec!["cmd".to_string(), "/C".to_string(), "exit 1".to_string()]
    } else {
        vec!["sh".to_string(), "-c".to_string(), "exit 1".to_string()]
    }
}

/// Check that casperjs is runnable before any section starts.
pub fn check_casperjs(config: &CasperConfig) -> E2eResult<()> {
    let status = Command::new(&config.casperjs)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        _ => Err(E2eError::CasperNotFound),
    }
}

/// A launched casperjs run
pub struct CasperHandle {
    child: Child,
    capturer: StreamCapturer,
    output: Option<String>,

    /// Command line the run was started with
    pub command_line: Vec<String>,
}

impl CasperHandle {
    /// Spawn the assembled command with stdout captured and stderr piped.
    /// The capturer is wired before the child can produce output.
    pub fn launch(cmd: &[String], overlay: &[(String, String)], echo: bool) -> E2eResult<Self> {
        let (binary, args) = cmd
            .split_first()
            .ok_or_else(|| E2eError::Casper("empty test command".to_string()))?;

        info!("Launching: {}", cmd.join(" "));

        let mut command = Command::new(binary);
        command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        for (key, value) in overlay {
            command.env(key, value);
        }

        let mut child = command.spawn()?;
        let mut capturer = StreamCapturer::new(echo);
        if let Some(stdout) = child.stdout.take() {
            capturer.attach(stdout);
        }

        Ok(Self {
            child,
            capturer,
            output: None,
            command_line: cmd.to_vec(),
        })
    }

    /// Block until the run exits: drain stderr, reap the child, finalize
    /// the capture, and hand back the exit code (zero = pass; a
    /// signal-killed child reports -1).
    pub fn wait(&mut self) -> E2eResult<i32> {
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            pipe.read_to_string(&mut stderr)?;
        }
        let status = self.child.wait()?;

        self.capturer.halt();
        self.output = Some(self.capturer.text()?);

        if !stderr.trim().is_empty() {
            debug!("casperjs stderr:\n{}", stderr);
        }
        Ok(status.code().unwrap_or(-1))
    }

    /// Captured stdout, available after `wait`.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }
}

/// Tallies from the casperjs summary line
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CasperSummary {
    pub executed: u32,
    pub passed: u32,
    pub failed: u32,
}

/// Parse the `N tests executed ..., N passed, N failed` line casperjs
/// prints at the end of a run. Absent or garbled output is `None`, never
/// an error; the exit code already carries the pass/fail signal.
pub fn parse_summary(output: &str) -> Option<CasperSummary> {
    let re = Regex::new(r"(\d+)\s+tests?\s+executed[^,]*,\s*(\d+)\s+passed,\s*(\d+)\s+failed")
        .ok()?;
    let caps = re.captures(output)?;
    Some(CasperSummary {
        executed: caps.get(1)?.as_str().parse().ok()?,
        passed: caps.get(2)?.as_str().parse().ok()?,
        failed: caps.get(3)?.as_str().parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_line_parses() {
        let output = "PASS 12 tests executed in 3.116s, 11 passed, 1 failed, 0 dubious, 0 skipped.";
        let summary = parse_summary(output).unwrap();
        assert_eq!(
            (summary.executed, summary.passed, summary.failed),
            (12, 11, 1)
        );
    }

    #[test]
    fn single_test_summary_parses() {
        let output = "PASS 1 test executed in 0.5s, 1 passed, 0 failed, 0 dubious, 0 skipped.";
        assert_eq!(parse_summary(output).map(|s| s.executed), Some(1));
    }

    #[test]
    fn missing_summary_is_none() {
        assert!(parse_summary("TypeError: undefined is not a function").is_none());
    }

    #[test]
    fn abort_command_is_a_nonzero_noop() {
        let cmd = abort_command();
        assert!(!cmd.is_empty());
        assert!(cmd.last().unwrap().contains("exit 1"));
    }

    #[test]
    fn engine_flags_match_casperjs_names() {
        assert_eq!(Engine::PhantomJs.as_str(), "phantomjs");
        assert_eq!(Engine::SlimerJs.as_str(), "slimerjs");
    }
}
