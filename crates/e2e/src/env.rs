//! Per-controller isolated environment - scratch home and Jupyter dirs

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::E2eResult;

/// Scratch stand-ins for the invoking user's home and Jupyter directories.
///
/// Every subprocess a controller spawns inherits these through its env
/// overlay, so a test run can neither pollute nor be polluted by the real
/// user environment. The directories are removed when the value drops,
/// however the run ended. Never shared across controllers.
pub struct IsolatedEnv {
    home: TempDir,
    config_dir: TempDir,
    ipython_dir: TempDir,
    notebook_dir: TempDir,
}

impl IsolatedEnv {
    /// Create the four scratch directories plus the nested notebook trees.
    ///
    /// The space-containing segments catch path-quoting bugs in the
    /// tooling under test.
    pub fn provision() -> E2eResult<Self> {
        let env = Self {
            home: TempDir::new()?,
            config_dir: TempDir::new()?,
            ipython_dir: TempDir::new()?,
            notebook_dir: TempDir::new()?,
        };
        for tree in ["sub dir1/sub dir 1a", "sub dir2/sub dir 1b"] {
            std::fs::create_dir_all(env.notebook_dir.path().join(tree))?;
        }
        Ok(env)
    }

    pub fn home(&self) -> &Path {
        self.home.path()
    }

    pub fn config_dir(&self) -> &Path {
        self.config_dir.path()
    }

    pub fn ipython_dir(&self) -> &Path {
        self.ipython_dir.path()
    }

    pub fn notebook_dir(&self) -> &Path {
        self.notebook_dir.path()
    }

    /// Environment overlay for spawned subprocesses. The parent process
    /// environment is never touched.
    pub fn vars(&self) -> Vec<(String, String)> {
        vec![
            ("HOME".to_string(), self.home.path().display().to_string()),
            (
                "JUPYTER_CONFIG_DIR".to_string(),
                self.config_dir.path().display().to_string(),
            ),
            (
                "IPYTHONDIR".to_string(),
                self.ipython_dir.path().display().to_string(),
            ),
        ]
    }
}

/// Jupyter runtime directory under an explicit home.
///
/// Mirrors jupyter_core's platform resolution without consulting or
/// mutating the process environment: the caller passes the home it means.
pub fn jupyter_runtime_dir(home: &Path) -> PathBuf {
    if cfg!(target_os = "macos") {
        home.join("Library").join("Jupyter").join("runtime")
    } else {
        home.join(".local")
            .join("share")
            .join("jupyter")
            .join("runtime")
    }
}
