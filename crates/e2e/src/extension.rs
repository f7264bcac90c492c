//! Extension install/enable toggles and the auth-token credential copy
//!
//! Every operation shells out to the `jupyter` CLI inside the controller's
//! isolated environment. Failures are fatal for the controller: a toggle
//! that did not apply leaves the server in an undefined auth posture.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{E2eError, E2eResult};
use crate::section::TestSection;

/// Extension identity and auth-posture knobs
#[derive(Debug, Clone)]
pub struct ExtensionConfig {
    /// Importable name of the extension under test
    pub package: String,

    /// Test-only server extension that fakes a logged-in user
    pub patched_package: String,

    /// `jupyter` executable to drive
    pub jupyter: PathBuf,

    /// Out-of-band auth token mode; resolved from `USE_ANACONDA_TOKEN`
    /// once, at the CLI edge
    pub use_token: bool,

    /// Credential cache to re-root into the isolated home in token mode
    pub credential_dir: Option<PathBuf>,

    /// The invoking user's real home, for computing the re-root path
    pub real_home: Option<PathBuf>,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            package: "nbcloud".to_string(),
            patched_package: "nbcloud.tests.patched".to_string(),
            jupyter: PathBuf::from("jupyter"),
            use_token: false,
            credential_dir: default_credential_dir(),
            real_home: dirs::home_dir(),
        }
    }
}

/// Where the companion cloud client keeps its token cache.
pub fn default_credential_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("binstar"))
}

/// Install the extension's static assets into the environment prefix.
pub fn install_nbextension(
    config: &ExtensionConfig,
    overlay: &[(String, String)],
) -> E2eResult<()> {
    run_jupyter(
        config,
        overlay,
        &["nbextension", "install", "--py", "--sys-prefix", &config.package],
    )
}

/// Enable the notebook-side extension.
pub fn enable_nbextension(config: &ExtensionConfig, overlay: &[(String, String)]) -> E2eResult<()> {
    run_jupyter(
        config,
        overlay,
        &["nbextension", "enable", "--py", "--sys-prefix", &config.package],
    )
}

/// Enable or disable a server-side extension by import name.
pub fn toggle_serverextension(
    config: &ExtensionConfig,
    overlay: &[(String, String)],
    name: &str,
    enabled: bool,
) -> E2eResult<()> {
    let action = if enabled { "enable" } else { "disable" };
    run_jupyter(
        config,
        overlay,
        &["serverextension", action, "--py", "--sys-prefix", name],
    )
}

fn run_jupyter(
    config: &ExtensionConfig,
    overlay: &[(String, String)],
    args: &[&str],
) -> E2eResult<()> {
    let rendered = format!("{} {}", config.jupyter.display(), args.join(" "));
    debug!("Running {}", rendered);

    let mut cmd = Command::new(&config.jupyter);
    cmd.args(args);
    for (key, value) in overlay {
        cmd.env(key, value);
    }

    let status = cmd.status().map_err(|e| E2eError::ExtensionToggle {
        command: rendered.clone(),
        status: e.to_string(),
    })?;
    if !status.success() {
        return Err(E2eError::ExtensionToggle {
            command: rendered,
            status: status.to_string(),
        });
    }
    Ok(())
}

/// Put the extension into the section's auth posture after the base
/// install:
/// - auth with a real token: copy the credential cache under the isolated
///   home so the server presents as already authenticated;
/// - auth without one: swap in the patched server extension that fakes
///   the login;
/// - noauth: the real extension stays enabled, the patched one disabled.
///
/// Returns the copy destination when the token copy ran, for logging.
pub fn apply_auth_posture(
    config: &ExtensionConfig,
    overlay: &[(String, String)],
    section: TestSection,
    fake_home: &Path,
) -> E2eResult<Option<PathBuf>> {
    let mut copied = None;
    if section == TestSection::Auth && config.use_token {
        let source = config.credential_dir.clone().ok_or_else(|| {
            E2eError::CredentialCopy("no credential cache directory configured".to_string())
        })?;
        let real_home = config.real_home.clone().ok_or(E2eError::NoHomeDir)?;
        copied = Some(copy_credential_cache(&source, &real_home, fake_home)?);
    }

    let patch_auth = section == TestSection::Auth && !config.use_token;
    toggle_serverextension(config, overlay, &config.patched_package, patch_auth)?;
    toggle_serverextension(config, overlay, &config.package, !patch_auth)?;

    Ok(copied)
}

/// Re-root `source` under `fake_home` at the same home-relative path, so
/// the server finds the token cache exactly where the client would look.
pub fn copy_credential_cache(
    source: &Path,
    real_home: &Path,
    fake_home: &Path,
) -> E2eResult<PathBuf> {
    let relative = source.strip_prefix(real_home).map_err(|_| {
        E2eError::CredentialCopy(format!(
            "{} is not under the home directory {}",
            source.display(),
            real_home.display()
        ))
    })?;
    let dest = fake_home.join(relative);

    info!("Copying auth token cache to {}", dest.display());

    for entry in WalkDir::new(source) {
        let entry = entry.map_err(std::io::Error::from)?;
        let suffix = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| E2eError::CredentialCopy(e.to_string()))?;
        let target = dest.join(suffix);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn credential_cache_is_rerooted_under_the_isolated_home() {
        let real_home = TempDir::new().unwrap();
        let fake_home = TempDir::new().unwrap();
        let cache = real_home.path().join(".local/share/binstar");
        std::fs::create_dir_all(cache.join("tokens")).unwrap();
        std::fs::write(cache.join("tokens/api.token"), "secret").unwrap();

        let dest = copy_credential_cache(&cache, real_home.path(), fake_home.path()).unwrap();

        assert_eq!(dest, fake_home.path().join(".local/share/binstar"));
        assert_eq!(
            std::fs::read_to_string(dest.join("tokens/api.token")).unwrap(),
            "secret"
        );
    }

    #[test]
    fn credential_cache_outside_home_is_refused() {
        let real_home = TempDir::new().unwrap();
        let fake_home = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();

        let err = copy_credential_cache(elsewhere.path(), real_home.path(), fake_home.path())
            .unwrap_err();
        assert!(matches!(err, E2eError::CredentialCopy(_)));
    }

    #[test]
    fn missing_credential_cache_propagates() {
        let real_home = TempDir::new().unwrap();
        let fake_home = TempDir::new().unwrap();
        let gone = real_home.path().join("no-such-cache");

        assert!(copy_credential_cache(&gone, real_home.path(), fake_home.path()).is_err());
    }
}
